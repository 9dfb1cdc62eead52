//! Answer normalization.
//!
//! Turns the raw value a widget submitted into a canonical [`Answer`]:
//! coerced against the question type, validated against the question's
//! rules, and projected into a `text_value` for search and display.
//! Failures are reported per question so a submission can surface every
//! problem at once.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::{QuestionSpec, QuestionType};

/// One submitted value for one question, snapshotted at submission time.
///
/// The question id, type and title are copied in so the answer stays a
/// faithful historical record even after the live form is edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub question_type: QuestionType,
    pub question_title: String,
    /// Canonical typed value.
    pub value: Value,
    /// Derived search/display projection.
    pub text_value: String,
    pub metadata: AnswerMetadata,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub time_spent_secs: Option<u32>,
    pub attempts: u32,
    pub skipped: bool,
}

/// A value as received from the widget, before normalization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawAnswer {
    pub question_id: String,
    pub value: Value,
    pub time_spent_secs: Option<u32>,
    pub attempts: Option<u32>,
}

impl RawAnswer {
    pub fn new(question_id: impl Into<String>, value: Value) -> Self {
        Self { question_id: question_id.into(), value, time_spent_secs: None, attempts: None }
    }
}

/// Why one question's value was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    RequiredFieldMissing,
    PatternMismatch,
    OutOfRange,
    LengthViolation,
    InvalidOptionValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Normalize one raw value against its question.
///
/// A missing or empty value on an optional question yields a skipped
/// answer; on a required question it is `RequiredFieldMissing`. Container
/// questions never reach this function.
pub fn normalize(question: &QuestionSpec, raw: Option<&RawAnswer>) -> Result<Answer, FieldError> {
    let Some(value) = raw.map(|r| &r.value).filter(|v| !is_empty_value(v)) else {
        if question.required {
            return Err(FieldError::new(
                FieldErrorKind::RequiredFieldMissing,
                format!("\"{}\" is required", question.title),
            ));
        }
        return Ok(skipped_answer(question, raw));
    };

    let canonical = coerce(question, value).map_err(|e| apply_custom_message(question, e))?;
    validate_rules(question, &canonical).map_err(|e| apply_custom_message(question, e))?;

    let text_value = derive_text_value(&canonical);
    Ok(Answer {
        question_id: question.id.clone(),
        question_type: question.question_type,
        question_title: question.title.clone(),
        value: canonical,
        text_value,
        metadata: AnswerMetadata {
            time_spent_secs: raw.and_then(|r| r.time_spent_secs),
            attempts: raw.and_then(|r| r.attempts).unwrap_or(1),
            skipped: false,
        },
    })
}

/// Null, empty string and empty array all count as "no answer".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Project a canonical value into its display string: strings verbatim,
/// arrays joined with `", "`, objects as their JSON rendering, everything
/// else string-coerced.
pub fn derive_text_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(derive_text_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn skipped_answer(question: &QuestionSpec, raw: Option<&RawAnswer>) -> Answer {
    Answer {
        question_id: question.id.clone(),
        question_type: question.question_type,
        question_title: question.title.clone(),
        value: Value::Null,
        text_value: String::new(),
        metadata: AnswerMetadata {
            time_spent_secs: raw.and_then(|r| r.time_spent_secs),
            attempts: raw.and_then(|r| r.attempts).unwrap_or(0),
            skipped: true,
        },
    }
}

fn apply_custom_message(question: &QuestionSpec, mut error: FieldError) -> FieldError {
    if error.kind == FieldErrorKind::RequiredFieldMissing {
        return error;
    }
    if let Some(message) = question.validation.as_ref().and_then(|r| r.custom_message.clone()) {
        error.message = message;
    }
    error
}

// ---------------------------------------------------------------------------
// Type coercion
// ---------------------------------------------------------------------------

fn coerce(question: &QuestionSpec, value: &Value) -> Result<Value, FieldError> {
    match question.question_type {
        QuestionType::ShortText | QuestionType::LongText => coerce_text(value),
        QuestionType::Email => coerce_email(value),
        QuestionType::Phone => coerce_phone(value),
        QuestionType::Number | QuestionType::Rating | QuestionType::Scale => coerce_number(value),
        QuestionType::Date => coerce_temporal(value, |s| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        }, "expected an ISO date (YYYY-MM-DD)"),
        QuestionType::Time => coerce_temporal(value, |s| {
            chrono::NaiveTime::parse_from_str(s, "%H:%M").is_ok()
                || chrono::NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
        }, "expected a time of day (HH:MM)"),
        QuestionType::DateTime => coerce_temporal(value, |s| {
            chrono::DateTime::parse_from_rfc3339(s).is_ok()
        }, "expected an RFC 3339 timestamp"),
        QuestionType::SingleChoice | QuestionType::Dropdown => coerce_single_option(question, value),
        QuestionType::MultipleChoice => coerce_multi_option(question, value),
        QuestionType::FileUpload => coerce_file(value),
        QuestionType::Section | QuestionType::PageBreak => Ok(Value::Null),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_text(value: &Value) -> Result<Value, FieldError> {
    scalar_string(value)
        .map(Value::String)
        .ok_or_else(|| FieldError::new(FieldErrorKind::PatternMismatch, "expected a text value"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ().-]{5,}$").expect("static regex"))
}

fn coerce_email(value: &Value) -> Result<Value, FieldError> {
    let text = scalar_string(value)
        .ok_or_else(|| FieldError::new(FieldErrorKind::PatternMismatch, "expected a text value"))?;
    if !email_regex().is_match(text.trim()) {
        return Err(FieldError::new(FieldErrorKind::PatternMismatch, "not a valid email address"));
    }
    Ok(Value::String(text.trim().to_string()))
}

fn coerce_phone(value: &Value) -> Result<Value, FieldError> {
    let text = scalar_string(value)
        .ok_or_else(|| FieldError::new(FieldErrorKind::PatternMismatch, "expected a text value"))?;
    if !phone_regex().is_match(text.trim()) {
        return Err(FieldError::new(FieldErrorKind::PatternMismatch, "not a valid phone number"));
    }
    Ok(Value::String(text.trim().to_string()))
}

fn coerce_number(value: &Value) -> Result<Value, FieldError> {
    if let Value::Number(_) = value {
        return Ok(value.clone());
    }
    let parsed = value
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite());
    match parsed.and_then(serde_json::Number::from_f64) {
        Some(n) => Ok(Value::Number(n)),
        None => Err(FieldError::new(FieldErrorKind::PatternMismatch, "expected a numeric value")),
    }
}

fn coerce_temporal(
    value: &Value,
    parses: impl Fn(&str) -> bool,
    message: &str,
) -> Result<Value, FieldError> {
    let text = value
        .as_str()
        .ok_or_else(|| FieldError::new(FieldErrorKind::PatternMismatch, message))?;
    if !parses(text.trim()) {
        return Err(FieldError::new(FieldErrorKind::PatternMismatch, message));
    }
    Ok(Value::String(text.trim().to_string()))
}

fn coerce_single_option(question: &QuestionSpec, value: &Value) -> Result<Value, FieldError> {
    let chosen = scalar_string(value).ok_or_else(invalid_option)?;
    if !question.options.iter().any(|o| o.value == chosen) {
        return Err(invalid_option());
    }
    Ok(Value::String(chosen))
}

fn coerce_multi_option(question: &QuestionSpec, value: &Value) -> Result<Value, FieldError> {
    // A lone scalar is accepted as a single selection.
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut chosen = Vec::with_capacity(items.len());
    for item in &items {
        let selection = scalar_string(item).ok_or_else(invalid_option)?;
        if !question.options.iter().any(|o| o.value == selection) {
            return Err(invalid_option());
        }
        chosen.push(Value::String(selection));
    }
    Ok(Value::Array(chosen))
}

fn invalid_option() -> FieldError {
    FieldError::new(FieldErrorKind::InvalidOptionValue, "answer is not one of the available options")
}

fn coerce_file(value: &Value) -> Result<Value, FieldError> {
    match value {
        Value::String(_) | Value::Object(_) => Ok(value.clone()),
        _ => Err(FieldError::new(FieldErrorKind::PatternMismatch, "expected a file descriptor")),
    }
}

// ---------------------------------------------------------------------------
// Rule validation
// ---------------------------------------------------------------------------

fn validate_rules(question: &QuestionSpec, value: &Value) -> Result<(), FieldError> {
    let Some(rules) = &question.validation else {
        return Ok(());
    };

    if let Value::String(text) = value {
        let length = text.chars().count() as u32;
        if let Some(min) = rules.min_length {
            if length < min {
                return Err(FieldError::new(
                    FieldErrorKind::LengthViolation,
                    format!("must be at least {min} characters"),
                ));
            }
        }
        if let Some(max) = rules.max_length {
            if length > max {
                return Err(FieldError::new(
                    FieldErrorKind::LengthViolation,
                    format!("must be at most {max} characters"),
                ));
            }
        }
        if let Some(pattern) = &rules.pattern {
            // Patterns are vetted at edit time; a compile failure here means
            // the rule is simply unenforceable.
            if let Ok(re) = Regex::new(pattern) {
                if !re.is_match(text) {
                    return Err(FieldError::new(
                        FieldErrorKind::PatternMismatch,
                        "does not match the expected format",
                    ));
                }
            }
        }
    }

    if let Value::Number(n) = value {
        let numeric = n.as_f64().unwrap_or(0.0);
        if let Some(min) = rules.min {
            if numeric < min {
                return Err(FieldError::new(
                    FieldErrorKind::OutOfRange,
                    format!("must be at least {min}"),
                ));
            }
        }
        if let Some(max) = rules.max {
            if numeric > max {
                return Err(FieldError::new(
                    FieldErrorKind::OutOfRange,
                    format!("must be at most {max}"),
                ));
            }
        }
    }

    Ok(())
}
