//! Question specifications and the type registry.
//!
//! Every question a form carries is a [`QuestionSpec`]. The sixteen question
//! kinds share a single [`TypeProfile`] lookup table so that validation,
//! option requirements and container rules live in one place.

use serde::{Deserialize, Serialize};

use crate::{FormsError, Result};

/// The sixteen supported question kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    ShortText,
    LongText,
    Email,
    Phone,
    Number,
    Date,
    Time,
    DateTime,
    SingleChoice,
    MultipleChoice,
    Dropdown,
    Rating,
    Scale,
    FileUpload,
    Section,
    PageBreak,
}

impl QuestionType {
    /// Shape contract for this question kind.
    pub fn profile(self) -> TypeProfile {
        match self {
            Self::ShortText => TypeProfile::text(),
            Self::LongText => TypeProfile::text(),
            Self::Email => TypeProfile::text(),
            Self::Phone => TypeProfile::text(),
            Self::Number => TypeProfile::numeric(),
            Self::Date => TypeProfile::temporal(),
            Self::Time => TypeProfile::temporal(),
            Self::DateTime => TypeProfile::temporal(),
            Self::SingleChoice => TypeProfile::option_based(false),
            Self::MultipleChoice => TypeProfile::option_based(true),
            Self::Dropdown => TypeProfile::option_based(false),
            Self::Rating => TypeProfile::numeric(),
            Self::Scale => TypeProfile::numeric(),
            Self::FileUpload => TypeProfile::opaque(),
            Self::Section => TypeProfile::container(),
            Self::PageBreak => TypeProfile::container(),
        }
    }

    /// Whether answers must come from the question's option list.
    pub fn is_option_based(self) -> bool {
        self.profile().requires_options
    }

    /// Section and page breaks structure the form but never carry answers.
    pub fn is_container_only(self) -> bool {
        self.profile().container_only
    }
}

/// Per-type shape contract: which options and validation rules apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeProfile {
    /// The question must carry at least one option.
    pub requires_options: bool,
    /// Answers are arrays of option values rather than a single value.
    pub multi_valued: bool,
    /// Structural element: never answered, never required, never validated.
    pub container_only: bool,
    /// `min_length` / `max_length` / `pattern` rules apply.
    pub length_rules: bool,
    /// `min` / `max` rules apply.
    pub range_rules: bool,
}

impl TypeProfile {
    fn text() -> Self {
        Self { requires_options: false, multi_valued: false, container_only: false, length_rules: true, range_rules: false }
    }

    fn numeric() -> Self {
        Self { requires_options: false, multi_valued: false, container_only: false, length_rules: false, range_rules: true }
    }

    fn temporal() -> Self {
        Self { requires_options: false, multi_valued: false, container_only: false, length_rules: false, range_rules: false }
    }

    fn option_based(multi: bool) -> Self {
        Self { requires_options: true, multi_valued: multi, container_only: false, length_rules: false, range_rules: false }
    }

    fn opaque() -> Self {
        Self { requires_options: false, multi_valued: false, container_only: false, length_rules: false, range_rules: false }
    }

    fn container() -> Self {
        Self { requires_options: false, multi_valued: false, container_only: true, length_rules: false, range_rules: false }
    }
}

/// One selectable option of an option-based question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

/// Validation rules attached to a question.
///
/// Only the rules applicable to the question's [`TypeProfile`] may be set;
/// anything else is rejected at edit time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
    pub custom_message: Option<String>,
}

/// Presentation-only settings. Never consulted during validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionSettings {
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub rows: Option<u32>,
}

/// Visibility rule tying a question to an earlier answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub depends_on: String,
    pub condition: ConditionalOperator,
    pub value: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}

/// One field definition inside a form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Stable id, unique per form. Empty ids are assigned on create/edit.
    pub id: String,
    pub question_type: QuestionType,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    /// Sequence position. Ties are broken by array position.
    pub order: u32,
    pub options: Vec<QuestionOption>,
    pub validation: Option<ValidationRules>,
    pub settings: QuestionSettings,
    pub conditional: Option<ConditionalRule>,
}

impl QuestionSpec {
    pub fn new(id: impl Into<String>, question_type: QuestionType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question_type,
            title: title.into(),
            description: None,
            required: false,
            order: 0,
            options: vec![],
            validation: None,
            settings: QuestionSettings::default(),
            conditional: None,
        }
    }
}

/// Assign missing ids, then settle sequence: stable-sort by `order` (array
/// position breaks ties) and reindex so orders are unique and increasing.
pub fn normalize_questions(mut questions: Vec<QuestionSpec>) -> Vec<QuestionSpec> {
    for question in &mut questions {
        if question.id.is_empty() {
            question.id = uuid::Uuid::new_v4().to_string();
        }
    }
    questions.sort_by_key(|q| q.order);
    for (index, question) in questions.iter_mut().enumerate() {
        question.order = index as u32;
    }
    questions
}

/// Validate a normalized question list against the registry.
///
/// Checks id uniqueness, option requirements, container rules, rule
/// applicability and conditional references. Conditionals must point at an
/// existing, strictly earlier-ordered question.
pub fn validate_questions(questions: &[QuestionSpec]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            return Err(FormsError::InvalidQuestionSpec {
                question_id: question.id.clone(),
                reason: "duplicate question id".into(),
            });
        }
        validate_spec(question)?;
    }

    for (index, question) in questions.iter().enumerate() {
        let Some(conditional) = &question.conditional else { continue };
        let target = questions
            .iter()
            .position(|q| q.id == conditional.depends_on)
            .ok_or_else(|| FormsError::ConditionalReference {
                question_id: question.id.clone(),
                depends_on: conditional.depends_on.clone(),
            })?;
        if target >= index {
            return Err(FormsError::ConditionalReference {
                question_id: question.id.clone(),
                depends_on: conditional.depends_on.clone(),
            });
        }
    }

    Ok(())
}

fn validate_spec(question: &QuestionSpec) -> Result<()> {
    let profile = question.question_type.profile();
    let invalid = |reason: &str| FormsError::InvalidQuestionSpec {
        question_id: question.id.clone(),
        reason: reason.into(),
    };

    if profile.requires_options && question.options.is_empty() {
        return Err(invalid("option-based question needs at least one option"));
    }
    if !profile.requires_options && !question.options.is_empty() {
        return Err(invalid("options are not applicable to this question type"));
    }

    if profile.container_only {
        if question.required {
            return Err(invalid("container question cannot be required"));
        }
        if question.validation.is_some() {
            return Err(invalid("container question cannot carry validation rules"));
        }
    }

    if let Some(rules) = &question.validation {
        let has_length = rules.min_length.is_some() || rules.max_length.is_some() || rules.pattern.is_some();
        let has_range = rules.min.is_some() || rules.max.is_some();
        if has_length && !profile.length_rules {
            return Err(invalid("length/pattern rules are not applicable to this question type"));
        }
        if has_range && !profile.range_rules {
            return Err(invalid("min/max rules are not applicable to this question type"));
        }
        if let Some(pattern) = &rules.pattern {
            if regex::Regex::new(pattern).is_err() {
                return Err(invalid("pattern is not a valid regular expression"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio(id: &str) -> QuestionSpec {
        let mut q = QuestionSpec::new(id, QuestionType::SingleChoice, "Pick one");
        q.options = vec![
            QuestionOption { id: "o1".into(), label: "Yes".into(), value: "yes".into() },
            QuestionOption { id: "o2".into(), label: "No".into(), value: "no".into() },
        ];
        q
    }

    #[test]
    fn test_registry_option_based() {
        assert!(QuestionType::SingleChoice.is_option_based());
        assert!(QuestionType::MultipleChoice.is_option_based());
        assert!(QuestionType::Dropdown.is_option_based());
        assert!(!QuestionType::ShortText.is_option_based());
        assert!(QuestionType::MultipleChoice.profile().multi_valued);
        assert!(!QuestionType::Dropdown.profile().multi_valued);
    }

    #[test]
    fn test_registry_container_only() {
        assert!(QuestionType::Section.is_container_only());
        assert!(QuestionType::PageBreak.is_container_only());
        assert!(!QuestionType::FileUpload.is_container_only());
    }

    #[test]
    fn test_normalize_assigns_ids_and_orders() {
        let questions = normalize_questions(vec![
            QuestionSpec::new("", QuestionType::ShortText, "Name"),
            QuestionSpec::new("q2", QuestionType::ShortText, "City"),
        ]);
        assert!(!questions[0].id.is_empty());
        assert_eq!(questions[0].order, 0);
        assert_eq!(questions[1].order, 1);
    }

    #[test]
    fn test_normalize_breaks_order_ties_by_position() {
        let mut a = QuestionSpec::new("a", QuestionType::ShortText, "A");
        let mut b = QuestionSpec::new("b", QuestionType::ShortText, "B");
        a.order = 5;
        b.order = 5;
        let questions = normalize_questions(vec![a, b]);
        assert_eq!(questions[0].id, "a");
        assert_eq!(questions[1].id, "b");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let questions = vec![radio("q1"), radio("q1")];
        assert!(matches!(
            validate_questions(&questions),
            Err(FormsError::InvalidQuestionSpec { .. })
        ));
    }

    #[test]
    fn test_option_based_requires_options() {
        let bare = QuestionSpec::new("q1", QuestionType::Dropdown, "Pick");
        assert!(validate_questions(&[bare]).is_err());
    }

    #[test]
    fn test_container_cannot_be_required() {
        let mut section = QuestionSpec::new("s1", QuestionType::Section, "Details");
        section.required = true;
        assert!(validate_questions(&[section]).is_err());
    }

    #[test]
    fn test_inapplicable_rules_rejected() {
        let mut number = QuestionSpec::new("n1", QuestionType::Number, "Age");
        number.validation = Some(ValidationRules { pattern: Some("^a+$".into()), ..Default::default() });
        assert!(validate_questions(&[number]).is_err());
    }

    #[test]
    fn test_forward_conditional_rejected() {
        let mut dependent = QuestionSpec::new("q1", QuestionType::ShortText, "Why?");
        dependent.conditional = Some(ConditionalRule {
            depends_on: "q2".into(),
            condition: ConditionalOperator::Equals,
            value: serde_json::json!("yes"),
        });
        dependent.order = 0;
        let mut source = radio("q2");
        source.order = 1;

        let questions = normalize_questions(vec![dependent, source]);
        assert!(matches!(
            validate_questions(&questions),
            Err(FormsError::ConditionalReference { .. })
        ));
    }

    #[test]
    fn test_earlier_conditional_accepted() {
        let mut source = radio("q1");
        source.order = 0;
        let mut dependent = QuestionSpec::new("q2", QuestionType::ShortText, "Why?");
        dependent.order = 1;
        dependent.conditional = Some(ConditionalRule {
            depends_on: "q1".into(),
            condition: ConditionalOperator::Equals,
            value: serde_json::json!("yes"),
        });

        let questions = normalize_questions(vec![source, dependent]);
        assert!(validate_questions(&questions).is_ok());
    }

    #[test]
    fn test_unknown_type_rejected_at_parse() {
        let parsed: std::result::Result<QuestionType, _> = serde_json::from_str("\"hologram\"");
        assert!(parsed.is_err());
    }
}
