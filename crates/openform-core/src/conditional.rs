//! Conditional visibility evaluation.
//!
//! A question with no conditional is always active. A conditional whose
//! dependency has not been answered leaves the question inactive; that is
//! normal flow, not an error. Because dependencies always point at strictly
//! earlier questions, one pass over the form in order is enough.

use std::collections::HashMap;

use serde_json::Value;

use crate::question::{ConditionalOperator, QuestionSpec};

/// Decide whether `question` is visible given the answers collected so far.
///
/// `answers_so_far` maps question ids to canonical answer values.
pub fn is_active(question: &QuestionSpec, answers_so_far: &HashMap<String, Value>) -> bool {
    let Some(rule) = &question.conditional else {
        return true;
    };
    let Some(answer) = answers_so_far.get(&rule.depends_on) else {
        return false;
    };

    match rule.condition {
        ConditionalOperator::Equals => loosely_equal(answer, &rule.value),
        ConditionalOperator::NotEquals => !loosely_equal(answer, &rule.value),
        ConditionalOperator::Contains => contains(answer, &rule.value),
        ConditionalOperator::GreaterThan => numeric_compare(answer, &rule.value, |a, b| a > b),
        ConditionalOperator::LessThan => numeric_compare(answer, &rule.value, |a, b| a < b),
    }
}

/// Equality across the value shapes a widget may send: exact JSON equality,
/// falling back to scalar string projection so `5` matches `"5"`.
fn loosely_equal(answer: &Value, expected: &Value) -> bool {
    if answer == expected {
        return true;
    }
    match (scalar_text(answer), scalar_text(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn contains(answer: &Value, expected: &Value) -> bool {
    match answer {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::String(text) => expected.as_str().is_some_and(|needle| text.contains(needle)),
        _ => false,
    }
}

/// Numeric comparison with coercion. Anything that cannot be read as a
/// number fails soft to `false`.
fn numeric_compare(answer: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(answer), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
