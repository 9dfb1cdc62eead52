//! Response rollups.
//!
//! Pure functions over submitted responses. Every computation here is a
//! fold of counts, sums, mins and maxes, so results do not depend on the
//! order responses arrive in. Empty input yields zeros and empty vectors,
//! never NaN and never an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::form::FormDefinition;
use crate::response::{Response, ResponseStatus};

/// Rollup stats for one form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormAnalytics {
    pub total_responses: u64,
    pub average_time_secs: f64,
    pub first_submission: Option<DateTime<Utc>>,
    pub last_submission: Option<DateTime<Utc>>,
}

/// How far a single response got through the form, as a whole percentage.
/// Null, empty and skipped answers do not count as progress.
pub fn completion_percentage(response: &Response, total_questions: usize) -> u8 {
    if total_questions == 0 {
        return 0;
    }
    let answered = response.answered_count().min(total_questions);
    (100.0 * answered as f64 / total_questions as f64).round() as u8
}

pub fn form_analytics(responses: &[Response]) -> FormAnalytics {
    let mut total = 0u64;
    let mut time_sum = 0u64;
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;

    for response in submitted(responses) {
        total += 1;
        time_sum += response.timing.total_time_secs;
        let at = response.timing.submitted_at;
        first = Some(first.map_or(at, |f| f.min(at)));
        last = Some(last.map_or(at, |l| l.max(at)));
    }

    FormAnalytics {
        total_responses: total,
        average_time_secs: if total == 0 { 0.0 } else { time_sum as f64 / total as f64 },
        first_submission: first,
        last_submission: last,
    }
}

/// Calendar bucket for [`time_series`]. Days and months are resolved
/// against UTC, never the ambient timezone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    #[default]
    Day,
    Month,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub count: u64,
}

/// Submission counts per bucket, ascending, sparse: buckets with zero
/// submissions are omitted, not synthesized.
pub fn time_series(responses: &[Response], bucket: TimeBucket) -> Vec<TimeSeriesPoint> {
    let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for response in submitted(responses) {
        let day = response.timing.submitted_at.date_naive();
        let key = match bucket {
            TimeBucket::Day => day,
            TimeBucket::Month => day.with_day(1).unwrap_or(day),
        };
        *buckets.entry(key).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(date, count)| TimeSeriesPoint { date, count })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRanking {
    pub form_id: String,
    pub title: String,
    pub response_count: u64,
}

/// Forms ranked by submitted-response count, descending. Ties are broken
/// by form id ascending so the ranking is deterministic.
pub fn top_forms(forms: &[FormDefinition], responses: &[Response], limit: usize) -> Vec<FormRanking> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for response in submitted(responses) {
        *counts.entry(response.form_id.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<FormRanking> = forms
        .iter()
        .map(|form| FormRanking {
            form_id: form.id().to_string(),
            title: form.title().to_string(),
            response_count: counts.get(form.id()).copied().unwrap_or(0),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.response_count
            .cmp(&a.response_count)
            .then_with(|| a.form_id.cmp(&b.form_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Per-question stats across responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub total_answers: u64,
    pub average_time_spent_secs: f64,
    /// Selection counts for option-based questions, keyed by option value.
    pub value_counts: BTreeMap<String, u64>,
}

/// Stats per distinct question id actually seen in the responses. A
/// question nobody ever answered is absent from the map, not zero-filled.
pub fn question_analytics(responses: &[Response]) -> BTreeMap<String, QuestionStats> {
    struct Accumulator {
        answers: u64,
        time_sum: u64,
        timed: u64,
        value_counts: BTreeMap<String, u64>,
    }
    let mut per_question: BTreeMap<String, Accumulator> = BTreeMap::new();

    for response in submitted(responses) {
        for answer in &response.answers {
            if answer.metadata.skipped || crate::answer::is_empty_value(&answer.value) {
                continue;
            }
            let acc = per_question.entry(answer.question_id.clone()).or_insert(Accumulator {
                answers: 0,
                time_sum: 0,
                timed: 0,
                value_counts: BTreeMap::new(),
            });
            acc.answers += 1;
            if let Some(spent) = answer.metadata.time_spent_secs {
                acc.time_sum += u64::from(spent);
                acc.timed += 1;
            }
            if answer.question_type.is_option_based() {
                match &answer.value {
                    serde_json::Value::Array(items) => {
                        for item in items {
                            if let Some(v) = item.as_str() {
                                *acc.value_counts.entry(v.to_string()).or_insert(0) += 1;
                            }
                        }
                    }
                    serde_json::Value::String(v) => {
                        *acc.value_counts.entry(v.clone()).or_insert(0) += 1;
                    }
                    _ => {}
                }
            }
        }
    }

    per_question
        .into_iter()
        .map(|(id, acc)| {
            let average = if acc.timed == 0 { 0.0 } else { acc.time_sum as f64 / acc.timed as f64 };
            (
                id,
                QuestionStats {
                    total_answers: acc.answers,
                    average_time_spent_secs: average,
                    value_counts: acc.value_counts,
                },
            )
        })
        .collect()
}

fn submitted(responses: &[Response]) -> impl Iterator<Item = &Response> {
    responses.iter().filter(|r| r.status == ResponseStatus::Submitted)
}
