//! Respondent responses.
//!
//! A response owns its answers outright and references its form only by id.
//! Form title, type name and per-answer question titles are snapshotted at
//! submission time so the record survives later form edits or deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::Answer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub form_id: String,
    pub form_title: String,
    pub form_type_name: Option<String>,
    pub respondent_email: Option<String>,
    pub respondent_name: Option<String>,
    pub is_anonymous: bool,
    pub answers: Vec<Answer>,
    pub status: ResponseStatus,
    pub timing: ResponseTiming,
    pub client: ClientInfo,
    /// Review markers (spam, starred, ...), independent of status.
    pub flags: Vec<String>,
}

/// Only `Submitted` responses count toward analytics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    Draft,
    Submitted,
    Incomplete,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseTiming {
    /// Client-supplied and therefore advisory.
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    /// Computed once at submission; clamped so it is never negative.
    pub total_time_secs: u64,
}

impl ResponseTiming {
    pub fn at_submission(started_at: Option<DateTime<Utc>>, submitted_at: DateTime<Utc>) -> Self {
        let started_at = started_at.unwrap_or(submitted_at);
        let total_time_secs = (submitted_at - started_at).num_seconds().max(0) as u64;
        Self { started_at, submitted_at, total_time_secs }
    }
}

/// Transport-level metadata captured alongside a submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl Response {
    /// Answers that actually carry a value (non-null, non-empty, not skipped).
    pub fn answered_count(&self) -> usize {
        self.answers
            .iter()
            .filter(|a| !a.metadata.skipped && !crate::answer::is_empty_value(&a.value))
            .count()
    }
}
