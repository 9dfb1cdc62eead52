//! Submission gateway.
//!
//! Orchestrates one submission: Received → Validated → Normalized →
//! Persisted, or Rejected at any step. Validation failures are collected
//! per question and reject the whole submission atomically; nothing is
//! persisted and the submission counter never moves.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answer::{normalize, Answer, RawAnswer};
use crate::conditional::is_active;
use crate::form::FormDefinition;
use crate::ports::{FormRepository, ResponseRepository, SlotReservation};
use crate::response::{ClientInfo, Response, ResponseStatus, ResponseTiming};
use crate::{FormsError, Result};

/// Metadata the widget sends along with the answers. `started_at` is
/// client-supplied and therefore advisory, not security-relevant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    pub started_at: Option<DateTime<Utc>>,
    pub respondent_email: Option<String>,
    pub respondent_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// Success body of the widget-submission endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub response_id: String,
}

pub struct SubmissionGateway {
    forms: Arc<dyn FormRepository>,
    responses: Arc<dyn ResponseRepository>,
}

impl SubmissionGateway {
    pub fn new(forms: Arc<dyn FormRepository>, responses: Arc<dyn ResponseRepository>) -> Self {
        Self { forms, responses }
    }

    /// Validate and persist one submission.
    ///
    /// Returns the new response id, or [`FormsError::Validation`] carrying
    /// every field failure keyed by question id.
    pub async fn submit(
        &self,
        form_id: &str,
        answers: Vec<RawAnswer>,
        meta: ClientMeta,
    ) -> Result<SubmissionReceipt> {
        let form = self
            .forms
            .find_by_id(form_id)
            .await?
            .ok_or(FormsError::NotFound)?;
        let now = Utc::now();
        let current = self.forms.submission_count(form_id).await?;
        if let Some(reason) = form.rejection_reason(now, current) {
            tracing::debug!(form_id, reason, "submission turned away");
            return Err(FormsError::FormNotAcceptingSubmissions(reason.into()));
        }

        let response = match self.validate_and_normalize(&form, &answers, &meta, now) {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(form_id, "submission rejected by validation");
                return Err(error);
            }
        };

        // Reserve a slot with an atomic conditional increment; losing the
        // race at this point means the form filled up underneath us.
        match self
            .forms
            .try_reserve_submission(form_id, form.settings().submission_limit)
            .await?
        {
            SlotReservation::LimitReached => {
                tracing::debug!(form_id, "submission lost the limit race");
                return Err(FormsError::Concurrency);
            }
            SlotReservation::Reserved { count } => {
                if let Err(error) = self.responses.save(&response).await {
                    self.forms.release_submission(form_id).await.ok();
                    return Err(error.into());
                }
                tracing::info!(
                    form_id,
                    response_id = %response.id,
                    total_submissions = count,
                    "submission persisted"
                );
            }
        }

        Ok(SubmissionReceipt { response_id: response.id })
    }

    fn validate_and_normalize(
        &self,
        form: &FormDefinition,
        answers: &[RawAnswer],
        meta: &ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<Response> {
        let raw_by_id: HashMap<&str, &RawAnswer> =
            answers.iter().map(|a| (a.question_id.as_str(), a)).collect();

        let mut answered: HashMap<String, Value> = HashMap::new();
        let mut normalized: Vec<Answer> = Vec::new();
        let mut field_errors = BTreeMap::new();

        for question in form.questions() {
            if question.question_type.is_container_only() {
                continue;
            }
            // An inactive question skips validation entirely, required or
            // not; a value submitted for it is discarded.
            if !is_active(question, &answered) {
                continue;
            }
            match normalize(question, raw_by_id.get(question.id.as_str()).copied()) {
                Ok(answer) => {
                    if !answer.metadata.skipped {
                        answered.insert(answer.question_id.clone(), answer.value.clone());
                    }
                    normalized.push(answer);
                }
                Err(error) => {
                    field_errors.insert(question.id.clone(), error);
                }
            }
        }

        if !field_errors.is_empty() {
            return Err(FormsError::Validation { field_errors });
        }

        let (respondent_email, respondent_name) = if form.settings().is_anonymous {
            (None, None)
        } else {
            (meta.respondent_email.clone(), meta.respondent_name.clone())
        };

        Ok(Response {
            id: uuid::Uuid::new_v4().to_string(),
            form_id: form.id().to_string(),
            form_title: form.title().to_string(),
            form_type_name: form.form_type_name().map(str::to_string),
            respondent_email,
            respondent_name,
            is_anonymous: form.settings().is_anonymous,
            answers: normalized,
            status: ResponseStatus::Submitted,
            timing: ResponseTiming::at_submission(meta.started_at, now),
            client: ClientInfo {
                ip_address: meta.ip_address.clone(),
                user_agent: meta.user_agent.clone(),
                referrer: meta.referrer.clone(),
            },
            flags: vec![],
        })
    }
}
