//! OpenForm Builder Platform
//!
//! Self-hosted form builder engine replacing Typeform, JotForm, Google Forms.
//!
//! ## Features
//! - Schema-driven forms over sixteen question kinds
//! - Conditional question visibility
//! - Answer normalization into a canonical semi-structured store
//! - Completion, per-question and time-series analytics
//! - Exact submission limits under concurrent submitters

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub mod analytics;
pub mod answer;
pub mod conditional;
pub mod form;
pub mod ports;
pub mod question;
pub mod response;
pub mod store;
pub mod submission;

pub use analytics::{
    completion_percentage, form_analytics, question_analytics, time_series, top_forms,
    FormAnalytics, FormRanking, QuestionStats, TimeBucket, TimeSeriesPoint,
};
pub use answer::{normalize, Answer, AnswerMetadata, FieldError, FieldErrorKind, RawAnswer};
pub use conditional::is_active;
pub use form::{
    generate_link_token, FormDefinition, FormEvent, FormSettings, FormStatus, PublicFormView,
};
pub use ports::{
    DeletePolicy, FormRepository, RepositoryError, ResponseRepository, SlotReservation,
};
pub use question::{
    ConditionalOperator, ConditionalRule, QuestionOption, QuestionSettings, QuestionSpec,
    QuestionType, TypeProfile, ValidationRules,
};
pub use response::{ClientInfo, Response, ResponseStatus, ResponseTiming};
pub use store::{InMemoryFormStore, InMemoryResponseStore};
pub use submission::{ClientMeta, SubmissionGateway, SubmissionReceipt};

/// Forms error taxonomy.
#[derive(Debug, Error)]
pub enum FormsError {
    /// Batched, recoverable: every failing question reported together.
    #[error("validation failed for {} question(s)", field_errors.len())]
    Validation { field_errors: BTreeMap<String, FieldError> },

    /// Lifecycle violation, e.g. editing a closed form.
    #[error("invalid form state: {0}")]
    InvalidState(String),

    /// A conditional points forward, at itself, or at a missing question.
    #[error("conditional on question {question_id} must reference an existing earlier question (got {depends_on})")]
    ConditionalReference { question_id: String, depends_on: String },

    /// Malformed question schema, rejected before persistence.
    #[error("invalid question spec {question_id}: {reason}")]
    InvalidQuestionSpec { question_id: String, reason: String },

    #[error("form not found")]
    NotFound,

    /// Expired, full or unpublished; distinct from NotFound.
    #[error("form is not accepting submissions: {0}")]
    FormNotAcceptingSubmissions(String),

    /// Lost the submission-limit race; treat as form-full, not as a
    /// retry signal.
    #[error("submission limit reached concurrently")]
    Concurrency,

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, FormsError>;

/// The assembled engine: in-memory stores, the submission gateway and the
/// analytics refresh path behind one facade.
pub struct FormsPlatform {
    forms: Arc<InMemoryFormStore>,
    responses: Arc<InMemoryResponseStore>,
    gateway: SubmissionGateway,
}

impl FormsPlatform {
    pub fn new() -> Self {
        let forms = Arc::new(InMemoryFormStore::new());
        let responses = Arc::new(InMemoryResponseStore::new());
        let gateway = SubmissionGateway::new(forms.clone(), responses.clone());
        Self { forms, responses, gateway }
    }

    // =========================================================================
    // Admin side
    // =========================================================================

    pub async fn create_form(
        &self,
        title: impl Into<String>,
        questions: Vec<QuestionSpec>,
    ) -> Result<FormDefinition> {
        let form = FormDefinition::create(title, questions)?;
        self.forms.save(&form).await?;
        tracing::info!(form_id = %form.id(), "form created");
        Ok(form)
    }

    pub async fn get_form(&self, form_id: &str) -> Result<FormDefinition> {
        self.load(form_id).await
    }

    /// Publish a form and return its shareable link. The first publish
    /// claims a globally unique link token, retrying on collision; every
    /// later call returns the same link.
    pub async fn publish_form(&self, form_id: &str) -> Result<String> {
        let mut form = self.load(form_id).await?;
        if matches!(form.status(), FormStatus::Closed | FormStatus::Archived) {
            return Err(FormsError::InvalidState(format!(
                "cannot publish a {:?} form",
                form.status()
            )));
        }
        let token = match form.shareable_link() {
            Some(link) => link.to_string(),
            None => loop {
                let candidate = generate_link_token();
                if self.forms.claim_link(&candidate, form_id).await? {
                    break candidate;
                }
            },
        };
        let link = form.publish(&token)?.to_string();
        self.drain_events(&mut form);
        self.forms.save(&form).await?;
        Ok(link)
    }

    pub async fn edit_form_questions(
        &self,
        form_id: &str,
        questions: Vec<QuestionSpec>,
    ) -> Result<FormDefinition> {
        let mut form = self.load(form_id).await?;
        form.edit_questions(questions)?;
        self.forms.save(&form).await?;
        Ok(form)
    }

    pub async fn update_form_settings(&self, form_id: &str, settings: FormSettings) -> Result<()> {
        let mut form = self.load(form_id).await?;
        form.update_settings(settings)?;
        Ok(self.forms.save(&form).await?)
    }

    pub async fn close_form(&self, form_id: &str) -> Result<()> {
        let mut form = self.load(form_id).await?;
        form.close()?;
        self.drain_events(&mut form);
        Ok(self.forms.save(&form).await?)
    }

    pub async fn archive_form(&self, form_id: &str) -> Result<()> {
        let mut form = self.load(form_id).await?;
        form.archive();
        self.drain_events(&mut form);
        Ok(self.forms.save(&form).await?)
    }

    /// Delete a form. The caller must say what happens to its responses.
    pub async fn delete_form(&self, form_id: &str, policy: DeletePolicy) -> Result<()> {
        match self.forms.delete(form_id).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound) => return Err(FormsError::NotFound),
            Err(error) => return Err(error.into()),
        }
        if policy == DeletePolicy::Cascade {
            self.responses.delete_by_form(form_id).await?;
        }
        tracing::info!(%form_id, %policy, "form deleted");
        Ok(())
    }

    // =========================================================================
    // Public side
    // =========================================================================

    /// Resolve a shareable link to the submitter-safe view of its form.
    pub async fn public_view(&self, link: &str) -> Result<PublicFormView> {
        let form = self
            .forms
            .find_by_link(link)
            .await?
            .ok_or(FormsError::NotFound)?;
        Ok(form.to_public_view())
    }

    pub async fn submit(
        &self,
        form_id: &str,
        answers: Vec<RawAnswer>,
        meta: ClientMeta,
    ) -> Result<SubmissionReceipt> {
        self.gateway.submit(form_id, answers, meta).await
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Recompute a form's rollup stats and write them into the form's
    /// denormalized cache. This is the cache's only writer.
    pub async fn refresh_analytics(&self, form_id: &str) -> Result<FormAnalytics> {
        let mut form = self.load(form_id).await?;
        let responses = self.responses.find_by_form(form_id).await?;
        let stats = form_analytics(&responses);
        form.set_analytics(stats.clone(), chrono::Utc::now());
        self.forms.save(&form).await?;
        Ok(stats)
    }

    pub async fn form_time_series(
        &self,
        form_id: &str,
        bucket: TimeBucket,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let responses = self.responses.find_by_form(form_id).await?;
        Ok(time_series(&responses, bucket))
    }

    pub async fn question_breakdown(
        &self,
        form_id: &str,
    ) -> Result<BTreeMap<String, QuestionStats>> {
        let responses = self.responses.find_by_form(form_id).await?;
        Ok(question_analytics(&responses))
    }

    pub async fn top_forms(&self, limit: usize) -> Result<Vec<FormRanking>> {
        let forms = self.forms.list().await?;
        let responses = self.responses.list().await?;
        Ok(top_forms(&forms, &responses, limit))
    }

    /// How far one stored response got through its form.
    pub async fn completion(&self, response_id: &str) -> Result<u8> {
        let response = self
            .responses
            .find_by_id(response_id)
            .await?
            .ok_or(FormsError::NotFound)?;
        let form = self.load(&response.form_id).await?;
        Ok(completion_percentage(&response, form.answerable_question_count()))
    }

    pub async fn responses_for(&self, form_id: &str) -> Result<Vec<Response>> {
        Ok(self.responses.find_by_form(form_id).await?)
    }

    fn drain_events(&self, form: &mut FormDefinition) {
        for event in form.take_events() {
            match event {
                FormEvent::Published { form_id, shareable_link } => {
                    tracing::info!(%form_id, %shareable_link, "form published");
                }
                FormEvent::Closed { form_id } => tracing::info!(%form_id, "form closed"),
                FormEvent::Archived { form_id } => tracing::info!(%form_id, "form archived"),
            }
        }
    }

    async fn load(&self, form_id: &str) -> Result<FormDefinition> {
        self.forms
            .find_by_id(form_id)
            .await?
            .ok_or(FormsError::NotFound)
    }
}

impl Default for FormsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey_questions() -> Vec<QuestionSpec> {
        let mut q1 = QuestionSpec::new("q1", QuestionType::SingleChoice, "Happy?");
        q1.required = true;
        q1.options = vec![
            QuestionOption { id: "yes".into(), label: "Yes".into(), value: "yes".into() },
            QuestionOption { id: "no".into(), label: "No".into(), value: "no".into() },
        ];
        let mut q2 = QuestionSpec::new("q2", QuestionType::LongText, "Tell us more");
        q2.order = 1;
        q2.conditional = Some(ConditionalRule {
            depends_on: "q1".into(),
            condition: ConditionalOperator::Equals,
            value: json!("no"),
        });
        vec![q1, q2]
    }

    #[tokio::test]
    async fn test_publish_is_idempotent_across_calls() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();

        let first = platform.publish_form(form.id()).await.unwrap();
        let second = platform.publish_form(form.id()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
    }

    #[tokio::test]
    async fn test_end_to_end_submission_and_analytics() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();
        let link = platform.publish_form(form.id()).await.unwrap();

        let view = platform.public_view(&link).await.unwrap();
        assert_eq!(view.id, form.id());
        assert_eq!(view.questions.len(), 2);

        let receipt = platform
            .submit(form.id(), vec![RawAnswer::new("q1", json!("yes"))], ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(platform.completion(&receipt.response_id).await.unwrap(), 50);

        let stats = platform.refresh_analytics(form.id()).await.unwrap();
        assert_eq!(stats.total_responses, 1);
        assert!(stats.first_submission.is_some());
        let cached = platform.get_form(form.id()).await.unwrap();
        assert_eq!(cached.analytics().stats, stats);

        let series = platform.form_time_series(form.id(), TimeBucket::Day).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].count, 1);

        let breakdown = platform.question_breakdown(form.id()).await.unwrap();
        assert_eq!(breakdown["q1"].total_answers, 1);
        assert_eq!(breakdown["q1"].value_counts["yes"], 1);
        assert!(!breakdown.contains_key("q2"));
    }

    #[tokio::test]
    async fn test_edit_rejects_broken_conditional_ordering() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();

        // Move the dependency after its dependent.
        let mut reordered = survey_questions();
        reordered[0].order = 5;
        reordered[1].order = 0;
        let result = platform.edit_form_questions(form.id(), reordered).await;
        assert!(matches!(result, Err(FormsError::ConditionalReference { .. })));
    }

    #[tokio::test]
    async fn test_delete_with_retain_keeps_response_snapshots() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();
        platform.publish_form(form.id()).await.unwrap();
        let receipt = platform
            .submit(form.id(), vec![RawAnswer::new("q1", json!("yes"))], ClientMeta::default())
            .await
            .unwrap();

        platform.delete_form(form.id(), DeletePolicy::Retain).await.unwrap();
        assert!(matches!(platform.get_form(form.id()).await, Err(FormsError::NotFound)));

        let orphans = platform.responses_for(form.id()).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, receipt.response_id);
        assert_eq!(orphans[0].form_title, "Survey");
        assert_eq!(orphans[0].answers[0].question_title, "Happy?");
    }

    #[tokio::test]
    async fn test_delete_with_cascade_removes_responses() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();
        platform.publish_form(form.id()).await.unwrap();
        platform
            .submit(form.id(), vec![RawAnswer::new("q1", json!("yes"))], ClientMeta::default())
            .await
            .unwrap();

        platform.delete_form(form.id(), DeletePolicy::Cascade).await.unwrap();
        assert!(platform.responses_for(form.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_form_rejects_edits_and_submissions() {
        let platform = FormsPlatform::new();
        let form = platform.create_form("Survey", survey_questions()).await.unwrap();
        platform.publish_form(form.id()).await.unwrap();
        platform.close_form(form.id()).await.unwrap();

        assert!(matches!(
            platform.edit_form_questions(form.id(), survey_questions()).await,
            Err(FormsError::InvalidState(_))
        ));
        assert!(matches!(
            platform
                .submit(form.id(), vec![RawAnswer::new("q1", json!("yes"))], ClientMeta::default())
                .await,
            Err(FormsError::FormNotAcceptingSubmissions(_))
        ));
    }
}
