//! Form definition aggregate.
//!
//! Owns the ordered question schema, settings, publication lifecycle and
//! sharing state. Lifecycle is linear: Draft → Published → Closed →
//! Archived, with Archived terminal. The shareable link is a one-way
//! ratchet: generated once on first publish, identical ever after.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::analytics::FormAnalytics;
use crate::question::{normalize_questions, validate_questions, QuestionSpec};
use crate::{FormsError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Closed,
    Archived,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSettings {
    pub is_anonymous: bool,
    pub allow_multiple_submissions: bool,
    pub show_progress_bar: bool,
    pub shuffle_questions: bool,
    pub collect_email: bool,
    pub submission_limit: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSharing {
    pub shareable_link: Option<String>,
    pub embed_code: Option<String>,
}

/// Denormalized analytics, written only by the aggregator refresh path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsCache {
    pub stats: FormAnalytics,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Lifecycle notifications drained by the platform after each operation.
#[derive(Clone, Debug, PartialEq)]
pub enum FormEvent {
    Published { form_id: String, shareable_link: String },
    Closed { form_id: String },
    Archived { form_id: String },
}

/// The versioned, owned schema of a form, independent of any response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormDefinition {
    id: String,
    title: String,
    description: Option<String>,
    form_type_name: Option<String>,
    owner_id: Option<String>,
    status: FormStatus,
    questions: Vec<QuestionSpec>,
    settings: FormSettings,
    sharing: FormSharing,
    analytics: AnalyticsCache,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<FormEvent>,
}

impl FormDefinition {
    /// Create a draft form. Missing question ids are assigned and order
    /// defaults to array position.
    pub fn create(title: impl Into<String>, questions: Vec<QuestionSpec>) -> Result<Self> {
        let questions = normalize_questions(questions);
        validate_questions(&questions)?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            form_type_name: None,
            owner_id: None,
            status: FormStatus::Draft,
            questions,
            settings: FormSettings::default(),
            sharing: FormSharing::default(),
            analytics: AnalyticsCache::default(),
            version: 1,
            created_at: now,
            updated_at: now,
            published_at: None,
            events: vec![],
        })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn title(&self) -> &str { &self.title }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn form_type_name(&self) -> Option<&str> { self.form_type_name.as_deref() }
    pub fn owner_id(&self) -> Option<&str> { self.owner_id.as_deref() }
    pub fn status(&self) -> FormStatus { self.status }
    pub fn questions(&self) -> &[QuestionSpec] { &self.questions }
    pub fn settings(&self) -> &FormSettings { &self.settings }
    pub fn shareable_link(&self) -> Option<&str> { self.sharing.shareable_link.as_deref() }
    pub fn embed_code(&self) -> Option<&str> { self.sharing.embed_code.as_deref() }
    pub fn analytics(&self) -> &AnalyticsCache { &self.analytics }
    pub fn version(&self) -> u64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn published_at(&self) -> Option<DateTime<Utc>> { self.published_at }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
        self.bump();
    }

    pub fn set_form_type_name(&mut self, name: impl Into<String>) {
        self.form_type_name = Some(name.into());
        self.bump();
    }

    pub fn set_owner(&mut self, owner_id: impl Into<String>) {
        self.owner_id = Some(owner_id.into());
        self.bump();
    }

    pub fn update_settings(&mut self, settings: FormSettings) -> Result<()> {
        self.ensure_editable()?;
        self.settings = settings;
        self.bump();
        Ok(())
    }

    /// Publish the form. The first call installs `link_token` as the
    /// shareable link; later calls ignore the token and return the link
    /// already ratcheted in.
    pub fn publish(&mut self, link_token: &str) -> Result<&str> {
        match self.status {
            FormStatus::Closed | FormStatus::Archived => {
                return Err(FormsError::InvalidState(format!(
                    "cannot publish a {:?} form",
                    self.status
                )));
            }
            FormStatus::Published => {}
            FormStatus::Draft => {
                self.status = FormStatus::Published;
                self.published_at = Some(Utc::now());
            }
        }
        if self.sharing.shareable_link.is_none() {
            self.sharing.shareable_link = Some(link_token.to_string());
            self.sharing.embed_code = Some(embed_code_for(link_token));
            self.touch();
            self.events.push(FormEvent::Published {
                form_id: self.id.clone(),
                shareable_link: link_token.to_string(),
            });
        }
        // The ratchet guarantees the link is set from here on.
        Ok(self.sharing.shareable_link.as_deref().unwrap_or_default())
    }

    /// Replace the question schema. Conditional references are re-validated
    /// and the version is bumped.
    pub fn edit_questions(&mut self, questions: Vec<QuestionSpec>) -> Result<()> {
        self.ensure_editable()?;
        let questions = normalize_questions(questions);
        validate_questions(&questions)?;
        self.questions = questions;
        self.bump();
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.status == FormStatus::Archived {
            return Err(FormsError::InvalidState("cannot close an archived form".into()));
        }
        if self.status != FormStatus::Closed {
            self.status = FormStatus::Closed;
            self.touch();
            self.events.push(FormEvent::Closed { form_id: self.id.clone() });
        }
        Ok(())
    }

    /// Archive is terminal.
    pub fn archive(&mut self) {
        if self.status != FormStatus::Archived {
            self.status = FormStatus::Archived;
            self.touch();
            self.events.push(FormEvent::Archived { form_id: self.id.clone() });
        }
    }

    /// Whether a submission arriving at `now`, with `current_count`
    /// submissions already recorded, may proceed.
    pub fn accepts_submission(&self, now: DateTime<Utc>, current_count: u64) -> bool {
        self.rejection_reason(now, current_count).is_none()
    }

    /// The first reason a submission would be turned away, if any.
    pub fn rejection_reason(&self, now: DateTime<Utc>, current_count: u64) -> Option<&'static str> {
        if self.status != FormStatus::Published {
            return Some("form is not published");
        }
        if let Some(expires_at) = self.settings.expires_at {
            if now >= expires_at {
                return Some("form has expired");
            }
        }
        if let Some(limit) = self.settings.submission_limit {
            if current_count >= limit {
                return Some("form has reached its submission limit");
            }
        }
        None
    }

    /// Questions a respondent can actually answer (containers excluded).
    pub fn answerable_question_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| !q.question_type.is_container_only())
            .count()
    }

    /// The only shape exposed to unauthenticated submitters: no password,
    /// no sharing internals, no owner identity.
    pub fn to_public_view(&self) -> PublicFormView {
        PublicFormView {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            questions: self.questions.clone(),
            show_progress_bar: self.settings.show_progress_bar,
            shuffle_questions: self.settings.shuffle_questions,
            collect_email: self.settings.collect_email,
            is_anonymous: self.settings.is_anonymous,
            expires_at: self.settings.expires_at,
            password_protected: self.settings.password.is_some(),
        }
    }

    /// Refresh the denormalized analytics cache. Called only from the
    /// aggregator refresh path; does not bump the schema version.
    pub fn set_analytics(&mut self, stats: FormAnalytics, refreshed_at: DateTime<Utc>) {
        self.analytics = AnalyticsCache { stats, refreshed_at: Some(refreshed_at) };
    }

    pub fn take_events(&mut self) -> Vec<FormEvent> {
        std::mem::take(&mut self.events)
    }

    fn ensure_editable(&self) -> Result<()> {
        match self.status {
            FormStatus::Closed | FormStatus::Archived => Err(FormsError::InvalidState(format!(
                "cannot edit a {:?} form",
                self.status
            ))),
            _ => Ok(()),
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What an unauthenticated submitter is allowed to see.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicFormView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: FormStatus,
    pub questions: Vec<QuestionSpec>,
    pub show_progress_bar: bool,
    pub shuffle_questions: bool,
    pub collect_email: bool,
    pub is_anonymous: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_protected: bool,
}

/// Random opaque token for the public link. Uniqueness is enforced by the
/// store's link index; callers retry on collision.
pub fn generate_link_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

fn embed_code_for(link: &str) -> String {
    format!(
        r#"<script src="https://cdn.openform.dev/widget.js" data-openform="{}" async></script>"#,
        link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;
    use chrono::Duration;

    fn draft() -> FormDefinition {
        FormDefinition::create(
            "Feedback",
            vec![QuestionSpec::new("q1", QuestionType::ShortText, "Name")],
        )
        .unwrap()
    }

    #[test]
    fn test_create_starts_draft_with_version_one() {
        let form = draft();
        assert_eq!(form.status(), FormStatus::Draft);
        assert_eq!(form.version(), 1);
        assert!(form.shareable_link().is_none());
    }

    #[test]
    fn test_publish_twice_keeps_same_link() {
        let mut form = draft();
        let first = form.publish("tok-one").unwrap().to_string();
        let second = form.publish("tok-two").unwrap().to_string();
        assert_eq!(first, "tok-one");
        assert_eq!(first, second);
        assert!(form.embed_code().unwrap().contains("tok-one"));
    }

    #[test]
    fn test_publish_closed_form_fails() {
        let mut form = draft();
        form.close().unwrap();
        assert!(matches!(form.publish("tok"), Err(FormsError::InvalidState(_))));
    }

    #[test]
    fn test_archive_is_terminal() {
        let mut form = draft();
        form.archive();
        assert!(form.close().is_err());
        assert!(form.edit_questions(vec![]).is_err());
        assert!(form.publish("tok").is_err());
    }

    #[test]
    fn test_edit_bumps_version() {
        let mut form = draft();
        let before = form.version();
        form.edit_questions(vec![QuestionSpec::new("q1", QuestionType::LongText, "Comments")])
            .unwrap();
        assert_eq!(form.version(), before + 1);
    }

    #[test]
    fn test_accepts_submission_limit_boundary() {
        let mut form = draft();
        form.update_settings(FormSettings { submission_limit: Some(10), ..Default::default() }).unwrap();
        form.publish("tok").unwrap();
        let now = Utc::now();
        assert!(form.accepts_submission(now, 9));
        assert!(!form.accepts_submission(now, 10));
    }

    #[test]
    fn test_accepts_submission_requires_published() {
        let form = draft();
        assert!(!form.accepts_submission(Utc::now(), 0));
    }

    #[test]
    fn test_accepts_submission_expiry() {
        let mut form = draft();
        let now = Utc::now();
        form.update_settings(FormSettings {
            expires_at: Some(now - Duration::hours(1)),
            ..Default::default()
        })
        .unwrap();
        form.publish("tok").unwrap();
        assert!(!form.accepts_submission(now, 0));
        assert_eq!(form.rejection_reason(now, 0), Some("form has expired"));
    }

    #[test]
    fn test_public_view_strips_secrets() {
        let mut form = draft();
        form.set_owner("admin-1");
        form.update_settings(FormSettings { password: Some("hunter2".into()), ..Default::default() })
            .unwrap();
        form.publish("tok").unwrap();

        let view = form.to_public_view();
        assert!(view.password_protected);
        let serialized = serde_json::to_string(&view).unwrap();
        assert!(!serialized.contains("hunter2"));
        assert!(!serialized.contains("admin-1"));
        assert!(!serialized.contains("tok\""));
    }

    #[test]
    fn test_publish_raises_event_once() {
        let mut form = draft();
        form.publish("tok").unwrap();
        form.publish("tok-again").unwrap();
        let events = form.take_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FormEvent::Published { .. }))
                .count(),
            1
        );
    }
}
