//! In-memory stores.
//!
//! DashMap-backed implementations of the repository ports. Submission
//! counters are plain atomics; the conditional increment in
//! [`FormRepository::try_reserve_submission`] is what keeps submission
//! limits exact under concurrent submitters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::form::FormDefinition;
use crate::ports::{FormRepository, RepositoryError, ResponseRepository, SlotReservation};
use crate::response::Response;

#[derive(Default)]
pub struct InMemoryFormStore {
    forms: DashMap<String, FormDefinition>,
    /// shareable link -> form id
    links: DashMap<String, String>,
    /// form id -> submission counter
    counters: DashMap<String, Arc<AtomicU64>>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, form_id: &str) -> Arc<AtomicU64> {
        self.counters
            .entry(form_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }
}

#[async_trait]
impl FormRepository for InMemoryFormStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<FormDefinition>, RepositoryError> {
        Ok(self.forms.get(id).map(|f| f.clone()))
    }

    async fn find_by_link(&self, link: &str) -> Result<Option<FormDefinition>, RepositoryError> {
        let Some(form_id) = self.links.get(link).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.forms.get(&form_id).map(|f| f.clone()))
    }

    async fn list(&self) -> Result<Vec<FormDefinition>, RepositoryError> {
        Ok(self.forms.iter().map(|f| f.clone()).collect())
    }

    async fn save(&self, form: &FormDefinition) -> Result<(), RepositoryError> {
        self.forms.insert(form.id().to_string(), form.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        if self.forms.remove(id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        self.links.retain(|_, form_id| form_id.as_str() != id);
        self.counters.remove(id);
        Ok(())
    }

    async fn claim_link(&self, link: &str, form_id: &str) -> Result<bool, RepositoryError> {
        match self.links.entry(link.to_string()) {
            Entry::Occupied(existing) => Ok(existing.get() == form_id),
            Entry::Vacant(slot) => {
                slot.insert(form_id.to_string());
                Ok(true)
            }
        }
    }

    async fn submission_count(&self, form_id: &str) -> Result<u64, RepositoryError> {
        Ok(self
            .counters
            .get(form_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn try_reserve_submission(
        &self,
        form_id: &str,
        limit: Option<u64>,
    ) -> Result<SlotReservation, RepositoryError> {
        let counter = self.counter(form_id);
        let reserved = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            match limit {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            }
        });
        Ok(match reserved {
            Ok(previous) => SlotReservation::Reserved { count: previous + 1 },
            Err(_) => SlotReservation::LimitReached,
        })
    }

    async fn release_submission(&self, form_id: &str) -> Result<(), RepositoryError> {
        let counter = self.counter(form_id);
        let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            current.checked_sub(1)
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryResponseStore {
    responses: DashMap<String, Response>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseRepository for InMemoryResponseStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Response>, RepositoryError> {
        Ok(self.responses.get(id).map(|r| r.clone()))
    }

    async fn find_by_form(&self, form_id: &str) -> Result<Vec<Response>, RepositoryError> {
        Ok(self
            .responses
            .iter()
            .filter(|r| r.form_id == form_id)
            .map(|r| r.clone())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Response>, RepositoryError> {
        Ok(self.responses.iter().map(|r| r.clone()).collect())
    }

    async fn save(&self, response: &Response) -> Result<(), RepositoryError> {
        self.responses.insert(response.id.clone(), response.clone());
        Ok(())
    }

    async fn delete_by_form(&self, form_id: &str) -> Result<(), RepositoryError> {
        self.responses.retain(|_, response| response.form_id != form_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{Answer, AnswerMetadata};
    use crate::question::{QuestionSpec, QuestionType};
    use crate::response::{ClientInfo, ResponseStatus, ResponseTiming};
    use chrono::Utc;

    fn form() -> FormDefinition {
        FormDefinition::create(
            "Survey",
            vec![QuestionSpec::new("q1", QuestionType::ShortText, "Name")],
        )
        .unwrap()
    }

    fn response_for(form_id: &str) -> Response {
        let now = Utc::now();
        Response {
            id: uuid::Uuid::new_v4().to_string(),
            form_id: form_id.into(),
            form_title: "Survey".into(),
            form_type_name: None,
            respondent_email: None,
            respondent_name: None,
            is_anonymous: false,
            answers: vec![Answer {
                question_id: "q1".into(),
                question_type: QuestionType::ShortText,
                question_title: "Name".into(),
                value: serde_json::json!("Ada"),
                text_value: "Ada".into(),
                metadata: AnswerMetadata::default(),
            }],
            status: ResponseStatus::Submitted,
            timing: ResponseTiming::at_submission(None, now),
            client: ClientInfo::default(),
            flags: vec![],
        }
    }

    #[tokio::test]
    async fn test_save_and_find_form() {
        let store = InMemoryFormStore::new();
        let form = form();
        store.save(&form).await.unwrap();
        let found = store.find_by_id(form.id()).await.unwrap().unwrap();
        assert_eq!(found.id(), form.id());
    }

    #[tokio::test]
    async fn test_find_by_link() {
        let store = InMemoryFormStore::new();
        let mut form = form();
        form.publish("tok-abc").unwrap();
        store.save(&form).await.unwrap();
        assert!(store.claim_link("tok-abc", form.id()).await.unwrap());

        let found = store.find_by_link("tok-abc").await.unwrap().unwrap();
        assert_eq!(found.id(), form.id());
        assert!(store.find_by_link("tok-xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_link_collision() {
        let store = InMemoryFormStore::new();
        assert!(store.claim_link("tok", "form-1").await.unwrap());
        assert!(!store.claim_link("tok", "form-2").await.unwrap());
        // Re-claiming your own link is idempotent.
        assert!(store.claim_link("tok", "form-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_respects_limit() {
        let store = InMemoryFormStore::new();
        for expected in 1..=3u64 {
            match store.try_reserve_submission("f1", Some(3)).await.unwrap() {
                SlotReservation::Reserved { count } => assert_eq!(count, expected),
                SlotReservation::LimitReached => panic!("limit hit early"),
            }
        }
        assert_eq!(
            store.try_reserve_submission("f1", Some(3)).await.unwrap(),
            SlotReservation::LimitReached
        );
        assert_eq!(store.submission_count("f1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unlimited_reserve() {
        let store = InMemoryFormStore::new();
        for _ in 0..100 {
            assert!(matches!(
                store.try_reserve_submission("f1", None).await.unwrap(),
                SlotReservation::Reserved { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_release_gives_slot_back() {
        let store = InMemoryFormStore::new();
        store.try_reserve_submission("f1", Some(1)).await.unwrap();
        store.release_submission("f1").await.unwrap();
        assert!(matches!(
            store.try_reserve_submission("f1", Some(1)).await.unwrap(),
            SlotReservation::Reserved { count: 1 }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reserve_never_overshoots() {
        let store = Arc::new(InMemoryFormStore::new());
        let mut handles = vec![];
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_reserve_submission("f1", Some(10)).await.unwrap()
            }));
        }
        let mut reserved = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), SlotReservation::Reserved { .. }) {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 10);
        assert_eq!(store.submission_count("f1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_delete_clears_link_and_counter() {
        let store = InMemoryFormStore::new();
        let mut form = form();
        form.publish("tok").unwrap();
        store.save(&form).await.unwrap();
        store.claim_link("tok", form.id()).await.unwrap();
        store.try_reserve_submission(form.id(), None).await.unwrap();

        store.delete(form.id()).await.unwrap();
        assert!(store.find_by_id(form.id()).await.unwrap().is_none());
        assert!(store.find_by_link("tok").await.unwrap().is_none());
        assert_eq!(store.submission_count(form.id()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_form_is_not_found() {
        let store = InMemoryFormStore::new();
        assert!(matches!(store.delete("ghost").await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_response_store_save_and_query() {
        let store = InMemoryResponseStore::new();
        let response = response_for("f1");
        store.save(&response).await.unwrap();

        assert!(store.find_by_id(&response.id).await.unwrap().is_some());
        assert_eq!(store.find_by_form("f1").await.unwrap().len(), 1);
        assert!(store.find_by_form("f2").await.unwrap().is_empty());

        // Saving the same id again is an idempotent upsert.
        store.save(&response).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_form_keeps_other_forms() {
        let store = InMemoryResponseStore::new();
        store.save(&response_for("f1")).await.unwrap();
        store.save(&response_for("f2")).await.unwrap();

        store.delete_by_form("f1").await.unwrap();
        assert!(store.find_by_form("f1").await.unwrap().is_empty());
        assert_eq!(store.find_by_form("f2").await.unwrap().len(), 1);
    }
}
