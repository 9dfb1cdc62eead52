//! Outbound ports.
//!
//! Interfaces the persistence layer must implement. Exact submission-limit
//! enforcement is part of the contract: reserving a slot is an atomic
//! conditional increment, never a read-modify-write.

use async_trait::async_trait;
use thiserror::Error;

use crate::form::FormDefinition;
use crate::response::Response;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entity not found")]
    NotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// What happens to a form's responses when the form is deleted. The caller
/// always chooses; the core never picks a default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete the responses along with the form.
    Cascade,
    /// Orphan the responses; their snapshotted titles and types keep them
    /// readable without the form.
    Retain,
}

impl std::fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cascade => write!(f, "cascade"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

/// Outcome of an atomic submission-slot reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotReservation {
    /// Slot taken; `count` is the new submission total.
    Reserved { count: u64 },
    /// The limit was hit first.
    LimitReached,
}

#[async_trait]
pub trait FormRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<FormDefinition>, RepositoryError>;

    async fn find_by_link(&self, link: &str) -> Result<Option<FormDefinition>, RepositoryError>;

    async fn list(&self) -> Result<Vec<FormDefinition>, RepositoryError>;

    /// Insert or update (idempotent by form id).
    async fn save(&self, form: &FormDefinition) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Register `link` for `form_id` if nobody holds it yet. Returns false
    /// on collision so the caller can retry with a fresh token.
    async fn claim_link(&self, link: &str, form_id: &str) -> Result<bool, RepositoryError>;

    async fn submission_count(&self, form_id: &str) -> Result<u64, RepositoryError>;

    /// Atomically take a submission slot, but only while under `limit`.
    async fn try_reserve_submission(
        &self,
        form_id: &str,
        limit: Option<u64>,
    ) -> Result<SlotReservation, RepositoryError>;

    /// Give a reserved slot back after a failed persist.
    async fn release_submission(&self, form_id: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Response>, RepositoryError>;

    async fn find_by_form(&self, form_id: &str) -> Result<Vec<Response>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Response>, RepositoryError>;

    /// Insert or update (idempotent by response id).
    async fn save(&self, response: &Response) -> Result<(), RepositoryError>;

    /// Drop every response of a form; used by cascade deletion.
    async fn delete_by_form(&self, form_id: &str) -> Result<(), RepositoryError>;
}
