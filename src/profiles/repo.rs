use async_trait::async_trait;
use uuid::Uuid;

use super::model::{NewProfile, Profile};

/// Unique key a failed insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    SubjectId,
    Email,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0:?}")]
    UniqueViolation(UniqueKey),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence port for profiles.
///
/// The service computes ids, timestamps and merged values; implementations
/// only persist them.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<Profile>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError>;

    /// Writes the mutable columns of `profile` (display names, onboarding
    /// state, `updated_at`). Returns `None` if the row no longer exists.
    async fn update(&self, profile: &Profile) -> Result<Option<Profile>, StoreError>;

    /// Returns true if a row was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}
