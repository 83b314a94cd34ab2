use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{NewProfile, Profile};
use super::repo::{ProfileRepository, StoreError, UniqueKey};

/// Process-local profile store with the same uniqueness rules as the
/// `users` table. Used for tests and `PROFILE_STORE=memory`.
#[derive(Default)]
pub struct InMemoryProfileRepository {
    rows: RwLock<HashMap<Uuid, Profile>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<Profile>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|p| p.subject_id == subject_id).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|p| p.subject_id == profile.subject_id) {
            return Err(StoreError::UniqueViolation(UniqueKey::SubjectId));
        }
        if rows.values().any(|p| p.email == profile.email) {
            return Err(StoreError::UniqueViolation(UniqueKey::Email));
        }
        if rows.contains_key(&profile.id) {
            return Err(StoreError::Other(anyhow::anyhow!(
                "duplicate primary key {}",
                profile.id
            )));
        }
        let stored = Profile::from(profile);
        rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, profile: &Profile) -> Result<Option<Profile>, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&profile.id) else {
            return Ok(None);
        };
        row.user_name = profile.user_name.clone();
        row.first_name = profile.first_name.clone();
        row.last_name = profile.last_name.clone();
        row.onboarding_completed = profile.onboarding_completed;
        row.onboarding_questions = profile.onboarding_questions.clone();
        row.updated_at = profile.updated_at;
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn new_profile(subject: &str, email: &str) -> NewProfile {
        NewProfile {
            id: Uuid::new_v4(),
            subject_id: subject.into(),
            email: email.into(),
            user_name: None,
            first_name: None,
            last_name: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn enforces_unique_subject_and_email() {
        let repo = InMemoryProfileRepository::new();
        repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");

        let err = repo.insert(new_profile("s1", "b@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::SubjectId)));

        let err = repo.insert(new_profile("s2", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::Email)));

        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn update_keeps_immutable_columns() {
        let repo = InMemoryProfileRepository::new();
        let stored = repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");

        let mut changed = stored.clone();
        changed.email = "other@x.com".into();
        changed.subject_id = "s9".into();
        changed.first_name = Some("Ana".into());

        let updated = repo.update(&changed).await.expect("update").expect("row");
        assert_eq!(updated.email, "a@x.com");
        assert_eq!(updated.subject_id, "s1");
        assert_eq!(updated.first_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn update_and_delete_missing_rows() {
        let repo = InMemoryProfileRepository::new();
        let stored = repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");
        assert!(repo.delete(stored.id).await.expect("delete"));
        assert!(!repo.delete(stored.id).await.expect("delete"));
        assert!(repo.update(&stored).await.expect("update").is_none());
    }
}
