use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::model::{non_blank, IdentityClaims, NewProfile, Profile, ProfilePatch};
use super::repo::{ProfileRepository, StoreError, UniqueKey};
use crate::error::AppError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Links identity-provider subjects to profiles and enforces the write
/// policy on them.
pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self { repo }
    }

    /// Returns the subject's profile, creating it from `claims` on first use.
    #[instrument(skip(self, claims))]
    pub async fn ensure_profile(
        &self,
        subject_id: &str,
        claims: IdentityClaims,
    ) -> Result<Profile, AppError> {
        if let Some(existing) = self.repo.find_by_subject_id(subject_id).await? {
            debug!(profile_id = %existing.id, "profile already exists");
            return Ok(existing);
        }

        let email = claims
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::Validation("Email is required".into()))?;
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AppError::Validation("Invalid email".into()));
        }

        let new = NewProfile {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            email,
            user_name: non_blank(claims.user_name.as_deref()),
            first_name: non_blank(claims.first_name.as_deref()),
            last_name: non_blank(claims.last_name.as_deref()),
            created_at: OffsetDateTime::now_utc(),
        };

        match self.repo.insert(new).await {
            Ok(profile) => {
                info!(profile_id = %profile.id, email = %profile.email, "profile created");
                Ok(profile)
            }
            // Lost a race against a concurrent first sign-in of the same subject.
            Err(StoreError::UniqueViolation(UniqueKey::SubjectId)) => {
                debug!("concurrent insert for subject; re-reading");
                self.repo
                    .find_by_subject_id(subject_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "profile for subject vanished after conflicting insert"
                        ))
                    })
            }
            Err(StoreError::UniqueViolation(UniqueKey::Email)) => {
                warn!("email already bound to another subject");
                Err(AppError::Conflict("Email already registered".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_profile_by_subject_id(&self, subject_id: &str) -> Result<Profile, AppError> {
        self.repo
            .find_by_subject_id(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_profile(
        &self,
        subject_id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, AppError> {
        let profile = self.get_profile_by_subject_id(subject_id).await?;
        self.apply_and_store(profile, &patch).await
    }

    /// Same as [`Self::update_profile`], addressed by internal id and
    /// checked against the requesting subject.
    #[instrument(skip(self, patch))]
    pub async fn update_profile_by_id(
        &self,
        requesting_subject_id: &str,
        profile_id: Uuid,
        patch: ProfilePatch,
    ) -> Result<Profile, AppError> {
        let profile = self.owned_profile(requesting_subject_id, profile_id).await?;
        self.apply_and_store(profile, &patch).await
    }

    #[instrument(skip(self))]
    pub async fn delete_profile(
        &self,
        requesting_subject_id: &str,
        target_profile_id: Uuid,
    ) -> Result<(), AppError> {
        let profile = self
            .owned_profile(requesting_subject_id, target_profile_id)
            .await?;
        if !self.repo.delete(profile.id).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        info!(profile_id = %profile.id, "profile deleted");
        Ok(())
    }

    async fn owned_profile(
        &self,
        requesting_subject_id: &str,
        profile_id: Uuid,
    ) -> Result<Profile, AppError> {
        let profile = self
            .repo
            .find_by_id(profile_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        if profile.subject_id != requesting_subject_id {
            warn!(%profile_id, "subject does not own profile");
            return Err(AppError::Forbidden("Forbidden".into()));
        }
        Ok(profile)
    }

    async fn apply_and_store(
        &self,
        mut profile: Profile,
        patch: &ProfilePatch,
    ) -> Result<Profile, AppError> {
        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".into()));
        }
        let fields: Vec<&str> = patch.fields().into_iter().map(|f| f.json_key()).collect();

        profile.apply_patch(patch);
        profile.updated_at = OffsetDateTime::now_utc();

        let stored = self
            .repo
            .update(&profile)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        info!(profile_id = %stored.id, ?fields, "profile updated");
        Ok(stored)
    }
}
