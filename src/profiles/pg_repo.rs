use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewProfile, OnboardingQuestions, Profile};
use super::repo::{ProfileRepository, StoreError, UniqueKey};

/// Row of the `users` table.
#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    subject_id: String,
    email: String,
    user_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    onboarding_completed: bool,
    onboarding_questions: Option<Json<OnboardingQuestions>>, // JSONB
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Self {
            id: r.id,
            subject_id: r.subject_id,
            email: r.email,
            user_name: r.user_name,
            first_name: r.first_name,
            last_name: r.last_name,
            onboarding_completed: r.onboarding_completed,
            onboarding_questions: r.onboarding_questions.map(|Json(q)| q),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgProfileRepository {
    db: PgPool,
}

impl PgProfileRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn classify(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("users_email_key") => return StoreError::UniqueViolation(UniqueKey::Email),
                Some("users_subject_id_key") => {
                    return StoreError::UniqueViolation(UniqueKey::SubjectId)
                }
                _ => {}
            }
        }
    }
    StoreError::Other(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, subject_id, email, user_name, first_name, last_name,
                   onboarding_completed, onboarding_questions, created_at, updated_at
              FROM users
             WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.db)
        .await
        .context("select profile by subject_id")?;
        Ok(row.map(Profile::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, subject_id, email, user_name, first_name, last_name,
                   onboarding_completed, onboarding_questions, created_at, updated_at
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select profile by id")?;
        Ok(row.map(Profile::from))
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            INSERT INTO users (id, subject_id, email, user_name, first_name, last_name,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id, subject_id, email, user_name, first_name, last_name,
                      onboarding_completed, onboarding_questions, created_at, updated_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.subject_id)
        .bind(&profile.email)
        .bind(&profile.user_name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| classify(e, "insert profile"))?;
        Ok(row.into())
    }

    async fn update(&self, profile: &Profile) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            UPDATE users
               SET user_name = $2,
                   first_name = $3,
                   last_name = $4,
                   onboarding_completed = $5,
                   onboarding_questions = $6,
                   updated_at = $7
             WHERE id = $1
            RETURNING id, subject_id, email, user_name, first_name, last_name,
                      onboarding_completed, onboarding_questions, created_at, updated_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.user_name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.onboarding_completed)
        .bind(profile.onboarding_questions.clone().map(Json))
        .bind(profile.updated_at)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| classify(e, "update profile"))?;
        Ok(row.map(Profile::from))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete profile")?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(subject: &str, email: &str) -> NewProfile {
        NewProfile {
            id: Uuid::new_v4(),
            subject_id: subject.into(),
            email: email.into(),
            user_name: None,
            first_name: Some("Ana".into()),
            last_name: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn onboarding_answers_survive_jsonb(pool: PgPool) {
        let repo = PgProfileRepository::new(pool);
        let mut stored = repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");
        assert!(stored.onboarding_questions.is_none());
        assert!(!stored.onboarding_completed);

        let answers = OnboardingQuestions {
            goal: Some("travel".into()),
            language_level: Some("A2".into()),
            commitment: None,
        };
        stored.onboarding_questions = Some(answers.clone());
        stored.onboarding_completed = true;
        stored.updated_at = OffsetDateTime::now_utc();
        repo.update(&stored).await.expect("update").expect("row");

        let read = repo
            .find_by_subject_id("s1")
            .await
            .expect("select")
            .expect("row");
        assert_eq!(read.onboarding_questions, Some(answers));
        assert!(read.onboarding_completed);
        assert_eq!(read.first_name.as_deref(), Some("Ana"));
        assert_eq!(repo.find_by_id(read.id).await.expect("select").map(|p| p.id), Some(read.id));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unique_constraints_map_to_keys(pool: PgPool) {
        let repo = PgProfileRepository::new(pool);
        repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");

        match repo.insert(new_profile("s1", "b@x.com")).await {
            Err(StoreError::UniqueViolation(UniqueKey::SubjectId)) => {}
            other => panic!("expected subject conflict, got {other:?}"),
        }
        match repo.insert(new_profile("s2", "a@x.com")).await {
            Err(StoreError::UniqueViolation(UniqueKey::Email)) => {}
            other => panic!("expected email conflict, got {other:?}"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn update_and_delete_missing_rows(pool: PgPool) {
        let repo = PgProfileRepository::new(pool);
        let stored = repo.insert(new_profile("s1", "a@x.com")).await.expect("insert");

        assert!(repo.delete(stored.id).await.expect("delete"));
        assert!(!repo.delete(stored.id).await.expect("delete again"));
        assert!(repo.update(&stored).await.expect("update").is_none());
        assert!(repo.find_by_id(stored.id).await.expect("select").is_none());
    }
}
