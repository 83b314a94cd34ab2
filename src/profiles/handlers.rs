use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::model::{IdentityClaims, Profile, ProfilePatch};
use crate::{auth::AuthSubject, error::AppError, state::AppState};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/user",
            post(create_profile).get(get_profile).patch(update_profile),
        )
        .route(
            "/user/:user_id",
            delete(delete_profile).patch(update_profile_by_id),
        )
        .route("/user/clerk/:subject_id", get(get_profile_by_subject))
}

fn parse_profile_id(raw: &str) -> Result<Uuid, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("User ID is required".into()));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid user ID".into()))
}

/// POST /user: returns the caller's profile, creating it on first sign-in.
#[instrument(skip(state, payload))]
pub async fn create_profile(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
    payload: Result<Json<IdentityClaims>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    let Json(claims) = payload?;
    let profile = state.profiles.ensure_profile(&subject_id, claims).await?;
    Ok(Json(profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
) -> Result<Json<Profile>, AppError> {
    let profile = state.profiles.get_profile_by_subject_id(&subject_id).await?;
    Ok(Json(profile))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    let Json(patch) = payload?;
    let profile = state.profiles.update_profile(&subject_id, patch).await?;
    Ok(Json(profile))
}

#[instrument(skip(state, payload))]
pub async fn update_profile_by_id(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
    Path(user_id): Path<String>,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    let profile_id = parse_profile_id(&user_id)?;
    let Json(patch) = payload?;
    let profile = state
        .profiles
        .update_profile_by_id(&subject_id, profile_id, patch)
        .await?;
    Ok(Json(profile))
}

#[instrument(skip(state))]
pub async fn delete_profile(
    State(state): State<AppState>,
    AuthSubject(subject_id): AuthSubject,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let profile_id = parse_profile_id(&user_id)?;
    state.profiles.delete_profile(&subject_id, profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /user/clerk/:subject_id. Another subject's profile is reported as
/// absent.
#[instrument(skip(state))]
pub async fn get_profile_by_subject(
    State(state): State<AppState>,
    AuthSubject(caller): AuthSubject,
    Path(subject_id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    let subject_id = subject_id.trim();
    if subject_id.is_empty() {
        return Err(AppError::Validation("Subject ID is required".into()));
    }
    if subject_id != caller {
        return Err(AppError::NotFound("User not found".into()));
    }
    let profile = state.profiles.get_profile_by_subject_id(subject_id).await?;
    Ok(Json(profile))
}
