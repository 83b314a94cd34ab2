use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;

use super::keys::SessionKeys;
use crate::error::AppError;

/// Cookie the identity provider stores its session token in.
const SESSION_COOKIE: &str = "__session";

/// Verified identity-provider subject id of the caller.
pub struct AuthSubject(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthSubject
where
    S: Send + Sync,
    Arc<SessionKeys>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = <Arc<SessionKeys> as FromRef<S>>::from_ref(state);

        let token = match parts.headers.get(header::AUTHORIZATION) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| AppError::Unauthorized("Unauthorized".into()))?;
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
                    .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?
                    .to_string()
            }
            None => session_cookie(parts)
                .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?,
        };

        match keys.verify(&token) {
            Ok(claims) => Ok(AuthSubject(claims.sub)),
            Err(e) => {
                warn!(error = %e, "invalid or expired session token");
                Err(AppError::Unauthorized("Unauthorized".into()))
            }
        }
    }
}

fn session_cookie(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}
