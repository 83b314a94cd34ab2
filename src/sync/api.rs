use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, error};
use uuid::Uuid;

use crate::profiles::model::{IdentityClaims, Profile, ProfilePatch};

/// Failure of a profile request as seen by the client. Callers treat every
/// variant the same way.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Transport for the `/user` endpoints. `token` is the caller's
/// identity-provider session token.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// `Ok(None)` when the server has no profile for the caller.
    async fn get_profile(&self, token: &str) -> Result<Option<Profile>, SyncError>;

    async fn create_profile(&self, token: &str, claims: &IdentityClaims) -> Result<Profile, SyncError>;

    async fn update_profile(&self, token: &str, patch: &ProfilePatch) -> Result<Profile, SyncError>;

    async fn delete_profile(&self, token: &str, profile_id: Uuid) -> Result<(), SyncError>;
}

#[async_trait]
impl<T: ProfileApi + ?Sized> ProfileApi for Arc<T> {
    async fn get_profile(&self, token: &str) -> Result<Option<Profile>, SyncError> {
        (**self).get_profile(token).await
    }

    async fn create_profile(&self, token: &str, claims: &IdentityClaims) -> Result<Profile, SyncError> {
        (**self).create_profile(token, claims).await
    }

    async fn update_profile(&self, token: &str, patch: &ProfilePatch) -> Result<Profile, SyncError> {
        (**self).update_profile(token, patch).await
    }

    async fn delete_profile(&self, token: &str, profile_id: Uuid) -> Result<(), SyncError> {
        (**self).delete_profile(token, profile_id).await
    }
}

/// [`ProfileApi`] over HTTP against the service's `/api` base path.
#[derive(Clone)]
pub struct HttpProfileApi {
    client: Client,
    base_url: String,
}

impl HttpProfileApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }
}

async fn check(res: Response) -> Result<Response, SyncError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    error!(%status, %body, "profile request failed");
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn get_profile(&self, token: &str) -> Result<Option<Profile>, SyncError> {
        let res = self.request(Method::GET, "/user", token).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!("no profile on server");
            return Ok(None);
        }
        Ok(Some(check(res).await?.json().await?))
    }

    async fn create_profile(&self, token: &str, claims: &IdentityClaims) -> Result<Profile, SyncError> {
        let res = self
            .request(Method::POST, "/user", token)
            .json(claims)
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    async fn update_profile(&self, token: &str, patch: &ProfilePatch) -> Result<Profile, SyncError> {
        let res = self
            .request(Method::PATCH, "/user", token)
            .json(patch)
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    async fn delete_profile(&self, token: &str, profile_id: Uuid) -> Result<(), SyncError> {
        let res = self
            .request(Method::DELETE, &format!("/user/{profile_id}"), token)
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }
}
