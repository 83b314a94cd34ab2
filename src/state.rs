use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::SessionKeys;
use crate::config::IdentityConfig;
use crate::profiles::{repo::ProfileRepository, services::ProfileService};

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<SessionKeys>,
    pub profiles: Arc<ProfileService>,
}

impl AppState {
    pub fn new(identity: &IdentityConfig, repo: Arc<dyn ProfileRepository>) -> anyhow::Result<Self> {
        Ok(Self {
            keys: Arc::new(SessionKeys::from_config(identity)?),
            profiles: Arc::new(ProfileService::new(repo)),
        })
    }

    #[cfg(test)]
    pub fn fake(repo: Arc<dyn ProfileRepository>) -> Self {
        let identity = crate::auth::keys::tests::identity_config(None);
        Self::new(&identity, repo).expect("fake state")
    }
}

impl FromRef<AppState> for Arc<SessionKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
