pub mod handlers;
pub mod memory_repo;
pub mod model;
pub mod pg_repo;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::profile_routes())
}
