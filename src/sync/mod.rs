//! Client-side view of the signed-in user's profile.

pub mod api;
pub mod cache;

pub use api::{HttpProfileApi, ProfileApi, SyncError};
pub use cache::{CacheState, ProfileSync, STALE_AFTER};
