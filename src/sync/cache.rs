use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::api::{ProfileApi, SyncError};
use crate::profiles::model::{IdentityClaims, Profile, ProfilePatch};

/// How long a fetched profile is served without asking the server again.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// The cached view of the current user's profile.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub profile: Option<Profile>,
    fetched_at: Option<Instant>,
    // Bumped by every mutation start and settle and by session changes. A
    // read only stores its result if the generation it started under is
    // still current and no mutation is pending.
    generation: u64,
    // Bumped whenever the signed-in session is replaced or dropped.
    session: u64,
    pending: usize,
    next_ticket: u64,
    // Oldest snapshot of a failed mutation that settled while newer ones
    // were still pending, as (ticket, snapshot).
    rollback_to: Option<(u64, Option<Profile>)>,
}

impl CacheState {
    fn is_fresh(&self) -> bool {
        self.fetched_at
            .is_some_and(|at| at.elapsed() < STALE_AFTER)
    }

    /// Has any mutation been started and not yet settled.
    pub fn is_mutating(&self) -> bool {
        self.pending > 0
    }

    fn reset_session(&mut self) {
        self.profile = None;
        self.fetched_at = None;
        self.generation += 1;
        self.session += 1;
        self.pending = 0;
        self.rollback_to = None;
    }
}

/// Tentative cache write that is rolled back unless committed.
///
/// Dropping the guard (including when the owning future is cancelled)
/// restores the snapshot if the update was not committed, and always marks
/// the cache stale. Nothing is touched once the session it started under
/// has been replaced.
struct OptimisticUpdate<'a> {
    state: &'a watch::Sender<CacheState>,
    session: u64,
    ticket: u64,
    snapshot: Option<Option<Profile>>,
}

impl<'a> OptimisticUpdate<'a> {
    fn begin<F>(state: &'a watch::Sender<CacheState>, apply: F) -> Self
    where
        F: FnOnce(Option<Profile>) -> Option<Profile>,
    {
        let mut guard = Self {
            state,
            session: 0,
            ticket: 0,
            snapshot: None,
        };
        state.send_modify(|s| {
            guard.session = s.session;
            guard.ticket = s.next_ticket;
            guard.snapshot = Some(s.profile.clone());
            s.next_ticket += 1;
            s.pending += 1;
            s.generation += 1;
            s.profile = apply(s.profile.clone());
        });
        guard
    }

    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for OptimisticUpdate<'_> {
    fn drop(&mut self) {
        let failed = self.snapshot.take();
        let (session, ticket) = (self.session, self.ticket);
        self.state.send_if_modified(|s| {
            if s.session != session {
                return false;
            }
            s.pending = s.pending.saturating_sub(1);
            match failed {
                // last one out restores the oldest failed snapshot
                Some(own) if s.pending == 0 => {
                    s.profile = match s.rollback_to.take() {
                        Some((older, snapshot)) if older < ticket => snapshot,
                        _ => own,
                    };
                }
                Some(own) => {
                    if s.rollback_to.as_ref().map_or(true, |(older, _)| ticket < *older) {
                        s.rollback_to = Some((ticket, own));
                    }
                }
                None if s.pending == 0 => s.rollback_to = None,
                None => {}
            }
            s.fetched_at = None;
            s.generation += 1;
            true
        });
    }
}

/// Client-side cache of the signed-in user's profile with optimistic
/// mutations.
pub struct ProfileSync<A> {
    api: A,
    session: watch::Sender<Option<String>>,
    state: watch::Sender<CacheState>,
    fetch_lock: Mutex<()>,
}

impl<A: ProfileApi> ProfileSync<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            session: watch::Sender::new(None),
            state: watch::Sender::new(CacheState::default()),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Starts a session. A token other than the current one starts from an
    /// empty cache, and mutations still in flight for the previous session
    /// no longer touch it.
    pub fn sign_in(&self, token: impl Into<String>) {
        let token = token.into();
        let previous = self.session.send_replace(Some(token.clone()));
        if previous.as_deref() != Some(token.as_str()) {
            self.state.send_modify(CacheState::reset_session);
        }
    }

    /// Swaps in a renewed token for the same user, keeping the cache.
    pub fn refresh_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.session.send_if_modified(|current| match current {
            Some(t) => {
                *t = token;
                true
            }
            None => false,
        });
    }

    /// Drops the session and everything cached for it.
    pub fn sign_out(&self) {
        self.session.send_replace(None);
        self.state.send_modify(CacheState::reset_session);
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// The value consumers currently see, optimistic writes included.
    pub fn current(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }

    /// Marks the cached value stale so the next read goes to the server.
    pub fn invalidate(&self) {
        self.state.send_modify(|s| s.fetched_at = None);
    }

    fn token(&self) -> Option<String> {
        self.session.borrow().clone()
    }

    fn fresh_value(&self) -> Option<Option<Profile>> {
        let state = self.state.borrow();
        state.is_fresh().then(|| state.profile.clone())
    }

    /// Returns the profile, from cache while fresh. Issues no request while
    /// signed out.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<Option<Profile>, SyncError> {
        let session = self.state.borrow().session;
        let Some(token) = self.token() else {
            return Ok(None);
        };
        if let Some(cached) = self.fresh_value() {
            return Ok(cached);
        }

        let _in_flight = self.fetch_lock.lock().await;
        // another caller may have completed the read while we waited
        if let Some(cached) = self.fresh_value() {
            return Ok(cached);
        }
        self.load(&token, session).await
    }

    /// Window or tab regained focus.
    pub async fn handle_focus(&self) -> Result<Option<Profile>, SyncError> {
        self.fetch_profile().await
    }

    /// Reads from the server and stores the result unless a mutation or a
    /// session change happened in the meantime.
    async fn load(&self, token: &str, session: u64) -> Result<Option<Profile>, SyncError> {
        let started = self.state.borrow().generation;
        let fetched = self.api.get_profile(token).await?;

        let mut stored = false;
        self.state.send_if_modified(|s| {
            if s.session != session || s.generation != started || s.pending > 0 {
                return false;
            }
            s.profile = fetched.clone();
            s.fetched_at = Some(Instant::now());
            stored = true;
            true
        });
        if !stored {
            debug!("discarding profile read superseded by a mutation");
            return Ok(self.current());
        }
        Ok(fetched)
    }

    async fn refetch(&self, token: &str, session: u64) {
        let _in_flight = self.fetch_lock.lock().await;
        if let Err(e) = self.load(token, session).await {
            warn!(error = %e, "refetch after mutation failed");
        }
    }

    async fn settle<T>(
        &self,
        optimistic: OptimisticUpdate<'_>,
        outcome: Result<T, SyncError>,
        token: &str,
    ) -> Result<T, SyncError> {
        let session = optimistic.session;
        match &outcome {
            Ok(_) => optimistic.commit(),
            Err(e) => {
                warn!(error = %e, "profile mutation failed; rolling back");
                drop(optimistic);
            }
        }
        if self.state.borrow().session == session {
            self.refetch(token, session).await;
        } else {
            debug!("session changed while mutation was in flight; skipping refetch");
        }
        outcome
    }

    /// Creates the profile (or gets the existing one). While in flight the
    /// display claims are shown on an already cached profile.
    #[instrument(skip(self, claims))]
    pub async fn create_profile(&self, claims: IdentityClaims) -> Result<Profile, SyncError> {
        let token = self.token().ok_or(SyncError::Unauthenticated)?;
        let preview = claims.display_patch();
        let optimistic = OptimisticUpdate::begin(&self.state, |cached| {
            cached.map(|mut p| {
                p.apply_patch(&preview);
                p
            })
        });
        let outcome = self.api.create_profile(&token, &claims).await;
        self.settle(optimistic, outcome, &token).await
    }

    #[instrument(skip(self, patch))]
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Profile, SyncError> {
        let token = self.token().ok_or(SyncError::Unauthenticated)?;
        let optimistic = OptimisticUpdate::begin(&self.state, |cached| {
            cached.map(|mut p| {
                p.apply_patch(&patch);
                p
            })
        });
        let outcome = self.api.update_profile(&token, &patch).await;
        self.settle(optimistic, outcome, &token).await
    }

    #[instrument(skip(self))]
    pub async fn delete_profile(&self, profile_id: Uuid) -> Result<(), SyncError> {
        let token = self.token().ok_or(SyncError::Unauthenticated)?;
        let optimistic = OptimisticUpdate::begin(&self.state, |_| None);
        let outcome = self.api.delete_profile(&token, profile_id).await;
        self.settle(optimistic, outcome, &token).await
    }
}
