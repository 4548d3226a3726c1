//! Single-access lease coordinator
//!
//! Provides:
//! - Token creation with collision avoidance
//! - Reaping of markers whose owner stopped sending heartbeats
//! - Blocking, cancellable acquisition
//! - Heartbeat renewal of the held marker
//! - A watch cycle that notifies termination listeners about competing claims
//!
//! Exclusion is advisory. Two processes can both observe "no competitor"
//! within one poll window and both proceed; polling over an eventually
//! consistent listing has no stronger primitive to lean on. The watch cycle
//! narrows that window by asking the older holder to step aside.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bucketlock_common::{ConfigError, LeaseConfig};
use bucketlock_store::{MarkerEntry, MarkerGateway};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{LeaseError, Result};
use crate::listener::{ProtectedResource, ReadOnlyToggle, TerminationListener};
use crate::task::BackgroundTask;
use crate::token::LeaseToken;

/// Upper bound (exclusive) of the random token suffix
const TOKEN_SUFFIX_RANGE: u32 = 1_000_000;

/// Ownership of this coordinator's claim
#[derive(Debug)]
enum LeaseState {
    NoLease,
    Held {
        token: LeaseToken,
        heartbeat: BackgroundTask,
    },
}

impl LeaseState {
    fn token(&self) -> Option<&LeaseToken> {
        match self {
            LeaseState::NoLease => None,
            LeaseState::Held { token, .. } => Some(token),
        }
    }
}

pub(crate) struct Inner {
    config: LeaseConfig,
    gateway: Arc<dyn MarkerGateway>,
    state: tokio::sync::Mutex<LeaseState>,
    listeners: Mutex<Vec<Arc<dyn TerminationListener>>>,
    watch: Mutex<Option<BackgroundTask>>,
}

/// Coordinates single access to a bucket among independent processes.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct LeaseCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LeaseCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseCoordinator")
            .field("prefix", &self.inner.config.access_file_prefix)
            .field("bucket", &self.inner.config.bucket)
            .finish()
    }
}

impl LeaseCoordinator {
    pub fn new(config: LeaseConfig, gateway: Arc<dyn MarkerGateway>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                state: tokio::sync::Mutex::new(LeaseState::NoLease),
                listeners: Mutex::new(Vec::new()),
                watch: Mutex::new(None),
            }),
        })
    }

    /// Create a coordinator talking to the configured bucket through `object_store`.
    ///
    /// `options` carry endpoint, region and credentials for the backend.
    pub fn connect<I, K, V>(config: LeaseConfig, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let gateway = bucketlock_store::connect(&config.bucket, options)?;
        Self::new(config, Arc::new(gateway))
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.inner.config
    }

    /// The token currently held, if any
    pub async fn current_token(&self) -> Option<LeaseToken> {
        self.inner.state.lock().await.token().cloned()
    }

    /// Whether the termination watch cycle is running
    pub fn is_watching(&self) -> bool {
        self.inner.watch.lock().is_some()
    }

    /// One scan-and-reap pass: true if no live competing marker exists.
    ///
    /// Never creates a token.
    pub async fn is_available(&self) -> Result<bool> {
        Ok(!self.check_if_other_tokens_exist_and_delete_stale().await?)
    }

    /// Reserve single access, waiting as long as another live claim exists.
    ///
    /// Returns `Ok(None)` if this coordinator's claim was released while
    /// waiting, e.g. by a termination listener.
    pub async fn wait_for_and_reserve(&self) -> Result<Option<LeaseToken>> {
        self.wait_for_and_reserve_until(std::future::pending()).await
    }

    /// Like [`Self::wait_for_and_reserve`], but gives up once `cancel` completes.
    ///
    /// Cancellation is checked on every poll; it releases the token created
    /// for this attempt and yields `Ok(None)`. Dropping the returned future
    /// while it waits releases the token in the background.
    pub async fn wait_for_and_reserve_until<F>(&self, cancel: F) -> Result<Option<LeaseToken>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let token = self.reserve_token().await?;
        // Dropping this future mid-wait must not leave a heartbeating marker
        let pending = PendingReservation::new(&token);

        let result = self.wait_while_others_hold(&token, cancel).await;
        pending.disarm();

        match result {
            Ok(true) => {
                info!(key = %token.key(), "Received and reserved single access");
                Ok(Some(token))
            }
            Ok(false) => Ok(None),
            Err(e) => {
                // Do not leave a marker behind that nobody waits on
                if let Err(release_err) = self.release_token(token.key()).await {
                    warn!(key = %token.key(), error = %release_err, "Failed to release token after error");
                }
                Err(e)
            }
        }
    }

    async fn wait_while_others_hold<F>(
        &self,
        token: &LeaseToken,
        mut cancel: std::pin::Pin<&mut F>,
    ) -> Result<bool>
    where
        F: Future<Output = ()>,
    {
        if !self.check_if_other_tokens_exist_and_delete_stale().await? {
            return Ok(true);
        }

        info!(key = %token.key(), "Active access from different client found. Waiting for single access...");
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    info!(key = %token.key(), "Interrupted while waiting for single access");
                    self.release_token(token.key()).await?;
                    return Ok(false);
                }
                _ = tokio::time::sleep(self.inner.config.check_interval_for_single_access()) => {}
            }

            if !self.holds(token.key()).await {
                info!(key = %token.key(), "Token released while waiting for single access");
                return Ok(false);
            }
            if !self.check_if_other_tokens_exist_and_delete_stale().await? {
                return Ok(true);
            }
        }
    }

    /// Register a listener for competing claims.
    ///
    /// The first registration starts the watch cycle. The cycle scans every
    /// terminate-access interval; on the first live competitor it notifies
    /// every listener once and stops.
    pub fn register_termination_listener(&self, listener: Arc<dyn TerminationListener>) {
        self.inner.listeners.lock().push(listener);
        debug!("Registered new terminate access listener");

        let mut watch = self.inner.watch.lock();
        if watch.is_none() {
            *watch = Some(self.start_watch_cycle());
            info!(
                interval_ms = self.inner.config.check_interval_for_terminate_access_ms,
                "Started terminate access watch cycle"
            );
        }
    }

    /// Shut `resource` down and release the lease once another process asks for it
    pub fn shutdown_resource_on_terminate(&self, resource: Arc<dyn ProtectedResource>) {
        let owner = Arc::downgrade(&self.inner);
        self.register_termination_listener(Arc::new(move || {
            let resource = resource.clone();
            let owner = owner.clone();
            async move {
                // Safe while stores on the resource are still running
                resource.shutdown().await;
                release_through(&owner).await;
            }
        }));
    }

    /// Switch `toggle` to read-only and release the lease once another process asks for it
    pub fn set_read_only_on_terminate(&self, toggle: Arc<dyn ReadOnlyToggle>) {
        let owner = Arc::downgrade(&self.inner);
        self.register_termination_listener(Arc::new(move || {
            let toggle = toggle.clone();
            let owner = owner.clone();
            async move {
                toggle.set_read_only(true);
                release_through(&owner).await;
            }
        }));
    }

    /// Release the held token, if any. Background heartbeats stop before the
    /// marker is deleted.
    pub async fn release(&self) -> Result<bool> {
        let held = std::mem::replace(&mut *self.inner.state.lock().await, LeaseState::NoLease);
        self.finish_release(held).await
    }

    /// Stop the watch cycle and release the held token. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let watch = self.inner.watch.lock().take();
        if let Some(watch) = watch {
            watch.stop().await;
        }
        self.release().await?;
        Ok(())
    }

    pub(crate) async fn release_token(&self, key: &str) -> Result<bool> {
        let held = {
            let mut state = self.inner.state.lock().await;
            match state.token() {
                Some(token) if token.key() == key => {
                    std::mem::replace(&mut *state, LeaseState::NoLease)
                }
                _ => return Ok(false),
            }
        };
        self.finish_release(held).await
    }

    async fn finish_release(&self, held: LeaseState) -> Result<bool> {
        match held {
            LeaseState::NoLease => Ok(false),
            LeaseState::Held { token, heartbeat } => {
                heartbeat.stop().await;
                self.inner.gateway.delete(token.key()).await?;
                info!(key = %token.key(), "Released access token");
                Ok(true)
            }
        }
    }

    async fn holds(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .await
            .token()
            .is_some_and(|token| token.key() == key)
    }

    /// Return the held token or write a new one under an unused name
    async fn reserve_token(&self) -> Result<LeaseToken> {
        let mut state = self.inner.state.lock().await;
        if let Some(token) = state.token() {
            return Ok(token.clone());
        }

        let key = loop {
            let candidate = self.random_key();
            if !self.inner.gateway.exists(&candidate).await? {
                break candidate;
            }
            debug!(key = %candidate, "Token name already taken");
        };

        self.inner.gateway.create_marker(&key).await?;
        info!(key = %key, "Created and wrote token to store");

        let token = LeaseToken::new(key, Arc::downgrade(&self.inner));
        let heartbeat = self.start_heartbeat(&state, token.key())?;
        *state = LeaseState::Held {
            token: token.clone(),
            heartbeat,
        };
        Ok(token)
    }

    fn random_key(&self) -> String {
        let suffix = rand::rng().random_range(0..TOKEN_SUFFIX_RANGE);
        format!("{}{:06}", self.inner.config.access_file_prefix, suffix)
    }

    fn start_heartbeat(&self, state: &LeaseState, key: &str) -> Result<BackgroundTask> {
        if let Some(held) = state.token() {
            return Err(LeaseError::HeartbeatAlreadyRunning(held.key().to_string()));
        }

        let gateway = self.inner.gateway.clone();
        let key = key.to_string();
        Ok(BackgroundTask::spawn_periodic(
            "keep-alive-token",
            self.inner.config.keep_alive_interval(),
            move || {
                let gateway = gateway.clone();
                let key = key.clone();
                async move {
                    // A failed touch is retried by the next tick
                    match gateway.create_marker(&key).await {
                        Ok(()) => debug!(key = %key, "Touched keep alive token"),
                        Err(e) => warn!(key = %key, error = %e, "Failed to touch keep alive token"),
                    }
                    ControlFlow::Continue(())
                }
            },
        ))
    }

    fn start_watch_cycle(&self) -> BackgroundTask {
        let owner = Arc::downgrade(&self.inner);
        BackgroundTask::spawn_periodic(
            "terminate-access-watch",
            self.inner.config.check_interval_for_terminate_access(),
            move || {
                let owner = owner.clone();
                async move {
                    match owner.upgrade() {
                        Some(inner) => LeaseCoordinator::from_inner(inner).watch_tick().await,
                        None => ControlFlow::Break(()),
                    }
                }
            },
        )
    }

    async fn watch_tick(&self) -> ControlFlow<()> {
        debug!("Checking if other tokens exist");
        match self.check_if_other_tokens_exist_and_delete_stale().await {
            Ok(true) => {
                // Detach first: listeners may close this coordinator, which
                // must not wait on the task running them.
                let detached = self.inner.watch.lock().take();
                drop(detached);

                let listeners = self.inner.listeners.lock().clone();
                info!(
                    listeners = listeners.len(),
                    "Other tokens exist. Notifying all listeners"
                );
                for listener in listeners {
                    listener.access_termination_requested().await;
                }
                ControlFlow::Break(())
            }
            Ok(false) => ControlFlow::Continue(()),
            Err(e) => {
                warn!(error = %e, "Terminate access check failed");
                ControlFlow::Continue(())
            }
        }
    }

    /// Scan the prefix, delete stale markers and report whether a live
    /// marker other than our own remains.
    async fn check_if_other_tokens_exist_and_delete_stale(&self) -> Result<bool> {
        let own_key = self.current_token().await.map(|t| t.key().to_string());
        let markers = self
            .inner
            .gateway
            .list_by_prefix(&self.inner.config.access_file_prefix)
            .await?;

        let deadline = stale_deadline(Utc::now(), self.inner.config.staleness_threshold())?;

        let (stale, live): (Vec<MarkerEntry>, Vec<MarkerEntry>) = markers
            .into_iter()
            .filter(|marker| own_key.as_deref() != Some(marker.key.as_str()))
            .partition(|marker| marker.is_older_than(deadline));

        for marker in &stale {
            self.inner.gateway.delete(&marker.key).await?;
            info!(key = %marker.key, last_modified = %marker.last_modified, "Deleted stale token");
        }

        Ok(!live.is_empty())
    }
}

/// Markers last written before the returned instant are stale
fn stale_deadline(now: DateTime<Utc>, threshold: Duration) -> Result<DateTime<Utc>> {
    TimeDelta::from_std(threshold)
        .ok()
        .and_then(|threshold| now.checked_sub_signed(threshold))
        .ok_or_else(|| {
            LeaseError::Config(ConfigError::Invalid(format!(
                "staleness threshold of {} ms is out of range",
                threshold.as_millis()
            )))
        })
}

/// Releases a token reserved by an acquisition that was dropped before it
/// finished waiting.
struct PendingReservation {
    key: String,
    owner: Weak<Inner>,
    armed: bool,
}

impl PendingReservation {
    fn new(token: &LeaseToken) -> Self {
        Self {
            key: token.key().to_string(),
            owner: token.owner(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingReservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(inner) = self.owner.upgrade() else {
            return;
        };
        let key = std::mem::take(&mut self.key);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match LeaseCoordinator::from_inner(inner).release_token(&key).await {
                        Ok(released) => {
                            debug!(key = %key, released, "Released token of abandoned acquisition")
                        }
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to release token of abandoned acquisition")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime left to release token of abandoned acquisition");
            }
        }
    }
}

async fn release_through(owner: &Weak<Inner>) {
    if let Some(inner) = owner.upgrade()
        && let Err(e) = LeaseCoordinator::from_inner(inner).release().await
    {
        warn!(error = %e, "Failed to release token after termination request");
    }
}
