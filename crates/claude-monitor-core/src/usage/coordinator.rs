//! Single-flight caching coordinator in front of the upstream usage source.
//!
//! A fresh cached snapshot is served without touching the upstream. On a
//! miss exactly one caller (the leader) fetches; callers arriving meanwhile
//! get the stale snapshot if one exists, or wait a bounded interval for the
//! leader to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::normalizer::{normalize, select_organization};
use super::source::UsageSource;
use super::types::UsageSnapshot;
use crate::credential::CredentialSupplier;

/// Freshness and wait policy
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Age below which a cached snapshot is served without refetching
    pub ttl: Duration,
    /// How long a caller without any cached snapshot waits on an in-flight fetch
    pub wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            wait: Duration::from_secs(5),
        }
    }
}

/// A snapshot plus the instant it was captured. Replaced wholesale.
struct CacheEntry {
    snapshot: UsageSnapshot,
    captured_at: Instant,
}

#[derive(Default)]
struct CoordinatorState {
    entry: Option<CacheEntry>,
    in_flight: bool,
}

struct Shared {
    state: Mutex<CoordinatorState>,
    /// Bumped every time a fetch attempt ends
    done_tx: watch::Sender<u64>,
}

impl Shared {
    fn install(&self, snapshot: UsageSnapshot) {
        self.state.lock().entry = Some(CacheEntry {
            snapshot,
            captured_at: Instant::now(),
        });
    }
}

/// Clears the in-flight flag and wakes followers on every exit path
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.state.lock().in_flight = false;
        self.shared
            .done_tx
            .send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// What a caller found when it looked at the state
enum Observed {
    /// A snapshot to serve right away (fresh, or stale while a fetch runs)
    Ready(UsageSnapshot),
    /// A fetch is running and nothing is cached; subscribed for its end
    Busy(watch::Receiver<u64>),
    /// No usable snapshot and nobody fetching
    Idle,
}

enum Role {
    Leader(String),
    Follower(watch::Receiver<u64>),
}

/// Cheaply cloneable handle; all clones share one cache and one in-flight flag.
#[derive(Clone)]
pub struct FetchCoordinator {
    shared: Arc<Shared>,
    source: Arc<dyn UsageSource>,
    credentials: Arc<dyn CredentialSupplier>,
    config: CoordinatorConfig,
}

impl FetchCoordinator {
    pub fn new(
        source: Arc<dyn UsageSource>,
        credentials: Arc<dyn CredentialSupplier>,
        config: CoordinatorConfig,
    ) -> Self {
        let (done_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CoordinatorState::default()),
                done_tx,
            }),
            source,
            credentials,
            config,
        }
    }

    /// Last installed snapshot regardless of age
    pub fn cached(&self) -> Option<UsageSnapshot> {
        self.shared
            .state
            .lock()
            .entry
            .as_ref()
            .map(|entry| entry.snapshot.clone())
    }

    /// Serve the freshest affordable snapshot.
    pub async fn get(&self) -> Result<UsageSnapshot, FetchError> {
        let observed = self.observe(&self.shared.state.lock());
        match observed {
            Observed::Ready(snapshot) => return Ok(snapshot),
            Observed::Busy(rx) => return self.follow(rx).await,
            Observed::Idle => {}
        }

        // The supplier may read a file; keep it outside the lock.
        let credential = self
            .credentials
            .credential()
            .ok_or(FetchError::CredentialMissing)?;

        // Another caller may have claimed the fetch meanwhile; re-check.
        let role = {
            let mut state = self.shared.state.lock();
            match self.observe(&state) {
                Observed::Ready(snapshot) => return Ok(snapshot),
                Observed::Busy(rx) => Role::Follower(rx),
                Observed::Idle => {
                    state.in_flight = true;
                    Role::Leader(credential)
                }
            }
        };

        match role {
            Role::Leader(credential) => self.lead(credential).await,
            Role::Follower(rx) => self.follow(rx).await,
        }
    }

    /// Classify the state under the caller's lock; nothing here awaits.
    fn observe(&self, state: &CoordinatorState) -> Observed {
        if let Some(entry) = state.entry.as_ref() {
            if entry.captured_at.elapsed() < self.config.ttl {
                debug!("Usage cache hit");
                return Observed::Ready(entry.snapshot.clone());
            }
        }

        if !state.in_flight {
            return Observed::Idle;
        }
        match state.entry.as_ref() {
            Some(entry) => {
                debug!("Fetch already in progress, returning stale snapshot");
                Observed::Ready(entry.snapshot.clone())
            }
            None => Observed::Busy(self.shared.done_tx.subscribe()),
        }
    }

    /// Run the upstream fetch in its own task so a departed caller cannot cancel it
    async fn lead(&self, credential: String) -> Result<UsageSnapshot, FetchError> {
        let guard = InFlightGuard {
            shared: Arc::clone(&self.shared),
        };
        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);

        info!("Starting upstream usage fetch");
        let task = tokio::spawn(async move {
            let _guard = guard;
            let snapshot =
                tokio::task::spawn_blocking(move || fetch_once(source.as_ref(), &credential))
                    .await
                    .map_err(|e| FetchError::Task(e.to_string()))??;

            if snapshot.has_windows() {
                shared.install(snapshot.clone());
                info!("Usage snapshot cached");
            } else {
                warn!("Upstream returned no utilization windows; cache left unchanged");
            }
            Ok::<_, FetchError>(snapshot)
        });

        match task.await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!("Usage fetch failed: {}", e);
                }
                result
            }
            Err(e) => Err(FetchError::Task(e.to_string())),
        }
    }

    async fn follow(&self, mut rx: watch::Receiver<u64>) -> Result<UsageSnapshot, FetchError> {
        debug!(
            "Fetch already in progress, waiting up to {:?}",
            self.config.wait
        );
        match tokio::time::timeout(self.config.wait, rx.changed()).await {
            Ok(_) => debug!("In-flight fetch finished"),
            Err(_) => debug!("Timed out waiting for in-flight fetch"),
        }
        self.cached().ok_or(FetchError::FetchInProgress)
    }
}

/// One uncached fetch: list organizations, pick one, fetch and normalize its usage.
pub fn fetch_once(source: &dyn UsageSource, credential: &str) -> Result<UsageSnapshot, FetchError> {
    let orgs = source.organizations(credential)?;
    let org = select_organization(&orgs)?;
    info!(
        "Fetching usage for {}",
        org.name.as_deref().unwrap_or(&org.uuid)
    );
    let usage = source.usage(credential, &org.uuid)?;
    Ok(normalize(org, &usage, Utc::now()))
}
