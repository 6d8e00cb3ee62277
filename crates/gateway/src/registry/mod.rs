//! In-memory computation handle registry.
//!
//! Maps opaque keys to computation descriptors and their materialized
//! results. Owns key minting, fingerprint deduplication, build coalescing
//! (at most one engine call in flight per key), idle-TTL expiry and LRU
//! eviction. All mutation goes through the registry's own lock, which is
//! never held across an await point; engine calls run on a detached task
//! so a caller that gives up locally never cancels the shared build.

mod handle;
mod sweep;

pub use handle::{HandleSnapshot, HandleState};
pub use sweep::spawn_sweep_task;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;

use terralens_common::api::engine::ResultEnvelope;
use terralens_common::config::RegistryConfig;
use terralens_common::descriptor::ComputationDescriptor;
use terralens_common::fingerprint::Fingerprint;
use terralens_common::{HandleKey, Result, TerralensError};

use handle::{BuildInFlight, BuildOutcome, EntryState, HandleEntry};

/// Concurrency-safe handle store. Cheap to clone; all clones share state.
///
/// Constructed once and handed to components by reference, never reached
/// through ambient global state.
#[derive(Clone)]
pub struct HandleRegistry {
    shared: Arc<RegistryShared>,
}

struct RegistryShared {
    /// Guards both maps. std::sync::Mutex because it is never held
    /// across an await point.
    inner: Mutex<RegistryInner>,
    ttl: Duration,
    max_handles: usize,
    build_timeout: Duration,
}

#[derive(Default)]
struct RegistryInner {
    handles: HashMap<HandleKey, HandleEntry>,
    by_fingerprint: HashMap<Fingerprint, HandleKey>,
}

/// Counters reported by one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub released: usize,
}

impl HandleRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                inner: Mutex::new(RegistryInner::default()),
                ttl: Duration::from_secs(config.handle_ttl_seconds),
                max_handles: config.max_handles,
                build_timeout: Duration::from_secs(config.build_timeout_seconds),
            }),
        }
    }

    /// Register a descriptor, deduplicating against live handles by
    /// fingerprint. Returns the key and whether it was deduplicated.
    ///
    /// A deduplicated insert never starts a second build: the existing
    /// key resolves to the in-flight or cached outcome.
    pub fn insert(&self, descriptor: ComputationDescriptor) -> Result<(HandleKey, bool)> {
        let kind = descriptor.handle_kind().ok_or_else(|| {
            TerralensError::InternalRegistry(format!(
                "descriptor is not cacheable: {}",
                descriptor.describe()
            ))
        })?;
        let fingerprint = Fingerprint::of(&descriptor);

        let mut inner = self.shared.inner.lock().unwrap();

        if let Some(existing) = inner.by_fingerprint.get(&fingerprint).cloned() {
            if !self.shared.purge_if_expired(&mut inner, &existing) {
                if let Some(entry) = inner.handles.get_mut(&existing) {
                    entry.touch();
                    metrics::counter!("registry.inserts", "deduplicated" => "true").increment(1);
                    tracing::debug!(key = %existing, fingerprint = %fingerprint, "Insert deduplicated");
                    return Ok((existing, true));
                }
            }
        }

        let mut key = HandleKey::mint(kind);
        while inner.handles.contains_key(&key) {
            key = HandleKey::mint(kind);
        }

        inner.handles.insert(
            key.clone(),
            HandleEntry {
                descriptor: Arc::new(descriptor),
                fingerprint,
                state: EntryState::Pending { build: None },
                created_at: Utc::now(),
                last_accessed: Instant::now(),
                attempts: 0,
            },
        );
        inner.by_fingerprint.insert(fingerprint, key.clone());

        self.shared.enforce_capacity(&mut inner, &key);

        metrics::counter!("registry.inserts", "deduplicated" => "false").increment(1);
        metrics::gauge!("registry.size").set(inner.handles.len() as f64);
        tracing::debug!(key = %key, fingerprint = %fingerprint, "Handle inserted");

        Ok((key, false))
    }

    /// Drive a handle to completion.
    ///
    /// Ready handles return their stored envelope immediately and Failed
    /// handles replay their cached error. For a Pending handle, exactly
    /// one caller spawns `compute` (bounded by the build timeout) and
    /// every concurrent caller awaits the same broadcast outcome.
    pub async fn resolve<F, Fut>(&self, key: &HandleKey, compute: F) -> Result<Arc<ResultEnvelope>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResultEnvelope>> + Send + 'static,
    {
        enum Role {
            Done(BuildOutcome),
            Wait(watch::Receiver<Option<BuildOutcome>>),
            Build(watch::Receiver<Option<BuildOutcome>>, u64),
        }

        let role = {
            let mut inner = self.shared.inner.lock().unwrap();
            self.shared.purge_if_expired(&mut inner, key);
            let Some(entry) = inner.handles.get_mut(key) else {
                return Err(TerralensError::HandleNotFound {
                    key: key.to_string(),
                });
            };
            entry.touch();
            match &mut entry.state {
                EntryState::Ready(envelope) => {
                    metrics::counter!("registry.resolve.hits").increment(1);
                    Role::Done(Ok(Arc::clone(envelope)))
                }
                EntryState::Failed(error) => {
                    metrics::counter!("registry.resolve.cached_failures").increment(1);
                    Role::Done(Err(error.clone()))
                }
                EntryState::Pending { build } => match build {
                    Some(in_flight) => {
                        metrics::counter!("registry.resolve.coalesced").increment(1);
                        Role::Wait(in_flight.tx.subscribe())
                    }
                    None => {
                        let (tx, rx) = watch::channel(None);
                        entry.attempts += 1;
                        let attempt = entry.attempts;
                        *build = Some(BuildInFlight {
                            tx,
                            started: Instant::now(),
                            attempt,
                        });
                        Role::Build(rx, attempt)
                    }
                },
            }
        };

        match role {
            Role::Done(outcome) => outcome,
            Role::Wait(rx) => await_outcome(rx, key).await,
            Role::Build(rx, attempt) => {
                metrics::counter!("registry.builds.started").increment(1);
                tracing::debug!(key = %key, attempt, "Build started");

                let shared = Arc::clone(&self.shared);
                let build_key = key.clone();
                let timeout = self.shared.build_timeout;
                let fut = compute();
                tokio::spawn(async move {
                    let outcome = match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(envelope)) => Ok(Arc::new(envelope)),
                        Ok(Err(error)) => Err(error),
                        Err(_) => Err(TerralensError::BuildTimeout {
                            key: build_key.to_string(),
                            timeout_secs: timeout.as_secs(),
                        }),
                    };
                    shared.finish_build(&build_key, attempt, outcome);
                });

                await_outcome(rx, key).await
            }
        }
    }

    /// Read-only snapshot of a handle. Touches `last_accessed`, never
    /// blocks, and never exposes the mutable entry.
    pub fn lookup(&self, key: &HandleKey) -> Result<HandleSnapshot> {
        let mut inner = self.shared.inner.lock().unwrap();
        self.shared.purge_if_expired(&mut inner, key);
        let Some(entry) = inner.handles.get_mut(key) else {
            return Err(TerralensError::HandleNotFound {
                key: key.to_string(),
            });
        };
        entry.touch();
        Ok(HandleSnapshot {
            key: key.clone(),
            descriptor: Arc::clone(&entry.descriptor),
            state: entry.state_kind(),
            created_at: entry.created_at,
        })
    }

    /// Remove a handle. Refuses while a build younger than the build
    /// timeout is in flight; an overdue build's waiters are released
    /// with BuildTimeout.
    pub fn evict(&self, key: &HandleKey) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        let evictable = match inner.handles.get(key) {
            None => return false,
            Some(entry) => !entry.build_in_flight_since(self.shared.build_timeout),
        };
        if !evictable {
            return false;
        }
        inner.remove_entry(key, "manual", self.shared.build_timeout);
        metrics::gauge!("registry.size").set(inner.handles.len() as f64);
        true
    }

    /// One expiry pass: release overdue builds, drop idle-expired
    /// entries. Called by the background sweep task and from tests.
    pub fn sweep(&self) -> SweepStats {
        let mut inner = self.shared.inner.lock().unwrap();
        let mut stats = SweepStats::default();

        // Orphaned builds: the spawned builder normally times itself out,
        // so an overdue in-flight record means the builder died. Release
        // its waiters and let a later resolve retry.
        for (key, entry) in inner.handles.iter_mut() {
            if let EntryState::Pending { build } = &mut entry.state {
                let overdue = build
                    .as_ref()
                    .is_some_and(|b| b.started.elapsed() >= self.shared.build_timeout);
                if overdue {
                    if let Some(in_flight) = build.take() {
                        let _ = in_flight.tx.send(Some(Err(TerralensError::BuildTimeout {
                            key: key.to_string(),
                            timeout_secs: self.shared.build_timeout.as_secs(),
                        })));
                        metrics::counter!("registry.builds.timeouts").increment(1);
                        tracing::warn!(key = %key, "Released waiters of an overdue build");
                        stats.released += 1;
                    }
                }
            }
        }

        let expired: Vec<HandleKey> = inner
            .handles
            .iter()
            .filter(|(_, entry)| {
                entry.last_accessed.elapsed() >= self.shared.ttl
                    && !entry.build_in_flight_since(self.shared.build_timeout)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            inner.remove_entry(&key, "expired", self.shared.build_timeout);
            stats.expired += 1;
        }

        metrics::gauge!("registry.size").set(inner.handles.len() as f64);
        stats
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Await a build outcome broadcast. Resumes exactly once per caller.
async fn await_outcome(
    mut rx: watch::Receiver<Option<BuildOutcome>>,
    key: &HandleKey,
) -> Result<Arc<ResultEnvelope>> {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without an outcome: the entry was evicted
            // mid-build.
            return Err(TerralensError::HandleNotFound {
                key: key.to_string(),
            });
        }
    }
}

impl RegistryShared {
    /// Apply a finished build attempt. Transitions the handle exactly
    /// once; a stale attempt (superseded after a forced release) is
    /// discarded, and a duplicate completion of the current attempt is
    /// an invariant violation reported loudly.
    fn finish_build(&self, key: &HandleKey, attempt: u64, outcome: BuildOutcome) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.handles.get_mut(key) else {
            tracing::warn!(key = %key, "Build finished for an evicted handle; result discarded");
            return;
        };

        let prev = std::mem::replace(&mut entry.state, EntryState::Pending { build: None });
        match prev {
            EntryState::Pending {
                build: Some(in_flight),
            } if in_flight.attempt == attempt => {
                entry.state = match &outcome {
                    Ok(envelope) => {
                        metrics::counter!("registry.builds.completed").increment(1);
                        EntryState::Ready(Arc::clone(envelope))
                    }
                    Err(TerralensError::BuildTimeout { .. }) => {
                        // Back to idle Pending: resolvable again only by
                        // an explicit retry.
                        metrics::counter!("registry.builds.timeouts").increment(1);
                        EntryState::Pending { build: None }
                    }
                    Err(error) => {
                        metrics::counter!("registry.builds.failed").increment(1);
                        EntryState::Failed(error.clone())
                    }
                };
                entry.touch();
                tracing::debug!(key = %key, attempt, ok = outcome.is_ok(), "Build finished");
                let _ = in_flight.tx.send(Some(outcome));
            }
            other => {
                entry.state = other;
                if attempt == entry.attempts {
                    // The current attempt completed against a settled
                    // state: the coalescing guarantee was violated.
                    metrics::counter!("registry.invariant_violations").increment(1);
                    tracing::error!(
                        key = %key,
                        attempt,
                        "Coalescing invariant violated: duplicate completion of the current build"
                    );
                } else {
                    tracing::debug!(key = %key, attempt, "Stale build completion discarded");
                }
            }
        }
    }

    /// Drop the entry if it idled past the TTL. Expired handles are
    /// unresolvable even before the sweep runs.
    fn purge_if_expired(&self, inner: &mut RegistryInner, key: &HandleKey) -> bool {
        let expired = inner.handles.get(key).is_some_and(|entry| {
            entry.last_accessed.elapsed() >= self.ttl
                && !entry.build_in_flight_since(self.build_timeout)
        });
        if expired {
            inner.remove_entry(key, "expired", self.build_timeout);
        }
        expired
    }

    /// Evict least-recently-used entries until the registry fits. Entries
    /// with a build in flight are skipped, as is the freshly inserted key.
    fn enforce_capacity(&self, inner: &mut RegistryInner, protect: &HandleKey) {
        while inner.handles.len() > self.max_handles {
            let victim = inner
                .handles
                .iter()
                .filter(|(key, entry)| {
                    *key != protect && !entry.build_in_flight_since(self.build_timeout)
                })
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    tracing::debug!(key = %key, "Evicting least-recently-used handle");
                    inner.remove_entry(&key, "lru", self.build_timeout);
                }
                None => {
                    tracing::warn!("Registry over capacity but every handle has a build in flight");
                    break;
                }
            }
        }
    }
}

impl RegistryInner {
    /// Remove an entry and its fingerprint mapping, releasing any
    /// remaining waiters with BuildTimeout.
    fn remove_entry(&mut self, key: &HandleKey, reason: &'static str, build_timeout: Duration) {
        if let Some(entry) = self.handles.remove(key) {
            if let EntryState::Pending {
                build: Some(in_flight),
            } = entry.state
            {
                let _ = in_flight.tx.send(Some(Err(TerralensError::BuildTimeout {
                    key: key.to_string(),
                    timeout_secs: build_timeout.as_secs(),
                })));
            }
            if self.by_fingerprint.get(&entry.fingerprint) == Some(key) {
                self.by_fingerprint.remove(&entry.fingerprint);
            }
            metrics::counter!("registry.evictions", "reason" => reason).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use terralens_common::descriptor::{CompositeMethod, Region, TemporalRange};

    fn test_config() -> RegistryConfig {
        RegistryConfig {
            handle_ttl_seconds: 3600,
            max_handles: 8,
            build_timeout_seconds: 5,
            sweep_interval_seconds: 1,
        }
    }

    fn composite(place: &str) -> ComputationDescriptor {
        ComputationDescriptor::Composite {
            dataset: "COPERNICUS/S2_SR_HARMONIZED".into(),
            region: Region::Named {
                place: place.into(),
            },
            range: TemporalRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            },
            method: CompositeMethod::Median,
            cloud_cover_max: None,
        }
    }

    fn reference(descriptor: &ComputationDescriptor) -> ResultEnvelope {
        ResultEnvelope::Reference {
            descriptor: descriptor.clone(),
        }
    }

    #[test]
    fn test_insert_deduplicates_by_fingerprint() {
        let registry = HandleRegistry::new(&test_config());

        let (k1, dedup1) = registry.insert(composite("Nairobi")).unwrap();
        let (k2, dedup2) = registry.insert(composite("  NAIROBI ")).unwrap();
        let (k3, dedup3) = registry.insert(composite("Mombasa")).unwrap();

        assert!(!dedup1);
        assert!(dedup2);
        assert_eq!(k1, k2);
        assert!(!dedup3);
        assert_ne!(k1, k3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_keys_carry_the_descriptor_kind() {
        let registry = HandleRegistry::new(&test_config());
        let (key, _) = registry.insert(composite("Nairobi")).unwrap();
        assert!(key.as_str().starts_with("composite_"));
    }

    #[test]
    fn test_discovery_descriptors_are_rejected() {
        let registry = HandleRegistry::new(&test_config());
        let result = registry.insert(ComputationDescriptor::Discovery {
            query: "sentinel".into(),
        });
        assert!(matches!(
            result,
            Err(TerralensError::InternalRegistry(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_caches_the_envelope() {
        let registry = HandleRegistry::new(&test_config());
        let descriptor = composite("Nairobi");
        let (key, _) = registry.insert(descriptor.clone()).unwrap();

        let envelope = reference(&descriptor);
        let first = registry
            .resolve(&key, move || async move { Ok(envelope) })
            .await
            .unwrap();

        // Second resolve must not invoke the closure.
        let second = registry
            .resolve(&key, || async {
                panic!("resolve must serve the cached envelope")
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failures_are_cached_per_key() {
        let registry = HandleRegistry::new(&test_config());
        let (key, _) = registry.insert(composite("Nairobi")).unwrap();

        let error = registry
            .resolve(&key, || async {
                Err(TerralensError::EngineFailure("quota exceeded".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(error, TerralensError::EngineFailure(_)));

        // The cached failure replays without re-invoking the closure.
        let replay = registry
            .resolve(&key, || async { panic!("failed handles must not rebuild") })
            .await
            .unwrap_err();
        assert!(matches!(replay, TerralensError::EngineFailure(_)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_key() {
        let registry = HandleRegistry::new(&test_config());
        let error = registry
            .resolve(&HandleKey::from("composite_000000000000"), || async {
                panic!("unknown keys never build")
            })
            .await
            .unwrap_err();
        assert!(matches!(error, TerralensError::HandleNotFound { .. }));
    }

    #[tokio::test]
    async fn test_evicted_key_is_not_found() {
        let registry = HandleRegistry::new(&test_config());
        let descriptor = composite("Nairobi");
        let (key, _) = registry.insert(descriptor.clone()).unwrap();
        let envelope = reference(&descriptor);
        registry
            .resolve(&key, move || async move { Ok(envelope) })
            .await
            .unwrap();

        assert!(registry.evict(&key));
        assert!(matches!(
            registry.lookup(&key),
            Err(TerralensError::HandleNotFound { .. })
        ));
        // A later insert of the same descriptor mints a fresh key.
        let (key2, dedup) = registry.insert(composite("Nairobi")).unwrap();
        assert!(!dedup);
        assert_ne!(key, key2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_checked_on_access() {
        let config = RegistryConfig {
            handle_ttl_seconds: 0,
            ..test_config()
        };
        let registry = HandleRegistry::new(&config);
        let (key, _) = registry.insert(composite("Nairobi")).unwrap();

        std::thread::sleep(Duration::from_millis(10));

        // Expired before any sweep ran: still unresolvable.
        assert!(matches!(
            registry.lookup(&key),
            Err(TerralensError::HandleNotFound { .. })
        ));
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let config = RegistryConfig {
            max_handles: 3,
            ..test_config()
        };
        let registry = HandleRegistry::new(&config);

        let (k1, _) = registry.insert(composite("a")).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let (k2, _) = registry.insert(composite("b")).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let (k3, _) = registry.insert(composite("c")).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        // Touch k1 so k2 becomes the least recently used.
        registry.lookup(&k1).unwrap();
        let (k4, _) = registry.insert(composite("d")).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.lookup(&k1).is_ok());
        assert!(matches!(
            registry.lookup(&k2),
            Err(TerralensError::HandleNotFound { .. })
        ));
        assert!(registry.lookup(&k3).is_ok());
        assert!(registry.lookup(&k4).is_ok());
    }

    #[tokio::test]
    async fn test_sweep_reports_expired_entries() {
        let config = RegistryConfig {
            handle_ttl_seconds: 0,
            ..test_config()
        };
        let registry = HandleRegistry::new(&config);
        registry.insert(composite("a")).unwrap();
        registry.insert(composite("b")).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        let stats = registry.sweep();
        assert_eq!(stats.expired, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_snapshot_exposes_descriptor_and_state() {
        let registry = HandleRegistry::new(&test_config());
        let descriptor = composite("Nairobi");
        let (key, _) = registry.insert(descriptor.clone()).unwrap();

        let snapshot = registry.lookup(&key).unwrap();
        assert_eq!(snapshot.state, HandleState::Pending);
        assert_eq!(*snapshot.descriptor, descriptor);

        let envelope = reference(&descriptor);
        registry
            .resolve(&key, move || async move { Ok(envelope) })
            .await
            .unwrap();
        assert_eq!(registry.lookup(&key).unwrap().state, HandleState::Ready);
    }
}
