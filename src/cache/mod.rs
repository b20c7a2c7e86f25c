// src/cache/mod.rs

//! Content-addressed artifact cache with single-flight computation.
//!
//! A job asks [`Cache::acquire_or_wait`] for its fingerprint and gets either
//! the existing artifact or a [`ComputeSlot`]. Only one slot per fingerprint
//! exists at a time; other callers wait until the slot holder commits or
//! abandons. After an abandon, waiters race for a new slot under the state
//! lock, so exactly one of them is promoted.
//!
//! Layers:
//! - an in-memory index (`Arc<Artifact>` per fingerprint), subject to
//!   [`EvictionPolicy`]
//! - the durable [`ArtifactStore`], which is never evicted

pub mod artifact;
pub mod eviction;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::errors::Result;
use crate::fingerprint::Fingerprint;
use crate::job::{FailureKind, JobFailure};
use crate::retry::IoRetry;
use crate::storage::{ArtifactStore, MemoryArtifactStore};
use crate::task::TaskOutput;

pub use artifact::Artifact;
pub use eviction::{EvictionCandidate, EvictionPolicy};

/// How an in-flight computation ended.
#[derive(Debug, Clone)]
enum Resolution {
    Committed(Arc<Artifact>),
    Abandoned(JobFailure),
}

struct InFlight {
    token: u64,
    tx: watch::Sender<Option<Resolution>>,
}

struct IndexEntry {
    artifact: Arc<Artifact>,
    inserted_at: Instant,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, IndexEntry>,
    in_flight: HashMap<Fingerprint, InFlight>,
    /// Access clock for LRU.
    clock: u64,
    next_token: u64,
}

impl CacheState {
    fn lookup(&mut self, fp: &Fingerprint, policy: &EvictionPolicy) -> (Option<Arc<Artifact>>, u64) {
        let now = Instant::now();
        let expired = match self.entries.get(fp) {
            None => return (None, 0),
            Some(entry) => policy.is_expired(entry.inserted_at, now),
        };
        if expired {
            self.entries.remove(fp);
            return (None, 1);
        }
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(fp).map(|e| {
            e.last_access = clock;
            Arc::clone(&e.artifact)
        });
        (entry, 0)
    }

    /// Publish an artifact in the index; returns how many entries were evicted.
    fn insert(&mut self, artifact: Arc<Artifact>, policy: &EvictionPolicy) -> u64 {
        self.clock += 1;
        let now = Instant::now();
        self.entries.insert(
            artifact.fingerprint,
            IndexEntry {
                artifact,
                inserted_at: now,
                last_access: self.clock,
            },
        );

        if *policy == EvictionPolicy::None {
            return 0;
        }
        let mut candidates: Vec<EvictionCandidate> = self
            .entries
            .iter()
            .map(|(fp, e)| EvictionCandidate {
                fingerprint: *fp,
                last_access: e.last_access,
                inserted_at: e.inserted_at,
            })
            .collect();
        let victims = policy.select_victims(&mut candidates, now);
        for fp in &victims {
            self.entries.remove(fp);
        }
        victims.len() as u64
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    commits: AtomicU64,
    abandons: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Compute slots handed out.
    pub computes: u64,
    pub commits: u64,
    pub abandons: u64,
    pub evictions: u64,
    /// Entries currently in the in-memory index.
    pub entries: usize,
    pub in_flight: usize,
}

struct CacheInner {
    store: Arc<dyn ArtifactStore>,
    io: IoRetry,
    policy: EvictionPolicy,
    state: Mutex<CacheState>,
    counters: CacheCounters,
}

/// Handle to the cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.inner.store)
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Result of [`Cache::acquire_or_wait`].
#[derive(Debug)]
pub enum Acquired {
    /// The caller owns the fingerprint and must commit or abandon.
    Compute(ComputeSlot),
    Existing(Arc<Artifact>),
}

/// Exclusive right to compute one fingerprint.
///
/// Dropping an unresolved slot abandons it with a `Cancelled` failure.
pub struct ComputeSlot {
    cache: Cache,
    fingerprint: Fingerprint,
    token: u64,
    previous_failure: Option<JobFailure>,
    resolved: bool,
}

impl fmt::Debug for ComputeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeSlot")
            .field("fingerprint", &self.fingerprint)
            .field("previous_failure", &self.previous_failure)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl ComputeSlot {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Failure of the computation this slot was promoted from, if any.
    pub fn previous_failure(&self) -> Option<&JobFailure> {
        self.previous_failure.as_ref()
    }
}

impl Drop for ComputeSlot {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(fingerprint = %self.fingerprint.short(), "compute slot dropped unresolved");
            self.cache.resolve(
                self.fingerprint,
                self.token,
                Resolution::Abandoned(JobFailure::cancelled("compute slot dropped")),
            );
        }
    }
}

enum Claim {
    Slot(ComputeSlot),
    Wait(watch::Receiver<Option<Resolution>>),
    Hit(Arc<Artifact>),
}

impl Cache {
    pub fn new(store: Arc<dyn ArtifactStore>, policy: EvictionPolicy, io: IoRetry) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                io,
                policy,
                state: Mutex::new(CacheState::default()),
                counters: CacheCounters::default(),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryArtifactStore::new()),
            EvictionPolicy::None,
            IoRetry::default(),
        )
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.inner.policy
    }

    /// Look up an artifact without waiting on in-flight work.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<Artifact>>> {
        if let Some(artifact) = self.lookup_index(fingerprint) {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(artifact));
        }
        match self.load_from_store(*fingerprint).await? {
            Some(artifact) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(self.publish(artifact)))
            }
            None => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Whether some caller currently holds a compute slot for `fingerprint`.
    pub fn is_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.state.lock().in_flight.contains_key(fingerprint)
    }

    /// Return the existing artifact, or claim the right to compute it.
    ///
    /// If another caller holds the slot, waits for it to resolve. A store
    /// error is returned as is, never treated as a miss.
    pub async fn acquire_or_wait(&self, fingerprint: &Fingerprint) -> Result<Acquired> {
        let fp = *fingerprint;
        let mut previous_failure: Option<JobFailure> = None;

        loop {
            let claim = self.claim(fp, previous_failure.take());
            let mut rx = match claim {
                Claim::Hit(artifact) => {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Acquired::Existing(artifact));
                }
                Claim::Slot(slot) => return self.check_store(slot).await,
                Claim::Wait(rx) => rx,
            };

            trace!(fingerprint = %fp.short(), "waiting on in-flight computation");
            let resolution = rx.wait_for(Option::is_some).await.ok().and_then(|r| (*r).clone());
            match resolution {
                Some(Resolution::Committed(artifact)) => {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Acquired::Existing(artifact));
                }
                Some(Resolution::Abandoned(failure)) => {
                    debug!(fingerprint = %fp.short(), %failure, "in-flight computation abandoned; re-acquiring");
                    previous_failure = Some(failure);
                }
                // Sender gone without a resolution; the slot is no longer registered.
                None => {}
            }
        }
    }

    /// Persist a computed output, publish it and wake waiters.
    ///
    /// If the store already holds an artifact for this fingerprint, that one
    /// is returned and published instead.
    pub async fn commit(
        &self,
        mut slot: ComputeSlot,
        output: TaskOutput,
        cost: Duration,
    ) -> Result<Arc<Artifact>> {
        let fp = slot.fingerprint;
        let mut artifact = Artifact::new(fp, output, cost);

        let bytes = match artifact.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                let failure = JobFailure::new(FailureKind::Serialization, e.to_string());
                self.resolve_slot(&mut slot, Resolution::Abandoned(failure));
                return Err(e);
            }
        };

        let store = Arc::clone(&self.inner.store);
        let key = artifact.key();
        let written = self
            .inner
            .io
            .run_blocking("artifact put", move || store.put(&key, &bytes))
            .await;

        let artifact = match written {
            Ok(true) => artifact,
            Ok(false) => match self.load_from_store(fp).await {
                Ok(Some(existing)) => {
                    debug!(fingerprint = %fp.short(), "artifact already stored; keeping first commit");
                    existing
                }
                Ok(None) => artifact,
                Err(e) => {
                    self.resolve_slot(&mut slot, Resolution::Abandoned(JobFailure::storage(&e)));
                    return Err(e);
                }
            },
            Err(e) => {
                warn!(fingerprint = %fp.short(), error = %e, "artifact commit failed");
                self.resolve_slot(&mut slot, Resolution::Abandoned(JobFailure::storage(&e)));
                return Err(e);
            }
        };

        let artifact = Arc::new(artifact);
        self.resolve_slot(&mut slot, Resolution::Committed(Arc::clone(&artifact)));
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
        debug!(fingerprint = %fp.short(), size = artifact.size, "committed artifact");
        Ok(artifact)
    }

    /// Release a slot without publishing anything.
    pub fn abandon(&self, mut slot: ComputeSlot, failure: JobFailure) {
        debug!(fingerprint = %slot.fingerprint.short(), %failure, "abandoning compute slot");
        self.resolve_slot(&mut slot, Resolution::Abandoned(failure));
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        let state = self.inner.state.lock();
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            computes: c.computes.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            abandons: c.abandons.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
        }
    }

    fn lookup_index(&self, fp: &Fingerprint) -> Option<Arc<Artifact>> {
        let (artifact, expired) = self.inner.state.lock().lookup(fp, &self.inner.policy);
        if expired > 0 {
            self.inner.counters.evictions.fetch_add(expired, Ordering::Relaxed);
        }
        artifact
    }

    fn claim(&self, fp: Fingerprint, previous_failure: Option<JobFailure>) -> Claim {
        let mut state = self.inner.state.lock();
        let (hit, expired) = state.lookup(&fp, &self.inner.policy);
        if expired > 0 {
            self.inner.counters.evictions.fetch_add(expired, Ordering::Relaxed);
        }
        if let Some(artifact) = hit {
            return Claim::Hit(artifact);
        }
        if let Some(flight) = state.in_flight.get(&fp) {
            return Claim::Wait(flight.tx.subscribe());
        }

        state.next_token += 1;
        let token = state.next_token;
        let (tx, _rx) = watch::channel(None);
        state.in_flight.insert(fp, InFlight { token, tx });
        Claim::Slot(ComputeSlot {
            cache: self.clone(),
            fingerprint: fp,
            token,
            previous_failure,
            resolved: false,
        })
    }

    /// A freshly claimed slot may still find the artifact in the durable
    /// store (committed by an earlier process or evicted from the index).
    async fn check_store(&self, mut slot: ComputeSlot) -> Result<Acquired> {
        match self.load_from_store(slot.fingerprint).await {
            Ok(Some(artifact)) => {
                let artifact = Arc::new(artifact);
                self.resolve_slot(&mut slot, Resolution::Committed(Arc::clone(&artifact)));
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Acquired::Existing(artifact))
            }
            Ok(None) => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.inner.counters.computes.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %slot.fingerprint.short(), "claimed compute slot");
                Ok(Acquired::Compute(slot))
            }
            Err(e) => {
                self.resolve_slot(&mut slot, Resolution::Abandoned(JobFailure::storage(&e)));
                Err(e)
            }
        }
    }

    async fn load_from_store(&self, fp: Fingerprint) -> Result<Option<Artifact>> {
        let store = Arc::clone(&self.inner.store);
        let key = Artifact::key_for(&fp);
        let bytes = self
            .inner
            .io
            .run_blocking("artifact get", move || store.get(&key))
            .await?;
        bytes.map(|b| Artifact::decode(&fp, &b)).transpose()
    }

    fn publish(&self, artifact: Artifact) -> Arc<Artifact> {
        let artifact = Arc::new(artifact);
        let evicted = self
            .inner
            .state
            .lock()
            .insert(Arc::clone(&artifact), &self.inner.policy);
        self.inner.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
        artifact
    }

    fn resolve_slot(&self, slot: &mut ComputeSlot, resolution: Resolution) {
        slot.resolved = true;
        self.resolve(slot.fingerprint, slot.token, resolution);
    }

    fn resolve(&self, fp: Fingerprint, token: u64, resolution: Resolution) {
        let mut state = self.inner.state.lock();
        let owned = state.in_flight.get(&fp).is_some_and(|f| f.token == token);
        if !owned {
            return;
        }
        let Some(flight) = state.in_flight.remove(&fp) else {
            return;
        };

        match &resolution {
            Resolution::Committed(artifact) => {
                let evicted = state.insert(Arc::clone(artifact), &self.inner.policy);
                self.inner.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
            }
            Resolution::Abandoned(_) => {
                self.inner.counters.abandons.fetch_add(1, Ordering::Relaxed);
            }
        }
        flight.tx.send_replace(Some(resolution));
    }
}
