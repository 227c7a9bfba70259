use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{MigrationError, Result};
use crate::fingerprint::Fingerprint;
use crate::types::Artifact;

/// State of one cache slot. Failed results are propagated to waiters and the
/// slot is then evicted, so a later request retries instead of sticking in
/// Failed forever.
enum SlotState {
    Pending,
    Ready(Arc<Artifact>),
    Failed(MigrationError),
}

struct Slot {
    state: Mutex<SlotState>,
    resolved: Condvar,
    /// Logical clock of the last access, for LRU eviction
    last_used: AtomicU64,
}

impl Slot {
    fn pending(tick: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Pending),
            resolved: Condvar::new(),
            last_used: AtomicU64::new(tick),
        })
    }
}

/// Per-entry metadata exposed for diagnostics and cross-run persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub fingerprint: Fingerprint,
    pub artifact_digest: String,
}

/// Hit/miss counters for the aggregate report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Content-addressed transpilation cache.
///
/// Guarantees at most one concurrent transpilation per fingerprint: the first
/// caller for a fingerprint runs the compute function while every concurrent
/// caller blocks on the same slot and shares the result. Synchronization is
/// per-fingerprint; the map-level lock is never held across a computation.
pub struct TranspilationCache {
    slots: Mutex<HashMap<Fingerprint, Arc<Slot>>>,
    /// Pin counts per fingerprint. Kept outside the slot map so a pin taken
    /// before the artifact is computed still protects the entry once it
    /// lands; pinned fingerprints are never eviction candidates.
    pinned: Mutex<HashMap<Fingerprint, usize>>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    clock: AtomicU64,
}

impl TranspilationCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    /// Return the cached artifact for `fp`, or compute it via `compute_fn`.
    ///
    /// Exactly one invocation of `compute_fn` happens per fingerprint no
    /// matter how many callers race; failures propagate to all waiters and
    /// the slot is evicted so a future call retries.
    pub fn get_or_compute<F>(&self, fp: &Fingerprint, compute_fn: F) -> Result<Arc<Artifact>>
    where
        F: FnOnce() -> Result<Artifact>,
    {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);

        let (slot, owner) = {
            let mut slots = self.slots.lock();
            match slots.get(fp) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Slot::pending(tick);
                    slots.insert(fp.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if owner {
            return self.compute_into_slot(fp, &slot, compute_fn);
        }

        slot.last_used.store(tick, Ordering::Relaxed);
        let mut state = slot.state.lock();
        while matches!(*state, SlotState::Pending) {
            slot.resolved.wait(&mut state);
        }
        match &*state {
            SlotState::Ready(artifact) => {
                let artifact = Arc::clone(artifact);
                drop(state);
                self.verify_digest(fp, &artifact)?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", fp);
                Ok(artifact)
            }
            SlotState::Failed(err) => Err(err.clone()),
            SlotState::Pending => unreachable!("waited past Pending"),
        }
    }

    fn compute_into_slot<F>(&self, fp: &Fingerprint, slot: &Arc<Slot>, compute_fn: F) -> Result<Arc<Artifact>>
    where
        F: FnOnce() -> Result<Artifact>,
    {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}, computing", fp);

        match compute_fn() {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                {
                    let mut state = slot.state.lock();
                    *state = SlotState::Ready(Arc::clone(&artifact));
                }
                slot.resolved.notify_all();
                self.maybe_evict();
                Ok(artifact)
            }
            Err(err) => {
                {
                    let mut state = slot.state.lock();
                    *state = SlotState::Failed(err.clone());
                }
                slot.resolved.notify_all();
                // Evict so the next request retries rather than observing a
                // stuck Failed entry
                self.slots.lock().remove(fp);
                Err(err)
            }
        }
    }

    /// A hit must serve the exact artifact the fingerprint promised; a digest
    /// mismatch means a fingerprint collision and poisons the whole run.
    fn verify_digest(&self, fp: &Fingerprint, artifact: &Artifact) -> Result<()> {
        let actual = blake3::hash(artifact.target_source.as_bytes())
            .to_hex()
            .to_string();
        if actual != artifact.digest {
            error!(
                "Cache corruption detected for {}: digest {} != {}",
                fp, actual, artifact.digest
            );
            return Err(MigrationError::CacheCorruption {
                fingerprint: fp.to_string(),
                expected: artifact.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Artifact for a Ready entry, if present. Non-blocking; Pending and
    /// Failed entries report None. Used by the orchestrator to gate
    /// validation tasks on transpile completion.
    pub fn ready_artifact(&self, fp: &Fingerprint) -> Option<Arc<Artifact>> {
        let slot = {
            let slots = self.slots.lock();
            slots.get(fp).map(Arc::clone)?
        };
        slot.last_used
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready(artifact) => Some(Arc::clone(artifact)),
            _ => None,
        }
    }

    /// Mark a fingerprint as referenced by a pending validation task. Valid
    /// before the artifact exists: the pin protects whatever lands under
    /// this fingerprint later.
    pub fn pin(&self, fp: &Fingerprint) {
        *self.pinned.lock().entry(fp.clone()).or_insert(0) += 1;
    }

    /// Release a validation task's reference
    pub fn unpin(&self, fp: &Fingerprint) {
        let mut pinned = self.pinned.lock();
        if let Some(count) = pinned.get_mut(fp) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(fp);
            }
        }
    }

    /// Evict least-recently-used unpinned Ready entries down to capacity.
    /// The cache may exceed capacity transiently while every entry is
    /// pinned or in flight.
    fn maybe_evict(&self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        let mut slots = self.slots.lock();
        let pinned = self.pinned.lock();
        while slots.len() > capacity {
            let victim = slots
                .iter()
                .filter(|(fp, slot)| {
                    !pinned.contains_key(*fp)
                        && matches!(*slot.state.lock(), SlotState::Ready(_))
                })
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(fp, _)| fp.clone());
            match victim {
                Some(fp) => {
                    debug!("Evicting {} (LRU, over capacity)", fp);
                    slots.remove(&fp);
                }
                None => break, // everything pinned or in flight
            }
        }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.slots.lock().contains_key(fp)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Metadata for every Ready entry, for diagnostics and the persisted
    /// cross-run state (artifacts themselves are not persisted)
    pub fn entry_metadata(&self) -> Vec<CacheEntryMeta> {
        let slots = self.slots.lock();
        let mut metas: Vec<CacheEntryMeta> = slots
            .iter()
            .filter_map(|(fp, slot)| {
                let state = slot.state.lock();
                match &*state {
                    SlotState::Ready(artifact) => Some(CacheEntryMeta {
                        fingerprint: fp.clone(),
                        artifact_digest: artifact.digest.clone(),
                    }),
                    _ => None,
                }
            })
            .collect();
        metas.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        metas
    }
}
