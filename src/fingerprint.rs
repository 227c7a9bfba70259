use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::UnitId;

/// Deterministic digest over a unit's transpilation-relevant inputs: source
/// bytes, transpiler configuration, and transpiler version.
///
/// The cache-correctness contract: two units with identical fingerprints are
/// guaranteed to produce identical artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the fingerprint for a content snapshot. Pure and deterministic;
/// any inconsistency downstream is a caller bug, not a runtime error.
pub fn fingerprint(content: &[u8], config: &str, transpiler_version: &str) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    // Length-prefix each field so (ab, c) and (a, bc) never collide
    hasher.update(&(content.len() as u64).to_le_bytes());
    hasher.update(content);
    hasher.update(&(config.len() as u64).to_le_bytes());
    hasher.update(config.as_bytes());
    hasher.update(&(transpiler_version.len() as u64).to_le_bytes());
    hasher.update(transpiler_version.as_bytes());
    Fingerprint(hasher.finalize().to_hex().to_string())
}

/// Content-addressed map from unit identity to its most recently computed
/// fingerprint. A pure function plus a table; no failure modes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintStore {
    entries: HashMap<UnitId, Fingerprint>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fingerprint most recently computed for a unit
    pub fn record(&mut self, unit_id: UnitId, fp: Fingerprint) {
        self.entries.insert(unit_id, fp);
    }

    /// Most recently recorded fingerprint, or None if never computed
    pub fn lookup(&self, unit_id: &UnitId) -> Option<&Fingerprint> {
        self.entries.get(unit_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
