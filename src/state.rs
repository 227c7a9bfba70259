use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::cache::CacheEntryMeta;
use crate::fingerprint::FingerprintStore;
use crate::types::UnitId;

/// Default file name for persisted cross-run state
pub const STATE_FILE: &str = ".mudanza-state.json";

/// Serialized cross-run state: enough to detect unchanged units on the next
/// run (fingerprints), rebuild the dependency graph, and audit what the
/// cache held. Artifacts themselves are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    /// Project identifier this state belongs to
    pub project: String,
    pub fingerprints: FingerprintStore,
    pub edges: Vec<(UnitId, UnitId)>,
    pub cache_entries: Vec<CacheEntryMeta>,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectState {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            fingerprints: FingerprintStore::new(),
            edges: Vec::new(),
            cache_entries: Vec::new(),
            saved_at: chrono::Utc::now(),
        }
    }

    /// Load state from a file; a missing file yields fresh state so the
    /// first run of a project needs no setup
    pub fn load_or_default(path: &Path, project: &str) -> Result<Self> {
        if !path.exists() {
            info!("No prior state at {:?}, starting fresh", path);
            return Ok(Self::new(project));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        if state.project != project {
            info!(
                "State at {:?} belongs to project {:?}, ignoring for {:?}",
                path, state.project, project
            );
            return Ok(Self::new(project));
        }
        info!(
            "Loaded state with {} fingerprint(s), {} edge(s)",
            state.fingerprints.len(),
            state.edges.len()
        );
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;
        Ok(())
    }
}
