use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable configuration for a migration run.
///
/// Tolerance thresholds are configurable with the production defaults baked
/// in; they are read once at run start and never mutated mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Numeric outputs compare equal when within this tolerance
    pub epsilon: f64,

    /// Minimum syscall-sequence match rate for a Passed verdict
    pub syscall_match_threshold: f64,

    /// Fixed size of the work-stealing worker pool
    pub worker_count: usize,

    /// Optional LRU bound on the transpilation cache; None = unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    /// Cancel remaining queued tasks after the first failure (in-flight
    /// tasks still drain)
    pub fail_fast: bool,

    /// Retries for Inconclusive validations before reporting as-is
    pub inconclusive_retries: usize,

    /// Wall-clock budget per task in milliseconds
    pub task_timeout_ms: u64,

    /// Gate verdicts on the wall-clock performance ratio
    pub gate_on_performance: bool,

    /// Maximum transpiled/original duration ratio when gating on performance
    pub performance_ratio_limit: f64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            syscall_match_threshold: 0.98,
            worker_count: default_worker_count(),
            cache_capacity: None,
            fail_fast: false,
            inconclusive_retries: 2,
            task_timeout_ms: 30_000,
            gate_on_performance: false,
            performance_ratio_limit: 10.0,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl MigrationConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check threshold ranges before a run starts
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.syscall_match_threshold) {
            anyhow::bail!(
                "syscall_match_threshold must be in [0, 1], got {}",
                self.syscall_match_threshold
            );
        }
        if self.epsilon < 0.0 {
            anyhow::bail!("epsilon must be non-negative, got {}", self.epsilon);
        }
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        Ok(())
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }
}
