use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::cache::TranspilationCache;
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::fingerprint::{fingerprint, Fingerprint, FingerprintStore};
use crate::graph::DependencyGraph;
use crate::orchestrator::{ArtifactGate, CancellationToken, Orchestrator, TaskExecutor};
use crate::report::MigrationReport;
use crate::selector;
use crate::state::ProjectState;
use crate::types::{Artifact, MigrationTask, TaskState, Unit, UnitId, ValidationTask};
use crate::validator::{EquivalenceValidator, Executor, ValidationOutcome};

/// External code-generation collaborator: language-specific, opaque to the
/// orchestration core.
pub trait Transpiler: Send + Sync {
    fn transpile(&self, unit: &Unit) -> Result<Artifact, MigrationError>;

    /// Version identifier folded into fingerprints; bumping it invalidates
    /// every cached artifact
    fn version(&self) -> String;

    /// Digest of the transpiler configuration that can affect output
    fn config_digest(&self) -> String;
}

/// Shared handles threaded through a run. Explicit and passed in; never
/// ambient global state.
pub struct RunContext {
    pub fingerprints: Mutex<FingerprintStore>,
    pub graph: DependencyGraph,
    pub cache: TranspilationCache,
}

impl RunContext {
    pub fn new(config: &MigrationConfig) -> Self {
        Self {
            fingerprints: Mutex::new(FingerprintStore::new()),
            graph: DependencyGraph::new(),
            cache: TranspilationCache::new(config.cache_capacity),
        }
    }
}

/// Migration engine: owns the run context across runs (in-process
/// incrementality) and coordinates fingerprinting, change detection, test
/// selection, scheduling, and reporting.
pub struct MigrationEngine {
    project: String,
    config: MigrationConfig,
    ctx: RunContext,
    transpiler: Arc<dyn Transpiler>,
    executor: Arc<dyn Executor>,
    validation_inputs: HashMap<UnitId, Vec<String>>,
}

impl MigrationEngine {
    pub fn new(
        project: impl Into<String>,
        config: MigrationConfig,
        transpiler: Arc<dyn Transpiler>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            project: project.into(),
            ctx: RunContext::new(&config),
            config,
            transpiler,
            executor,
            validation_inputs: HashMap::new(),
        }
    }

    /// Inputs to drive both executions with during validation, per unit
    pub fn with_validation_inputs(mut self, inputs: HashMap<UnitId, Vec<String>>) -> Self {
        self.validation_inputs = inputs;
        self
    }

    /// Read-only diagnostic access to the dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.ctx.graph
    }

    /// Read-only diagnostic access to the transpilation cache
    pub fn cache(&self) -> &TranspilationCache {
        &self.ctx.cache
    }

    /// Load fingerprint store and dependency edges persisted by an earlier
    /// run of this project
    pub fn load_state(&mut self, path: &Path) -> Result<(), MigrationError> {
        let state = ProjectState::load_or_default(path, &self.project)
            .map_err(|e| MigrationError::State(e.to_string()))?;
        *self.ctx.fingerprints.lock() = state.fingerprints;
        for (from, to) in state.edges {
            self.ctx.graph.add_edge(from, to);
        }
        Ok(())
    }

    /// Persist fingerprints, edges, and cache metadata for the next run
    pub fn save_state(&self, path: &Path) -> Result<(), MigrationError> {
        let state = ProjectState {
            project: self.project.clone(),
            fingerprints: self.ctx.fingerprints.lock().clone(),
            edges: self.ctx.graph.edges(),
            cache_entries: self.ctx.cache.entry_metadata(),
            saved_at: chrono::Utc::now(),
        };
        state
            .save(path)
            .map_err(|e| MigrationError::State(e.to_string()))
    }

    /// Execute one migration run over the given units.
    ///
    /// Unchanged units (same fingerprint, artifact already cached) are
    /// reported as cache hits and re-validated only when inside the impact
    /// set of some changed unit. Per-unit failures are collected into the
    /// report; only cache corruption aborts the run.
    pub fn run(&self, units: &[Unit]) -> Result<MigrationReport, MigrationError> {
        let started = Instant::now();
        let stats_before = self.ctx.cache.stats();
        let active: Vec<&Unit> = units.iter().filter(|u| !u.removed).collect();
        info!(
            "Starting migration run for {:?}: {} unit(s) ({} removed)",
            self.project,
            active.len(),
            units.len() - active.len()
        );

        // Fingerprint every active unit and detect changes against the
        // store; removed units count as changed so their dependents
        // re-validate
        let config_digest = self.transpiler.config_digest();
        let version = self.transpiler.version();
        let mut fps: HashMap<UnitId, Fingerprint> = HashMap::new();
        let mut changed: Vec<UnitId> = Vec::new();
        {
            let mut store = self.ctx.fingerprints.lock();
            for unit in &active {
                let fp = fingerprint(unit.content.as_bytes(), &config_digest, &version);
                let prior = store.lookup(&unit.id);
                let artifact_cached = self.ctx.cache.contains(&fp);
                if prior != Some(&fp) || !artifact_cached {
                    changed.push(unit.id.clone());
                }
                store.record(unit.id.clone(), fp.clone());
                fps.insert(unit.id.clone(), fp);
            }
        }
        for unit in units.iter().filter(|u| u.removed) {
            changed.push(unit.id.clone());
        }
        changed.sort();
        changed.dedup();

        // Keep the graph current with declared dependencies
        for unit in &active {
            self.ctx.graph.add_unit(unit.id.clone());
            for dep in &unit.declared_deps {
                self.ctx.graph.add_edge(unit.id.clone(), dep.clone());
            }
        }

        // Narrow validation scope to the blast radius of the change
        let all_tasks: Vec<ValidationTask> = active
            .iter()
            .map(|u| {
                ValidationTask::new(u.id.clone()).with_inputs(
                    self.validation_inputs.get(&u.id).cloned().unwrap_or_default(),
                )
            })
            .collect();
        let selected = selector::select(&changed, &self.ctx.graph, &all_tasks);
        let selected_ids: HashSet<UnitId> =
            selected.iter().map(|t| t.unit_id.clone()).collect();
        info!(
            "{} changed unit(s), {} validation task(s) selected",
            changed.len(),
            selected.len()
        );

        // Transpile tasks for every active unit keep the cache consulted
        // (hits for unchanged units); validations only where selected
        let mut tasks: Vec<MigrationTask> = Vec::new();
        for unit in &active {
            let cost = unit.content.len() as u64;
            tasks.push(MigrationTask::transpile(unit.id.clone()).with_cost(cost));
            if selected_ids.contains(&unit.id) {
                tasks.push(MigrationTask::validate(unit.id.clone()).with_cost(cost));
            }
        }

        // Pin selected artifacts so LRU eviction spares what validation
        // still needs
        for id in &selected_ids {
            if let Some(fp) = fps.get(id) {
                self.ctx.cache.pin(fp);
            }
        }

        let exec = EngineExecutor {
            engine: self,
            units: active.iter().map(|u| (u.id.clone(), (*u).clone())).collect(),
            fps: fps.clone(),
            tasks: Mutex::new(
                selected
                    .into_iter()
                    .map(|t| (t.unit_id.clone(), t))
                    .collect(),
            ),
            failed_transpiles: RwLock::new(HashSet::new()),
            done_transpiles: RwLock::new(HashSet::new()),
        };

        let orchestrator = Orchestrator::new(self.config.worker_count, self.config.fail_fast)
            .with_task_timeout(std::time::Duration::from_millis(self.config.task_timeout_ms));
        let cancel = CancellationToken::new();
        let run_result = orchestrator.run(tasks, &exec, &cancel);

        for id in &selected_ids {
            if let Some(fp) = fps.get(id) {
                self.ctx.cache.unpin(fp);
            }
        }
        let results = run_result?;

        // Units outside the impact set were satisfied from cache
        let unchanged: Vec<UnitId> = active
            .iter()
            .filter(|u| !selected_ids.contains(&u.id))
            .map(|u| u.id.clone())
            .collect();

        let stats_after = self.ctx.cache.stats();
        let delta = crate::cache::CacheStats {
            hits: stats_after.hits - stats_before.hits,
            misses: stats_after.misses - stats_before.misses,
        };

        let report = MigrationReport::from_results(
            self.project.clone(),
            &results,
            &unchanged,
            delta.hit_rate(),
            started.elapsed(),
        );
        info!(
            "Run finished: {} passed, {} failed, {} inconclusive, hit rate {:.2}",
            report.aggregate.passed,
            report.aggregate.failed,
            report.aggregate.inconclusive,
            report.aggregate.cache_hit_rate
        );
        Ok(report)
    }
}

/// Task execution bridging the orchestrator to the cache, transpiler, and
/// validator for one run
struct EngineExecutor<'a> {
    engine: &'a MigrationEngine,
    units: HashMap<UnitId, Unit>,
    fps: HashMap<UnitId, Fingerprint>,
    tasks: Mutex<HashMap<UnitId, ValidationTask>>,
    failed_transpiles: RwLock<HashSet<UnitId>>,
    done_transpiles: RwLock<HashSet<UnitId>>,
}

impl TaskExecutor for EngineExecutor<'_> {
    fn transpile(&self, unit_id: &UnitId) -> Result<(), MigrationError> {
        let unit = self.units.get(unit_id).ok_or_else(|| MigrationError::State(
            format!("unknown unit {}", unit_id),
        ))?;
        let fp = self.fps.get(unit_id).ok_or_else(|| MigrationError::State(
            format!("no fingerprint for {}", unit_id),
        ))?;

        let result = self
            .engine
            .ctx
            .cache
            .get_or_compute(fp, || self.engine.transpiler.transpile(unit));
        match result {
            Ok(_) => {
                self.done_transpiles.write().insert(unit_id.clone());
                Ok(())
            }
            Err(err) => {
                self.failed_transpiles.write().insert(unit_id.clone());
                Err(err)
            }
        }
    }

    fn artifact_gate(&self, unit_id: &UnitId) -> ArtifactGate {
        if self.failed_transpiles.read().contains(unit_id) {
            return ArtifactGate::Unavailable;
        }
        let Some(fp) = self.fps.get(unit_id) else {
            return ArtifactGate::Unavailable;
        };
        // A finished transpile counts as Ready even if the artifact has
        // since been evicted; validation recomputes through the cache, so
        // Pending can only mean "transpile has not completed yet" and the
        // gate can never hold a task back forever
        if self.engine.ctx.cache.ready_artifact(fp).is_some()
            || self.done_transpiles.read().contains(unit_id)
        {
            ArtifactGate::Ready
        } else {
            ArtifactGate::Pending
        }
    }

    fn validate(&self, unit_id: &UnitId) -> Result<ValidationOutcome, MigrationError> {
        let unit = self.units.get(unit_id).ok_or_else(|| MigrationError::State(
            format!("unknown unit {}", unit_id),
        ))?;
        let fp = self.fps.get(unit_id).ok_or_else(|| MigrationError::State(
            format!("no fingerprint for {}", unit_id),
        ))?;
        // Serves the cached artifact, or recomputes it if eviction raced
        // the gate
        let artifact = self
            .engine
            .ctx
            .cache
            .get_or_compute(fp, || self.engine.transpiler.transpile(unit))?;

        let inputs = {
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(unit_id) {
                Some(task) => {
                    task.state = TaskState::Running;
                    task.inputs.clone()
                }
                None => Vec::new(),
            }
        };
        debug!("Validating {} with {} input(s)", unit_id, inputs.len());

        let validator =
            EquivalenceValidator::new(Arc::clone(&self.engine.executor), &self.engine.config);
        let outcome = validator.validate(unit, &artifact, &inputs);
        if let Some(task) = self.tasks.lock().get_mut(unit_id) {
            task.state = TaskState::Done(outcome.verdict.clone());
        }
        Ok(outcome)
    }
}
