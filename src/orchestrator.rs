use crossbeam_deque::{Injector, Stealer, Worker};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::MigrationError;
use crate::types::{MigrationTask, TaskKind, UnitId};
use crate::validator::ValidationOutcome;

/// Run-level cancellation. Checked at task dequeue time; tasks already
/// executing drain to completion so no cache entry is orphaned in Pending.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Whether a unit's artifact is available for validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactGate {
    Ready,
    /// Transpilation still in flight; the validation task re-queues
    Pending,
    /// Transpilation failed terminally; validation can never run
    Unavailable,
}

/// Task execution supplied by the engine. The orchestrator owns scheduling
/// only; what a task *does* lives behind this seam.
pub trait TaskExecutor: Send + Sync {
    /// Run a transpilation task (cache-aware)
    fn transpile(&self, unit_id: &UnitId) -> Result<(), MigrationError>;

    /// Cache state for the unit's artifact, inspected before a validation
    /// task is allowed to run (queue order is never trusted for this)
    fn artifact_gate(&self, unit_id: &UnitId) -> ArtifactGate;

    /// Run a validation task against the Ready artifact
    fn validate(&self, unit_id: &UnitId) -> Result<ValidationOutcome, MigrationError>;
}

/// Terminal outcome of one scheduled task
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    TranspileOk,
    TranspileErr(MigrationError),
    Validated(ValidationOutcome),
    /// Validation could not run at all (internal error, not a verdict)
    ValidateErr(MigrationError),
    /// Dequeued after run cancellation; never conflated with Failed
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub unit_id: UnitId,
    pub kind: TaskKind,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

/// Work-stealing orchestrator: a fixed arena of workers indexed by integer
/// id, each owning a deque it pushes and pops LIFO while idle peers steal
/// FIFO from the other end. Termination is detected with a shared idle
/// counter, not an iteration bound.
pub struct Orchestrator {
    worker_count: usize,
    fail_fast: bool,
    task_timeout: Duration,
}

struct Shared<'a> {
    injector: Injector<MigrationTask>,
    stealers: Vec<Stealer<MigrationTask>>,
    idle: AtomicUsize,
    remaining: AtomicUsize,
    results: Mutex<Vec<TaskResult>>,
    fatal: Mutex<Option<MigrationError>>,
    cancel: &'a CancellationToken,
    executor: &'a dyn TaskExecutor,
    fail_fast: bool,
    task_timeout: Duration,
}

impl Orchestrator {
    pub fn new(worker_count: usize, fail_fast: bool) -> Self {
        Self {
            worker_count: worker_count.max(1),
            fail_fast,
            task_timeout: Duration::from_millis(30_000),
        }
    }

    /// Wall-clock budget per task; a task that overruns it is reported as
    /// timed out rather than succeeded
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Execute a batch of tasks across the worker pool. Individual task
    /// failures are recorded and never halt the run; a fatal error (cache
    /// corruption) cancels everything and is returned.
    pub fn run(
        &self,
        tasks: Vec<MigrationTask>,
        executor: &dyn TaskExecutor,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskResult>, MigrationError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            "Scheduling {} task(s) across {} worker(s)",
            tasks.len(),
            self.worker_count
        );

        let locals: Vec<Worker<MigrationTask>> =
            (0..self.worker_count).map(|_| Worker::new_lifo()).collect();
        let shared = Shared {
            injector: Injector::new(),
            stealers: locals.iter().map(Worker::stealer).collect(),
            idle: AtomicUsize::new(0),
            remaining: AtomicUsize::new(tasks.len()),
            results: Mutex::new(Vec::with_capacity(tasks.len())),
            fatal: Mutex::new(None),
            cancel,
            executor,
            fail_fast: self.fail_fast,
            task_timeout: self.task_timeout,
        };

        // Transpiles before validations in the initial feed, heaviest tasks
        // first within a class so the long poles start while peers can still
        // steal around them; correctness still comes from the cache gate
        let mut tasks = tasks;
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.est_cost.cmp(&a.est_cost))
        });
        for task in tasks {
            shared.injector.push(task);
        }

        std::thread::scope(|scope| {
            for (id, local) in locals.into_iter().enumerate() {
                let shared = &shared;
                scope.spawn(move || worker_loop(id, local, shared));
            }
        });

        if let Some(fatal) = shared.fatal.lock().take() {
            return Err(fatal);
        }

        let mut results = shared.results.into_inner();
        results.sort_by(|a, b| (&a.unit_id, a.kind as u8).cmp(&(&b.unit_id, b.kind as u8)));
        Ok(results)
    }
}

fn worker_loop(id: usize, local: Worker<MigrationTask>, shared: &Shared<'_>) {
    let mut idle = false;
    loop {
        if shared.remaining.load(Ordering::SeqCst) == 0 {
            break;
        }

        match find_task(id, &local, shared) {
            Some(task) => {
                if idle {
                    idle = false;
                    shared.idle.fetch_sub(1, Ordering::SeqCst);
                }
                run_task(id, task, shared);
            }
            None => {
                if !idle {
                    idle = true;
                    shared.idle.fetch_add(1, Ordering::SeqCst);
                }
                // All workers idle after a full failed steal round means the
                // queues are drained (barring re-queued gate waits, which
                // keep `remaining` non-zero and their owner non-idle)
                if shared.idle.load(Ordering::SeqCst) == shared.worker_total()
                    && shared.remaining.load(Ordering::SeqCst) == 0
                {
                    break;
                }
                std::thread::yield_now();
            }
        }
    }
    debug!("Worker {} done", id);
}

impl Shared<'_> {
    fn worker_total(&self) -> usize {
        self.stealers.len()
    }

    fn record(&self, result: TaskResult) {
        self.results.lock().push(result);
        self.remaining.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pop from the own queue (LIFO), then the global injector, then steal from
/// the FIFO end of a randomly chosen peer. The asymmetric-end policy keeps
/// owner and thieves off each other's cache lines.
fn find_task(id: usize, local: &Worker<MigrationTask>, shared: &Shared<'_>) -> Option<MigrationTask> {
    if let Some(task) = local.pop() {
        return Some(task);
    }

    loop {
        let stolen = shared.injector.steal_batch_and_pop(local);
        if stolen.is_retry() {
            continue;
        }
        if let Some(task) = stolen.success() {
            return Some(task);
        }
        break;
    }

    let n = shared.stealers.len();
    if n <= 1 {
        return None;
    }
    let start = rand::thread_rng().gen_range(0..n);
    for offset in 0..n {
        let victim = (start + offset) % n;
        if victim == id {
            continue;
        }
        loop {
            let stolen = shared.stealers[victim].steal();
            if stolen.is_retry() {
                continue;
            }
            if let Some(task) = stolen.success() {
                debug!("Worker {} stole task from worker {}", id, victim);
                return Some(task);
            }
            break;
        }
    }
    None
}

fn run_task(id: usize, task: MigrationTask, shared: &Shared<'_>) {
    if shared.cancel.is_cancelled() {
        let outcome = match task.kind {
            // Cancellation is environmental, not a correctness failure
            TaskKind::Validate => TaskOutcome::Validated(ValidationOutcome {
                verdict: crate::types::Verdict::Inconclusive {
                    reason: "run cancelled".into(),
                },
                syscall_match_rate: None,
                performance_ratio: None,
                attempts: 0,
            }),
            TaskKind::Transpile => TaskOutcome::Cancelled,
        };
        shared.record(TaskResult {
            unit_id: task.unit_id,
            kind: task.kind,
            outcome,
            duration: Duration::ZERO,
        });
        return;
    }

    let start = Instant::now();
    match task.kind {
        TaskKind::Transpile => {
            let outcome = match shared.executor.transpile(&task.unit_id) {
                Ok(()) if start.elapsed() > shared.task_timeout => {
                    let err = MigrationError::SchedulerTimeout {
                        unit: task.unit_id.clone(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    };
                    warn!("Worker {}: {}", id, err);
                    handle_error(&err, shared);
                    TaskOutcome::TranspileErr(err)
                }
                Ok(()) => TaskOutcome::TranspileOk,
                Err(err) => {
                    warn!("Worker {}: transpile of {} failed: {}", id, task.unit_id, err);
                    handle_error(&err, shared);
                    TaskOutcome::TranspileErr(err)
                }
            };
            shared.record(TaskResult {
                unit_id: task.unit_id,
                kind: TaskKind::Transpile,
                outcome,
                duration: start.elapsed(),
            });
        }
        TaskKind::Validate => match shared.executor.artifact_gate(&task.unit_id) {
            ArtifactGate::Pending => {
                // Not ready yet: re-queue through the FIFO injector so the
                // transpile it waits on is dequeued first. `remaining` is
                // untouched, so termination still waits for this task.
                shared.injector.push(task);
                std::thread::yield_now();
            }
            ArtifactGate::Unavailable => {
                shared.record(TaskResult {
                    unit_id: task.unit_id,
                    kind: TaskKind::Validate,
                    outcome: TaskOutcome::Validated(ValidationOutcome {
                        verdict: crate::types::Verdict::Inconclusive {
                            reason: "artifact unavailable: transpilation failed".into(),
                        },
                        syscall_match_rate: None,
                        performance_ratio: None,
                        attempts: 0,
                    }),
                    duration: start.elapsed(),
                });
            }
            ArtifactGate::Ready => {
                let outcome = match shared.executor.validate(&task.unit_id) {
                    // An overrun validation is environmental noise, not a
                    // verdict on the artifact
                    Ok(validation) if start.elapsed() > shared.task_timeout => {
                        let err = MigrationError::SchedulerTimeout {
                            unit: task.unit_id.clone(),
                            elapsed_ms: start.elapsed().as_millis() as u64,
                        };
                        warn!("Worker {}: {}", id, err);
                        TaskOutcome::Validated(ValidationOutcome {
                            verdict: crate::types::Verdict::Inconclusive {
                                reason: err.to_string(),
                            },
                            syscall_match_rate: validation.syscall_match_rate,
                            performance_ratio: validation.performance_ratio,
                            attempts: validation.attempts,
                        })
                    }
                    Ok(validation) => {
                        if validation.verdict.is_failed() && shared.fail_fast {
                            info!("Fail-fast: cancelling queued tasks after {}", task.unit_id);
                            shared.cancel.cancel();
                        }
                        TaskOutcome::Validated(validation)
                    }
                    Err(err) => {
                        handle_error(&err, shared);
                        TaskOutcome::ValidateErr(err)
                    }
                };
                shared.record(TaskResult {
                    unit_id: task.unit_id,
                    kind: TaskKind::Validate,
                    outcome,
                    duration: start.elapsed(),
                });
            }
        },
    }
}

fn handle_error(err: &MigrationError, shared: &Shared<'_>) {
    if err.is_fatal() {
        // Cache corruption: every cached result is suspect, stop the run
        let mut fatal = shared.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err.clone());
        }
        shared.cancel.cancel();
    } else if shared.fail_fast {
        shared.cancel.cancel();
    }
}
