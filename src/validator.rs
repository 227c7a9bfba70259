use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::types::{Artifact, ExecutionTrace, Unit, Verdict};

/// Why a sandboxed execution could not produce a usable trace. Faults map to
/// Inconclusive verdicts, never to Failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionFault {
    #[error("execution timed out after {0}ms")]
    Timeout(u64),
    #[error("sandbox fault: {0}")]
    Sandbox(String),
    #[error("execution cancelled")]
    Cancelled,
}

/// What the executor is asked to run: the original unit in its source
/// language, or the transpiled artifact.
pub enum ExecutionSubject<'a> {
    Original(&'a Unit),
    Transpiled(&'a Artifact),
}

/// External sandboxed-execution collaborator. Implementations run the
/// subject against the given inputs, time-bounded, and capture observable
/// behavior. The validator never mutates what it inspects.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        subject: ExecutionSubject<'_>,
        inputs: &[String],
    ) -> Result<ExecutionTrace, ExecutionFault>;
}

/// One equivalence check's verdict plus the measurements behind it
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    /// Syscall-sequence match rate in [0, 1], when both traces were captured
    pub syscall_match_rate: Option<f64>,
    /// transpiled/original wall-clock ratio; recorded, gating only when
    /// configured
    pub performance_ratio: Option<f64>,
    pub attempts: usize,
}

/// Compares original and transpiled behavior under controlled inputs.
pub struct EquivalenceValidator {
    executor: Arc<dyn Executor>,
    epsilon: f64,
    syscall_match_threshold: f64,
    gate_on_performance: bool,
    performance_ratio_limit: f64,
    inconclusive_retries: usize,
}

impl EquivalenceValidator {
    pub fn new(executor: Arc<dyn Executor>, config: &MigrationConfig) -> Self {
        Self {
            executor,
            epsilon: config.epsilon,
            syscall_match_threshold: config.syscall_match_threshold,
            gate_on_performance: config.gate_on_performance,
            performance_ratio_limit: config.performance_ratio_limit,
            inconclusive_retries: config.inconclusive_retries,
        }
    }

    /// Validate a unit against its transpiled artifact. Inconclusive results
    /// are retried up to the configured limit (environmental noise), then
    /// reported as-is. Failed is never retried: a regression stays a
    /// regression.
    pub fn validate(&self, unit: &Unit, artifact: &Artifact, inputs: &[String]) -> ValidationOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.validate_once(unit, artifact, inputs, attempts);
            if outcome.verdict.is_inconclusive() && attempts <= self.inconclusive_retries {
                warn!(
                    "Validation of {} inconclusive (attempt {}), retrying",
                    unit.id, attempts
                );
                continue;
            }
            return outcome;
        }
    }

    fn validate_once(
        &self,
        unit: &Unit,
        artifact: &Artifact,
        inputs: &[String],
        attempts: usize,
    ) -> ValidationOutcome {
        debug!("Validating {} against transpiled artifact", unit.id);

        let original = match self.executor.execute(ExecutionSubject::Original(unit), inputs) {
            Ok(trace) => trace,
            Err(fault) => return Self::inconclusive(format!("original: {}", fault), attempts),
        };
        let transpiled = match self
            .executor
            .execute(ExecutionSubject::Transpiled(artifact), inputs)
        {
            Ok(trace) => trace,
            Err(fault) => return Self::inconclusive(format!("transpiled: {}", fault), attempts),
        };

        let match_rate = syscall_match_rate(&original.syscalls, &transpiled.syscalls);
        let perf_ratio = performance_ratio(&original, &transpiled);

        // Output mismatch is a correctness regression regardless of syscalls
        if let Some(diff) = self.compare_outputs(&original.outputs, &transpiled.outputs) {
            info!("Validation of {} failed: output mismatch", unit.id);
            return ValidationOutcome {
                verdict: Verdict::Failed { diff },
                syscall_match_rate: Some(match_rate),
                performance_ratio: perf_ratio,
                attempts,
            };
        }

        if match_rate < self.syscall_match_threshold {
            info!(
                "Validation of {} failed: syscall match rate {:.4} below threshold {:.4}",
                unit.id, match_rate, self.syscall_match_threshold
            );
            return ValidationOutcome {
                verdict: Verdict::Failed {
                    diff: format!(
                        "syscall match rate {:.4} below threshold {:.4} ({} vs {} syscalls)",
                        match_rate,
                        self.syscall_match_threshold,
                        original.syscalls.len(),
                        transpiled.syscalls.len()
                    ),
                },
                syscall_match_rate: Some(match_rate),
                performance_ratio: perf_ratio,
                attempts,
            };
        }

        if self.gate_on_performance {
            if let Some(ratio) = perf_ratio {
                if ratio > self.performance_ratio_limit {
                    return ValidationOutcome {
                        verdict: Verdict::Failed {
                            diff: format!(
                                "performance ratio {:.2} exceeds limit {:.2}",
                                ratio, self.performance_ratio_limit
                            ),
                        },
                        syscall_match_rate: Some(match_rate),
                        performance_ratio: perf_ratio,
                        attempts,
                    };
                }
            }
        }

        ValidationOutcome {
            verdict: Verdict::Passed,
            syscall_match_rate: Some(match_rate),
            performance_ratio: perf_ratio,
            attempts,
        }
    }

    fn inconclusive(reason: String, attempts: usize) -> ValidationOutcome {
        ValidationOutcome {
            verdict: Verdict::Inconclusive { reason },
            syscall_match_rate: None,
            performance_ratio: None,
            attempts,
        }
    }

    /// Line-by-line output comparison. Numeric tokens compare within epsilon
    /// to tolerate floating-point reordering; everything else compares
    /// exactly. Returns the first mismatch as a recorded diff.
    fn compare_outputs(&self, original: &[String], transpiled: &[String]) -> Option<String> {
        if original.len() != transpiled.len() {
            return Some(format!(
                "output length mismatch: original {} line(s), transpiled {} line(s)",
                original.len(),
                transpiled.len()
            ));
        }
        for (n, (a, b)) in original.iter().zip(transpiled.iter()).enumerate() {
            if !self.lines_equivalent(a, b) {
                return Some(format!("line {}: expected {:?}, got {:?}", n + 1, a, b));
            }
        }
        None
    }

    fn lines_equivalent(&self, a: &str, b: &str) -> bool {
        let ta: Vec<&str> = a.split_whitespace().collect();
        let tb: Vec<&str> = b.split_whitespace().collect();
        if ta.len() != tb.len() {
            return false;
        }
        ta.iter().zip(tb.iter()).all(|(x, y)| {
            if x == y {
                return true;
            }
            match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(fx), Ok(fy)) => (fx - fy).abs() <= self.epsilon,
                _ => false,
            }
        })
    }
}

/// Match rate between two syscall sequences: length of their longest common
/// subsequence over the longer sequence. 1.0 when both are empty. Byte-exact
/// equality is deliberately not required; minor environment and kernel
/// differences shift individual calls without changing behavior.
pub fn syscall_match_rate(original: &[String], transpiled: &[String]) -> f64 {
    if original.is_empty() && transpiled.is_empty() {
        return 1.0;
    }
    let longer = original.len().max(transpiled.len());
    let lcs = lcs_len(original, transpiled);
    lcs as f64 / longer as f64
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn performance_ratio(original: &ExecutionTrace, transpiled: &ExecutionTrace) -> Option<f64> {
    let orig = original.duration.as_secs_f64();
    if orig <= 0.0 {
        return None;
    }
    Some(transpiled.duration.as_secs_f64() / orig)
}
