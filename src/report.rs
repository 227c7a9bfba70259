use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::orchestrator::{TaskOutcome, TaskResult};
use crate::types::{TaskKind, UnitId, Verdict};

/// Per-unit outcome row in the aggregate report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit_id: UnitId,
    pub status: UnitStatus,
    /// Validation verdict, when a validation ran for this unit
    pub verdict: Option<Verdict>,
    pub duration: Duration,
    /// Diagnostic for failures; never a bare "failed"
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    /// Artifact served from cache, no validation selected
    Unchanged,
    Migrated,
    TranspileFailed,
    ValidationFailed,
    Inconclusive,
    Cancelled,
}

/// Aggregate counters across the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub total_units: usize,
    pub passed: usize,
    pub failed: usize,
    pub inconclusive: usize,
    pub transpile_errors: usize,
    pub cancelled: usize,
    pub cache_hit_rate: f64,
}

/// Result of one migration run, sorted by unit identifier for determinism
/// before being handed to external reporting. Rendering beyond the plain
/// text summary is an external collaborator's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub project: String,
    pub per_unit: Vec<UnitReport>,
    pub aggregate: Aggregate,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub wall_clock: Duration,
}

impl MigrationReport {
    /// Fold orchestrator task results into per-unit rows. `unchanged` lists
    /// units satisfied entirely from cache with no validation selected.
    pub fn from_results(
        project: impl Into<String>,
        results: &[TaskResult],
        unchanged: &[UnitId],
        cache_hit_rate: f64,
        wall_clock: Duration,
    ) -> Self {
        let mut per_unit: Vec<UnitReport> = unchanged
            .iter()
            .map(|id| UnitReport {
                unit_id: id.clone(),
                status: UnitStatus::Unchanged,
                verdict: None,
                duration: Duration::ZERO,
                detail: None,
            })
            .collect();

        // One row per unit: the validation outcome when present, otherwise
        // the transpile outcome. Units already reported as Unchanged keep
        // that row even if a cache-warming task ran for them.
        let mut unit_ids: Vec<UnitId> = results
            .iter()
            .map(|r| r.unit_id.clone())
            .filter(|id| !unchanged.contains(id))
            .collect();
        unit_ids.sort();
        unit_ids.dedup();

        for unit_id in unit_ids {
            let rows: Vec<&TaskResult> =
                results.iter().filter(|r| r.unit_id == unit_id).collect();
            let duration: Duration = rows.iter().map(|r| r.duration).sum();

            let validation = rows
                .iter()
                .find(|r| r.kind == TaskKind::Validate)
                .map(|r| &r.outcome);
            let transpile = rows
                .iter()
                .find(|r| r.kind == TaskKind::Transpile)
                .map(|r| &r.outcome);

            let (status, verdict, detail) = match (validation, transpile) {
                (_, Some(TaskOutcome::TranspileErr(err))) => (
                    UnitStatus::TranspileFailed,
                    None,
                    Some(err.to_string()),
                ),
                (_, Some(TaskOutcome::Cancelled)) => (UnitStatus::Cancelled, None, None),
                // A validation that could not run at all is environmental
                (Some(TaskOutcome::ValidateErr(err)), _) => {
                    (UnitStatus::Inconclusive, None, Some(err.to_string()))
                }
                (Some(TaskOutcome::Validated(v)), _) => match &v.verdict {
                    Verdict::Passed => (UnitStatus::Migrated, Some(v.verdict.clone()), None),
                    Verdict::Failed { diff } => (
                        UnitStatus::ValidationFailed,
                        Some(v.verdict.clone()),
                        Some(diff.clone()),
                    ),
                    Verdict::Inconclusive { reason } => (
                        UnitStatus::Inconclusive,
                        Some(v.verdict.clone()),
                        Some(reason.clone()),
                    ),
                },
                _ => (UnitStatus::Migrated, None, None),
            };

            per_unit.push(UnitReport {
                unit_id,
                status,
                verdict,
                duration,
                detail,
            });
        }

        per_unit.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));

        let aggregate = Aggregate {
            total_units: per_unit.len(),
            passed: per_unit
                .iter()
                .filter(|u| matches!(u.verdict, Some(Verdict::Passed)))
                .count(),
            failed: per_unit
                .iter()
                .filter(|u| u.status == UnitStatus::ValidationFailed)
                .count(),
            inconclusive: per_unit
                .iter()
                .filter(|u| u.status == UnitStatus::Inconclusive)
                .count(),
            transpile_errors: per_unit
                .iter()
                .filter(|u| u.status == UnitStatus::TranspileFailed)
                .count(),
            cancelled: per_unit
                .iter()
                .filter(|u| u.status == UnitStatus::Cancelled)
                .count(),
            cache_hit_rate,
        };

        Self {
            project: project.into(),
            per_unit,
            aggregate,
            timestamp: chrono::Utc::now(),
            wall_clock,
        }
    }

    /// Run gate: no regressions and no transpile errors. Inconclusive
    /// results are a distinct category and neither pass nor fail the gate.
    pub fn gate_passed(&self) -> bool {
        self.aggregate.failed == 0 && self.aggregate.transpile_errors == 0
    }

    /// Plain text summary; richer formats are rendered externally
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Migration report for {}\n", self.project));
        out.push_str(&format!(
            "  {} unit(s): {} passed, {} failed, {} inconclusive, {} transpile error(s), {} cancelled\n",
            self.aggregate.total_units,
            self.aggregate.passed,
            self.aggregate.failed,
            self.aggregate.inconclusive,
            self.aggregate.transpile_errors,
            self.aggregate.cancelled,
        ));
        out.push_str(&format!(
            "  cache hit rate: {:.1}%, wall clock: {:?}\n",
            self.aggregate.cache_hit_rate * 100.0,
            self.wall_clock
        ));
        for unit in &self.per_unit {
            if let Some(detail) = &unit.detail {
                out.push_str(&format!("  {} [{:?}]: {}\n", unit.unit_id, unit.status, detail));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrationError;
    use crate::validator::ValidationOutcome;

    fn validated(unit: &str, verdict: Verdict) -> TaskResult {
        TaskResult {
            unit_id: UnitId::from(unit),
            kind: TaskKind::Validate,
            outcome: TaskOutcome::Validated(ValidationOutcome {
                verdict,
                syscall_match_rate: Some(1.0),
                performance_ratio: None,
                attempts: 1,
            }),
            duration: Duration::from_millis(5),
        }
    }

    fn transpiled(unit: &str) -> TaskResult {
        TaskResult {
            unit_id: UnitId::from(unit),
            kind: TaskKind::Transpile,
            outcome: TaskOutcome::TranspileOk,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_aggregate_counts() {
        let results = vec![
            transpiled("a"),
            validated("a", Verdict::Passed),
            transpiled("b"),
            validated("b", Verdict::Failed { diff: "line 1".into() }),
            transpiled("c"),
            validated("c", Verdict::Inconclusive { reason: "timeout".into() }),
        ];

        let report = MigrationReport::from_results("demo", &results, &[], 0.5, Duration::ZERO);

        assert_eq!(report.aggregate.total_units, 3);
        assert_eq!(report.aggregate.passed, 1);
        assert_eq!(report.aggregate.failed, 1);
        assert_eq!(report.aggregate.inconclusive, 1);
        assert!(!report.gate_passed());
    }

    #[test]
    fn test_inconclusive_does_not_fail_gate() {
        let results = vec![
            transpiled("a"),
            validated("a", Verdict::Inconclusive { reason: "flaky env".into() }),
        ];
        let report = MigrationReport::from_results("demo", &results, &[], 1.0, Duration::ZERO);
        assert!(report.gate_passed());
        assert_eq!(report.aggregate.inconclusive, 1);
    }

    #[test]
    fn test_transpile_error_carries_diagnostic() {
        let results = vec![TaskResult {
            unit_id: UnitId::from("bad.py"),
            kind: TaskKind::Transpile,
            outcome: TaskOutcome::TranspileErr(MigrationError::Transpile {
                unit: UnitId::from("bad.py"),
                message: "unsupported syntax at line 7".into(),
            }),
            duration: Duration::from_millis(1),
        }];

        let report = MigrationReport::from_results("demo", &results, &[], 0.0, Duration::ZERO);
        assert_eq!(report.aggregate.transpile_errors, 1);
        assert!(!report.gate_passed());

        let row = &report.per_unit[0];
        assert_eq!(row.status, UnitStatus::TranspileFailed);
        assert!(row.detail.as_ref().unwrap().contains("line 7"));
        assert!(report.summary().contains("unsupported syntax"));
    }

    #[test]
    fn test_rows_sorted_and_unchanged_included() {
        let results = vec![transpiled("b"), validated("b", Verdict::Passed)];
        let unchanged = vec![UnitId::from("a"), UnitId::from("c")];

        let report =
            MigrationReport::from_results("demo", &results, &unchanged, 1.0, Duration::ZERO);

        let ids: Vec<&str> = report.per_unit.iter().map(|u| u.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report.per_unit[0].status, UnitStatus::Unchanged);
        assert_eq!(report.per_unit[1].status, UnitStatus::Migrated);
    }
}
