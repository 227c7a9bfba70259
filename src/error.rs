use crate::types::UnitId;

/// Error taxonomy for a migration run.
///
/// Per-unit errors are isolated: one unit's failure never aborts the batch.
/// The single exception is `CacheCorruption`, which invalidates every cached
/// result and halts the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MigrationError {
    /// External codegen failure; recorded, run continues for other units
    #[error("transpilation failed for {unit}: {message}")]
    Transpile { unit: UnitId, message: String },

    /// Environmental instability; retried up to the configured limit before
    /// being reported as-is
    #[error("validation inconclusive for {unit}: {reason}")]
    ValidationInconclusive { unit: UnitId, reason: String },

    /// Genuine behavioral regression; always surfaced, never auto-retried
    #[error("validation failed for {unit}: {diff}")]
    ValidationFailed { unit: UnitId, diff: String },

    /// Fingerprint collision detected via artifact digest mismatch on a
    /// supposed cache hit. Fatal: the cache-correctness contract is broken.
    #[error(
        "cache corruption for fingerprint {fingerprint}: expected digest {expected}, got {actual}"
    )]
    CacheCorruption {
        fingerprint: String,
        expected: String,
        actual: String,
    },

    /// A task exceeded its wall-clock budget
    #[error("task for {unit} exceeded its {elapsed_ms}ms budget")]
    SchedulerTimeout { unit: UnitId, elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    /// Cross-run state persistence failure
    #[error("state error: {0}")]
    State(String),
}

impl MigrationError {
    /// Whether this error must abort the entire run rather than just the
    /// unit that produced it
    pub fn is_fatal(&self) -> bool {
        matches!(self, MigrationError::CacheCorruption { .. })
    }

    /// Unit this error concerns, when it is unit-scoped
    pub fn unit(&self) -> Option<&UnitId> {
        match self {
            MigrationError::Transpile { unit, .. }
            | MigrationError::ValidationInconclusive { unit, .. }
            | MigrationError::ValidationFailed { unit, .. }
            | MigrationError::SchedulerTimeout { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(e: std::io::Error) -> Self {
        MigrationError::Io(e.to_string())
    }
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cache_corruption_is_fatal() {
        let corruption = MigrationError::CacheCorruption {
            fingerprint: "f".into(),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(corruption.is_fatal());

        let transpile = MigrationError::Transpile {
            unit: UnitId::from("a.py"),
            message: "syntax".into(),
        };
        assert!(!transpile.is_fatal());
        assert_eq!(transpile.unit(), Some(&UnitId::from("a.py")));
        assert!(corruption.unit().is_none());
    }

    #[test]
    fn test_error_messages_carry_diagnostics() {
        let err = MigrationError::ValidationFailed {
            unit: UnitId::from("calc.py"),
            diff: "line 1: expected 42, got 41".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("calc.py"));
        assert!(msg.contains("expected 42"));
    }
}
