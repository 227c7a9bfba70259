use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source language of a migratable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    C,
    Cpp,
    Rust,
    Shell,
    JavaScript,
    TypeScript,
    Go,
    Other(String),
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "Python"),
            Language::C => write!(f, "C"),
            Language::Cpp => write!(f, "C++"),
            Language::Rust => write!(f, "Rust"),
            Language::Shell => write!(f, "Shell"),
            Language::JavaScript => write!(f, "JavaScript"),
            Language::TypeScript => write!(f, "TypeScript"),
            Language::Go => write!(f, "Go"),
            Language::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Stable identifier for a migratable unit (file, module, or service)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One migratable compilation item discovered during project scan.
///
/// Units are never deleted mid-run; stale units are marked `removed` so the
/// audit history of a migration stays complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub language: Language,
    pub source_path: PathBuf,
    pub content: String,
    /// Declared dependencies on other units (import/include relationships)
    pub declared_deps: Vec<UnitId>,
    pub removed: bool,
}

impl Unit {
    pub fn new(id: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        let id = UnitId::new(id);
        Self {
            source_path: PathBuf::from(id.as_str()),
            id,
            language,
            content: content.into(),
            declared_deps: Vec::new(),
            removed: false,
        }
    }

    pub fn with_deps(mut self, deps: Vec<UnitId>) -> Self {
        self.declared_deps = deps;
        self
    }

    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = path;
        self
    }
}

/// Build status of a transpiled artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Success,
    Warnings,
    NotBuilt,
}

/// Transpilation output for a unit.
///
/// Owned by the cache entry that produced it; validation tasks hold shared
/// references and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Target-language source text
    pub target_source: String,
    pub build_status: BuildStatus,
    /// blake3 digest of `target_source`, used to detect cache corruption
    pub digest: String,
}

impl Artifact {
    pub fn new(target_source: impl Into<String>, build_status: BuildStatus) -> Self {
        let target_source = target_source.into();
        let digest = blake3::hash(target_source.as_bytes()).to_hex().to_string();
        Self {
            target_source,
            build_status,
            digest,
        }
    }
}

/// Terminal outcome of an equivalence check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    /// Genuine behavioral regression, with the specific mismatch recorded
    Failed { diff: String },
    /// Execution could not complete deterministically (timeout, sandbox
    /// fault, cancellation). Distinct from Failed and never coerced.
    Inconclusive { reason: String },
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Verdict::Failed { .. })
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Verdict::Inconclusive { .. })
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => write!(f, "Passed"),
            Verdict::Failed { diff } => write!(f, "Failed: {}", diff),
            Verdict::Inconclusive { reason } => write!(f, "Inconclusive: {}", reason),
        }
    }
}

/// Lifecycle state of a validation task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    Done(Verdict),
}

/// One equivalence check for a unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationTask {
    pub unit_id: UnitId,
    pub state: TaskState,
    /// Inputs both executions are driven with
    pub inputs: Vec<String>,
}

impl ValidationTask {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            state: TaskState::Queued,
            inputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Kind of work scheduled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Transpile,
    Validate,
}

/// Unit of work distributed across the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTask {
    pub unit_id: UnitId,
    pub kind: TaskKind,
    /// Higher runs earlier within a worker's own queue
    pub priority: u8,
    /// Estimated cost in arbitrary units, used for load-balancing heuristics
    pub est_cost: u64,
}

impl MigrationTask {
    pub fn transpile(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            kind: TaskKind::Transpile,
            priority: 1,
            est_cost: 1,
        }
    }

    pub fn validate(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            kind: TaskKind::Validate,
            priority: 0,
            est_cost: 1,
        }
    }

    pub fn with_cost(mut self, est_cost: u64) -> Self {
        self.est_cost = est_cost;
        self
    }
}

/// Observable behavior captured from one sandboxed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Program outputs, one entry per output line
    pub outputs: Vec<String>,
    /// Syscall names in invocation order
    pub syscalls: Vec<String>,
    pub duration: Duration,
}

impl ExecutionTrace {
    pub fn new(outputs: Vec<String>, syscalls: Vec<String>, duration: Duration) -> Self {
        Self {
            outputs,
            syscalls,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_ordering() {
        let mut ids = vec![UnitId::from("c"), UnitId::from("a"), UnitId::from("b")];
        ids.sort();
        assert_eq!(
            ids,
            vec![UnitId::from("a"), UnitId::from("b"), UnitId::from("c")]
        );
    }

    #[test]
    fn test_artifact_digest_is_content_derived() {
        let a = Artifact::new("fn main() {}", BuildStatus::Success);
        let b = Artifact::new("fn main() {}", BuildStatus::Success);
        let c = Artifact::new("fn other() {}", BuildStatus::Success);

        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_verdict_predicates() {
        assert!(Verdict::Passed.is_passed());
        assert!(Verdict::Failed { diff: "x".into() }.is_failed());
        let inconclusive = Verdict::Inconclusive {
            reason: "timeout".into(),
        };
        assert!(inconclusive.is_inconclusive());
        assert!(!inconclusive.is_failed());
        assert!(!inconclusive.is_passed());
    }

    #[test]
    fn test_language_display() {
        assert_eq!(Language::Cpp.to_string(), "C++");
        assert_eq!(Language::Other("Zig".into()).to_string(), "Zig");
    }

    #[test]
    fn test_unit_builder() {
        let unit = Unit::new("pkg/mod.py", Language::Python, "import os")
            .with_deps(vec![UnitId::from("pkg/other.py")]);
        assert_eq!(unit.id.as_str(), "pkg/mod.py");
        assert_eq!(unit.declared_deps.len(), 1);
        assert!(!unit.removed);
    }
}
