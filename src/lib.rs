// Library exports for the Mudanza migration engine
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod orchestrator;
pub mod report;
pub mod scan;
pub mod selector;
pub mod state;
pub mod types;
pub mod validator;

// Re-export key types for convenience
pub use cache::{CacheStats, TranspilationCache};
pub use config::MigrationConfig;
pub use engine::{MigrationEngine, RunContext, Transpiler};
pub use error::{MigrationError, Result};
pub use fingerprint::{fingerprint, Fingerprint, FingerprintStore};
pub use graph::DependencyGraph;
pub use orchestrator::{
    ArtifactGate, CancellationToken, Orchestrator, TaskExecutor, TaskOutcome, TaskResult,
};
pub use report::{MigrationReport, UnitReport, UnitStatus};
pub use state::ProjectState;
pub use types::{
    Artifact, BuildStatus, ExecutionTrace, Language, MigrationTask, TaskKind, TaskState, Unit,
    UnitId, ValidationTask, Verdict,
};
pub use validator::{
    EquivalenceValidator, ExecutionFault, ExecutionSubject, Executor, ValidationOutcome,
};
