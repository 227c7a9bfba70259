/// Integration tests driving the migration engine end to end: scan a project
/// from disk, run a full migration, persist state, and verify incremental
/// behavior across runs.
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use mudanza::{
    scan::scan_project, Artifact, BuildStatus, ExecutionFault, ExecutionSubject, ExecutionTrace,
    Executor, MigrationConfig, MigrationEngine, MigrationError, Transpiler, Unit, UnitId,
    UnitStatus,
};

/// Line-reversing "transpiler": deterministic, content-dependent output
struct ReversingTranspiler {
    calls: AtomicUsize,
}

impl ReversingTranspiler {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Transpiler for ReversingTranspiler {
    fn transpile(&self, unit: &Unit) -> Result<Artifact, MigrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if unit.content.contains("raise SyntaxError") {
            return Err(MigrationError::Transpile {
                unit: unit.id.clone(),
                message: "cannot translate dynamic raise".into(),
            });
        }
        let reversed: Vec<&str> = unit.content.lines().rev().collect();
        Ok(Artifact::new(reversed.join("\n"), BuildStatus::Success))
    }

    fn version(&self) -> String {
        "reversing-0.1".into()
    }

    fn config_digest(&self) -> String {
        "defaults".into()
    }
}

/// Executor that emits sorted lines as output, so original and reversed
/// artifact behave identically
struct SortedLinesExecutor;

impl Executor for SortedLinesExecutor {
    fn execute(
        &self,
        subject: ExecutionSubject<'_>,
        _inputs: &[String],
    ) -> Result<ExecutionTrace, ExecutionFault> {
        let source = match subject {
            ExecutionSubject::Original(unit) => &unit.content,
            ExecutionSubject::Transpiled(artifact) => &artifact.target_source,
        };
        let mut lines: Vec<String> = source.lines().map(String::from).collect();
        lines.sort();
        Ok(ExecutionTrace::new(
            lines,
            vec!["open".into(), "read".into(), "close".into()],
            Duration::from_millis(1),
        ))
    }
}

fn write_project(dir: &TempDir) {
    fs::write(dir.path().join("util.py"), "def helper():\n    return 1\n").unwrap();
    fs::write(
        dir.path().join("main.py"),
        "import util\n\ndef main():\n    return util.helper()\n",
    )
    .unwrap();
    fs::write(dir.path().join("standalone.py"), "VALUE = 42\n").unwrap();
}

fn engine(transpiler: Arc<ReversingTranspiler>) -> MigrationEngine {
    let config = MigrationConfig::default().with_workers(4);
    MigrationEngine::new(
        "integration",
        config,
        transpiler,
        Arc::new(SortedLinesExecutor),
    )
}

/// Scan a project from disk and migrate everything on the first run
#[test]
fn test_full_migration_from_scanned_project() {
    let temp_dir = TempDir::new().unwrap();
    write_project(&temp_dir);

    let (mut units, graph) = scan_project(temp_dir.path()).unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(
        graph.impact_set(&[UnitId::from("util.py")]),
        vec![UnitId::from("main.py"), UnitId::from("util.py")]
    );

    let transpiler = Arc::new(ReversingTranspiler::new());
    let engine = engine(Arc::clone(&transpiler));
    let report = engine.run(&units).unwrap();

    assert_eq!(report.aggregate.total_units, 3);
    assert_eq!(report.aggregate.passed, 3);
    assert!(report.gate_passed());
    assert_eq!(transpiler.calls.load(Ordering::SeqCst), 3);

    // Second run over the unchanged project is pure cache
    units.sort_by(|a, b| a.id.cmp(&b.id));
    let report = engine.run(&units).unwrap();
    assert_eq!(transpiler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.aggregate.cache_hit_rate, 1.0);
    assert!(report
        .per_unit
        .iter()
        .all(|u| u.status == UnitStatus::Unchanged));
}

/// Editing one file re-validates only its impact set
#[test]
fn test_incremental_run_revalidates_impact_set_only() {
    let temp_dir = TempDir::new().unwrap();
    write_project(&temp_dir);

    let (units, _) = scan_project(temp_dir.path()).unwrap();
    let transpiler = Arc::new(ReversingTranspiler::new());
    let engine = engine(Arc::clone(&transpiler));
    engine.run(&units).unwrap();

    fs::write(
        temp_dir.path().join("util.py"),
        "def helper():\n    return 2\n",
    )
    .unwrap();
    let (units, _) = scan_project(temp_dir.path()).unwrap();
    let report = engine.run(&units).unwrap();

    // util changed, main depends on it; standalone stays cached
    let status: HashMap<&str, UnitStatus> = report
        .per_unit
        .iter()
        .map(|u| (u.unit_id.as_str(), u.status))
        .collect();
    assert_eq!(status["util.py"], UnitStatus::Migrated);
    assert_eq!(status["main.py"], UnitStatus::Migrated);
    assert_eq!(status["standalone.py"], UnitStatus::Unchanged);
    // Only util was re-transpiled; main's artifact came from cache
    assert_eq!(transpiler.calls.load(Ordering::SeqCst), 4);
}

/// Fingerprints and dependency edges survive an engine restart via the
/// state file, so a fresh process still skips unchanged work
#[test]
fn test_state_persistence_across_engines() {
    let temp_dir = TempDir::new().unwrap();
    write_project(&temp_dir);
    let state_path = temp_dir.path().join(".mudanza-state.json");

    let (units, _) = scan_project(temp_dir.path()).unwrap();
    {
        let transpiler = Arc::new(ReversingTranspiler::new());
        let engine = engine(transpiler);
        engine.run(&units).unwrap();
        engine.save_state(&state_path).unwrap();
    }
    assert!(state_path.exists());

    let transpiler = Arc::new(ReversingTranspiler::new());
    let mut engine = engine(transpiler);
    engine.load_state(&state_path).unwrap();
    assert_eq!(engine.graph().edge_count(), 1);

    // The artifact cache is in-memory only, so a restart re-transpiles,
    // but the loaded graph still knows main depends on util
    assert_eq!(
        engine.graph().impact_set(&[UnitId::from("util.py")]),
        vec![UnitId::from("main.py"), UnitId::from("util.py")]
    );
}

/// A unit the transpiler rejects fails the gate without blocking the rest
#[test]
fn test_untranslatable_unit_does_not_block_project() {
    let temp_dir = TempDir::new().unwrap();
    write_project(&temp_dir);
    fs::write(
        temp_dir.path().join("dynamic.py"),
        "raise SyntaxError('nope')\n",
    )
    .unwrap();

    let (units, _) = scan_project(temp_dir.path()).unwrap();
    let transpiler = Arc::new(ReversingTranspiler::new());
    let engine = engine(transpiler);
    let report = engine.run(&units).unwrap();

    assert_eq!(report.aggregate.passed, 3);
    assert_eq!(report.aggregate.transpile_errors, 1);
    assert!(!report.gate_passed());
    assert!(report.summary().contains("cannot translate dynamic raise"));
}
