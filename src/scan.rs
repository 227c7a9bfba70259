use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::graph::DependencyGraph;
use crate::types::{Language, Unit, UnitId};

/// Scan a project directory into migratable units and their dependency graph.
///
/// Units are identified by their path relative to the project root;
/// dependencies are extracted from import/include lines and resolved against
/// the discovered unit set (external imports are ignored).
pub fn scan_project(root: &Path) -> Result<(Vec<Unit>, DependencyGraph)> {
    info!("Scanning project at {:?}", root);

    let mut units = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(e.path()))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = detect_language_from_path(entry.path()) else {
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let content = std::fs::read_to_string(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;

        units.push(
            Unit::new(relative, language, content).with_source_path(entry.path().to_path_buf()),
        );
    }
    units.sort_by(|a, b| a.id.cmp(&b.id));
    info!("Discovered {} unit(s)", units.len());

    let graph = build_graph(&mut units);
    Ok((units, graph))
}

/// Resolve declared imports against the discovered units and build the graph
fn build_graph(units: &mut [Unit]) -> DependencyGraph {
    let graph = DependencyGraph::new();
    let known: Vec<UnitId> = units.iter().map(|u| u.id.clone()).collect();
    for unit in units.iter_mut() {
        graph.add_unit(unit.id.clone());
        let mut deps = Vec::new();
        for import in extract_imports(&unit.content, &unit.language) {
            if let Some(dep) = resolve_import(&import, &known, &unit.id) {
                debug!("{} depends on {}", unit.id, dep);
                graph.add_edge(unit.id.clone(), dep.clone());
                deps.push(dep);
            }
        }
        deps.sort();
        deps.dedup();
        unit.declared_deps = deps;
    }
    graph
}

/// Detect language from file extension
pub fn detect_language_from_path(path: &Path) -> Option<Language> {
    let extension = path.extension()?.to_str()?;

    match extension {
        "py" | "pyx" | "pyi" => Some(Language::Python),
        "c" | "h" => Some(Language::C),
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Some(Language::Cpp),
        "rs" => Some(Language::Rust),
        "sh" | "bash" | "zsh" => Some(Language::Shell),
        "js" | "jsx" | "mjs" => Some(Language::JavaScript),
        "ts" | "tsx" => Some(Language::TypeScript),
        "go" => Some(Language::Go),
        _ => None,
    }
}

/// Extract imported module names from source, line-based. Deliberately naive:
/// good enough to seed the dependency graph, and over-reporting an import is
/// safe (the impact set only grows).
pub fn extract_imports(content: &str, language: &Language) -> Vec<String> {
    let mut imports = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        match language {
            Language::Python => {
                if let Some(rest) = trimmed.strip_prefix("import ") {
                    let name = rest.split([' ', '.', ',']).next().unwrap_or("");
                    if !name.is_empty() {
                        imports.push(name.to_string());
                    }
                } else if let Some(rest) = trimmed.strip_prefix("from ") {
                    let name = rest.split([' ', '.']).next().unwrap_or("");
                    if !name.is_empty() {
                        imports.push(name.to_string());
                    }
                }
            }
            Language::C | Language::Cpp => {
                if let Some(rest) = trimmed.strip_prefix("#include \"") {
                    if let Some(name) = rest.split('"').next() {
                        imports.push(name.to_string());
                    }
                }
            }
            Language::JavaScript | Language::TypeScript => {
                if trimmed.starts_with("import ") || trimmed.starts_with("export ") {
                    if let Some(start) = trimmed.find("from ") {
                        let rest = &trimmed[start + 5..];
                        let name: String = rest
                            .trim_start_matches(['\'', '"'])
                            .chars()
                            .take_while(|c| *c != '\'' && *c != '"')
                            .collect();
                        if let Some(relative) = name.strip_prefix("./") {
                            imports.push(relative.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    imports
}

/// Map an import name to a known unit id, if the import is project-local
fn resolve_import(import: &str, known: &[UnitId], importer: &UnitId) -> Option<UnitId> {
    // Same-directory resolution first, then project root
    let dir = importer
        .as_str()
        .rsplit_once('/')
        .map(|(dir, _)| format!("{}/", dir))
        .unwrap_or_default();

    let candidates = [
        format!("{}{}", dir, import),
        format!("{}{}.py", dir, import),
        format!("{}{}.h", dir, import),
        import.to_string(),
        format!("{}.py", import),
        format!("{}.h", import),
        format!("{}.js", import),
        format!("{}.ts", import),
    ];

    for candidate in &candidates {
        let candidate = UnitId::new(candidate.clone());
        if candidate != *importer && known.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Check if path should be ignored (common directories to skip)
fn is_ignored(path: &Path) -> bool {
    let ignore_names = [
        ".git",
        ".svn",
        ".hg",
        "node_modules",
        "target",
        "build",
        "dist",
        "__pycache__",
        ".pytest_cache",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
    ];

    path.components().any(|c| {
        if let Some(name) = c.as_os_str().to_str() {
            ignore_names.contains(&name)
        } else {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_detect_language_from_path() {
        assert_eq!(
            detect_language_from_path(&PathBuf::from("test.py")),
            Some(Language::Python)
        );
        assert_eq!(
            detect_language_from_path(&PathBuf::from("main.cc")),
            Some(Language::Cpp)
        );
        assert_eq!(
            detect_language_from_path(&PathBuf::from("mod.go")),
            Some(Language::Go)
        );
        assert_eq!(detect_language_from_path(&PathBuf::from("README.md")), None);
    }

    #[test]
    fn test_extract_python_imports() {
        let content = "import util\nfrom helpers import thing\nimport os.path\nx = 1";
        let imports = extract_imports(content, &Language::Python);
        assert_eq!(imports, vec!["util", "helpers", "os"]);
    }

    #[test]
    fn test_extract_c_includes() {
        let content = "#include <stdio.h>\n#include \"util.h\"\nint main() {}";
        let imports = extract_imports(content, &Language::C);
        // System headers are external; only quoted includes count
        assert_eq!(imports, vec!["util.h"]);
    }

    #[test]
    fn test_scan_builds_units_and_edges() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("util.py"), "def helper(): pass").unwrap();
        fs::write(
            temp_dir.path().join("main.py"),
            "import util\n\ndef main(): util.helper()",
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "not a unit").unwrap();

        let (units, graph) = scan_project(temp_dir.path()).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, UnitId::from("main.py"));
        assert_eq!(units[0].declared_deps, vec![UnitId::from("util.py")]);

        // Changing util re-validates main
        let impact = graph.impact_set(&[UnitId::from("util.py")]);
        assert_eq!(impact, vec![UnitId::from("main.py"), UnitId::from("util.py")]);
    }

    #[test]
    fn test_scan_skips_ignored_directories() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("__pycache__");
        fs::create_dir(&cache_dir).unwrap();
        fs::write(cache_dir.join("stale.py"), "x = 1").unwrap();
        fs::write(temp_dir.path().join("real.py"), "x = 2").unwrap();

        let (units, _) = scan_project(temp_dir.path()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, UnitId::from("real.py"));
    }
}
