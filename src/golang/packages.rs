//! Package resolution: which files make up each Go package in a repository.
//!
//! The build graph itself comes from a [`BuildGraph`] back-end. [`GoList`]
//! asks the Go toolchain; [`WalkGraph`] reconstructs an approximation from
//! the directory tree when no toolchain is available.

use crate::error::{EngineError, EngineResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

const TEST_SUFFIX: &str = "_test.go";

/// Files and metadata of one buildable package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub import_path: String,
    pub name: String,
    pub dir: PathBuf,
    /// Non-test source files, absolute.
    pub go_files: Vec<PathBuf>,
    /// Test source files (in-package and external), absolute.
    pub test_go_files: Vec<PathBuf>,
    /// Root directory of the owning module.
    pub module: Option<PathBuf>,
}

/// Packages keyed by import path.
pub type PackageDirectory = HashMap<String, PackageInfo>;

/// One package as reported by a build-graph query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedPackage {
    pub import_path: String,
    pub name: String,
    pub dir: PathBuf,
    /// Every source file the package compiles, tests included, absolute.
    pub files: Vec<PathBuf>,
    pub module_dir: Option<PathBuf>,
    /// Set when the package itself could not be loaded.
    pub error: Option<String>,
}

/// Source of package facts for a repository checkout.
pub trait BuildGraph: Send + Sync {
    /// List every package under `root`. Per-package problems belong in
    /// [`ListedPackage::error`]; an `Err` means the query could not run.
    fn query(&self, root: &Path, build_flags: &[String]) -> EngineResult<Vec<ListedPackage>>;
}

/// Resolve `root` into a package directory. Packages that fail to load are
/// logged and left out.
pub fn resolve(
    graph: &dyn BuildGraph,
    root: &Path,
    build_flags: &[String],
) -> EngineResult<PackageDirectory> {
    if !root.is_dir() {
        return Err(EngineError::Resolution {
            root: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut directory = PackageDirectory::new();
    for listed in graph.query(root, build_flags)? {
        if let Some(err) = &listed.error {
            warn!(package = %listed.import_path, error = %err, "skipping package that failed to load");
            continue;
        }

        let (test_go_files, go_files): (Vec<PathBuf>, Vec<PathBuf>) =
            listed.files.into_iter().partition(|f| is_test_file(f));

        let entry = directory
            .entry(listed.import_path.clone())
            .or_insert_with(|| PackageInfo {
                import_path: listed.import_path.clone(),
                name: listed.name.clone(),
                dir: listed.dir.clone(),
                go_files: Vec::new(),
                test_go_files: Vec::new(),
                module: listed.module_dir.clone(),
            });
        for file in go_files {
            if !entry.go_files.contains(&file) {
                entry.go_files.push(file);
            }
        }
        for file in test_go_files {
            if !entry.test_go_files.contains(&file) {
                entry.test_go_files.push(file);
            }
        }
    }

    debug!(root = %root.display(), packages = directory.len(), "resolved packages");
    Ok(directory)
}

pub fn is_test_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEST_SUFFIX))
}

/// Queries the Go toolchain with `go list -e -json <flags> ./...`.
#[derive(Debug, Clone)]
pub struct GoList {
    pub go_binary: PathBuf,
}

impl Default for GoList {
    fn default() -> Self {
        Self {
            go_binary: PathBuf::from("go"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoListPackage {
    import_path: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    dir: PathBuf,
    #[serde(default)]
    go_files: Vec<String>,
    #[serde(default)]
    cgo_files: Vec<String>,
    #[serde(default)]
    test_go_files: Vec<String>,
    #[serde(default, rename = "XTestGoFiles")]
    xtest_go_files: Vec<String>,
    module: Option<GoListModule>,
    error: Option<GoListError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoListModule {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoListError {
    err: String,
}

impl From<GoListPackage> for ListedPackage {
    fn from(pkg: GoListPackage) -> Self {
        let dir = pkg.dir;
        let files = pkg
            .go_files
            .iter()
            .chain(&pkg.cgo_files)
            .chain(&pkg.test_go_files)
            .chain(&pkg.xtest_go_files)
            .map(|f| dir.join(f))
            .collect();
        ListedPackage {
            import_path: pkg.import_path,
            name: pkg.name,
            files,
            module_dir: pkg.module.and_then(|m| m.dir),
            error: pkg.error.map(|e| e.err),
            dir,
        }
    }
}

/// Decode the concatenated JSON objects `go list -json` prints.
fn parse_go_list(stdout: &[u8]) -> Result<Vec<ListedPackage>, serde_json::Error> {
    serde_json::Deserializer::from_slice(stdout)
        .into_iter::<GoListPackage>()
        .map(|pkg| pkg.map(ListedPackage::from))
        .collect()
}

impl BuildGraph for GoList {
    fn query(&self, root: &Path, build_flags: &[String]) -> EngineResult<Vec<ListedPackage>> {
        let resolution_err = |reason: String| EngineError::Resolution {
            root: root.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.go_binary)
            .current_dir(root)
            .args(["list", "-e", "-json"])
            .args(build_flags)
            .arg("./...")
            .output()
            .map_err(|e| resolution_err(format!("failed to run go list: {}", e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(resolution_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_go_list(&output.stdout)
            .map_err(|e| resolution_err(format!("malformed go list output: {}", e)))
    }
}

/// Reconstructs packages from the directory tree and `go.mod`.
///
/// Build constraints are not evaluated, so `build_flags` are ignored and
/// every `.go` file in a directory counts. Nested modules, `vendor`,
/// `testdata`, and directories starting with `.` or `_` are skipped, as
/// `go list ./...` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkGraph;

fn module_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*module\s+"?([^\s"]+)"?"#).expect("valid regex"))
}

fn package_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*package\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"))
}

fn is_skipped_dir(name: &str) -> bool {
    name == "vendor" || name == "testdata" || name.starts_with('.') || name.starts_with('_')
}

impl BuildGraph for WalkGraph {
    fn query(&self, root: &Path, build_flags: &[String]) -> EngineResult<Vec<ListedPackage>> {
        let resolution_err = |reason: String| EngineError::Resolution {
            root: root.to_path_buf(),
            reason,
        };

        let go_mod = std::fs::read_to_string(root.join("go.mod"))
            .map_err(|e| resolution_err(format!("cannot read go.mod: {}", e)))?;
        let module_path = module_directive()
            .captures(&go_mod)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| resolution_err("go.mod has no module directive".to_string()))?;

        if !build_flags.is_empty() {
            debug!(flags = ?build_flags, "directory walk ignores build flags");
        }

        let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_str().unwrap_or("");
                !is_skipped_dir(name) && !e.path().join("go.mod").exists()
            });
        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("go")
            {
                if let Some(dir) = path.parent() {
                    by_dir.entry(dir.to_path_buf()).or_default().push(path.to_path_buf());
                }
            }
        }

        let mut packages = Vec::with_capacity(by_dir.len());
        for (dir, files) in by_dir {
            let rel = dir.strip_prefix(root).unwrap_or(&dir);
            let import_path = if rel.as_os_str().is_empty() {
                module_path.clone()
            } else {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{}/{}", module_path, rel)
            };

            let (name, error) = match package_name(&files) {
                Ok(name) => (name, None),
                Err(reason) => (String::new(), Some(reason)),
            };
            packages.push(ListedPackage {
                import_path,
                name,
                dir,
                files,
                module_dir: Some(root.to_path_buf()),
                error,
            });
        }
        Ok(packages)
    }
}

/// Package name from the first non-test file, else from a test file with any
/// external `_test` suffix removed.
fn package_name(files: &[PathBuf]) -> Result<String, String> {
    let ordered = files
        .iter()
        .filter(|f| !is_test_file(f))
        .chain(files.iter().filter(|f| is_test_file(f)));
    for file in ordered {
        let content = std::fs::read_to_string(file)
            .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
        if let Some(name) = package_clause().captures(&content).and_then(|c| c.get(1)) {
            let name = name.as_str();
            return Ok(name.strip_suffix("_test").unwrap_or(name).to_string());
        }
    }
    Err("no package clause found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FakeGraph(Vec<ListedPackage>);

    impl BuildGraph for FakeGraph {
        fn query(&self, _root: &Path, _flags: &[String]) -> EngineResult<Vec<ListedPackage>> {
            Ok(self.0.clone())
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_partitions_and_skips_broken() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let graph = FakeGraph(vec![
            ListedPackage {
                import_path: "example.com/m/store".to_string(),
                name: "store".to_string(),
                dir: dir.clone(),
                files: vec![dir.join("store.go"), dir.join("store_test.go"), dir.join("x_test.go")],
                module_dir: Some(tmp.path().to_path_buf()),
                error: None,
            },
            ListedPackage {
                import_path: "example.com/m/broken".to_string(),
                error: Some("cannot find package".to_string()),
                ..ListedPackage::default()
            },
        ]);

        let packages = resolve(&graph, tmp.path(), &[]).unwrap();
        assert_eq!(packages.len(), 1);
        let store = &packages["example.com/m/store"];
        assert_eq!(store.go_files, vec![dir.join("store.go")]);
        assert_eq!(store.test_go_files, vec![dir.join("store_test.go"), dir.join("x_test.go")]);
        assert_eq!(store.module.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn test_resolve_rejects_missing_root() {
        let err = resolve(&FakeGraph(Vec::new()), Path::new("/definitely/not/here"), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
    }

    #[test]
    fn test_parse_go_list_stream() {
        let stdout = br#"{
	"Dir": "/repo/store",
	"ImportPath": "example.com/m/store",
	"Name": "store",
	"Module": {"Path": "example.com/m", "Dir": "/repo"},
	"GoFiles": ["store.go"],
	"TestGoFiles": ["store_test.go"],
	"XTestGoFiles": ["example_test.go"]
}
{
	"Dir": "/repo/bad",
	"ImportPath": "example.com/m/bad",
	"Error": {"Err": "no Go files"}
}
"#;
        let listed = parse_go_list(stdout).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(
            listed[0].files,
            vec![
                PathBuf::from("/repo/store/store.go"),
                PathBuf::from("/repo/store/store_test.go"),
                PathBuf::from("/repo/store/example_test.go"),
            ]
        );
        assert_eq!(listed[0].module_dir, Some(PathBuf::from("/repo")));
        assert_eq!(listed[1].error.as_deref(), Some("no Go files"));
    }

    /// Writes an executable stand-in for the `go` binary into `dir`.
    #[cfg(unix)]
    fn fake_go(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-go");
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_go_list_runs_binary_with_flags() {
        let tmp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let root = tmp.path();
        let store = root.join("store");
        let stream = [
            serde_json::json!({
                "Dir": store,
                "ImportPath": "example.com/m/store",
                "Name": "store",
                "Module": {"Path": "example.com/m", "Dir": root},
                "GoFiles": ["store.go"],
                "TestGoFiles": ["store_test.go"],
                "XTestGoFiles": ["example_test.go"]
            }),
            serde_json::json!({
                "Dir": root.join("bad"),
                "ImportPath": "example.com/m/bad",
                "Error": {"Err": "no Go files"}
            }),
        ]
        .iter()
        .map(|v| serde_json::to_string_pretty(v).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
        fs::write(bin.path().join("list.json"), stream).unwrap();
        let args_file = bin.path().join("args.txt");
        let go_binary = fake_go(
            bin.path(),
            &format!(
                "printf '%s\\n' \"$@\" > '{}'\npwd >> '{}'\ncat '{}'\n",
                args_file.display(),
                args_file.display(),
                bin.path().join("list.json").display()
            ),
        );

        let graph = GoList { go_binary };
        let packages = resolve(&graph, root, &["-tags=integration".to_string()]).unwrap();
        assert_eq!(packages.len(), 1);
        let pkg = &packages["example.com/m/store"];
        assert_eq!(pkg.name, "store");
        assert_eq!(pkg.dir, store);
        assert_eq!(pkg.go_files, vec![store.join("store.go")]);
        assert_eq!(
            pkg.test_go_files,
            vec![store.join("store_test.go"), store.join("example_test.go")]
        );
        assert_eq!(pkg.module.as_deref(), Some(root));

        let recorded = fs::read_to_string(&args_file).unwrap();
        let mut lines = recorded.lines();
        let args: Vec<&str> = lines.by_ref().take(5).collect();
        assert_eq!(args, vec!["list", "-e", "-json", "-tags=integration", "./..."]);
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(cwd.canonicalize().unwrap(), root.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_go_list_failure_is_resolution_error() {
        let tmp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let go_binary = fake_go(
            bin.path(),
            "echo 'go: cannot find main module' >&2\nexit 1\n",
        );

        let err = resolve(&GoList { go_binary }, tmp.path(), &[]).unwrap_err();
        match err {
            EngineError::Resolution { root, reason } => {
                assert_eq!(root, tmp.path());
                assert_eq!(reason, "go: cannot find main module");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_go_list_missing_binary_is_resolution_error() {
        let tmp = TempDir::new().unwrap();
        let graph = GoList {
            go_binary: tmp.path().join("no-such-go"),
        };
        let err = resolve(&graph, tmp.path(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
        assert!(err.to_string().contains("failed to run go list"));
    }

    #[test]
    fn test_walk_graph_groups_by_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "go.mod", "module example.com/m\n\ngo 1.22\n");
        write(root, "root.go", "package m\n");
        write(root, "store/store.go", "// Package store.\npackage store\n");
        write(root, "store/store_test.go", "package store\n");
        write(root, "store/ext_test.go", "package store_test\n");
        write(root, "onlytests/a_test.go", "package onlytests_test\n");
        write(root, "vendor/dep/dep.go", "package dep\n");
        write(root, "store/testdata/fixture.go", "package fixture\n");
        write(root, "nested/go.mod", "module example.com/nested\n");
        write(root, "nested/n.go", "package nested\n");

        let packages = resolve(&WalkGraph, root, &["-tags=integration".to_string()]).unwrap();
        let mut paths: Vec<&str> = packages.keys().map(String::as_str).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["example.com/m", "example.com/m/onlytests", "example.com/m/store"]
        );

        let store = &packages["example.com/m/store"];
        assert_eq!(store.name, "store");
        assert_eq!(store.go_files.len(), 1);
        assert_eq!(store.test_go_files.len(), 2);
        assert_eq!(packages["example.com/m/onlytests"].name, "onlytests");
    }

    #[test]
    fn test_walk_graph_requires_go_mod() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(&WalkGraph, tmp.path(), &[]).unwrap_err();
        assert!(err.to_string().contains("go.mod"));
    }
}
