//! Fans package work out to blocking tasks and gathers the results.

use super::locate::locate_tests;
use super::packages::{PackageDirectory, PackageInfo};
use super::parser::parse_file;
use super::targets::TestTarget;
use super::transform::SourceTransform;
use crate::error::{EngineError, EngineResult};
use crate::results::{File, PackageResults, Results};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Run `transform` over every target's package, one blocking task per
/// package. If any task fails, all tasks still finish, then the first error
/// is returned and partial results are dropped.
pub async fn process(
    repo_root: &Path,
    packages: &PackageDirectory,
    targets: Vec<TestTarget>,
    transform: Arc<dyn SourceTransform>,
) -> EngineResult<Results> {
    let (tx, mut rx) = mpsc::channel::<PackageResults>(targets.len().max(1));
    let mut tasks = JoinSet::new();
    let mut task_packages = HashMap::new();

    for target in targets {
        let Some(package) = packages.get(&target.package).cloned() else {
            warn!(package = %target.package, "package not found in repository; skipping");
            continue;
        };

        let tx = tx.clone();
        let transform = Arc::clone(&transform);
        let root = repo_root.to_path_buf();
        let name = target.package.clone();
        let handle = tasks.spawn_blocking(move || -> EngineResult<()> {
            let results = process_package(&root, &package, &target, transform.as_ref())?;
            tx.blocking_send(results).map_err(|e| EngineError::Task {
                package: target.package.clone(),
                reason: e.to_string(),
            })
        });
        task_packages.insert(handle.id(), name);
    }
    drop(tx);

    let mut first_err = None;
    while let Some(joined) = tasks.join_next_with_id().await {
        let err = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((_, Err(err))) => err,
            Err(join_err) => EngineError::Task {
                package: task_packages
                    .get(&join_err.id())
                    .cloned()
                    .unwrap_or_default(),
                reason: join_err.to_string(),
            },
        };
        warn!(error = %err, "package task failed");
        if first_err.is_none() {
            first_err = Some(err);
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    let mut results = Results::new(transform.operation());
    while let Some(package) = rx.recv().await {
        results.insert(package);
    }

    info!(
        operation = results.operation.verb(),
        succeeded = ?results.succeeded_names(),
        failed = ?results.failed_names(),
        "finished processing targets"
    );
    Ok(results)
}

/// Transform one package's test files for one target.
pub fn process_package(
    repo_root: &Path,
    package: &PackageInfo,
    target: &TestTarget,
    transform: &dyn SourceTransform,
) -> EngineResult<PackageResults> {
    let wanted: HashSet<String> = target.tests.iter().cloned().collect();
    let mut located: HashSet<String> = HashSet::new();
    let mut results = PackageResults::new(&package.import_path);

    let mut test_files = package.test_go_files.clone();
    test_files.sort();

    for path in &test_files {
        let file = parse_file(path)?;
        let funcs = locate_tests(&file, &wanted);
        if funcs.is_empty() {
            continue;
        }
        located.extend(funcs.iter().map(|f| f.name.clone()));

        let transformed = transform.apply(&file, &funcs)?;
        if transformed.tests.is_empty() {
            continue;
        }
        debug!(
            package = %package.import_path,
            file = %path.display(),
            tests = transformed.tests.len(),
            "edited test file"
        );
        results.successes.push(File {
            package: package.import_path.clone(),
            file: relative_path(repo_root, path)?,
            file_abs: path.clone(),
            tests: transformed.tests,
            modified_source_code: transformed.source,
        });
    }

    results.failures = target
        .tests
        .iter()
        .filter(|name| !located.contains(*name))
        .cloned()
        .collect();
    Ok(results)
}

/// `/`-separated path of `path` below `root`. Both must be spelled the same
/// way, so callers pass a canonical root.
fn relative_path(root: &Path, path: &Path) -> EngineResult<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| EngineError::Resolution {
            root: root.to_path_buf(),
            reason: format!("{} is outside the repository root", path.display()),
        })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
