//! Quarantine engine for Go test suites.
//!
//! Resolves a repository into packages, finds the requested test entry
//! points in each package's test files, and inserts or removes the
//! quarantine block. Nothing is written to disk here; see
//! [`write_results_to_files`].

mod locate;
mod orchestrate;
mod packages;
mod parser;
mod syntax;
mod targets;
mod transform;

pub use crate::results::write_results_to_files;
pub use locate::{locate_tests, EntryKind};
pub use orchestrate::{process, process_package};
pub use packages::{
    is_test_file, resolve, BuildGraph, GoList, ListedPackage, PackageDirectory, PackageInfo,
    WalkGraph,
};
pub use parser::{parse_file, parse_source, FuncDecl, SourceFile};
pub use syntax::{Expr, Stmt};
pub use targets::{sanitize, TestTarget};
pub use transform::{
    marker, marker_condition, Quarantine, SourceTransform, Transformed, Unquarantine,
    DEFAULT_SKIP_REASON, FALLBACK_PARAM, QUARANTINE_ENV_VAR, RUNTIME_IMPORT,
};

use crate::error::{EngineError, EngineResult};
use crate::results::Results;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Entry point bundling a package resolver with the quarantine settings.
#[derive(Clone)]
pub struct Engine {
    graph: Arc<dyn BuildGraph>,
    skip_reason: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(GoList::default()))
    }
}

impl Engine {
    pub fn new(graph: Arc<dyn BuildGraph>) -> Self {
        Self {
            graph,
            skip_reason: DEFAULT_SKIP_REASON.to_string(),
        }
    }

    pub fn with_skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = reason.into();
        self
    }

    /// Quarantine `targets` in the repository at `repo`.
    pub async fn quarantine_tests(
        &self,
        repo: &Path,
        targets: Vec<TestTarget>,
        build_flags: &[String],
    ) -> EngineResult<Results> {
        let transform = Arc::new(Quarantine::with_reason(self.skip_reason.clone()));
        self.run(repo, targets, build_flags, transform).await
    }

    /// Remove the quarantine block from `targets` in the repository at `repo`.
    pub async fn unquarantine_tests(
        &self,
        repo: &Path,
        targets: Vec<TestTarget>,
        build_flags: &[String],
    ) -> EngineResult<Results> {
        self.run(repo, targets, build_flags, Arc::new(Unquarantine))
            .await
    }

    async fn run(
        &self,
        repo: &Path,
        targets: Vec<TestTarget>,
        build_flags: &[String],
        transform: Arc<dyn SourceTransform>,
    ) -> EngineResult<Results> {
        let targets = sanitize(targets);
        if targets.is_empty() {
            return Ok(Results::new(transform.operation()));
        }
        info!(
            operation = transform.operation().verb(),
            repo = %repo.display(),
            packages = targets.len(),
            "processing targets"
        );

        // Build graphs report absolute directories; file paths are made
        // relative against the same spelling of the root.
        let repo = repo.canonicalize().map_err(|e| EngineError::Resolution {
            root: repo.to_path_buf(),
            reason: e.to_string(),
        })?;
        let packages = self.resolve(&repo, build_flags).await?;
        process(&repo, &packages, targets, transform).await
    }

    /// Resolve on a blocking thread; package queries may shell out.
    async fn resolve(&self, repo: &Path, build_flags: &[String]) -> EngineResult<PackageDirectory> {
        let graph = Arc::clone(&self.graph);
        let root: PathBuf = repo.to_path_buf();
        let flags = build_flags.to_vec();
        tokio::task::spawn_blocking(move || resolve(graph.as_ref(), &root, &flags))
            .await
            .map_err(|e| EngineError::Resolution {
                root: repo.to_path_buf(),
                reason: e.to_string(),
            })?
    }
}

/// Quarantine `targets` using the `go list` resolver and the default skip
/// reason.
pub async fn quarantine_tests(
    repo: &Path,
    targets: Vec<TestTarget>,
    build_flags: &[String],
) -> EngineResult<Results> {
    Engine::default()
        .quarantine_tests(repo, targets, build_flags)
        .await
}

/// Unquarantine `targets` using the `go list` resolver.
pub async fn unquarantine_tests(
    repo: &Path,
    targets: Vec<TestTarget>,
    build_flags: &[String],
) -> EngineResult<Results> {
    Engine::default()
        .unquarantine_tests(repo, targets, build_flags)
        .await
}
