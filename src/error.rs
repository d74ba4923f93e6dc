//! Error types for the quarantine engine.

use std::path::PathBuf;
use thiserror::Error;

/// Infrastructure-level failures. Tests that cannot be located are not
/// errors; they are reported through `PackageResults::failures`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The repository root could not be queried for packages.
    #[error("failed to resolve packages under {root}: {reason}")]
    Resolution { root: PathBuf, reason: String },

    /// A Go source file did not parse cleanly.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Edited source could not be rendered back into valid Go.
    #[error("failed to render {path}: {reason}")]
    Render { path: PathBuf, reason: String },

    /// Reading a source file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing modified source back to disk failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A package task panicked or was cancelled.
    #[error("package task for {package} did not complete: {reason}")]
    Task { package: String, reason: String },
}

/// Convenience result alias.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
