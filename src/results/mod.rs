//! Outcome of a quarantine or unquarantine run.
//!
//! Everything here is built fresh by one orchestration call and read by
//! whoever turns it into commits, pull-request bodies, or files on disk.

mod report;

pub use report::{commit_changes, write_results_to_files};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which edit produced a [`Results`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Quarantine,
    Unquarantine,
    #[default]
    Unspecified,
}

impl Operation {
    /// Imperative verb, e.g. "quarantine".
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Quarantine => "quarantine",
            Operation::Unquarantine => "unquarantine",
            Operation::Unspecified => "process",
        }
    }

    /// Past tense, e.g. "quarantined".
    pub fn past_tense(&self) -> &'static str {
        match self {
            Operation::Quarantine => "quarantined",
            Operation::Unquarantine => "unquarantined",
            Operation::Unspecified => "processed",
        }
    }
}

/// One edited test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,
    /// 1-based line of the function before the edit.
    pub original_line: usize,
    /// 1-based line of the function in the re-rendered file.
    pub modified_line: usize,
}

impl Test {
    pub fn new(name: &str, original_line: usize) -> Self {
        Self {
            name: name.to_string(),
            original_line,
            modified_line: original_line,
        }
    }

    /// Line the report should link to for this operation.
    pub fn link_line(&self, operation: Operation) -> usize {
        match operation {
            Operation::Quarantine => self.modified_line,
            Operation::Unquarantine | Operation::Unspecified => self.original_line,
        }
    }
}

/// A source file with at least one successful edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub package: String,
    /// Path relative to the repository root, `/`-separated.
    pub file: String,
    pub file_abs: PathBuf,
    pub tests: Vec<Test>,
    pub modified_source_code: String,
}

/// Per-package outcome. Every requested test is either in some file's
/// `tests` or in `failures`, except unquarantine requests whose first
/// statement was not the marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageResults {
    pub package: String,
    pub successes: Vec<File>,
    pub failures: Vec<String>,
}

impl PackageResults {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            ..Self::default()
        }
    }

    pub fn succeeded_tests(&self) -> impl Iterator<Item = &Test> {
        self.successes.iter().flat_map(|f| f.tests.iter())
    }
}

/// Results keyed by package import path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub operation: Operation,
    pub packages: BTreeMap<String, PackageResults>,
}

impl Results {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            packages: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, package: PackageResults) {
        self.packages.insert(package.package.clone(), package);
    }

    pub fn get(&self, package: &str) -> Option<&PackageResults> {
        self.packages.get(package)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.packages.values().flat_map(|p| p.successes.iter())
    }

    /// `<package>.<test>` for every edited test.
    pub fn succeeded_names(&self) -> Vec<String> {
        self.packages
            .values()
            .flat_map(|p| p.succeeded_tests().map(move |t| format!("{}.{}", p.package, t.name)))
            .collect()
    }

    /// `<package>.<test>` for every test that could not be found.
    pub fn failed_names(&self) -> Vec<String> {
        self.packages
            .values()
            .flat_map(|p| p.failures.iter().map(move |t| format!("{}.{}", p.package, t)))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.packages.values().map(|p| p.succeeded_tests().count()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.packages.values().map(|p| p.failures.len()).sum()
    }
}
