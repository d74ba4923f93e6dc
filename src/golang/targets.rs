//! Quarantine targets and their sanitization.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Tests requested for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTarget {
    /// Import path of the package.
    pub package: String,
    pub tests: Vec<String>,
}

impl TestTarget {
    pub fn new<I, S>(package: &str, tests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package: package.to_string(),
            tests: tests.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `import/path=TestA,TestB`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (package, tests) = spec.split_once('=')?;
        let package = package.trim();
        let tests: Vec<String> = tests
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if package.is_empty() || tests.is_empty() {
            return None;
        }
        Some(Self::new(package, tests))
    }
}

/// Merge targets naming the same package into one, dropping duplicate test
/// names. Output is ordered by package; tests keep first-seen order.
pub fn sanitize(targets: impl IntoIterator<Item = TestTarget>) -> Vec<TestTarget> {
    let mut merged: BTreeMap<String, (Vec<String>, HashSet<String>)> = BTreeMap::new();
    for target in targets {
        let (tests, seen) = merged.entry(target.package).or_default();
        for test in target.tests {
            if seen.insert(test.clone()) {
                tests.push(test);
            }
        }
    }
    merged
        .into_iter()
        .map(|(package, (tests, _))| TestTarget { package, tests })
        .collect()
}
