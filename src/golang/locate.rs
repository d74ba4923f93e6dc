//! Finds test and fuzz entry points among a file's top-level functions.

use super::parser::{FuncDecl, SourceFile, TypeExpr};
use std::collections::HashSet;

const TESTING_IMPORT: &str = "testing";

/// The two kinds of entry point `go test` runs that can be quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Test,
    Fuzz,
}

impl EntryKind {
    fn prefix(&self) -> &'static str {
        match self {
            EntryKind::Test => "Test",
            EntryKind::Fuzz => "Fuzz",
        }
    }

    /// Name of the context type in package `testing`.
    fn context_type(&self) -> &'static str {
        match self {
            EntryKind::Test => "T",
            EntryKind::Fuzz => "F",
        }
    }

    /// Classify a function name following `go test` rules: the prefix must
    /// not be followed by a lowercase letter.
    pub fn of(name: &str) -> Option<Self> {
        [EntryKind::Test, EntryKind::Fuzz]
            .into_iter()
            .find(|kind| match name.strip_prefix(kind.prefix()) {
                Some(rest) => !rest.chars().next().is_some_and(char::is_lowercase),
                None => false,
            })
    }
}

/// Every top-level function in `file` named in `wanted` whose signature
/// makes it a test or fuzz entry point, in file order.
pub fn locate_tests<'a>(file: &'a SourceFile, wanted: &HashSet<String>) -> Vec<&'a FuncDecl> {
    let testing = file.qualifier_for(TESTING_IMPORT).unwrap_or(TESTING_IMPORT);
    file.funcs
        .iter()
        .filter(|func| wanted.contains(&func.name))
        .filter(|func| is_entry_point(func, testing))
        .collect()
}

/// `func TestXxx(t *testing.T)` or `func FuzzXxx(f *testing.F)`, with
/// `testing` being the qualifier the file imports the package under.
pub fn is_entry_point(func: &FuncDecl, testing: &str) -> bool {
    if func.is_method || func.body.is_none() || func.param_count() != 1 {
        return false;
    }
    let Some(kind) = EntryKind::of(&func.name) else {
        return false;
    };
    let param = &func.params[0];
    if param.variadic {
        return false;
    }

    match &param.ty {
        TypeExpr::Pointer(inner) => matches!(
            inner.as_ref(),
            TypeExpr::Qualified { package, name }
                if package == testing && name == kind.context_type()
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::golang::parser::parse_source;
    use std::path::Path;

    const SAMPLE: &str = r#"package sample

import "testing"

type SomeType struct{}

func TestHelper(helper *SomeType) {}

func FuzzX(t *testing.T) {}

func FuzzParse(f *testing.F) {}

func TestOK(t *testing.T) {}

func TestTwo(a, b *testing.T) {}

func Testlower(t *testing.T) {}

func TestByValue(t testing.T) {}

func (s *SomeType) TestOnMethod(t *testing.T) {}

func TestUnnamed(*testing.T) {}
"#;

    fn names(wanted: &[&str]) -> Vec<String> {
        let file = parse_source(Path::new("sample_test.go"), SAMPLE.to_string()).unwrap();
        let wanted: HashSet<String> = wanted.iter().map(|s| s.to_string()).collect();
        locate_tests(&file, &wanted)
            .into_iter()
            .map(|f| f.name.clone())
            .collect()
    }

    #[test]
    fn test_entry_kind_follows_go_naming() {
        assert_eq!(EntryKind::of("Test"), Some(EntryKind::Test));
        assert_eq!(EntryKind::of("TestFoo"), Some(EntryKind::Test));
        assert_eq!(EntryKind::of("Test_foo"), Some(EntryKind::Test));
        assert_eq!(EntryKind::of("Testfoo"), None);
        assert_eq!(EntryKind::of("FuzzFoo"), Some(EntryKind::Fuzz));
        assert_eq!(EntryKind::of("BenchmarkFoo"), None);
    }

    #[test]
    fn test_matches_only_requested_names() {
        assert_eq!(names(&["TestOK"]), vec!["TestOK"]);
        assert_eq!(names(&["FuzzParse", "TestOK"]), vec!["FuzzParse", "TestOK"]);
        assert!(names(&["TestMissing"]).is_empty());
    }

    #[test]
    fn test_signature_discrimination() {
        assert!(names(&["TestHelper"]).is_empty());
        assert!(names(&["FuzzX"]).is_empty());
        assert!(names(&["TestTwo"]).is_empty());
        assert!(names(&["Testlower"]).is_empty());
        assert!(names(&["TestByValue"]).is_empty());
        assert!(names(&["TestOnMethod"]).is_empty());
    }

    #[test]
    fn test_unnamed_parameter_still_matches() {
        assert_eq!(names(&["TestUnnamed"]), vec!["TestUnnamed"]);
    }

    #[test]
    fn test_aliased_testing_import() {
        let src = "package a\n\nimport tt \"testing\"\n\nfunc TestA(t *tt.T) {}\n\nfunc TestB(t *testing.T) {}\n";
        let file = parse_source(Path::new("a_test.go"), src.to_string()).unwrap();
        let wanted: HashSet<String> = ["TestA", "TestB"].iter().map(|s| s.to_string()).collect();
        let found: Vec<&str> = locate_tests(&file, &wanted)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(found, vec!["TestA"]);
    }
}
