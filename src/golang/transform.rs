//! Quarantine and unquarantine edits.
//!
//! Quarantine prepends a fixed skip block to each matched test; unquarantine
//! removes it again, but only when the first statement of the body is
//! structurally that block. Edits are spliced at syntax-node anchors and the
//! result is re-parsed, both to reject output that is no longer valid Go and
//! to read the post-edit line of every touched function.

use super::parser::{parse_source, Block, FuncDecl, ImportSpec, SourceFile, StmtKind, StmtNode};
use super::syntax::{quote, BinaryOp, Expr, Stmt};
use crate::error::{EngineError, EngineResult};
use crate::results::{Operation, Test};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable that re-enables quarantined tests when set to `true`.
pub const QUARANTINE_ENV_VAR: &str = "RUN_QUARANTINED_TESTS";

/// Import path of the package providing `Getenv`.
pub const RUNTIME_IMPORT: &str = "os";

/// Parameter name bound when a test's parameter is unnamed or blank.
pub const FALLBACK_PARAM: &str = "t";

pub const DEFAULT_SKIP_REASON: &str =
    "Flaky test quarantined. Set RUN_QUARANTINED_TESTS=true to run it.";

/// Output of a transform over one file.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// Full re-rendered file text.
    pub source: String,
    /// Tests that were actually edited, in file order.
    pub tests: Vec<Test>,
}

/// A whole-file edit applied to the matched test functions of that file.
pub trait SourceTransform: Send + Sync {
    fn operation(&self) -> Operation;

    fn apply(&self, file: &SourceFile, funcs: &[&FuncDecl]) -> EngineResult<Transformed>;
}

/// `<runtime>.Getenv("RUN_QUARANTINED_TESTS") != "true"`
pub fn marker_condition(runtime: &str) -> Expr {
    Expr::binary(
        BinaryOp::NotEq,
        getenv(runtime),
        Expr::string("true"),
    )
}

fn getenv(runtime: &str) -> Expr {
    Expr::method_call(runtime, "Getenv", vec![Expr::string(QUARANTINE_ENV_VAR)])
}

/// The full quarantine block for a test whose context parameter is `param`.
pub fn marker(runtime: &str, param: &str, skip_reason: &str) -> Stmt {
    let notice = format!(
        "{} set to '%s', running quarantined test",
        QUARANTINE_ENV_VAR
    );
    Stmt::If {
        cond: marker_condition(runtime),
        then: vec![Stmt::Expr(Expr::method_call(
            param,
            "Skip",
            vec![Expr::string(skip_reason)],
        ))],
        otherwise: vec![Stmt::Expr(Expr::method_call(
            param,
            "Logf",
            vec![Expr::string(&notice), getenv(runtime)],
        ))],
    }
}

/// Inserts the quarantine block at the top of each matched test.
///
/// Already-quarantined tests are not detected: quarantining twice nests a
/// second block above the first.
#[derive(Debug, Clone)]
pub struct Quarantine {
    pub skip_reason: String,
}

impl Default for Quarantine {
    fn default() -> Self {
        Self {
            skip_reason: DEFAULT_SKIP_REASON.to_string(),
        }
    }
}

impl Quarantine {
    pub fn with_reason(skip_reason: impl Into<String>) -> Self {
        Self {
            skip_reason: skip_reason.into(),
        }
    }
}

impl SourceTransform for Quarantine {
    fn operation(&self) -> Operation {
        Operation::Quarantine
    }

    fn apply(&self, file: &SourceFile, funcs: &[&FuncDecl]) -> EngineResult<Transformed> {
        let mut rw = Rewriter::new(&file.text);
        let runtime = match file.qualifier_for(RUNTIME_IMPORT) {
            Some(name) => name.to_string(),
            None => {
                add_import(file, RUNTIME_IMPORT, &mut rw);
                RUNTIME_IMPORT.to_string()
            }
        };

        let mut tests = Vec::new();
        for func in funcs {
            let Some(body) = &func.body else {
                continue;
            };
            let param = bind_param(func, &mut rw);
            let block = marker(&runtime, &param, &self.skip_reason);
            prepend_stmt(&file.text, body, &block, &mut rw);
            tests.push(Test::new(&func.name, func.line));
        }

        if tests.is_empty() {
            return Ok(Transformed {
                source: file.text.clone(),
                tests,
            });
        }

        let rendered = render(&file.path, rw.finish())?;
        record_modified_lines(&rendered, &mut tests)?;
        debug!(file = %file.path.display(), tests = tests.len(), "quarantined tests in file");

        Ok(Transformed {
            source: rendered.text,
            tests,
        })
    }
}

/// Removes the quarantine block from each matched test.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unquarantine;

impl SourceTransform for Unquarantine {
    fn operation(&self) -> Operation {
        Operation::Unquarantine
    }

    fn apply(&self, file: &SourceFile, funcs: &[&FuncDecl]) -> EngineResult<Transformed> {
        let mut runtimes: Vec<&str> = file
            .imports_of(RUNTIME_IMPORT)
            .filter_map(ImportSpec::local_name)
            .collect();
        if runtimes.is_empty() {
            runtimes.push(RUNTIME_IMPORT);
        }

        let mut rw = Rewriter::new(&file.text);
        let mut tests = Vec::new();
        for func in funcs {
            let first = func.body.as_ref().and_then(|b| b.stmts.first());
            match first {
                Some(stmt) if is_marker(stmt, &runtimes) => {
                    rw.replace(statement_lines(&file.text, &stmt.span), "");
                    tests.push(Test::new(&func.name, func.line));
                }
                _ => warn!(
                    test = %func.name,
                    file = %file.path.display(),
                    "first statement is not the quarantine marker; leaving test untouched"
                ),
            }
        }

        if tests.is_empty() {
            return Ok(Transformed {
                source: file.text.clone(),
                tests,
            });
        }

        let mut rendered = render(&file.path, rw.finish())?;

        // The marker may have been the last user of the runtime import.
        let without_import = rendered
            .imports_of(RUNTIME_IMPORT)
            .find(|spec| {
                spec.local_name()
                    .is_some_and(|name| rendered.qualifier_uses(name) == 0)
            })
            .map(|spec| {
                let mut rw = Rewriter::new(&rendered.text);
                remove_import(&rendered, spec, &mut rw);
                rw.finish()
            });
        if let Some(text) = without_import {
            rendered = render(&file.path, text)?;
        }

        record_modified_lines(&rendered, &mut tests)?;
        debug!(file = %file.path.display(), tests = tests.len(), "unquarantined tests in file");

        Ok(Transformed {
            source: rendered.text,
            tests,
        })
    }
}

fn is_marker(stmt: &StmtNode, runtimes: &[&str]) -> bool {
    match &stmt.kind {
        StmtKind::If {
            has_init: false,
            cond: Some(cond),
        } => runtimes.iter().any(|r| *cond == marker_condition(r)),
        _ => false,
    }
}

/// Name of the test's context parameter, binding the fallback name in the
/// signature when the parameter is unnamed or blank.
fn bind_param(func: &FuncDecl, rw: &mut Rewriter<'_>) -> String {
    let Some(param) = func.params.first() else {
        return FALLBACK_PARAM.to_string();
    };
    match param.names.first() {
        Some(ident) if ident.name != "_" => ident.name.clone(),
        Some(ident) => {
            rw.replace(ident.span.clone(), FALLBACK_PARAM);
            FALLBACK_PARAM.to_string()
        }
        None => {
            rw.insert(param.type_start, format!("{} ", FALLBACK_PARAM));
            FALLBACK_PARAM.to_string()
        }
    }
}

fn prepend_stmt(src: &str, body: &Block, stmt: &Stmt, rw: &mut Rewriter<'_>) {
    let rendered = stmt.render(1);
    let inner = &src[body.open..body.close];

    let Some(newline) = inner.find('\n') else {
        // Single-line body such as `{}` or `{ t.Log("x") }`.
        let rest = inner.trim();
        let mut text = format!("\n{}\n", rendered);
        if !rest.is_empty() {
            text.push('\t');
            text.push_str(rest);
            text.push('\n');
        }
        rw.replace(body.open..body.close, text);
        return;
    };

    let line_end = body.open + newline;
    match body.stmts.first() {
        Some(first) if first.span.start < line_end => {
            let lead = src[body.open..first.span.start].trim();
            let mut text = format!("\n{}\n\t", rendered);
            if !lead.is_empty() {
                text.push_str(lead);
                text.push(' ');
            }
            rw.replace(body.open..first.span.start, text);
        }
        // After the rest of the `{` line, which may hold a comment.
        _ => rw.insert(line_end, format!("\n{}", rendered)),
    }
}

/// Add `import "<path>"` following gofmt layout. Files with only
/// single-line imports get another single-line import, so removing it
/// later restores the file exactly.
fn add_import(file: &SourceFile, path: &str, rw: &mut Rewriter<'_>) {
    let src = file.text.as_str();
    let literal = quote(path);

    let Some(decl) = file.imports.iter().find(|d| d.is_grouped()) else {
        add_single_import(file, path, &literal, rw);
        return;
    };
    let Some(open) = decl.open_paren else {
        return;
    };

    if decl.specs.is_empty() {
        if src[open..].starts_with('\n') {
            rw.insert(open, format!("\n\t{}", literal));
        } else {
            rw.insert(open, format!("\n\t{}\n", literal));
        }
        return;
    }

    let groups = import_groups(src, &decl.specs);
    let std_group = groups
        .iter()
        .find(|group| group.iter().any(|spec| is_std_path(&spec.path)));

    let Some(group) = std_group else {
        // New group ahead of the third-party ones.
        let first = &decl.specs[0];
        match own_line_indent(src, first.span.start) {
            Some((start, indent)) => rw.insert(start, format!("{}{}\n\n", indent, literal)),
            None => rw.insert(first.span.start, format!("{}; ", literal)),
        }
        return;
    };

    if let Some(next) = group.iter().find(|spec| spec.path.as_str() > path) {
        match own_line_indent(src, next.span.start) {
            Some((start, indent)) => rw.insert(start, format!("{}{}\n", indent, literal)),
            None => rw.insert(next.span.start, format!("{}; ", literal)),
        }
        return;
    }

    let Some(last) = group.last() else {
        return;
    };
    let end = line_end(src, last.span.end);
    let trailing = src[last.span.end..end].trim();
    if trailing.is_empty() || trailing.starts_with("//") {
        let indent = own_line_indent(src, last.span.start)
            .map(|(_, indent)| indent)
            .unwrap_or("\t");
        rw.insert(end, format!("\n{}{}", indent, literal));
    } else {
        rw.insert(last.span.end, format!("; {}", literal));
    }
}

/// `import "<path>"` on its own line, before the first single-line import
/// that sorts after it.
fn add_single_import(file: &SourceFile, path: &str, literal: &str, rw: &mut Rewriter<'_>) {
    let src = file.text.as_str();
    let Some(last) = file.imports.last() else {
        rw.insert(file.package_end, format!("\n\nimport {}", literal));
        return;
    };

    let next = file
        .imports
        .iter()
        .find(|d| d.specs.first().is_some_and(|s| s.path.as_str() > path));
    if let Some(next) = next {
        if let Some((start, indent)) = own_line_indent(src, next.span.start) {
            rw.insert(start, format!("{}import {}\n", indent, literal));
            return;
        }
    }
    rw.insert(line_end(src, last.span.end), format!("\nimport {}", literal));
}

/// Delete one import spec, or the whole declaration if it is the only one.
fn remove_import(file: &SourceFile, spec: &ImportSpec, rw: &mut Rewriter<'_>) {
    let src = file.text.as_str();
    let Some(decl) = file
        .imports
        .iter()
        .find(|d| d.specs.iter().any(|s| s.span == spec.span))
    else {
        return;
    };

    let target = if decl.specs.len() == 1 {
        decl.span.clone()
    } else {
        spec.span.clone()
    };

    let range = statement_lines(src, &target);
    if range.end > target.end {
        // Removing a whole line; don't leave two blank lines behind.
        let before = &src[..range.start];
        let blank_follows = src[range.end..].starts_with('\n');
        if blank_follows && (before.ends_with("\n\n") || before.ends_with("(\n")) {
            rw.replace(range.start..range.end + 1, "");
            return;
        }
    }
    rw.replace(range, "");
}

/// Imports separated by blank lines form separate gofmt sort groups.
fn import_groups<'a>(src: &str, specs: &'a [ImportSpec]) -> Vec<Vec<&'a ImportSpec>> {
    let mut groups: Vec<Vec<&ImportSpec>> = Vec::new();
    let mut prev_end: Option<usize> = None;
    for spec in specs {
        let split = match prev_end {
            Some(end) => {
                let between: Vec<&str> = src[end..spec.span.start].split('\n').collect();
                between.len() > 2
                    && between[1..between.len() - 1]
                        .iter()
                        .any(|line| line.trim().is_empty())
            }
            None => true,
        };
        if split {
            groups.push(Vec::new());
        }
        if let Some(group) = groups.last_mut() {
            group.push(spec);
        }
        prev_end = Some(spec.span.end);
    }
    groups
}

fn is_std_path(path: &str) -> bool {
    !path.split('/').next().unwrap_or("").contains('.')
}

fn line_start(src: &str, pos: usize) -> usize {
    src[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn line_end(src: &str, pos: usize) -> usize {
    src[pos..].find('\n').map(|i| pos + i).unwrap_or(src.len())
}

/// Line start and indentation when `pos` is the first token on its line.
fn own_line_indent(src: &str, pos: usize) -> Option<(usize, &str)> {
    let start = line_start(src, pos);
    let indent = &src[start..pos];
    indent
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then_some((start, indent))
}

/// Byte range covering `span`, widened to whole lines (newline included)
/// when nothing else shares those lines.
fn statement_lines(src: &str, span: &Range<usize>) -> Range<usize> {
    let ls = line_start(src, span.start);
    let le = line_end(src, span.end);
    let head_clear = src[ls..span.start].trim().is_empty();
    let tail_clear = src[span.end..le].trim().is_empty();
    match (head_clear, tail_clear) {
        (true, true) => ls..(le + 1).min(src.len()),
        (false, true) => span.start..le,
        _ => span.clone(),
    }
}

/// Re-parse rendered text; any syntax error means the edit was unsound.
fn render(path: &Path, text: String) -> EngineResult<SourceFile> {
    parse_source(path, text).map_err(|err| EngineError::Render {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn record_modified_lines(rendered: &SourceFile, tests: &mut [Test]) -> EngineResult<()> {
    for test in tests.iter_mut() {
        let func = rendered.func(&test.name).ok_or_else(|| EngineError::Render {
            path: rendered.path.clone(),
            reason: format!("function {} missing after render", test.name),
        })?;
        test.modified_line = func.line;
    }
    Ok(())
}

/// Ordered, non-overlapping text splices against one source string.
struct Rewriter<'a> {
    src: &'a str,
    edits: Vec<(Range<usize>, String)>,
}

impl<'a> Rewriter<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            edits: Vec::new(),
        }
    }

    fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push((at..at, text.into()));
    }

    fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push((range, text.into()));
    }

    fn finish(mut self) -> String {
        // Stable: inserts at one offset keep their insertion order.
        self.edits.sort_by_key(|(range, _)| range.start);
        let mut out = String::with_capacity(self.src.len() + 512);
        let mut cursor = 0;
        for (range, text) in &self.edits {
            let start = range.start.max(cursor);
            out.push_str(&self.src[cursor..start]);
            out.push_str(text);
            cursor = cursor.max(range.end);
        }
        out.push_str(&self.src[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::golang::locate::locate_tests;
    use std::collections::HashSet;

    fn parse(src: &str) -> SourceFile {
        parse_source(Path::new("pkg/sample_test.go"), src.to_string()).unwrap()
    }

    fn run(transform: &dyn SourceTransform, src: &str, names: &[&str]) -> Transformed {
        let file = parse(src);
        let wanted: HashSet<String> = names.iter().map(|s| s.to_string()).collect();
        let funcs = locate_tests(&file, &wanted);
        transform.apply(&file, &funcs).unwrap()
    }

    const BASIC: &str = r#"package sample

import (
	"fmt"
	"testing"
)

func TestExample(t *testing.T) {
	fmt.Println("hello")
}
"#;

    const BASIC_QUARANTINED: &str = r#"package sample

import (
	"fmt"
	"os"
	"testing"
)

func TestExample(t *testing.T) {
	if os.Getenv("RUN_QUARANTINED_TESTS") != "true" {
		t.Skip("Flaky test quarantined. Set RUN_QUARANTINED_TESTS=true to run it.")
	} else {
		t.Logf("RUN_QUARANTINED_TESTS set to '%s', running quarantined test", os.Getenv("RUN_QUARANTINED_TESTS"))
	}
	fmt.Println("hello")
}
"#;

    #[test]
    fn test_quarantine_inserts_marker_and_import() {
        let out = run(&Quarantine::default(), BASIC, &["TestExample"]);
        assert_eq!(out.source, BASIC_QUARANTINED);
        assert_eq!(out.tests.len(), 1);
        assert_eq!(out.tests[0].name, "TestExample");
        assert_eq!(out.tests[0].original_line, 8);
        assert_eq!(out.tests[0].modified_line, 9);
    }

    #[test]
    fn test_round_trip_restores_original() {
        let quarantined = run(&Quarantine::default(), BASIC, &["TestExample"]);
        let restored = run(&Unquarantine, &quarantined.source, &["TestExample"]);
        assert_eq!(restored.source, BASIC);
        assert_eq!(restored.tests.len(), 1);
        assert_eq!(restored.tests[0].original_line, 9);
        assert_eq!(restored.tests[0].modified_line, 8);
    }

    #[test]
    fn test_import_added_once_for_many_tests() {
        let src = "package sample\n\nimport \"testing\"\n\nfunc TestA(t *testing.T) {\n\tt.Log(\"a\")\n}\n\nfunc TestB(b *testing.T) {}\n";
        let out = run(&Quarantine::default(), src, &["TestA", "TestB"]);
        assert_eq!(out.source.matches("\"os\"").count(), 1);
        assert!(out.source.starts_with("package sample\n\nimport \"os\"\nimport \"testing\"\n\n"));
        assert!(out.source.contains("\t\tb.Skip("));

        // Each reported line is where the function really is after render.
        let rendered = parse(&out.source);
        for test in &out.tests {
            assert_eq!(rendered.func(&test.name).unwrap().line, test.modified_line);
        }
        assert_eq!(out.tests[0].original_line, 5);
        assert_eq!(out.tests[0].modified_line, 6);
        assert_eq!(out.tests[1].original_line, 9);
        assert_eq!(out.tests[1].modified_line, 15);
    }

    #[test]
    fn test_existing_os_import_is_reused_with_alias() {
        let src = "package sample\n\nimport (\n\tgoos \"os\"\n\t\"testing\"\n)\n\nfunc TestA(t *testing.T) {\n\t_ = goos.Args\n}\n";
        let out = run(&Quarantine::default(), src, &["TestA"]);
        assert!(out.source.contains("if goos.Getenv(\"RUN_QUARANTINED_TESTS\") != \"true\" {"));
        assert_eq!(out.source.matches("\"os\"").count(), 1);

        // The aliased marker is recognized, and the import stays in use.
        let back = run(&Unquarantine, &out.source, &["TestA"]);
        assert_eq!(back.source, src);
    }

    #[test]
    fn test_unnamed_parameter_gets_fallback_name() {
        let src = "package sample\n\nimport \"testing\"\n\nfunc TestA(*testing.T) {}\n";
        let out = run(&Quarantine::default(), src, &["TestA"]);
        assert!(out.source.contains("func TestA(t *testing.T) {\n\tif os.Getenv("));
        assert!(out.source.contains("\t\tt.Skip("));
        assert!(out.source.ends_with("\t}\n}\n"));
    }

    #[test]
    fn test_unquarantine_keeps_non_marker_first_statement() {
        let src = "package sample\n\nimport \"testing\"\n\nfunc TestA(t *testing.T) {\n\tif true {\n\t\tt.Skip(\"x\")\n\t}\n}\n";
        let out = run(&Unquarantine, src, &["TestA"]);
        assert!(out.tests.is_empty());
        assert_eq!(out.source, src);
    }

    #[test]
    fn test_unquarantine_rejects_near_miss_conditions() {
        let near_misses = [
            "os.Getenv(\"RUN_QUARANTINED_TESTS\") == \"true\"",
            "os.Getenv(\"OTHER\") != \"true\"",
            "os.Getenv(\"RUN_QUARANTINED_TESTS\") != \"yes\"",
            "os.LookupEnv(\"RUN_QUARANTINED_TESTS\") != \"true\"",
            "(os.Getenv(\"RUN_QUARANTINED_TESTS\") != \"true\")",
        ];
        for cond in near_misses {
            let src = format!(
                "package sample\n\nimport (\n\t\"os\"\n\t\"testing\"\n)\n\nfunc TestA(t *testing.T) {{\n\tif {} {{\n\t\tt.Skip(\"x\")\n\t}}\n}}\n",
                cond
            );
            let out = run(&Unquarantine, &src, &["TestA"]);
            assert!(out.tests.is_empty(), "matched near miss: {}", cond);
        }
    }

    #[test]
    fn test_unquarantine_only_inspects_first_statement() {
        let src = "package sample\n\nimport (\n\t\"os\"\n\t\"testing\"\n)\n\nfunc TestA(t *testing.T) {\n\tt.Log(\"first\")\n\tif os.Getenv(\"RUN_QUARANTINED_TESTS\") != \"true\" {\n\t\tt.Skip(\"x\")\n\t}\n}\n";
        let out = run(&Unquarantine, src, &["TestA"]);
        assert!(out.tests.is_empty());
    }

    #[test]
    fn test_unquarantine_keeps_os_import_when_still_used() {
        let src = "package sample\n\nimport (\n\t\"os\"\n\t\"testing\"\n)\n\nfunc TestA(t *testing.T) {\n\tif os.Getenv(\"RUN_QUARANTINED_TESTS\") != \"true\" {\n\t\tt.Skip(\"x\")\n\t}\n\t_ = os.Args\n}\n";
        let out = run(&Unquarantine, src, &["TestA"]);
        assert_eq!(out.tests.len(), 1);
        assert!(out.source.contains("\t\"os\"\n"));
        assert!(out.source.contains("func TestA(t *testing.T) {\n\t_ = os.Args\n}"));
    }

    #[test]
    fn test_double_quarantine_nests_blocks() {
        let once = run(&Quarantine::default(), BASIC, &["TestExample"]);
        let twice = run(&Quarantine::default(), &once.source, &["TestExample"]);
        assert_eq!(twice.source.matches("if os.Getenv").count(), 2);
        assert_eq!(twice.source.matches("\"os\"").count(), 1);
    }

    #[test]
    fn test_fuzz_target_uses_its_parameter() {
        let src = "package sample\n\nimport \"testing\"\n\nfunc FuzzParse(f *testing.F) {\n\tf.Add(1)\n}\n";
        let out = run(&Quarantine::default(), src, &["FuzzParse"]);
        assert!(out.source.contains("\t\tf.Skip("));
        assert!(out.source.contains("\t\tf.Logf("));
    }

    #[test]
    fn test_third_party_only_imports_get_std_group() {
        let src = "package sample\n\nimport (\n\t\"github.com/stretchr/testify/require\"\n)\n\nfunc TestA(t *T) {\n\trequire.True(t, true)\n}\n";
        let file = parse(src);
        let out = Quarantine::default()
            .apply(&file, &[file.func("TestA").unwrap()])
            .unwrap();
        assert!(out
            .source
            .contains("import (\n\t\"os\"\n\n\t\"github.com/stretchr/testify/require\""));

        let quarantined = parse(&out.source);
        let back = Unquarantine
            .apply(&quarantined, &[quarantined.func("TestA").unwrap()])
            .unwrap();
        assert_eq!(back.source, src);
    }

    #[test]
    fn test_no_imports_gets_single_import() {
        let src = "package sample\n\nfunc TestA(t *T) {\n}\n";
        let file = parse(src);
        let out = Quarantine::default()
            .apply(&file, &[file.func("TestA").unwrap()])
            .unwrap();
        assert!(out.source.starts_with("package sample\n\nimport \"os\"\n\nfunc TestA(t *T) {\n\tif "));

        let quarantined = parse(&out.source);
        let back = Unquarantine
            .apply(&quarantined, &[quarantined.func("TestA").unwrap()])
            .unwrap();
        assert_eq!(back.source, src);
    }

    #[test]
    fn test_single_line_imports_round_trip() {
        let sources = [
            "package sample\n\nimport \"testing\"\n\nfunc TestA(t *testing.T) {\n\tt.Log(\"a\")\n}\n",
            "package sample\n\nimport \"fmt\"\nimport \"testing\"\n\nfunc TestA(t *testing.T) {\n\tfmt.Println(\"a\")\n}\n",
            "package sample\n\nimport \"fmt\"\n\nfunc TestA(t *T) {\n\tfmt.Println(\"a\")\n}\n",
        ];
        for src in sources {
            let file = parse(src);
            let out = Quarantine::default()
                .apply(&file, &[file.func("TestA").unwrap()])
                .unwrap();
            assert_eq!(out.source.matches("import \"os\"\n").count(), 1, "{}", out.source);

            let quarantined = parse(&out.source);
            let back = Unquarantine
                .apply(&quarantined, &[quarantined.func("TestA").unwrap()])
                .unwrap();
            assert_eq!(back.source, src);
        }
    }

    #[test]
    fn test_single_line_import_sorted_position() {
        let src = "package sample\n\nimport \"fmt\"\nimport \"testing\"\n\nfunc TestA(t *testing.T) {\n\tfmt.Println(\"a\")\n}\n";
        let out = run(&Quarantine::default(), src, &["TestA"]);
        assert!(out
            .source
            .starts_with("package sample\n\nimport \"fmt\"\nimport \"os\"\nimport \"testing\"\n\n"));
        assert_eq!(out.tests[0].original_line, 6);
        assert_eq!(out.tests[0].modified_line, 7);
    }

    #[test]
    fn test_marker_renders_fixed_shape() {
        let text = marker("os", "t", "reason").render(0);
        assert!(text.starts_with("if os.Getenv(\"RUN_QUARANTINED_TESTS\") != \"true\" {\n"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_rewriter_orders_edits() {
        let mut rw = Rewriter::new("abcdef");
        rw.replace(4..5, "E");
        rw.insert(1, "1");
        rw.insert(1, "2");
        rw.replace(2..3, "");
        assert_eq!(rw.finish(), "a12bdEf");
    }
}
