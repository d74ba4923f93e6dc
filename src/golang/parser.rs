//! Tree-sitter based Go parser.
//!
//! Parsed files are lowered into an owned [`SourceFile`] model: imports,
//! top-level functions, their parameters, and the statements of each body,
//! all anchored to byte spans of the original text. The transforms edit
//! files by splicing text at those anchors and re-parsing the result.

use super::syntax::{lower_expr, node_text, Expr};
use crate::error::{EngineError, EngineResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

// Tree-sitter parsers are expensive to create but can be reused for multiple
// files. Each blocking worker thread gets its own pre-configured parser.
thread_local! {
    static GO_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - will be caught at parse time if language fails
        let _ = p.set_language(&tree_sitter_go::LANGUAGE.into());
        p
    });
}

fn parse_with_pooled_parser(content: &str) -> Option<Tree> {
    GO_PARSER.with(|p| p.borrow_mut().parse(content, None))
}

/// A parsed Go source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub package: String,
    /// Byte offset just past the package clause.
    pub package_end: usize,
    pub imports: Vec<ImportDecl>,
    pub funcs: Vec<FuncDecl>,
    /// How often each identifier is used as a qualifier (`x.Y`).
    qualifier_uses: HashMap<String, usize>,
}

/// One `import` declaration, either `import "x"` or a parenthesized group.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub span: Range<usize>,
    /// Byte offset just past `(` for grouped declarations.
    pub open_paren: Option<usize>,
    pub specs: Vec<ImportSpec>,
}

impl ImportDecl {
    pub fn is_grouped(&self) -> bool {
        self.open_paren.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    /// Explicit alias, including `_` and `.`.
    pub name: Option<String>,
    pub path: String,
    pub span: Range<usize>,
    pub line: usize,
}

impl ImportSpec {
    /// The identifier code in this file uses to refer to the package, if any.
    pub fn local_name(&self) -> Option<&str> {
        match self.name.as_deref() {
            Some("_") | Some(".") => None,
            Some(alias) => Some(alias),
            None => self.path.rsplit('/').next(),
        }
    }
}

/// A top-level function or method declaration.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    /// 1-based line of the `func` keyword.
    pub line: usize,
    pub is_method: bool,
    pub params: Vec<ParamDecl>,
    pub body: Option<Block>,
}

impl FuncDecl {
    /// Number of parameters, counting each name in `a, b T` separately.
    pub fn param_count(&self) -> usize {
        self.params.iter().map(|p| p.names.len().max(1)).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
    pub type_start: usize,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Pointer(Box<TypeExpr>),
    Qualified { package: String, name: String },
    Named(String),
    Other,
}

/// A function body.
#[derive(Debug, Clone)]
pub struct Block {
    /// Byte offset just past `{`.
    pub open: usize,
    /// Byte offset of `}`.
    pub close: usize,
    pub stmts: Vec<StmtNode>,
}

#[derive(Debug, Clone)]
pub struct StmtNode {
    pub span: Range<usize>,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    If {
        has_init: bool,
        /// `None` when the condition falls outside the typed subset.
        cond: Option<Expr>,
    },
    Other,
}

impl SourceFile {
    /// All imports of `path`, in file order.
    pub fn imports_of<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ImportSpec> + 'a {
        self.imports
            .iter()
            .flat_map(|decl| decl.specs.iter())
            .filter(move |spec| spec.path == path)
    }

    /// Identifier this file uses for `path`, if it imports it addressably.
    pub fn qualifier_for<'a>(&'a self, path: &'a str) -> Option<&'a str> {
        self.imports_of(path).find_map(|spec| spec.local_name())
    }

    pub fn qualifier_uses(&self, name: &str) -> usize {
        self.qualifier_uses.get(name).copied().unwrap_or(0)
    }

    /// First top-level (non-method) function with this name.
    pub fn func(&self, name: &str) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| !f.is_method && f.name == name)
    }
}

/// Read and parse a Go file from disk.
pub fn parse_file(path: &Path) -> EngineResult<SourceFile> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(path, text)
}

/// Parse Go source text. Any syntax error is reported as a parse error.
pub fn parse_source(path: &Path, text: String) -> EngineResult<SourceFile> {
    let parse_err = |reason: String| EngineError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let tree = parse_with_pooled_parser(&text)
        .ok_or_else(|| parse_err("parser produced no tree".to_string()))?;
    let root = tree.root_node();
    if root.has_error() {
        let reason = match first_error(root) {
            Some(node) => format!(
                "syntax error at {}:{}",
                node.start_position().row + 1,
                node.start_position().column + 1
            ),
            None => "syntax error".to_string(),
        };
        return Err(parse_err(reason));
    }

    let mut file = SourceFile {
        path: path.to_path_buf(),
        text: String::new(),
        package: String::new(),
        package_end: 0,
        imports: Vec::new(),
        funcs: Vec::new(),
        qualifier_uses: count_qualifier_uses(root, &text),
    };

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "package_clause" => {
                file.package_end = node.end_byte();
                if let Some(name) = node.named_child(0) {
                    file.package = node_text(name, &text).to_string();
                }
            }
            "import_declaration" => file.imports.push(lower_import_decl(node, &text)),
            "function_declaration" | "method_declaration" => {
                if let Some(func) = lower_func(node, &text) {
                    file.funcs.push(func);
                }
            }
            _ => {}
        }
    }

    if file.package.is_empty() {
        return Err(parse_err("missing package clause".to_string()));
    }

    file.text = text;
    Ok(file)
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn count_qualifier_uses(root: Node<'_>, src: &str) -> HashMap<String, usize> {
    let mut uses: HashMap<String, usize> = HashMap::new();
    let mut cursor = root.walk();

    loop {
        let node = cursor.node();
        let qualifier = match node.kind() {
            "selector_expression" => node
                .child_by_field_name("operand")
                .filter(|operand| operand.kind() == "identifier"),
            "qualified_type" => node.child_by_field_name("package"),
            _ => None,
        };
        if let Some(q) = qualifier {
            *uses.entry(node_text(q, src).to_string()).or_default() += 1;
        }

        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return uses;
            }
        }
    }
}

fn lower_import_decl(node: Node<'_>, src: &str) -> ImportDecl {
    let mut decl = ImportDecl {
        span: node.byte_range(),
        open_paren: None,
        specs: Vec::new(),
    };

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => decl.specs.extend(lower_import_spec(child, src)),
            "import_spec_list" => {
                decl.open_paren = Some(child.start_byte() + 1);
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() == "import_spec" {
                        decl.specs.extend(lower_import_spec(spec, src));
                    }
                }
            }
            _ => {}
        }
    }
    decl
}

fn lower_import_spec(node: Node<'_>, src: &str) -> Option<ImportSpec> {
    let path = match lower_expr(node.child_by_field_name("path")?, src)? {
        Expr::Str(path) => path,
        _ => return None,
    };
    Some(ImportSpec {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, src).to_string()),
        path,
        span: node.byte_range(),
        line: node.start_position().row + 1,
    })
}

fn lower_func(node: Node<'_>, src: &str) -> Option<FuncDecl> {
    let name = node_text(node.child_by_field_name("name")?, src).to_string();
    let is_method = node.kind() == "method_declaration";

    let mut params = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            let variadic = match param.kind() {
                "parameter_declaration" => false,
                "variadic_parameter_declaration" => true,
                _ => continue,
            };
            let Some(ty_node) = param.child_by_field_name("type") else {
                continue;
            };
            let mut name_cursor = param.walk();
            let names = param
                .children_by_field_name("name", &mut name_cursor)
                .map(|n| Ident {
                    name: node_text(n, src).to_string(),
                    span: n.byte_range(),
                })
                .collect();
            params.push(ParamDecl {
                names,
                ty: lower_type(ty_node, src),
                type_start: ty_node.start_byte(),
                variadic,
            });
        }
    }

    let body = node.child_by_field_name("body").map(|b| lower_block(b, src));

    Some(FuncDecl {
        name,
        line: node.start_position().row + 1,
        is_method,
        params,
        body,
    })
}

fn lower_type(node: Node<'_>, src: &str) -> TypeExpr {
    match node.kind() {
        "pointer_type" => match node.named_child(0) {
            Some(inner) => TypeExpr::Pointer(Box::new(lower_type(inner, src))),
            None => TypeExpr::Other,
        },
        "qualified_type" => {
            match (
                node.child_by_field_name("package"),
                node.child_by_field_name("name"),
            ) {
                (Some(package), Some(name)) => TypeExpr::Qualified {
                    package: node_text(package, src).to_string(),
                    name: node_text(name, src).to_string(),
                },
                _ => TypeExpr::Other,
            }
        }
        "type_identifier" => TypeExpr::Named(node_text(node, src).to_string()),
        _ => TypeExpr::Other,
    }
}

fn lower_block(node: Node<'_>, src: &str) -> Block {
    let mut stmts = Vec::new();
    collect_stmts(node, src, &mut stmts);
    Block {
        open: node.start_byte() + 1,
        close: node.end_byte().saturating_sub(1),
        stmts,
    }
}

// Grammar versions differ on whether statements sit directly in the block
// or inside a `statement_list` child.
fn collect_stmts(node: Node<'_>, src: &str, out: &mut Vec<StmtNode>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "statement_list" => collect_stmts(child, src, out),
            "comment" => {}
            "if_statement" => out.push(StmtNode {
                span: child.byte_range(),
                kind: StmtKind::If {
                    has_init: child.child_by_field_name("initializer").is_some(),
                    cond: child
                        .child_by_field_name("condition")
                        .and_then(|c| lower_expr(c, src)),
                },
            }),
            _ => out.push(StmtNode {
                span: child.byte_range(),
                kind: StmtKind::Other,
            }),
        }
    }
}
