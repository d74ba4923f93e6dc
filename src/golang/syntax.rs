//! Typed Go statement and expression trees.
//!
//! Only the small subset of Go needed to build, print, and recognize the
//! quarantine marker is modelled. Syntax nodes outside that subset lower to
//! `None`, which makes them unequal to every marker shape.

use std::fmt;
use tree_sitter::Node;

/// Comparison operators the marker condition can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
}

impl BinaryOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::NotEq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
        }
    }
}

/// A Go expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    /// String literal, stored decoded.
    Str(String),
    Selector {
        operand: Box<Expr>,
        field: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Self {
        Expr::Ident(name.to_string())
    }

    pub fn string(value: &str) -> Self {
        Expr::Str(value.to_string())
    }

    /// `receiver.method(args...)`
    pub fn method_call(receiver: &str, method: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(Expr::Selector {
                operand: Box::new(Expr::ident(receiver)),
                field: method.to_string(),
            }),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => f.write_str(name),
            Expr::Str(value) => f.write_str(&quote(value)),
            Expr::Selector { operand, field } => write!(f, "{}.{}", operand, field),
            Expr::Call { func, args } => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.as_str(), rhs),
        }
    }
}

/// A Go statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Expr(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

impl Stmt {
    /// Print the statement gofmt-style, every line prefixed with `depth`
    /// tabs. The result has no trailing newline.
    pub fn render(&self, depth: usize) -> String {
        let mut lines = Vec::new();
        self.render_into(depth, &mut lines);
        lines.join("\n")
    }

    fn render_into(&self, depth: usize, lines: &mut Vec<String>) {
        let indent = "\t".repeat(depth);
        match self {
            Stmt::Expr(expr) => lines.push(format!("{}{}", indent, expr)),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                lines.push(format!("{}if {} {{", indent, cond));
                for stmt in then {
                    stmt.render_into(depth + 1, lines);
                }
                if otherwise.is_empty() {
                    lines.push(format!("{}}}", indent));
                } else {
                    lines.push(format!("{}}} else {{", indent));
                    for stmt in otherwise {
                        stmt.render_into(depth + 1, lines);
                    }
                    lines.push(format!("{}}}", indent));
                }
            }
        }
    }
}

/// Lower a tree-sitter expression node into an [`Expr`].
pub fn lower_expr(node: Node<'_>, src: &str) -> Option<Expr> {
    match node.kind() {
        "identifier" | "package_identifier" => Some(Expr::Ident(node_text(node, src).to_string())),
        "interpreted_string_literal" => unquote(node_text(node, src)).map(Expr::Str),
        "raw_string_literal" => {
            let text = node_text(node, src);
            let inner = text.strip_prefix('`')?.strip_suffix('`')?;
            Some(Expr::Str(inner.replace('\r', "")))
        }
        "selector_expression" => {
            let operand = lower_expr(node.child_by_field_name("operand")?, src)?;
            let field = node.child_by_field_name("field")?;
            Some(Expr::Selector {
                operand: Box::new(operand),
                field: node_text(field, src).to_string(),
            })
        }
        "call_expression" => {
            if node.child_by_field_name("type_arguments").is_some() {
                return None;
            }
            let func = lower_expr(node.child_by_field_name("function")?, src)?;
            let arg_list = node.child_by_field_name("arguments")?;
            let mut args = Vec::new();
            let mut cursor = arg_list.walk();
            for arg in arg_list.children(&mut cursor) {
                match arg.kind() {
                    // A spread final argument is not a plain call.
                    "..." => return None,
                    "comment" => continue,
                    _ if !arg.is_named() => continue,
                    _ => args.push(lower_expr(arg, src)?),
                }
            }
            Some(Expr::Call {
                func: Box::new(func),
                args,
            })
        }
        "binary_expression" => {
            let op = BinaryOp::from_token(node.child_by_field_name("operator")?.kind())?;
            let lhs = lower_expr(node.child_by_field_name("left")?, src)?;
            let rhs = lower_expr(node.child_by_field_name("right")?, src)?;
            Some(Expr::binary(op, lhs, rhs))
        }
        _ => None,
    }
}

pub(crate) fn node_text<'a>(node: Node<'_>, src: &'a str) -> &'a str {
    &src[node.start_byte()..node.end_byte()]
}

/// Quote a string as a Go interpreted string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Decode a Go interpreted string literal, quotes included.
pub fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' => out.push(take_hex(&mut chars, 2)?),
            'u' => out.push(take_hex(&mut chars, 4)?),
            'U' => out.push(take_hex(&mut chars, 8)?),
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                out.push(char::from_u32(value)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn take_hex(chars: &mut impl Iterator<Item = char>, digits: usize) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(value)
}
