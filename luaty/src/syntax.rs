//! Thin wrappers over tree-sitter nodes
//!
//! `SyntaxNode` pairs a node with the file it came from so the resolver can
//! read text and hop between files. `NodeRef` is the owned, tree-free form
//! used in declarations, guard keys and caches.

use std::fmt;

use tree_sitter::Node;

use crate::project::SourceFile;
use crate::ty::Primitive;

/// Stable identity of a file inside a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owned reference to a syntax node: file, byte range and node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
    pub kind: u16,
}

impl NodeRef {
    pub fn new(file: FileId, node: Node<'_>) -> Self {
        Self {
            file,
            start: node.start_byte(),
            end: node.end_byte(),
            kind: node.kind_id(),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Clone, Copy)]
pub struct SyntaxNode<'p> {
    pub file: &'p SourceFile,
    pub node: Node<'p>,
}

impl<'p> SyntaxNode<'p> {
    pub fn new(file: &'p SourceFile, node: Node<'p>) -> Self {
        Self { file, node }
    }

    pub fn kind(&self) -> &'static str {
        self.node.kind()
    }

    pub fn file_id(&self) -> FileId {
        self.file.id()
    }

    pub fn text(&self) -> &'p str {
        node_text(self.node, self.file.source())
    }

    pub fn start(&self) -> usize {
        self.node.start_byte()
    }

    pub fn end(&self) -> usize {
        self.node.end_byte()
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.file.id(), self.node)
    }

    pub fn with(&self, node: Node<'p>) -> SyntaxNode<'p> {
        SyntaxNode::new(self.file, node)
    }

    pub fn parent(&self) -> Option<SyntaxNode<'p>> {
        self.node.parent().map(|n| self.with(n))
    }

    pub fn field(&self, name: &str) -> Option<SyntaxNode<'p>> {
        self.node.child_by_field_name(name).map(|n| self.with(n))
    }

    pub fn named_children(&self) -> Vec<SyntaxNode<'p>> {
        named_children(self.node)
            .into_iter()
            .map(|n| self.with(n))
            .collect()
    }

    pub fn child_of_kind(&self, kind: &str) -> Option<SyntaxNode<'p>> {
        child_of_kind(self.node, kind).map(|n| self.with(n))
    }

    pub fn classify(&self) -> Expr<'p> {
        classify(*self)
    }
}

impl fmt::Debug for SyntaxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}..{}",
            self.kind(),
            self.file.path(),
            self.start(),
            self.end()
        )
    }
}

pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.is_named() && child.kind() != "comment")
        .collect()
}

pub fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|child| child.kind() == kind)
}

/// Identifiers declared by a `variable_list`/`attribute_name_list` or a bare
/// name list such as the one in a generic `for` clause
pub fn declared_names(node: Node<'_>) -> Vec<Node<'_>> {
    match node.kind() {
        "identifier" => vec![node],
        _ => named_children(node)
            .into_iter()
            .filter(|child| child.kind() == "identifier")
            .collect(),
    }
}

/// The `local function` form shares the `function_declaration` kind
pub fn is_local_function(node: Node<'_>) -> bool {
    node.kind() == "function_declaration" && child_of_kind(node, "local").is_some()
}

pub fn is_function(kind: &str) -> bool {
    matches!(kind, "function_declaration" | "function_definition")
}

/// Values on the right of `=` in a declaration or assignment statement
pub fn assigned_values(stmt: Node<'_>) -> Vec<Node<'_>> {
    let assignment = if stmt.kind() == "variable_declaration" {
        match child_of_kind(stmt, "assignment_statement") {
            Some(assignment) => assignment,
            None => return Vec::new(),
        }
    } else {
        stmt
    };
    child_of_kind(assignment, "expression_list")
        .map(named_children)
        .unwrap_or_default()
}

/// Targets on the left of `=` in a declaration or assignment statement
pub fn assigned_targets(stmt: Node<'_>) -> Vec<Node<'_>> {
    let holder = if stmt.kind() == "variable_declaration" {
        child_of_kind(stmt, "assignment_statement").unwrap_or(stmt)
    } else {
        stmt
    };
    match child_of_kind(holder, "variable_list").or_else(|| child_of_kind(holder, "attribute_name_list")) {
        Some(list) => named_children(list)
            .into_iter()
            .filter(|n| n.kind() != "attribute")
            .collect(),
        None => Vec::new(),
    }
}

/// Arguments of a call, in order
pub fn call_arguments(call: Node<'_>) -> Vec<Node<'_>> {
    let Some(arguments) = call
        .child_by_field_name("arguments")
        .or_else(|| child_of_kind(call, "arguments"))
    else {
        return Vec::new();
    };
    match arguments.kind() {
        "arguments" => named_children(arguments),
        // f "str" and f { ... }
        _ => vec![arguments],
    }
}

pub fn string_content(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    if let Some(content) = node.child_by_field_name("content") {
        return Some(node_text(content, source).to_string());
    }
    let text = node_text(node, source);
    let trimmed = text
        .trim_start_matches(['"', '\''])
        .trim_end_matches(['"', '\'']);
    Some(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic,
    Concat,
    Comparison,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Length,
    BitNot,
}

/// Every node kind the resolver distinguishes
#[derive(Debug, Clone)]
pub enum Expr<'p> {
    Literal(Primitive),
    Name(&'p str),
    Member {
        object: SyntaxNode<'p>,
        name: &'p str,
    },
    Method {
        object: SyntaxNode<'p>,
        name: &'p str,
    },
    Index {
        object: SyntaxNode<'p>,
        key: SyntaxNode<'p>,
    },
    Call {
        callee: SyntaxNode<'p>,
        args: Vec<SyntaxNode<'p>>,
    },
    Function(SyntaxNode<'p>),
    Table(SyntaxNode<'p>),
    Paren(SyntaxNode<'p>),
    Binary {
        op: BinaryOp,
        left: SyntaxNode<'p>,
        right: SyntaxNode<'p>,
    },
    Unary {
        op: UnaryOp,
        operand: SyntaxNode<'p>,
    },
    Vararg,
    Other,
}

pub fn classify(node: SyntaxNode<'_>) -> Expr<'_> {
    match node.kind() {
        "nil" => Expr::Literal(Primitive::Nil),
        "true" | "false" => Expr::Literal(Primitive::Boolean),
        "number" => Expr::Literal(Primitive::Number),
        "string" => Expr::Literal(Primitive::String),
        "identifier" => Expr::Name(node.text()),
        "vararg_expression" => Expr::Vararg,
        "dot_index_expression" => match (node.field("table"), node.field("field")) {
            (Some(object), Some(field)) => Expr::Member {
                object,
                name: field.text(),
            },
            _ => Expr::Other,
        },
        "method_index_expression" => match (node.field("table"), node.field("method")) {
            (Some(object), Some(method)) => Expr::Method {
                object,
                name: method.text(),
            },
            _ => Expr::Other,
        },
        "bracket_index_expression" => match (node.field("table"), node.field("field")) {
            (Some(object), Some(key)) => Expr::Index { object, key },
            _ => Expr::Other,
        },
        "function_call" => match node.field("name") {
            Some(callee) => Expr::Call {
                callee,
                args: call_arguments(node.node)
                    .into_iter()
                    .map(|n| node.with(n))
                    .collect(),
            },
            None => Expr::Other,
        },
        "function_definition" | "function_declaration" => Expr::Function(node),
        "table_constructor" => Expr::Table(node),
        "parenthesized_expression" => match node.named_children().first() {
            Some(inner) => Expr::Paren(*inner),
            None => Expr::Other,
        },
        "binary_expression" => {
            let operands = node.named_children();
            let (Some(left), Some(right)) = (
                node.field("left").or_else(|| operands.first().copied()),
                node.field("right").or_else(|| operands.last().copied()),
            ) else {
                return Expr::Other;
            };
            let operator = children(node.node)
                .into_iter()
                .find(|child| !child.is_named())
                .map(|child| child.kind())
                .unwrap_or("");
            let op = match operator {
                ".." => BinaryOp::Concat,
                "==" | "~=" | "<" | ">" | "<=" | ">=" => BinaryOp::Comparison,
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                _ => BinaryOp::Arithmetic,
            };
            Expr::Binary { op, left, right }
        }
        "unary_expression" => {
            let Some(operand) = node
                .field("operand")
                .or_else(|| node.named_children().last().copied())
            else {
                return Expr::Other;
            };
            let operator = children(node.node)
                .into_iter()
                .find(|child| !child.is_named())
                .map(|child| child.kind())
                .unwrap_or("");
            let op = match operator {
                "not" => UnaryOp::Not,
                "#" => UnaryOp::Length,
                "~" => UnaryOp::BitNot,
                _ => UnaryOp::Negate,
            };
            Expr::Unary { op, operand }
        }
        _ => Expr::Other,
    }
}
