//! Type inference over syntax nodes
//!
//! Every entry point takes the request's [`SearchContext`]. Results are
//! computed on demand and never stored on the tree; a node or declaration
//! already being resolved higher up the stack resolves to `unknown`, which
//! the surrounding unions then absorb.

use crate::annotation::DocComment;
use crate::builtins;
use crate::decl::{DeclKind, DeclaredType, Declaration, Thunk};
use crate::generics::{self, bind};
use crate::members;
use crate::scope::{self, doc_owner_of_function};
use crate::search::{GuardKey, SearchContext};
use crate::syntax::{
    BinaryOp, Expr, NodeRef, SyntaxNode, UnaryOp, assigned_targets, assigned_values, call_arguments,
    declared_names, is_function, named_children,
};
use crate::ty::{ClassKind, FunParam, ITy, Primitive, Substitution, TyClass, TyFunction};

/// The type of an expression, or `unknown`
pub fn guess_type(ctx: &SearchContext<'_>, node: SyntaxNode<'_>) -> ITy {
    if ctx.is_cancelled() {
        return ITy::Unknown;
    }
    let Some(_token) = ctx.enter(GuardKey::Node(node.node_ref())) else {
        return ITy::Unknown;
    };
    match node.classify() {
        Expr::Literal(primitive) => ITy::Primitive(primitive),
        Expr::Name(name) => name_type(ctx, node, name),
        Expr::Member { object, name } | Expr::Method { object, name } => {
            let object_ty = guess_type(ctx, object);
            members::find_member(ctx, &object_ty, name)
                .map(|found| found.ty)
                .unwrap_or_default()
        }
        Expr::Index { object, key } => members::index_type(ctx, &guess_type(ctx, object), key),
        Expr::Call { callee, args } => call_type(ctx, callee, &args),
        Expr::Function(function) => function_type(ctx, function),
        Expr::Table(table) => ITy::Class(TyClass::table(table.node_ref())),
        Expr::Paren(inner) => guess_type(ctx, inner),
        Expr::Binary { op, left, right } => binary_type(ctx, op, left, right),
        Expr::Unary { op, .. } => match op {
            UnaryOp::Not => ITy::BOOLEAN,
            UnaryOp::Negate | UnaryOp::Length | UnaryOp::BitNot => ITy::NUMBER,
        },
        Expr::Vararg | Expr::Other => ITy::Unknown,
    }
}

fn name_type(ctx: &SearchContext<'_>, node: SyntaxNode<'_>, name: &str) -> ITy {
    if let Some(decl) = scope::find_name(ctx, node, name) {
        return declaration_type(ctx, &decl);
    }
    if name == "self" {
        if let Some(owner) = scope::find_owner(ctx, node) {
            return owner;
        }
    }
    let globals = ctx.index().find_globals(name);
    if !globals.is_empty() {
        return global_type(ctx, &globals);
    }
    if ctx.find_class(name).is_some() {
        return ITy::class(name);
    }
    builtins::global(name).cloned().unwrap_or_default()
}

/// Annotated sites of a global win over inferred ones
fn global_type(ctx: &SearchContext<'_>, sites: &[Declaration]) -> ITy {
    let explicit: Vec<&Declaration> = sites.iter().filter(|d| d.is_explicit()).collect();
    if explicit.is_empty() {
        ITy::union(sites.iter().map(|decl| declaration_type(ctx, decl)))
    } else {
        ITy::union(explicit.into_iter().map(|decl| declaration_type(ctx, decl)))
    }
}

/// The type of a declaration: its annotation, or the evaluated thunk
pub fn declaration_type(ctx: &SearchContext<'_>, decl: &Declaration) -> ITy {
    let Some(_token) = ctx.enter(GuardKey::Decl(decl.location)) else {
        return ITy::Unknown;
    };
    match &decl.ty {
        DeclaredType::Explicit(ty) => generics::resolve_annotation(ctx, ty, decl.location),
        DeclaredType::Inferred(thunk) => {
            let value = thunk_type(ctx, thunk);
            if decl.kind == DeclKind::Local {
                widen_local(ctx, decl, value)
            } else {
                value.unwrap_or_default()
            }
        }
    }
}

/// `None` when a declaration has no value at all (`local x`)
fn thunk_type(ctx: &SearchContext<'_>, thunk: &Thunk) -> Option<ITy> {
    let project = ctx.project();
    match thunk {
        Thunk::Value { stmt, index } => {
            let stmt = project.node(stmt)?;
            let values = assigned_values(stmt.node);
            match values.get(*index) {
                Some(value) => Some(guess_type(ctx, stmt.with(*value))),
                // `local a, b = f()` spreads the call's results
                None => values
                    .last()
                    .filter(|last| last.kind() == "function_call")
                    .map(|_| ITy::Unknown),
            }
        }
        Thunk::Expr(expr) => Some(guess_type(ctx, project.node(expr)?)),
        Thunk::Param { function, index } => Some(param_type(ctx, *function, *index)),
        Thunk::SelfParam { function } => {
            let function = project.node(function)?;
            let object = function.field("name")?.field("table")?;
            Some(owner_type(ctx, object))
        }
        Thunk::ForVar { stmt, index } => Some(for_var_type(ctx, project.node(stmt)?, *index)),
        Thunk::Function(function) => Some(function_type(ctx, project.node(function)?)),
    }
}

/// A local's initializer joined with every later assignment to it
fn widen_local(ctx: &SearchContext<'_>, decl: &Declaration, value: Option<ITy>) -> ITy {
    let mut assigned = Vec::new();
    if ctx.options().assignment_unions {
        if let Some(tree) = ctx.project().scope_tree(decl.location.file) {
            for site in tree.assignments_to(decl) {
                let Some(stmt) = ctx.project().node(&site.stmt) else {
                    continue;
                };
                if let Some(value) = scope::assigned_value(stmt.node, site.index) {
                    assigned.push(guess_type(ctx, stmt.with(value)));
                }
            }
        }
    }
    match value {
        Some(value) => ITy::union(std::iter::once(value).chain(assigned)),
        None if assigned.is_empty() => ITy::NIL,
        None => ITy::union(assigned),
    }
}

/// An unannotated parameter: the union of what callers pass
fn param_type(ctx: &SearchContext<'_>, function: NodeRef, index: usize) -> ITy {
    if !ctx.options().call_site_inference {
        return ITy::Unknown;
    }
    let Some(function) = ctx.project().node(&function) else {
        return ITy::Unknown;
    };
    let calls = call_sites(ctx, function);
    tracing::trace!(function = ?function, index, calls = calls.len(), "inferring parameter from call sites");
    ITy::union(calls.into_iter().filter_map(|call| {
        let arg = call_arguments(call.node).into_iter().nth(index)?;
        Some(guess_type(ctx, call.with(arg)))
    }))
}

/// Plain-name calls of a function declared under a simple name
fn call_sites<'p>(ctx: &SearchContext<'p>, function: SyntaxNode<'p>) -> Vec<SyntaxNode<'p>> {
    let project = ctx.project();
    let Some(tree) = project.scope_tree(function.file_id()) else {
        return Vec::new();
    };
    let name = match function.kind() {
        "function_declaration" => function.field("name"),
        _ => function_holder_name(function),
    };
    let Some(name) = name.filter(|n| n.kind() == "identifier") else {
        return Vec::new();
    };

    // The local this name declares or assigns, if any
    let local = tree
        .locals()
        .map(|scoped| &scoped.decl)
        .find(|decl| decl.location == name.node_ref())
        .or_else(|| tree.find_name(name.start(), name.text()))
        .cloned();

    let limit = ctx.options().max_call_sites;
    let refs: Vec<NodeRef> = match &local {
        Some(decl) => tree.calls_to(decl, true).map(|c| c.call).take(limit).collect(),
        None => {
            let global = Declaration::new(
                name.text(),
                DeclKind::Global,
                DeclaredType::Inferred(Thunk::Function(function.node_ref())),
                name.node_ref(),
            );
            project
                .files()
                .filter_map(|file| project.scope_tree(file.id()))
                .flat_map(|tree| tree.calls_to(&global, false).map(|c| c.call).collect::<Vec<_>>())
                .take(limit)
                .collect()
        }
    };
    refs.iter().filter_map(|call| project.node(call)).collect()
}

/// `f` in `local f = function() end` or `f = function() end`
fn function_holder_name<'p>(function: SyntaxNode<'p>) -> Option<SyntaxNode<'p>> {
    let list = function.parent().filter(|p| p.kind() == "expression_list")?;
    let mut stmt = list.parent()?;
    if stmt.kind() == "assignment_statement" {
        if let Some(decl) = stmt.parent().filter(|p| p.kind() == "variable_declaration") {
            stmt = decl;
        }
    }
    let index = named_children(list.node)
        .iter()
        .position(|value| value.id() == function.node.id())?;
    assigned_targets(stmt.node)
        .into_iter()
        .nth(index)
        .map(|target| stmt.with(target))
}

fn for_var_type(ctx: &SearchContext<'_>, stmt: SyntaxNode<'_>, index: usize) -> ITy {
    let clause = stmt.field("clause").or_else(|| {
        stmt.named_children()
            .into_iter()
            .find(|c| matches!(c.kind(), "for_numeric_clause" | "for_generic_clause"))
    });
    let Some(clause) = clause else {
        return ITy::Unknown;
    };
    if clause.kind() == "for_numeric_clause" {
        return ITy::NUMBER;
    }
    let Some(iterator) = clause
        .child_of_kind("expression_list")
        .and_then(|list| list.named_children().into_iter().next())
    else {
        return ITy::Unknown;
    };
    let Expr::Call { callee, args } = iterator.classify() else {
        return ITy::Unknown;
    };
    let is_builtin = |name: &str| {
        callee.kind() == "identifier"
            && callee.text() == name
            && scope::find_name(ctx, callee, name).is_none()
            && ctx.index().find_globals(name).is_empty()
    };
    let container = args
        .first()
        .map(|arg| guess_type(ctx, *arg))
        .unwrap_or_default();
    if is_builtin("ipairs") {
        match index {
            0 => ITy::NUMBER,
            1 => members::element_type(ctx, &container, &ITy::NUMBER),
            _ => ITy::Unknown,
        }
    } else if is_builtin("pairs") {
        let key = key_type(ctx, &container);
        match index {
            0 => key,
            1 => members::element_type(ctx, &container, &key),
            _ => ITy::Unknown,
        }
    } else {
        ITy::Unknown
    }
}

fn key_type(ctx: &SearchContext<'_>, container: &ITy) -> ITy {
    match container {
        ITy::Union(union) => ITy::union(union.members().iter().map(|m| key_type(ctx, m))),
        ITy::Array(_) => ITy::NUMBER,
        ITy::Generic(generic) if generic.base.name == "table" => {
            generic.args.first().cloned().unwrap_or_default()
        }
        ITy::Class(class) if class.kind == ClassKind::Named => ctx
            .find_class(&class.name)
            .and_then(|class| class.indexers.iter().find_map(|i| i.index_ty.clone()))
            .unwrap_or_default(),
        _ => ITy::Unknown,
    }
}

/// The type of the owner expression of a method; generic classes come back
/// with their own parameters as arguments
pub fn owner_type(ctx: &SearchContext<'_>, owner: SyntaxNode<'_>) -> ITy {
    let ty = guess_type(ctx, owner);
    match &ty {
        ITy::Class(class) if class.kind == ClassKind::Named => ctx
            .find_class(&class.name)
            .map(|class| class.as_type())
            .unwrap_or(ty),
        _ => ty,
    }
}

fn function_doc(ctx: &SearchContext<'_>, function: SyntaxNode<'_>) -> Option<DocComment> {
    let tree = ctx.project().scope_tree(function.file_id())?;
    let owner = doc_owner_of_function(function.node);
    tree.docs()
        .doc_for(&NodeRef::new(function.file_id(), owner))
        .cloned()
}

/// Signature of a function declaration or definition
pub fn function_type(ctx: &SearchContext<'_>, function: SyntaxNode<'_>) -> ITy {
    let doc = function_doc(ctx, function);
    let mut params = Vec::new();
    if let Some(owner) = function
        .field("name")
        .filter(|name| name.kind() == "method_index_expression")
        .and_then(|name| name.field("table"))
    {
        params.push(FunParam {
            name: "self".to_string(),
            ty: owner_type(ctx, owner),
        });
    }

    let mut variadic = false;
    if let Some(parameters) = function
        .field("parameters")
        .or_else(|| function.child_of_kind("parameters"))
    {
        variadic = parameters.child_of_kind("vararg_expression").is_some();
        for param in declared_names(parameters.node) {
            let param = function.with(param);
            let ty = doc
                .as_ref()
                .and_then(|doc| doc.param(param.text()))
                .map(|ty| generics::resolve_annotation(ctx, ty, param.node_ref()))
                .unwrap_or_default();
            params.push(FunParam {
                name: param.text().to_string(),
                ty,
            });
        }
    }

    let returns = return_type(ctx, function, doc.as_ref());
    ITy::function(params, variadic, returns)
}

/// What calling `node` produces: the annotated or inferred return type of a
/// function, or the result type of a call expression
pub fn guess_return_type(ctx: &SearchContext<'_>, node: SyntaxNode<'_>) -> ITy {
    match node.kind() {
        "function_call" => guess_type(ctx, node),
        kind if is_function(kind) => {
            let doc = function_doc(ctx, node);
            return_type(ctx, node, doc.as_ref())
        }
        _ => match guess_type(ctx, node) {
            ITy::Function(function) => *function.returns,
            _ => ITy::Unknown,
        },
    }
}

fn return_type(ctx: &SearchContext<'_>, function: SyntaxNode<'_>, doc: Option<&DocComment>) -> ITy {
    if let Some(ty) = doc.and_then(DocComment::return_type) {
        return generics::resolve_annotation(ctx, ty, function.node_ref());
    }
    let Some(body) = function
        .field("body")
        .or_else(|| function.child_of_kind("block"))
    else {
        return ITy::NIL;
    };
    let mut statements = Vec::new();
    collect_returns(body, &mut statements);
    if statements.is_empty() {
        return ITy::NIL;
    }
    ITy::union(statements.into_iter().map(|ret| {
        match ret
            .child_of_kind("expression_list")
            .and_then(|list| list.named_children().into_iter().next())
        {
            Some(value) => guess_type(ctx, value),
            None => ITy::NIL,
        }
    }))
}

/// `return` statements of a body, not descending into nested functions
fn collect_returns<'p>(node: SyntaxNode<'p>, out: &mut Vec<SyntaxNode<'p>>) {
    for child in node.named_children() {
        match child.kind() {
            "return_statement" => out.push(child),
            kind if is_function(kind) => {}
            _ => collect_returns(child, out),
        }
    }
}

fn call_type(ctx: &SearchContext<'_>, callee: SyntaxNode<'_>, args: &[SyntaxNode<'_>]) -> ITy {
    if callee.kind() == "identifier"
        && callee.text() == "setmetatable"
        && scope::find_name(ctx, callee, "setmetatable").is_none()
        && ctx.index().find_globals("setmetatable").is_empty()
    {
        return args
            .first()
            .map(|table| guess_type(ctx, *table))
            .unwrap_or_default();
    }

    let method_call = callee.kind() == "method_index_expression";
    let callee_ty = guess_type(ctx, callee);
    ITy::union(callee_ty.alternatives().iter().map(|alternative| match alternative {
        ITy::Function(function) => instantiate(ctx, function, args, method_call),
        _ => ITy::Unknown,
    }))
}

/// Return type of a call, with generic parameters bound from the arguments
fn instantiate(ctx: &SearchContext<'_>, function: &TyFunction, args: &[SyntaxNode<'_>], method_call: bool) -> ITy {
    let mut names: Vec<String> = Vec::new();
    for param in &function.params {
        for name in param.ty.generic_param_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    if names.is_empty() {
        return function.returns.as_ref().clone();
    }

    let offset = usize::from(method_call && function.params.first().is_some_and(|p| p.name == "self"));
    let mut substitution = Substitution::new();
    for (i, param) in function.params.iter().enumerate().skip(offset) {
        if !param.ty.contains_generic_params() {
            continue;
        }
        if let Some(arg) = args.get(i - offset) {
            bind(&param.ty, &guess_type(ctx, *arg), &mut substitution);
        }
    }
    function
        .returns
        .substitute(&substitution)
        .erase_generic_params(&names)
}

fn binary_type(ctx: &SearchContext<'_>, op: BinaryOp, left: SyntaxNode<'_>, right: SyntaxNode<'_>) -> ITy {
    match op {
        BinaryOp::Arithmetic => ITy::NUMBER,
        BinaryOp::Concat => ITy::STRING,
        BinaryOp::Comparison => ITy::BOOLEAN,
        BinaryOp::And => {
            let left = guess_type(ctx, left);
            let right = guess_type(ctx, right);
            if !left.is_falsy_possible() {
                return right;
            }
            let falsy = left
                .alternatives()
                .iter()
                .filter(|ty| matches!(ty, ITy::Primitive(Primitive::Nil | Primitive::Boolean)))
                .cloned();
            ITy::union(falsy.chain(std::iter::once(right)))
        }
        BinaryOp::Or => {
            let left = guess_type(ctx, left);
            if !left.is_falsy_possible() {
                return left;
            }
            let right = guess_type(ctx, right);
            ITy::union([left.without_nil(), right])
        }
    }
}

/// Type of the table an index or field expression reads from
pub fn guess_parent_type(ctx: &SearchContext<'_>, node: SyntaxNode<'_>) -> ITy {
    match node.classify() {
        Expr::Member { object, .. } | Expr::Method { object, .. } | Expr::Index { object, .. } => {
            return guess_type(ctx, object);
        }
        _ => {}
    }
    let Some(parent) = node.parent() else {
        return ITy::Unknown;
    };
    match parent.kind() {
        "field" => parent
            .parent()
            .filter(|p| p.kind() == "table_constructor")
            .map(|table| guess_type(ctx, table))
            .unwrap_or_default(),
        "dot_index_expression" | "method_index_expression" | "bracket_index_expression" => {
            match parent.field("table") {
                Some(table) if table.node.id() != node.node.id() => guess_type(ctx, table),
                _ => ITy::Unknown,
            }
        }
        _ => ITy::Unknown,
    }
}

/// Type of the key an index expression or table field uses
pub fn guess_index_type(ctx: &SearchContext<'_>, node: SyntaxNode<'_>) -> ITy {
    match node.kind() {
        "bracket_index_expression" => node
            .field("field")
            .map(|key| guess_type(ctx, key))
            .unwrap_or_default(),
        "dot_index_expression" | "method_index_expression" => ITy::STRING,
        "field" => {
            if node.child_of_kind("[").is_some() {
                node.field("name")
                    .map(|key| guess_type(ctx, key))
                    .unwrap_or_default()
            } else if node.field("name").is_some() {
                ITy::STRING
            } else {
                ITy::NUMBER
            }
        }
        _ => match node.parent() {
            Some(parent)
                if matches!(
                    parent.kind(),
                    "field" | "dot_index_expression" | "method_index_expression" | "bracket_index_expression"
                ) =>
            {
                guess_index_type(ctx, parent)
            }
            _ => ITy::Unknown,
        },
    }
}

/// The declaration a name or member expression refers to
pub fn resolve_declaration(ctx: &SearchContext<'_>, node: SyntaxNode<'_>) -> Option<Declaration> {
    match node.classify() {
        Expr::Name(name) => {
            if let Some(parent) = node.parent() {
                let is_member_name = matches!(parent.kind(), "dot_index_expression" | "method_index_expression")
                    && parent.field("table").is_some_and(|t| t.node.id() != node.node.id());
                if is_member_name {
                    return resolve_declaration(ctx, parent);
                }
            }
            scope::find_name(ctx, node, name).or_else(|| ctx.index().find_globals(name).into_iter().next())
        }
        Expr::Member { object, name } | Expr::Method { object, name } => {
            let object_ty = guess_type(ctx, object);
            members::find_member(ctx, &object_ty, name).map(|found| found.decl)
        }
        _ => None,
    }
}

/// Whether a value of type `source` may be stored where `target` is expected
pub fn is_assignable(ctx: &SearchContext<'_>, source: &ITy, target: &ITy) -> bool {
    if source == target || source.is_unknown() || target.is_unknown() {
        return true;
    }
    match (source, target) {
        (ITy::Union(union), _) => union.members().iter().all(|s| is_assignable(ctx, s, target)),
        (_, ITy::Union(union)) => union.members().iter().any(|t| is_assignable(ctx, source, t)),
        (ITy::Class(class), _) | (_, ITy::Class(class)) if class.is_generic_param() => true,
        (ITy::Class(s), ITy::Class(t)) => match (&s.kind, &t.kind) {
            (ClassKind::Named, ClassKind::Named) => is_subclass(ctx, &s.name, &t.name),
            (ClassKind::Table(_), ClassKind::Named) => true,
            _ => false,
        },
        (ITy::Generic(s), ITy::Generic(t)) => {
            s.base.name == t.base.name
                && s.args.len() == t.args.len()
                && s.args.iter().zip(&t.args).all(|(a, b)| is_assignable(ctx, a, b))
        }
        (ITy::Generic(s), ITy::Class(t)) if t.kind == ClassKind::Named => is_subclass(ctx, &s.base.name, &t.name),
        (ITy::Array(s), ITy::Array(t)) => is_assignable(ctx, s, t),
        (ITy::Class(_) | ITy::Generic(_) | ITy::Array(_), ITy::Primitive(Primitive::Table)) => true,
        (ITy::Class(class), ITy::Array(_) | ITy::Generic(_)) => matches!(class.kind, ClassKind::Table(_)),
        (ITy::Function(_), ITy::Primitive(Primitive::Function))
        | (ITy::Primitive(Primitive::Function), ITy::Function(_)) => true,
        (ITy::Function(s), ITy::Function(t)) => *t.returns == ITy::NIL || is_assignable(ctx, &s.returns, &t.returns),
        _ => false,
    }
}

/// `name` is `target` or inherits from it
fn is_subclass(ctx: &SearchContext<'_>, name: &str, target: &str) -> bool {
    let mut seen: Vec<String> = Vec::new();
    let mut current = Some(name.to_string());
    while let Some(class_name) = current.take() {
        if class_name == target {
            return true;
        }
        if seen.contains(&class_name) {
            return false;
        }
        current = ctx
            .find_class(&class_name)
            .and_then(|class| match &class.super_class {
                Some(ITy::Class(c)) => Some(c.name.clone()),
                Some(ITy::Generic(g)) => Some(g.base.name.clone()),
                _ => None,
            });
        seen.push(class_name);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveOptions;
    use crate::project::Project;

    /// Type of the first expression matching `needle` in `code`
    fn type_at(code: &str, needle: &str) -> String {
        type_at_with(ResolveOptions::default(), code, needle)
    }

    fn type_at_with(options: ResolveOptions, code: &str, needle: &str) -> String {
        let mut project = Project::new(options);
        project.set_file("test.lua", code).unwrap();
        let offset = code.rfind(needle).expect("needle");
        let node = expression_at(&project, offset, needle.len());
        let ctx = project.search_context();
        let ty = guess_type(&ctx, node);
        assert_eq!(ctx.in_flight_count(), 0);
        ty.to_string()
    }

    fn expression_at(project: &Project, offset: usize, len: usize) -> SyntaxNode<'_> {
        let file = project.file_by_path("test.lua").unwrap();
        let node = file
            .root()
            .named_descendant_for_byte_range(offset, offset + len)
            .unwrap();
        SyntaxNode::new(file, node)
    }

    #[test]
    fn test_literals_and_operators() {
        assert_eq!(type_at("local a = 1 + 2", "1 + 2"), "number");
        assert_eq!(type_at("local a = 'x' .. 1", "'x' .. 1"), "string");
        assert_eq!(type_at("local a = 1 < 2", "1 < 2"), "boolean");
        assert_eq!(type_at("local a = not nil", "not nil"), "boolean");
        assert_eq!(type_at("local a = #t", "#t"), "number");
        assert_eq!(type_at("local a = (true)", "(true)"), "boolean");
    }

    #[test]
    fn test_local_types_follow_initializer_and_assignments() {
        let code = "local x = 1\nif c then x = 'a' end\nprint(x)";
        assert_eq!(type_at(code, "x"), "number|string");
        let only = type_at_with(ResolveOptions::annotations_only(), code, "x");
        assert_eq!(only, "number");
        assert_eq!(type_at("local y\nprint(y)", "y"), "nil");
        assert_eq!(type_at("local y\ny = true\nprint(y)", "y"), "boolean");
    }

    #[test]
    fn test_or_drops_nil_and_and_keeps_right() {
        let code = "---@type number?\nlocal n\nlocal v = n or 'd'\nlocal w = 1 and 'r'";
        assert_eq!(type_at(code, "n or 'd'"), "number|string");
        assert_eq!(type_at(code, "1 and 'r'"), "string");
    }

    #[test]
    fn test_table_members_from_constructor_and_assignments() {
        let code = "local M = { a = 1 }\nM.b = 'x'\nfunction M.f() return true end\nlocal r = M.f()\nprint(M.a, M.b)";
        assert_eq!(type_at(code, "M.a"), "number");
        assert_eq!(type_at(code, "M.b"), "string");
        assert_eq!(type_at(code, "M.f()"), "boolean");
    }

    #[test]
    fn test_global_tables_across_files() {
        let mut project = Project::default();
        project.set_file("a.lua", "Config = { debug = false }\n").unwrap();
        let code = "Config.path = '/tmp'\nprint(Config.path, Config.debug)";
        project.set_file("test.lua", code).unwrap();
        let ctx = project.search_context();
        let path = expression_at(&project, code.rfind("Config.path").unwrap(), 11);
        let debug = expression_at(&project, code.rfind("Config.debug").unwrap(), 12);
        assert_eq!(guess_type(&ctx, path), ITy::STRING);
        assert_eq!(guess_type(&ctx, debug), ITy::BOOLEAN);
    }

    #[test]
    fn test_return_types() {
        assert_eq!(type_at("local function f() return 1 end\nlocal x = f()", "f()"), "number");
        assert_eq!(type_at("local function f() end\nlocal x = f()", "f()"), "nil");
        let code = "local function f(a)\n  if a then return 'x' end\n  return nil\nend\nlocal x = f()";
        assert_eq!(type_at(code, "f()"), "nil|string");
        let annotated = "---@return string\nlocal function f() return g() end\nlocal x = f()";
        assert_eq!(type_at(annotated, "f()"), "string");
    }

    #[test]
    fn test_recursive_function_terminates() {
        let code = "local function f(n)\n  if n then return f(n) end\n  return 0\nend\nlocal x = f(1)";
        assert_eq!(type_at(code, "f(1)"), "number");
    }

    #[test]
    fn test_parameters_inferred_from_calls() {
        let code = "local function f(a)\n  return a\nend\nf(1)\nf('s')\nlocal r = f(true)";
        assert_eq!(type_at(code, "f(true)"), "boolean|number|string");
        let global = "function g(a) return a end\ng(1)\nlocal r = g(2)";
        assert_eq!(type_at(global, "g(2)"), "number");
        let off = type_at_with(ResolveOptions::annotations_only(), code, "f(true)");
        assert_eq!(off, "unknown");
    }

    #[test]
    fn test_generic_function_instantiation() {
        let code = "---@generic T\n---@param x T\n---@return T\nlocal function id(x) return x end\nlocal n = id(1)\nlocal s = id('a')";
        assert_eq!(type_at(code, "id(1)"), "number");
        assert_eq!(type_at(code, "id('a')"), "string");
        let list = "---@generic V\n---@param t V[]\n---@return V\nlocal function first(t) return t[1] end\n---@type string[]\nlocal names\nlocal n = first(names)";
        assert_eq!(type_at(list, "first(names)"), "string");
    }

    #[test]
    fn test_unbound_generic_is_unknown() {
        let code = "---@generic T\n---@param x T\n---@return T\nlocal function id(x) return x end\nlocal n = id()";
        assert_eq!(type_at(code, "id()"), "unknown");
    }

    #[test]
    fn test_method_self_and_generic_class() {
        let code = "---@class Box<T>\n---@field value T\nlocal Box = {}\n\n---@return T\nfunction Box:get() return self.value end\n\n---@type Box<number>\nlocal b\nlocal v = b:get()\nlocal w = b.value";
        assert_eq!(type_at(code, "b:get()"), "number");
        assert_eq!(type_at(code, "b.value"), "number");
        assert_eq!(type_at(code, "self.value"), "T");
    }

    #[test]
    fn test_setmetatable_returns_first_argument() {
        let code = "---@class Account\nlocal Account = {}\n---@type Account\nlocal proto\nlocal a = setmetatable(proto, {})";
        assert_eq!(type_at(code, "setmetatable(proto, {})"), "Account");
    }

    #[test]
    fn test_for_variables() {
        assert_eq!(type_at("for i = 1, 3 do print(i) end", "i"), "number");
        let code = "---@type string[]\nlocal list\nfor i, v in ipairs(list) do print(i, v) end";
        assert_eq!(type_at(code, "v"), "string");
        assert_eq!(type_at(code, "i"), "number");
        let map = "---@type table<string, boolean>\nlocal set\nfor k, v in pairs(set) do print(k, v) end";
        assert_eq!(type_at(map, "k"), "string");
        assert_eq!(type_at(map, "v"), "boolean");
    }

    #[test]
    fn test_builtins_and_index() {
        assert_eq!(type_at("local s = tostring(1)", "tostring(1)"), "string");
        let code = "---@type number[]\nlocal xs\nlocal x = xs[1]";
        assert_eq!(type_at(code, "xs[1]"), "number");
        let map = "---@class Bag\n---@field [string] boolean\n---@type Bag\nlocal bag\nlocal b = bag['k']";
        assert_eq!(type_at(map, "bag['k']"), "boolean");
    }

    #[test]
    fn test_parent_and_index_types() {
        let mut project = Project::default();
        let code = "---@class P\n---@type P\nlocal p\nlocal a = p.x\nlocal t = { k = 1, [2] = 3, 4 }";
        project.set_file("test.lua", code).unwrap();
        let ctx = project.search_context();
        let member = expression_at(&project, code.find("p.x").unwrap(), 3);
        assert_eq!(guess_parent_type(&ctx, member), ITy::class("P"));
        assert_eq!(guess_index_type(&ctx, member), ITy::STRING);

        let field_name = expression_at(&project, code.find("x\n").unwrap(), 1);
        assert_eq!(guess_parent_type(&ctx, field_name), ITy::class("P"));

        let table = expression_at(&project, code.find("{ k").unwrap(), 1);
        let fields: Vec<ITy> = table
            .named_children()
            .into_iter()
            .filter(|n| n.kind() == "field")
            .map(|field| guess_index_type(&ctx, field))
            .collect();
        assert_eq!(fields, vec![ITy::STRING, ITy::NUMBER, ITy::NUMBER]);
    }

    #[test]
    fn test_resolve_declaration() {
        let mut project = Project::default();
        let code = "---@class A\n---@field x number\n---@type A\nlocal a\nprint(a.x)";
        project.set_file("test.lua", code).unwrap();
        let ctx = project.search_context();
        let name = expression_at(&project, code.rfind("a.x").unwrap(), 1);
        let local = resolve_declaration(&ctx, name).unwrap();
        assert_eq!(local.kind, DeclKind::Local);
        let field = expression_at(&project, code.rfind('x').unwrap(), 1);
        let member = resolve_declaration(&ctx, field).unwrap();
        assert_eq!(member.kind, DeclKind::Field);
        assert_eq!(member.name, "x");
        assert_eq!(member.location.start, code.find("---@field x").unwrap());
    }

    #[test]
    fn test_assignability() {
        let mut project = Project::default();
        project
            .set_file("a.lua", "---@class Animal\n---@class Dog : Animal\n")
            .unwrap();
        let ctx = project.search_context();
        let dog = ITy::class("Dog");
        let animal = ITy::class("Animal");
        assert!(is_assignable(&ctx, &dog, &animal));
        assert!(!is_assignable(&ctx, &animal, &dog));
        assert!(is_assignable(&ctx, &ITy::NUMBER, &ITy::union([ITy::NUMBER, ITy::NIL])));
        assert!(!is_assignable(&ctx, &ITy::union([ITy::NUMBER, ITy::NIL]), &ITy::NUMBER));
        assert!(is_assignable(&ctx, &ITy::array(dog.clone()), &ITy::array(animal)));
        assert!(is_assignable(&ctx, &dog, &ITy::TABLE));
        assert!(!is_assignable(&ctx, &ITy::STRING, &ITy::NUMBER));
    }
}
