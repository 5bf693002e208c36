//! Lexical scopes of one file
//!
//! The tree is built in a single walk and answers "what does this name mean
//! at this offset". Every local remembers the offset it becomes visible from,
//! which gives Lua's textual-order rules: `local x = x` reads the outer `x`,
//! `local function f` can call itself, and a block's locals are still visible
//! in a `repeat ... until` condition.
//!
//! The walk also records per-file facts the resolver and the index need:
//! call sites, assignments, non-local function declarations and every
//! identifier read.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tree_sitter::Node;

use crate::annotation::DocComment;
use crate::comment::DocIndex;
use crate::decl::{DeclKind, DeclaredType, Declaration, Thunk};
use crate::infer;
use crate::project::SourceFile;
use crate::search::SearchContext;
use crate::syntax::{
    FileId, NodeRef, SyntaxNode, assigned_targets, assigned_values, child_of_kind, children,
    declared_names, is_local_function, named_children, node_text,
};
use crate::ty::ITy;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    File,
    Function,
    Block,
    Loop,
}

#[derive(Debug, Clone)]
pub struct ScopedDecl {
    pub decl: Declaration,
    pub visible_from: usize,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub scope_type: ScopeType,
    pub parent: Option<ScopeId>,
    pub start: usize,
    pub end: usize,
    pub decls: Vec<ScopedDecl>,
    /// `@generic` names introduced by this scope's function
    pub generics: Vec<Declaration>,
    /// For function scopes, the function node
    pub function: Option<NodeRef>,
    /// For method bodies, the expression naming the owner (`A` in `A:m`)
    pub owner: Option<NodeRef>,
}

impl Scope {
    fn new(id: ScopeId, scope_type: ScopeType, parent: Option<ScopeId>, start: usize, end: usize) -> Self {
        Self {
            id,
            scope_type,
            parent,
            start,
            end,
            decls: Vec::new(),
            generics: Vec::new(),
            function: None,
            owner: None,
        }
    }

    fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub name: String,
    pub call: NodeRef,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    Name(String),
    Member {
        object: NodeRef,
        /// Set when the object is a plain identifier
        object_name: Option<String>,
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct AssignSite {
    pub target: AssignTarget,
    pub target_node: NodeRef,
    pub stmt: NodeRef,
    pub index: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionSite {
    pub node: NodeRef,
    pub name_node: NodeRef,
    pub target: AssignTarget,
    pub method: bool,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    file: FileId,
    version: u64,
    scopes: Vec<Scope>,
    docs: DocIndex,
    calls: Vec<CallSite>,
    assignments: Vec<AssignSite>,
    functions: Vec<FunctionSite>,
    references: Vec<Reference>,
}

impl ScopeTree {
    pub fn build(file: &SourceFile) -> ScopeTree {
        let root = file.root();
        let docs = DocIndex::build(file.id(), root, file.source());
        let mut builder = Builder {
            source: file.source(),
            tree: ScopeTree {
                file: file.id(),
                version: file.version(),
                scopes: vec![Scope::new(0, ScopeType::File, None, 0, file.source().len() + 1)],
                docs,
                calls: Vec::new(),
                assignments: Vec::new(),
                functions: Vec::new(),
                references: Vec::new(),
            },
        };
        builder.walk_children(root, 0);
        tracing::trace!(
            file = %file.path(),
            scopes = builder.tree.scopes.len(),
            "built scope tree"
        );
        builder.tree
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn docs(&self) -> &DocIndex {
        &self.docs
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    pub fn assignments(&self) -> &[AssignSite] {
        &self.assignments
    }

    pub fn functions(&self) -> &[FunctionSite] {
        &self.functions
    }

    /// Every identifier read, in source order
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Innermost scope containing `offset`
    pub fn scope_at(&self, offset: usize) -> ScopeId {
        // Scopes are stored in pre-order, so the last match is the innermost.
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.contains(offset))
            .map(|scope| scope.id)
            .unwrap_or(0)
    }

    fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = &Scope> {
        let mut current = Some(id);
        std::iter::from_fn(move || {
            let scope = self.scopes.get(current?)?;
            current = scope.parent;
            Some(scope)
        })
    }

    /// Resolve `name` as seen from `offset`: innermost scope first, latest
    /// visible declaration within a scope
    pub fn find_name(&self, offset: usize, name: &str) -> Option<&Declaration> {
        self.ancestors(self.scope_at(offset)).find_map(|scope| {
            scope
                .decls
                .iter()
                .rev()
                .find(|d| d.decl.name == name && d.visible_from <= offset)
                .map(|d| &d.decl)
        })
    }

    /// `@generic` definition of `name` visible from `offset`
    pub fn find_generic(&self, offset: usize, name: &str) -> Option<&Declaration> {
        self.ancestors(self.scope_at(offset))
            .find_map(|scope| scope.generics.iter().find(|g| g.name == name))
    }

    /// Owner expression of the nearest enclosing method body
    pub fn owner_at(&self, offset: usize) -> Option<NodeRef> {
        self.ancestors(self.scope_at(offset)).find_map(|scope| scope.owner)
    }

    /// Innermost function node enclosing `offset`
    pub fn function_at(&self, offset: usize) -> Option<NodeRef> {
        self.ancestors(self.scope_at(offset))
            .find_map(|scope| scope.function)
    }

    /// Every local, parameter and loop variable in the file
    pub fn locals(&self) -> impl Iterator<Item = &ScopedDecl> {
        self.scopes.iter().flat_map(|scope| scope.decls.iter())
    }

    /// Assignments to a plain name that resolve to `decl`
    pub fn assignments_to<'a>(&'a self, decl: &'a Declaration) -> impl Iterator<Item = &'a AssignSite> {
        self.assignments.iter().filter(move |site| match &site.target {
            AssignTarget::Name(name) => {
                *name == decl.name
                    && self
                        .find_name(site.offset, name)
                        .is_some_and(|found| found.location == decl.location)
            }
            AssignTarget::Member { .. } => false,
        })
    }

    /// Plain-name calls that resolve to `decl`, or to the global `decl.name`
    /// when `decl` is not a local of this file
    pub fn calls_to<'a>(&'a self, decl: &'a Declaration, local: bool) -> impl Iterator<Item = &'a CallSite> {
        self.calls.iter().filter(move |call| {
            if call.name != decl.name {
                return false;
            }
            match self.find_name(call.offset, &call.name) {
                Some(found) => local && found.location == decl.location,
                None => !local,
            }
        })
    }

    /// Locals that are never read, skipping `_`-prefixed names and `self`
    pub fn unused_locals(&self) -> Vec<&Declaration> {
        let mut used = HashSet::new();
        for reference in &self.references {
            if let Some(decl) = self.find_name(reference.offset, &reference.name) {
                used.insert(decl.location);
            }
        }
        self.locals()
            .map(|local| &local.decl)
            .filter(|decl| {
                matches!(decl.kind, DeclKind::Local | DeclKind::LocalFunction | DeclKind::Param)
                    && !decl.name.starts_with('_')
                    && decl.name != "self"
                    && !used.contains(&decl.location)
            })
            .collect()
    }
}

struct Builder<'a> {
    source: &'a str,
    tree: ScopeTree,
}

impl Builder<'_> {
    fn node_ref(&self, node: Node<'_>) -> NodeRef {
        NodeRef::new(self.tree.file, node)
    }

    fn doc(&self, node: Node<'_>) -> Option<&DocComment> {
        self.tree.docs.doc_for(&NodeRef::new(self.tree.file, node))
    }

    fn push_scope(&mut self, scope_type: ScopeType, parent: ScopeId, node: Node<'_>) -> ScopeId {
        let id = self.tree.scopes.len();
        self.tree
            .scopes
            .push(Scope::new(id, scope_type, Some(parent), node.start_byte(), node.end_byte()));
        id
    }

    fn declare(&mut self, scope: ScopeId, decl: Declaration, visible_from: usize) {
        if let Some(scope) = self.tree.scopes.get_mut(scope) {
            scope.decls.push(ScopedDecl { decl, visible_from });
        }
    }

    fn walk_children(&mut self, node: Node<'_>, scope: ScopeId) {
        for child in children(node) {
            self.walk(child, scope);
        }
    }

    fn walk(&mut self, node: Node<'_>, scope: ScopeId) {
        match node.kind() {
            "comment" => {}
            "identifier" => self.tree.references.push(Reference {
                name: node_text(node, self.source).to_string(),
                offset: node.start_byte(),
            }),
            "variable_declaration" => self.local_declaration(node, scope),
            "assignment_statement" => self.assignment(node, scope),
            "function_declaration" => self.function_declaration(node, scope),
            "function_definition" => {
                let owner = definition_owner(node).map(|n| self.node_ref(n));
                self.function_scope(node, scope, owner, false);
            }
            "function_call" => {
                if let Some(name) = node.child_by_field_name("name") {
                    if name.kind() == "identifier" {
                        self.tree.calls.push(CallSite {
                            name: node_text(name, self.source).to_string(),
                            call: self.node_ref(node),
                            offset: node.start_byte(),
                        });
                    }
                }
                self.walk_children(node, scope);
            }
            "dot_index_expression" | "method_index_expression" => {
                if let Some(table) = node.child_by_field_name("table") {
                    self.walk(table, scope);
                }
            }
            "field" => self.table_field(node, scope),
            "do_statement" | "if_statement" => self.walk_children(node, scope),
            "while_statement" | "repeat_statement" => {
                let id = self.push_scope(ScopeType::Loop, scope, node);
                self.walk_children(node, id);
            }
            "for_statement" => self.for_statement(node, scope),
            "block" => {
                let parent_kind = node.parent().map(|p| p.kind()).unwrap_or("");
                if matches!(parent_kind, "do_statement" | "if_statement" | "elseif_statement" | "else_statement") {
                    let id = self.push_scope(ScopeType::Block, scope, node);
                    self.walk_children(node, id);
                } else {
                    self.walk_children(node, scope);
                }
            }
            _ => self.walk_children(node, scope),
        }
    }

    fn local_declaration(&mut self, node: Node<'_>, scope: ScopeId) {
        if let Some(function) = child_of_kind(node, "function_declaration") {
            // older grammars nest `local function` here
            self.function_declaration(function, scope);
            return;
        }
        if let Some(values) = child_of_kind(node, "assignment_statement")
            .and_then(|a| child_of_kind(a, "expression_list"))
        {
            self.walk(values, scope);
        }

        let stmt = self.node_ref(node);
        let doc = self.doc(node).cloned().unwrap_or_default();
        let class = doc.class_name().map(str::to_string);
        let visible_from = node.end_byte();
        for (index, name) in assigned_targets(node).into_iter().enumerate() {
            if name.kind() != "identifier" {
                continue;
            }
            let explicit = doc
                .declared_type(index)
                .cloned()
                .or_else(|| class.clone().filter(|_| index == 0).map(ITy::class));
            let ty = match explicit {
                Some(ty) => DeclaredType::Explicit(ty),
                None => DeclaredType::Inferred(Thunk::Value { stmt, index }),
            };
            let decl = Declaration::new(node_text(name, self.source), DeclKind::Local, ty, self.node_ref(name))
                .with_deprecated(doc.is_deprecated());
            self.declare(scope, decl, visible_from);
        }
    }

    fn assignment(&mut self, node: Node<'_>, scope: ScopeId) {
        let stmt = self.node_ref(node);
        for (index, target) in assigned_targets(node).into_iter().enumerate() {
            let assign_target = match target.kind() {
                "identifier" => Some(AssignTarget::Name(node_text(target, self.source).to_string())),
                "dot_index_expression" => {
                    self.walk(target, scope);
                    match (target.child_by_field_name("table"), target.child_by_field_name("field")) {
                        (Some(object), Some(field)) => Some(AssignTarget::Member {
                            object: self.node_ref(object),
                            object_name: (object.kind() == "identifier")
                                .then(|| node_text(object, self.source).to_string()),
                            name: node_text(field, self.source).to_string(),
                        }),
                        _ => None,
                    }
                }
                _ => {
                    self.walk(target, scope);
                    None
                }
            };
            if let Some(assign_target) = assign_target {
                self.tree.assignments.push(AssignSite {
                    target: assign_target,
                    target_node: self.node_ref(target),
                    stmt,
                    index,
                    offset: target.start_byte(),
                });
            }
        }
        if let Some(values) = child_of_kind(node, "expression_list") {
            self.walk(values, scope);
        }
    }

    fn function_declaration(&mut self, node: Node<'_>, scope: ScopeId) {
        let Some(name) = node.child_by_field_name("name") else {
            self.function_scope(node, scope, None, false);
            return;
        };

        if is_local_function(node) {
            let doc = self.doc(node).cloned().unwrap_or_default();
            let decl = Declaration::new(
                node_text(name, self.source),
                DeclKind::LocalFunction,
                DeclaredType::Inferred(Thunk::Function(self.node_ref(node))),
                self.node_ref(name),
            )
            .with_deprecated(doc.is_deprecated())
            .with_generic_params(doc.generic_params());
            self.declare(scope, decl, name.start_byte());
            self.function_scope(node, scope, None, false);
            return;
        }

        let (target, owner, method) = match name.kind() {
            "identifier" => (AssignTarget::Name(node_text(name, self.source).to_string()), None, false),
            "dot_index_expression" | "method_index_expression" => {
                let field = name
                    .child_by_field_name("field")
                    .or_else(|| name.child_by_field_name("method"));
                let (Some(object), Some(field)) = (name.child_by_field_name("table"), field) else {
                    self.function_scope(node, scope, None, false);
                    return;
                };
                self.walk(object, scope);
                let target = AssignTarget::Member {
                    object: self.node_ref(object),
                    object_name: (object.kind() == "identifier")
                        .then(|| node_text(object, self.source).to_string()),
                    name: node_text(field, self.source).to_string(),
                };
                let method = name.kind() == "method_index_expression";
                (target, Some(self.node_ref(object)), method)
            }
            _ => {
                self.function_scope(node, scope, None, false);
                return;
            }
        };

        self.tree.functions.push(FunctionSite {
            node: self.node_ref(node),
            name_node: self.node_ref(name),
            target,
            method,
            offset: node.start_byte(),
        });
        self.function_scope(node, scope, owner, method);
    }

    fn function_scope(&mut self, node: Node<'_>, scope: ScopeId, owner: Option<NodeRef>, method: bool) {
        let id = self.push_scope(ScopeType::Function, scope, node);
        let function = self.node_ref(node);
        let doc = self
            .doc(doc_owner_of_function(node))
            .cloned()
            .unwrap_or_default();

        if let Some(s) = self.tree.scopes.get_mut(id) {
            s.function = Some(function);
            s.owner = owner;
            s.generics = doc
                .generic_params()
                .into_iter()
                .map(|name| {
                    Declaration::new(
                        name.clone(),
                        DeclKind::GenericParam,
                        DeclaredType::Explicit(ITy::generic_param(name)),
                        function,
                    )
                })
                .collect();
        }

        let parameters = node
            .child_by_field_name("parameters")
            .or_else(|| child_of_kind(node, "parameters"));
        let visible_from = parameters.map(|p| p.start_byte()).unwrap_or(node.start_byte());
        if method {
            let decl = Declaration::new(
                "self",
                DeclKind::Param,
                DeclaredType::Inferred(Thunk::SelfParam { function }),
                function,
            );
            self.declare(id, decl, visible_from);
        }
        if let Some(parameters) = parameters {
            for (index, param) in declared_names(parameters).into_iter().enumerate() {
                let name = node_text(param, self.source);
                let ty = match doc.param(name) {
                    Some(ty) => DeclaredType::Explicit(ty.clone()),
                    None => DeclaredType::Inferred(Thunk::Param { function, index }),
                };
                let decl = Declaration::new(name, DeclKind::Param, ty, self.node_ref(param));
                self.declare(id, decl, visible_from);
            }
        }

        if let Some(body) = node
            .child_by_field_name("body")
            .or_else(|| child_of_kind(node, "block"))
        {
            self.walk_children(body, id);
        }
    }

    fn table_field(&mut self, node: Node<'_>, scope: ScopeId) {
        let bracketed = child_of_kind(node, "[").is_some();
        for child in named_children(node) {
            let is_key_name = !bracketed
                && child.kind() == "identifier"
                && node.child_by_field_name("name").is_some_and(|n| n.id() == child.id());
            if !is_key_name {
                self.walk(child, scope);
            }
        }
    }

    fn for_statement(&mut self, node: Node<'_>, scope: ScopeId) {
        let id = self.push_scope(ScopeType::Loop, scope, node);
        let stmt = self.node_ref(node);
        let clause = node.child_by_field_name("clause").or_else(|| {
            named_children(node)
                .into_iter()
                .find(|c| matches!(c.kind(), "for_numeric_clause" | "for_generic_clause"))
        });

        if let Some(clause) = clause {
            let names = match clause.kind() {
                "for_numeric_clause" => {
                    let var = clause
                        .child_by_field_name("name")
                        .or_else(|| child_of_kind(clause, "identifier"));
                    for child in named_children(clause) {
                        if Some(child.id()) != var.map(|v| v.id()) {
                            self.walk(child, scope);
                        }
                    }
                    var.into_iter().collect::<Vec<_>>()
                }
                _ => {
                    if let Some(values) = child_of_kind(clause, "expression_list") {
                        self.walk(values, scope);
                    }
                    child_of_kind(clause, "variable_list")
                        .map(declared_names)
                        .unwrap_or_else(|| declared_names(clause))
                }
            };
            for (index, name) in names.into_iter().enumerate() {
                let decl = Declaration::new(
                    node_text(name, self.source),
                    DeclKind::ForVar,
                    DeclaredType::Inferred(Thunk::ForVar { stmt, index }),
                    self.node_ref(name),
                );
                self.declare(id, decl, clause.end_byte());
            }
        }

        if let Some(body) = node
            .child_by_field_name("body")
            .or_else(|| child_of_kind(node, "block"))
        {
            self.walk_children(body, id);
        }
    }
}

/// The node whose doc comment describes a function: the declaration itself,
/// or the statement/field an anonymous function is assigned in
pub fn doc_owner_of_function(node: Node<'_>) -> Node<'_> {
    if node.kind() == "function_declaration" {
        return node;
    }
    let mut current = node;
    while let Some(parent) = current.parent() {
        if matches!(parent.kind(), "chunk" | "block" | "table_constructor") {
            break;
        }
        if matches!(parent.kind(), "arguments" | "function_definition" | "function_declaration") {
            return node;
        }
        current = parent;
    }
    current
}

/// `A` in `A.m = function() end`
fn definition_owner(node: Node<'_>) -> Option<Node<'_>> {
    let list = node.parent().filter(|p| p.kind() == "expression_list")?;
    let stmt = list.parent().filter(|p| p.kind() == "assignment_statement")?;
    let index = named_children(list).iter().position(|n| n.id() == node.id())?;
    let target = assigned_targets(stmt).into_iter().nth(index)?;
    (target.kind() == "dot_index_expression")
        .then(|| target.child_by_field_name("table"))
        .flatten()
}

/// Values of the `index`-th assignment in a statement, for thunks
pub fn assigned_value<'t>(stmt: Node<'t>, index: usize) -> Option<Node<'t>> {
    assigned_values(stmt).into_iter().nth(index)
}

/// One `Arc<ScopeTree>` per file, rebuilt when the file's version moves on
#[derive(Debug, Default)]
pub struct ScopeTreeCache {
    trees: RwLock<HashMap<FileId, Arc<ScopeTree>>>,
}

impl ScopeTreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single insert or remove, so a poisoned map is intact
    fn read(&self) -> RwLockReadGuard<'_, HashMap<FileId, Arc<ScopeTree>>> {
        self.trees.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<FileId, Arc<ScopeTree>>> {
        self.trees.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, file: &SourceFile) -> Arc<ScopeTree> {
        if let Some(tree) = self.read().get(&file.id()) {
            if tree.version() == file.version() {
                return Arc::clone(tree);
            }
        }
        let tree = Arc::new(ScopeTree::build(file));
        self.insert(Arc::clone(&tree));
        tree
    }

    pub fn insert(&self, tree: Arc<ScopeTree>) {
        self.write().insert(tree.file(), tree);
    }

    pub fn invalidate(&self, file: FileId) {
        self.write().remove(&file);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve `name` at `element` through its file's scope tree
pub fn find_name(ctx: &SearchContext<'_>, element: SyntaxNode<'_>, name: &str) -> Option<Declaration> {
    let tree = ctx.project().scope_tree(element.file_id())?;
    tree.find_name(element.start(), name).cloned()
}

/// Type of the class owning the method that encloses `element`
pub fn find_owner<'p>(ctx: &SearchContext<'p>, element: SyntaxNode<'p>) -> Option<ITy> {
    let tree = ctx.project().scope_tree(element.file_id())?;
    let owner = tree.owner_at(element.start())?;
    let owner_node = ctx.project().node(&owner)?;
    let ty = infer::owner_type(ctx, owner_node);
    (!ty.is_unknown()).then_some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;

    fn tree_for(code: &str) -> (Project, Arc<ScopeTree>) {
        let mut project = Project::default();
        let id = project.set_file("test.lua", code).expect("parse");
        let tree = project.scope_tree(id).expect("scope tree");
        (project, tree)
    }

    fn offset_of(code: &str, needle: &str, nth: usize) -> usize {
        code.match_indices(needle).nth(nth).map(|(i, _)| i).expect("needle")
    }

    #[test]
    fn test_innermost_declaration_wins() {
        let code = "local x = 1\ndo\n  local x = 'a'\n  print(x)\nend\nprint(x)\n";
        let (_project, tree) = tree_for(code);

        let inner = tree.find_name(offset_of(code, "print(x)", 0) + 6, "x").unwrap();
        let outer = tree.find_name(offset_of(code, "print(x)", 1) + 6, "x").unwrap();
        assert_ne!(inner.location, outer.location);
        assert_eq!(outer.location.start, offset_of(code, "x", 0));
        assert_eq!(inner.location.start, offset_of(code, "x = 'a'", 0));
    }

    #[test]
    fn test_reference_before_local_sees_outer() {
        let code = "local x = 1\nfunction f()\n  print(x)\n  local x = 2\n  return x\nend\n";
        let (_project, tree) = tree_for(code);

        let before = tree.find_name(offset_of(code, "print(x)", 0) + 6, "x").unwrap();
        assert_eq!(before.location.start, offset_of(code, "x", 0));
        let after = tree.find_name(offset_of(code, "return x", 0) + 7, "x").unwrap();
        assert_eq!(after.location.start, offset_of(code, "x = 2", 0));
    }

    #[test]
    fn test_local_initializer_reads_outer_binding() {
        let code = "local x = 1\ndo\n  local x = x + 1\nend\n";
        let (_project, tree) = tree_for(code);
        let rhs = offset_of(code, "x + 1", 0);
        let found = tree.find_name(rhs, "x").unwrap();
        assert_eq!(found.location.start, offset_of(code, "x", 0));
    }

    #[test]
    fn test_local_function_visible_in_own_body() {
        let code = "local function fact(n)\n  return fact(n - 1)\nend\n";
        let (_project, tree) = tree_for(code);
        let call = offset_of(code, "fact(n - 1)", 0);
        let found = tree.find_name(call, "fact").unwrap();
        assert_eq!(found.kind, DeclKind::LocalFunction);
        let param = tree.find_name(call + 5, "n").unwrap();
        assert_eq!(param.kind, DeclKind::Param);
    }

    #[test]
    fn test_repeat_condition_sees_body_locals() {
        let code = "repeat\n  local done = true\nuntil done\n";
        let (_project, tree) = tree_for(code);
        let found = tree.find_name(offset_of(code, "done\n", 0), "done");
        assert!(found.is_some());
    }

    #[test]
    fn test_for_variables_scoped_to_loop() {
        let code = "for i = 1, 10 do\n  print(i)\nend\nprint(i)\n";
        let (_project, tree) = tree_for(code);
        let inside = tree.find_name(offset_of(code, "print(i)", 0) + 6, "i").unwrap();
        assert_eq!(inside.kind, DeclKind::ForVar);
        assert!(tree.find_name(offset_of(code, "print(i)", 1) + 6, "i").is_none());
    }

    #[test]
    fn test_generic_for_declares_all_names() {
        let code = "for k, v in pairs(t) do\n  print(k, v)\nend\n";
        let (_project, tree) = tree_for(code);
        let at = offset_of(code, "print", 0);
        assert!(tree.find_name(at, "k").is_some());
        assert!(tree.find_name(at, "v").is_some());
    }

    #[test]
    fn test_if_branches_are_separate_scopes() {
        let code = "if a then\n  local y = 1\nelse\n  print(y)\nend\n";
        let (_project, tree) = tree_for(code);
        assert!(tree.find_name(offset_of(code, "print(y)", 0) + 6, "y").is_none());
    }

    #[test]
    fn test_method_declares_implicit_self_and_owner() {
        let code = "local A = {}\nfunction A:get()\n  return self\nend\n";
        let (_project, tree) = tree_for(code);
        let at = offset_of(code, "return self", 0) + 7;
        let this = tree.find_name(at, "self").unwrap();
        assert!(matches!(this.ty, DeclaredType::Inferred(Thunk::SelfParam { .. })));
        let owner = tree.owner_at(at).unwrap();
        assert_eq!(owner.start, offset_of(code, "A:get", 0));
    }

    #[test]
    fn test_annotated_local_is_explicit() {
        let code = "---@type number\nlocal count\n---@class Point\nlocal Point = {}\n";
        let (_project, tree) = tree_for(code);
        let end = code.len();
        assert_eq!(tree.find_name(end, "count").unwrap().explicit_type(), Some(&ITy::NUMBER));
        assert_eq!(tree.find_name(end, "Point").unwrap().explicit_type(), Some(&ITy::class("Point")));
    }

    #[test]
    fn test_generic_definitions_visible_in_body() {
        let code = "---@generic T\n---@param x T\n---@return T\nlocal function id(x)\n  return x\nend\n";
        let (_project, tree) = tree_for(code);
        let body = offset_of(code, "return x", 0);
        assert!(tree.find_generic(body, "T").is_some());
        assert!(tree.find_generic(0, "T").is_none());
    }

    #[test]
    fn test_unused_locals() {
        let code = "local used = 1\nlocal unused = 2\nlocal _ignored = 3\nlocal function f(a, b)\n  return a\nend\nprint(used, f)\n";
        let (_project, tree) = tree_for(code);
        let mut names: Vec<&str> = tree.unused_locals().iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["b", "unused"]);
    }

    #[test]
    fn test_assignment_sites_resolve_to_local() {
        let code = "local x = 1\nif c then x = 'a' end\ny = 2\n";
        let (_project, tree) = tree_for(code);
        let decl = tree.find_name(code.len(), "x").unwrap().clone();
        assert_eq!(tree.assignments_to(&decl).count(), 1);
        assert!(tree.find_name(code.len(), "y").is_none());
    }

    #[test]
    fn test_cache_rebuilds_after_edit() {
        let mut project = Project::default();
        let id = project.set_file("a.lua", "local a = 1").expect("parse");
        let first = project.scope_tree(id).unwrap();
        let again = project.scope_tree(id).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        project.set_file("a.lua", "local b = 1").expect("parse");
        let rebuilt = project.scope_tree(id).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(rebuilt.find_name(11, "b").is_some());
    }

    #[test]
    fn test_cache_survives_poisoned_lock() {
        let mut project = Project::default();
        let id = project.set_file("test.lua", "local x = 1\n").expect("parse");
        let cache = project.scope_cache();
        let first = project.scope_tree(id).expect("scope tree");
        assert_eq!(cache.len(), 1);

        let poisoned = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = cache.trees.write().unwrap();
                    panic!("writer panicked");
                })
                .join()
        });
        assert!(poisoned.is_err());
        assert!(cache.trees.is_poisoned());

        let file = project.file(id).expect("file");
        assert!(Arc::ptr_eq(&cache.get(file), &first));
        cache.invalidate(id);
        assert!(cache.is_empty());
        assert!(!Arc::ptr_eq(&cache.get(file), &first));
        assert_eq!(cache.len(), 1);
    }
}
