//! Checks run over every loaded file

use std::collections::HashSet;

use luaty::scope::{AssignTarget, ScopeTree};
use luaty::{
    DeclKind, FileId, ITy, MemberMatch, Project, SearchContext, SyntaxNode, Visibility, declaration_type, find_member,
    find_owner, guess_type, is_assignable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    /// 0-based
    pub line: usize,
    /// 0-based
    pub column: usize,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
}

/// Every diagnostic in the project, ordered by file and position
pub fn run(project: &Project) -> Vec<Diagnostic> {
    let ctx = project.search_context();
    let mut diagnostics = Vec::new();
    for file in project.files() {
        unused_locals(project, file.id(), &mut diagnostics);
        shadowed_generics(&ctx, file.id(), &mut diagnostics);
        member_access(&ctx, file.root_node(), &mut diagnostics);
    }
    illegal_overrides(&ctx, &mut diagnostics);
    global_can_be_local(project, &mut diagnostics);
    diagnostics.sort_by(|a, b| (&a.path, a.line, a.column).cmp(&(&b.path, b.line, b.column)));
    diagnostics.dedup();
    diagnostics
}

fn diagnostic(
    project: &Project,
    file: FileId,
    offset: usize,
    severity: Severity,
    code: &'static str,
    message: String,
) -> Option<Diagnostic> {
    let file = project.file(file)?;
    let (line, column) = file.line_col(offset);
    Some(Diagnostic {
        path: file.path().to_string(),
        line,
        column,
        severity,
        code,
        message,
    })
}

fn unused_locals(project: &Project, file: FileId, out: &mut Vec<Diagnostic>) {
    let Some(tree) = project.scope_tree(file) else {
        return;
    };
    for decl in tree.unused_locals() {
        let what = if decl.kind == DeclKind::Param { "parameter" } else { "local" };
        out.extend(diagnostic(
            project,
            file,
            decl.location.start,
            Severity::Warning,
            "unused-local",
            format!("unused {what} `{}`", decl.name),
        ));
    }
}

/// Globals assigned in one file that no other file reads or assigns
fn global_can_be_local(project: &Project, out: &mut Vec<Diagnostic>) {
    let uses: Vec<(FileId, HashSet<String>)> = project
        .files()
        .filter_map(|file| Some((file.id(), global_uses(&*project.scope_tree(file.id())?))))
        .collect();

    for (file, _) in &uses {
        let Some(tree) = project.scope_tree(*file) else {
            continue;
        };
        let mut reported = HashSet::new();
        for site in tree.assignments() {
            let AssignTarget::Name(name) = &site.target else {
                continue;
            };
            if tree.find_name(site.offset, name).is_some() || !reported.insert(name.clone()) {
                continue;
            }
            let used_elsewhere = uses
                .iter()
                .any(|(other, names)| other != file && names.contains(name));
            if !used_elsewhere {
                out.extend(diagnostic(
                    project,
                    *file,
                    site.target_node.start,
                    Severity::Warning,
                    "global-can-be-local",
                    format!("global `{name}` can be local"),
                ));
            }
        }
    }
}

/// Names a file reads, assigns or declares as globals
fn global_uses(tree: &ScopeTree) -> HashSet<String> {
    let is_global = |offset: usize, name: &str| tree.find_name(offset, name).is_none();
    let mut names: HashSet<String> = tree
        .references()
        .iter()
        .filter(|reference| is_global(reference.offset, &reference.name))
        .map(|reference| reference.name.clone())
        .collect();
    for site in tree.assignments() {
        if let AssignTarget::Name(name) = &site.target {
            if is_global(site.offset, name) {
                names.insert(name.clone());
            }
        }
    }
    for site in tree.functions() {
        if let AssignTarget::Name(name) = &site.target {
            if is_global(site.offset, name) {
                names.insert(name.clone());
            }
        }
    }
    names
}

/// `@generic T` on a function nested where `T` already names a generic
fn shadowed_generics(ctx: &SearchContext<'_>, file: FileId, out: &mut Vec<Diagnostic>) {
    let project = ctx.project();
    let Some(tree) = project.scope_tree(file) else {
        return;
    };
    let scopes = tree.scopes();
    for scope in scopes.iter().filter(|scope| !scope.generics.is_empty()) {
        let mut outer: Vec<String> = Vec::new();
        let mut parent = scope.parent;
        while let Some(id) = parent {
            let Some(enclosing) = scopes.get(id) else {
                break;
            };
            outer.extend(enclosing.generics.iter().map(|g| g.name.clone()));
            parent = enclosing.parent;
        }
        if let Some(class) = scope
            .owner
            .and_then(|owner| project.node(&owner))
            .and_then(|owner| class_name(&guess_type(ctx, owner)))
            .and_then(|name| ctx.find_class(&name))
        {
            outer.extend(class.generic_params.iter().cloned());
        }

        for generic in &scope.generics {
            if outer.contains(&generic.name) {
                out.extend(diagnostic(
                    project,
                    file,
                    generic.location.start,
                    Severity::Warning,
                    "generic-shadowed",
                    format!("generic parameter `{}` shadows an outer definition", generic.name),
                ));
            }
        }
    }
}

/// Reads of deprecated members and of private or protected members from
/// outside their class
fn member_access(ctx: &SearchContext<'_>, node: SyntaxNode<'_>, out: &mut Vec<Diagnostic>) {
    for child in node.named_children() {
        member_access(ctx, child, out);
    }
    let name = match node.kind() {
        "dot_index_expression" => node.field("field"),
        "method_index_expression" => node.field("method"),
        _ => return,
    };
    let (Some(name), Some(object)) = (name, node.field("table")) else {
        return;
    };
    if is_definition_target(node) {
        return;
    }
    let object_ty = guess_type(ctx, object);
    if object_ty.is_unknown() {
        return;
    }
    let Some(found) = find_member(ctx, &object_ty, name.text()) else {
        return;
    };

    let project = ctx.project();
    let file = node.file_id();
    if found.decl.deprecated {
        out.extend(diagnostic(
            project,
            file,
            name.start(),
            Severity::Warning,
            "deprecated",
            format!("`{}` is deprecated", name.text()),
        ));
    }
    if !can_access(ctx, node, &found) {
        out.extend(diagnostic(
            project,
            file,
            name.start(),
            Severity::Error,
            "member-visibility",
            format!(
                "`{}` is {} in `{}`",
                name.text(),
                found.decl.visibility.as_str(),
                found.owner
            ),
        ));
    }
}

/// `A.x = ...` and `function A:m()` define members rather than read them
fn is_definition_target(node: SyntaxNode<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "variable_list" => true,
        "function_declaration" => parent
            .field("name")
            .is_some_and(|name| name.node.id() == node.node.id()),
        _ => false,
    }
}

fn can_access(ctx: &SearchContext<'_>, at: SyntaxNode<'_>, found: &MemberMatch) -> bool {
    let required = match found.decl.visibility {
        Visibility::Public | Visibility::Package => return true,
        visibility => visibility,
    };
    let Some(member_class) = class_name(&found.owner) else {
        return true;
    };
    let Some(context_class) = find_owner(ctx, at).and_then(|owner| class_name(&owner)) else {
        return false;
    };
    match required {
        Visibility::Private => context_class == member_class,
        _ => is_assignable(ctx, &ITy::class(context_class), &ITy::class(member_class)),
    }
}

/// Class members whose type is incompatible with the member they override
fn illegal_overrides(ctx: &SearchContext<'_>, out: &mut Vec<Diagnostic>) {
    let project = ctx.project();
    for name in ctx.index().all_class_names() {
        let Some(class) = ctx.find_class(&name) else {
            continue;
        };
        let Some(super_ty) = &class.super_class else {
            continue;
        };
        for decl in class.members.values() {
            if !decl.is_explicit() && decl.kind != DeclKind::Method {
                continue;
            }
            let Some(overridden) = find_member(ctx, super_ty, &decl.name) else {
                continue;
            };
            if !overridden.decl.is_explicit() && overridden.decl.kind != DeclKind::Method {
                continue;
            }
            let own = declaration_type(ctx, decl);
            if !is_assignable(ctx, &own, &overridden.ty) {
                out.extend(diagnostic(
                    project,
                    decl.location.file,
                    decl.location.start,
                    Severity::Error,
                    "illegal-override",
                    format!(
                        "`{name}.{}` of type `{own}` cannot override `{}` of type `{}`",
                        decl.name, overridden.owner, overridden.ty
                    ),
                ));
            }
        }
    }
}

fn class_name(ty: &ITy) -> Option<String> {
    match ty {
        ITy::Class(class) if !class.is_generic_param() && class.table_location().is_none() => {
            Some(class.name.clone())
        }
        ITy::Generic(generic) => Some(generic.base.name.clone()),
        _ => None,
    }
}
