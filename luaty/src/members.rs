//! Member lookup on resolved types
//!
//! Named classes are searched along the superclass chain, substituting
//! generic arguments at every step. Anonymous tables collect their members
//! from the constructor and from later assignments to the variable holding
//! them.

use std::rc::Rc;

use crate::decl::Declaration;
use crate::index::{LuaClass, TypeDef};
use crate::infer;
use crate::scope::ScopeTree;
use crate::search::{GuardKey, SearchContext};
use crate::stubs;
use crate::syntax::{NodeRef, SyntaxNode, assigned_targets, named_children, string_content};
use crate::ty::{ClassKind, ITy, Primitive, Substitution, TyClass};

/// A member found on a type
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMatch {
    pub decl: Declaration,
    /// The class (or table) the member was found on
    pub owner: ITy,
    pub ty: ITy,
}

pub fn find_member(ctx: &SearchContext<'_>, object: &ITy, name: &str) -> Option<MemberMatch> {
    match object {
        ITy::Union(union) => {
            let found: Vec<MemberMatch> = union
                .members()
                .iter()
                .filter_map(|alternative| find_member(ctx, alternative, name))
                .collect();
            let first = found.first()?.clone();
            Some(MemberMatch {
                ty: ITy::union(found.into_iter().map(|m| m.ty)),
                ..first
            })
        }
        ITy::Class(class) => match &class.kind {
            ClassKind::Named => class_member(ctx, &class.name, &[], name),
            ClassKind::Table(location) => table_member(ctx, *location, name),
            ClassKind::GenericParam => None,
        },
        ITy::Generic(generic) if generic.base.name != "table" => {
            class_member(ctx, &generic.base.name, &generic.args, name)
        }
        ITy::Primitive(primitive) if *primitive != Primitive::Table => {
            class_member(ctx, primitive.name(), &[], name)
        }
        _ => None,
    }
}

/// One class on a superclass chain, with the arguments it was reached with
struct ChainLink {
    class: Rc<LuaClass>,
    owner: ITy,
    substitution: Substitution,
}

/// `class_name` followed by its superclasses, generic arguments carried
/// down each step; stops at the first class seen twice
fn class_chain(ctx: &SearchContext<'_>, class_name: &str, args: &[ITy]) -> Vec<ChainLink> {
    let mut chain: Vec<ChainLink> = Vec::new();
    let mut current = Some((class_name.to_string(), args.to_vec()));
    while let Some((name, args)) = current.take() {
        if chain.iter().any(|link| link.class.name == name) {
            tracing::debug!(class = %name, "cyclic superclass chain");
            break;
        }
        let Some(class) = ctx.find_class(&name) else {
            break;
        };
        let substitution = Substitution::positional(&class.generic_params, &args);
        current = match class.super_class.as_ref().map(|ty| ty.substitute(&substitution)) {
            Some(ITy::Class(TyClass {
                name: super_name,
                kind: ClassKind::Named,
            })) => Some((super_name, Vec::new())),
            Some(ITy::Generic(generic)) => Some((generic.base.name, generic.args)),
            _ => None,
        };
        let owner = if args.is_empty() {
            ITy::class(name)
        } else {
            ITy::generic(TyClass::named(name), args)
        };
        chain.push(ChainLink {
            class,
            owner,
            substitution,
        });
    }
    chain
}

/// Walk `class_name` and its superclasses until one declares `name`, then
/// fall back to a `[string]` indexer
fn class_member(ctx: &SearchContext<'_>, class_name: &str, args: &[ITy], name: &str) -> Option<MemberMatch> {
    let chain = class_chain(ctx, class_name, args);
    if chain.is_empty() {
        let Some(TypeDef::Alias(alias)) = ctx.find_type(class_name) else {
            return None;
        };
        let _token = ctx.enter(GuardKey::Alias(class_name.to_string()))?;
        let written = alias.explicit_type().cloned().unwrap_or_default();
        let expanded = crate::generics::resolve_annotation(ctx, &written, alias.location)
            .substitute(&Substitution::positional(&alias.generic_params, args));
        return find_member(ctx, &expanded, name);
    }

    for link in &chain {
        if let Some(decl) = link.class.member(name) {
            let ty = infer::declaration_type(ctx, decl).substitute(&link.substitution);
            return Some(MemberMatch {
                decl: decl.clone(),
                owner: link.owner.clone(),
                ty,
            });
        }
    }
    indexer_member(ctx, &chain, &ITy::STRING)
}

/// The indexer along `chain` whose key type accepts `key`, preferring the
/// narrowest key type and then the most derived class
fn indexer_member(ctx: &SearchContext<'_>, chain: &[ChainLink], key: &ITy) -> Option<MemberMatch> {
    let candidates: Vec<(&ChainLink, &Declaration, ITy)> = chain
        .iter()
        .flat_map(move |link| {
            link.class.indexers.iter().filter_map(move |decl| {
                let index_ty = decl.index_ty.as_ref()?.substitute(&link.substitution);
                infer::is_assignable(ctx, key, &index_ty).then_some((link, decl, index_ty))
            })
        })
        .collect();
    let (link, decl, _) = candidates
        .iter()
        .find(|(_, _, index_ty)| {
            candidates
                .iter()
                .all(|(_, _, other)| infer::is_assignable(ctx, index_ty, other))
        })
        .or_else(|| candidates.first())?;
    Some(MemberMatch {
        decl: (*decl).clone(),
        owner: link.owner.clone(),
        ty: infer::declaration_type(ctx, decl).substitute(&link.substitution),
    })
}

fn table_member(ctx: &SearchContext<'_>, location: NodeRef, name: &str) -> Option<MemberMatch> {
    let project = ctx.project();
    let table = project.node(&location)?;
    let tree = project.scope_tree(location.file)?;
    let owner = ITy::Class(TyClass::table(location));

    let decl = holder_member(ctx, &tree, table, name).or_else(|| {
        named_children(table.node)
            .into_iter()
            .filter_map(|field| stubs::constructor_field(table.file, tree.docs(), field))
            .filter(|decl| decl.name == name)
            .last()
    })?;
    let ty = infer::declaration_type(ctx, &decl);
    Some(MemberMatch { decl, owner, ty })
}

/// A member assigned through the variable the table constructor is stored in
fn holder_member(
    ctx: &SearchContext<'_>,
    tree: &ScopeTree,
    table: SyntaxNode<'_>,
    name: &str,
) -> Option<Declaration> {
    let list = table.parent().filter(|p| p.kind() == "expression_list")?;
    let mut stmt = list.parent()?;
    if stmt.kind() == "assignment_statement" {
        if let Some(decl) = stmt.parent().filter(|p| p.kind() == "variable_declaration") {
            stmt = decl;
        }
    }
    let index = list
        .named_children()
        .iter()
        .position(|value| value.node.id() == table.node.id())?;
    let target = assigned_targets(stmt.node).into_iter().nth(index)?;
    if target.kind() != "identifier" {
        return None;
    }
    let target = stmt.with(target);
    let names = ctx.index();
    let members = if stmt.kind() == "variable_declaration" {
        names.local_members(target.node_ref())
    } else {
        match tree.find_name(target.start(), target.text()) {
            Some(local) => names.local_members(local.location),
            None => names.global_members(target.text()),
        }
    };
    members.get(name).cloned()
}

/// Type of `object[key]`
pub fn index_type(ctx: &SearchContext<'_>, object: &ITy, key: SyntaxNode<'_>) -> ITy {
    if let Some(field) = string_content(key.node, key.file.source()) {
        if let Some(found) = find_member(ctx, object, &field) {
            return found.ty;
        }
    }
    let key_ty = infer::guess_type(ctx, key);
    element_type(ctx, object, &key_ty)
}

/// Type of the values stored under keys of type `key` in `object`
pub fn element_type(ctx: &SearchContext<'_>, object: &ITy, key: &ITy) -> ITy {
    match object {
        ITy::Union(union) => ITy::union(
            union
                .members()
                .iter()
                .map(|alternative| element_type(ctx, alternative, key)),
        ),
        ITy::Array(element) => element.as_ref().clone(),
        ITy::Generic(generic) if generic.base.name == "table" => {
            generic.args.get(1).cloned().unwrap_or_default()
        }
        ITy::Generic(generic) => indexer_type(ctx, &generic.base.name, &generic.args, key),
        ITy::Class(class) => match &class.kind {
            ClassKind::Named => indexer_type(ctx, &class.name, &[], key),
            ClassKind::Table(location) => positional_type(ctx, *location),
            ClassKind::GenericParam => ITy::Unknown,
        },
        _ => ITy::Unknown,
    }
}

/// Value type of the `@field [K] V` entry whose key type accepts `key`
fn indexer_type(ctx: &SearchContext<'_>, class_name: &str, args: &[ITy], key: &ITy) -> ITy {
    let chain = class_chain(ctx, class_name, args);
    indexer_member(ctx, &chain, key)
        .map(|found| found.ty)
        .unwrap_or_default()
}

/// Union of the positional values of a table constructor
fn positional_type(ctx: &SearchContext<'_>, location: NodeRef) -> ITy {
    let Some(table) = ctx.project().node(&location) else {
        return ITy::Unknown;
    };
    let values = table
        .named_children()
        .into_iter()
        .filter(|field| field.kind() == "field" && field.field("name").is_none())
        .filter_map(|field| field.field("value"))
        .map(|value| infer::guess_type(ctx, value))
        .collect::<Vec<_>>();
    ITy::union(values)
}

/// Every member visible on a type, own members first
pub fn all_members(ctx: &SearchContext<'_>, object: &ITy) -> Vec<Declaration> {
    let mut seen = Vec::new();
    let mut members = Vec::new();
    let mut current = match object {
        ITy::Class(class) if class.kind == ClassKind::Named => Some(class.name.clone()),
        ITy::Generic(generic) => Some(generic.base.name.clone()),
        _ => None,
    };
    while let Some(name) = current.take() {
        if seen.contains(&name) {
            break;
        }
        let Some(class) = ctx.find_class(&name) else {
            break;
        };
        for decl in class.members.values() {
            if !members.iter().any(|m: &Declaration| m.name == decl.name) {
                members.push(decl.clone());
            }
        }
        current = match &class.super_class {
            Some(ITy::Class(class)) => Some(class.name.clone()),
            Some(ITy::Generic(generic)) => Some(generic.base.name.clone()),
            _ => None,
        };
        seen.push(name);
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;

    fn project(code: &str) -> Project {
        let mut project = Project::default();
        project.set_file("a.lua", code).unwrap();
        project
    }

    #[test]
    fn test_member_through_superclass() {
        let project = project("---@class Animal\n---@field name string\n---@class Dog : Animal\n---@field breed string\n");
        let ctx = project.search_context();
        let found = find_member(&ctx, &ITy::class("Dog"), "name").unwrap();
        assert_eq!(found.ty, ITy::STRING);
        assert_eq!(found.owner, ITy::class("Animal"));
        assert!(find_member(&ctx, &ITy::class("Dog"), "missing").is_none());
    }

    #[test]
    fn test_cyclic_superclasses_terminate() {
        let project = project("---@class A : B\n---@class B : A\n---@field x number\n");
        let ctx = project.search_context();
        assert!(find_member(&ctx, &ITy::class("A"), "y").is_none());
        assert_eq!(find_member(&ctx, &ITy::class("A"), "x").unwrap().ty, ITy::NUMBER);
        assert_eq!(ctx.in_flight_count(), 0);
    }

    #[test]
    fn test_self_referential_field() {
        let project = project("---@class Node\n---@field next Node\n");
        let ctx = project.search_context();
        let found = find_member(&ctx, &ITy::class("Node"), "next").unwrap();
        assert_eq!(found.ty, ITy::class("Node"));
    }

    #[test]
    fn test_generic_arguments_substituted_through_super() {
        let code = "---@class Base<T>\n---@field value T\n\n---@class Box<T> : Base<T>\n";
        let project = project(code);
        let ctx = project.search_context();
        let boxed = ITy::generic(TyClass::named("Box"), vec![ITy::NUMBER]);
        assert_eq!(find_member(&ctx, &boxed, "value").unwrap().ty, ITy::NUMBER);
        let raw = find_member(&ctx, &ITy::class("Box"), "value").unwrap();
        assert_eq!(raw.ty, ITy::Unknown);
    }

    #[test]
    fn test_union_members_are_joined() {
        let code = "---@class A\n---@field v number\n\n---@class B\n---@field v string\n";
        let project = project(code);
        let ctx = project.search_context();
        let either = ITy::union([ITy::class("A"), ITy::class("B")]);
        assert_eq!(find_member(&ctx, &either, "v").unwrap().ty.to_string(), "number|string");
    }

    #[test]
    fn test_indexer_and_array_elements() {
        let project = project("---@class Map\n---@field [string] number\n");
        let ctx = project.search_context();
        assert_eq!(element_type(&ctx, &ITy::class("Map"), &ITy::STRING), ITy::NUMBER);
        assert_eq!(element_type(&ctx, &ITy::array(ITy::STRING), &ITy::NUMBER), ITy::STRING);
    }

    #[test]
    fn test_indexer_key_must_match() {
        let project = project("---@class Map\n---@field [string] number\n");
        let ctx = project.search_context();
        assert_eq!(element_type(&ctx, &ITy::class("Map"), &ITy::BOOLEAN), ITy::Unknown);
    }

    #[test]
    fn test_inherited_indexers_prefer_narrowest_key() {
        let code = "---@class Base\n---@field [string] number\n\n---@class D : Base\n---@field [string|number] boolean\n\n---@class E : Base\n";
        let project = project(code);
        let ctx = project.search_context();
        assert_eq!(element_type(&ctx, &ITy::class("E"), &ITy::STRING), ITy::NUMBER);
        assert_eq!(element_type(&ctx, &ITy::class("D"), &ITy::STRING), ITy::NUMBER);
        assert_eq!(element_type(&ctx, &ITy::class("D"), &ITy::NUMBER), ITy::BOOLEAN);
    }

    #[test]
    fn test_string_indexer_answers_unknown_names() {
        let code = "---@class Map\n---@field [string] number\n\n---@class List\n---@field [number] string\n";
        let project = project(code);
        let ctx = project.search_context();
        let found = find_member(&ctx, &ITy::class("Map"), "anything").unwrap();
        assert_eq!(found.ty, ITy::NUMBER);
        assert_eq!(found.owner, ITy::class("Map"));
        assert!(find_member(&ctx, &ITy::class("List"), "anything").is_none());
    }

    #[test]
    fn test_all_members_include_inherited() {
        let project = project("---@class Animal\n---@field name string\n---@class Dog : Animal\n---@field breed string\n");
        let ctx = project.search_context();
        let names: Vec<String> = all_members(&ctx, &ITy::class("Dog"))
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["breed", "name"]);
    }
}
