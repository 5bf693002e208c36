//! Per-file declaration stubs
//!
//! Everything the project-wide index knows about a file is extracted here,
//! syntactically, right after the file is parsed: class and alias
//! annotations, global assignments and the members contributed to classes.
//! No type inference happens at this stage; inferred member types are kept
//! as thunks.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::annotation::{DocComment, DocTag};
use crate::comment::DocIndex;
use crate::decl::{DeclKind, DeclaredType, Declaration, Thunk};
use crate::project::SourceFile;
use crate::scope::{AssignTarget, ScopeTree};
use crate::syntax::{NodeRef, assigned_targets, assigned_values, child_of_kind, named_children, node_text};
use crate::ty::ITy;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSite {
    pub name: String,
    pub super_class: Option<ITy>,
    pub generic_params: Vec<String>,
    pub deprecated: bool,
    pub location: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSite {
    pub decl: Declaration,
    /// Class bound to this global through a `@class` annotation
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOwner {
    Class(String),
    /// A member set on a global table; attributed to the global's class
    Global(String),
    /// A member set on a local table with no class, keyed by the local's name node
    Local(NodeRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSite {
    pub owner: MemberOwner,
    pub decl: Declaration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStubs {
    pub classes: Vec<ClassSite>,
    pub aliases: Vec<Declaration>,
    pub globals: Vec<GlobalSite>,
    pub members: Vec<MemberSite>,
}

pub fn extract(file: &SourceFile, tree: &ScopeTree) -> FileStubs {
    let mut extractor = Extractor {
        file,
        tree,
        stubs: FileStubs::default(),
        local_classes: HashMap::new(),
        global_classes: HashMap::new(),
    };
    extractor.annotations();
    extractor.globals();
    extractor.members();
    extractor
        .stubs
        .members
        .sort_by_key(|member| member.decl.location.start);
    tracing::trace!(
        file = %file.path(),
        classes = extractor.stubs.classes.len(),
        globals = extractor.stubs.globals.len(),
        members = extractor.stubs.members.len(),
        "extracted stubs"
    );
    extractor.stubs
}

struct Extractor<'a> {
    file: &'a SourceFile,
    tree: &'a ScopeTree,
    stubs: FileStubs,
    /// Local name node -> class bound by `---@class` above its declaration
    local_classes: HashMap<NodeRef, String>,
    global_classes: HashMap<String, String>,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.file.source())
    }

    fn doc(&self, node: Node<'_>) -> Option<&'a DocComment> {
        self.tree.docs().doc_for(&NodeRef::new(self.file.id(), node))
    }

    fn annotations(&mut self) {
        let tree = self.tree;
        for block in tree.docs().blocks() {
            let mut current: Option<(String, Vec<String>)> = None;
            for (index, tag) in block.doc.tags.iter().enumerate() {
                let location = block.tag_location(index);
                match tag {
                    DocTag::Class {
                        name,
                        super_class,
                        generic_params,
                    } => {
                        self.stubs.classes.push(ClassSite {
                            name: name.clone(),
                            super_class: super_class.clone(),
                            generic_params: generic_params.clone(),
                            deprecated: block.doc.is_deprecated(),
                            location,
                        });
                        current = Some((name.clone(), generic_params.clone()));
                    }
                    DocTag::Field {
                        visibility,
                        name,
                        index_ty,
                        ty,
                        ..
                    } => {
                        let Some((class, params)) = &current else {
                            continue;
                        };
                        let member_name = name.clone().unwrap_or_else(|| {
                            format!("[{}]", index_ty.clone().unwrap_or_default())
                        });
                        let decl = Declaration::new(
                            member_name,
                            DeclKind::Field,
                            DeclaredType::Explicit(ty.bind_generic_names(params)),
                            location,
                        )
                        .with_visibility(*visibility)
                        .with_index_ty(index_ty.as_ref().map(|t| t.bind_generic_names(params)));
                        self.stubs.members.push(MemberSite {
                            owner: MemberOwner::Class(class.clone()),
                            decl,
                        });
                    }
                    DocTag::Alias {
                        name,
                        generic_params,
                        ty,
                    } => {
                        let decl = Declaration::new(
                            name.clone(),
                            DeclKind::Alias,
                            DeclaredType::Explicit(ty.clone()),
                            location,
                        )
                        .with_generic_params(generic_params.clone());
                        self.stubs.aliases.push(decl);
                    }
                    _ => {}
                }
            }

            if let (Some((class, _)), Some(owner)) = (&current, block.owner) {
                self.bind_class(owner, class);
            }
        }
    }

    /// Remember which table a `---@class` block sits on, and index the
    /// fields of its constructor as class members
    fn bind_class(&mut self, owner: NodeRef, class: &str) {
        let Some(stmt) = self.file.node(&owner) else {
            return;
        };
        if !matches!(stmt.kind(), "variable_declaration" | "assignment_statement") {
            return;
        }
        let Some(target) = assigned_targets(stmt).into_iter().next() else {
            return;
        };
        if target.kind() != "identifier" {
            return;
        }
        let name = self.text(target);
        if stmt.kind() == "variable_declaration" {
            self.local_classes
                .insert(NodeRef::new(self.file.id(), target), class.to_string());
        } else {
            match self.tree.find_name(target.start_byte(), name) {
                Some(local) => {
                    self.local_classes.insert(local.location, class.to_string());
                }
                None => {
                    self.global_classes.insert(name.to_string(), class.to_string());
                }
            }
        }

        if let Some(table) = assigned_values(stmt)
            .into_iter()
            .next()
            .filter(|v| v.kind() == "table_constructor")
        {
            for field in named_children(table) {
                if let Some(decl) = constructor_field(self.file, self.tree.docs(), field) {
                    self.stubs.members.push(MemberSite {
                        owner: MemberOwner::Class(class.to_string()),
                        decl,
                    });
                }
            }
        }
    }

    fn globals(&mut self) {
        for site in self.tree.assignments() {
            let AssignTarget::Name(name) = &site.target else {
                continue;
            };
            if self.tree.find_name(site.offset, name).is_some() {
                continue;
            }
            let Some(stmt) = self.file.node(&site.stmt) else {
                continue;
            };
            let doc = self.doc(stmt);
            let explicit = doc
                .and_then(|d| d.declared_type(site.index))
                .cloned()
                .or_else(|| self.global_classes.get(name).map(ITy::class));
            let ty = match explicit {
                Some(ty) => DeclaredType::Explicit(ty),
                None => DeclaredType::Inferred(Thunk::Value {
                    stmt: site.stmt,
                    index: site.index,
                }),
            };
            let decl = Declaration::new(name.clone(), DeclKind::Global, ty, site.target_node)
                .with_deprecated(doc.is_some_and(DocComment::is_deprecated));
            self.stubs.globals.push(GlobalSite {
                decl,
                class: self.global_classes.get(name).cloned(),
            });
        }

        for site in self.tree.functions() {
            let AssignTarget::Name(name) = &site.target else {
                continue;
            };
            if self.tree.find_name(site.offset, name).is_some() {
                continue;
            }
            let doc = self.file.node(&site.node).and_then(|n| self.doc(n));
            let decl = Declaration::new(
                name.clone(),
                DeclKind::Global,
                DeclaredType::Inferred(Thunk::Function(site.node)),
                site.name_node,
            )
            .with_deprecated(doc.is_some_and(DocComment::is_deprecated))
            .with_generic_params(doc.map(DocComment::generic_params).unwrap_or_default());
            self.stubs.globals.push(GlobalSite { decl, class: None });
        }
    }

    /// Who receives a member written through `object_name` at `offset`
    fn owner_of(&self, object_name: &str, offset: usize) -> Option<MemberOwner> {
        if object_name == "self" {
            self.tree.find_name(offset, "self")?;
            let owner = self.tree.owner_at(offset)?;
            let owner_name = self.file.source().get(owner.start..owner.end)?;
            if owner_name.contains(['.', ':', '[', '(']) {
                return None;
            }
            return self.owner_of(owner_name, owner.start);
        }
        match self.tree.find_name(offset, object_name) {
            Some(local) => Some(
                self.local_classes
                    .get(&local.location)
                    .cloned()
                    .or_else(|| match local.explicit_type() {
                        Some(ITy::Class(class)) if !class.is_generic_param() => Some(class.name.clone()),
                        _ => None,
                    })
                    .map(MemberOwner::Class)
                    .unwrap_or(MemberOwner::Local(local.location)),
            ),
            None => Some(
                self.global_classes
                    .get(object_name)
                    .cloned()
                    .map(MemberOwner::Class)
                    .unwrap_or_else(|| MemberOwner::Global(object_name.to_string())),
            ),
        }
    }

    fn members(&mut self) {
        for site in self.tree.assignments() {
            let AssignTarget::Member {
                object_name: Some(object_name),
                name,
                ..
            } = &site.target
            else {
                continue;
            };
            let Some(owner) = self.owner_of(object_name, site.offset) else {
                continue;
            };
            let doc = self.file.node(&site.stmt).and_then(|stmt| self.doc(stmt));
            let ty = match doc.and_then(|d| d.declared_type(site.index)) {
                Some(ty) => DeclaredType::Explicit(ty.clone()),
                None => DeclaredType::Inferred(Thunk::Value {
                    stmt: site.stmt,
                    index: site.index,
                }),
            };
            let decl = Declaration::new(name.clone(), DeclKind::Field, ty, site.target_node)
                .with_deprecated(doc.is_some_and(DocComment::is_deprecated));
            self.stubs.members.push(MemberSite { owner, decl });
        }

        for site in self.tree.functions() {
            let AssignTarget::Member {
                object_name: Some(object_name),
                name,
                ..
            } = &site.target
            else {
                continue;
            };
            let Some(owner) = self.owner_of(object_name, site.offset) else {
                continue;
            };
            let doc = self.file.node(&site.node).and_then(|n| self.doc(n));
            let decl = Declaration::new(
                name.clone(),
                DeclKind::Method,
                DeclaredType::Inferred(Thunk::Function(site.node)),
                site.name_node,
            )
            .with_deprecated(doc.is_some_and(DocComment::is_deprecated))
            .with_generic_params(doc.map(DocComment::generic_params).unwrap_or_default());
            self.stubs.members.push(MemberSite { owner, decl });
        }
    }
}

/// A `name = value` entry of a table constructor as a member declaration
pub fn constructor_field(file: &SourceFile, docs: &DocIndex, field: Node<'_>) -> Option<Declaration> {
    if field.kind() != "field" || child_of_kind(field, "[").is_some() {
        return None;
    }
    let name = field.child_by_field_name("name")?;
    if name.kind() != "identifier" {
        return None;
    }
    let value = field.child_by_field_name("value")?;
    let doc = docs.doc_for(&NodeRef::new(file.id(), field));
    let ty = match doc.and_then(|d| d.declared_type(0)) {
        Some(ty) => DeclaredType::Explicit(ty.clone()),
        None => DeclaredType::Inferred(Thunk::Expr(NodeRef::new(file.id(), value))),
    };
    let kind = if value.kind() == "function_definition" {
        DeclKind::Method
    } else {
        DeclKind::Field
    };
    Some(
        Declaration::new(node_text(name, file.source()), kind, ty, NodeRef::new(file.id(), name))
            .with_deprecated(doc.is_some_and(DocComment::is_deprecated)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;

    fn stubs_for(code: &str) -> FileStubs {
        let mut project = Project::default();
        let id = project.set_file("test.lua", code).unwrap();
        let file = project.file(id).unwrap();
        let tree = project.scope_tree(id).unwrap();
        extract(file, &tree)
    }

    fn member_names(stubs: &FileStubs, owner: &MemberOwner) -> Vec<String> {
        stubs
            .members
            .iter()
            .filter(|m| &m.owner == owner)
            .map(|m| m.decl.name.clone())
            .collect()
    }

    #[test]
    fn test_class_fields_from_annotations() {
        let stubs = stubs_for("---@class Point\n---@field x number\n---@field private y number\nlocal Point = {}\n");
        assert_eq!(stubs.classes.len(), 1);
        assert_eq!(stubs.classes[0].name, "Point");
        assert_eq!(
            member_names(&stubs, &MemberOwner::Class("Point".into())),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_each_field_located_at_its_own_tag() {
        let code = "---@class Point\n---@field x number\n---@field y number\nlocal Point = {}\n";
        let stubs = stubs_for(code);
        let starts: Vec<usize> = stubs.members.iter().map(|m| m.decl.location.start).collect();
        assert_eq!(
            starts,
            vec![code.find("---@field x").unwrap(), code.find("---@field y").unwrap()]
        );
        assert_eq!(stubs.classes[0].location.start, 0);
    }

    #[test]
    fn test_generic_field_types_are_bound() {
        let stubs = stubs_for("---@class Box<T>\n---@field value T\n");
        let field = &stubs.members[0].decl;
        assert_eq!(field.explicit_type(), Some(&ITy::generic_param("T")));
    }

    #[test]
    fn test_methods_and_assignments_on_class_table() {
        let code = "---@class Dog\nlocal Dog = { legs = 4 }\nfunction Dog:bark() self.loud = true end\nDog.name = 'rex'\n";
        let stubs = stubs_for(code);
        assert_eq!(
            member_names(&stubs, &MemberOwner::Class("Dog".into())),
            vec!["legs", "bark", "loud", "name"]
        );
    }

    #[test]
    fn test_global_tables_collect_members() {
        let code = "Config = {}\nfunction Config.load() end\nConfig.path = '/etc'\n";
        let stubs = stubs_for(code);
        assert_eq!(stubs.globals.len(), 1);
        assert_eq!(stubs.globals[0].decl.name, "Config");
        assert_eq!(
            member_names(&stubs, &MemberOwner::Global("Config".into())),
            vec!["load", "path"]
        );
    }

    #[test]
    fn test_global_class_binding() {
        let stubs = stubs_for("---@class Animal\nAnimal = {}\nfunction Animal:speak() end\n");
        assert_eq!(stubs.globals[0].class.as_deref(), Some("Animal"));
        assert_eq!(
            stubs.globals[0].decl.explicit_type(),
            Some(&ITy::class("Animal"))
        );
        assert_eq!(
            member_names(&stubs, &MemberOwner::Class("Animal".into())),
            vec!["speak"]
        );
    }

    #[test]
    fn test_locals_are_not_globals() {
        let stubs = stubs_for("local a = 1\na = 2\nlocal function f() end\nfunction g() end\n");
        let names: Vec<&str> = stubs.globals.iter().map(|g| g.decl.name.as_str()).collect();
        assert_eq!(names, vec!["g"]);
    }

    #[test]
    fn test_local_tables_collect_members() {
        let code = "local M = { a = 1 }\nM.b = 2\nfunction M.c() end\n";
        let stubs = stubs_for(code);
        let owner = stubs.members[0].owner.clone();
        assert!(matches!(owner, MemberOwner::Local(_)));
        assert_eq!(member_names(&stubs, &owner), vec!["b", "c"]);
    }

    #[test]
    fn test_alias_stub() {
        let stubs = stubs_for("---@alias Handler fun(event: string): boolean\n");
        assert_eq!(stubs.aliases.len(), 1);
        assert_eq!(stubs.aliases[0].name, "Handler");
    }
}
