//! Project-wide index of classes, aliases and globals by short name
//!
//! The index holds one [`FileStubs`] per file and merges them on lookup.
//! Edits replace a file's stubs in a fresh snapshot, so readers holding the
//! previous `Arc` keep a consistent view.
//!
//! Merging a class across its sites follows file order, then position:
//! members are combined, a later site overrides an earlier member of the
//! same name, and an annotated member is never replaced by an inferred one.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::decl::Declaration;
use crate::stubs::{FileStubs, MemberOwner};
use crate::syntax::{FileId, NodeRef};
use crate::ty::{ITy, TyClass};

/// A class merged from every file that declares or extends it
#[derive(Debug, Clone, PartialEq)]
pub struct LuaClass {
    pub name: String,
    pub super_class: Option<ITy>,
    pub generic_params: Vec<String>,
    pub deprecated: bool,
    pub members: IndexMap<String, Declaration>,
    /// `@field [K] V` entries
    pub indexers: Vec<Declaration>,
    /// Every `@class` annotation for this name
    pub sites: Vec<NodeRef>,
}

impl LuaClass {
    pub fn member(&self, name: &str) -> Option<&Declaration> {
        self.members.get(name)
    }

    /// The class as a type, with its own parameters as arguments
    pub fn as_type(&self) -> ITy {
        if self.generic_params.is_empty() {
            ITy::class(self.name.clone())
        } else {
            ITy::generic(
                TyClass::named(self.name.clone()),
                self.generic_params
                    .iter()
                    .map(|p| ITy::generic_param(p.clone()))
                    .collect(),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Class(LuaClass),
    Alias(Declaration),
}

#[derive(Debug, Clone, Default)]
pub struct ShortNamesIndex {
    files: BTreeMap<FileId, Arc<FileStubs>>,
}

impl ShortNamesIndex {
    /// A new snapshot with `file`'s stubs replaced
    pub fn with_file(&self, file: FileId, stubs: FileStubs) -> ShortNamesIndex {
        let mut files = self.files.clone();
        files.insert(file, Arc::new(stubs));
        ShortNamesIndex { files }
    }

    pub fn without_file(&self, file: FileId) -> ShortNamesIndex {
        let mut files = self.files.clone();
        files.remove(&file);
        ShortNamesIndex { files }
    }

    pub fn stubs(&self, file: FileId) -> Option<&FileStubs> {
        self.files.get(&file).map(Arc::as_ref)
    }

    pub fn find_class(&self, name: &str) -> Option<LuaClass> {
        let mut class: Option<LuaClass> = None;
        for stubs in self.files.values() {
            for site in stubs.classes.iter().filter(|site| site.name == name) {
                let merged = class.get_or_insert_with(|| LuaClass {
                    name: name.to_string(),
                    super_class: None,
                    generic_params: Vec::new(),
                    deprecated: false,
                    members: IndexMap::new(),
                    indexers: Vec::new(),
                    sites: Vec::new(),
                });
                if site.super_class.is_some() {
                    merged.super_class = site.super_class.clone();
                }
                if !site.generic_params.is_empty() {
                    merged.generic_params = site.generic_params.clone();
                }
                merged.deprecated |= site.deprecated;
                merged.sites.push(site.location);
            }
        }
        let mut class = class?;
        class.super_class = class
            .super_class
            .map(|ty| ty.bind_generic_names(&class.generic_params));

        let bound_globals: Vec<String> = self
            .files
            .values()
            .flat_map(|stubs| stubs.globals.iter())
            .filter(|global| global.class.as_deref() == Some(name))
            .map(|global| global.decl.name.clone())
            .collect();

        for stubs in self.files.values() {
            for member in &stubs.members {
                let belongs = match &member.owner {
                    MemberOwner::Class(owner) => owner == name,
                    MemberOwner::Global(global) => bound_globals.contains(global),
                    MemberOwner::Local(_) => false,
                };
                if !belongs {
                    continue;
                }
                if member.decl.index_ty.is_some() {
                    class.indexers.push(member.decl.clone());
                    continue;
                }
                match class.members.get(&member.decl.name) {
                    Some(existing) if existing.is_explicit() && !member.decl.is_explicit() => {}
                    Some(existing) => {
                        tracing::debug!(
                            class = name,
                            member = %member.decl.name,
                            previous = ?existing.location,
                            "member redefined, later site wins"
                        );
                        class
                            .members
                            .insert(member.decl.name.clone(), member.decl.clone());
                    }
                    None => {
                        class
                            .members
                            .insert(member.decl.name.clone(), member.decl.clone());
                    }
                }
            }
        }
        Some(class)
    }

    /// Class or alias named `name`; classes shadow aliases
    pub fn find_type(&self, name: &str) -> Option<TypeDef> {
        if let Some(class) = self.find_class(name) {
            return Some(TypeDef::Class(class));
        }
        self.files
            .values()
            .flat_map(|stubs| stubs.aliases.iter())
            .filter(|alias| alias.name == name)
            .last()
            .cloned()
            .map(TypeDef::Alias)
    }

    /// Every assignment site of the global `name`, in file order
    pub fn find_globals(&self, name: &str) -> Vec<Declaration> {
        self.files
            .values()
            .flat_map(|stubs| stubs.globals.iter())
            .filter(|global| global.decl.name == name)
            .map(|global| global.decl.clone())
            .collect()
    }

    /// Members written onto the global table `name` outside any class
    pub fn global_members(&self, name: &str) -> IndexMap<String, Declaration> {
        let mut members = IndexMap::new();
        for stubs in self.files.values() {
            for member in &stubs.members {
                if member.owner == MemberOwner::Global(name.to_string()) {
                    members.insert(member.decl.name.clone(), member.decl.clone());
                }
            }
        }
        members
    }

    /// Members written onto the class-less local whose name node is `local`
    pub fn local_members(&self, local: NodeRef) -> IndexMap<String, Declaration> {
        let mut members = IndexMap::new();
        if let Some(stubs) = self.files.get(&local.file) {
            for member in &stubs.members {
                if member.owner == MemberOwner::Local(local) {
                    members.insert(member.decl.name.clone(), member.decl.clone());
                }
            }
        }
        members
    }

    /// Sorted, deduplicated names of every declared class
    pub fn all_class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .values()
            .flat_map(|stubs| stubs.classes.iter().map(|site| site.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .values()
            .flat_map(|stubs| stubs.globals.iter().map(|g| g.decl.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
