mod builtins;
mod comment;
mod generics;
mod incremental;
mod stubs;

pub mod annotation;
pub mod config;
pub mod decl;
pub mod index;
pub mod infer;
pub mod members;
pub mod project;
pub mod scope;
pub mod search;
pub mod syntax;
pub mod ty;

pub use annotation::{AnnotationError, DocComment, DocTag, Visibility, parse_tag, parse_type};
pub use comment::{DocBlock, DocIndex};
pub use config::ResolveOptions;
pub use decl::{DeclKind, DeclaredType, Declaration, Thunk};
pub use generics::resolve_annotation;
pub use incremental::IncrementalParser;
pub use index::{LuaClass, ShortNamesIndex, TypeDef};
pub use infer::{
    declaration_type, guess_index_type, guess_parent_type, guess_return_type, guess_type, is_assignable,
    resolve_declaration,
};
pub use members::{MemberMatch, find_member};
pub use project::{Project, ProjectError, SourceFile};
pub use scope::{Scope, ScopeTree, ScopeType, find_name, find_owner};
pub use search::{CancellationToken, GuardKey, ResolveError, SearchContext};
pub use stubs::{ClassSite, FileStubs, GlobalSite, MemberOwner, MemberSite};
pub use syntax::{FileId, NodeRef, SyntaxNode};
pub use ty::{ClassKind, FunParam, ITy, Primitive, Substitution, TyClass, TyFunction, TyGeneric, TyUnion};

/// Type of the expression starting at `offset` in `path`
pub fn type_at(project: &Project, path: &str, offset: usize) -> Option<ITy> {
    let node = project.node_at(path, offset)?;
    let ctx = project.search_context().with_origin(node);
    Some(guess_type(&ctx, node))
}
