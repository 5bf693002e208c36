//! Declaration sites
//!
//! Every place that introduces a name (a local, a parameter, a class field,
//! a global assignment) is described by the same [`Declaration`] struct. Its
//! type is either written down in an annotation or left as a [`Thunk`] that
//! the resolver evaluates on demand.

use crate::annotation::Visibility;
use crate::syntax::NodeRef;
use crate::ty::ITy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Local,
    Param,
    LocalFunction,
    ForVar,
    Global,
    Field,
    Method,
    Class,
    Alias,
    GenericParam,
}

/// How to compute a type that was not annotated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Thunk {
    /// The `index`-th value assigned by a declaration or assignment statement
    Value { stmt: NodeRef, index: usize },
    /// The type of an expression
    Expr(NodeRef),
    /// The `index`-th parameter of a function
    Param { function: NodeRef, index: usize },
    /// The implicit `self` of a `function A:m()` method
    SelfParam { function: NodeRef },
    /// The `index`-th variable of a `for` clause
    ForVar { stmt: NodeRef, index: usize },
    /// A function declaration or definition
    Function(NodeRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Explicit(ITy),
    Inferred(Thunk),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub ty: DeclaredType,
    pub visibility: Visibility,
    pub deprecated: bool,
    pub generic_params: Vec<String>,
    /// Key type of an indexer field (`@field [string] number`)
    pub index_ty: Option<ITy>,
    /// The name node for code declarations, the comment for annotations
    pub location: NodeRef,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: DeclKind, ty: DeclaredType, location: NodeRef) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            visibility: Visibility::Public,
            deprecated: false,
            generic_params: Vec::new(),
            index_ty: None,
            location,
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.ty, DeclaredType::Explicit(_))
    }

    pub fn explicit_type(&self) -> Option<&ITy> {
        match &self.ty {
            DeclaredType::Explicit(ty) => Some(ty),
            DeclaredType::Inferred(_) => None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_generic_params(mut self, params: Vec<String>) -> Self {
        self.generic_params = params;
        self
    }

    pub fn with_index_ty(mut self, index_ty: Option<ITy>) -> Self {
        self.index_ty = index_ty;
        self
    }
}
