//! Type values produced by inference
//!
//! `ITy` is a closed set of cases. Classes are nominal and identified by
//! name; everything known about a class beyond its name (members, superclass,
//! generic parameters) lives in the merged index entry and is looked up on
//! demand.

use std::collections::HashMap;
use std::fmt;

use crate::syntax::NodeRef;

/// Built-in Lua value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Nil => "nil",
            Primitive::Boolean => "boolean",
            Primitive::Number => "number",
            Primitive::String => "string",
            Primitive::Table => "table",
            Primitive::Function => "function",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        match name {
            "nil" | "void" => Some(Primitive::Nil),
            "boolean" | "bool" => Some(Primitive::Boolean),
            "number" | "integer" => Some(Primitive::Number),
            "string" => Some(Primitive::String),
            "table" => Some(Primitive::Table),
            "function" => Some(Primitive::Function),
            _ => None,
        }
    }
}

/// What a class name refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Declared with `@class` (or not yet resolved)
    Named,
    /// A generic parameter bound on a class or function
    GenericParam,
    /// A table constructor at a source location
    Table(NodeRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyClass {
    pub name: String,
    pub kind: ClassKind,
}

impl TyClass {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Named,
        }
    }

    pub fn generic_param(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::GenericParam,
        }
    }

    pub fn table(location: NodeRef) -> Self {
        Self {
            name: format!("table@{}:{}", location.file.0, location.start),
            kind: ClassKind::Table(location),
        }
    }

    pub fn is_generic_param(&self) -> bool {
        self.kind == ClassKind::GenericParam
    }

    pub fn table_location(&self) -> Option<&NodeRef> {
        match &self.kind {
            ClassKind::Table(location) => Some(location),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyGeneric {
    pub base: TyClass,
    pub args: Vec<ITy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunParam {
    pub name: String,
    pub ty: ITy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyFunction {
    pub params: Vec<FunParam>,
    pub variadic: bool,
    pub returns: Box<ITy>,
}

impl TyFunction {
    pub fn param(&self, index: usize) -> Option<&FunParam> {
        self.params.get(index)
    }
}

/// A deduplicated, flattened union kept sorted by display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyUnion {
    members: Vec<ITy>,
}

impl TyUnion {
    pub fn members(&self) -> &[ITy] {
        &self.members
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ITy {
    #[default]
    Unknown,
    Primitive(Primitive),
    Class(TyClass),
    Generic(TyGeneric),
    Union(TyUnion),
    Array(Box<ITy>),
    Function(TyFunction),
}

impl ITy {
    pub const NIL: ITy = ITy::Primitive(Primitive::Nil);
    pub const BOOLEAN: ITy = ITy::Primitive(Primitive::Boolean);
    pub const NUMBER: ITy = ITy::Primitive(Primitive::Number);
    pub const STRING: ITy = ITy::Primitive(Primitive::String);
    pub const TABLE: ITy = ITy::Primitive(Primitive::Table);
    pub const FUNCTION: ITy = ITy::Primitive(Primitive::Function);

    pub fn class(name: impl Into<String>) -> ITy {
        ITy::Class(TyClass::named(name))
    }

    pub fn generic_param(name: impl Into<String>) -> ITy {
        ITy::Class(TyClass::generic_param(name))
    }

    pub fn array(element: ITy) -> ITy {
        ITy::Array(Box::new(element))
    }

    pub fn generic(base: TyClass, args: Vec<ITy>) -> ITy {
        ITy::Generic(TyGeneric { base, args })
    }

    pub fn function(params: Vec<FunParam>, variadic: bool, returns: ITy) -> ITy {
        ITy::Function(TyFunction {
            params,
            variadic,
            returns: Box::new(returns),
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ITy::Unknown)
    }

    /// Create a union type, flattening nested unions and deduplicating.
    ///
    /// `Unknown` members are dropped when anything else is known, the result
    /// collapses to the single member when only one remains, and an empty
    /// candidate set is `Unknown`.
    pub fn union(types: impl IntoIterator<Item = ITy>) -> ITy {
        let mut flattened: Vec<ITy> = Vec::new();
        for ty in types {
            match ty {
                ITy::Union(inner) => {
                    for member in inner.members {
                        if !flattened.contains(&member) {
                            flattened.push(member);
                        }
                    }
                }
                ITy::Unknown => {}
                other => {
                    if !flattened.contains(&other) {
                        flattened.push(other);
                    }
                }
            }
        }

        match flattened.len() {
            0 => ITy::Unknown,
            1 => flattened.pop().unwrap_or_default(),
            _ => {
                flattened.sort_by_cached_key(|ty| (ty.to_string(), format!("{ty:?}")));
                ITy::Union(TyUnion { members: flattened })
            }
        }
    }

    /// Members of a union, or the type itself
    pub fn alternatives(&self) -> &[ITy] {
        match self {
            ITy::Union(union) => &union.members,
            other => std::slice::from_ref(other),
        }
    }

    pub fn contains_generic_params(&self) -> bool {
        match self {
            ITy::Class(class) => class.is_generic_param(),
            ITy::Generic(generic) => generic.args.iter().any(ITy::contains_generic_params),
            ITy::Union(union) => union.members.iter().any(ITy::contains_generic_params),
            ITy::Array(element) => element.contains_generic_params(),
            ITy::Function(function) => {
                function.params.iter().any(|p| p.ty.contains_generic_params())
                    || function.returns.contains_generic_params()
            }
            ITy::Unknown | ITy::Primitive(_) => false,
        }
    }

    /// Rebuild the type bottom-up, giving `f` the chance to replace every class
    pub fn map_classes(&self, f: &mut impl FnMut(&TyClass) -> Option<ITy>) -> ITy {
        match self {
            ITy::Class(class) => f(class).unwrap_or_else(|| self.clone()),
            ITy::Generic(generic) => ITy::Generic(TyGeneric {
                base: generic.base.clone(),
                args: generic.args.iter().map(|arg| arg.map_classes(f)).collect(),
            }),
            ITy::Union(union) => ITy::union(union.members.iter().map(|m| m.map_classes(f))),
            ITy::Array(element) => ITy::array(element.map_classes(f)),
            ITy::Function(function) => ITy::Function(TyFunction {
                params: function
                    .params
                    .iter()
                    .map(|p| FunParam {
                        name: p.name.clone(),
                        ty: p.ty.map_classes(f),
                    })
                    .collect(),
                variadic: function.variadic,
                returns: Box::new(function.returns.map_classes(f)),
            }),
            ITy::Unknown | ITy::Primitive(_) => self.clone(),
        }
    }

    /// Turn class references named in `params` into generic parameters
    pub fn bind_generic_names(&self, params: &[String]) -> ITy {
        if params.is_empty() {
            return self.clone();
        }
        self.map_classes(&mut |class| {
            (class.kind == ClassKind::Named && params.contains(&class.name))
                .then(|| ITy::generic_param(class.name.clone()))
        })
    }

    pub fn substitute(&self, substitution: &Substitution) -> ITy {
        if substitution.is_empty() {
            return self.clone();
        }
        self.map_classes(&mut |class| {
            if class.is_generic_param() {
                substitution.get(&class.name).cloned()
            } else {
                None
            }
        })
    }

    /// Replace every generic parameter that is still free with `Unknown`
    pub fn erase_generic_params(&self, names: &[String]) -> ITy {
        self.map_classes(&mut |class| {
            (class.is_generic_param() && names.contains(&class.name)).then_some(ITy::Unknown)
        })
    }

    /// Names of the generic parameters mentioned anywhere in the type
    pub fn generic_param_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.map_classes(&mut |class| {
            if class.is_generic_param() && !names.contains(&class.name) {
                names.push(class.name.clone());
            }
            None
        });
        names
    }

    /// Whether a value of this type may be `nil` or `false`
    pub fn is_falsy_possible(&self) -> bool {
        self.alternatives()
            .iter()
            .any(|ty| matches!(ty, ITy::Unknown | ITy::Primitive(Primitive::Nil | Primitive::Boolean)))
    }

    /// The non-nil part of the type
    pub fn without_nil(&self) -> ITy {
        match self {
            ITy::Union(union) => ITy::union(
                union
                    .members
                    .iter()
                    .filter(|ty| **ty != ITy::NIL)
                    .cloned(),
            ),
            other => other.clone(),
        }
    }
}

/// Positional mapping from generic parameter names to argument types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    map: HashMap<String, ITy>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair parameters with arguments by position; parameters without an
    /// argument map to `Unknown`.
    pub fn positional(params: &[String], args: &[ITy]) -> Self {
        let map = params
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), args.get(i).cloned().unwrap_or_default()))
            .collect();
        Self { map }
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: ITy) {
        self.map.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&ITy> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Apply `outer` to every bound type
    pub fn then(&self, outer: &Substitution) -> Substitution {
        Substitution {
            map: self
                .map
                .iter()
                .map(|(name, ty)| (name.clone(), ty.substitute(outer)))
                .collect(),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ClassKind::Table(_) => f.write_str("table"),
            _ => f.write_str(&self.name),
        }
    }
}

impl fmt::Display for TyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fun(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if param.ty.is_unknown() {
                write!(f, "{}", param.name)?;
            } else {
                write!(f, "{}: {}", param.name, param.ty)?;
            }
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;
        if *self.returns != ITy::NIL {
            write!(f, ": {}", self.returns)?;
        }
        Ok(())
    }
}

impl fmt::Display for ITy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ITy::Unknown => write!(f, "unknown"),
            ITy::Primitive(primitive) => write!(f, "{}", primitive),
            ITy::Class(class) => write!(f, "{}", class),
            ITy::Generic(generic) => {
                write!(f, "{}<", generic.base)?;
                for (i, arg) in generic.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            ITy::Union(union) => {
                for (i, member) in union.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match member {
                        ITy::Function(_) => write!(f, "({})", member)?,
                        _ => write!(f, "{}", member)?,
                    }
                }
                Ok(())
            }
            ITy::Array(element) => match element.as_ref() {
                ITy::Union(_) | ITy::Function(_) => write!(f, "({})[]", element),
                _ => write!(f, "{}[]", element),
            },
            ITy::Function(function) => write!(f, "{}", function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::FileId;

    #[test]
    fn test_union_flattens_and_dedupes() {
        let inner = ITy::union([ITy::STRING, ITy::NUMBER]);
        let ty = ITy::union([ITy::NUMBER, inner, ITy::STRING]);
        assert_eq!(ty.alternatives().len(), 2);
        assert_eq!(ty.to_string(), "number|string");
    }

    #[test]
    fn test_union_order_insignificant() {
        let a = ITy::union([ITy::class("Dog"), ITy::NIL, ITy::NUMBER]);
        let b = ITy::union([ITy::NUMBER, ITy::class("Dog"), ITy::NIL]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Dog|nil|number");
    }

    #[test]
    fn test_union_order_insignificant_for_lookalikes() {
        let table = |start| {
            ITy::Class(TyClass::table(NodeRef {
                file: FileId(0),
                start,
                end: start + 2,
                kind: 0,
            }))
        };
        let a = ITy::union([table(10), table(28)]);
        let b = ITy::union([table(28), table(10)]);
        assert_eq!(a, b);
        assert_eq!(a.alternatives().len(), 2);

        let param_first = ITy::union([ITy::generic_param("T"), ITy::class("T")]);
        let class_first = ITy::union([ITy::class("T"), ITy::generic_param("T")]);
        assert_eq!(param_first, class_first);
    }

    #[test]
    fn test_union_single_and_empty() {
        assert_eq!(ITy::union([ITy::NUMBER, ITy::NUMBER]), ITy::NUMBER);
        assert_eq!(ITy::union(Vec::new()), ITy::Unknown);
        assert_eq!(ITy::union([ITy::Unknown, ITy::STRING]), ITy::STRING);
    }

    #[test]
    fn test_display_function() {
        let ty = ITy::function(
            vec![
                FunParam {
                    name: "a".into(),
                    ty: ITy::NUMBER,
                },
                FunParam {
                    name: "b".into(),
                    ty: ITy::Unknown,
                },
            ],
            true,
            ITy::STRING,
        );
        assert_eq!(ty.to_string(), "fun(a: number, b, ...): string");

        let no_return = ITy::function(Vec::new(), false, ITy::NIL);
        assert_eq!(no_return.to_string(), "fun()");
    }

    #[test]
    fn test_display_nested_shapes() {
        let array_of_union = ITy::array(ITy::union([ITy::NUMBER, ITy::STRING]));
        assert_eq!(array_of_union.to_string(), "(number|string)[]");

        let generic = ITy::generic(
            TyClass::named("Map"),
            vec![ITy::STRING, ITy::array(ITy::class("Node"))],
        );
        assert_eq!(generic.to_string(), "Map<string, Node[]>");
    }

    #[test]
    fn test_substitute_generic_params() {
        let field = ITy::array(ITy::generic_param("T"));
        let subst = Substitution::positional(&["T".to_string()], &[ITy::NUMBER]);
        assert_eq!(field.substitute(&subst), ITy::array(ITy::NUMBER));
    }

    #[test]
    fn test_substitute_missing_argument_is_unknown() {
        let params = vec!["K".to_string(), "V".to_string()];
        let subst = Substitution::positional(&params, &[ITy::STRING]);
        assert_eq!(ITy::generic_param("V").substitute(&subst), ITy::Unknown);
        assert_eq!(ITy::generic_param("K").substitute(&subst), ITy::STRING);
    }

    #[test]
    fn test_bind_generic_names_leaves_other_classes() {
        let ty = ITy::union([ITy::class("T"), ITy::class("Node")]);
        let bound = ty.bind_generic_names(&["T".to_string()]);
        assert!(bound.contains_generic_params());
        assert!(bound.alternatives().contains(&ITy::class("Node")));
        assert_eq!(bound.generic_param_names(), vec!["T".to_string()]);
    }

    #[test]
    fn test_without_nil() {
        let ty = ITy::union([ITy::NIL, ITy::STRING]);
        assert_eq!(ty.without_nil(), ITy::STRING);
        assert!(ty.is_falsy_possible());
        assert!(!ITy::NUMBER.is_falsy_possible());
    }
}
