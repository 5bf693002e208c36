//! Resolving annotation types in context and binding generic parameters
//!
//! Annotation text is parsed without knowing what its names refer to. A name
//! written in `---@param x T` may be a function's `@generic`, a parameter of
//! the enclosing class, `self`, a class or an alias. [`resolve_annotation`]
//! settles that at the position the annotation applies to.

use crate::index::TypeDef;
use crate::infer;
use crate::scope;
use crate::search::{GuardKey, SearchContext};
use crate::syntax::NodeRef;
use crate::ty::{ClassKind, FunParam, ITy, Substitution, TyClass};

pub fn resolve_annotation(ctx: &SearchContext<'_>, ty: &ITy, at: NodeRef) -> ITy {
    match ty {
        ITy::Class(class) if class.kind == ClassKind::Named => {
            resolve_name(ctx, &class.name, &[], at).unwrap_or_else(|| ty.clone())
        }
        ITy::Generic(generic) => {
            let args: Vec<ITy> = generic
                .args
                .iter()
                .map(|arg| resolve_annotation(ctx, arg, at))
                .collect();
            resolve_name(ctx, &generic.base.name, &args, at)
                .unwrap_or_else(|| ITy::generic(generic.base.clone(), args))
        }
        ITy::Union(union) => ITy::union(
            union
                .members()
                .iter()
                .map(|member| resolve_annotation(ctx, member, at)),
        ),
        ITy::Array(element) => ITy::array(resolve_annotation(ctx, element, at)),
        ITy::Function(function) => ITy::function(
            function
                .params
                .iter()
                .map(|param| FunParam {
                    name: param.name.clone(),
                    ty: resolve_annotation(ctx, &param.ty, at),
                })
                .collect(),
            function.variadic,
            resolve_annotation(ctx, &function.returns, at),
        ),
        ITy::Unknown | ITy::Primitive(_) | ITy::Class(_) => ty.clone(),
    }
}

/// What `name` means at `at`; `None` keeps the written class reference
fn resolve_name(ctx: &SearchContext<'_>, name: &str, args: &[ITy], at: NodeRef) -> Option<ITy> {
    let tree = ctx.project().scope_tree(at.file);
    if args.is_empty() {
        if let Some(tree) = &tree {
            if tree.find_generic(at.start, name).is_some() {
                return Some(ITy::generic_param(name));
            }
        }
        if owner_generic_params(ctx, at).iter().any(|p| p == name) {
            return Some(ITy::generic_param(name));
        }
        if name == "self" {
            let node = ctx.project().node(&at)?;
            return scope::find_owner(ctx, node);
        }
    }

    match ctx.find_type(name)? {
        TypeDef::Class(_) => None,
        TypeDef::Alias(alias) => {
            let _token = ctx.enter(GuardKey::Alias(name.to_string()))?;
            let written = alias.explicit_type().cloned().unwrap_or_default();
            let expanded = resolve_annotation(ctx, &written, alias.location);
            if alias.generic_params.is_empty() {
                Some(expanded)
            } else {
                Some(expanded.substitute(&Substitution::positional(&alias.generic_params, args)))
            }
        }
    }
}

/// Generic parameters of the class owning the method around `at`
fn owner_generic_params(ctx: &SearchContext<'_>, at: NodeRef) -> Vec<String> {
    let Some(tree) = ctx.project().scope_tree(at.file) else {
        return Vec::new();
    };
    let Some(owner) = tree.owner_at(at.start) else {
        return Vec::new();
    };
    let Some(owner_node) = ctx.project().node(&owner) else {
        return Vec::new();
    };
    let class_name = match infer::guess_type(ctx, owner_node) {
        ITy::Class(TyClass {
            name,
            kind: ClassKind::Named,
        }) => name,
        ITy::Generic(generic) => generic.base.name,
        _ => return Vec::new(),
    };
    ctx.find_class(&class_name)
        .map(|class| class.generic_params.clone())
        .unwrap_or_default()
}

/// Unify a parameter type with an argument type, recording what each
/// generic parameter must be
pub fn bind(param: &ITy, arg: &ITy, substitution: &mut Substitution) {
    if arg.is_unknown() {
        return;
    }
    match (param, arg) {
        (ITy::Class(class), _) if class.is_generic_param() => {
            let bound = match substitution.get(&class.name) {
                Some(existing) => ITy::union([existing.clone(), arg.clone()]),
                None => arg.clone(),
            };
            substitution.insert(class.name.clone(), bound);
        }
        (ITy::Array(param), ITy::Array(arg)) => bind(param, arg, substitution),
        (ITy::Generic(param), ITy::Array(element)) if param.base.name == "table" => {
            if let [key, value] = param.args.as_slice() {
                bind(key, &ITy::NUMBER, substitution);
                bind(value, element, substitution);
            }
        }
        (ITy::Generic(param), ITy::Generic(arg)) if param.base.name == arg.base.name => {
            for (p, a) in param.args.iter().zip(&arg.args) {
                bind(p, a, substitution);
            }
        }
        (ITy::Function(param), ITy::Function(arg)) => {
            for (p, a) in param.params.iter().zip(&arg.params) {
                bind(&p.ty, &a.ty, substitution);
            }
            bind(&param.returns, &arg.returns, substitution);
        }
        (ITy::Union(union), _) => {
            // `T|nil` binds T to the non-nil part of the argument
            let fixed: Vec<&ITy> = union
                .members()
                .iter()
                .filter(|m| !m.contains_generic_params())
                .collect();
            let rest = ITy::union(
                arg.alternatives()
                    .iter()
                    .filter(|a| !fixed.contains(a))
                    .cloned(),
            );
            for member in union.members().iter().filter(|m| m.contains_generic_params()) {
                bind(member, &rest, substitution);
            }
        }
        _ => {}
    }
}
