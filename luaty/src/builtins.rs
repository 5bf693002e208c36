//! Signatures of the standard global functions
//!
//! Written in annotation syntax and parsed once on first use. A user
//! definition of the same global always takes precedence.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::annotation::parse_type;
use crate::ty::ITy;

const SIGNATURES: &[(&str, &str)] = &[
    ("print", "fun(...)"),
    ("type", "fun(v): string"),
    ("tostring", "fun(v): string"),
    ("tonumber", "fun(v, base: number?): number?"),
    ("assert", "fun(v, message: string?, ...)"),
    ("error", "fun(message, level: number?)"),
    ("pairs", "fun(t: table): function"),
    ("ipairs", "fun(t: table): function"),
    ("next", "fun(t: table, index)"),
    ("select", "fun(n, ...)"),
    ("rawget", "fun(t: table, k)"),
    ("rawset", "fun(t: table, k, v): table"),
    ("rawequal", "fun(a, b): boolean"),
    ("rawlen", "fun(v): number"),
    ("require", "fun(name: string)"),
    ("setmetatable", "fun(t: table, mt: table?): table"),
    ("getmetatable", "fun(v): table?"),
    ("pcall", "fun(f: function, ...): boolean"),
    ("unpack", "fun(list: table, i: number?, j: number?)"),
];

static GLOBALS: LazyLock<HashMap<&'static str, ITy>> = LazyLock::new(|| {
    SIGNATURES
        .iter()
        .filter_map(|(name, signature)| match parse_type(signature) {
            Ok(ty) => Some((*name, ty)),
            Err(err) => {
                tracing::warn!(name, %err, "invalid builtin signature");
                None
            }
        })
        .collect()
});

pub fn global(name: &str) -> Option<&'static ITy> {
    GLOBALS.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_signature_parses() {
        for (name, _) in SIGNATURES {
            assert!(global(name).is_some(), "{name} failed to parse");
        }
    }

    #[test]
    fn test_signature_shapes() {
        let Some(ITy::Function(tostring)) = global("tostring") else {
            panic!("tostring is a function");
        };
        assert_eq!(*tostring.returns, ITy::STRING);
        assert_eq!(global("print").map(ToString::to_string).as_deref(), Some("fun(...)"));
        assert!(global("undefined_thing").is_none());
    }
}
