//! Doc-comment annotations
//!
//! Parses `---@tag ...` lines and the type expressions inside them:
//! primitives, class names, `Name<A, B>`, `T[]`, `A|B`, `(T)` and
//! `fun(a: T, ...): R`. A tag that fails to parse is reported through
//! [`AnnotationError`] and callers treat it as absent.

use thiserror::Error;

use crate::ty::{FunParam, ITy, Primitive, TyClass};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("unexpected end of annotation, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("unexpected `{found}` at column {column}, expected {expected}")]
    UnexpectedToken {
        found: String,
        column: usize,
        expected: &'static str,
    },
    #[error("unknown tag @{0}")]
    UnknownTag(String),
    #[error("trailing input `{0}`")]
    Trailing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    Package,
}

impl Visibility {
    pub fn from_keyword(word: &str) -> Option<Visibility> {
        match word {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            "package" => Some(Visibility::Package),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
            Visibility::Package => "package",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocTag {
    Class {
        name: String,
        super_class: Option<ITy>,
        generic_params: Vec<String>,
    },
    Field {
        visibility: Visibility,
        /// `None` for indexer fields such as `@field [string] number`
        name: Option<String>,
        index_ty: Option<ITy>,
        ty: ITy,
        comment: Option<String>,
    },
    Param {
        name: String,
        ty: ITy,
    },
    Return(Vec<ITy>),
    Type(Vec<ITy>),
    Generic(Vec<String>),
    Alias {
        name: String,
        generic_params: Vec<String>,
        ty: ITy,
    },
    Deprecated,
}

/// The tags of one contiguous block of doc comments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocComment {
    pub tags: Vec<DocTag>,
}

impl DocComment {
    pub fn parse(text: &str) -> DocComment {
        let mut doc = DocComment::default();
        doc.extend(text);
        doc
    }

    /// Parse every tag line in `text` and append it
    pub fn extend(&mut self, text: &str) {
        for line in text.lines() {
            let Some(tag_text) = tag_line(line) else {
                continue;
            };
            match parse_tag(tag_text) {
                Ok(tag) => self.tags.push(tag),
                Err(err) => tracing::debug!(line = tag_text, %err, "ignoring malformed annotation"),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn class(&self) -> Option<(&str, Option<&ITy>, &[String])> {
        self.tags.iter().find_map(|tag| match tag {
            DocTag::Class {
                name,
                super_class,
                generic_params,
            } => Some((name.as_str(), super_class.as_ref(), generic_params.as_slice())),
            _ => None,
        })
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class().map(|(name, _, _)| name)
    }

    /// The `i`-th type of an `@type` tag
    pub fn declared_type(&self, index: usize) -> Option<&ITy> {
        self.tags.iter().find_map(|tag| match tag {
            DocTag::Type(types) => types.get(index),
            _ => None,
        })
    }

    pub fn param(&self, name: &str) -> Option<&ITy> {
        self.tags.iter().find_map(|tag| match tag {
            DocTag::Param { name: n, ty } if n == name => Some(ty),
            _ => None,
        })
    }

    /// First `@return` type; several return tags fold into one list
    pub fn return_type(&self) -> Option<&ITy> {
        self.tags.iter().find_map(|tag| match tag {
            DocTag::Return(types) => types.first(),
            _ => None,
        })
    }

    pub fn generic_params(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|tag| match tag {
                DocTag::Generic(names) => Some(names.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn is_deprecated(&self) -> bool {
        self.tags.iter().any(|tag| matches!(tag, DocTag::Deprecated))
    }
}

/// Strip comment markers and return the text after `@`, if this is a tag line
pub fn tag_line(line: &str) -> Option<&str> {
    let trimmed = line
        .trim()
        .trim_start_matches('-')
        .trim_start_matches("[[")
        .trim_start();
    let trimmed = trimmed.strip_suffix("]]").unwrap_or(trimmed).trim_end();
    trimmed.strip_prefix('@')
}

pub fn parse_tag(text: &str) -> Result<DocTag, AnnotationError> {
    let mut parser = Parser::new(text);
    let tag = parser.expect_name("tag name")?;
    let result = match tag.as_str() {
        "class" => parser.class_tag()?,
        "field" => parser.field_tag()?,
        "param" => {
            let name = parser.param_name()?;
            let ty = parser.union()?;
            DocTag::Param { name, ty }
        }
        "return" => DocTag::Return(parser.type_list()?),
        "type" => DocTag::Type(parser.type_list()?),
        "generic" => DocTag::Generic(parser.name_list()?),
        "alias" => {
            let name = parser.expect_name("alias name")?;
            let generic_params = parser.optional_generic_params()?;
            let ty = parser.union()?.bind_generic_names(&generic_params);
            DocTag::Alias {
                name,
                generic_params,
                ty,
            }
        }
        "deprecated" => return Ok(DocTag::Deprecated),
        other => return Err(AnnotationError::UnknownTag(other.to_string())),
    };
    // Descriptions may follow most tags; only types must be fully consumed.
    Ok(result)
}

/// Parse a complete type expression
pub fn parse_type(text: &str) -> Result<ITy, AnnotationError> {
    let mut parser = Parser::new(text);
    let ty = parser.union()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(AnnotationError::Trailing(parser.rest()));
    }
    Ok(ty)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn rest(&self) -> String {
        self.chars[self.pos.min(self.chars.len())..].iter().collect()
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn peek_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), AnnotationError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&mut self, expected: &'static str) -> AnnotationError {
        match self.peek() {
            Some(found) => AnnotationError::UnexpectedToken {
                found: found.to_string(),
                column: self.pos,
                expected,
            },
            None => AnnotationError::UnexpectedEnd(expected),
        }
    }

    fn name(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            let first = self.pos == start;
            if c.is_alphabetic() || c == '_' || (!first && (c.is_ascii_digit() || c == '.')) {
                self.pos += 1;
            } else {
                break;
            }
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn expect_name(&mut self, expected: &'static str) -> Result<String, AnnotationError> {
        self.name().ok_or_else(|| self.unexpected(expected))
    }

    fn param_name(&mut self) -> Result<String, AnnotationError> {
        if self.peek_str("...") {
            self.pos += 3;
            return Ok("...".to_string());
        }
        let name = self.expect_name("parameter name")?;
        // optional marker: `@param x? number`
        self.eat('?');
        Ok(name)
    }

    fn name_list(&mut self) -> Result<Vec<String>, AnnotationError> {
        let mut names = vec![self.expect_name("generic parameter")?];
        // `@generic T : Base` constraints are accepted and ignored
        if self.eat(':') {
            self.union()?;
        }
        while self.eat(',') {
            names.push(self.expect_name("generic parameter")?);
            if self.eat(':') {
                self.union()?;
            }
        }
        Ok(names)
    }

    fn optional_generic_params(&mut self) -> Result<Vec<String>, AnnotationError> {
        if !self.eat('<') {
            return Ok(Vec::new());
        }
        let names = self.name_list()?;
        self.expect('>', "`>`")?;
        Ok(names)
    }

    fn type_list(&mut self) -> Result<Vec<ITy>, AnnotationError> {
        let mut types = vec![self.union()?];
        while self.eat(',') {
            types.push(self.union()?);
        }
        Ok(types)
    }

    fn class_tag(&mut self) -> Result<DocTag, AnnotationError> {
        let name = self.expect_name("class name")?;
        let mut generic_params = self.optional_generic_params()?;
        let super_class = if self.eat(':') {
            Some(self.postfix()?)
        } else {
            None
        };
        if generic_params.is_empty() {
            generic_params = self.optional_generic_params()?;
        }
        let super_class = super_class.map(|ty| ty.bind_generic_names(&generic_params));
        Ok(DocTag::Class {
            name,
            super_class,
            generic_params,
        })
    }

    fn field_tag(&mut self) -> Result<DocTag, AnnotationError> {
        let save = self.pos;
        let mut visibility = Visibility::Public;
        if let Some(word) = self.name() {
            match Visibility::from_keyword(&word) {
                Some(v) => visibility = v,
                None => self.pos = save,
            }
        }

        let (name, index_ty) = if self.eat('[') {
            let key = self.union()?;
            self.expect(']', "`]`")?;
            (None, Some(key))
        } else {
            let name = self.expect_name("field name")?;
            self.eat('?');
            (Some(name), None)
        };
        let ty = self.union()?;

        self.skip_ws();
        let rest = self.rest();
        let rest = rest.trim();
        let comment = rest
            .strip_prefix('#')
            .map(|c| c.trim().to_string())
            .or_else(|| (!rest.is_empty()).then(|| rest.to_string()));

        Ok(DocTag::Field {
            visibility,
            name,
            index_ty,
            ty,
            comment,
        })
    }

    fn union(&mut self) -> Result<ITy, AnnotationError> {
        let mut members = vec![self.postfix()?];
        while self.eat('|') {
            members.push(self.postfix()?);
        }
        Ok(if members.len() == 1 {
            members.pop().unwrap_or_default()
        } else {
            ITy::union(members)
        })
    }

    fn postfix(&mut self) -> Result<ITy, AnnotationError> {
        let mut ty = self.primary()?;
        loop {
            if self.peek_str("[]") {
                self.pos += 2;
                ty = ITy::array(ty);
            } else if self.peek() == Some('?') {
                self.pos += 1;
                ty = ITy::union([ty, ITy::NIL]);
            } else {
                return Ok(ty);
            }
        }
    }

    fn primary(&mut self) -> Result<ITy, AnnotationError> {
        if self.eat('(') {
            let inner = self.union()?;
            self.expect(')', "`)`")?;
            return Ok(inner);
        }
        let Some(name) = self.name() else {
            return Err(self.unexpected("type"));
        };
        if name == "fun" && self.peek() == Some('(') {
            return self.function();
        }
        // `Name<...>` binds only without a space, so `@class A : B <T>` keeps
        // `<T>` as the class's own parameter list.
        if self.chars.get(self.pos) == Some(&'<') {
            self.pos += 1;
            let mut args = vec![self.union()?];
            while self.eat(',') {
                args.push(self.union()?);
            }
            self.expect('>', "`>`")?;
            return Ok(ITy::generic(TyClass::named(name), args));
        }
        Ok(match name.as_str() {
            "any" | "unknown" => ITy::Unknown,
            other => match Primitive::from_name(other) {
                Some(primitive) => ITy::Primitive(primitive),
                None => ITy::class(other),
            },
        })
    }

    fn function(&mut self) -> Result<ITy, AnnotationError> {
        self.expect('(', "`(`")?;
        let mut params = Vec::new();
        let mut variadic = false;
        if !self.eat(')') {
            loop {
                if self.peek_str("...") {
                    self.pos += 3;
                    if self.eat(':') {
                        self.union()?;
                    }
                    variadic = true;
                } else {
                    let name = self.expect_name("parameter name")?;
                    self.eat('?');
                    let ty = if self.eat(':') {
                        self.union()?
                    } else {
                        ITy::Unknown
                    };
                    params.push(FunParam { name, ty });
                }
                if !self.eat(',') {
                    break;
                }
            }
            self.expect(')', "`)`")?;
        }
        let returns = if self.eat(':') {
            self.union()?
        } else {
            ITy::NIL
        };
        Ok(ITy::function(params, variadic, returns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class_with_super_and_generics() {
        let tag = parse_tag("class List<T> : Collection<T>").unwrap();
        let DocTag::Class {
            name,
            super_class,
            generic_params,
        } = tag
        else {
            panic!("expected class tag");
        };
        assert_eq!(name, "List");
        assert_eq!(generic_params, vec!["T".to_string()]);
        assert_eq!(
            super_class,
            Some(ITy::generic(
                TyClass::named("Collection"),
                vec![ITy::generic_param("T")]
            ))
        );
    }

    #[test]
    fn test_parse_class_generics_after_super() {
        let tag = parse_tag("class Box : Base <T>").unwrap();
        assert!(matches!(
            tag,
            DocTag::Class { ref generic_params, ref super_class, .. }
                if generic_params == &vec!["T".to_string()] && super_class == &Some(ITy::class("Base"))
        ));
    }

    #[test]
    fn test_parse_field_with_visibility_and_comment() {
        let tag = parse_tag("field private next Node # the following node").unwrap();
        assert_eq!(
            tag,
            DocTag::Field {
                visibility: Visibility::Private,
                name: Some("next".into()),
                index_ty: None,
                ty: ITy::class("Node"),
                comment: Some("the following node".into()),
            }
        );
    }

    #[test]
    fn test_parse_field_named_like_visibility_type() {
        let tag = parse_tag("field name string").unwrap();
        assert!(matches!(
            tag,
            DocTag::Field { visibility: Visibility::Public, name: Some(ref n), .. } if n == "name"
        ));
    }

    #[test]
    fn test_parse_indexer_field() {
        let tag = parse_tag("field [string] number").unwrap();
        assert!(matches!(
            tag,
            DocTag::Field { name: None, index_ty: Some(ITy::Primitive(Primitive::String)), ty: ITy::Primitive(Primitive::Number), .. }
        ));
    }

    #[test]
    fn test_parse_function_type() {
        let ty = parse_type("fun(a: number, b: string[], ...): boolean").unwrap();
        let ITy::Function(function) = ty else {
            panic!("expected function");
        };
        assert_eq!(function.params.len(), 2);
        assert!(function.variadic);
        assert_eq!(function.params[1].ty, ITy::array(ITy::STRING));
        assert_eq!(*function.returns, ITy::BOOLEAN);
    }

    #[test]
    fn test_parse_optional_and_nested() {
        assert_eq!(
            parse_type("string?").unwrap(),
            ITy::union([ITy::STRING, ITy::NIL])
        );
        assert_eq!(
            parse_type("table<string, Node[]>").unwrap(),
            ITy::generic(
                TyClass::named("table"),
                vec![ITy::STRING, ITy::array(ITy::class("Node"))]
            )
        );
    }

    #[test]
    fn test_display_then_parse_round_trip() {
        let samples = [
            ITy::class("Node"),
            ITy::array(ITy::class("Node")),
            ITy::array(ITy::union([ITy::NUMBER, ITy::STRING])),
            ITy::union([ITy::class("Dog"), ITy::NIL, ITy::STRING]),
            ITy::function(
                vec![FunParam {
                    name: "a".into(),
                    ty: ITy::NUMBER,
                }],
                true,
                ITy::union([ITy::NUMBER, ITy::STRING]),
            ),
            ITy::union([ITy::function(Vec::new(), false, ITy::NUMBER), ITy::STRING]),
        ];
        for ty in samples {
            let text = ty.to_string();
            assert_eq!(parse_type(&text).unwrap(), ty, "round trip of {}", text);
        }
    }

    #[test]
    fn test_malformed_tag_is_error() {
        assert!(parse_tag("field").is_err());
        assert!(parse_tag("class").is_err());
        assert!(parse_type("fun(a: ").is_err());
        assert!(parse_type("number string").is_err());
        assert!(matches!(parse_tag("nonsense x"), Err(AnnotationError::UnknownTag(_))));
    }

    #[test]
    fn test_doc_comment_skips_malformed_lines() {
        let doc = DocComment::parse("---@class Node\n---@field\n---@field next Node\n--- plain text");
        assert_eq!(doc.class_name(), Some("Node"));
        assert_eq!(doc.tags.len(), 2);
    }

    #[test]
    fn test_tag_line_variants() {
        assert_eq!(tag_line("---@type Dog"), Some("type Dog"));
        assert_eq!(tag_line("--[[@type Dog]]"), Some("type Dog"));
        assert_eq!(tag_line("-- @param x number"), Some("param x number"));
        assert_eq!(tag_line("-- just a comment"), None);
    }

    #[test]
    fn test_doc_comment_accessors() {
        let doc = DocComment::parse(
            "---@generic T\n---@param value T\n---@return T, string\n---@deprecated",
        );
        assert_eq!(doc.generic_params(), vec!["T".to_string()]);
        assert_eq!(doc.param("value"), Some(&ITy::class("T")));
        assert_eq!(doc.return_type(), Some(&ITy::class("T")));
        assert!(doc.is_deprecated());
    }
}
