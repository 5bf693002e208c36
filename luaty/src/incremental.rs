use std::collections::HashMap;

use tree_sitter::{Parser, Tree};

use crate::project::ProjectError;

/// Lua parser that remembers the hash of the last source it saw per path,
/// so reloading unchanged text is a no-op
#[derive(Default)]
pub struct IncrementalParser {
    hashes: HashMap<String, u64>,
    parser: Option<Parser>,
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn parser(&mut self) -> Result<&mut Parser, ProjectError> {
        if self.parser.is_none() {
            let mut parser = Parser::new();
            parser.set_language(&tree_sitter_lua::LANGUAGE.into())?;
            self.parser = Some(parser);
        }
        self.parser.as_mut().ok_or(ProjectError::ParserUnavailable)
    }

    /// Parse `source` for `path`; `Ok(None)` when the text is unchanged
    pub fn parse_changed(&mut self, path: &str, source: &str) -> Result<Option<Tree>, ProjectError> {
        let hash = compute_hash(source);
        if self.hashes.get(path) == Some(&hash) {
            return Ok(None);
        }
        let tree = self
            .parser()?
            .parse(source, None)
            .ok_or_else(|| ProjectError::Parse(path.to_string()))?;
        self.hashes.insert(path.to_string(), hash);
        Ok(Some(tree))
    }

    pub fn invalidate(&mut self, path: &str) {
        self.hashes.remove(path);
    }
}

fn compute_hash(source: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}
