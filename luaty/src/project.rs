//! Files, parse trees and the shared caches built from them
//!
//! A [`Project`] is edited through `&mut self` and read through `&self`.
//! Readers may run concurrently: each builds its own [`SearchContext`],
//! scope trees come from a lock-protected cache and the index is an
//! immutable snapshot replaced wholesale when a file changes.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tree_sitter::{Node, Tree};

use crate::config::ResolveOptions;
use crate::incremental::IncrementalParser;
use crate::index::ShortNamesIndex;
use crate::scope::{ScopeTree, ScopeTreeCache};
use crate::search::SearchContext;
use crate::stubs;
use crate::syntax::{FileId, NodeRef, SyntaxNode};

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("failed to load the Lua grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("parser is not available")]
    ParserUnavailable,
    #[error("failed to parse {0}")]
    Parse(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct SourceFile {
    id: FileId,
    path: String,
    source: String,
    tree: Tree,
    version: u64,
}

impl SourceFile {
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn root_node(&self) -> SyntaxNode<'_> {
        SyntaxNode::new(self, self.root())
    }

    /// Find the node a [`NodeRef`] was taken from
    pub fn node(&self, node_ref: &NodeRef) -> Option<Node<'_>> {
        if node_ref.file != self.id {
            return None;
        }
        let mut node = self
            .root()
            .descendant_for_byte_range(node_ref.start, node_ref.end)?;
        loop {
            if node.start_byte() == node_ref.start
                && node.end_byte() == node_ref.end
                && node.kind_id() == node_ref.kind
            {
                return Some(node);
            }
            if node.start_byte() < node_ref.start || node.end_byte() > node_ref.end {
                return None;
            }
            node = node.parent()?;
        }
    }

    /// 0-based line and column of a byte offset
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let before = self.source.get(..offset).unwrap_or(&self.source);
        let line = before.matches('\n').count();
        let column = before.rfind('\n').map(|i| offset - i - 1).unwrap_or(offset);
        (line, column)
    }
}

pub struct Project {
    files: BTreeMap<FileId, SourceFile>,
    paths: HashMap<String, FileId>,
    next_id: u32,
    next_version: u64,
    parser: Mutex<IncrementalParser>,
    scopes: ScopeTreeCache,
    index: Arc<ShortNamesIndex>,
    options: ResolveOptions,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(ResolveOptions::default())
    }
}

impl Project {
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            files: BTreeMap::new(),
            paths: HashMap::new(),
            next_id: 0,
            next_version: 1,
            parser: Mutex::new(IncrementalParser::new()),
            scopes: ScopeTreeCache::new(),
            index: Arc::new(ShortNamesIndex::default()),
            options,
        }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Add or replace a file; unchanged text keeps the existing trees
    pub fn set_file(&mut self, path: &str, source: &str) -> Result<FileId, ProjectError> {
        let id = match self.paths.get(path) {
            Some(&id) => id,
            None => {
                let id = FileId(self.next_id);
                self.next_id += 1;
                id
            }
        };

        let parser = match self.parser.get_mut() {
            Ok(parser) => parser,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !self.files.contains_key(&id) {
            parser.invalidate(path);
        }
        let Some(tree) = parser.parse_changed(path, source)? else {
            return Ok(id);
        };

        let version = self.next_version;
        self.next_version += 1;
        self.paths.insert(path.to_string(), id);
        self.files.insert(
            id,
            SourceFile {
                id,
                path: path.to_string(),
                source: source.to_string(),
                tree,
                version,
            },
        );
        self.scopes.invalidate(id);
        self.reindex(id);
        tracing::debug!(path, file = %id, version, "indexed file");
        Ok(id)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<FileId, ProjectError> {
        let source = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.set_file(&path.display().to_string(), &source)
    }

    pub fn remove_file(&mut self, path: &str) -> bool {
        let Some(id) = self.paths.remove(path) else {
            return false;
        };
        self.files.remove(&id);
        self.scopes.invalidate(id);
        if let Ok(parser) = self.parser.get_mut() {
            parser.invalidate(path);
        }
        self.index = Arc::new(self.index.without_file(id));
        tracing::debug!(path, file = %id, "removed file");
        true
    }

    fn reindex(&mut self, id: FileId) {
        let Some(file) = self.files.get(&id) else {
            return;
        };
        let tree = self.scopes.get(file);
        let file_stubs = stubs::extract(file, &tree);
        self.index = Arc::new(self.index.with_file(id, file_stubs));
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(&id)
    }

    pub fn file_by_path(&self, path: &str) -> Option<&SourceFile> {
        self.paths.get(path).and_then(|id| self.files.get(id))
    }

    /// Files in registration order
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn node(&self, node_ref: &NodeRef) -> Option<SyntaxNode<'_>> {
        let file = self.files.get(&node_ref.file)?;
        file.node(node_ref).map(|node| SyntaxNode::new(file, node))
    }

    pub fn scope_tree(&self, id: FileId) -> Option<Arc<ScopeTree>> {
        self.files.get(&id).map(|file| self.scopes.get(file))
    }

    pub fn scope_cache(&self) -> &ScopeTreeCache {
        &self.scopes
    }

    pub fn index(&self) -> &ShortNamesIndex {
        &self.index
    }

    /// A handle to the current index snapshot that outlives later edits
    pub fn index_snapshot(&self) -> Arc<ShortNamesIndex> {
        Arc::clone(&self.index)
    }

    pub fn search_context(&self) -> SearchContext<'_> {
        SearchContext::new(self)
    }

    /// Smallest named node starting at `offset` in `path`
    pub fn node_at(&self, path: &str, offset: usize) -> Option<SyntaxNode<'_>> {
        let file = self.file_by_path(path)?;
        let node = file
            .root()
            .named_descendant_for_byte_range(offset, offset)?;
        Some(SyntaxNode::new(file, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_file_reuses_id_and_bumps_version() {
        let mut project = Project::default();
        let a = project.set_file("a.lua", "local x = 1").unwrap();
        let v1 = project.file(a).unwrap().version();
        let again = project.set_file("a.lua", "local x = 1").unwrap();
        assert_eq!(a, again);
        assert_eq!(project.file(a).unwrap().version(), v1);

        project.set_file("a.lua", "local x = 2").unwrap();
        assert!(project.file(a).unwrap().version() > v1);
        let b = project.set_file("b.lua", "").unwrap();
        assert_ne!(a, b);
        assert_eq!(project.len(), 2);
    }

    #[test]
    fn test_node_ref_round_trip() {
        let mut project = Project::default();
        let id = project.set_file("a.lua", "local value = { 1, 2 }").unwrap();
        let file = project.file(id).unwrap();
        let table = project.node_at("a.lua", 14).unwrap();
        assert_eq!(table.kind(), "table_constructor");
        let found = project.node(&table.node_ref()).unwrap();
        assert_eq!(found.text(), "{ 1, 2 }");
        assert_eq!(file.line_col(14), (0, 14));
    }

    #[test]
    fn test_remove_file_drops_index_entries() {
        let mut project = Project::default();
        project.set_file("a.lua", "---@class A\nlocal A = {}").unwrap();
        assert!(project.index().find_class("A").is_some());
        let snapshot = project.index_snapshot();

        assert!(project.remove_file("a.lua"));
        assert!(project.index().find_class("A").is_none());
        assert!(snapshot.find_class("A").is_some());
        assert!(!project.remove_file("a.lua"));
    }

    #[test]
    fn test_load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.lua");
        std::fs::write(&path, "return 1").unwrap();
        let mut project = Project::default();
        let id = project.load_file(&path).unwrap();
        assert_eq!(project.file(id).unwrap().source(), "return 1");

        let missing = project.load_file(&dir.path().join("none.lua"));
        assert!(matches!(missing, Err(ProjectError::Io { .. })));
    }

    #[test]
    fn test_line_col() {
        let mut project = Project::default();
        let id = project.set_file("a.lua", "local a\nlocal b\n").unwrap();
        let file = project.file(id).unwrap();
        assert_eq!(file.line_col(14), (1, 6));
    }
}
