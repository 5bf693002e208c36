//! Attaching doc comments to the statements they describe
//!
//! A run of comments with no blank line between them forms one block. A
//! block directly above a node belongs to that node; a comment starting on
//! the row where a node ends (`local d --[[@type Dog]]`) belongs to it as
//! well. Blocks above nothing are kept as standalone (`@class` declarations
//! without a table, `@alias` definitions).

use std::collections::HashMap;

use tree_sitter::Node;

use crate::annotation::DocComment;
use crate::syntax::{FileId, NodeRef, children, node_text};

#[derive(Debug, Clone)]
pub struct DocBlock {
    /// First comment of the block
    pub location: NodeRef,
    pub owner: Option<NodeRef>,
    pub doc: DocComment,
    /// The comment each tag of `doc` was written in
    pub tag_locations: Vec<NodeRef>,
}

impl DocBlock {
    pub fn tag_location(&self, index: usize) -> NodeRef {
        self.tag_locations.get(index).copied().unwrap_or(self.location)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocIndex {
    blocks: Vec<DocBlock>,
    by_owner: HashMap<NodeRef, usize>,
}

impl DocIndex {
    pub fn build(file: FileId, root: Node<'_>, source: &str) -> DocIndex {
        let mut index = DocIndex::default();
        index.collect(file, root, source);
        index
    }

    /// Doc comment attached to a statement, table field or function
    pub fn doc_for(&self, owner: &NodeRef) -> Option<&DocComment> {
        self.by_owner.get(owner).map(|&i| &self.blocks[i].doc)
    }

    pub fn block_for(&self, owner: &NodeRef) -> Option<&DocBlock> {
        self.by_owner.get(owner).map(|&i| &self.blocks[i])
    }

    /// Every tagged block in source order
    pub fn blocks(&self) -> &[DocBlock] {
        &self.blocks
    }

    fn collect(&mut self, file: FileId, node: Node<'_>, source: &str) {
        let mut pending: Vec<Node<'_>> = Vec::new();
        let mut prev: Option<Node<'_>> = None;

        for child in children(node) {
            if child.kind() == "comment" {
                if let Some(last) = pending.last() {
                    if child.start_position().row > last.end_position().row + 1 {
                        self.flush(file, &mut pending, None, source);
                    }
                }
                let trailing = pending.is_empty()
                    && prev.is_some_and(|p| p.end_position().row == child.start_position().row);
                match (trailing, prev) {
                    (true, Some(p)) => {
                        let mut single = vec![child];
                        self.flush(file, &mut single, Some(statement_owner(p)), source);
                    }
                    _ => pending.push(child),
                }
                continue;
            }

            if let Some(last) = pending.last() {
                let adjacent = child.start_position().row <= last.end_position().row + 1;
                let owner = (adjacent && child.is_named()).then(|| statement_owner(child));
                self.flush(file, &mut pending, owner, source);
            }
            self.collect(file, child, source);
            prev = Some(child);
        }

        self.flush(file, &mut pending, None, source);
    }

    fn flush(&mut self, file: FileId, pending: &mut Vec<Node<'_>>, owner: Option<Node<'_>>, source: &str) {
        let Some(first) = pending.first().copied() else {
            return;
        };
        let mut doc = DocComment::default();
        let mut tag_locations = Vec::new();
        for comment in pending.drain(..) {
            doc.extend(node_text(comment, source));
            tag_locations.resize(doc.tags.len(), NodeRef::new(file, comment));
        }
        if doc.is_empty() {
            return;
        }

        let owner = owner.map(|n| NodeRef::new(file, n));
        if let Some(key) = owner {
            if let Some(&existing) = self.by_owner.get(&key) {
                let block = &mut self.blocks[existing];
                block.doc.tags.extend(doc.tags);
                block.tag_locations.extend(tag_locations);
                return;
            }
            self.by_owner.insert(key, self.blocks.len());
        }
        self.blocks.push(DocBlock {
            location: NodeRef::new(file, first),
            owner,
            doc,
            tag_locations,
        });
    }
}

/// Climb from a node inside a statement to the statement itself
fn statement_owner(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if matches!(parent.kind(), "chunk" | "block" | "table_constructor") {
            break;
        }
        current = parent;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::named_children;
    use tree_sitter::Parser;

    fn index(code: &str) -> (tree_sitter::Tree, DocIndex) {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_lua::LANGUAGE.into())
            .expect("Error loading Lua parser");
        let tree = parser.parse(code, None).expect("parse");
        let docs = DocIndex::build(FileId(0), tree.root_node(), code);
        (tree, docs)
    }

    #[test]
    fn test_leading_block_attaches_to_statement() {
        let code = "---@class Point\n---@field x number\nlocal Point = {}\n";
        let (tree, docs) = index(code);
        let stmt = named_children(tree.root_node())
            .into_iter()
            .find(|n| n.kind() == "variable_declaration")
            .expect("declaration");
        let doc = docs.doc_for(&NodeRef::new(FileId(0), stmt)).expect("doc");
        assert_eq!(doc.class_name(), Some("Point"));
        assert_eq!(doc.tags.len(), 2);
    }

    #[test]
    fn test_trailing_inline_comment_attaches_to_statement() {
        let code = "local d --[[@type Dog]]\nlocal e = 1\n";
        let (tree, docs) = index(code);
        let stmts: Vec<_> = named_children(tree.root_node())
            .into_iter()
            .filter(|n| n.kind() == "variable_declaration")
            .collect();
        let first = docs.doc_for(&NodeRef::new(FileId(0), stmts[0])).expect("doc");
        assert!(first.declared_type(0).is_some());
        assert!(docs.doc_for(&NodeRef::new(FileId(0), stmts[1])).is_none());
    }

    #[test]
    fn test_blank_line_detaches_block() {
        let code = "---@class Orphan\n\nlocal x = 1\n";
        let (tree, docs) = index(code);
        let stmt = named_children(tree.root_node())
            .into_iter()
            .find(|n| n.kind() == "variable_declaration")
            .expect("declaration");
        assert!(docs.doc_for(&NodeRef::new(FileId(0), stmt)).is_none());
        assert_eq!(docs.blocks().len(), 1);
        assert!(docs.blocks()[0].owner.is_none());
    }

    #[test]
    fn test_plain_comments_are_not_blocks() {
        let (_, docs) = index("-- just words\nlocal x = 1 -- trailing words\n");
        assert!(docs.blocks().is_empty());
    }
}
