#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and transforms.
//!
//! A `NodeSet` is a set of tree nodes (root, elements, text, comments and
//! processing instructions) identified by their roxmltree `NodeId` index.
//! Attribute and namespace nodes are not tracked separately: they are
//! rendered whenever their owner element is in the set.
//!
//! roxmltree assigns node ids in document order, so iterating the set
//! yields nodes in document order.

use roxmltree::{Document, Node, NodeId};
use std::collections::BTreeSet;

/// A set of document nodes identified by `NodeId` index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: BTreeSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of the document, including the root node.
    pub fn all(doc: &Document<'_>, with_comments: bool) -> Self {
        Self::tree(doc.root(), with_comments)
    }

    /// The subtree rooted at `root`, optionally skipping comment nodes.
    pub fn tree(root: Node<'_, '_>, with_comments: bool) -> Self {
        let nodes = root
            .descendants()
            .filter(|n| with_comments || !n.is_comment())
            .map(|n| n.id().get_usize())
            .collect();
        Self { nodes }
    }

    pub fn contains(&self, node: Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id().get_usize())
    }

    pub fn contains_index(&self, index: usize) -> bool {
        self.nodes.contains(&index)
    }

    pub fn insert(&mut self, node: Node<'_, '_>) {
        self.nodes.insert(node.id().get_usize());
    }

    pub fn remove(&mut self, node: Node<'_, '_>) {
        self.nodes.remove(&node.id().get_usize());
    }

    /// Remove `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&n.id().get_usize());
        }
    }

    /// Add `root` and all of its descendants.
    pub fn insert_subtree(&mut self, root: Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.insert(n.id().get_usize());
        }
    }

    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    /// Compute `self - other`.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Node indices in document order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().copied()
    }

    /// Resolve the set against `doc`, in document order.
    pub fn nodes<'a, 'input>(&self, doc: &'a Document<'input>) -> Vec<Node<'a, 'input>> {
        self.nodes
            .iter()
            .filter_map(|idx| u32::try_from(*idx).ok())
            .filter_map(|idx| doc.get_node(NodeId::new(idx)))
            .collect()
    }
}
