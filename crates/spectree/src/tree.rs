//! The test tree: suites, containers, and leaves stored in an id-keyed arena.
//!
//! Nodes refer to each other by id. Each node keeps an explicit `parent`
//! back-reference and an ordered list of child ids, so ancestry never has to
//! be recovered by parsing an id.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A single-line, 0-based, half-open line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    /// Range covering the given 1-based line. Line 0 is clamped to the first line.
    pub fn for_line(line: u32) -> Self {
        let start = line.saturating_sub(1);
        Self {
            start,
            end: start + 1,
        }
    }

    /// The 1-based line this range starts on.
    pub fn line(&self) -> u32 {
        self.start + 1
    }
}

/// A resolved, 1-based source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteMeta {
    pub suite_key: String,
    pub suite_path: PathBuf,
    pub descendant_leaf_keys: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerMeta {
    pub suite_key: String,
    pub container_path: Vec<String>,
    pub container_key: String,
    pub descendant_leaf_keys: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafMeta {
    pub suite_key: String,
    pub container_path: Vec<String>,
    pub leaf_text: String,
    pub leaf_key: String,
    pub fallback_leaf_key: String,
    /// Key this leaf is registered under in the lookup index. Differs from
    /// `leaf_key` when another leaf claimed that key first.
    pub index_key: String,
    /// Where the runner reported the spec, if it did.
    pub location: Option<SourceLocation>,
}

impl LeafMeta {
    /// Keys to try, in order, when looking this leaf up in a run report.
    pub fn lookup_keys(&self) -> impl Iterator<Item = &str> {
        let fallback = (self.fallback_leaf_key != self.index_key)
            .then_some(self.fallback_leaf_key.as_str());
        std::iter::once(self.index_key.as_str()).chain(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Suite(SuiteMeta),
    Container(ContainerMeta),
    Leaf(LeafMeta),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Suite(_) => "suite",
            NodeKind::Container(_) => "container",
            NodeKind::Leaf(_) => "leaf",
        }
    }

    pub fn suite_key(&self) -> &str {
        match self {
            NodeKind::Suite(m) => &m.suite_key,
            NodeKind::Container(m) => &m.suite_key,
            NodeKind::Leaf(m) => &m.suite_key,
        }
    }

    /// Key under which a suite or container's descendant leaves are indexed.
    pub fn group_key(&self) -> Option<&str> {
        match self {
            NodeKind::Suite(m) => Some(&m.suite_key),
            NodeKind::Container(m) => Some(&m.container_key),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn descendant_leaf_keys(&self) -> Option<&BTreeSet<String>> {
        match self {
            NodeKind::Suite(m) => Some(&m.descendant_leaf_keys),
            NodeKind::Container(m) => Some(&m.descendant_leaf_keys),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn descendant_leaf_keys_mut(&mut self) -> Option<&mut BTreeSet<String>> {
        match self {
            NodeKind::Suite(m) => Some(&mut m.descendant_leaf_keys),
            NodeKind::Container(m) => Some(&mut m.descendant_leaf_keys),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafMeta> {
        match self {
            NodeKind::Leaf(m) => Some(m),
            _ => None,
        }
    }

    fn same_variant(&self, other: &NodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub label: String,
    pub file: PathBuf,
    pub range: LineRange,
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// Set while a discovery pass is rebuilding this suite.
    pub busy: bool,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        file: PathBuf,
        line: u32,
        kind: NodeKind,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            file,
            range: LineRange::for_line(line),
            parent: None,
            children: Vec::new(),
            busy: false,
            kind,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, NodeKind::Suite(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Whether `other` could take this node's place without recreating it.
    pub fn same_kind(&self, other: &NodeKind) -> bool {
        self.kind.same_variant(other)
    }
}

/// Nested, serializable view of a subtree.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub kind: &'static str,
    pub file: PathBuf,
    pub line: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
}

/// All discovered suites and their descendants.
#[derive(Debug, Clone, Default)]
pub struct TestTree {
    nodes: HashMap<String, TreeNode>,
    roots: Vec<String>,
}

impl TestTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn root_ids(&self) -> &[String] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn children(&self, id: &str) -> Vec<&TreeNode> {
        self.nodes
            .get(id)
            .map(|n| n.children.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// Every node id currently in the tree.
    pub fn ids(&self) -> HashSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Add a top-level node (a suite).
    pub fn insert_root(&mut self, mut node: TreeNode) {
        node.parent = None;
        if !self.roots.contains(&node.id) {
            self.roots.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add `node` as the last child of `parent_id`. Returns `false` if the
    /// parent doesn't exist.
    pub fn insert_child(&mut self, parent_id: &str, mut node: TreeNode) -> bool {
        let Some(parent) = self.nodes.get_mut(parent_id) else {
            return false;
        };
        if !parent.children.contains(&node.id) {
            parent.children.push(node.id.clone());
        }
        node.parent = Some(parent_id.to_string());
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Replace a node's child list, deleting every former child not kept.
    /// Returns the ids of all removed nodes.
    pub fn set_children(&mut self, parent_id: &str, children: Vec<String>) -> Vec<String> {
        let Some(parent) = self.nodes.get_mut(parent_id) else {
            return Vec::new();
        };
        let keep: HashSet<&String> = children.iter().collect();
        let dropped: Vec<String> = parent
            .children
            .iter()
            .filter(|c| !keep.contains(c))
            .cloned()
            .collect();
        parent.children = children;

        let mut removed = Vec::new();
        for id in dropped {
            self.remove_detached(&id, &mut removed);
        }
        removed
    }

    /// Remove a node and its whole subtree. Returns the ids removed.
    pub fn remove(&mut self, id: &str) -> Vec<String> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        match node.parent.clone() {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
        let mut removed = Vec::new();
        self.remove_detached(id, &mut removed);
        removed
    }

    fn remove_detached(&mut self, id: &str, removed: &mut Vec<String>) {
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                removed.push(current);
            }
        }
    }

    /// Ids from the node's parent up to its suite, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent.as_deref());
        while let Some(parent_id) = current {
            out.push(parent_id);
            current = self.nodes.get(parent_id).and_then(|n| n.parent.as_deref());
        }
        out
    }

    /// Pre-order walk of the subtree rooted at `id` (inclusive).
    pub fn descendants(&self, id: &str) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(node);
                stack.extend(node.children.iter().rev().map(String::as_str));
            }
        }
        out
    }

    /// Pre-order walk of the whole tree, suites in discovery order.
    pub fn walk(&self) -> Vec<&TreeNode> {
        self.roots
            .iter()
            .flat_map(|root| self.descendants(root))
            .collect()
    }

    /// Runnable items (containers and leaves) located in `file`, in tree order.
    pub fn runnable_in_file(&self, file: &Path) -> Vec<&TreeNode> {
        self.walk()
            .into_iter()
            .filter(|n| !n.is_suite() && n.file == file)
            .collect()
    }

    /// Nested view of the subtree rooted at `id`.
    pub fn view(&self, id: &str) -> Option<NodeView> {
        let node = self.nodes.get(id)?;
        Some(NodeView {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind.name(),
            file: node.file.clone(),
            line: node.range.line(),
            children: node.children.iter().filter_map(|c| self.view(c)).collect(),
        })
    }

    /// Nested views of every suite.
    pub fn views(&self) -> Vec<NodeView> {
        self.roots.iter().filter_map(|r| self.view(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(id: &str) -> TreeNode {
        TreeNode::new(
            id,
            "Suite",
            PathBuf::from(id),
            1,
            NodeKind::Suite(SuiteMeta {
                suite_key: id.into(),
                suite_path: PathBuf::from(id),
                descendant_leaf_keys: BTreeSet::new(),
            }),
        )
    }

    fn container(id: &str, name: &str) -> TreeNode {
        TreeNode::new(
            id,
            name,
            PathBuf::from("/s/a_test.go"),
            3,
            NodeKind::Container(ContainerMeta {
                suite_key: "/s".into(),
                container_path: vec![name.into()],
                container_key: format!("/s::C::{name}"),
                descendant_leaf_keys: BTreeSet::new(),
            }),
        )
    }

    fn leaf(id: &str, text: &str, line: u32) -> TreeNode {
        TreeNode::new(
            id,
            text,
            PathBuf::from("/s/a_test.go"),
            line,
            NodeKind::Leaf(LeafMeta {
                suite_key: "/s".into(),
                container_path: vec![],
                leaf_text: text.into(),
                leaf_key: format!("/s/a_test.go:{line}"),
                fallback_leaf_key: format!("/s::L::{text}"),
                index_key: format!("/s/a_test.go:{line}"),
                location: None,
            }),
        )
    }

    fn sample() -> TestTree {
        let mut tree = TestTree::new();
        tree.insert_root(suite("/s"));
        tree.insert_child("/s", container("/s::A", "A"));
        tree.insert_child("/s::A", leaf("/s::A::one", "one", 4));
        tree.insert_child("/s::A", leaf("/s::A::two", "two", 8));
        tree.insert_child("/s", leaf("/s::three", "three", 12));
        tree
    }

    #[test]
    fn test_line_range() {
        let range = LineRange::for_line(42);
        assert_eq!(range.start, 41);
        assert_eq!(range.end, 42);
        assert_eq!(range.line(), 42);
        assert_eq!(LineRange::for_line(0).start, 0);
    }

    #[test]
    fn test_insert_and_walk() {
        let tree = sample();
        assert_eq!(tree.len(), 5);
        let order: Vec<&str> = tree.walk().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["/s", "/s::A", "/s::A::one", "/s::A::two", "/s::three"]);
    }

    #[test]
    fn test_insert_child_missing_parent() {
        let mut tree = TestTree::new();
        assert!(!tree.insert_child("/nope", leaf("x", "x", 1)));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_parent_links_and_ancestors() {
        let tree = sample();
        assert_eq!(tree.get("/s::A::one").unwrap().parent.as_deref(), Some("/s::A"));
        assert_eq!(tree.ancestors("/s::A::one"), vec!["/s::A", "/s"]);
        assert!(tree.ancestors("/s").is_empty());
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample();
        let mut removed = tree.remove("/s::A");
        removed.sort();
        assert_eq!(removed, vec!["/s::A", "/s::A::one", "/s::A::two"]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("/s").unwrap().children, vec!["/s::three".to_string()]);
    }

    #[test]
    fn test_remove_root() {
        let mut tree = sample();
        tree.remove("/s");
        assert!(tree.is_empty());
        assert!(tree.root_ids().is_empty());
    }

    #[test]
    fn test_set_children_drops_the_rest() {
        let mut tree = sample();
        let removed = tree.set_children("/s::A", vec!["/s::A::two".into()]);
        assert_eq!(removed, vec!["/s::A::one".to_string()]);
        assert!(!tree.contains("/s::A::one"));
        assert!(tree.contains("/s::A::two"));
    }

    #[test]
    fn test_runnable_in_file_excludes_suites() {
        let tree = sample();
        let items = tree.runnable_in_file(Path::new("/s/a_test.go"));
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|n| !n.is_suite()));
        assert!(tree.runnable_in_file(Path::new("/other.go")).is_empty());
    }

    #[test]
    fn test_views_are_nested() {
        let tree = sample();
        let views = tree.views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].children.len(), 2);
        assert_eq!(views[0].children[0].children.len(), 2);
        assert_eq!(views[0].children[0].children[1].line, 8);

        let json = serde_json::to_string(&views).unwrap();
        assert!(json.contains("\"kind\":\"container\""));
    }

    #[test]
    fn test_lookup_keys() {
        let tree = sample();
        let meta = tree.get("/s::three").unwrap().kind.as_leaf().unwrap().clone();
        let keys: Vec<&str> = meta.lookup_keys().collect();
        assert_eq!(keys, vec!["/s/a_test.go:12", "/s::L::three"]);

        let mut reindexed = meta.clone();
        reindexed.index_key = reindexed.fallback_leaf_key.clone();
        let keys: Vec<&str> = reindexed.lookup_keys().collect();
        assert_eq!(keys, vec!["/s::L::three"]);
    }

    #[test]
    fn test_node_kind_accessors() {
        let tree = sample();
        let node = tree.get("/s::A").unwrap();
        assert_eq!(node.kind.name(), "container");
        assert_eq!(node.kind.group_key(), Some("/s::C::A"));
        assert_eq!(node.kind.suite_key(), "/s");
        assert!(tree.get("/s::three").unwrap().kind.group_key().is_none());
        assert!(tree.get("/s").unwrap().is_suite());
    }
}
