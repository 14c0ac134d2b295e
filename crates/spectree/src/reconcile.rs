//! Build and incrementally update the test tree from discovery reports.
//!
//! Nodes that a report still produces keep their ids (and therefore any
//! host-side selection or expansion state); nodes it no longer produces are
//! deleted; new ones are appended in report order.

use crate::index::LookupIndex;
use crate::keys::{self, KEY_DELIMITER};
use crate::report::{Location, SpecEntry, SuiteReport};
use crate::tree::{ContainerMeta, LeafMeta, NodeKind, SourceLocation, SuiteMeta, TestTree, TreeNode};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// What one suite's reconciliation did to the tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuitePass {
    pub suite_id: String,
    /// Every node id produced by the report, in visit order (suite first).
    pub touched: Vec<String>,
    pub created: Vec<String>,
    pub removed: Vec<String>,
}

/// What a full discovery pass did to the tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryPass {
    pub suites: Vec<SuitePass>,
    /// Suites that were not rediscovered, and everything beneath them.
    pub removed_suites: Vec<String>,
}

impl DiscoveryPass {
    pub fn created_count(&self) -> usize {
        self.suites.iter().map(|s| s.created.len()).sum()
    }

    pub fn removed_count(&self) -> usize {
        self.suites.iter().map(|s| s.removed.len()).sum::<usize>() + self.removed_suites.len()
    }

    /// True when the pass left the set of node ids unchanged.
    pub fn is_unchanged(&self) -> bool {
        self.created_count() == 0 && self.removed_count() == 0
    }
}

struct SuiteBuilder<'a> {
    tree: &'a mut TestTree,
    index: &'a mut LookupIndex,
    suite_key: String,
    suite_path: PathBuf,
    seen: HashSet<String>,
    child_order: HashMap<String, Vec<String>>,
    pass: SuitePass,
}

impl SuiteBuilder<'_> {
    fn display_location(&self, location: Option<&Location>) -> (PathBuf, u32) {
        match location {
            Some(loc) => (
                keys::resolve_location_file(&self.suite_path, &loc.file),
                loc.line,
            ),
            None => (self.suite_path.clone(), 1),
        }
    }

    /// Pick the id for a child named `name` under `parent_id`.
    ///
    /// A container id already produced this pass is shared by later specs
    /// reaching the same `container_key` under the same parent. Any other
    /// clash (a second leaf with the same text, a leaf and a container with
    /// the same name, a container literally named `x [2]`) gets a ` [n]`
    /// suffix. Leaves pass `None`.
    fn claim_id(&self, parent_id: &str, name: &str, container_key: Option<&str>) -> String {
        let base = format!("{parent_id}{KEY_DELIMITER}{name}");
        let mut n = 1;
        loop {
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{base} [{n}]")
            };
            if !self.seen.contains(&candidate) {
                return candidate;
            }
            let shareable = container_key.is_some_and(|key| {
                self.tree.get(&candidate).is_some_and(|node| {
                    matches!(&node.kind, NodeKind::Container(meta) if meta.container_key == key)
                        && node.parent.as_deref() == Some(parent_id)
                })
            });
            if shareable {
                return candidate;
            }
            n += 1;
        }
    }

    /// Reuse the node with `fresh.id` if it has the same kind and parent,
    /// refreshing its metadata; otherwise (re)create it.
    fn upsert(&mut self, parent_id: &str, fresh: TreeNode) {
        let id = fresh.id.clone();
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.pass.touched.push(id.clone());
        self.child_order
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());

        let reusable = self.tree.get(&id).map(|existing| {
            existing.same_kind(&fresh.kind) && existing.parent.as_deref() == Some(parent_id)
        });
        match reusable {
            Some(true) => {
                if let Some(existing) = self.tree.get_mut(&id) {
                    existing.label = fresh.label;
                    existing.file = fresh.file;
                    existing.range = fresh.range;
                    existing.kind = fresh.kind;
                }
            }
            Some(false) => {
                let removed = self.tree.remove(&id);
                self.pass.removed.extend(removed);
                self.tree.insert_child(parent_id, fresh);
                self.pass.created.push(id);
            }
            None => {
                self.tree.insert_child(parent_id, fresh);
                self.pass.created.push(id);
            }
        }
    }

    fn add_spec(&mut self, spec: &SpecEntry) {
        let suite_id = self.suite_key.clone();
        let mut parent_id = suite_id.clone();
        let mut ancestors = vec![suite_id];

        for (depth, name) in spec.container_path.iter().enumerate() {
            let container_path = spec.container_path[..=depth].to_vec();
            let (file, line) = self.display_location(
                spec.container_locations
                    .get(depth)
                    .and_then(Option::as_ref),
            );
            let container_key = keys::container_key(&self.suite_key, &container_path);
            let id = self.claim_id(&parent_id, name, Some(&container_key));
            let node = TreeNode::new(
                id.clone(),
                name.clone(),
                file,
                line,
                NodeKind::Container(ContainerMeta {
                    suite_key: self.suite_key.clone(),
                    container_key,
                    container_path,
                    descendant_leaf_keys: BTreeSet::new(),
                }),
            );
            self.upsert(&parent_id, node);
            ancestors.push(id.clone());
            parent_id = id;
        }

        let location = spec.leaf_location.as_ref().map(|loc| SourceLocation {
            file: keys::resolve_location_file(&self.suite_path, &loc.file),
            line: loc.line,
        });
        let leaf_key = keys::leaf_key(
            &self.suite_key,
            &spec.container_path,
            &spec.leaf_text,
            location.as_ref().map(|l| (l.file.as_path(), l.line)),
        );
        let fallback_leaf_key =
            keys::fallback_leaf_key(&self.suite_key, &spec.container_path, &spec.leaf_text);

        let id = self.claim_id(&parent_id, &spec.leaf_text, None);
        let index_key = self.index.register_leaf(&leaf_key, &fallback_leaf_key, &id);
        let (file, line) = match &location {
            Some(loc) => (loc.file.clone(), loc.line),
            None => (self.suite_path.clone(), 1),
        };
        let node = TreeNode::new(
            id,
            spec.leaf_text.clone(),
            file,
            line,
            NodeKind::Leaf(LeafMeta {
                suite_key: self.suite_key.clone(),
                container_path: spec.container_path.clone(),
                leaf_text: spec.leaf_text.clone(),
                leaf_key,
                fallback_leaf_key,
                index_key: index_key.clone(),
                location,
            }),
        );
        self.upsert(&parent_id, node);

        for ancestor_id in &ancestors {
            let Some(ancestor) = self.tree.get_mut(ancestor_id) else {
                continue;
            };
            if let Some(leaf_keys) = ancestor.kind.descendant_leaf_keys_mut() {
                leaf_keys.insert(index_key.clone());
            }
            if let Some(group_key) = ancestor.kind.group_key() {
                self.index.add_group_leaf(group_key, &index_key);
            }
        }
    }

    /// Apply the visit order to every node produced this pass, deleting
    /// children that were not produced.
    fn prune(&mut self) {
        let parents: Vec<String> = self
            .pass
            .touched
            .iter()
            .filter(|id| self.tree.get(id).is_some_and(|n| !n.is_leaf()))
            .cloned()
            .collect();

        for parent_id in parents {
            let order: Vec<String> = self
                .child_order
                .remove(&parent_id)
                .unwrap_or_default()
                .into_iter()
                .filter(|id| self.tree.contains(id))
                .collect();
            let removed = self.tree.set_children(&parent_id, order);
            self.pass.removed.extend(removed);
        }
    }
}

fn suite_label(report: &SuiteReport, suite_path: &Path, suite_key: &str) -> String {
    if !report.suite_description.is_empty() {
        return report.suite_description.clone();
    }
    suite_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| suite_key.to_string())
}

/// Reconcile one suite's part of the tree against `report`, registering its
/// leaves into `index`.
///
/// `index` should be the next-generation index being built for the current
/// discovery pass, not the one in use.
pub fn reconcile_suite(
    tree: &mut TestTree,
    index: &mut LookupIndex,
    root: &Path,
    report: &SuiteReport,
) -> SuitePass {
    let suite_key = keys::suite_key(root, &report.suite_path);
    let suite_path = PathBuf::from(&suite_key);
    let label = suite_label(report, &suite_path, &suite_key);
    let kind = NodeKind::Suite(SuiteMeta {
        suite_key: suite_key.clone(),
        suite_path: suite_path.clone(),
        descendant_leaf_keys: BTreeSet::new(),
    });

    let mut pass = SuitePass {
        suite_id: suite_key.clone(),
        ..SuitePass::default()
    };

    match tree.get(&suite_key).map(TreeNode::is_suite) {
        Some(true) => {
            if let Some(existing) = tree.get_mut(&suite_key) {
                existing.label = label;
                existing.file = suite_path.clone();
                existing.kind = kind;
            }
        }
        Some(false) => {
            pass.removed.extend(tree.remove(&suite_key));
            tree.insert_root(TreeNode::new(&suite_key, label, suite_path.clone(), 1, kind));
            pass.created.push(suite_key.clone());
        }
        None => {
            tree.insert_root(TreeNode::new(&suite_key, label, suite_path.clone(), 1, kind));
            pass.created.push(suite_key.clone());
        }
    }
    if let Some(node) = tree.get_mut(&suite_key) {
        node.busy = true;
    }

    pass.touched.push(suite_key.clone());
    let mut seen = HashSet::new();
    seen.insert(suite_key.clone());

    let mut builder = SuiteBuilder {
        tree,
        index,
        suite_key: suite_key.clone(),
        suite_path,
        seen,
        child_order: HashMap::new(),
        pass,
    };

    for spec in report.specs.iter().filter(|s| !s.is_suite_level()) {
        builder.add_spec(spec);
    }
    builder.prune();

    let SuiteBuilder { tree, pass, .. } = builder;
    if let Some(node) = tree.get_mut(&suite_key) {
        node.busy = false;
    }

    tracing::debug!(
        suite = suite_key.as_str(),
        touched = pass.touched.len(),
        created = pass.created.len(),
        removed = pass.removed.len(),
        "reconciled suite"
    );
    pass
}

/// Merge reports that resolve to the same suite, keeping first-seen order.
fn merge_by_suite(root: &Path, reports: &[SuiteReport]) -> Vec<SuiteReport> {
    let mut merged: Vec<SuiteReport> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for report in reports {
        let key = keys::suite_key(root, &report.suite_path);
        match positions.get(&key) {
            Some(&pos) => merged[pos].specs.extend(report.specs.iter().cloned()),
            None => {
                positions.insert(key, merged.len());
                merged.push(report.clone());
            }
        }
    }
    merged
}

/// Run a full discovery pass over `reports`.
///
/// Every suite is built into a fresh index, which replaces `index` only after
/// all suites are done; suites absent from `reports` are deleted afterwards.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use spectree::v1::{LookupIndex, SpecEntry, SpecState, SuiteReport, TestTree, reconcile};
///
/// let report = SuiteReport::new("/pkg/widgets_suite_test.go", "Widgets Suite").with_spec(
///     SpecEntry::new(["Widget"], "creates correctly")
///         .with_leaf_location("/pkg/widget_test.go", 42)
///         .with_state(SpecState::Passed),
/// );
///
/// let mut tree = TestTree::new();
/// let mut index = LookupIndex::new();
/// let first = reconcile::reconcile_all(&mut tree, &mut index, Path::new("/"), &[report.clone()]);
/// assert_eq!(first.created_count(), 3);
///
/// let leaf_id = index.node_for_leaf("/pkg/widget_test.go:42").unwrap();
/// assert_eq!(tree.get(leaf_id).unwrap().label, "creates correctly");
///
/// let second = reconcile::reconcile_all(&mut tree, &mut index, Path::new("/"), &[report]);
/// assert!(second.is_unchanged());
/// ```
pub fn reconcile_all(
    tree: &mut TestTree,
    index: &mut LookupIndex,
    root: &Path,
    reports: &[SuiteReport],
) -> DiscoveryPass {
    let merged = merge_by_suite(root, reports);

    let mut next = LookupIndex::new();
    let suites: Vec<SuitePass> = merged
        .iter()
        .map(|report| reconcile_suite(tree, &mut next, root, report))
        .collect();

    *index = next;

    let live: HashSet<&str> = suites.iter().map(|s| s.suite_id.as_str()).collect();
    let stale: Vec<String> = tree
        .root_ids()
        .iter()
        .filter(|id| !live.contains(id.as_str()))
        .cloned()
        .collect();

    let mut removed_suites = Vec::new();
    for id in stale {
        removed_suites.extend(tree.remove(&id));
    }

    tracing::debug!(
        suites = suites.len(),
        leaves = index.leaf_count(),
        removed_suites = removed_suites.len(),
        "discovery pass reconciled"
    );

    DiscoveryPass {
        suites,
        removed_suites,
    }
}
