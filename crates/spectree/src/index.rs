//! Reverse lookups from report keys to tree nodes.
//!
//! A fresh [`LookupIndex`] is built on every discovery pass and swapped in
//! whole once the pass completes; it is never patched incrementally.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, Serialize)]
pub struct LookupIndex {
    /// Leaf key → leaf node id.
    leaf_nodes: HashMap<String, String>,
    /// Container (or suite) key → keys of every leaf beneath it.
    group_leaf_keys: HashMap<String, BTreeSet<String>>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf and return the key it was actually stored under.
    ///
    /// The first leaf to claim `leaf_key` keeps it. A later leaf computing the
    /// same key is stored under its `fallback_key` instead; if that is taken
    /// too, the later registration replaces the earlier one.
    pub fn register_leaf(&mut self, leaf_key: &str, fallback_key: &str, node_id: &str) -> String {
        let key = match self.leaf_nodes.get(leaf_key) {
            Some(existing) if existing != node_id => {
                tracing::debug!(
                    key = leaf_key,
                    first = existing.as_str(),
                    second = node_id,
                    "leaf key collision, re-indexing under fallback key"
                );
                fallback_key
            }
            _ => leaf_key,
        };

        if let Some(previous) = self.leaf_nodes.insert(key.to_string(), node_id.to_string())
            && previous != node_id
        {
            tracing::warn!(
                key,
                replaced = previous.as_str(),
                by = node_id,
                "ambiguous fallback key, last registration wins"
            );
        }
        key.to_string()
    }

    /// Record `leaf_key` as a descendant of the group identified by `group_key`.
    pub fn add_group_leaf(&mut self, group_key: &str, leaf_key: &str) {
        self.group_leaf_keys
            .entry(group_key.to_string())
            .or_default()
            .insert(leaf_key.to_string());
    }

    pub fn node_for_leaf(&self, leaf_key: &str) -> Option<&str> {
        self.leaf_nodes.get(leaf_key).map(String::as_str)
    }

    pub fn leaf_keys_for_group(&self, group_key: &str) -> Option<&BTreeSet<String>> {
        self.group_leaf_keys.get(group_key)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_nodes.len()
    }

    pub fn group_count(&self) -> usize {
        self.group_leaf_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_nodes.is_empty() && self.group_leaf_keys.is_empty()
    }
}
