//! Flat parent → children mapping recovered from bucket metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named children of one inode: entry name → child inode id
pub type Children = BTreeMap<String, String>;

/// Mapping from parent inode id to its named children.
///
/// This is the raw graph before reconstruction. Ordered maps keep both
/// serialization and tree traversal deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjacencyMap {
    parents: BTreeMap<String, Children>,
}

impl AdjacencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name → child` under `parent`, merging with existing entries.
    ///
    /// Returns the previous child id when `name` was already present.
    pub fn insert(
        &mut self,
        parent: impl Into<String>,
        name: impl Into<String>,
        child: impl Into<String>,
    ) -> Option<String> {
        self.parents
            .entry(parent.into())
            .or_default()
            .insert(name.into(), child.into())
    }

    pub fn children(&self, id: &str) -> Option<&Children> {
        self.parents.get(id)
    }

    /// Every parent id with at least one recorded entry
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    /// Number of parent ids
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Total number of (parent, name) facts
    pub fn entry_count(&self) -> usize {
        self.parents.values().map(BTreeMap::len).sum()
    }
}

impl<P, N, C> FromIterator<(P, N, C)> for AdjacencyMap
where
    P: Into<String>,
    N: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, N, C)>>(iter: I) -> Self {
        let mut map = AdjacencyMap::new();
        for (parent, name, child) in iter {
            map.insert(parent, name, child);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_merges_into_existing_parent() {
        let mut map = AdjacencyMap::new();
        assert_eq!(map.insert("1", "dirA", "2"), None);
        assert_eq!(map.insert("1", "dirB", "3"), None);
        assert_eq!(map.insert("1", "dirA", "4"), Some("2".to_string()));

        assert_eq!(map.len(), 1);
        assert_eq!(map.entry_count(), 2);
        assert_eq!(map.children("1").unwrap()["dirA"], "4");
    }

    #[test]
    fn test_serializes_as_plain_nested_object() {
        let map: AdjacencyMap = [("1", "dirA", "2"), ("2", "file1", "3")]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"1": {"dirA": "2"}, "2": {"file1": "3"}})
        );

        let back: AdjacencyMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
