//! Tree materialization from an adjacency map
//!
//! Starting at the root, every child id that still sits in the pool of
//! unexpanded ids is replaced by that id's own children, recursively. An id
//! leaves the pool the moment it is expanded, so each inode is expanded at most
//! once across the whole tree. References that find nothing left in the pool
//! (hard links, stale entries, cycles, the root itself) stay as raw id leaves.
//!
//! Children are visited in entry-name order, depth first. When an inode has
//! several referents, the first one in that order receives the subtree.
//!
//! Directory chains can be as deep as the bucket is large, so expansion,
//! traversal and teardown all run on explicit heap stacks.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use crate::adjacency::{AdjacencyMap, Children};

/// Well-known inode id of the filesystem root
pub const ROOT_INODE: &str = "1";

/// One directory entry in the reconstructed tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Inode id that was not expanded
    Inode(String),
    /// Expanded subtree
    Directory(MaterializedTree),
}

impl Node {
    pub fn as_directory(&self) -> Option<&MaterializedTree> {
        match self {
            Node::Inode(_) => None,
            Node::Directory(tree) => Some(tree),
        }
    }
}

/// Reconstructed hierarchy: entry name → node
///
/// The derived `Clone`, `PartialEq`, `Debug` and `Serialize` impls recurse per
/// level. Use `output::write_tree_json` to encode trees of unbounded depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterializedTree {
    pub(crate) entries: BTreeMap<String, Node>,
}

impl MaterializedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a node by `/`-separated entry names
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        let mut names = path.split('/').filter(|n| !n.is_empty());
        let mut node = self.get(names.next()?)?;
        for name in names {
            node = node.as_directory()?.get(name)?;
        }
        Some(node)
    }

    /// Every raw-id leaf as a (`/`-joined path, inode id) pair, in tree order
    pub fn leaves(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        // One shared path buffer; each frame remembers where its prefix ends.
        let mut path = String::new();
        let mut stack: Vec<(btree_map::Iter<'_, String, Node>, Option<usize>)> =
            vec![(self.entries.iter(), None)];

        while let Some((entries, prefix_len)) = stack.last_mut() {
            let prefix_len = *prefix_len;
            let Some((name, node)) = entries.next() else {
                stack.pop();
                continue;
            };

            match prefix_len {
                Some(len) => {
                    path.truncate(len);
                    path.push('/');
                }
                None => path.clear(),
            }
            path.push_str(name);

            match node {
                Node::Inode(id) => out.push((path.clone(), id.clone())),
                Node::Directory(tree) => stack.push((tree.entries.iter(), Some(path.len()))),
            }
        }

        out
    }

    /// Number of expanded subtrees, at any depth
    pub fn directory_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(tree) = pending.pop() {
            for subtree in tree.entries.values().filter_map(Node::as_directory) {
                count += 1;
                pending.push(subtree);
            }
        }
        count
    }
}

impl Drop for MaterializedTree {
    fn drop(&mut self) {
        // Detach nested maps first so no drop glue runs more than one level deep.
        let mut pending = vec![std::mem::take(&mut self.entries)];
        while let Some(entries) = pending.pop() {
            for (_, node) in entries {
                if let Node::Directory(mut subtree) = node {
                    pending.push(std::mem::take(&mut subtree.entries));
                }
            }
        }
    }
}

/// Counters describing one materialization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Ids replaced by their subtree
    pub expanded: usize,
    /// Leaves whose id has no adjacency entry
    pub dangling: usize,
    /// Leaves whose id has an entry that was already expanded, or is the root
    pub repeated: usize,
    /// Ids with an entry that were never reached from the root
    pub unreachable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Materialized {
    pub tree: MaterializedTree,
    pub stats: MaterializeStats,
}

/// Builds the nested tree from a complete adjacency map
pub struct TreeMaterializer<'a> {
    adjacency: &'a AdjacencyMap,
    root: String,
}

impl<'a> TreeMaterializer<'a> {
    pub fn new(adjacency: &'a AdjacencyMap) -> Self {
        Self::with_root(adjacency, ROOT_INODE)
    }

    pub fn with_root(adjacency: &'a AdjacencyMap, root: impl Into<String>) -> Self {
        Self {
            adjacency,
            root: root.into(),
        }
    }

    pub fn materialize(&self) -> Materialized {
        tracing::info!("Building directory mapping.");

        let mut stats = MaterializeStats::default();

        let Some(root_children) = self.adjacency.children(&self.root) else {
            tracing::warn!(
                "Root inode {} has no entries; the bucket is empty or not a NAS bridge bucket",
                self.root
            );
            stats.unreachable = self.adjacency.ids().map(str::to_string).collect();
            return Materialized {
                tree: MaterializedTree::new(),
                stats,
            };
        };

        let mut pool: BTreeSet<String> = self
            .adjacency
            .ids()
            .filter(|id| *id != self.root)
            .map(str::to_string)
            .collect();

        let tree = self.expand(root_children, &mut pool, &mut stats);

        stats.unreachable = pool.into_iter().collect();
        if !stats.unreachable.is_empty() {
            tracing::warn!(
                "{} inode(s) are not reachable from root {} and were dropped",
                stats.unreachable.len(),
                self.root
            );
            tracing::debug!("Unreachable inodes: {:?}", stats.unreachable);
        }

        tracing::info!(
            "Directory mapping complete: {} expanded, {} dangling, {} repeated",
            stats.expanded,
            stats.dangling,
            stats.repeated
        );

        Materialized { tree, stats }
    }

    /// Substitute every child id still in `pool` with its own subtree.
    ///
    /// The id is removed before descending, so siblings and cousins visited
    /// later never expand it again. Each open directory is one `Frame`; a frame
    /// is folded into its parent once its children are exhausted.
    fn expand(
        &self,
        root_children: &'a Children,
        pool: &mut BTreeSet<String>,
        stats: &mut MaterializeStats,
    ) -> MaterializedTree {
        let mut stack = vec![Frame::new(None, root_children)];

        while let Some(frame) = stack.last_mut() {
            if let Some((name, id)) = frame.children.next() {
                match self.adjacency.children(id) {
                    Some(grandchildren) if pool.remove(id) => {
                        stats.expanded += 1;
                        stack.push(Frame::new(Some(name), grandchildren));
                    }
                    Some(_) => {
                        stats.repeated += 1;
                        frame.entries.insert(name.clone(), Node::Inode(id.clone()));
                    }
                    None => {
                        stats.dangling += 1;
                        frame.entries.insert(name.clone(), Node::Inode(id.clone()));
                    }
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            let tree = MaterializedTree {
                entries: done.entries,
            };
            match (stack.last_mut(), done.name) {
                (Some(parent), Some(name)) => {
                    parent.entries.insert(name.clone(), Node::Directory(tree));
                }
                _ => return tree,
            }
        }

        MaterializedTree::new()
    }
}

/// Directory being expanded: its remaining children and the entries built so far
struct Frame<'a> {
    name: Option<&'a String>,
    children: btree_map::Iter<'a, String, String>,
    entries: BTreeMap<String, Node>,
}

impl<'a> Frame<'a> {
    fn new(name: Option<&'a String>, children: &'a Children) -> Self {
        Self {
            name,
            children: children.iter(),
            entries: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adjacency(facts: &[(&str, &str, &str)]) -> AdjacencyMap {
        facts.iter().copied().collect()
    }

    #[test]
    fn test_simple_tree() {
        let map = adjacency(&[("1", "dirA", "2"), ("2", "file1", "3")]);

        let result = TreeMaterializer::new(&map).materialize();

        assert_eq!(
            serde_json::to_value(&result.tree).unwrap(),
            json!({"dirA": {"file1": "3"}})
        );
        assert_eq!(result.stats.expanded, 1);
        assert_eq!(result.stats.dangling, 1);
        assert!(result.stats.unreachable.is_empty());
    }

    #[test]
    fn test_first_referent_in_name_order_wins() {
        let map = adjacency(&[("1", "y", "2"), ("1", "x", "2"), ("2", "f", "3")]);

        let result = TreeMaterializer::new(&map).materialize();

        assert_eq!(
            serde_json::to_value(&result.tree).unwrap(),
            json!({"x": {"f": "3"}, "y": "2"})
        );
        assert_eq!(result.stats.repeated, 1);
    }

    #[test]
    fn test_removal_is_visible_to_cousins() {
        // "4" is reachable from both a/ and b/; a/ is visited first.
        let map = adjacency(&[
            ("1", "a", "2"),
            ("1", "b", "3"),
            ("2", "shared", "4"),
            ("3", "link", "4"),
            ("4", "data", "5"),
        ]);

        let tree = TreeMaterializer::new(&map).materialize().tree;

        assert_eq!(
            tree.lookup("a/shared"),
            Some(&Node::Directory(adjacency_tree(&[("data", "5")])))
        );
        assert_eq!(tree.lookup("b/link"), Some(&Node::Inode("4".to_string())));
    }

    #[test]
    fn test_missing_root_yields_empty_tree() {
        let map = adjacency(&[("2", "file1", "3")]);

        let result = TreeMaterializer::new(&map).materialize();

        assert!(result.tree.is_empty());
        assert_eq!(result.stats.unreachable, vec!["2".to_string()]);
    }

    #[test]
    fn test_cycle_terminates() {
        let map = adjacency(&[("1", "a", "2"), ("2", "b", "3"), ("3", "c", "2")]);

        let tree = TreeMaterializer::new(&map).materialize().tree;

        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"a": {"b": {"c": "2"}}})
        );
    }

    #[test]
    fn test_reference_back_to_root_stays_raw() {
        let map = adjacency(&[("1", "a", "2"), ("2", "up", "1")]);

        let result = TreeMaterializer::new(&map).materialize();

        assert_eq!(result.tree.lookup("a/up"), Some(&Node::Inode("1".to_string())));
        assert_eq!(result.stats.repeated, 1);
    }

    #[test]
    fn test_custom_root() {
        let map = adjacency(&[("1", "a", "2"), ("2", "b", "3")]);

        let tree = TreeMaterializer::with_root(&map, "2").materialize().tree;

        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"b": "3"}));
    }

    #[test]
    fn test_leaves_and_directory_count() {
        let map = adjacency(&[
            ("1", "docs", "2"),
            ("1", "readme", "9"),
            ("2", "a.txt", "10"),
            ("2", "old", "3"),
            ("3", "b.txt", "11"),
        ]);

        let tree = TreeMaterializer::new(&map).materialize().tree;

        assert_eq!(tree.directory_count(), 2);
        assert_eq!(
            tree.leaves(),
            vec![
                ("docs/a.txt".to_string(), "10".to_string()),
                ("docs/old/b.txt".to_string(), "11".to_string()),
                ("readme".to_string(), "9".to_string()),
            ]
        );
    }

    /// `i → {"d": i + 1}` for every i in `1..=n`
    fn chain(n: usize) -> AdjacencyMap {
        (1..=n)
            .map(|i| (i.to_string(), "d", (i + 1).to_string()))
            .collect()
    }

    #[test]
    fn test_long_chain_does_not_exhaust_stack() {
        let n = 100_000;
        let map = chain(n);

        let result = TreeMaterializer::new(&map).materialize();

        assert_eq!(result.stats.expanded, n - 1);
        assert_eq!(result.stats.dangling, 1);
        assert_eq!(result.stats.repeated, 0);
        assert!(result.stats.unreachable.is_empty());
        assert_eq!(result.tree.directory_count(), n - 1);

        let leaves = result.tree.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, vec!["d"; n].join("/"));
        assert_eq!(leaves[0].1, (n + 1).to_string());

        // Walk down without recursion to check every level is present.
        let mut depth = 0;
        let mut node = result.tree.get("d");
        while let Some(Node::Directory(tree)) = node {
            depth += 1;
            node = tree.get("d");
        }
        assert_eq!(depth, n - 1);
        assert_eq!(node, Some(&Node::Inode((n + 1).to_string())));
    }

    #[test]
    fn test_long_cycle_keeps_pre_order() {
        // 1 → 2 → ... → n → 2, plus a second way into 3 that sorts later.
        let n = 50_000;
        let mut map = chain(n - 1);
        map.insert(n.to_string(), "back", "2");
        map.insert("1", "z", "3");

        let result = TreeMaterializer::new(&map).materialize();

        assert_eq!(result.stats.expanded, n - 1);
        assert_eq!(result.stats.repeated, 2);
        assert_eq!(result.stats.dangling, 0);
        assert_eq!(result.tree.get("z"), Some(&Node::Inode("3".to_string())));
        let last = format!("{}/back", vec!["d"; n - 1].join("/"));
        assert_eq!(
            result.tree.leaves(),
            vec![
                (last, "2".to_string()),
                ("z".to_string(), "3".to_string()),
            ]
        );
    }

    fn adjacency_tree(entries: &[(&str, &str)]) -> MaterializedTree {
        MaterializedTree {
            entries: entries
                .iter()
                .map(|(name, id)| (name.to_string(), Node::Inode(id.to_string())))
                .collect(),
        }
    }
}
