use std::collections::HashMap;

use log::trace;
use mwfd_core::name::{component_hash, Name, NAME_HASH_SEED};

use super::{FibEntryId, MeasurementsEntryId, NodeId, PitEntryId, StrategyChoiceEntryId};

/// One node per distinct prefix ever referenced by a table.
#[derive(Debug)]
pub struct Node {
    name: Name,
    hash: u64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub(crate) fib: Option<FibEntryId>,
    pub(crate) pit: Vec<PitEntryId>,
    pub(crate) measurements: Option<MeasurementsEntryId>,
    pub(crate) strategy_choice: Option<StrategyChoiceEntryId>,
}

impl Node {
    fn new(name: Name, hash: u64, parent: Option<NodeId>) -> Self {
        Self {
            name,
            hash,
            parent,
            children: Vec::new(),
            fib: None,
            pit: Vec::new(),
            measurements: None,
            strategy_choice: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Precomputed chained hash of this node's name, suitable for embedding
    /// in PIT tokens.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether any table still anchors an entry here.
    fn is_anchor(&self) -> bool {
        self.fib.is_some()
            || !self.pit.is_empty()
            || self.measurements.is_some()
            || self.strategy_choice.is_some()
    }
}

/// Hash-indexed prefix tree interning every name the tables reference.
pub struct NameTree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    buckets: HashMap<u64, Vec<NodeId>>,
    root: NodeId,
    len: usize,
}

impl NameTree {
    pub fn new() -> Self {
        let root_node = Node::new(Name::new(), NAME_HASH_SEED, None);
        let root = NodeId(0);
        let mut buckets: HashMap<u64, Vec<NodeId>> = HashMap::new();
        buckets.insert(NAME_HASH_SEED, vec![root]);
        Self {
            nodes: vec![Some(root_node)],
            free: Vec::new(),
            buckets,
            root,
            len: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.nodes[id.0].as_ref().unwrap()
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0].as_mut().unwrap()
    }

    /// Find the node for `name`, creating it and any missing ancestors.
    pub fn lookup(&mut self, name: &Name) -> NodeId {
        let mut current = self.root;
        let mut hash = NAME_HASH_SEED;
        for depth in 0..name.len() {
            hash = component_hash(hash, name.get(depth).unwrap());
            current = match self.find_in_bucket(hash, name, depth + 1) {
                Some(child) => child,
                None => self.insert_child(current, name.get_prefix(depth + 1), hash),
            };
        }
        current
    }

    /// Find the node for exactly `name`, without creating anything.
    pub fn find_exact(&self, name: &Name) -> Option<NodeId> {
        self.find_in_bucket(name.full_hash(), name, name.len())
    }

    /// Walk up from the deepest present ancestor of `name`, returning the
    /// first node satisfying `predicate`.
    pub fn find_longest_prefix_match<P>(&self, name: &Name, predicate: P) -> Option<NodeId>
    where
        P: Fn(&Node) -> bool,
    {
        let mut deepest = self.root;
        let mut hash = NAME_HASH_SEED;
        for depth in 0..name.len() {
            hash = component_hash(hash, name.get(depth).unwrap());
            match self.find_in_bucket(hash, name, depth + 1) {
                Some(child) => deepest = child,
                None => break,
            }
        }
        let mut cursor = Some(deepest);
        while let Some(id) = cursor {
            let node = self.get(id);
            if predicate(node) {
                return Some(id);
            }
            cursor = node.parent;
        }
        None
    }

    /// Drop `id` and any ancestors that anchor nothing and have no
    /// children left. Called after a table detaches its entry.
    pub fn cleanup_if_empty(&mut self, id: NodeId) {
        let mut cursor = id;
        while cursor != self.root {
            let node = self.get(cursor);
            if node.is_anchor() || !node.children.is_empty() {
                break;
            }
            let parent = node.parent.unwrap();
            let hash = node.hash;
            trace!("name tree gc {}", node.name());
            self.get_mut(parent).children.retain(|c| *c != cursor);
            if let Some(bucket) = self.buckets.get_mut(&hash) {
                bucket.retain(|c| *c != cursor);
                if bucket.is_empty() {
                    self.buckets.remove(&hash);
                }
            }
            self.nodes[cursor.0] = None;
            self.free.push(cursor.0);
            self.len -= 1;
            cursor = parent;
        }
    }

    /// PIT entries anchored at `id` or any descendant, for next-hop change
    /// notification.
    pub(crate) fn collect_pit_under(&self, id: NodeId) -> Vec<PitEntryId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cursor) = stack.pop() {
            let node = self.get(cursor);
            out.extend(node.pit.iter().copied());
            stack.extend(node.children.iter().copied());
        }
        out
    }

    fn find_in_bucket(&self, hash: u64, name: &Name, prefix_len: usize) -> Option<NodeId> {
        let bucket = self.buckets.get(&hash)?;
        bucket
            .iter()
            .copied()
            .find(|id| {
                let node = self.get(*id);
                node.name.len() == prefix_len
                    && node
                        .name
                        .components
                        .iter()
                        .eq(name.components.iter().take(prefix_len))
            })
    }

    fn insert_child(&mut self, parent: NodeId, name: Name, hash: u64) -> NodeId {
        let node = Node::new(name, hash, Some(parent));
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.get_mut(parent).children.push(id);
        self.buckets.entry(hash).or_default().push(id);
        self.len += 1;
        id
    }
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_creates_ancestors() {
        let mut tree = NameTree::new();
        let id = tree.lookup(&Name::from_uri("/a/b/c"));
        assert_eq!(tree.get(id).name().to_uri(), "/a/b/c");
        // root + /a + /a/b + /a/b/c
        assert_eq!(tree.len(), 4);
        assert!(tree.find_exact(&Name::from_uri("/a/b")).is_some());
    }

    #[test]
    fn find_exact_misses_absent_names() {
        let mut tree = NameTree::new();
        tree.lookup(&Name::from_uri("/a/b"));
        assert!(tree.find_exact(&Name::from_uri("/a/c")).is_none());
        assert!(tree.find_exact(&Name::from_uri("/a/b/c")).is_none());
    }

    #[test]
    fn node_hash_matches_name_hash() {
        let mut tree = NameTree::new();
        let name = Name::from_uri("/a/b/c");
        let id = tree.lookup(&name);
        assert_eq!(tree.get(id).hash(), name.full_hash());
    }

    #[test]
    fn longest_prefix_match_honors_predicate() {
        let mut tree = NameTree::new();
        let a = tree.lookup(&Name::from_uri("/a"));
        tree.lookup(&Name::from_uri("/a/b/c"));
        tree.get_mut(a).fib = Some(FibEntryId(42));

        let hit = tree
            .find_longest_prefix_match(&Name::from_uri("/a/b/c/d"), |n| n.fib.is_some())
            .unwrap();
        assert_eq!(hit, a);

        assert!(tree
            .find_longest_prefix_match(&Name::from_uri("/z"), |n| n.fib.is_some())
            .is_none());
    }

    #[test]
    fn cleanup_collects_unanchored_chain() {
        let mut tree = NameTree::new();
        let leaf = tree.lookup(&Name::from_uri("/a/b/c"));
        assert_eq!(tree.len(), 4);
        tree.cleanup_if_empty(leaf);
        assert_eq!(tree.len(), 1);
        assert!(tree.find_exact(&Name::from_uri("/a")).is_none());
    }

    #[test]
    fn cleanup_stops_at_anchor() {
        let mut tree = NameTree::new();
        let a = tree.lookup(&Name::from_uri("/a"));
        let leaf = tree.lookup(&Name::from_uri("/a/b/c"));
        tree.get_mut(a).fib = Some(FibEntryId(0));
        tree.cleanup_if_empty(leaf);
        assert!(tree.find_exact(&Name::from_uri("/a")).is_some());
        assert!(tree.find_exact(&Name::from_uri("/a/b")).is_none());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = NameTree::new();
        let leaf = tree.lookup(&Name::from_uri("/x/y"));
        tree.cleanup_if_empty(leaf);
        let before = tree.nodes.len();
        tree.lookup(&Name::from_uri("/p/q"));
        assert_eq!(tree.nodes.len(), before);
    }
}
