use std::fmt;

use log::debug;
use mwfd_core::{FaceId, Name};
use serde::{Deserialize, Serialize};

use super::name_tree::NameTree;
use super::{FibEntryId, NodeId};

/// One upstream of a FIB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u64,
    pub flags: u64,
}

/// A prefix and its next-hop set, unique per face, sorted by
/// (cost, face id) for reading.
#[derive(Debug)]
pub struct FibEntry {
    prefix: Name,
    node: NodeId,
    next_hops: Vec<NextHop>,
}

impl FibEntry {
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn next_hops(&self) -> &[NextHop] {
        &self.next_hops
    }

    pub fn has_next_hops(&self) -> bool {
        !self.next_hops.is_empty()
    }

    fn sort(&mut self) {
        self.next_hops.sort_by_key(|nh| (nh.cost, nh.face));
    }
}

/// RIB-facing update operation, applied to the FIB of every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FibAction {
    AddNextHop,
    RemoveNextHop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibUpdate {
    pub action: FibAction,
    pub name: Name,
    pub face: FaceId,
    pub cost: u64,
    pub flags: u64,
}

impl FibUpdate {
    pub fn add(name: Name, face: FaceId, cost: u64, flags: u64) -> Self {
        Self {
            action: FibAction::AddNextHop,
            name,
            face,
            cost,
            flags,
        }
    }

    pub fn remove(name: Name, face: FaceId) -> Self {
        Self {
            action: FibAction::RemoveNextHop,
            name,
            face,
            cost: 0,
            flags: 0,
        }
    }
}

impl fmt::Display for FibUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            FibAction::AddNextHop => write!(
                f,
                "FibUpdate(add {} face {} cost {})",
                self.name, self.face, self.cost
            ),
            FibAction::RemoveNextHop => {
                write!(f, "FibUpdate(remove {} face {})", self.name, self.face)
            }
        }
    }
}

/// Longest-prefix next-hop table. The root entry always exists; with an
/// empty next-hop set it stands for "no route", so lookups never fail.
pub struct Fib {
    entries: Vec<Option<FibEntry>>,
    free: Vec<usize>,
    root: FibEntryId,
    len: usize,
}

impl Fib {
    pub fn new(tree: &mut NameTree) -> Self {
        let root_node = tree.root();
        let root_entry = FibEntry {
            prefix: Name::new(),
            node: root_node,
            next_hops: Vec::new(),
        };
        let root = FibEntryId(0);
        tree.get_mut(root_node).fib = Some(root);
        Self {
            entries: vec![Some(root_entry)],
            free: Vec::new(),
            root,
            len: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> FibEntryId {
        self.root
    }

    pub fn entry(&self, id: FibEntryId) -> &FibEntry {
        self.entries[id.0].as_ref().unwrap()
    }

    /// Find or create the entry for `prefix`.
    pub fn insert(&mut self, tree: &mut NameTree, prefix: &Name) -> (FibEntryId, bool) {
        let node = tree.lookup(prefix);
        if let Some(existing) = tree.get(node).fib {
            return (existing, false);
        }
        let entry = FibEntry {
            prefix: prefix.clone(),
            node,
            next_hops: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                FibEntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                FibEntryId(self.entries.len() - 1)
            }
        };
        tree.get_mut(node).fib = Some(id);
        self.len += 1;
        debug!("fib insert {}", prefix);
        (id, true)
    }

    /// Erase the entry for `prefix`. The root entry cannot be erased.
    pub fn erase(&mut self, tree: &mut NameTree, prefix: &Name) -> bool {
        let Some(node) = tree.find_exact(prefix) else {
            return false;
        };
        let Some(id) = tree.get(node).fib else {
            return false;
        };
        if id == self.root {
            return false;
        }
        tree.get_mut(node).fib = None;
        self.entries[id.0] = None;
        self.free.push(id.0);
        self.len -= 1;
        tree.cleanup_if_empty(node);
        debug!("fib erase {}", prefix);
        true
    }

    /// Longest-prefix match with the has-next-hops predicate; falls back to
    /// the root "no route" entry, never fails.
    pub fn find_longest_prefix_match(&self, tree: &NameTree, name: &Name) -> FibEntryId {
        tree.find_longest_prefix_match(name, |node| {
            node.fib.map_or(false, |id| self.entry(id).has_next_hops())
        })
        .and_then(|node| tree.get(node).fib)
        .unwrap_or(self.root)
    }

    /// Add or update a next hop; returns whether the face was new on this
    /// entry.
    pub fn add_next_hop(&mut self, id: FibEntryId, face: FaceId, cost: u64, flags: u64) -> bool {
        let entry = self.entries[id.0].as_mut().unwrap();
        let is_new = match entry.next_hops.iter_mut().find(|nh| nh.face == face) {
            Some(existing) => {
                existing.cost = cost;
                existing.flags = flags;
                false
            }
            None => {
                entry.next_hops.push(NextHop { face, cost, flags });
                true
            }
        };
        entry.sort();
        is_new
    }

    /// Remove the next hop via `face`; erases the entry when the set
    /// becomes empty (root excepted).
    pub fn remove_next_hop(&mut self, tree: &mut NameTree, id: FibEntryId, face: FaceId) -> bool {
        let entry = self.entries[id.0].as_mut().unwrap();
        let before = entry.next_hops.len();
        entry.next_hops.retain(|nh| nh.face != face);
        let removed = entry.next_hops.len() != before;
        if removed && entry.next_hops.is_empty() && id != self.root {
            let prefix = entry.prefix.clone();
            self.erase(tree, &prefix);
        }
        removed
    }

    /// FaceDown cascade: remove `face` from every entry.
    pub fn remove_face(&mut self, tree: &mut NameTree, face: FaceId) {
        let affected: Vec<FibEntryId> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| {
                e.as_ref()
                    .filter(|entry| entry.next_hops.iter().any(|nh| nh.face == face))
                    .map(|_| FibEntryId(slot))
            })
            .collect();
        for id in affected {
            self.remove_next_hop(tree, id, face);
        }
    }

    /// Apply one RIB update; returns the entry and whether a next hop was
    /// newly added (for strategy notification).
    pub fn apply_update(&mut self, tree: &mut NameTree, update: &FibUpdate) -> Option<(FibEntryId, bool)> {
        debug!("{}", update);
        match update.action {
            FibAction::AddNextHop => {
                let (id, _) = self.insert(tree, &update.name);
                let is_new = self.add_next_hop(id, update.face, update.cost, update.flags);
                Some((id, is_new))
            }
            FibAction::RemoveNextHop => {
                let node = tree.find_exact(&update.name)?;
                let id = tree.get(node).fib?;
                self.remove_next_hop(tree, id, update.face);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpm_falls_back_to_root_no_route() {
        let mut tree = NameTree::new();
        let fib = Fib::new(&mut tree);
        let id = fib.find_longest_prefix_match(&tree, &Name::from_uri("/nowhere"));
        assert_eq!(id, fib.root());
        assert!(!fib.entry(id).has_next_hops());
    }

    #[test]
    fn lpm_prefers_longest_prefix_with_next_hops() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new(&mut tree);
        let (a, _) = fib.insert(&mut tree, &Name::from_uri("/a"));
        fib.add_next_hop(a, 1, 10, 0);
        let (ab, _) = fib.insert(&mut tree, &Name::from_uri("/a/b"));
        fib.add_next_hop(ab, 2, 10, 0);
        // an entry without next hops never matches
        fib.insert(&mut tree, &Name::from_uri("/a/b/c"));

        let hit = fib.find_longest_prefix_match(&tree, &Name::from_uri("/a/b/c/d"));
        assert_eq!(hit, ab);
        let hit = fib.find_longest_prefix_match(&tree, &Name::from_uri("/a/x"));
        assert_eq!(hit, a);
    }

    #[test]
    fn next_hops_unique_per_face_and_cost_ordered() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new(&mut tree);
        let (id, _) = fib.insert(&mut tree, &Name::from_uri("/a"));
        assert!(fib.add_next_hop(id, 7, 30, 0));
        assert!(fib.add_next_hop(id, 5, 20, 0));
        assert!(fib.add_next_hop(id, 9, 20, 0));
        // updating an existing face is not an addition
        assert!(!fib.add_next_hop(id, 7, 5, 0));

        let faces: Vec<_> = fib.entry(id).next_hops().iter().map(|nh| nh.face).collect();
        assert_eq!(faces, vec![7, 5, 9]);
    }

    #[test]
    fn removing_last_next_hop_erases_entry() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new(&mut tree);
        let prefix = Name::from_uri("/a/b");
        let (id, _) = fib.insert(&mut tree, &prefix);
        fib.add_next_hop(id, 3, 1, 0);
        assert_eq!(fib.len(), 2);
        fib.remove_next_hop(&mut tree, id, 3);
        assert_eq!(fib.len(), 1);
        assert!(tree.find_exact(&prefix).is_none());
    }

    #[test]
    fn apply_update_round_trip() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new(&mut tree);
        let update = FibUpdate::add(Name::from_uri("/r"), 4, 8, 0);
        let (id, is_new) = fib.apply_update(&mut tree, &update).unwrap();
        assert!(is_new);
        assert_eq!(fib.entry(id).next_hops()[0].face, 4);

        fib.apply_update(&mut tree, &FibUpdate::remove(Name::from_uri("/r"), 4));
        assert_eq!(fib.len(), 1);
    }

    #[test]
    fn remove_face_cascades() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new(&mut tree);
        let (a, _) = fib.insert(&mut tree, &Name::from_uri("/a"));
        fib.add_next_hop(a, 1, 1, 0);
        fib.add_next_hop(a, 2, 2, 0);
        let (b, _) = fib.insert(&mut tree, &Name::from_uri("/b"));
        fib.add_next_hop(b, 1, 1, 0);

        fib.remove_face(&mut tree, 1);
        assert_eq!(fib.entry(a).next_hops().len(), 1);
        // /b lost its only next hop and was erased
        assert_eq!(fib.len(), 2);
        assert!(tree.find_exact(&Name::from_uri("/b")).is_none());
    }
}
