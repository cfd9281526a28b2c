use log::debug;
use mwfd_core::Name;

use super::name_tree::NameTree;
use super::StrategyChoiceEntryId;

/// One per-prefix strategy selection.
pub struct StrategyChoiceEntry {
    prefix: Name,
    node: super::NodeId,
    instance_name: Name,
}

impl StrategyChoiceEntry {
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn instance_name(&self) -> &Name {
        &self.instance_name
    }
}

/// Maps name prefixes to the strategy governing them. The root prefix is
/// always bound, so every name has an effective strategy.
pub struct StrategyChoice {
    entries: Vec<Option<StrategyChoiceEntry>>,
    free: Vec<usize>,
    root: StrategyChoiceEntryId,
    len: usize,
}

impl StrategyChoice {
    pub fn new(tree: &mut NameTree, default_instance: Name) -> Self {
        let root_node = tree.root();
        let root = StrategyChoiceEntryId(0);
        tree.get_mut(root_node).strategy_choice = Some(root);
        Self {
            entries: vec![Some(StrategyChoiceEntry {
                prefix: Name::new(),
                node: root_node,
                instance_name: default_instance,
            })],
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

    pub fn get(&self, id: StrategyChoiceEntryId) -> &StrategyChoiceEntry {
        self.entries[id.0].as_ref().unwrap()
    }

    /// Bind `prefix` to a strategy instance.
    pub fn set(&mut self, tree: &mut NameTree, prefix: &Name, instance_name: Name) {
        debug!("strategy choice {} -> {}", prefix, instance_name);
        let node = tree.lookup(prefix);
        if let Some(id) = tree.get(node).strategy_choice {
            self.entries[id.0].as_mut().unwrap().instance_name = instance_name;
            return;
        }
        let entry = StrategyChoiceEntry {
            prefix: prefix.clone(),
            node,
            instance_name,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                StrategyChoiceEntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                StrategyChoiceEntryId(self.entries.len() - 1)
            }
        };
        tree.get_mut(node).strategy_choice = Some(id);
        self.len += 1;
    }

    /// Remove the binding for `prefix`; the root binding stays.
    pub fn unset(&mut self, tree: &mut NameTree, prefix: &Name) -> bool {
        if prefix.is_empty() {
            return false;
        }
        let Some(node) = tree.find_exact(prefix) else {
            return false;
        };
        let Some(id) = tree.get(node).strategy_choice else {
            return false;
        };
        tree.get_mut(node).strategy_choice = None;
        self.entries[id.0] = None;
        self.free.push(id.0);
        self.len -= 1;
        tree.cleanup_if_empty(node);
        true
    }

    /// The instance governing `name`: the deepest bound prefix on its path.
    pub fn find_effective(&self, tree: &NameTree, name: &Name) -> &Name {
        let id = tree
            .find_longest_prefix_match(name, |node| node.strategy_choice.is_some())
            .and_then(|node| tree.get(node).strategy_choice)
            .unwrap_or(self.root);
        self.get(id).instance_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_binding_governs_everything() {
        let mut tree = NameTree::new();
        let choice = StrategyChoice::new(&mut tree, Name::from_uri("/strategy/default/v=1"));
        let effective = choice.find_effective(&tree, &Name::from_uri("/any/name"));
        assert_eq!(effective, &Name::from_uri("/strategy/default/v=1"));
    }

    #[test]
    fn deeper_binding_wins() {
        let mut tree = NameTree::new();
        let mut choice = StrategyChoice::new(&mut tree, Name::from_uri("/strategy/default/v=1"));
        choice.set(
            &mut tree,
            &Name::from_uri("/video"),
            Name::from_uri("/strategy/multicast/v=4"),
        );

        assert_eq!(
            choice.find_effective(&tree, &Name::from_uri("/video/movie/seg=1")),
            &Name::from_uri("/strategy/multicast/v=4")
        );
        assert_eq!(
            choice.find_effective(&tree, &Name::from_uri("/text")),
            &Name::from_uri("/strategy/default/v=1")
        );
    }

    #[test]
    fn unset_restores_parent_binding() {
        let mut tree = NameTree::new();
        let mut choice = StrategyChoice::new(&mut tree, Name::from_uri("/strategy/default/v=1"));
        choice.set(
            &mut tree,
            &Name::from_uri("/video"),
            Name::from_uri("/strategy/multicast/v=4"),
        );
        assert!(choice.unset(&mut tree, &Name::from_uri("/video")));
        assert_eq!(
            choice.find_effective(&tree, &Name::from_uri("/video/movie")),
            &Name::from_uri("/strategy/default/v=1")
        );
        // the root binding cannot be removed
        assert!(!choice.unset(&mut tree, &Name::new()));
    }
}
