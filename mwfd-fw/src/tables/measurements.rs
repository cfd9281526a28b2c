use std::collections::HashMap;
use std::time::{Duration, Instant};

use mwfd_core::Name;

use super::name_tree::NameTree;
pub(crate) use super::MeasurementsEntryId;

/// Shortest lifetime granted to an entry on each touch.
pub const MEASUREMENTS_LIFETIME_FLOOR: Duration = Duration::from_secs(4);

/// Per-prefix scratch space for strategies: named numeric values with an
/// expiry that every touch extends.
pub struct MeasurementsEntry {
    name: Name,
    node: super::NodeId,
    pub(crate) expiry: Instant,
    values: HashMap<String, f64>,
}

impl MeasurementsEntry {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn get_value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn set_value(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

/// The measurements table of one worker.
pub struct Measurements {
    entries: Vec<Option<MeasurementsEntry>>,
    free: Vec<usize>,
    len: usize,
}

impl Measurements {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: MeasurementsEntryId) -> &MeasurementsEntry {
        self.entries[id.0].as_ref().unwrap()
    }

    pub fn get_mut(&mut self, id: MeasurementsEntryId) -> &mut MeasurementsEntry {
        self.entries[id.0].as_mut().unwrap()
    }

    /// Find or create the entry for `name` and extend its lifetime.
    pub fn lookup(&mut self, tree: &mut NameTree, name: &Name, now: Instant) -> MeasurementsEntryId {
        let node = tree.lookup(name);
        if let Some(id) = tree.get(node).measurements {
            self.extend_lifetime(id, MEASUREMENTS_LIFETIME_FLOOR, now);
            return id;
        }
        let entry = MeasurementsEntry {
            name: name.clone(),
            node,
            expiry: now + MEASUREMENTS_LIFETIME_FLOOR,
            values: HashMap::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                MeasurementsEntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                MeasurementsEntryId(self.entries.len() - 1)
            }
        };
        tree.get_mut(node).measurements = Some(id);
        self.len += 1;
        id
    }

    /// Deepest entry on the path to `name`, if any.
    pub fn find_longest_prefix_match(&self, tree: &NameTree, name: &Name) -> Option<MeasurementsEntryId> {
        tree.find_longest_prefix_match(name, |node| node.measurements.is_some())
            .and_then(|node| tree.get(node).measurements)
    }

    /// Keep the entry alive for at least `lifetime` from `now`.
    pub fn extend_lifetime(&mut self, id: MeasurementsEntryId, lifetime: Duration, now: Instant) {
        let lifetime = lifetime.max(MEASUREMENTS_LIFETIME_FLOOR);
        let entry = self.get_mut(id);
        let expiry = now + lifetime;
        if expiry > entry.expiry {
            entry.expiry = expiry;
        }
    }

    /// Drop entries whose lifetime has lapsed.
    pub fn expire_upto(&mut self, tree: &mut NameTree, now: Instant) -> usize {
        let victims: Vec<MeasurementsEntryId> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| {
                e.as_ref()
                    .filter(|entry| entry.expiry <= now)
                    .map(|_| MeasurementsEntryId(slot))
            })
            .collect();
        let count = victims.len();
        for id in victims {
            let entry = self.entries[id.0].take().unwrap();
            tree.get_mut(entry.node).measurements = None;
            tree.cleanup_if_empty(entry.node);
            self.free.push(id.0);
            self.len -= 1;
        }
        count
    }
}

impl Default for Measurements {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_creates_and_lpm_finds() {
        let mut tree = NameTree::new();
        let mut measurements = Measurements::new();
        let now = Instant::now();
        let id = measurements.lookup(&mut tree, &Name::from_uri("/a"), now);
        measurements.get_mut(id).set_value("rtt_ms", 12.5);

        let hit = measurements
            .find_longest_prefix_match(&tree, &Name::from_uri("/a/b/c"))
            .unwrap();
        assert_eq!(hit, id);
        assert_eq!(measurements.get(hit).get_value("rtt_ms"), Some(12.5));
    }

    #[test]
    fn expiry_collects_and_cleans_tree() {
        let mut tree = NameTree::new();
        let mut measurements = Measurements::new();
        let now = Instant::now();
        measurements.lookup(&mut tree, &Name::from_uri("/gone"), now);
        assert_eq!(measurements.len(), 1);

        let later = now + Duration::from_secs(60);
        assert_eq!(measurements.expire_upto(&mut tree, later), 1);
        assert_eq!(measurements.len(), 0);
        assert!(tree.find_exact(&Name::from_uri("/gone")).is_none());
    }

    #[test]
    fn touch_extends_lifetime() {
        let mut tree = NameTree::new();
        let mut measurements = Measurements::new();
        let now = Instant::now();
        let id = measurements.lookup(&mut tree, &Name::from_uri("/keep"), now);
        measurements.extend_lifetime(id, Duration::from_secs(60), now);

        let later = now + Duration::from_secs(10);
        assert_eq!(measurements.expire_upto(&mut tree, later), 0);
        assert_eq!(measurements.len(), 1);
    }
}
