use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, trace};
use mwfd_core::{Data, FaceId, Interest, Name};

use crate::config::CsConfig;

use super::cs_policy::{self, Policy};
use super::CsEntryId;

/// Primary-index key: entries sort by name, then implicit digest, so all
/// descendants of a prefix form one contiguous range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CsKey {
    name: Name,
    digest: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Prefix,
    Exact,
}

struct CsEntry {
    data: Data,
    digest: [u8; 32],
    admitted_via: FaceId,
    fresh_until: Instant,
    tier: Tier,
}

impl CsEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.fresh_until > now
    }
}

/// In-memory Data cache. The primary tier is prefix-match capable; an
/// optional exact-match tier serves Interests without CanBePrefix. The
/// tiers keep independent indices and policy queues and never fall
/// through to each other.
pub struct Cs {
    entries: Vec<Option<CsEntry>>,
    free: Vec<usize>,
    by_prefix: BTreeMap<CsKey, CsEntryId>,
    policy: Box<dyn Policy>,
    exact: Option<ExactTier>,
    stale_cursor: usize,
    len: usize,
}

struct ExactTier {
    index: HashMap<Name, CsEntryId>,
    policy: Box<dyn Policy>,
}

impl Cs {
    pub fn new(config: &CsConfig) -> Result<Self> {
        let policy = cs_policy::create(&config.policy, config.capacity)
            .ok_or_else(|| anyhow!("unknown cs policy {:?}", config.policy))?;
        let exact = match config.exact_capacity {
            Some(limit) => Some(ExactTier {
                index: HashMap::new(),
                policy: cs_policy::create(&config.policy, limit)
                    .ok_or_else(|| anyhow!("unknown cs policy {:?}", config.policy))?,
            }),
            None => None,
        };
        Ok(Self {
            entries: Vec::new(),
            free: Vec::new(),
            by_prefix: BTreeMap::new(),
            policy,
            exact,
            stale_cursor: 0,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn exact_tier_enabled(&self) -> bool {
        self.exact.is_some()
    }

    fn total_capacity(&self) -> usize {
        self.policy.limit() + self.exact.as_ref().map_or(0, |t| t.policy.limit())
    }

    /// Admit a Data packet. `can_be_prefix` is the flag echoed from the
    /// PIT token and selects the tier when the exact tier is enabled.
    /// Returns whether the packet is now cached.
    pub fn insert(
        &mut self,
        data: Data,
        admitted_via: FaceId,
        can_be_prefix: bool,
        now: Instant,
    ) -> bool {
        let tier = match &self.exact {
            Some(_) if !can_be_prefix => Tier::Exact,
            _ => Tier::Prefix,
        };
        let fresh_until = now + data.freshness_period.unwrap_or(Duration::ZERO);
        let digest = data.implicit_digest();

        let refreshed = match tier {
            Tier::Exact => self
                .exact
                .as_ref()
                .unwrap()
                .index
                .get(&data.name)
                .copied(),
            Tier::Prefix => self
                .by_prefix
                .get(&CsKey {
                    name: data.name.clone(),
                    digest,
                })
                .copied(),
        };
        if let Some(id) = refreshed {
            let entry = self.entries[id.0].as_mut().unwrap();
            entry.data = data;
            entry.digest = digest;
            entry.admitted_via = admitted_via;
            entry.fresh_until = fresh_until;
            match tier {
                Tier::Exact => self.exact.as_mut().unwrap().policy.after_refresh(id),
                Tier::Prefix => self.policy.after_refresh(id),
            }
            return true;
        }

        let limit = match tier {
            Tier::Exact => self.exact.as_ref().unwrap().policy.limit(),
            Tier::Prefix => self.policy.limit(),
        };
        if limit == 0 {
            return false;
        }

        let key_name = data.name.clone();
        let entry = CsEntry {
            data,
            digest,
            admitted_via,
            fresh_until,
            tier,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                CsEntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                CsEntryId(self.entries.len() - 1)
            }
        };
        self.len += 1;

        let mut evicted = Vec::new();
        match tier {
            Tier::Exact => {
                let exact = self.exact.as_mut().unwrap();
                exact.index.insert(key_name, id);
                exact.policy.after_insert(id, &mut evicted);
            }
            Tier::Prefix => {
                self.by_prefix.insert(
                    CsKey {
                        name: key_name,
                        digest,
                    },
                    id,
                );
                self.policy.after_insert(id, &mut evicted);
            }
        }
        for victim in evicted {
            trace!("cs evict");
            self.erase_entry(victim, false);
        }
        true
    }

    /// Look up the Interest; on a hit the policy is notified through
    /// `before_use` and a clone of the Data is returned.
    pub fn find(&mut self, interest: &Interest, now: Instant) -> Option<Data> {
        if self.exact.is_some() && !interest.can_be_prefix {
            return self.find_exact_tier(interest, now);
        }
        self.find_prefix_tier(interest, now)
    }

    fn find_exact_tier(&mut self, interest: &Interest, now: Instant) -> Option<Data> {
        let base = match interest.implicit_digest() {
            Some(_) => interest.name.get_prefix(interest.name.len() - 1),
            None => interest.name.clone(),
        };
        let exact = self.exact.as_mut().unwrap();
        let id = *exact.index.get(&base)?;
        let entry = self.entries[id.0].as_ref().unwrap();
        if !interest.matches_data(&entry.data) {
            return None;
        }
        if interest.must_be_fresh && !entry.is_fresh(now) {
            return None;
        }
        exact.policy.before_use(id);
        Some(entry.data.clone())
    }

    fn find_prefix_tier(&mut self, interest: &Interest, now: Instant) -> Option<Data> {
        let base = match interest.implicit_digest() {
            Some(_) => interest.name.get_prefix(interest.name.len() - 1),
            None => interest.name.clone(),
        };
        let start = CsKey {
            name: base.clone(),
            digest: [0u8; 32],
        };
        let mut hit = None;
        for (key, id) in self.by_prefix.range(start..) {
            if !base.is_prefix_of(&key.name) {
                break;
            }
            let entry = self.entries[id.0].as_ref().unwrap();
            if !interest.matches_data(&entry.data) {
                continue;
            }
            if interest.must_be_fresh && !entry.is_fresh(now) {
                continue;
            }
            hit = Some(*id);
            break;
        }
        let id = hit?;
        self.policy.before_use(id);
        Some(self.entries[id.0].as_ref().unwrap().data.clone())
    }

    /// Erase up to `limit` entries under `prefix`, both tiers. Returns the
    /// number erased.
    pub fn erase_by_prefix(&mut self, prefix: &Name, limit: usize) -> usize {
        let mut victims: Vec<CsEntryId> = Vec::new();
        let start = CsKey {
            name: prefix.clone(),
            digest: [0u8; 32],
        };
        for (key, id) in self.by_prefix.range(start..) {
            if victims.len() >= limit || !prefix.is_prefix_of(&key.name) {
                break;
            }
            victims.push(*id);
        }
        if let Some(exact) = &self.exact {
            for (name, id) in &exact.index {
                if victims.len() >= limit {
                    break;
                }
                if prefix.is_prefix_of(name) {
                    victims.push(*id);
                }
            }
        }
        let count = victims.len();
        for id in victims {
            self.erase_entry(id, true);
        }
        debug!("cs erase_by_prefix {} removed {}", prefix, count);
        count
    }

    /// FaceDown cascade: drop entries admitted via `face`.
    pub fn erase_by_face(&mut self, face: FaceId) -> usize {
        let victims: Vec<CsEntryId> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| {
                e.as_ref()
                    .filter(|entry| entry.admitted_via == face)
                    .map(|_| CsEntryId(slot))
            })
            .collect();
        let count = victims.len();
        for id in victims {
            self.erase_entry(id, true);
        }
        count
    }

    /// Staleness sweep, run from the worker timer. Only acts under
    /// capacity pressure and examines a bounded slice of the arena per
    /// call; returns the number of stale entries erased.
    pub fn evict_stale(&mut self, now: Instant, max: usize) -> usize {
        if self.len * 8 < self.total_capacity() * 7 {
            return 0;
        }
        if self.entries.is_empty() {
            return 0;
        }
        let mut victims = Vec::new();
        let budget = (max * 4).min(self.entries.len());
        for _ in 0..budget {
            self.stale_cursor = (self.stale_cursor + 1) % self.entries.len();
            if let Some(entry) = self.entries[self.stale_cursor].as_ref() {
                if !entry.is_fresh(now) {
                    victims.push(CsEntryId(self.stale_cursor));
                    if victims.len() >= max {
                        break;
                    }
                }
            }
        }
        let count = victims.len();
        for id in victims {
            self.erase_entry(id, true);
        }
        count
    }

    fn erase_entry(&mut self, id: CsEntryId, notify_policy: bool) {
        let Some(entry) = self.entries[id.0].take() else {
            return;
        };
        match entry.tier {
            Tier::Prefix => {
                self.by_prefix.remove(&CsKey {
                    name: entry.data.name.clone(),
                    digest: entry.digest,
                });
                if notify_policy {
                    self.policy.before_erase(id);
                }
            }
            Tier::Exact => {
                let exact = self.exact.as_mut().unwrap();
                exact.index.remove(&entry.data.name);
                if notify_policy {
                    exact.policy.before_erase(id);
                }
            }
        }
        self.free.push(id.0);
        self.len -= 1;
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let index_total =
            self.by_prefix.len() + self.exact.as_ref().map_or(0, |t| t.index.len());
        let queue_total = self.policy.len() + self.exact.as_ref().map_or(0, |t| t.policy.len());
        assert_eq!(index_total, self.len);
        assert_eq!(queue_total, self.len);
    }
}
