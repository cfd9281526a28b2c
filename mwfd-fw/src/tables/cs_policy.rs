use super::cs_policy_lru::LruPolicy;
use super::CsEntryId;

/// Replacement policy hooks, invoked by the Content Store around every
/// index mutation. An implementation keeps its own queue over entry
/// handles; it never touches the indices themselves. Victim handles are
/// pushed onto `evicted` for the store to erase, which keeps the
/// queue-equals-index invariant in one place.
pub trait Policy: Send {
    fn name(&self) -> &'static str;

    fn limit(&self) -> usize;

    /// Entries currently tracked by the queue.
    fn len(&self) -> usize;

    /// Shrink (or grow) the limit, evicting as needed.
    fn set_limit(&mut self, limit: usize, evicted: &mut Vec<CsEntryId>);

    /// A new entry was appended to the index. Evicts over-limit entries,
    /// never the one just inserted.
    fn after_insert(&mut self, id: CsEntryId, evicted: &mut Vec<CsEntryId>);

    /// An existing entry was replaced by a same-name insertion.
    fn after_refresh(&mut self, id: CsEntryId);

    /// The store is about to erase the entry for a reason of its own
    /// (prefix purge, face cascade, staleness).
    fn before_erase(&mut self, id: CsEntryId);

    /// The entry satisfied a lookup.
    fn before_use(&mut self, id: CsEntryId);

    /// Evict until the queue fits the limit.
    fn evict(&mut self, evicted: &mut Vec<CsEntryId>);
}

/// Instantiate a registered policy by name. Policies are a closed set
/// chosen at configuration time.
pub fn create(policy_name: &str, limit: usize) -> Option<Box<dyn Policy>> {
    match policy_name {
        super::cs_policy_lru::POLICY_NAME => Some(Box::new(LruPolicy::new(limit))),
        _ => None,
    }
}

/// Names accepted by [`create`].
pub fn policy_names() -> &'static [&'static str] {
    &[super::cs_policy_lru::POLICY_NAME]
}
