use std::collections::HashMap;

use super::cs_policy::Policy;
use super::CsEntryId;

pub const POLICY_NAME: &str = "lru";

/// Least-recently-used replacement. The queue is an intrusive doubly
/// linked list over entry handles: insertion and use move an entry to the
/// tail, eviction pops the head, all O(1).
pub struct LruPolicy {
    limit: usize,
    queue: Queue,
}

impl LruPolicy {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            queue: Queue::new(),
        }
    }

    fn evict_protecting(&mut self, protect: Option<CsEntryId>, evicted: &mut Vec<CsEntryId>) {
        while self.queue.len() > self.limit {
            match self.queue.front() {
                Some(head) if Some(head) != protect => {
                    self.queue.remove(head);
                    evicted.push(head);
                }
                _ => break,
            }
        }
    }
}

impl Policy for LruPolicy {
    fn name(&self) -> &'static str {
        POLICY_NAME
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn set_limit(&mut self, limit: usize, evicted: &mut Vec<CsEntryId>) {
        self.limit = limit;
        self.evict_protecting(None, evicted);
    }

    fn after_insert(&mut self, id: CsEntryId, evicted: &mut Vec<CsEntryId>) {
        self.queue.push_back(id);
        self.evict_protecting(Some(id), evicted);
    }

    fn after_refresh(&mut self, id: CsEntryId) {
        self.queue.move_to_back(id);
    }

    fn before_erase(&mut self, id: CsEntryId) {
        self.queue.remove(id);
    }

    fn before_use(&mut self, id: CsEntryId) {
        self.queue.move_to_back(id);
    }

    fn evict(&mut self, evicted: &mut Vec<CsEntryId>) {
        self.evict_protecting(None, evicted);
    }
}

/// Intrusive list: `links[id] = (prev, next)`.
struct Queue {
    links: HashMap<CsEntryId, (Option<CsEntryId>, Option<CsEntryId>)>,
    head: Option<CsEntryId>,
    tail: Option<CsEntryId>,
}

impl Queue {
    fn new() -> Self {
        Self {
            links: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn front(&self) -> Option<CsEntryId> {
        self.head
    }

    fn push_back(&mut self, id: CsEntryId) {
        debug_assert!(!self.links.contains_key(&id));
        let prev = self.tail;
        self.links.insert(id, (prev, None));
        if let Some(prev) = prev {
            self.links.get_mut(&prev).unwrap().1 = Some(id);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
    }

    fn remove(&mut self, id: CsEntryId) {
        let Some((prev, next)) = self.links.remove(&id) else {
            return;
        };
        match prev {
            Some(p) => self.links.get_mut(&p).unwrap().1 = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links.get_mut(&n).unwrap().0 = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_back(&mut self, id: CsEntryId) {
        if !self.links.contains_key(&id) || self.tail == Some(id) {
            return;
        }
        self.remove(id);
        self.push_back(id);
    }
}
