use std::time::Instant;

use log::debug;
use mwfd_core::{
    Data, Error, FaceEndpoint, FaceId, Interest, NackReason, SelectorFingerprint,
};

use super::name_tree::NameTree;
use super::{NodeId, PitEntryId};

/// One downstream that asked for the Interest.
#[derive(Debug, Clone)]
pub struct InRecord {
    pub face: FaceEndpoint,
    pub nonce: u32,
    pub expiry: Instant,
    /// The Interest as this downstream sent it, token included, so the
    /// token can be echoed on the returning Data.
    pub interest: Interest,
}

/// One upstream the Interest was forwarded to.
#[derive(Debug, Clone)]
pub struct OutRecord {
    pub face: FaceId,
    pub nonce: u32,
    pub sent_at: Instant,
    pub expiry: Instant,
    pub nack: Option<NackReason>,
}

/// An outstanding Interest: its template, the downstreams waiting for it
/// and the upstreams asked.
pub struct PitEntry {
    interest: Interest,
    node: NodeId,
    fingerprint: SelectorFingerprint,
    in_records: Vec<InRecord>,
    out_records: Vec<OutRecord>,
    pub(crate) expiry: Instant,
    pub(crate) worker_id: u8,
    /// Set when a matching Data arrived on any face.
    pub(crate) satisfied: bool,
    /// Set on any Data or Nack response; gates the dropped-interest
    /// notification at expiry.
    pub(crate) any_response: bool,
}

impl PitEntry {
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn name(&self) -> &mwfd_core::Name {
        &self.interest.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn in_records(&self) -> &[InRecord] {
        &self.in_records
    }

    pub fn out_records(&self) -> &[OutRecord] {
        &self.out_records
    }

    pub fn get_in_record(&self, face: FaceId) -> Option<&InRecord> {
        self.in_records.iter().find(|r| r.face.face == face)
    }

    pub fn get_out_record(&self, face: FaceId) -> Option<&OutRecord> {
        self.out_records.iter().find(|r| r.face == face)
    }

    /// Loop detection: the nonce was already seen on a different in-record,
    /// or repeated by the same downstream.
    pub fn is_duplicate_nonce(&self, nonce: u32) -> bool {
        self.in_records.iter().any(|r| r.nonce == nonce)
    }

    /// Add or refresh the in-record for a downstream. The entry expiry
    /// is extended to cover the new in-record.
    pub fn insert_or_update_in_record(
        &mut self,
        face: FaceEndpoint,
        interest: Interest,
        now: Instant,
    ) {
        let expiry = now + interest.lifetime;
        let nonce = interest.nonce.unwrap_or(0);
        match self.in_records.iter_mut().find(|r| r.face == face) {
            Some(record) => {
                record.nonce = nonce;
                record.expiry = expiry;
                record.interest = interest;
            }
            None => self.in_records.push(InRecord {
                face,
                nonce,
                expiry,
                interest,
            }),
        }
        if expiry > self.expiry {
            self.expiry = expiry;
        }
    }

    /// Add or refresh the out-record for an upstream; `sent_at` is
    /// monotonic per face.
    pub fn insert_or_update_out_record(&mut self, face: FaceId, nonce: u32, now: Instant) {
        let expiry = now + self.interest.lifetime;
        match self.out_records.iter_mut().find(|r| r.face == face) {
            Some(record) => {
                record.nonce = nonce;
                record.sent_at = now.max(record.sent_at);
                record.expiry = expiry;
                record.nack = None;
            }
            None => self.out_records.push(OutRecord {
                face,
                nonce,
                sent_at: now,
                expiry,
                nack: None,
            }),
        }
    }

    pub fn delete_in_record(&mut self, face: FaceId) {
        self.in_records.retain(|r| r.face.face != face);
    }

    /// Record the Nack reason on the matching out-record; fails when the
    /// nonce does not match the last one sent on that face.
    pub fn record_nack(&mut self, face: FaceId, nonce: u32, reason: NackReason) -> bool {
        match self.out_records.iter_mut().find(|r| r.face == face) {
            Some(record) if record.nonce == nonce => {
                record.nack = Some(reason);
                true
            }
            _ => false,
        }
    }

    /// Every out-record has been answered by a Nack.
    pub fn all_out_records_nacked(&self) -> bool {
        !self.out_records.is_empty() && self.out_records.iter().all(|r| r.nack.is_some())
    }

    /// FaceDown cascade: drop records referencing the face.
    pub fn mark_face_gone(&mut self, face: FaceId) {
        self.in_records.retain(|r| r.face.face != face);
        self.out_records.retain(|r| r.face != face);
    }

    /// Downstreams still waiting at `now`, for Data fan-out. The ingress
    /// face is excluded unless it is ad-hoc.
    pub fn pending_downstreams(&self, exclude: Option<FaceId>, now: Instant) -> Vec<FaceEndpoint> {
        self.in_records
            .iter()
            .filter(|r| r.expiry > now && Some(r.face.face) != exclude)
            .map(|r| r.face)
            .collect()
    }
}

/// The pending Interest table of one worker. Entries are keyed by name
/// plus selector fingerprint through the name tree.
pub struct Pit {
    entries: Vec<Option<PitEntry>>,
    free: Vec<usize>,
    capacity: usize,
    len: usize,
}

impl Pit {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: PitEntryId) -> &PitEntry {
        self.entries[id.0].as_ref().unwrap()
    }

    pub fn get_mut(&mut self, id: PitEntryId) -> &mut PitEntry {
        self.entries[id.0].as_mut().unwrap()
    }

    /// Entry may have been erased between scheduling and firing a timer.
    pub fn try_get(&self, id: PitEntryId) -> Option<&PitEntry> {
        self.entries.get(id.0).and_then(|e| e.as_ref())
    }

    /// Find the entry for this Interest without creating one.
    pub fn find(&self, tree: &NameTree, interest: &Interest) -> Option<PitEntryId> {
        let node = tree.find_exact(&interest.name)?;
        let fingerprint = interest.selector_fingerprint();
        tree.get(node)
            .pit
            .iter()
            .copied()
            .find(|id| self.get(*id).fingerprint == fingerprint)
    }

    /// Find or create the entry for this Interest. Fails with congestion
    /// at the capacity limit.
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        interest: &Interest,
        worker_id: u8,
        now: Instant,
    ) -> Result<(PitEntryId, bool), Error> {
        let node = tree.lookup(&interest.name);
        let fingerprint = interest.selector_fingerprint();
        if let Some(existing) = tree
            .get(node)
            .pit
            .iter()
            .copied()
            .find(|id| self.get(*id).fingerprint == fingerprint)
        {
            return Ok((existing, false));
        }
        if self.len >= self.capacity {
            tree.cleanup_if_empty(node);
            return Err(Error::Congestion("pit full".to_string()));
        }
        let mut template = interest.clone();
        template.pit_token = None;
        let entry = PitEntry {
            interest: template,
            node,
            fingerprint,
            in_records: Vec::new(),
            out_records: Vec::new(),
            expiry: now,
            worker_id,
            satisfied: false,
            any_response: false,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                PitEntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                PitEntryId(self.entries.len() - 1)
            }
        };
        tree.get_mut(node).pit.push(id);
        self.len += 1;
        debug!("pit insert {}", interest.name);
        Ok((id, true))
    }

    /// Every entry this Data can satisfy: the exact node plus any ancestor
    /// entry whose selectors admit the Data.
    pub fn find_all_data_matches(&self, tree: &NameTree, data: &Data) -> Vec<PitEntryId> {
        let mut out = Vec::new();
        let mut cursor = tree.find_longest_prefix_match(&data.name, |_| true);
        while let Some(node_id) = cursor {
            let node = tree.get(node_id);
            for id in &node.pit {
                if self.get(*id).interest.matches_data(data) {
                    out.push(*id);
                }
            }
            cursor = node.parent();
        }
        out
    }

    pub fn set_expiry(&mut self, id: PitEntryId, expiry: Instant) {
        self.get_mut(id).expiry = expiry;
    }

    pub fn erase(&mut self, tree: &mut NameTree, id: PitEntryId) {
        let Some(entry) = self.entries[id.0].take() else {
            return;
        };
        tree.get_mut(entry.node).pit.retain(|p| *p != id);
        tree.cleanup_if_empty(entry.node);
        self.free.push(id.0);
        self.len -= 1;
        debug!("pit erase {}", entry.interest.name);
    }

    /// FaceDown cascade over every entry.
    pub fn mark_face_gone(&mut self, face: FaceId) {
        for entry in self.entries.iter_mut().flatten() {
            entry.mark_face_gone(face);
        }
    }
}
