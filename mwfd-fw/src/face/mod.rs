//! The face table and the in-process transport pair. Real link services
//! (UDP, TCP, Ethernet) live outside the core; they register a
//! [`FaceSender`] here and deliver inbound packets to the dispatch layer.

pub mod internal;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

use log::{debug, info, warn};
use mwfd_core::{
    EndpointId, FaceEndpoint, FaceEvent, FaceId, FacePersistency, FaceSender, FaceState, LinkType,
    Packet,
};

fn state_to_u8(state: FaceState) -> u8 {
    match state {
        FaceState::Up => 0,
        FaceState::Down => 1,
        FaceState::Closing => 2,
        FaceState::Closed => 3,
    }
}

fn state_from_u8(raw: u8) -> FaceState {
    match raw {
        0 => FaceState::Up,
        1 => FaceState::Down,
        2 => FaceState::Closing,
        _ => FaceState::Closed,
    }
}

/// One registered face: its properties plus the send half of its link
/// service.
pub struct FaceHandle {
    id: FaceId,
    link_type: LinkType,
    persistency: FacePersistency,
    state: AtomicU8,
    sender: Box<dyn FaceSender>,
}

impl FaceHandle {
    pub fn id(&self) -> FaceId {
        self.id
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn persistency(&self) -> FacePersistency {
        self.persistency
    }

    pub fn state(&self) -> FaceState {
        state_from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: FaceState) -> FaceState {
        state_from_u8(self.state.swap(state_to_u8(state), Ordering::Relaxed))
    }

    /// Send through the link service. A refused send closes the face; the
    /// pipelines keep running either way.
    pub fn send(&self, packet: Packet, endpoint: EndpointId) -> bool {
        if self.state() != FaceState::Up {
            return false;
        }
        if self.sender.send(packet, endpoint) {
            true
        } else {
            warn!("face {} send refused, closing", self.id);
            self.set_state(FaceState::Closed);
            false
        }
    }
}

type EventHook = Box<dyn Fn(FaceEvent) + Send + Sync>;

/// Registry of live faces, shared read-mostly across the dispatcher and
/// all workers.
pub struct FaceTable {
    faces: RwLock<HashMap<FaceId, std::sync::Arc<FaceHandle>>>,
    next_id: AtomicU32,
    event_hooks: Mutex<Vec<EventHook>>,
}

impl FaceTable {
    pub fn new() -> Self {
        Self {
            faces: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            event_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.faces.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe face lifecycle events.
    pub fn on_event(&self, hook: EventHook) {
        self.event_hooks.lock().unwrap().push(hook);
    }

    fn emit(&self, event: FaceEvent) {
        for hook in self.event_hooks.lock().unwrap().iter() {
            hook(event);
        }
    }

    pub fn add(
        &self,
        sender: Box<dyn FaceSender>,
        link_type: LinkType,
        persistency: FacePersistency,
    ) -> FaceId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = FaceHandle {
            id,
            link_type,
            persistency,
            state: AtomicU8::new(state_to_u8(FaceState::Up)),
            sender,
        };
        self.faces
            .write()
            .unwrap()
            .insert(id, std::sync::Arc::new(handle));
        info!("face {} added ({:?}, {:?})", id, link_type, persistency);
        self.emit(FaceEvent::AfterAddFace(id));
        id
    }

    pub fn get(&self, id: FaceId) -> Option<std::sync::Arc<FaceHandle>> {
        self.faces.read().unwrap().get(&id).cloned()
    }

    /// Unregister the face. Table cascades (FIB next hops, CS entries,
    /// PIT records) are the workers' business and ride the control path.
    pub fn remove(&self, id: FaceId) -> Option<std::sync::Arc<FaceHandle>> {
        if !self.faces.read().unwrap().contains_key(&id) {
            return None;
        }
        self.emit(FaceEvent::BeforeRemoveFace(id));
        let handle = self.faces.write().unwrap().remove(&id)?;
        let old = handle.set_state(FaceState::Closed);
        self.emit(FaceEvent::AfterStateChange(id, old, FaceState::Closed));
        info!("face {} removed", id);
        Some(handle)
    }

    pub fn set_state(&self, id: FaceId, state: FaceState) {
        if let Some(handle) = self.get(id) {
            let old = handle.set_state(state);
            if old != state {
                debug!("face {} state {:?} -> {:?}", id, old, state);
                self.emit(FaceEvent::AfterStateChange(id, old, state));
            }
        }
    }

    /// Send to a face endpoint; false when the face is missing, not up,
    /// or its link refused the packet.
    pub fn send(&self, target: FaceEndpoint, packet: Packet) -> bool {
        match self.get(target.face) {
            Some(handle) => handle.send(packet, target.endpoint),
            None => false,
        }
    }
}

impl Default for FaceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records everything sent to it; the test-side face.
    #[derive(Default)]
    pub struct RecordingSender {
        pub sent: Arc<Mutex<Vec<Packet>>>,
        pub refuse: std::sync::atomic::AtomicBool,
    }

    impl RecordingSender {
        pub fn new() -> (Box<Self>, Arc<Mutex<Vec<Packet>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Box::new(Self {
                    sent: sent.clone(),
                    refuse: std::sync::atomic::AtomicBool::new(false),
                }),
                sent,
            )
        }
    }

    impl FaceSender for RecordingSender {
        fn send(&self, packet: Packet, _endpoint: EndpointId) -> bool {
            if self.refuse.load(Ordering::Relaxed) {
                return false;
            }
            self.sent.lock().unwrap().push(packet);
            true
        }
    }
}
