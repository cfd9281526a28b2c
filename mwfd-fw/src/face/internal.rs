//! In-process transport pair bridging the management plane to the
//! forwarder without a socket in between. Every send is posted onto the
//! peer's queue and handled on the peer's own loop, never synchronously on
//! the caller's stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use mwfd_core::{EndpointId, FacePersistency, FaceSender, FaceState, LinkType, Packet};
use tokio::sync::mpsc;

/// Link properties of the pair: point-to-point, permanent, no MTU limit.
pub const INTERNAL_LINK_TYPE: LinkType = LinkType::PointToPoint;
pub const INTERNAL_PERSISTENCY: FacePersistency = FacePersistency::Permanent;

struct Shared {
    closed: AtomicBool,
}

/// The forwarder-side endpoint: registered in the face table as the send
/// half of the internal face.
pub struct InternalForwarderTransport {
    to_client: mpsc::UnboundedSender<Packet>,
    shared: Arc<Shared>,
}

impl FaceSender for InternalForwarderTransport {
    fn send(&self, packet: Packet, _endpoint: EndpointId) -> bool {
        if self.shared.closed.load(Ordering::Relaxed) {
            return false;
        }
        self.to_client.send(packet).is_ok()
    }
}

/// The client-side endpoint held by the management plane.
pub struct InternalClientTransport {
    to_forwarder: mpsc::UnboundedSender<Packet>,
    from_forwarder: mpsc::UnboundedReceiver<Packet>,
    shared: Arc<Shared>,
}

impl InternalClientTransport {
    /// Post a packet toward the forwarder; it surfaces on the pair's
    /// forwarder-side receiver.
    pub fn send(&self, packet: Packet) -> bool {
        if self.shared.closed.load(Ordering::Relaxed) {
            return false;
        }
        self.to_forwarder.send(packet).is_ok()
    }

    /// Next packet the forwarder sent to the internal face.
    pub async fn recv(&mut self) -> Option<Packet> {
        if self.shared.closed.load(Ordering::Relaxed) {
            return None;
        }
        self.from_forwarder.recv().await
    }

    pub fn state(&self) -> FaceState {
        if self.shared.closed.load(Ordering::Relaxed) {
            FaceState::Closed
        } else {
            FaceState::Up
        }
    }

    /// Close the pair; both directions stop accepting packets.
    pub fn close(&self) {
        debug!("internal transport pair closed");
        self.shared.closed.store(true, Ordering::Relaxed);
    }
}

/// The assembled pair. `forwarder_rx` is the forwarder-side inbox: the
/// daemon pumps it into the dispatch layer under the internal face's id.
pub struct InternalTransportPair {
    pub forwarder: InternalForwarderTransport,
    pub forwarder_rx: mpsc::UnboundedReceiver<Packet>,
    pub client: InternalClientTransport,
}

impl InternalTransportPair {
    pub fn create() -> Self {
        let (to_client, from_forwarder) = mpsc::unbounded_channel();
        let (to_forwarder, forwarder_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
        });
        Self {
            forwarder: InternalForwarderTransport {
                to_client,
                shared: shared.clone(),
            },
            forwarder_rx,
            client: InternalClientTransport {
                to_forwarder,
                from_forwarder,
                shared,
            },
        }
    }
}
