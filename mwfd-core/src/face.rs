use serde::{Deserialize, Serialize};

use crate::packets::Packet;

/// Identifier of a face within the face table.
pub type FaceId = u32;

/// Distinguishes logical peers sharing one multicast face; 0 for
/// point-to-point faces.
pub type EndpointId = u64;

/// A face together with the endpoint a packet arrived on or departs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceEndpoint {
    pub face: FaceId,
    pub endpoint: EndpointId,
}

impl FaceEndpoint {
    pub fn new(face: FaceId, endpoint: EndpointId) -> Self {
        Self { face, endpoint }
    }
}

impl std::fmt::Display for FaceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.endpoint == 0 {
            write!(f, "face {}", self.face)
        } else {
            write!(f, "face {}:{}", self.face, self.endpoint)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    PointToPoint,
    MultiAccess,
    AdHoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacePersistency {
    OnDemand,
    Persistent,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceState {
    Up,
    Down,
    Closing,
    Closed,
}

/// The send half of the face contract. The core hands outbound packets to
/// the link service through this; delivery of inbound packets happens by
/// the face calling into the dispatch layer.
///
/// `send` returns whether the packet was queued. A `false` return means the
/// link is gone and the face will be closed; it must not block.
pub trait FaceSender: Send + Sync {
    fn send(&self, packet: Packet, endpoint: EndpointId) -> bool;
}

/// Lifecycle notifications emitted by the face table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceEvent {
    AfterAddFace(FaceId),
    BeforeRemoveFace(FaceId),
    AfterStateChange(FaceId, FaceState, FaceState),
}
