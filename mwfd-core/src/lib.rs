//! Packet-level vocabulary shared by the MWFD forwarding core: hierarchical
//! names, decoded Interest/Data/Nack values, the face contract and the PIT
//! routing token. The TLV wire codec is deliberately absent; faces hand the
//! core already-decoded packets.

pub mod error;
pub mod face;
pub mod name;
pub mod packets;
pub mod token;

pub use error::{DropReason, Error};
pub use face::{EndpointId, FaceEndpoint, FaceEvent, FaceId, FacePersistency, FaceSender, FaceState, LinkType};
pub use name::{component_hash, ComponentType, Name, NameComponent, NAME_HASH_SEED};
pub use packets::{Data, Interest, Nack, NackReason, Packet, SelectorFingerprint, DEFAULT_INTEREST_LIFETIME};
pub use token::{PitToken, PIT_TOKEN_LEN};
