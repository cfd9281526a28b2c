use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Wire length of a PIT token.
pub const PIT_TOKEN_LEN: usize = 10;

/// Opaque routing token attached to an Interest when it is forwarded
/// upstream and echoed back on the matching Data or Nack.
///
/// Layout (little-endian):
/// ```text
/// byte 0      worker_id
/// bytes 1..9  nametree_hash
/// byte 9      flags: bit0 = CanBePrefix
/// ```
/// Peers treat the token as opaque bytes; the encoding only has to
/// round-trip through them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitToken {
    pub worker_id: u8,
    pub nametree_hash: u64,
    pub can_be_prefix: bool,
}

impl PitToken {
    pub fn new(worker_id: u8, nametree_hash: u64, can_be_prefix: bool) -> Self {
        Self {
            worker_id,
            nametree_hash,
            can_be_prefix,
        }
    }

    pub fn encode(&self) -> [u8; PIT_TOKEN_LEN] {
        let mut out = [0u8; PIT_TOKEN_LEN];
        out[0] = self.worker_id;
        out[1..9].copy_from_slice(&self.nametree_hash.to_le_bytes());
        out[9] = u8::from(self.can_be_prefix);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PIT_TOKEN_LEN {
            return Err(Error::Malformed(format!(
                "PIT token length {} (expected {})",
                bytes.len(),
                PIT_TOKEN_LEN
            )));
        }
        let mut hash = [0u8; 8];
        hash.copy_from_slice(&bytes[1..9]);
        Ok(Self {
            worker_id: bytes[0],
            nametree_hash: u64::from_le_bytes(hash),
            can_be_prefix: bytes[9] & 0x01 != 0,
        })
    }
}
