use thiserror::Error;

use crate::name::Name;

/// Errors surfaced by the forwarding core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Looped Interest: the nonce was already seen on this PIT entry.
    #[error("duplicate nonce {0}")]
    Duplicate(u32),

    /// The FIB has no next hop toward the name.
    #[error("no route toward {0}")]
    NoRoute(Name),

    /// A queue or table hit its resource limit.
    #[error("congestion: {0}")]
    Congestion(String),

    /// The packet was rejected before it entered the core.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The face is not in an up state.
    #[error("face {0} is down")]
    FaceDown(u32),

    /// A deadline passed without a response.
    #[error("timeout for {0}")]
    Timeout(Name),
}

/// Why a packet was dropped without entering (or after leaving) a pipeline.
/// Used for drop accounting and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    DuplicateNonce,
    QueueFull,
    DeadWorker,
    HopLimitExhausted,
    UnsolicitedData,
    InvalidNack,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::DuplicateNonce => "duplicate-nonce",
            DropReason::QueueFull => "queue-full",
            DropReason::DeadWorker => "dead-worker",
            DropReason::HopLimitExhausted => "hop-limit-exhausted",
            DropReason::UnsolicitedData => "unsolicited-data",
            DropReason::InvalidNack => "invalid-nack",
        };
        f.write_str(s)
    }
}
