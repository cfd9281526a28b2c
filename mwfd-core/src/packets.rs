use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::name::{Name, NameComponent};
use crate::token::PitToken;

/// Interest lifetime applied when the packet carries none.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

/// The selector bits that distinguish PIT entries for the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorFingerprint {
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub has_forwarding_hint: bool,
}

/// A decoded Interest packet. The TLV codec lives outside the core; the
/// pipelines only ever see this form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub forwarding_hint: Vec<Name>,
    pub nonce: Option<u32>,
    pub lifetime: Duration,
    pub hop_limit: Option<u8>,
    /// Token attached by an upstream forwarder, echoed on the Data.
    pub pit_token: Option<PitToken>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            forwarding_hint: Vec::new(),
            nonce: None,
            lifetime: DEFAULT_INTEREST_LIFETIME,
            hop_limit: None,
            pit_token: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_forwarding_hint(mut self, delegations: Vec<Name>) -> Self {
        self.forwarding_hint = delegations;
        self
    }

    pub fn selector_fingerprint(&self) -> SelectorFingerprint {
        SelectorFingerprint {
            can_be_prefix: self.can_be_prefix,
            must_be_fresh: self.must_be_fresh,
            has_forwarding_hint: !self.forwarding_hint.is_empty(),
        }
    }

    /// The implicit digest carried as the last name component, if any.
    pub fn implicit_digest(&self) -> Option<&NameComponent> {
        self.name.last().filter(|c| c.is_implicit_digest())
    }

    /// Whether `data` can satisfy this Interest. Freshness is a property of
    /// the cache entry, not of the packet, and is checked by the Content
    /// Store, not here.
    pub fn matches_data(&self, data: &Data) -> bool {
        if let Some(digest) = self.implicit_digest() {
            // digest-exact: the name up to the digest must equal the Data
            // name, and the digest itself must match
            let prefix = self.name.get_prefix(self.name.len() - 1);
            return prefix == data.name && digest.value[..] == data.implicit_digest()[..];
        }
        if self.can_be_prefix {
            self.name.is_prefix_of(&data.name)
        } else {
            self.name == data.name
        }
    }
}

/// A decoded Data packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content: Vec<u8>,
    /// How long the packet counts as fresh after arrival; `None` means
    /// immediately non-fresh.
    pub freshness_period: Option<Duration>,
    /// Echo slot for the token the downstream attached to its Interest.
    pub pit_token: Option<PitToken>,
}

impl Data {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            content: Vec::new(),
            freshness_period: None,
            pit_token: None,
        }
    }

    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = content;
        self
    }

    pub fn with_freshness(mut self, period: Duration) -> Self {
        self.freshness_period = Some(period);
        self
    }

    /// SHA-256 digest identifying this exact packet. Computed over the name,
    /// content and freshness fields; callers that need it repeatedly should
    /// store it alongside the packet.
    pub fn implicit_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for component in &self.name.components {
            hasher.update(component.typ.tag().to_be_bytes());
            hasher.update((component.value.len() as u32).to_be_bytes());
            hasher.update(&component.value);
        }
        hasher.update((self.content.len() as u32).to_be_bytes());
        hasher.update(&self.content);
        if let Some(period) = self.freshness_period {
            hasher.update(period.as_millis().to_be_bytes());
        }
        hasher.finalize().into()
    }
}

/// Reason code carried by a Nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NackReason {
    None,
    Congestion,
    Duplicate,
    NoRoute,
}

impl std::fmt::Display for NackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NackReason::None => "none",
            NackReason::Congestion => "congestion",
            NackReason::Duplicate => "duplicate",
            NackReason::NoRoute => "no-route",
        };
        f.write_str(s)
    }
}

impl NackReason {
    /// The less severe of two reasons, used when merging Nacks from
    /// several upstreams.
    pub fn least_severe(self, other: NackReason) -> NackReason {
        fn severity(r: NackReason) -> u8 {
            match r {
                NackReason::None => 0,
                NackReason::Congestion => 1,
                NackReason::Duplicate => 2,
                NackReason::NoRoute => 3,
            }
        }
        if severity(self) <= severity(other) {
            self
        } else {
            other
        }
    }
}

/// A negative acknowledgment for a previously forwarded Interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

impl Nack {
    pub fn new(reason: NackReason, interest: Interest) -> Self {
        Self { reason, interest }
    }
}

/// Any packet exchanged with a face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::Data(d) => &d.name,
            Packet::Nack(n) => &n.interest.name,
        }
    }

    pub fn pit_token(&self) -> Option<PitToken> {
        match self {
            Packet::Interest(i) => i.pit_token,
            Packet::Data(d) => d.pit_token,
            Packet::Nack(n) => n.interest.pit_token,
        }
    }
}
