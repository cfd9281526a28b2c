use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed name component kinds from the NDN packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    ImplicitSha256Digest,
    ParametersSha256Digest,
    Generic,
    Keyword,
    Segment,
    ByteOffset,
    Version,
    Timestamp,
    SequenceNum,
}

impl ComponentType {
    /// Numeric type tag used for canonical ordering and hashing.
    pub fn tag(self) -> u16 {
        match self {
            ComponentType::ImplicitSha256Digest => 1,
            ComponentType::ParametersSha256Digest => 2,
            ComponentType::Generic => 8,
            ComponentType::Keyword => 32,
            ComponentType::Segment => 50,
            ComponentType::ByteOffset => 52,
            ComponentType::Version => 54,
            ComponentType::Timestamp => 56,
            ComponentType::SequenceNum => 58,
        }
    }
}

/// A single name component: a type tag plus opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent {
    pub typ: ComponentType,
    pub value: Vec<u8>,
}

impl NameComponent {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            typ: ComponentType::Generic,
            value,
        }
    }

    pub fn with_type(typ: ComponentType, value: Vec<u8>) -> Self {
        Self { typ, value }
    }

    pub fn from_str(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }

    /// A version component encoding `v` as a big-endian non-negative integer.
    pub fn version(v: u64) -> Self {
        Self::with_type(ComponentType::Version, encode_nonneg(v))
    }

    /// A segment component encoding `v` as a big-endian non-negative integer.
    pub fn segment(v: u64) -> Self {
        Self::with_type(ComponentType::Segment, encode_nonneg(v))
    }

    pub fn implicit_digest(digest: [u8; 32]) -> Self {
        Self::with_type(ComponentType::ImplicitSha256Digest, digest.to_vec())
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_version(&self) -> bool {
        self.typ == ComponentType::Version
    }

    pub fn is_implicit_digest(&self) -> bool {
        self.typ == ComponentType::ImplicitSha256Digest
    }

    /// Decode the component value as a big-endian non-negative integer.
    pub fn to_number(&self) -> Option<u64> {
        if self.value.is_empty() || self.value.len() > 8 {
            return None;
        }
        let mut n: u64 = 0;
        for &b in &self.value {
            n = (n << 8) | u64::from(b);
        }
        Some(n)
    }

    /// The version number carried by this component, if it is one.
    pub fn to_version(&self) -> Option<u64> {
        if self.is_version() {
            self.to_number()
        } else {
            None
        }
    }

    /// The component ordered immediately after this one: the value bytes are
    /// incremented as a big-endian integer, growing by one byte on overflow.
    pub fn successor(&self) -> Self {
        let mut value = self.value.clone();
        for b in value.iter_mut().rev() {
            if *b == 0xff {
                *b = 0;
            } else {
                *b += 1;
                return Self::with_type(self.typ, value);
            }
        }
        // all bytes were 0xff
        Self::with_type(self.typ, vec![0u8; self.value.len() + 1])
    }
}

impl PartialOrd for NameComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NameComponent {
    /// NDN canonical component order: type tag, then length, then value bytes.
    fn cmp(&self, other: &Self) -> Ordering {
        self.typ
            .tag()
            .cmp(&other.typ.tag())
            .then_with(|| self.value.len().cmp(&other.value.len()))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            ComponentType::Version => match self.to_number() {
                Some(v) => write!(f, "v={}", v),
                None => write!(f, "v=?"),
            },
            ComponentType::Segment => match self.to_number() {
                Some(v) => write!(f, "seg={}", v),
                None => write!(f, "seg=?"),
            },
            ComponentType::ImplicitSha256Digest => {
                write!(f, "sha256digest=")?;
                for b in &self.value {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            _ => write!(f, "{}", String::from_utf8_lossy(&self.value)),
        }
    }
}

fn encode_nonneg(v: u64) -> Vec<u8> {
    if v == 0 {
        return vec![0];
    }
    let mut out = v.to_be_bytes().to_vec();
    while out.len() > 1 && out[0] == 0 {
        out.remove(0);
    }
    out
}

/// Seed for the chained name hash; the hash of the empty name.
pub const NAME_HASH_SEED: u64 = 0xcbf2_9ce4_8422_2325;

const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Fold one component into a parent prefix hash. A descendant's hash is
/// derived from its parent's in O(component length).
pub fn component_hash(parent: u64, component: &NameComponent) -> u64 {
    let mut h = parent;
    let tag = component.typ.tag();
    h = (h ^ u64::from(tag & 0xff)).wrapping_mul(FNV_PRIME);
    h = (h ^ u64::from(tag >> 8)).wrapping_mul(FNV_PRIME);
    for &b in &component.value {
        h = (h ^ u64::from(b)).wrapping_mul(FNV_PRIME);
    }
    h
}

/// A hierarchical NDN name: an ordered sequence of typed components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Name {
    pub components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a URI-style name such as `/a/b/v=3/seg=0`. Parts of the form
    /// `v=N` and `seg=N` become typed version/segment components; everything
    /// else is a generic component of the literal bytes.
    pub fn from_uri(uri: &str) -> Self {
        let mut name = Name::new();
        for part in uri.split('/') {
            if part.is_empty() {
                continue;
            }
            if let Some(v) = part.strip_prefix("v=").and_then(|s| s.parse::<u64>().ok()) {
                name.components.push(NameComponent::version(v));
            } else if let Some(v) = part.strip_prefix("seg=").and_then(|s| s.parse::<u64>().ok()) {
                name.components.push(NameComponent::segment(v));
            } else {
                name.components.push(NameComponent::from_str(part));
            }
        }
        name
    }

    pub fn append(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn append_str(&mut self, component: &str) -> &mut Self {
        self.components.push(NameComponent::from_str(component));
        self
    }

    pub fn append_version(&mut self, v: u64) -> &mut Self {
        self.components.push(NameComponent::version(v));
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    /// The first `length` components as a new name.
    pub fn get_prefix(&self, length: usize) -> Name {
        Name {
            components: self.components.iter().take(length).cloned().collect(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// The smallest name that orders after this name and all of its
    /// descendants: the last component is replaced by its successor. The
    /// successor of the empty name is the name of the all-zero digest.
    pub fn successor(&self) -> Name {
        match self.components.last() {
            Some(last) => {
                let mut components = self.components.clone();
                *components.last_mut().unwrap() = last.successor();
                Name { components }
            }
            None => Name {
                components: vec![NameComponent::implicit_digest([0u8; 32])],
            },
        }
    }

    /// Chained hash of the first `length` components, starting from
    /// [`NAME_HASH_SEED`]. `hash_prefix(len)` for the full length equals
    /// folding [`component_hash`] over every component.
    pub fn hash_prefix(&self, length: usize) -> u64 {
        let mut h = NAME_HASH_SEED;
        for component in self.components.iter().take(length) {
            h = component_hash(h, component);
        }
        h
    }

    /// Hash of the whole name.
    pub fn full_hash(&self) -> u64 {
        self.hash_prefix(self.len())
    }

    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            uri.push_str(&component.to_string());
        }
        uri
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl From<&str> for Name {
    fn from(uri: &str) -> Self {
        Name::from_uri(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let name = Name::from_uri("/hello/world/v=3");
        assert_eq!(name.len(), 3);
        assert_eq!(name.get(0).unwrap().value, b"hello");
        assert!(name.get(2).unwrap().is_version());
        assert_eq!(name.get(2).unwrap().to_version(), Some(3));
        assert_eq!(name.to_uri(), "/hello/world/v=3");
    }

    #[test]
    fn empty_name_renders_as_root() {
        let name = Name::from_uri("");
        assert!(name.is_empty());
        assert_eq!(name.to_uri(), "/");
    }

    #[test]
    fn prefix_relation() {
        let a = Name::from_uri("/a/b");
        let b = Name::from_uri("/a/b/c");
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
        assert!(a.is_prefix_of(&a));
        assert_eq!(b.get_prefix(2), a);
    }

    #[test]
    fn canonical_order_is_numeric_for_versions() {
        let v2 = NameComponent::version(2);
        let v3 = NameComponent::version(3);
        let v300 = NameComponent::version(300);
        assert!(v2 < v3);
        assert!(v3 < v300); // longer encoding orders after shorter
    }

    #[test]
    fn shorter_name_orders_first() {
        let a = Name::from_uri("/a");
        let ab = Name::from_uri("/a/b");
        let b = Name::from_uri("/b");
        assert!(a < ab);
        assert!(ab < b);
    }

    #[test]
    fn successor_orders_after_descendants() {
        let name = Name::from_uri("/s");
        let succ = name.successor();
        assert!(name < succ);
        assert!(Name::from_uri("/s/v=99999") < succ);
        assert!(!name.is_prefix_of(&succ));
    }

    #[test]
    fn component_successor_overflow_grows() {
        let c = NameComponent::new(vec![0xff, 0xff]);
        let s = c.successor();
        assert_eq!(s.value.len(), 3);
        assert!(c < s);
    }

    #[test]
    fn hash_chains_from_parent() {
        let name = Name::from_uri("/a/b/c");
        let parent = name.hash_prefix(2);
        let derived = component_hash(parent, name.get(2).unwrap());
        assert_eq!(derived, name.full_hash());
    }

    #[test]
    fn hash_distinguishes_siblings() {
        let a = Name::from_uri("/a/x");
        let b = Name::from_uri("/a/y");
        assert_ne!(a.full_hash(), b.full_hash());
        assert_eq!(a.hash_prefix(1), b.hash_prefix(1));
    }
}
