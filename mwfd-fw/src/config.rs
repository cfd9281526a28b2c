use mwfd_core::Name;
use serde::{Deserialize, Serialize};

/// What to do with Data that matches no PIT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsolicitedDataPolicy {
    /// Drop and count. The default.
    DropAll,
    /// Admit to the Content Store.
    AdmitAll,
}

impl Default for UnsolicitedDataPolicy {
    fn default() -> Self {
        UnsolicitedDataPolicy::DropAll
    }
}

/// Content Store sizing and policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsConfig {
    /// Entry limit of the primary (prefix-match) tier.
    pub capacity: usize,
    /// Entry limit of the exact-match tier; `None` disables the tier.
    pub exact_capacity: Option<usize>,
    /// Registered replacement policy name.
    pub policy: String,
}

impl Default for CsConfig {
    fn default() -> Self {
        Self {
            capacity: 65536,
            exact_capacity: None,
            policy: "lru".to_string(),
        }
    }
}

/// Per-worker forwarding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub cs: CsConfig,
    /// PIT entry limit; insertions beyond it are rejected with congestion.
    pub pit_capacity: usize,
    pub unsolicited_data: UnsolicitedDataPolicy,
    /// Strategy bound to the root prefix at startup.
    pub default_strategy: Name,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            cs: CsConfig::default(),
            pit_capacity: 65536,
            unsolicited_data: UnsolicitedDataPolicy::default(),
            default_strategy: Name::from_uri("/localhost/mwfd/strategy/best-route"),
        }
    }
}

/// Dispatch layer sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of forwarding worker loops.
    pub workers: usize,
    /// Capacity of each per-(direction, worker) queue.
    pub queue_capacity: usize,
    /// Name prefix length hashed by the shard function; 0 hashes the
    /// whole name.
    pub shard_prefix_len: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 4096,
            shard_prefix_len: 2,
        }
    }
}
