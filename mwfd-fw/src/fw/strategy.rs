use std::collections::BTreeMap;
use std::sync::{LazyLock, RwLock};

use anyhow::{bail, Result};
use log::debug;
use mwfd_core::{Data, FaceEndpoint, FaceId, Interest, Nack, Name};

use crate::tables::fib::NextHop;
use crate::tables::PitEntryId;

use super::forwarder::StrategyOps;

/// Per-prefix forwarding logic, driven by the pipelines through these
/// triggers. Implementations keep their own scratch state; PIT entries are
/// referred to by handle only and must not be retained across triggers.
pub trait Strategy: Send {
    /// The versioned name this instance was created under.
    fn instance_name(&self) -> &Name;

    /// An Interest was accepted into the PIT. The strategy must forward it
    /// with `send_interest`, wait longer via `set_expiry`, or give up with
    /// `reject_pending_interest`.
    fn after_receive_interest(
        &mut self,
        ops: &mut StrategyOps<'_>,
        ingress: FaceEndpoint,
        interest: &Interest,
        pit: PitEntryId,
    );

    /// Measurement hook before a Data satisfies the entry.
    fn before_satisfy_interest(
        &mut self,
        _ops: &mut StrategyOps<'_>,
        pit: PitEntryId,
        ingress: FaceEndpoint,
        data: &Data,
    ) {
        debug!(
            "before_satisfy_interest pit={:?} in={} data={}",
            pit, ingress, data.name
        );
    }

    /// A cached Data answers the Interest. `pit` is present only when an
    /// aggregated entry already existed for the Interest.
    fn after_content_store_hit(
        &mut self,
        ops: &mut StrategyOps<'_>,
        pit: Option<PitEntryId>,
        ingress: FaceEndpoint,
        data: &Data,
    ) {
        match pit {
            Some(pit) => {
                ops.send_data(pit, ingress.face, data);
            }
            None => {
                ops.send_data_direct(ingress, data, None);
            }
        }
    }

    /// A Data satisfied the entry; forward it downstream.
    fn after_receive_data(
        &mut self,
        ops: &mut StrategyOps<'_>,
        pit: PitEntryId,
        ingress: FaceEndpoint,
        data: &Data,
    ) {
        self.before_satisfy_interest(ops, pit, ingress, data);
        ops.send_data_to_all(pit, ingress, data);
    }

    fn after_receive_nack(
        &mut self,
        _ops: &mut StrategyOps<'_>,
        ingress: FaceEndpoint,
        _nack: &Nack,
        pit: PitEntryId,
    ) {
        debug!("after_receive_nack in={} pit={:?}", ingress, pit);
    }

    /// The entry expired without any response on this upstream.
    fn on_dropped_interest(&mut self, _egress: FaceId, interest: &Interest) {
        debug!("on_dropped_interest name={}", interest.name);
    }

    /// A next hop appeared under a prefix with pending entries.
    fn after_new_next_hop(
        &mut self,
        _ops: &mut StrategyOps<'_>,
        _next_hop: &NextHop,
        _pit: PitEntryId,
    ) {
    }
}

/// Constructor registered for a strategy line; receives the full instance
/// name the instance is created under.
pub type StrategyCtor = fn(Name) -> Box<dyn Strategy>;

/// `parse_instance_name` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstanceName {
    /// Up to and including the version component, when present.
    pub strategy_name: Name,
    pub version: Option<u64>,
    /// Anything after the version component.
    pub parameters: Name,
}

/// Ordered map from versioned strategy name to constructor, with an
/// init-then-frozen lifecycle. Workers only read it.
pub struct StrategyRegistry {
    map: BTreeMap<Name, StrategyCtor>,
    frozen: bool,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Register a strategy line under its versioned name. Registering an
    /// already-known name is a no-op; registering a new one after freeze
    /// is an error.
    pub fn register(&mut self, strategy_name: Name, ctor: StrategyCtor) -> Result<()> {
        if !strategy_name.last().map_or(false, |c| c.is_version()) {
            bail!("strategy name {} lacks a version component", strategy_name);
        }
        if self.map.contains_key(&strategy_name) {
            return Ok(());
        }
        if self.frozen {
            bail!("strategy registry is frozen");
        }
        debug!("strategy register {}", strategy_name);
        self.map.insert(strategy_name, ctor);
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Resolve an instance name to a registered key.
    ///
    /// With an explicit version: the lowest registered key that orders at
    /// or after the request and continues the same strategy line
    /// (exact-or-newer). Without one: the highest-version key the request
    /// is a prefix of.
    pub fn find(&self, instance_name: &Name) -> Option<&Name> {
        let parsed = Self::parse_instance_name(instance_name);
        if parsed.version.is_some() {
            let (key, _) = self.map.range(parsed.strategy_name.clone()..).next()?;
            let line = parsed.strategy_name.get_prefix(parsed.strategy_name.len() - 1);
            if line.is_prefix_of(key) {
                return Some(key);
            }
            return None;
        }
        if parsed.strategy_name.is_empty() {
            return None;
        }
        let upper = parsed.strategy_name.successor();
        let (key, _) = self.map.range(..upper).next_back()?;
        if parsed.strategy_name.is_prefix_of(key) {
            Some(key)
        } else {
            None
        }
    }

    pub fn can_create(&self, instance_name: &Name) -> bool {
        self.find(instance_name).is_some()
    }

    /// Instantiate the strategy an instance name resolves to.
    pub fn create(&self, instance_name: &Name) -> Option<Box<dyn Strategy>> {
        let key = self.find(instance_name)?.clone();
        let ctor = self.map[&key];
        let instance = Self::make_instance_name(instance_name, &key);
        Some(ctor(instance))
    }

    pub fn list_registered(&self) -> Vec<Name> {
        self.map.keys().cloned().collect()
    }

    /// Split an instance name at its last version component.
    pub fn parse_instance_name(input: &Name) -> ParsedInstanceName {
        for i in (1..input.len()).rev() {
            let component = input.get(i).unwrap();
            if component.is_version() {
                return ParsedInstanceName {
                    strategy_name: input.get_prefix(i + 1),
                    version: component.to_version(),
                    parameters: Name {
                        components: input.components[i + 1..].to_vec(),
                    },
                };
            }
        }
        ParsedInstanceName {
            strategy_name: input.clone(),
            version: None,
            parameters: Name::new(),
        }
    }

    /// Give an unversioned instance name the registered line's version.
    pub fn make_instance_name(input: &Name, strategy_name: &Name) -> Name {
        let has_version = input.components.iter().any(|c| c.is_version());
        if has_version {
            return input.clone();
        }
        let mut out = input.clone();
        out.append(strategy_name.last().unwrap().clone());
        out
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: LazyLock<RwLock<StrategyRegistry>> =
    LazyLock::new(|| RwLock::new(StrategyRegistry::new()));

/// Register into the process-wide registry. Init-time only.
pub fn register(strategy_name: Name, ctor: StrategyCtor) -> Result<()> {
    REGISTRY.write().unwrap().register(strategy_name, ctor)
}

/// Freeze the process-wide registry before workers start.
pub fn freeze() {
    REGISTRY.write().unwrap().freeze();
}

pub fn find(instance_name: &Name) -> Option<Name> {
    REGISTRY.read().unwrap().find(instance_name).cloned()
}

pub fn can_create(instance_name: &Name) -> bool {
    REGISTRY.read().unwrap().can_create(instance_name)
}

pub fn create(instance_name: &Name) -> Option<Box<dyn Strategy>> {
    REGISTRY.read().unwrap().create(instance_name)
}

pub fn list_registered() -> Vec<Name> {
    REGISTRY.read().unwrap().list_registered()
}

/// Register the built-in strategies. Idempotent; the daemon calls this
/// once before `freeze`.
pub fn register_builtins() -> Result<()> {
    register(super::best_route::strategy_name(), super::best_route::make)?;
    register(super::multicast::strategy_name(), super::multicast::make)?;
    Ok(())
}
