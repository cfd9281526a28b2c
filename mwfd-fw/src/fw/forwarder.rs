use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, warn};
use mwfd_core::{
    Data, DropReason, Error, FaceEndpoint, FaceId, Interest, LinkType, Nack, NackReason, Name,
    Packet, PitToken,
};

use crate::config::{ForwarderConfig, UnsolicitedDataPolicy};
use crate::face::FaceTable;
use crate::tables::fib::{FibUpdate, NextHop};
use crate::tables::measurements::MeasurementsEntryId;
use crate::tables::pit::PitEntry;
use crate::tables::{PitEntryId, Tables};

use super::counters::WorkerTelemetry;
use super::strategy::{self, Strategy, StrategyRegistry};

/// Everything the pipelines touch, minus the strategy instances. Keeping
/// the instances outside lets a trigger borrow the rest of the worker
/// mutably while the strategy itself is held out of the map.
pub(crate) struct Core {
    worker_id: u8,
    config: ForwarderConfig,
    pub(crate) tables: Tables,
    faces: Arc<FaceTable>,
    telemetry: Arc<WorkerTelemetry>,
    timers: BinaryHeap<Reverse<(Instant, PitEntryId)>>,
    now: Instant,
}

impl Core {
    fn schedule(&mut self, at: Instant, pit: PitEntryId) {
        self.timers.push(Reverse((at, pit)));
    }

    fn lookup_fib(&self, pit: PitEntryId) -> Vec<NextHop> {
        let entry = self.tables.pit.get(pit);
        let interest = entry.interest();
        if interest.forwarding_hint.is_empty() {
            let id = self
                .tables
                .fib
                .find_longest_prefix_match(&self.tables.name_tree, &interest.name);
            return self.tables.fib.entry(id).next_hops().to_vec();
        }
        // forwarding hint: first delegation with a routable entry wins
        for delegation in &interest.forwarding_hint {
            let id = self
                .tables
                .fib
                .find_longest_prefix_match(&self.tables.name_tree, delegation);
            let entry = self.tables.fib.entry(id);
            if entry.has_next_hops() {
                return entry.next_hops().to_vec();
            }
        }
        Vec::new()
    }

    /// Outgoing Interest pipeline: stamp the PIT token, refresh the
    /// out-record, hand to the face.
    fn on_outgoing_interest(&mut self, pit: PitEntryId, egress: FaceId) -> bool {
        let (mut interest, node, nonce, owner) = {
            let entry = self.tables.pit.get(pit);
            let nonce = entry
                .in_records()
                .iter()
                .max_by_key(|r| r.expiry)
                .map(|r| r.nonce)
                .or(entry.interest().nonce)
                .unwrap_or(0);
            (entry.interest().clone(), entry.node(), nonce, entry.worker_id)
        };
        interest.nonce = Some(nonce);
        interest.pit_token = Some(PitToken::new(
            owner,
            self.tables.name_tree.get(node).hash(),
            interest.can_be_prefix,
        ));
        self.tables
            .pit
            .get_mut(pit)
            .insert_or_update_out_record(egress, nonce, self.now);
        debug!("out interest {} face {}", interest.name, egress);
        let sent = self
            .faces
            .send(FaceEndpoint::new(egress, 0), Packet::Interest(interest));
        if sent {
            self.telemetry.counters.n_out_interests.increment();
        }
        sent
    }

    /// Outgoing Data pipeline: echo the downstream's token, consume its
    /// in-record, hand to the face.
    fn on_outgoing_data(&mut self, pit: PitEntryId, egress: FaceId, data: &Data) -> bool {
        let (target, token) = match self.tables.pit.get(pit).get_in_record(egress) {
            Some(record) => (record.face, record.interest.pit_token),
            None => (FaceEndpoint::new(egress, 0), None),
        };
        self.tables.pit.get_mut(pit).delete_in_record(egress);
        self.send_data_packet(target, data, token)
    }

    fn send_data_packet(
        &mut self,
        target: FaceEndpoint,
        data: &Data,
        token: Option<PitToken>,
    ) -> bool {
        let mut out = data.clone();
        out.pit_token = token;
        debug!("out data {} {}", out.name, target);
        let sent = self.faces.send(target, Packet::Data(out));
        if sent {
            self.telemetry.counters.n_out_data.increment();
        }
        sent
    }

    fn send_data_to_all(&mut self, pit: PitEntryId, ingress: FaceEndpoint, data: &Data) {
        // the ingress face gets the Data too when the link is ad hoc
        let exclude = match self.faces.get(ingress.face) {
            Some(handle) if handle.link_type() == LinkType::AdHoc => None,
            _ => Some(ingress.face),
        };
        let downstreams = self
            .tables
            .pit
            .get(pit)
            .pending_downstreams(exclude, self.now);
        for downstream in downstreams {
            self.on_outgoing_data(pit, downstream.face, data);
        }
    }

    /// Outgoing Nack pipeline: one downstream, consuming its in-record.
    fn on_outgoing_nack(&mut self, pit: PitEntryId, downstream: FaceId, reason: NackReason) -> bool {
        let Some(record) = self.tables.pit.get(pit).get_in_record(downstream) else {
            return false;
        };
        let interest = record.interest.clone();
        let target = record.face;
        self.tables.pit.get_mut(pit).delete_in_record(downstream);
        debug!("out nack {} {} {}", reason, interest.name, target);
        let sent = self.faces.send(target, Packet::Nack(Nack::new(reason, interest)));
        if sent {
            self.telemetry.counters.n_out_nacks.increment();
        }
        sent
    }
}

/// The capability set handed to strategy triggers. Borrows the worker
/// core for the duration of one trigger; strategies act through it and
/// never hold table references of their own.
pub struct StrategyOps<'a> {
    pub(crate) core: &'a mut Core,
}

impl StrategyOps<'_> {
    pub fn now(&self) -> Instant {
        self.core.now
    }

    pub fn worker_id(&self) -> u8 {
        self.core.worker_id
    }

    pub fn pit_entry(&self, pit: PitEntryId) -> &PitEntry {
        self.core.tables.pit.get(pit)
    }

    /// Next hops for the entry's Interest, honoring a forwarding hint.
    pub fn lookup_fib(&self, pit: PitEntryId) -> Vec<NextHop> {
        self.core.lookup_fib(pit)
    }

    pub fn send_interest(&mut self, pit: PitEntryId, egress: FaceId) -> bool {
        self.core.on_outgoing_interest(pit, egress)
    }

    pub fn send_data(&mut self, pit: PitEntryId, egress: FaceId, data: &Data) -> bool {
        self.core.on_outgoing_data(pit, egress, data)
    }

    /// Send without PIT bookkeeping, for cache hits with no entry.
    pub fn send_data_direct(
        &mut self,
        target: FaceEndpoint,
        data: &Data,
        token: Option<PitToken>,
    ) -> bool {
        self.core.send_data_packet(target, data, token)
    }

    pub fn send_data_to_all(&mut self, pit: PitEntryId, ingress: FaceEndpoint, data: &Data) {
        self.core.send_data_to_all(pit, ingress, data);
    }

    pub fn send_nack(&mut self, pit: PitEntryId, downstream: FaceEndpoint, reason: NackReason) {
        self.core.on_outgoing_nack(pit, downstream.face, reason);
    }

    /// Nack every downstream except `except`.
    pub fn send_nacks(&mut self, pit: PitEntryId, reason: NackReason, except: &[FaceId]) {
        let downstreams: Vec<FaceId> = self
            .core
            .tables
            .pit
            .get(pit)
            .in_records()
            .iter()
            .map(|r| r.face.face)
            .filter(|f| !except.contains(f))
            .collect();
        for downstream in downstreams {
            self.core.on_outgoing_nack(pit, downstream, reason);
        }
    }

    /// Give up on the entry; it is erased at its (now expired) deadline.
    pub fn reject_pending_interest(&mut self, pit: PitEntryId) {
        let now = self.core.now;
        self.core.tables.pit.set_expiry(pit, now);
        self.core.schedule(now, pit);
    }

    /// Keep the entry alive for `lifetime` from now.
    pub fn set_expiry(&mut self, pit: PitEntryId, lifetime: Duration) {
        let at = self.core.now + lifetime;
        self.core.tables.pit.set_expiry(pit, at);
        self.core.schedule(at, pit);
    }

    pub fn measurements_for(&mut self, name: &Name) -> MeasurementsEntryId {
        let now = self.core.now;
        self.core
            .tables
            .measurements
            .lookup(&mut self.core.tables.name_tree, name, now)
    }

    pub fn set_measurement(&mut self, id: MeasurementsEntryId, key: &str, value: f64) {
        self.core.tables.measurements.get_mut(id).set_value(key, value);
    }

    pub fn get_measurement(&self, id: MeasurementsEntryId, key: &str) -> Option<f64> {
        self.core.tables.measurements.get(id).get_value(key)
    }
}

/// One worker's forwarder: the pipelines over its tables, plus the
/// strategy instances the worker has materialized.
pub struct Forwarder {
    core: Core,
    strategies: HashMap<Name, Box<dyn Strategy>>,
}

impl Forwarder {
    pub fn new(
        worker_id: u8,
        config: ForwarderConfig,
        faces: Arc<FaceTable>,
        telemetry: Arc<WorkerTelemetry>,
    ) -> Result<Self> {
        let key = strategy::find(&config.default_strategy).ok_or_else(|| {
            anyhow!(
                "default strategy {} is not registered",
                config.default_strategy
            )
        })?;
        let default_instance = StrategyRegistry::make_instance_name(&config.default_strategy, &key);
        let tables = Tables::new(&config, default_instance)?;
        Ok(Self {
            core: Core {
                worker_id,
                config,
                tables,
                faces,
                telemetry,
                timers: BinaryHeap::new(),
                now: Instant::now(),
            },
            strategies: HashMap::new(),
        })
    }

    pub fn worker_id(&self) -> u8 {
        self.core.worker_id
    }

    /// Read-only view of this worker's tables, for inspection and status.
    pub fn tables(&self) -> &Tables {
        &self.core.tables
    }

    #[cfg(test)]
    pub(crate) fn tables_mut(&mut self) -> &mut Tables {
        &mut self.core.tables
    }

    /// Incoming Interest pipeline.
    pub fn handle_interest(&mut self, ingress: FaceEndpoint, interest: Interest, now: Instant) {
        self.core.now = now;
        self.core.telemetry.counters.n_in_interests.increment();
        debug!("in interest {} {}", interest.name, ingress);

        if interest.hop_limit == Some(0) {
            debug!("drop {}: {}", interest.name, DropReason::HopLimitExhausted);
            return;
        }

        // loop detection against the existing entry's in-records
        let existing = self
            .core
            .tables
            .pit
            .find(&self.core.tables.name_tree, &interest);
        if let (Some(id), Some(nonce)) = (existing, interest.nonce) {
            if self.core.tables.pit.get(id).is_duplicate_nonce(nonce) {
                debug!("drop {}: {} {}", interest.name, DropReason::DuplicateNonce, nonce);
                self.core.telemetry.counters.n_duplicates.increment();
                return;
            }
        }

        if let Some(data) = self.core.tables.cs.find(&interest, now) {
            self.core.telemetry.counters.n_cs_hits.increment();
            let name = interest.name.clone();
            self.with_strategy(&name, |strategy, ops| {
                strategy.after_content_store_hit(ops, existing, ingress, &data);
            });
            return;
        }
        self.core.telemetry.counters.n_cs_misses.increment();

        let (id, _is_new) = match self.core.tables.pit.insert(
            &mut self.core.tables.name_tree,
            &interest,
            self.core.worker_id,
            now,
        ) {
            Ok(inserted) => inserted,
            Err(Error::Congestion(reason)) => {
                warn!("pit rejected {}: {}", interest.name, reason);
                let sent = self
                    .core
                    .faces
                    .send(ingress, Packet::Nack(Nack::new(NackReason::Congestion, interest)));
                if sent {
                    self.core.telemetry.counters.n_out_nacks.increment();
                }
                return;
            }
            Err(err) => {
                warn!("pit insert failed: {}", err);
                return;
            }
        };
        self.core
            .tables
            .pit
            .get_mut(id)
            .insert_or_update_in_record(ingress, interest.clone(), now);
        let expiry = self.core.tables.pit.get(id).expiry();
        self.core.schedule(expiry, id);

        let name = interest.name.clone();
        self.with_strategy(&name, |strategy, ops| {
            strategy.after_receive_interest(ops, ingress, &interest, id);
        });
    }

    /// Incoming Data pipeline.
    pub fn handle_data(&mut self, ingress: FaceEndpoint, data: Data, now: Instant) {
        self.core.now = now;
        self.core.telemetry.counters.n_in_data.increment();
        debug!("in data {} {}", data.name, ingress);

        let matches = self
            .core
            .tables
            .pit
            .find_all_data_matches(&self.core.tables.name_tree, &data);
        // an already-satisfied entry only sees the Data again if its
        // expiry was explicitly extended
        let live: Vec<PitEntryId> = matches
            .into_iter()
            .filter(|id| {
                let entry = self.core.tables.pit.get(*id);
                !entry.is_satisfied() || entry.expiry() > now
            })
            .collect();

        let cbp_hint = data.pit_token.map(|t| t.can_be_prefix).unwrap_or(true);

        if live.is_empty() {
            match self.core.config.unsolicited_data {
                UnsolicitedDataPolicy::DropAll => {
                    debug!("drop {}: {}", data.name, DropReason::UnsolicitedData);
                    self.core.telemetry.counters.n_unsolicited.increment();
                }
                UnsolicitedDataPolicy::AdmitAll => {
                    self.core
                        .tables
                        .cs
                        .insert(data, ingress.face, cbp_hint, now);
                }
            }
            return;
        }

        for id in live {
            {
                let entry = self.core.tables.pit.get_mut(id);
                entry.any_response = true;
                if !entry.satisfied {
                    entry.satisfied = true;
                    self.core.telemetry.counters.n_satisfied.increment();
                }
            }
            // erased at its deadline unless the strategy extends it
            self.core.tables.pit.set_expiry(id, now);
            self.core.schedule(now, id);

            let name = self.core.tables.pit.get(id).name().clone();
            self.with_strategy(&name, |strategy, ops| {
                strategy.after_receive_data(ops, id, ingress, &data);
            });
        }

        if !self
            .core
            .tables
            .cs
            .insert(data, ingress.face, cbp_hint, now)
        {
            debug!("cs refused insertion");
        }
    }

    /// Incoming Nack pipeline.
    pub fn handle_nack(&mut self, ingress: FaceEndpoint, nack: Nack, now: Instant) {
        self.core.now = now;
        self.core.telemetry.counters.n_in_nacks.increment();
        debug!("in nack {} {} {}", nack.reason, nack.interest.name, ingress);

        let Some(id) = self
            .core
            .tables
            .pit
            .find(&self.core.tables.name_tree, &nack.interest)
        else {
            debug!("drop nack {}: {}", nack.interest.name, DropReason::InvalidNack);
            return;
        };
        let nonce = nack.interest.nonce.unwrap_or(0);
        if !self
            .core
            .tables
            .pit
            .get_mut(id)
            .record_nack(ingress.face, nonce, nack.reason)
        {
            debug!(
                "drop nack {}: {} (stale nonce)",
                nack.interest.name,
                DropReason::InvalidNack
            );
            return;
        }
        self.core.tables.pit.get_mut(id).any_response = true;

        let name = nack.interest.name.clone();
        self.with_strategy(&name, |strategy, ops| {
            strategy.after_receive_nack(ops, ingress, &nack, id);
        });
    }

    /// Apply a RIB update; a genuinely new next hop is announced to the
    /// strategies of every pending entry under the prefix.
    pub fn apply_fib_update(&mut self, update: &FibUpdate) {
        let result = self
            .core
            .tables
            .fib
            .apply_update(&mut self.core.tables.name_tree, update);
        let Some((fib_id, true)) = result else {
            return;
        };
        let Some(next_hop) = self
            .core
            .tables
            .fib
            .entry(fib_id)
            .next_hops()
            .iter()
            .find(|nh| nh.face == update.face)
            .copied()
        else {
            return;
        };
        let Some(node) = self.core.tables.name_tree.find_exact(&update.name) else {
            return;
        };
        for pit in self.core.tables.name_tree.collect_pit_under(node) {
            let name = self.core.tables.pit.get(pit).name().clone();
            self.with_strategy(&name, |strategy, ops| {
                strategy.after_new_next_hop(ops, &next_hop, pit);
            });
        }
    }

    /// Bind a prefix to a strategy; the instance name must resolve in the
    /// registry.
    pub fn set_strategy(&mut self, prefix: &Name, instance_name: &Name) -> Result<()> {
        let key = strategy::find(instance_name)
            .ok_or_else(|| anyhow!("strategy {} is not registered", instance_name))?;
        let instance = StrategyRegistry::make_instance_name(instance_name, &key);
        self.core.tables.strategy_choice.set(
            &mut self.core.tables.name_tree,
            prefix,
            instance,
        );
        Ok(())
    }

    /// FaceDown cascade over every table.
    pub fn remove_face(&mut self, face: FaceId) {
        debug!("worker {} removing face {}", self.core.worker_id, face);
        self.core
            .tables
            .fib
            .remove_face(&mut self.core.tables.name_tree, face);
        self.core.tables.cs.erase_by_face(face);
        self.core.tables.pit.mark_face_gone(face);
    }

    /// Fire due PIT deadlines; returns the next pending deadline.
    pub fn process_timers(&mut self, now: Instant) -> Option<Instant> {
        self.core.now = now;
        while let Some(Reverse((deadline, id))) = self.core.timers.peek().copied() {
            if deadline > now {
                break;
            }
            self.core.timers.pop();
            let Some(entry) = self.core.tables.pit.try_get(id) else {
                continue;
            };
            if entry.expiry() > now {
                // deadline was extended after scheduling
                let at = entry.expiry();
                self.core.schedule(at, id);
                continue;
            }
            self.finalize(id);
        }
        self.core
            .tables
            .measurements
            .expire_upto(&mut self.core.tables.name_tree, now);
        self.core.timers.peek().map(|Reverse((at, _))| *at)
    }

    /// Staleness sweep hook for the worker timer.
    pub fn evict_stale_cs(&mut self, now: Instant, max: usize) {
        self.core.tables.cs.evict_stale(now, max);
    }

    /// Refresh the shared table-size gauges.
    pub fn update_gauges(&self) {
        let gauges = &self.core.telemetry.gauges;
        gauges.n_name_tree.set(self.core.tables.name_tree.len() as u64);
        gauges.n_fib.set(self.core.tables.fib.len() as u64);
        gauges.n_pit.set(self.core.tables.pit.len() as u64);
        gauges
            .n_measurements
            .set(self.core.tables.measurements.len() as u64);
        gauges.n_cs.set(self.core.tables.cs.len() as u64);
    }

    /// Expiry without any response notifies the strategy per upstream,
    /// then frees the entry.
    fn finalize(&mut self, id: PitEntryId) {
        let (satisfied, any_response, name, drops) = {
            let entry = self.core.tables.pit.get(id);
            let drops: Vec<(FaceId, Interest)> = entry
                .out_records()
                .iter()
                .map(|r| (r.face, entry.interest().clone()))
                .collect();
            (
                entry.is_satisfied(),
                entry.any_response,
                entry.name().clone(),
                drops,
            )
        };
        if !satisfied {
            self.core.telemetry.counters.n_unsatisfied.increment();
            if !any_response {
                for (egress, interest) in drops {
                    self.with_strategy(&name, |strategy, _ops| {
                        strategy.on_dropped_interest(egress, &interest);
                    });
                }
            }
        }
        self.core
            .tables
            .pit
            .erase(&mut self.core.tables.name_tree, id);
    }

    /// Run a trigger on the strategy governing `name`. The instance is
    /// taken out of the map so the trigger can borrow the core.
    fn with_strategy<F>(&mut self, name: &Name, f: F)
    where
        F: FnOnce(&mut dyn Strategy, &mut StrategyOps<'_>),
    {
        let instance = self
            .core
            .tables
            .strategy_choice
            .find_effective(&self.core.tables.name_tree, name)
            .clone();
        let mut strategy = match self.strategies.remove(&instance) {
            Some(strategy) => strategy,
            None => match strategy::create(&instance) {
                Some(strategy) => strategy,
                None => {
                    warn!("no strategy registered for {}", instance);
                    return;
                }
            },
        };
        {
            let mut ops = StrategyOps {
                core: &mut self.core,
            };
            f(strategy.as_mut(), &mut ops);
        }
        self.strategies.insert(instance, strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::testutil::RecordingSender;
    use crate::tables::fib::FibUpdate;
    use mwfd_core::{FacePersistency, Name};
    use std::sync::Mutex;

    struct Bench {
        forwarder: Forwarder,
        telemetry: Arc<WorkerTelemetry>,
        sent: Vec<Arc<Mutex<Vec<Packet>>>>,
    }

    /// A forwarder with `n` recording point-to-point faces (ids 1..=n).
    fn bench(n: usize, config: ForwarderConfig) -> Bench {
        strategy::register_builtins().unwrap();
        let faces = Arc::new(FaceTable::new());
        let mut sent = Vec::new();
        for _ in 0..n {
            let (sender, log) = RecordingSender::new();
            faces.add(sender, LinkType::PointToPoint, FacePersistency::Persistent);
            sent.push(log);
        }
        let telemetry = Arc::new(WorkerTelemetry::default());
        let forwarder = Forwarder::new(0, config, faces, telemetry.clone()).unwrap();
        Bench {
            forwarder,
            telemetry,
            sent,
        }
    }

    fn sent_on(bench: &Bench, face: FaceId) -> Vec<Packet> {
        bench.sent[(face - 1) as usize].lock().unwrap().clone()
    }

    fn fresh_data(uri: &str) -> Data {
        Data::new(Name::from_uri(uri)).with_freshness(Duration::from_secs(10))
    }

    #[test]
    fn cache_hit_serves_without_pit_entry() {
        let mut bench = bench(1, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .tables_mut()
            .cs
            .insert(fresh_data("/a/b"), 9, true, now);

        let interest = Interest::new(Name::from_uri("/a"))
            .with_can_be_prefix(true)
            .with_nonce(1);
        bench.forwarder.handle_interest(FaceEndpoint::new(1, 0), interest, now);

        let out = sent_on(&bench, 1);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Packet::Data(d) if d.name == Name::from_uri("/a/b")));
        assert_eq!(bench.forwarder.tables().pit.len(), 0);
        let c = &bench.telemetry.counters;
        assert_eq!(c.n_in_interests.value(), 1);
        assert_eq!(c.n_out_data.value(), 1);
        assert_eq!(c.n_cs_hits.value(), 1);
    }

    #[test]
    fn forward_and_satisfy() {
        let mut bench = bench(2, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));

        let interest = Interest::new(Name::from_uri("/a/b")).with_nonce(7);
        bench.forwarder.handle_interest(FaceEndpoint::new(1, 0), interest, now);

        assert_eq!(bench.forwarder.tables().pit.len(), 1);
        let upstream = sent_on(&bench, 2);
        assert_eq!(upstream.len(), 1);
        let Packet::Interest(forwarded) = &upstream[0] else {
            panic!("expected Interest on F2");
        };
        assert_eq!(forwarded.name, Name::from_uri("/a/b"));
        let token = forwarded.pit_token.expect("forwarded Interest carries a token");
        assert_eq!(token.worker_id, 0);

        let mut data = fresh_data("/a/b");
        data.pit_token = Some(token);
        bench.forwarder.handle_data(FaceEndpoint::new(2, 0), data, now);

        let downstream = sent_on(&bench, 1);
        assert_eq!(downstream.len(), 1);
        assert!(matches!(&downstream[0], Packet::Data(d) if d.name == Name::from_uri("/a/b")));
        assert_eq!(bench.telemetry.counters.n_satisfied.value(), 1);

        // the satisfaction fed the per-prefix smoothed RTT
        assert_eq!(bench.forwarder.tables().measurements.len(), 1);

        bench.forwarder.process_timers(now);
        assert_eq!(bench.forwarder.tables().pit.len(), 0);
        assert!(bench.forwarder.tables().cs.len() >= 1);
        assert_eq!(bench.telemetry.counters.n_unsatisfied.value(), 0);
    }

    #[test]
    fn aggregation_single_upstream_two_downstreams() {
        let mut bench = bench(3, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));

        let first = Interest::new(Name::from_uri("/a/b")).with_nonce(1);
        bench.forwarder.handle_interest(FaceEndpoint::new(1, 0), first, now);
        let second = Interest::new(Name::from_uri("/a/b")).with_nonce(2);
        bench.forwarder.handle_interest(FaceEndpoint::new(3, 0), second, now);

        assert_eq!(bench.forwarder.tables().pit.len(), 1);
        // one out-record, one transmission on F2
        assert_eq!(sent_on(&bench, 2).len(), 1);

        bench
            .forwarder
            .handle_data(FaceEndpoint::new(2, 0), fresh_data("/a/b"), now);
        assert_eq!(sent_on(&bench, 1).len(), 1);
        assert_eq!(sent_on(&bench, 3).len(), 1);
    }

    #[test]
    fn looped_interest_dropped_and_counted() {
        let mut bench = bench(2, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));

        let interest = Interest::new(Name::from_uri("/a/b")).with_nonce(42);
        bench
            .forwarder
            .handle_interest(FaceEndpoint::new(1, 0), interest.clone(), now);
        bench.forwarder.handle_interest(FaceEndpoint::new(1, 0), interest, now);

        assert_eq!(bench.telemetry.counters.n_duplicates.value(), 1);
        assert_eq!(sent_on(&bench, 2).len(), 1);
    }

    #[test]
    fn no_route_yields_nack_and_expires_entry() {
        let mut bench = bench(1, ForwarderConfig::default());
        let now = Instant::now();

        let interest = Interest::new(Name::from_uri("/x")).with_nonce(3);
        bench.forwarder.handle_interest(FaceEndpoint::new(1, 0), interest, now);

        let out = sent_on(&bench, 1);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Packet::Nack(n) if n.reason == NackReason::NoRoute));

        bench.forwarder.process_timers(now);
        assert_eq!(bench.forwarder.tables().pit.len(), 0);
        assert_eq!(bench.telemetry.counters.n_unsatisfied.value(), 1);
    }

    #[test]
    fn lru_eviction_scenario() {
        let mut config = ForwarderConfig::default();
        config.cs.capacity = 2;
        let mut bench = bench(1, config);
        let now = Instant::now();
        let cs = &mut bench.forwarder.tables_mut().cs;
        cs.insert(fresh_data("/1"), 9, true, now);
        cs.insert(fresh_data("/2"), 9, true, now);
        let probe = Interest::new(Name::from_uri("/1")).with_can_be_prefix(true);
        assert!(cs.find(&probe, now).is_some());
        cs.insert(fresh_data("/3"), 9, true, now);

        assert!(cs
            .find(&Interest::new(Name::from_uri("/1")).with_can_be_prefix(true), now)
            .is_some());
        assert!(cs
            .find(&Interest::new(Name::from_uri("/2")).with_can_be_prefix(true), now)
            .is_none());
        assert!(cs
            .find(&Interest::new(Name::from_uri("/3")).with_can_be_prefix(true), now)
            .is_some());
    }

    #[test]
    fn unsolicited_data_dropped_by_default() {
        let mut bench = bench(1, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .handle_data(FaceEndpoint::new(1, 0), fresh_data("/nobody/asked"), now);
        assert_eq!(bench.forwarder.tables().cs.len(), 0);
        assert_eq!(bench.telemetry.counters.n_unsolicited.value(), 1);
    }

    #[test]
    fn unsolicited_data_admitted_when_configured() {
        let mut config = ForwarderConfig::default();
        config.unsolicited_data = UnsolicitedDataPolicy::AdmitAll;
        let mut bench = bench(1, config);
        let now = Instant::now();
        bench
            .forwarder
            .handle_data(FaceEndpoint::new(1, 0), fresh_data("/nobody/asked"), now);
        assert_eq!(bench.forwarder.tables().cs.len(), 1);
    }

    #[test]
    fn pit_capacity_rejects_with_congestion_nack() {
        let mut config = ForwarderConfig::default();
        config.pit_capacity = 1;
        let mut bench = bench(2, config);
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/"), 2, 1, 0));

        bench.forwarder.handle_interest(
            FaceEndpoint::new(1, 0),
            Interest::new(Name::from_uri("/one")).with_nonce(1),
            now,
        );
        bench.forwarder.handle_interest(
            FaceEndpoint::new(1, 0),
            Interest::new(Name::from_uri("/two")).with_nonce(2),
            now,
        );

        assert_eq!(bench.forwarder.tables().pit.len(), 1);
        let out = sent_on(&bench, 1);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Packet::Nack(n) if n.reason == NackReason::Congestion));
    }

    #[test]
    fn upstream_nacks_fold_to_downstream_nack() {
        let mut bench = bench(3, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));

        let interest = Interest::new(Name::from_uri("/a/b")).with_nonce(5);
        bench
            .forwarder
            .handle_interest(FaceEndpoint::new(1, 0), interest, now);
        let upstream = sent_on(&bench, 2);
        let Packet::Interest(forwarded) = &upstream[0] else {
            panic!("expected Interest on F2");
        };

        let nack = Nack::new(NackReason::NoRoute, forwarded.clone());
        bench.forwarder.handle_nack(FaceEndpoint::new(2, 0), nack, now);

        let downstream = sent_on(&bench, 1);
        assert_eq!(downstream.len(), 1);
        assert!(matches!(&downstream[0], Packet::Nack(n) if n.reason == NackReason::NoRoute));

        bench.forwarder.process_timers(now);
        assert_eq!(bench.forwarder.tables().pit.len(), 0);
    }

    #[test]
    fn nack_with_stale_nonce_ignored() {
        let mut bench = bench(2, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));
        bench.forwarder.handle_interest(
            FaceEndpoint::new(1, 0),
            Interest::new(Name::from_uri("/a/b")).with_nonce(5),
            now,
        );
        let upstream = sent_on(&bench, 2);
        let Packet::Interest(forwarded) = &upstream[0] else {
            panic!("expected Interest on F2");
        };

        let mut stale = forwarded.clone();
        stale.nonce = Some(999);
        bench
            .forwarder
            .handle_nack(FaceEndpoint::new(2, 0), Nack::new(NackReason::NoRoute, stale), now);

        // entry untouched, nothing nacked downstream
        assert_eq!(sent_on(&bench, 1).len(), 0);
        assert_eq!(bench.forwarder.tables().pit.len(), 1);
    }

    #[test]
    fn token_round_trips_worker_id() {
        let mut config = ForwarderConfig::default();
        config.cs.capacity = 4;
        strategy::register_builtins().unwrap();
        let faces = Arc::new(FaceTable::new());
        let (sender, sent) = RecordingSender::new();
        faces.add(sender, LinkType::PointToPoint, FacePersistency::Persistent);
        let telemetry = Arc::new(WorkerTelemetry::default());
        let mut forwarder = Forwarder::new(6, config, faces, telemetry).unwrap();
        let now = Instant::now();

        forwarder.apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 1, 1, 0));
        forwarder.handle_interest(
            FaceEndpoint::new(2, 0),
            Interest::new(Name::from_uri("/a/b")).with_nonce(1),
            now,
        );
        let out = sent.lock().unwrap().clone();
        let Packet::Interest(forwarded) = &out[0] else {
            panic!("expected Interest");
        };
        let token = forwarded.pit_token.unwrap();
        assert_eq!(token.worker_id, 6);
        assert_eq!(
            token.nametree_hash,
            Name::from_uri("/a/b").full_hash()
        );
        let wire = token.encode();
        assert_eq!(PitToken::decode(&wire).unwrap().worker_id, 6);
    }

    #[test]
    fn face_removal_cascades_tables() {
        let mut bench = bench(3, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));
        bench
            .forwarder
            .tables_mut()
            .cs
            .insert(fresh_data("/cached"), 2, true, now);
        bench.forwarder.handle_interest(
            FaceEndpoint::new(1, 0),
            Interest::new(Name::from_uri("/a/b")).with_nonce(1),
            now,
        );

        bench.forwarder.remove_face(2);
        assert_eq!(bench.forwarder.tables().cs.len(), 0);
        // entry survives without out-records until its own expiry
        assert_eq!(bench.forwarder.tables().pit.len(), 1);
        let id = bench
            .forwarder
            .tables()
            .pit
            .find(
                &bench.forwarder.tables().name_tree,
                &Interest::new(Name::from_uri("/a/b")),
            )
            .unwrap();
        assert!(bench.forwarder.tables().pit.get(id).out_records().is_empty());
        // the FIB no longer routes /a anywhere
        let fib_id = bench
            .forwarder
            .tables()
            .fib
            .find_longest_prefix_match(&bench.forwarder.tables().name_tree, &Name::from_uri("/a/b"));
        assert!(!bench.forwarder.tables().fib.entry(fib_id).has_next_hops());
    }

    #[test]
    fn late_data_after_satisfaction_is_unsolicited() {
        let mut bench = bench(2, ForwarderConfig::default());
        let now = Instant::now();
        bench
            .forwarder
            .apply_fib_update(&FibUpdate::add(Name::from_uri("/a"), 2, 1, 0));
        bench.forwarder.handle_interest(
            FaceEndpoint::new(1, 0),
            Interest::new(Name::from_uri("/a/b")).with_nonce(1),
            now,
        );
        bench
            .forwarder
            .handle_data(FaceEndpoint::new(2, 0), fresh_data("/a/b"), now);
        assert_eq!(bench.telemetry.counters.n_satisfied.value(), 1);

        // straggler before the entry is reaped: no second delivery, falls
        // under the unsolicited-data rule
        let later = now + Duration::from_millis(1);
        bench
            .forwarder
            .handle_data(FaceEndpoint::new(2, 0), fresh_data("/a/b"), later);
        assert_eq!(sent_on(&bench, 1).len(), 1);
        assert_eq!(bench.telemetry.counters.n_unsolicited.value(), 1);
        assert_eq!(bench.forwarder.tables().cs.len(), 1);
    }
}
