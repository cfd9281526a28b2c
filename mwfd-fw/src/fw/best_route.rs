use std::time::Duration;

use log::debug;
use mwfd_core::{Data, FaceEndpoint, Interest, Nack, NackReason, Name};

use crate::tables::PitEntryId;

use super::forwarder::StrategyOps;
use super::strategy::Strategy;

/// Interval inside which a retransmission toward an already-used upstream
/// is suppressed.
const RETX_SUPPRESSION_INTERVAL: Duration = Duration::from_millis(100);

/// Weight of a new sample in the smoothed RTT kept per prefix.
const RTT_ALPHA: f64 = 0.1;

pub fn strategy_name() -> Name {
    let mut name = Name::from_uri("/localhost/mwfd/strategy/best-route");
    name.append_version(5);
    name
}

pub fn make(instance_name: Name) -> Box<dyn Strategy> {
    Box::new(BestRouteStrategy { instance_name })
}

/// Forward to the lowest-cost eligible next hop; on retransmission try an
/// unused upstream before re-probing the best one, suppressed within a
/// minimum interval. No eligible next hop yields a no-route Nack.
pub struct BestRouteStrategy {
    instance_name: Name,
}

impl Strategy for BestRouteStrategy {
    fn instance_name(&self) -> &Name {
        &self.instance_name
    }

    fn after_receive_interest(
        &mut self,
        ops: &mut StrategyOps<'_>,
        ingress: FaceEndpoint,
        interest: &Interest,
        pit: PitEntryId,
    ) {
        let next_hops = ops.lookup_fib(pit);
        let eligible: Vec<_> = next_hops
            .iter()
            .filter(|nh| nh.face != ingress.face)
            .collect();

        if eligible.is_empty() {
            debug!("best-route no eligible next hop for {}", interest.name);
            ops.send_nack(pit, ingress, NackReason::NoRoute);
            ops.reject_pending_interest(pit);
            return;
        }

        let is_retx = !ops.pit_entry(pit).out_records().is_empty();
        if !is_retx {
            ops.send_interest(pit, eligible[0].face);
            return;
        }

        // retransmission: prefer an upstream not asked yet
        if let Some(unused) = eligible
            .iter()
            .find(|nh| ops.pit_entry(pit).get_out_record(nh.face).is_none())
        {
            ops.send_interest(pit, unused.face);
            return;
        }

        let last_sent = ops
            .pit_entry(pit)
            .out_records()
            .iter()
            .map(|r| r.sent_at)
            .max();
        match last_sent {
            Some(t) if ops.now().duration_since(t) < RETX_SUPPRESSION_INTERVAL => {
                debug!("best-route retx suppressed for {}", interest.name);
            }
            _ => {
                ops.send_interest(pit, eligible[0].face);
            }
        }
    }

    /// Feed the upstream round-trip into the per-prefix smoothed RTT.
    fn before_satisfy_interest(
        &mut self,
        ops: &mut StrategyOps<'_>,
        pit: PitEntryId,
        ingress: FaceEndpoint,
        _data: &Data,
    ) {
        let rtt = ops
            .pit_entry(pit)
            .get_out_record(ingress.face)
            .map(|r| ops.now().duration_since(r.sent_at));
        let Some(rtt) = rtt else {
            return;
        };
        let prefix = ops.pit_entry(pit).name().clone();
        let id = ops.measurements_for(&prefix);
        let sample = rtt.as_secs_f64() * 1e3;
        let srtt = match ops.get_measurement(id, "srtt_ms") {
            Some(prev) => prev * (1.0 - RTT_ALPHA) + sample * RTT_ALPHA,
            None => sample,
        };
        ops.set_measurement(id, "srtt_ms", srtt);
    }

    fn after_receive_nack(
        &mut self,
        ops: &mut StrategyOps<'_>,
        ingress: FaceEndpoint,
        nack: &Nack,
        pit: PitEntryId,
    ) {
        if !ops.pit_entry(pit).all_out_records_nacked() {
            debug!(
                "best-route nack {} from {}; other upstreams pending",
                nack.reason, ingress
            );
            return;
        }
        let reason = ops
            .pit_entry(pit)
            .out_records()
            .iter()
            .filter_map(|r| r.nack)
            .fold(NackReason::NoRoute, NackReason::least_severe);
        ops.send_nacks(pit, reason, &[ingress.face]);
        ops.reject_pending_interest(pit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_carries_version() {
        let name = strategy_name();
        assert!(name.last().unwrap().is_version());
        assert_eq!(name.last().unwrap().to_version(), Some(5));
    }
}
