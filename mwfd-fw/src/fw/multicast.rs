use log::debug;
use mwfd_core::{FaceEndpoint, Interest, Nack, NackReason, Name};

use crate::tables::PitEntryId;

use super::forwarder::StrategyOps;
use super::strategy::Strategy;

pub fn strategy_name() -> Name {
    let mut name = Name::from_uri("/localhost/mwfd/strategy/multicast");
    name.append_version(4);
    name
}

pub fn make(instance_name: Name) -> Box<dyn Strategy> {
    Box::new(MulticastStrategy { instance_name })
}

/// Forward every Interest to all eligible next hops.
pub struct MulticastStrategy {
    instance_name: Name,
}

impl Strategy for MulticastStrategy {
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
        let mut forwarded = false;
        for next_hop in next_hops.iter().filter(|nh| nh.face != ingress.face) {
            ops.send_interest(pit, next_hop.face);
            forwarded = true;
        }
        if !forwarded {
            debug!("multicast no eligible next hop for {}", interest.name);
            ops.send_nack(pit, ingress, NackReason::NoRoute);
            ops.reject_pending_interest(pit);
        }
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
                "multicast nack {} from {}; other upstreams pending",
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
        assert_eq!(name.last().unwrap().to_version(), Some(4));
    }
}
