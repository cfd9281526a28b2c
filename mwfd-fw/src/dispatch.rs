//! Work dispatch across forwarding workers. Every packet is owned by
//! exactly one worker, chosen from a name-derived shard key or, on the
//! return path, read back from the PIT token. Each (direction, worker)
//! pair has its own bounded queue with a single producer, so the worker
//! tables need no locks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, warn};
use mwfd_core::{DropReason, FaceEndpoint, FaceId, Name, Packet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DispatchConfig, ForwarderConfig};
use crate::face::FaceTable;
use crate::fw::counters::{StatusCollector, WorkerTelemetry};
use crate::fw::forwarder::Forwarder;
use crate::tables::fib::FibUpdate;

/// Packets drained per queue per loop iteration.
const MAX_BATCH: usize = 64;

/// Stale CS entries examined per staleness tick.
const STALE_SWEEP_BATCH: usize = 64;

const STALE_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Shard key: chained hash of the first `shard_prefix_len` components
/// (0 hashes the whole name) modulo the worker count. All packets of one
/// name family land on the same worker.
pub fn shard_of(name: &Name, shard_prefix_len: usize, workers: usize) -> usize {
    debug_assert!(workers > 0);
    let length = if shard_prefix_len == 0 {
        name.len()
    } else {
        shard_prefix_len.min(name.len())
    };
    (name.hash_prefix(length) % workers as u64) as usize
}

/// Everything a worker consumes: traffic plus control fan-out. Control
/// messages ride the Interest-direction queue so they stay ordered with
/// the traffic in front of them.
#[derive(Debug, Clone)]
pub enum WorkerMsg {
    Packet {
        ingress: FaceEndpoint,
        packet: Packet,
    },
    FibUpdate(FibUpdate),
    SetStrategy {
        prefix: Name,
        instance: Name,
    },
    RemoveFace(FaceId),
}

struct WorkerHandle {
    interest_tx: mpsc::Sender<WorkerMsg>,
    data_tx: mpsc::Sender<WorkerMsg>,
    telemetry: Arc<WorkerTelemetry>,
}

/// The single producer in front of all worker queues.
pub struct Dispatcher {
    workers: Vec<WorkerHandle>,
    shard_prefix_len: usize,
}

impl Dispatcher {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn telemetry(&self) -> Vec<Arc<WorkerTelemetry>> {
        self.workers.iter().map(|w| w.telemetry.clone()).collect()
    }

    pub fn shard(&self, name: &Name) -> usize {
        shard_of(name, self.shard_prefix_len, self.workers.len())
    }

    /// Route one ingress packet to its owning worker. Data and Nacks
    /// carrying a valid PIT token bypass the shard function so the
    /// response lands on the worker that owns the matching entry. A full
    /// queue or a dead worker drops the packet; the producer never
    /// blocks.
    pub fn dispatch(&self, ingress: FaceEndpoint, packet: Packet) -> bool {
        let is_interest = matches!(packet, Packet::Interest(_));
        let worker = match packet.pit_token() {
            Some(token) if !is_interest && (token.worker_id as usize) < self.workers.len() => {
                token.worker_id as usize
            }
            _ => self.shard(packet.name()),
        };
        let handle = &self.workers[worker];
        if handle.telemetry.is_dead() {
            debug!(
                "drop {}: {} (worker {})",
                packet.name(),
                DropReason::DeadWorker,
                worker
            );
            handle.telemetry.counters.n_dispatch_dropped.increment();
            return false;
        }
        let queue = if is_interest {
            &handle.interest_tx
        } else {
            &handle.data_tx
        };
        match queue.try_send(WorkerMsg::Packet { ingress, packet }) {
            Ok(()) => true,
            Err(err) => {
                let name = match err {
                    mpsc::error::TrySendError::Full(WorkerMsg::Packet { packet, .. })
                    | mpsc::error::TrySendError::Closed(WorkerMsg::Packet { packet, .. }) => {
                        packet.name().clone()
                    }
                    _ => Name::new(),
                };
                debug!("drop {}: {} (worker {})", name, DropReason::QueueFull, worker);
                handle.telemetry.counters.n_dispatch_dropped.increment();
                false
            }
        }
    }

    /// Deliver a control message to every worker. Control is not droppable
    /// and may await queue space; it is never called from the packet path.
    pub async fn broadcast(&self, msg: WorkerMsg) {
        for handle in &self.workers {
            if handle.telemetry.is_dead() {
                continue;
            }
            if handle.interest_tx.send(msg.clone()).await.is_err() {
                warn!("control message lost: worker queue closed");
            }
        }
    }
}

/// One forwarding worker: its forwarder plus the receive halves of its
/// queues, run as a single cooperative loop.
struct Worker {
    id: u8,
    forwarder: Forwarder,
    interest_rx: mpsc::Receiver<WorkerMsg>,
    data_rx: mpsc::Receiver<WorkerMsg>,
    cancel: CancellationToken,
    telemetry: Arc<WorkerTelemetry>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self) {
        info!("worker {} started", self.id);
        let mut stale_tick = tokio::time::interval(STALE_SWEEP_PERIOD);
        stale_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut next_deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                maybe = self.interest_rx.recv() => match maybe {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
                maybe = self.data_rx.recv() => match maybe {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
                _ = stale_tick.tick() => {
                    self.forwarder.evict_stale_cs(Instant::now(), STALE_SWEEP_BATCH);
                },
                _ = sleep_until_opt(next_deadline) => {},
            }
            // bounded batches, Interest direction first
            for _ in 0..MAX_BATCH {
                match self.interest_rx.try_recv() {
                    Ok(msg) => self.handle(msg),
                    Err(_) => break,
                }
            }
            for _ in 0..MAX_BATCH {
                match self.data_rx.try_recv() {
                    Ok(msg) => self.handle(msg),
                    Err(_) => break,
                }
            }
            next_deadline = self.forwarder.process_timers(Instant::now());
            self.forwarder.update_gauges();
        }
        self.forwarder.update_gauges();
        self.telemetry.mark_dead();
        info!("worker {} stopped", self.id);
    }

    fn handle(&mut self, msg: WorkerMsg) {
        let now = Instant::now();
        match msg {
            WorkerMsg::Packet { ingress, packet } => match packet {
                Packet::Interest(interest) => self.forwarder.handle_interest(ingress, interest, now),
                Packet::Data(data) => self.forwarder.handle_data(ingress, data, now),
                Packet::Nack(nack) => self.forwarder.handle_nack(ingress, nack, now),
            },
            WorkerMsg::FibUpdate(update) => self.forwarder.apply_fib_update(&update),
            WorkerMsg::SetStrategy { prefix, instance } => {
                if let Err(err) = self.forwarder.set_strategy(&prefix, &instance) {
                    warn!("worker {}: {}", self.id, err);
                }
            }
            WorkerMsg::RemoveFace(face) => self.forwarder.remove_face(face),
        }
    }
}

/// A running dispatch layer: the dispatcher, its workers' join handles,
/// the cancellation token stopping them, and the status collector over
/// their telemetry.
pub struct DispatchSet {
    pub dispatcher: Arc<Dispatcher>,
    pub cancel: CancellationToken,
    pub handles: Vec<JoinHandle<()>>,
    pub status: StatusCollector,
}

/// Build the queues, spawn one worker task per configured worker and wire
/// everything together. The strategy registry must be populated before
/// this is called.
pub fn spawn(
    dispatch_config: &DispatchConfig,
    forwarder_config: &ForwarderConfig,
    faces: Arc<FaceTable>,
) -> Result<DispatchSet> {
    let worker_count = dispatch_config.workers.clamp(1, u8::MAX as usize);
    let cancel = CancellationToken::new();
    let mut workers = Vec::with_capacity(worker_count);
    let mut handles = Vec::with_capacity(worker_count);
    let mut telemetries = Vec::with_capacity(worker_count);

    for id in 0..worker_count {
        let (interest_tx, interest_rx) = mpsc::channel(dispatch_config.queue_capacity);
        let (data_tx, data_rx) = mpsc::channel(dispatch_config.queue_capacity);
        let telemetry = Arc::new(WorkerTelemetry::default());
        let forwarder = Forwarder::new(
            id as u8,
            forwarder_config.clone(),
            faces.clone(),
            telemetry.clone(),
        )?;
        let worker = Worker {
            id: id as u8,
            forwarder,
            interest_rx,
            data_rx,
            cancel: cancel.clone(),
            telemetry: telemetry.clone(),
        };
        handles.push(tokio::spawn(worker.run()));
        workers.push(WorkerHandle {
            interest_tx,
            data_tx,
            telemetry: telemetry.clone(),
        });
        telemetries.push(telemetry);
    }

    info!(
        "dispatch layer up: {} workers, queue capacity {}, shard prefix {}",
        worker_count, dispatch_config.queue_capacity, dispatch_config.shard_prefix_len
    );
    Ok(DispatchSet {
        dispatcher: Arc::new(Dispatcher {
            workers,
            shard_prefix_len: dispatch_config.shard_prefix_len,
        }),
        cancel,
        handles,
        status: StatusCollector::new(telemetries),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::testutil::RecordingSender;
    use crate::fw::strategy;
    use mwfd_core::{FacePersistency, Interest, LinkType, PitToken};
    use std::sync::Mutex;

    #[test]
    fn shard_is_stable_and_prefix_keyed() {
        let a = Name::from_uri("/video/movie/seg=1");
        let b = Name::from_uri("/video/movie/seg=2");
        let c = Name::from_uri("/video/other/seg=1");
        for workers in [1, 2, 8] {
            assert_eq!(shard_of(&a, 2, workers), shard_of(&a, 2, workers));
            // same 2-component shard prefix, same worker
            assert_eq!(shard_of(&a, 2, workers), shard_of(&b, 2, workers));
            assert_eq!(shard_of(&a, 1, workers), shard_of(&c, 1, workers));
        }
        // a shard prefix longer than the name hashes the whole name
        assert_eq!(shard_of(&a, 16, 8), shard_of(&a, 0, 8));
    }

    fn queue_only_dispatcher(capacity: usize) -> (Dispatcher, mpsc::Receiver<WorkerMsg>, mpsc::Receiver<WorkerMsg>) {
        let (interest_tx, interest_rx) = mpsc::channel(capacity);
        let (data_tx, data_rx) = mpsc::channel(capacity);
        let dispatcher = Dispatcher {
            workers: vec![WorkerHandle {
                interest_tx,
                data_tx,
                telemetry: Arc::new(WorkerTelemetry::default()),
            }],
            shard_prefix_len: 0,
        };
        (dispatcher, interest_rx, data_rx)
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (dispatcher, _interest_rx, _data_rx) = queue_only_dispatcher(1);
        let ingress = FaceEndpoint::new(1, 0);
        let packet = Packet::Interest(Interest::new(Name::from_uri("/q")));
        assert!(dispatcher.dispatch(ingress, packet.clone()));
        assert!(!dispatcher.dispatch(ingress, packet));
        assert_eq!(
            dispatcher.workers[0]
                .telemetry
                .counters
                .n_dispatch_dropped
                .value(),
            1
        );
    }

    #[test]
    fn dead_worker_traffic_is_dropped() {
        let (dispatcher, _interest_rx, _data_rx) = queue_only_dispatcher(8);
        dispatcher.workers[0].telemetry.mark_dead();
        let sent = dispatcher.dispatch(
            FaceEndpoint::new(1, 0),
            Packet::Interest(Interest::new(Name::from_uri("/d"))),
        );
        assert!(!sent);
        assert_eq!(
            dispatcher.workers[0]
                .telemetry
                .counters
                .n_dispatch_dropped
                .value(),
            1
        );
    }

    #[tokio::test]
    async fn token_routes_response_to_owning_worker() {
        let (interest_tx0, _keep0) = mpsc::channel(8);
        let (data_tx0, mut data_rx0) = mpsc::channel(8);
        let (interest_tx1, _keep1) = mpsc::channel(8);
        let (data_tx1, mut data_rx1) = mpsc::channel(8);
        let dispatcher = Dispatcher {
            workers: vec![
                WorkerHandle {
                    interest_tx: interest_tx0,
                    data_tx: data_tx0,
                    telemetry: Arc::new(WorkerTelemetry::default()),
                },
                WorkerHandle {
                    interest_tx: interest_tx1,
                    data_tx: data_tx1,
                    telemetry: Arc::new(WorkerTelemetry::default()),
                },
            ],
            shard_prefix_len: 0,
        };

        let mut data = mwfd_core::Data::new(Name::from_uri("/any"));
        data.pit_token = Some(PitToken::new(1, 0xfeed, true));
        assert!(dispatcher.dispatch(FaceEndpoint::new(4, 0), Packet::Data(data)));

        assert!(data_rx1.try_recv().is_ok());
        assert!(data_rx0.try_recv().is_err());
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn end_to_end_forward_through_worker() {
        strategy::register_builtins().unwrap();
        let faces = Arc::new(FaceTable::new());
        let (sender1, sent1): (Box<RecordingSender>, Arc<Mutex<Vec<Packet>>>) =
            RecordingSender::new();
        let f1 = faces.add(sender1, LinkType::PointToPoint, FacePersistency::Persistent);
        let (sender2, sent2) = RecordingSender::new();
        let f2 = faces.add(sender2, LinkType::PointToPoint, FacePersistency::Persistent);

        let dispatch_config = DispatchConfig {
            workers: 2,
            queue_capacity: 64,
            shard_prefix_len: 1,
        };
        let set = spawn(&dispatch_config, &ForwarderConfig::default(), faces).unwrap();

        set.dispatcher
            .broadcast(WorkerMsg::FibUpdate(FibUpdate::add(
                Name::from_uri("/a"),
                f2,
                1,
                0,
            )))
            .await;

        let interest = Interest::new(Name::from_uri("/a/b")).with_nonce(11);
        assert!(set
            .dispatcher
            .dispatch(FaceEndpoint::new(f1, 0), Packet::Interest(interest)));

        // the owning worker forwards upstream
        wait_for(|| !sent2.lock().unwrap().is_empty()).await;
        let forwarded = match &sent2.lock().unwrap()[0] {
            Packet::Interest(i) => i.clone(),
            other => panic!("unexpected packet {:?}", other),
        };
        let token = forwarded.pit_token.unwrap();
        assert_eq!(token.worker_id as usize, set.dispatcher.shard(&forwarded.name));

        // the response routes back by token, not by shard
        let mut data = mwfd_core::Data::new(Name::from_uri("/a/b"))
            .with_freshness(Duration::from_secs(5));
        data.pit_token = Some(token);
        assert!(set
            .dispatcher
            .dispatch(FaceEndpoint::new(f2, 0), Packet::Data(data)));

        wait_for(|| !sent1.lock().unwrap().is_empty()).await;
        assert!(matches!(&sent1.lock().unwrap()[0], Packet::Data(d) if d.name == Name::from_uri("/a/b")));

        let snapshot = set.status.snapshot();
        assert_eq!(snapshot.n_in_interests, 1);
        assert_eq!(snapshot.n_out_interests, 1);
        assert_eq!(snapshot.n_in_data, 1);
        assert_eq!(snapshot.n_out_data, 1);
        assert_eq!(snapshot.n_satisfied, 1);

        set.cancel.cancel();
        for handle in set.handles {
            let _ = handle.await;
        }
    }
}
