use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{info, warn};
use mwfd_core::{FaceEndpoint, FaceId, FacePersistency, FaceSender, LinkType, Name, Packet};
use mwfd_fw::face::internal::{
    InternalClientTransport, InternalTransportPair, INTERNAL_LINK_TYPE, INTERNAL_PERSISTENCY,
};
use mwfd_fw::fw::strategy;
use mwfd_fw::{DispatchSet, FaceTable, FibUpdate, StatusSnapshot, WorkerMsg};
use tokio::task::JoinHandle;

use crate::config::Config;

/// Owns the running forwarder: face table, dispatch layer with its
/// workers, and the internal face pair toward the management plane.
pub struct Daemon {
    config: Config,
    faces: Arc<FaceTable>,
    set: Option<DispatchSet>,
    internal_face: Option<FaceId>,
    internal_client: Option<InternalClientTransport>,
    pump: Option<JoinHandle<()>>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            faces: Arc::new(FaceTable::new()),
            set: None,
            internal_face: None,
            internal_client: None,
            pump: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("starting mwfd daemon");

        // strategies are registered once and frozen before any worker runs
        strategy::register_builtins()?;
        strategy::freeze();

        let set = mwfd_fw::dispatch::spawn(
            &self.config.dispatch_config(),
            &self.config.forwarder_config(),
            self.faces.clone(),
        )?;

        // internal face pair: management traffic enters the dispatch layer
        // under its own face id
        let pair = InternalTransportPair::create();
        let internal_face = self.faces.add(
            Box::new(pair.forwarder),
            INTERNAL_LINK_TYPE,
            INTERNAL_PERSISTENCY,
        );
        let dispatcher = set.dispatcher.clone();
        let mut forwarder_rx = pair.forwarder_rx;
        self.pump = Some(tokio::spawn(async move {
            while let Some(packet) = forwarder_rx.recv().await {
                dispatcher.dispatch(FaceEndpoint::new(internal_face, 0), packet);
            }
        }));

        self.internal_face = Some(internal_face);
        self.internal_client = Some(pair.client);
        self.set = Some(set);
        info!(
            "mwfd daemon started: {} workers, internal face {}",
            self.config.forwarding.workers, internal_face
        );
        Ok(())
    }

    pub async fn stop(&mut self) {
        info!("stopping mwfd daemon");
        if let Some(client) = &self.internal_client {
            client.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(set) = self.set.take() {
            set.cancel.cancel();
            for handle in set.handles {
                if let Err(err) = handle.await {
                    warn!("worker task ended abnormally: {}", err);
                }
            }
        }
        info!("mwfd daemon stopped");
    }

    /// Ingress path for external faces: hand a decoded packet to the
    /// dispatch layer.
    pub fn dispatch(&self, ingress: FaceEndpoint, packet: Packet) -> bool {
        match &self.set {
            Some(set) => set.dispatcher.dispatch(ingress, packet),
            None => false,
        }
    }

    /// Register an external link service as a face.
    pub fn add_face(
        &self,
        sender: Box<dyn FaceSender>,
        link_type: LinkType,
        persistency: FacePersistency,
    ) -> FaceId {
        self.faces.add(sender, link_type, persistency)
    }

    /// Unregister a face and cascade the removal through every worker's
    /// tables.
    pub async fn remove_face(&self, face: FaceId) {
        self.faces.remove(face);
        if let Some(set) = &self.set {
            set.dispatcher.broadcast(WorkerMsg::RemoveFace(face)).await;
        }
    }

    /// Apply one RIB update to the FIB of every worker.
    pub async fn apply_fib_update(&self, update: FibUpdate) -> Result<()> {
        let set = self.set.as_ref().ok_or_else(|| anyhow!("daemon not started"))?;
        set.dispatcher.broadcast(WorkerMsg::FibUpdate(update)).await;
        Ok(())
    }

    /// Bind a prefix to a strategy on every worker.
    pub async fn set_strategy(&self, prefix: Name, instance: Name) -> Result<()> {
        if !strategy::can_create(&instance) {
            return Err(anyhow!("strategy {} is not registered", instance));
        }
        let set = self.set.as_ref().ok_or_else(|| anyhow!("daemon not started"))?;
        set.dispatcher
            .broadcast(WorkerMsg::SetStrategy { prefix, instance })
            .await;
        Ok(())
    }

    /// Aggregate counters and table sizes across all workers.
    pub fn status(&self) -> Option<StatusSnapshot> {
        self.set.as_ref().map(|set| set.status.snapshot())
    }

    /// The management side of the internal face pair. Taken once.
    pub fn take_internal_client(&mut self) -> Option<InternalClientTransport> {
        self.internal_client.take()
    }

    pub fn internal_face(&self) -> Option<FaceId> {
        self.internal_face
    }
}
