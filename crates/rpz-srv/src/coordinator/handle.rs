//! Everything outside the coordinator task sees: a sender-side handle and a
//! read-only view of the published zone.

use hickory_proto::rr::Name;
use rpz_core::{CommandRequest, CommandResponse, IntelBatch};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot, watch};

use super::tracker::zone_key;
use crate::zone::{DiffChain, ZoneSnapshot, ZoneState};
use crate::SrvError;

/// A refresh of one tracked upstream zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub zone: Name,
}

pub(crate) type CommandEnvelope = (CommandRequest, oneshot::Sender<CommandResponse>);

/// Receiving ends of the coordinator's input queues.
pub(crate) struct Inbox {
    pub intel: mpsc::Receiver<IntelBatch>,
    pub refresh: mpsc::Receiver<RefreshRequest>,
    pub commands: mpsc::Receiver<CommandEnvelope>,
    pub shutdown: watch::Receiver<bool>,
}

/// Cloneable sender side of the coordinator.
///
/// Producers never touch zone state; they only enqueue events.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    intel: mpsc::Sender<IntelBatch>,
    refresh: mpsc::Sender<RefreshRequest>,
    commands: mpsc::Sender<CommandEnvelope>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl CoordinatorHandle {
    pub(crate) fn channel(depth: usize) -> (Self, Inbox) {
        let (intel_tx, intel) = mpsc::channel(depth);
        let (refresh_tx, refresh) = mpsc::channel(depth);
        let (command_tx, commands) = mpsc::channel(depth);
        let (shutdown_tx, shutdown) = watch::channel(false);
        (
            Self {
                intel: intel_tx,
                refresh: refresh_tx,
                commands: command_tx,
                shutdown: Arc::new(shutdown_tx),
            },
            Inbox {
                intel,
                refresh,
                commands,
                shutdown,
            },
        )
    }

    /// Queue a verified intel-feed batch.
    pub async fn submit_batch(&self, batch: IntelBatch) -> crate::Result<()> {
        self.intel
            .send(batch)
            .await
            .map_err(|_| SrvError::CoordinatorStopped)
    }

    /// Queue a refresh of an upstream zone.
    pub async fn refresh(&self, zone: Name) -> crate::Result<()> {
        self.refresh
            .send(RefreshRequest { zone })
            .await
            .map_err(|_| SrvError::CoordinatorStopped)
    }

    /// Queue a refresh without waiting; a full queue drops the request
    /// since a refresh is already pending.
    pub fn try_refresh(&self, zone: Name) -> crate::Result<()> {
        match self.refresh.try_send(RefreshRequest { zone }) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SrvError::CoordinatorStopped),
        }
    }

    /// Run a control-plane command and wait for its reply.
    pub async fn command(&self, request: CommandRequest) -> crate::Result<CommandResponse> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send((request, tx))
            .await
            .map_err(|_| SrvError::CoordinatorStopped)?;
        rx.await.map_err(|_| SrvError::CoordinatorStopped)
    }

    /// Ask the coordinator to persist its serial and stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// The zone as last published by the coordinator.
#[derive(Debug, Clone)]
pub struct Published {
    pub snapshot: Arc<ZoneSnapshot>,
    pub chain: Arc<DiffChain>,
}

impl Published {
    pub(crate) fn from_zone(zone: &ZoneState) -> Self {
        Self {
            snapshot: Arc::clone(zone.snapshot()),
            chain: Arc::clone(zone.chain()),
        }
    }
}

/// Read side of the published zone, shared with query and transfer handling.
#[derive(Debug, Clone)]
pub struct ZoneReader {
    published: Arc<RwLock<Published>>,
    upstream_zones: Arc<HashSet<Name>>,
}

impl ZoneReader {
    pub(crate) fn new(published: Arc<RwLock<Published>>, upstream_zones: HashSet<Name>) -> Self {
        Self {
            published,
            upstream_zones: Arc::new(upstream_zones),
        }
    }

    /// Snapshot and chain, read together.
    pub fn current(&self) -> Published {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        self.current().snapshot
    }

    pub fn serial(&self) -> u32 {
        self.snapshot().serial()
    }

    /// True if `zone` is an upstream the coordinator pulls from.
    pub fn tracks_upstream(&self, zone: &Name) -> bool {
        self.upstream_zones.contains(&zone_key(zone))
    }
}
