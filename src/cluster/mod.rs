//! Cluster engine: director election, liveness, and membership signaling.
//!
//! Four cooperating loops run on every fleet member:
//!
//! - **director monitor** (always on): inspects the shared director record
//!   and drives the local role state machine;
//! - **director heartbeat** (effective only while director): refreshes the
//!   director record's TTL;
//! - **member heartbeat** (always on): registers this member and keeps its
//!   directory alive;
//! - **member monitor** (effective only while director): watches the
//!   members directory and signals work redistribution.
//!
//! The monitor is the sole writer of the role flag; the other loops read
//! it. All loops report store trouble upward (event queue, health surface,
//! overwatch channel) and keep running; the overwatch collaborator owns
//! shutdown policy.

mod director;
mod looper;
mod member;
mod state;

use crate::config::ArgusConfig;
use crate::error::{ArgusError, Result};
use crate::events::EventClient;
use crate::health::Health;
use crate::overwatch::{self, ErrorType};
use crate::shutdown::ShutdownCoordinator;
use crate::store::CoordinationStore;
use crate::types::MemberId;
use looper::Looper;
use state::DirectorState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// The cluster engine for one fleet member.
///
/// Construct with [`Cluster::new`], share behind an [`Arc`], and drive with
/// [`Cluster::start`] / [`Cluster::stop`].
pub struct Cluster {
    member_id: MemberId,
    hostname: String,
    listen_address: String,
    tags: Vec<String>,
    version: String,
    semver: String,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,

    store: Arc<dyn CoordinationStore>,
    state: DirectorState,
    distribute_tx: mpsc::Sender<bool>,
    overwatch_tx: mpsc::Sender<overwatch::Message>,
    eq: EventClient,
    health: Health,

    director_monitor_looper: Looper,
    director_heartbeat_looper: Looper,
    member_heartbeat_looper: Looper,
    /// Cancellation handle for the member monitor; present once `start`
    /// has launched it.
    monitor_shutdown: Mutex<Option<ShutdownCoordinator>>,
}

impl Cluster {
    /// Build a cluster engine from validated configuration.
    ///
    /// Fails only on fatal initialization problems (hostname lookup); store
    /// trouble surfaces later through the error channels, not here.
    pub fn new(
        config: &ArgusConfig,
        store: Arc<dyn CoordinationStore>,
        state_tx: mpsc::Sender<bool>,
        distribute_tx: mpsc::Sender<bool>,
        overwatch_tx: mpsc::Sender<overwatch::Message>,
        eq: EventClient,
        health: Health,
    ) -> Result<Self> {
        let hostname = hostname::get()
            .map_err(|e| ArgusError::Hostname(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        let interval = config.cluster.heartbeat_interval;

        Ok(Self {
            member_id: config.node.member_id.clone(),
            hostname,
            listen_address: config.node.listen_address.clone(),
            tags: config.node.tags.clone(),
            version: config.node.version.clone(),
            semver: config.node.semver.clone(),
            heartbeat_interval: interval,
            heartbeat_timeout: config.cluster.heartbeat_timeout,
            store,
            state: DirectorState::new(state_tx),
            distribute_tx,
            overwatch_tx,
            eq,
            health,
            director_monitor_looper: Looper::new(interval),
            director_heartbeat_looper: Looper::new(interval),
            member_heartbeat_looper: Looper::new(interval),
            monitor_shutdown: Mutex::new(None),
        })
    }

    /// Launch the engine's loops.
    ///
    /// The member heartbeat creates the member directory structure before
    /// anything watches it; `start` blocks until that setup completes and
    /// propagates its failure, which is fatal.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        debug!("cluster: Launching cluster engine components...");

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run_director_monitor().await });

        let heartbeat = Arc::clone(self);
        tokio::spawn(async move { heartbeat.run_director_heartbeat().await });

        let (init_tx, init_rx) = oneshot::channel();
        let member_heartbeat = Arc::clone(self);
        tokio::spawn(async move { member_heartbeat.run_member_heartbeat(init_tx).await });

        match init_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ArgusError::Internal(
                    "member heartbeat exited before completing initialization".to_string(),
                ))
            }
        }

        let shutdown = ShutdownCoordinator::new();
        *self
            .monitor_shutdown
            .lock()
            .expect("monitor shutdown handle poisoned") = Some(shutdown.clone());

        let member_monitor = Arc::clone(self);
        tokio::spawn(async move { member_monitor.run_member_monitor(shutdown).await });

        Ok(())
    }

    /// Stop all engine loops. Safe to call even if `start` never completed.
    pub fn stop(&self) {
        self.director_monitor_looper.quit();
        self.director_heartbeat_looper.quit();

        match self
            .monitor_shutdown
            .lock()
            .expect("monitor shutdown handle poisoned")
            .as_ref()
        {
            Some(shutdown) => shutdown.shutdown(),
            None => {
                warn!("cluster: Member monitor cancel handle missing; is this expected?");
            }
        }

        self.member_heartbeat_looper.quit();
    }

    pub(crate) async fn report_overwatch(
        &self,
        error: ArgusError,
        source: &str,
        error_type: ErrorType,
    ) {
        let message = overwatch::Message::new(error, source, error_type);
        if self.overwatch_tx.send(message).await.is_err() {
            warn!("cluster: Overwatch channel closed; dropping report");
        }
    }
}
