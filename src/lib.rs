//! Argus - a distributed monitoring fleet.
//!
//! Argus members coordinate through a shared key-value store: exactly one
//! member is elected director and hands monitoring work to the rest of the
//! fleet. This crate implements the cluster engine, the subsystem that
//! elects the director, keeps directors and members alive, and signals work
//! redistribution on membership changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Argus member                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Cluster Engine: Director Election | Heartbeats | Watches   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Coordination Store: etcd | In-Memory (tests)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators: Work Distributor | Overwatch | HTTP API     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is deliberately humble: it never decides to shut the process
//! down. Store trouble is recorded on the event queue, mirrored to the
//! health surface, and reported on the overwatch channel; the overwatch
//! collaborator owns escalation policy.
//!
//! # Quick Start
//!
//! ```no_run
//! use argus::config::ArgusConfig;
//!
//! #[tokio::main]
//! async fn main() -> argus::Result<()> {
//!     let config = ArgusConfig::development();
//!     argus::run(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod cluster;
pub mod events;
pub mod health;
pub mod observability;
pub mod overwatch;
pub mod shutdown;
pub mod store;

// Re-exports
pub use error::{ArgusError, Result};
pub use types::{DirectorRecord, MemberId, MemberRecord};

use cluster::Cluster;
use config::ArgusConfig;
use events::EventQueue;
use health::Health;
use shutdown::{ShutdownCoordinator, SignalHandler};
use std::sync::Arc;
use store::{CoordinationStore, EtcdStore};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Run an Argus member with the given configuration until a shutdown
/// signal arrives.
pub async fn run(config: ArgusConfig) -> Result<()> {
    info!(member_id = %config.node.member_id, "Starting Argus member");

    let store: Arc<dyn CoordinationStore> = Arc::new(EtcdStore::connect(&config.store).await?);

    let event_queue = EventQueue::new(&config.node.member_id);
    let health = Health::new();

    let (state_tx, mut state_rx) = mpsc::channel(16);
    let (distribute_tx, mut distribute_rx) = mpsc::channel(16);
    let (overwatch_tx, mut overwatch_rx) = mpsc::channel::<overwatch::Message>(16);

    // Stand-ins for the out-of-scope collaborators: the work distributor
    // and overwatch must drain their channels, so the binary logs in their
    // place.
    tokio::spawn(async move {
        while let Some(is_director) = state_rx.recv().await {
            info!(is_director, "Cluster role transition");
        }
    });
    tokio::spawn(async move {
        while distribute_rx.recv().await.is_some() {
            info!("Membership change observed; work redistribution requested");
        }
    });
    tokio::spawn(async move {
        while let Some(message) = overwatch_rx.recv().await {
            warn!(
                source = %message.source,
                error_type = %message.error_type,
                error = %message.error,
                "Overwatch report"
            );
        }
    });

    let cluster = Arc::new(Cluster::new(
        &config,
        store,
        state_tx,
        distribute_tx,
        overwatch_tx,
        event_queue.client(),
        health.clone(),
    )?);
    cluster.start().await?;

    let coordinator = ShutdownCoordinator::new();
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        SignalHandler::new(signal_coordinator).run().await;
    });

    info!(
        member_id = %config.node.member_id,
        listen_address = %config.node.listen_address,
        "Argus has started"
    );

    coordinator.wait_for_shutdown().await;

    info!("Shutting down Argus gracefully...");
    cluster.stop();

    info!("Argus shutdown complete");
    Ok(())
}
