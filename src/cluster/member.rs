//! Member liveness: the member heartbeat and the member monitor.
//!
//! Every member advertises itself under `cluster/members/<id>/`, a
//! TTL-carrying directory the heartbeat refreshes each interval. The
//! monitor is the director-side counterpart: it watches the members
//! directory and signals the work distributor whenever a member joins or
//! its directory expires.

use super::Cluster;
use crate::error::{ArgusError, Result};
use crate::observability;
use crate::overwatch::ErrorType;
use crate::shutdown::ShutdownCoordinator;
use crate::store::{SetOptions, WatchAction, WatchEvent};
use crate::types::MemberRecord;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Directory all member records live under.
pub(crate) const MEMBERS_DIR: &str = "cluster/members";

impl Cluster {
    fn member_dir(&self) -> String {
        format!("{}/{}", MEMBERS_DIR, self.member_id)
    }

    fn generate_member_record(&self) -> MemberRecord {
        MemberRecord {
            member_id: self.member_id.clone(),
            hostname: self.hostname.clone(),
            listen_address: self.listen_address.clone(),
            last_updated: Utc::now(),
            tags: self.tags.clone(),
            version: self.version.clone(),
            semver: self.semver.clone(),
        }
    }

    /// Recreate the member directory structure, replacing anything left
    /// behind by a previous run under the same identity.
    async fn create_initial_member_structure(&self, member_dir: &str) -> Result<()> {
        let exists = self.store.exists(member_dir).await.map_err(|e| {
            ArgusError::MemberSetup(format!("Unable to verify pre-existence of member dir: {}", e))
        })?;

        if exists {
            debug!(dir = %member_dir, "cluster-memberHeartbeat: Member dir already exists, deleting");
            self.store.delete(member_dir, true).await.map_err(|e| {
                ArgusError::MemberSetup(format!(
                    "Unable to delete pre-existing member dir '{}': {}",
                    member_dir, e
                ))
            })?;
        }

        self.store
            .set(
                member_dir,
                "",
                SetOptions::dir().with_ttl(self.heartbeat_timeout),
            )
            .await
            .map_err(|e| ArgusError::MemberSetup(format!("Initial member dir set failed: {}", e)))?;

        let payload = self.generate_member_record().to_payload()?;
        self.store
            .set(&format!("{}/status", member_dir), &payload, SetOptions::default())
            .await
            .map_err(|e| {
                ArgusError::MemberSetup(format!("Unable to create initial member status: {}", e))
            })?;

        self.store
            .set(&format!("{}/config", member_dir), "", SetOptions::dir())
            .await
            .map_err(|e| {
                ArgusError::MemberSetup(format!("Creating member config dir failed: {}", e))
            })?;

        Ok(())
    }

    /// ALWAYS: create the member structure, then republish status and
    /// refresh the directory TTL every interval.
    ///
    /// The init outcome is reported through `init_tx`; startup blocks on it
    /// so the member monitor never watches a directory that does not exist
    /// yet. Setup failure is fatal: nothing the engine does afterwards is
    /// meaningful without a member directory.
    pub(crate) async fn run_member_heartbeat(
        self: Arc<Self>,
        init_tx: oneshot::Sender<Result<()>>,
    ) {
        debug!("cluster: Launching member heartbeat...");

        let member_dir = self.member_dir();
        if let Err(e) = self.create_initial_member_structure(&member_dir).await {
            let _ = init_tx.send(Err(e));
            return;
        }
        let _ = init_tx.send(Ok(()));

        let mut ticks = self.member_heartbeat_looper.ticks();
        while ticks.next().await {
            let payload = match self.generate_member_record().to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    self.eq.add_with_error_log(
                        "error",
                        &format!(
                            "cluster-memberHeartbeat: Unable to generate member status (retrying in {:?}): {}",
                            self.heartbeat_interval, e
                        ),
                    );
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .set(
                    &format!("{}/status", member_dir),
                    &payload,
                    SetOptions::default().create_parents(),
                )
                .await
            {
                self.eq.add_with_error_log(
                    "error",
                    &format!(
                        "cluster-memberHeartbeat: Unable to save member status (retrying in {:?}): {}",
                        self.heartbeat_interval, e
                    ),
                );
                self.health.write(
                    false,
                    format!("Cluster engine encountering store error(s) during set: {}", e),
                );
                observability::record_store_error("member_status");
                self.report_overwatch(e, "cluster.runMemberHeartbeat", ErrorType::EtcdGenericError)
                    .await;
                continue;
            }

            // Refresh concurrently; a slow refresh must not delay the next
            // status write.
            let cluster = Arc::clone(&self);
            let dir = member_dir.clone();
            tokio::spawn(async move {
                if let Err(e) = cluster.store.refresh(&dir, cluster.heartbeat_timeout).await {
                    cluster.eq.add_with_error_log(
                        "error",
                        &format!(
                            "cluster-memberHeartbeat: Unable to refresh member dir '{}' (retrying in {:?}): {}",
                            dir, cluster.heartbeat_interval, e
                        ),
                    );
                    cluster.health.write(
                        false,
                        format!("Cluster engine encountering store error(s) during refresh: {}", e),
                    );
                    observability::record_store_error("member_refresh");
                    cluster
                        .report_overwatch(e, "cluster.runMemberHeartbeat", ErrorType::EtcdGenericError)
                        .await;
                }
            });
        }

        warn!("cluster-memberHeartbeat: Exiting");
    }

    /// IF DIRECTOR: watch the members directory and signal the work
    /// distributor on joins and expirations.
    pub(crate) async fn run_member_monitor(&self, shutdown: ShutdownCoordinator) {
        debug!("cluster: Launching member monitor...");

        // The watch is opened up front, while this member may still be an
        // ordinary member. Events accumulate unconsumed until a takeover;
        // a director that just won an election must still see the
        // membership changes that surrounded it.
        let mut watcher = None;

        loop {
            if shutdown.is_shutting_down() {
                break;
            }

            if watcher.is_none() {
                match self.store.watch(MEMBERS_DIR).await {
                    Ok(w) => watcher = Some(w),
                    Err(e) => {
                        self.report_watcher_error(e).await;
                        tokio::select! {
                            _ = shutdown.wait_for_shutdown() => break,
                            _ = tokio::time::sleep(self.heartbeat_interval) => {}
                        }
                        continue;
                    }
                }
            }

            if !self.state.is_director().await {
                // Poll infrequently while another member is the director.
                tokio::select! {
                    _ = shutdown.wait_for_shutdown() => break,
                    _ = tokio::time::sleep(self.heartbeat_interval) => {}
                }
                continue;
            }

            let Some(active) = watcher.as_mut() else {
                continue;
            };

            let event = tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                event = active.next_event() => event,
            };

            match event {
                Ok(event) => self.handle_member_event(event).await,
                Err(ArgusError::WatchCanceled) => {
                    warn!("cluster-memberMonitor: Received a notice to shutdown");
                    break;
                }
                Err(e) => {
                    self.report_watcher_error(e).await;
                    // Reopen the watch on the next pass.
                    watcher = None;
                }
            }
        }

        warn!("cluster-memberMonitor: Exiting");
    }

    async fn handle_member_event(&self, event: WatchEvent) {
        match event.action {
            WatchAction::Set => {
                // Only directory creations directly under the members dir
                // matter; status and config writes churn on every heartbeat.
                if !event.is_dir || event.basename() == "config" {
                    debug!(key = %event.key, "cluster-memberMonitor: Ignoring watcher action");
                    return;
                }
                info!(
                    member = %event.basename(),
                    "cluster-memberMonitor: New member has joined the cluster"
                );
                self.signal_distribute().await;
            }
            WatchAction::Expire => {
                // Only member directories carry TTLs under this subtree.
                info!(
                    member = %event.basename(),
                    "cluster-memberMonitor: Detected an expire for old member"
                );
                self.signal_distribute().await;
            }
            WatchAction::Delete => {}
        }
    }

    async fn signal_distribute(&self) {
        observability::record_distribute_signal();
        if self.distribute_tx.send(true).await.is_err() {
            warn!("cluster-memberMonitor: Distribute channel closed; dropping signal");
        }
    }

    async fn report_watcher_error(&self, error: ArgusError) {
        self.eq.add_with_error_log(
            "error",
            &format!("cluster-memberMonitor: Unexpected watcher error: {}", error),
        );
        self.health.write(
            false,
            format!("Cluster engine watcher encountering errors: {}", error),
        );
        observability::record_store_error("watcher");
        self.report_overwatch(error, "cluster.runMemberMonitor", ErrorType::EtcdWatcherError)
            .await;
    }
}
