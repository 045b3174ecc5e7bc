//! Director election: the director monitor and the director heartbeat.
//!
//! The monitor runs on every member. Each tick it observes the shared
//! director record, decides whether to take over, relinquish, or wait, and
//! applies the decision. Takeover writes go through compare-and-swap so two
//! members racing for the role cannot both win: creation is conditioned on
//! the record not existing, update on the exact bytes previously observed.
//!
//! The heartbeat runs on every member too but only writes while this member
//! holds the role, refreshing the record before its TTL lapses.

use super::Cluster;
use crate::error::{ArgusError, Result};
use crate::observability;
use crate::store::SetOptions;
use crate::types::DirectorRecord;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Store key the current director is recorded under.
pub(crate) const DIRECTOR_KEY: &str = "cluster/director";

/// What the monitor saw at `cluster/director` this tick.
///
/// A present observation keeps the raw payload alongside the decoded record;
/// takeover-by-update swaps against those exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observation {
    Absent,
    Present { record: DirectorRecord, raw: String },
}

/// Store write used to apply a takeover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreAction {
    Create,
    Update,
}

/// Outcome of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Take the director role, writing through the given action.
    Start(StoreAction),
    /// Relinquish the role locally; no store write.
    Stop,
    /// Another member holds an unexpired record, or steady state.
    Wait,
}

/// Decide what to do about the observed director record.
pub(crate) fn decide(
    member_id: &str,
    observation: &Observation,
    is_director: bool,
    heartbeat_timeout: Duration,
) -> Decision {
    let Observation::Present { record, .. } = observation else {
        // No record at all: race to create one.
        return Decision::Start(StoreAction::Create);
    };

    if record.member_id == member_id {
        if is_director {
            // Steady state.
            return Decision::Wait;
        }
        // The store says we are director but we do not realize it, e.g. an
        // operator wrote the record by hand. Adopt it via CAS.
        return Decision::Start(StoreAction::Update);
    }

    if is_director {
        // We think we are director, the store disagrees. Heal immediately.
        return Decision::Stop;
    }

    if record.is_expired(heartbeat_timeout) {
        return Decision::Start(StoreAction::Update);
    }

    Decision::Wait
}

impl Cluster {
    /// ALWAYS: watch the director record; take over when it is gone or
    /// expired, step down when it names someone else.
    pub(crate) async fn run_director_monitor(&self) {
        debug!("cluster: Launching director monitor...");

        let mut ticks = self.director_monitor_looper.ticks();
        while ticks.next().await {
            let observation = match self.observe_director().await {
                Ok(observation) => observation,
                Err(e) => {
                    self.eq.add_with_error_log(
                        "error",
                        &format!("cluster-directorMonitor: Unable to fetch director state: {}", e),
                    );
                    observability::record_store_error("director_get");
                    continue;
                }
            };

            if let Err(e) = self.apply_observation(&observation).await {
                self.eq.add_with_error_log(
                    "error",
                    &format!("cluster-directorMonitor: Unable to handle state: {}", e),
                );
            }
        }

        warn!("cluster-directorMonitor: Exiting");
    }

    /// Fetch and decode the current director record. Absence is an
    /// observation, not an error.
    async fn observe_director(&self) -> Result<Observation> {
        match self.store.get(DIRECTOR_KEY).await {
            Ok(raw) => {
                let record = DirectorRecord::from_payload(&raw)?;
                Ok(Observation::Present { record, raw })
            }
            Err(e) if e.is_key_not_found() => {
                debug!("cluster-directorMonitor: No active director found");
                Ok(Observation::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_observation(&self, observation: &Observation) -> Result<()> {
        let is_director = self.state.is_director().await;
        let decision = decide(
            &self.member_id,
            observation,
            is_director,
            self.heartbeat_timeout,
        );

        match decision {
            Decision::Wait => {
                if let Observation::Present { record, .. } = observation {
                    if record.member_id != self.member_id {
                        debug!(
                            director = %record.member_id,
                            "cluster-directorMonitor: Current director not expired yet; waiting"
                        );
                    }
                }
                Ok(())
            }
            Decision::Stop => {
                warn!("cluster-directorMonitor: Running in director mode, but the store says we are not");
                self.state.set(false).await;
                Ok(())
            }
            Decision::Start(action) => {
                info!("cluster-directorMonitor: Taking over director role");
                self.write_director_record(action, observation).await?;
                self.state.set(true).await;
                Ok(())
            }
        }
    }

    /// Write a fresh director record naming this member, conditioned on the
    /// observation the decision was made from. A failed precondition means
    /// someone else moved first; the next tick re-observes.
    async fn write_director_record(
        &self,
        action: StoreAction,
        observation: &Observation,
    ) -> Result<()> {
        let payload = DirectorRecord::new(&self.member_id).to_payload()?;

        let options = match (action, observation) {
            (StoreAction::Create, _) => SetOptions::default()
                .with_ttl(self.heartbeat_timeout)
                .must_not_exist(),
            (StoreAction::Update, Observation::Present { raw, .. }) => SetOptions::default()
                .with_ttl(self.heartbeat_timeout)
                .with_prev_value(raw.clone()),
            (StoreAction::Update, Observation::Absent) => {
                return Err(ArgusError::Internal(
                    "director update decided without an observed record".to_string(),
                ));
            }
        };

        self.store.set(DIRECTOR_KEY, &payload, options).await?;
        debug!("cluster-directorMonitor: Successfully wrote director state");
        Ok(())
    }

    /// IF DIRECTOR: refresh the director record every interval.
    pub(crate) async fn run_director_heartbeat(&self) {
        debug!("cluster: Launching director heartbeat...");

        let mut ticks = self.director_heartbeat_looper.ticks();
        while ticks.next().await {
            if !self.state.is_director().await {
                continue;
            }

            match self.send_director_heartbeat().await {
                Ok(()) => {
                    debug!(
                        member_id = %self.member_id,
                        "cluster-directorHeartbeat: Successfully sent periodic heartbeat"
                    );
                }
                Err(e) => {
                    self.eq.add_with_error_log(
                        "error",
                        &format!("cluster-directorHeartbeat: {}", e),
                    );
                    observability::record_store_error("director_heartbeat");
                }
            }
        }

        warn!("cluster-directorHeartbeat: Exiting");
    }

    /// Overwrite the director record with a fresh timestamp and TTL. The
    /// monitor reconciles any divergence this may race with.
    async fn send_director_heartbeat(&self) -> Result<()> {
        let payload = DirectorRecord::new(&self.member_id).to_payload()?;
        self.store
            .set(
                DIRECTOR_KEY,
                &payload,
                SetOptions::default().with_ttl(self.heartbeat_timeout),
            )
            .await
    }
}
