//! Director role flag.
//!
//! The flag has exactly one writer, the director monitor; the director
//! heartbeat and member monitor read it to gate their work. Every write
//! publishes the new value on the state channel while the lock is held, so
//! readers between two published transitions always observe a stable value.
//! Back-pressure on the channel is the receiver's problem: a slow consumer
//! blocks role transitions, by contract.

use crate::observability;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Mutex-guarded director flag with publish-on-write.
pub struct DirectorState {
    flag: Mutex<bool>,
    state_tx: mpsc::Sender<bool>,
}

impl DirectorState {
    pub fn new(state_tx: mpsc::Sender<bool>) -> Self {
        Self {
            flag: Mutex::new(false),
            state_tx,
        }
    }

    /// Whether this member currently holds the director role.
    pub async fn is_director(&self) -> bool {
        *self.flag.lock().await
    }

    /// Set the role flag and publish the transition. Only the director
    /// monitor calls this.
    pub async fn set(&self, is_director: bool) {
        let mut flag = self.flag.lock().await;
        *flag = is_director;
        observability::record_director_state(is_director);

        if self.state_tx.send(is_director).await.is_err() {
            warn!("State channel closed; dropping role transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_as_member() {
        let (tx, _rx) = mpsc::channel(4);
        let state = DirectorState::new(tx);
        assert!(!state.is_director().await);
    }

    #[tokio::test]
    async fn test_set_publishes_every_transition() {
        let (tx, mut rx) = mpsc::channel(4);
        let state = DirectorState::new(tx);

        state.set(true).await;
        state.set(false).await;
        state.set(true).await;

        assert!(state.is_director().await);
        assert_eq!(rx.recv().await, Some(true));
        assert_eq!(rx.recv().await, Some(false));
        assert_eq!(rx.recv().await, Some(true));
    }

    #[tokio::test]
    async fn test_set_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let state = DirectorState::new(tx);
        state.set(true).await;
        assert!(state.is_director().await);
    }
}
