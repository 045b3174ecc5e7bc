//! Health surface for the cluster engine.
//!
//! Components write pass/fail status here as they encounter (or recover
//! from) backend trouble; the (out-of-scope) HTTP API serves the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Point-in-time health state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    /// Whether the last reporting component considered itself healthy.
    pub ok: bool,
    /// Description of the current state.
    pub message: String,
    /// When the state was last written.
    pub updated_at: DateTime<Utc>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ok: true,
            message: "ok".to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Shared writable health surface.
#[derive(Clone, Default)]
pub struct Health {
    state: Arc<RwLock<HealthState>>,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current health status with a message.
    pub fn write(&self, ok: bool, message: impl Into<String>) {
        let mut state = self.state.write().expect("health state poisoned");
        state.ok = ok;
        state.message = message.into();
        state.updated_at = Utc::now();
    }

    /// Read the current health status.
    pub fn snapshot(&self) -> HealthState {
        self.state.read().expect("health state poisoned").clone()
    }
}
