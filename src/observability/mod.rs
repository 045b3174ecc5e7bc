//! Observability for Argus.
//!
//! Provides logging initialization and metric recording helpers. Metrics go
//! through the `metrics` facade; exporter wiring belongs to the embedding
//! process, not the engine.

use crate::config::ObservabilityConfig;
use crate::error::{ArgusError, Result};
use metrics::{counter, gauge};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging from configuration.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ArgusError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ArgusError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Record a director role transition for this member.
pub fn record_director_state(is_director: bool) {
    gauge!("argus_cluster_director").set(if is_director { 1.0 } else { 0.0 });
    counter!("argus_cluster_role_transitions_total").increment(1);
}

/// Record a work-redistribution signal.
pub fn record_distribute_signal() {
    counter!("argus_cluster_distribute_signals_total").increment(1);
}

/// Record a coordination-store failure by classification.
pub fn record_store_error(kind: &'static str) {
    counter!("argus_cluster_store_errors_total", "type" => kind).increment(1);
}
