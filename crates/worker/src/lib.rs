//! Background jobs for the player tracker.
//!
//! Each job is an async `run` loop that stops when its
//! [`CancellationToken`] fires:
//!
//! - [`recency::run`] demotes players whose recent window has passed.
//! - [`lookups::run`] verifies open lookups; [`lookups::listen`] issues batch
//!   lookups for newly added players.
//! - [`duplicates::run`] sweeps for players sharing a lodestone id.

use std::sync::Arc;

use playertrack_cache::PlayerCache;
use playertrack_core::config::TrackerConfig;
use playertrack_events::EventBus;
use playertrack_pipeline::VerificationPipeline;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod duplicates;
pub mod lookups;
pub mod recency;
pub mod telemetry;

/// Read `.env` (if present) and build the configuration from the environment.
pub fn load_config() -> TrackerConfig {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }
    TrackerConfig::from_env()
}

/// Spawn every background job. All of them stop when `cancel` fires.
pub fn spawn_jobs(
    config: &TrackerConfig,
    cache: Arc<PlayerCache>,
    pipeline: Arc<VerificationPipeline>,
    events: &EventBus,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let handles = vec![
        tokio::spawn(recency::run(
            Arc::clone(&cache),
            config.recent_threshold,
            config.recency_sweep_interval,
            cancel.clone(),
        )),
        tokio::spawn(lookups::run(
            Arc::clone(&pipeline),
            config.lookup_interval,
            config.lookup_batch_size,
            cancel.clone(),
        )),
        tokio::spawn(lookups::listen(
            Arc::clone(&pipeline),
            events.subscribe(),
            cancel.clone(),
        )),
        tokio::spawn(duplicates::run(
            pipeline,
            config.duplicate_sweep_interval,
            cancel,
        )),
    ];
    tracing::info!(jobs = handles.len(), "Background jobs started");
    handles
}
