//! Lookup scheduling and processing.

use std::sync::Arc;
use std::time::Duration;

use playertrack_events::bus::{TrackerEvent, PLAYER_ADDED};
use playertrack_pipeline::VerificationPipeline;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Verify up to `batch_size` open lookups every `every`, until `cancel`.
pub async fn run(
    pipeline: Arc<VerificationPipeline>,
    every: Duration,
    batch_size: usize,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        batch_size,
        "Lookup processor started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lookup processor stopping");
                break;
            }
            _ = interval.tick() => {
                match pipeline.process_pending(batch_size).await {
                    Ok(0) => tracing::trace!("Lookup processor: nothing pending"),
                    Ok(resolved) => tracing::debug!(resolved, "Lookup processor: batch done"),
                    Err(e) => tracing::error!(error = %e, "Lookup processor: batch failed"),
                }
            }
        }
    }
}

/// Issue a batch lookup for every player the cache reports as newly added.
pub async fn listen(
    pipeline: Arc<VerificationPipeline>,
    mut receiver: broadcast::Receiver<TrackerEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lookup scheduler stopping");
                break;
            }
            received = receiver.recv() => received,
        };

        match event {
            Ok(event) if event.is(PLAYER_ADDED) => {
                let Some(player_id) = event.player_id else {
                    continue;
                };
                if let Err(e) = pipeline.request_batch(player_id).await {
                    tracing::error!(player_id, error = %e, "Failed to schedule batch lookup");
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Lookup scheduler lagged, some players were not scheduled");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event bus closed, lookup scheduler shutting down");
                break;
            }
        }
    }
}
