//! Periodic duplicate sweep.

use std::sync::Arc;
use std::time::Duration;

use playertrack_pipeline::VerificationPipeline;
use tokio_util::sync::CancellationToken;

/// Merge players sharing a lodestone id every `every`, until `cancel`.
pub async fn run(pipeline: Arc<VerificationPipeline>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Duplicate sweep started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Duplicate sweep stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = pipeline.merger().sweep().await {
                    tracing::error!(error = %e, "Duplicate sweep failed");
                }
            }
        }
    }
}
