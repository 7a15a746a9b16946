use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str =
    "playertrack_worker=debug,playertrack_pipeline=debug,playertrack_cache=info,playertrack_db=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Call once, before spawning jobs.
pub fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
