//! Periodic demotion of recent players.
//!
//! A player stays in the recent view for `threshold` after it was put there
//! or last seen, whichever is later.
//! Expired players are pushed back through [`PlayerCache::update`] with
//! `is_recent` cleared, so every view stays consistent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use playertrack_cache::PlayerCache;
use playertrack_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

/// Demote every recent player whose window ended before `now`.
/// Returns how many were demoted.
pub async fn sweep_once(cache: &PlayerCache, threshold: Duration, now: Timestamp) -> usize {
    let mut demoted = 0;
    for player_id in cache.expired_recent(threshold, now).await {
        let Some(mut player) = cache.get_by_id(player_id).await else {
            continue;
        };
        player.is_recent = false;
        cache.update(player).await;
        demoted += 1;
    }
    demoted
}

/// Run the recency sweep until `cancel` is triggered.
pub async fn run(
    cache: Arc<PlayerCache>,
    threshold: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        threshold_secs = threshold.as_secs(),
        interval_secs = every.as_secs(),
        "Recency sweep started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Recency sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let demoted = sweep_once(&cache, threshold, Utc::now()).await;
                if demoted > 0 {
                    tracing::debug!(demoted, "Recency sweep: demoted players");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playertrack_cache::{CacheSettings, ViewFilter};
    use playertrack_core::player::Player;
    use playertrack_db::MemoryStore;
    use playertrack_events::EventBus;

    const THRESHOLD: Duration = Duration::from_secs(15 * 60);

    fn cache() -> PlayerCache {
        PlayerCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EventBus::default()),
            CacheSettings::default(),
        )
    }

    async fn recent(cache: &PlayerCache, id: i64, name: &str) {
        let mut p = Player::new(name, 63, Utc::now());
        p.id = id;
        p.is_recent = true;
        cache.add(p).await;
    }

    #[tokio::test]
    async fn fresh_players_are_kept() {
        let cache = cache();
        recent(&cache, 1, "Aria").await;
        assert_eq!(sweep_once(&cache, THRESHOLD, Utc::now()).await, 0);
        assert_eq!(cache.ids(ViewFilter::Recent).await, vec![1]);
    }

    #[tokio::test]
    async fn expired_players_are_demoted() {
        let cache = cache();
        recent(&cache, 1, "Aria").await;
        recent(&cache, 2, "Bram").await;

        let later = Utc::now() + chrono::Duration::minutes(16);
        assert_eq!(sweep_once(&cache, THRESHOLD, later).await, 2);

        assert!(cache.ids(ViewFilter::Recent).await.is_empty());
        assert_eq!(cache.len().await, 2);
        assert!(!cache.get_by_id(1).await.unwrap().is_recent);
    }

    #[tokio::test]
    async fn resighted_players_are_kept() {
        let cache = cache();
        recent(&cache, 1, "Aria").await;
        let now = Utc::now();

        let mut p = cache.get_by_id(1).await.unwrap();
        p.last_seen = now + chrono::Duration::minutes(14);
        cache.update(p).await;

        let later = now + chrono::Duration::minutes(16);
        assert_eq!(sweep_once(&cache, THRESHOLD, later).await, 0);
        assert_eq!(cache.ids(ViewFilter::Recent).await, vec![1]);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let cache = Arc::new(cache());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            cache,
            THRESHOLD,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweep stops")
            .expect("task did not panic");
    }
}
