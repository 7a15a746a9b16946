//! Duplicate merge engine.
//!
//! Players sharing a lodestone id are the same character. The survivor is
//! chosen by [`sort_for_merge`]; each loser is folded in with [`absorb`], its
//! dependent rows are re-parented, and it is deleted from store and cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use playertrack_cache::PlayerCache;
use playertrack_core::merge::{absorb, sort_for_merge};
use playertrack_core::player::Player;
use playertrack_core::types::{DbId, LodestoneId, Timestamp};
use playertrack_db::PlayerStore;
use playertrack_events::bus::{EventBus, TrackerEvent, PLAYERS_MERGED};

use crate::error::PipelineResult;

pub struct DuplicateMerger {
    store: Arc<dyn PlayerStore>,
    cache: Arc<PlayerCache>,
    events: Arc<EventBus>,
}

impl DuplicateMerger {
    pub fn new(store: Arc<dyn PlayerStore>, cache: Arc<PlayerCache>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            cache,
            events,
        }
    }

    /// Merge every player carrying `lodestone_id` into one survivor.
    ///
    /// Returns the survivor's id, or `None` when there was nothing to merge.
    /// Running it again on the result is a no-op.
    pub async fn merge_by_lodestone_id(
        &self,
        lodestone_id: LodestoneId,
    ) -> PipelineResult<Option<DbId>> {
        if lodestone_id == 0 {
            return Ok(None);
        }
        let mut players = self.store.get_players_by_lodestone_id(lodestone_id).await?;
        if players.len() < 2 {
            return Ok(None);
        }

        // Presence is process-local; the cache holds the live values.
        for player in &mut players {
            if let Some(cached) = self.cache.get_by_id(player.id).await {
                player.is_current = cached.is_current;
                player.is_recent = cached.is_recent;
                player.entity_id = cached.entity_id;
            }
        }

        sort_for_merge(&mut players);
        let mut players = players.into_iter();
        let Some(mut survivor) = players.next() else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut merged = Vec::new();
        for loser in players {
            self.retire(&mut survivor, &loser, now).await?;
            merged.push(loser.id);
        }

        self.store.update_player(&survivor).await?;
        for category in &survivor.assigned_categories {
            self.store.assign_category(survivor.id, category.id).await?;
        }
        for tag in &survivor.assigned_tags {
            self.store.assign_tag(survivor.id, tag.id).await?;
        }

        let survivor_id = survivor.id;
        self.cache.add(survivor).await;

        tracing::info!(
            lodestone_id,
            survivor_id,
            merged = ?merged,
            "Merged duplicate players"
        );
        self.events.publish(
            TrackerEvent::new(PLAYERS_MERGED)
                .with_player(survivor_id)
                .with_payload(serde_json::json!({
                    "lodestone_id": lodestone_id,
                    "merged": merged,
                })),
        );

        Ok(Some(survivor_id))
    }

    /// Fold `loser` into `survivor` and remove every trace of it.
    async fn retire(
        &self,
        survivor: &mut Player,
        loser: &Player,
        now: Timestamp,
    ) -> PipelineResult<()> {
        let history = absorb(survivor, loser, now);
        if let Some(row) = &history.name_world {
            self.store.create_name_world_history(row).await?;
        }
        if let Some(row) = &history.customize {
            self.store.create_customize_history(row).await?;
        }

        let moved = self
            .store
            .reassign_player_references(loser.id, survivor.id)
            .await?;
        self.store.delete_player_config(loser.id).await?;
        self.store.delete_category_assignments(loser.id).await?;
        self.store.delete_tag_assignments(loser.id).await?;
        self.store.delete_player(loser.id).await?;
        self.cache.remove(loser.id).await;

        tracing::debug!(
            survivor_id = survivor.id,
            loser_id = loser.id,
            moved,
            "Retired duplicate player"
        );
        Ok(())
    }

    /// Merge every lodestone id held by more than one player.
    ///
    /// Returns the number of groups merged. A failing group is logged and
    /// skipped.
    pub async fn sweep(&self) -> PipelineResult<usize> {
        let players = self.store.get_all_players_with_relations().await?;
        let mut counts: BTreeMap<LodestoneId, usize> = BTreeMap::new();
        for player in players.iter().filter(|p| p.lodestone_id != 0) {
            *counts.entry(player.lodestone_id).or_default() += 1;
        }

        let mut merged = 0;
        for lodestone_id in counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
        {
            match self.merge_by_lodestone_id(lodestone_id).await {
                Ok(Some(_)) => merged += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(lodestone_id, error = %e, "Duplicate merge failed");
                }
            }
        }

        if merged > 0 {
            tracing::info!(groups = merged, "Duplicate sweep merged players");
        } else {
            tracing::debug!("Duplicate sweep found nothing to merge");
        }
        Ok(merged)
    }
}
