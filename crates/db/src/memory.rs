//! In-process [`PlayerStore`] backed by ordered maps.
//!
//! Used by tests and by embedders that keep no database. Every table lives
//! behind one `tokio::sync::Mutex`, so each call is atomic.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use playertrack_core::history::{CustomizeHistory, EncounterPlayer, NameWorldHistory};
use playertrack_core::lookup::{LodestoneLookup, LodestoneStatus};
use playertrack_core::player::{Category, Player, Tag};
use playertrack_core::types::{DbId, LodestoneId};
use tokio::sync::{Mutex, MutexGuard};

use crate::store::{PlayerStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    last_id: DbId,
    players: BTreeMap<DbId, Player>,
    player_configs: HashSet<DbId>,
    categories: BTreeMap<DbId, Category>,
    tags: BTreeMap<DbId, Tag>,
    /// `(player_id, category_id)`
    category_assignments: BTreeSet<(DbId, DbId)>,
    /// `(player_id, tag_id)`
    tag_assignments: BTreeSet<(DbId, DbId)>,
    lookups: BTreeMap<DbId, LodestoneLookup>,
    name_world_history: BTreeMap<DbId, NameWorldHistory>,
    customize_history: BTreeMap<DbId, CustomizeHistory>,
    encounter_players: BTreeMap<DbId, EncounterPlayer>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }

    fn with_relations(&self, player: &Player) -> Player {
        let mut full = player.clone();
        full.assigned_categories = self
            .category_assignments
            .iter()
            .filter(|(p, _)| *p == player.id)
            .filter_map(|(_, c)| self.categories.get(c).cloned())
            .collect();
        full.assigned_tags = self
            .tag_assignments
            .iter()
            .filter(|(p, _)| *p == player.id)
            .filter_map(|(_, t)| self.tags.get(t).cloned())
            .collect();
        full
    }

    fn bare(player: &Player) -> Player {
        let mut row = player.clone();
        row.assigned_categories.clear();
        row.assigned_tags.clear();
        row
    }

    fn require_player(&self, id: DbId) -> StoreResult<()> {
        if self.players.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "player",
                id,
            })
        }
    }
}

/// A [`PlayerStore`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    read_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`] until
    /// reset, mimicking a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Hold every full player read for `delay` after its snapshot is taken,
    /// like a slow query racing concurrent writes. `Duration::ZERO` resets.
    pub fn set_read_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.read_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Record that a player has a per-player config row.
    pub async fn insert_player_config(&self, player_id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        t.require_player(player_id)?;
        t.player_configs.insert(player_id);
        Ok(())
    }

    pub async fn has_player_config(&self, player_id: DbId) -> StoreResult<bool> {
        Ok(self.tables().await?.player_configs.contains(&player_id))
    }

    async fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(self.tables.lock().await)
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    // -- Players ---------------------------------------------------------

    async fn get_all_players_with_relations(&self) -> StoreResult<Vec<Player>> {
        let players: Vec<Player> = {
            let t = self.tables().await?;
            t.players.values().map(|p| t.with_relations(p)).collect()
        };
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(players)
    }

    async fn get_player(&self, id: DbId) -> StoreResult<Option<Player>> {
        let t = self.tables().await?;
        Ok(t.players.get(&id).map(|p| t.with_relations(p)))
    }

    async fn get_players_by_lodestone_id(
        &self,
        lodestone_id: LodestoneId,
    ) -> StoreResult<Vec<Player>> {
        if lodestone_id == 0 {
            return Ok(Vec::new());
        }
        let t = self.tables().await?;
        Ok(t.players
            .values()
            .filter(|p| p.lodestone_id == lodestone_id)
            .map(|p| t.with_relations(p))
            .collect())
    }

    async fn create_player(&self, player: &Player) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        let id = t.next_id();
        let mut row = Tables::bare(player);
        row.id = id;
        t.players.insert(id, row);
        for category in &player.assigned_categories {
            t.category_assignments.insert((id, category.id));
        }
        for tag in &player.assigned_tags {
            t.tag_assignments.insert((id, tag.id));
        }
        Ok(id)
    }

    async fn update_player(&self, player: &Player) -> StoreResult<()> {
        let mut t = self.tables().await?;
        t.require_player(player.id)?;
        t.players.insert(player.id, Tables::bare(player));
        Ok(())
    }

    async fn delete_player(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        t.require_player(id)?;
        t.players.remove(&id);
        t.player_configs.remove(&id);
        t.category_assignments.retain(|(p, _)| *p != id);
        t.tag_assignments.retain(|(p, _)| *p != id);
        t.lookups.retain(|_, l| l.player_id != id);
        t.name_world_history.retain(|_, h| h.player_id != id);
        t.customize_history.retain(|_, h| h.player_id != id);
        t.encounter_players.retain(|_, e| e.player_id != id);
        Ok(())
    }

    async fn get_players_with_encounters(&self) -> StoreResult<HashSet<DbId>> {
        let t = self.tables().await?;
        Ok(t.encounter_players.values().map(|e| e.player_id).collect())
    }

    async fn delete_player_config(&self, player_id: DbId) -> StoreResult<()> {
        self.tables().await?.player_configs.remove(&player_id);
        Ok(())
    }

    // -- Categories / tags -----------------------------------------------

    async fn get_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.tables().await?.categories.values().cloned().collect())
    }

    async fn create_category(&self, category: &Category) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        let id = t.next_id();
        let mut row = category.clone();
        row.id = id;
        t.categories.insert(id, row);
        Ok(id)
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut t = self.tables().await?;
        match t.categories.get_mut(&category.id) {
            Some(row) => {
                *row = category.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "category",
                id: category.id,
            }),
        }
    }

    async fn delete_category(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        if t.categories.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                entity: "category",
                id,
            });
        }
        t.category_assignments.retain(|(_, c)| *c != id);
        Ok(())
    }

    async fn assign_category(&self, player_id: DbId, category_id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        t.require_player(player_id)?;
        if !t.categories.contains_key(&category_id) {
            return Err(StoreError::NotFound {
                entity: "category",
                id: category_id,
            });
        }
        t.category_assignments.insert((player_id, category_id));
        Ok(())
    }

    async fn unassign_category(&self, player_id: DbId, category_id: DbId) -> StoreResult<()> {
        self.tables()
            .await?
            .category_assignments
            .remove(&(player_id, category_id));
        Ok(())
    }

    async fn delete_category_assignments(&self, player_id: DbId) -> StoreResult<()> {
        self.tables()
            .await?
            .category_assignments
            .retain(|(p, _)| *p != player_id);
        Ok(())
    }

    async fn get_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.tables().await?.tags.values().cloned().collect())
    }

    async fn create_tag(&self, tag: &Tag) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        let id = t.next_id();
        let mut row = tag.clone();
        row.id = id;
        t.tags.insert(id, row);
        Ok(id)
    }

    async fn delete_tag(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        if t.tags.remove(&id).is_none() {
            return Err(StoreError::NotFound { entity: "tag", id });
        }
        t.tag_assignments.retain(|(_, tag)| *tag != id);
        Ok(())
    }

    async fn assign_tag(&self, player_id: DbId, tag_id: DbId) -> StoreResult<()> {
        let mut t = self.tables().await?;
        t.require_player(player_id)?;
        if !t.tags.contains_key(&tag_id) {
            return Err(StoreError::NotFound {
                entity: "tag",
                id: tag_id,
            });
        }
        t.tag_assignments.insert((player_id, tag_id));
        Ok(())
    }

    async fn delete_tag_assignments(&self, player_id: DbId) -> StoreResult<()> {
        self.tables()
            .await?
            .tag_assignments
            .retain(|(p, _)| *p != player_id);
        Ok(())
    }

    // -- Lookups ---------------------------------------------------------

    async fn create_lookup(&self, lookup: &LodestoneLookup) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        let id = t.next_id();
        let mut row = lookup.clone();
        row.id = id;
        t.lookups.insert(id, row);
        Ok(id)
    }

    async fn update_lookup(&self, lookup: &LodestoneLookup) -> StoreResult<()> {
        let mut t = self.tables().await?;
        match t.lookups.get_mut(&lookup.id) {
            Some(row) => {
                *row = lookup.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "lodestone_lookup",
                id: lookup.id,
            }),
        }
    }

    async fn get_lookup(&self, id: DbId) -> StoreResult<Option<LodestoneLookup>> {
        Ok(self.tables().await?.lookups.get(&id).cloned())
    }

    async fn get_lookups_by_player(&self, player_id: DbId) -> StoreResult<Vec<LodestoneLookup>> {
        let t = self.tables().await?;
        let mut rows: Vec<LodestoneLookup> = t
            .lookups
            .values()
            .filter(|l| l.player_id == player_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn get_pending_lookups(&self, limit: usize) -> StoreResult<Vec<LodestoneLookup>> {
        let t = self.tables().await?;
        let mut rows: Vec<LodestoneLookup> = t
            .lookups
            .values()
            .filter(|l| l.status == LodestoneStatus::Unverified)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get_blocked_lookups(&self) -> StoreResult<Vec<LodestoneLookup>> {
        let t = self.tables().await?;
        Ok(t.lookups
            .values()
            .filter(|l| l.status == LodestoneStatus::Blocked)
            .cloned()
            .collect())
    }

    async fn get_lookups_by_prerequisite(
        &self,
        prerequisite_id: DbId,
    ) -> StoreResult<Vec<LodestoneLookup>> {
        let t = self.tables().await?;
        Ok(t.lookups
            .values()
            .filter(|l| l.prerequisite_lookup_id == Some(prerequisite_id))
            .cloned()
            .collect())
    }

    // -- History / encounters --------------------------------------------

    async fn create_name_world_history(&self, row: &NameWorldHistory) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        t.require_player(row.player_id)?;
        let id = t.next_id();
        let mut row = row.clone();
        row.id = id;
        t.name_world_history.insert(id, row);
        Ok(id)
    }

    async fn get_name_world_history(&self, player_id: DbId) -> StoreResult<Vec<NameWorldHistory>> {
        let t = self.tables().await?;
        let mut rows: Vec<NameWorldHistory> = t
            .name_world_history
            .values()
            .filter(|h| h.player_id == player_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn create_customize_history(&self, row: &CustomizeHistory) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        t.require_player(row.player_id)?;
        let id = t.next_id();
        let mut row = row.clone();
        row.id = id;
        t.customize_history.insert(id, row);
        Ok(id)
    }

    async fn get_customize_history(&self, player_id: DbId) -> StoreResult<Vec<CustomizeHistory>> {
        let t = self.tables().await?;
        Ok(t.customize_history
            .values()
            .filter(|h| h.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn create_encounter_player(
        &self,
        encounter_id: DbId,
        player_id: DbId,
    ) -> StoreResult<DbId> {
        let mut t = self.tables().await?;
        t.require_player(player_id)?;
        let id = t.next_id();
        t.encounter_players.insert(
            id,
            EncounterPlayer {
                id,
                encounter_id,
                player_id,
                created: chrono::Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_encounter_players(&self, player_id: DbId) -> StoreResult<Vec<EncounterPlayer>> {
        let t = self.tables().await?;
        Ok(t.encounter_players
            .values()
            .filter(|e| e.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn reassign_player_references(&self, from: DbId, to: DbId) -> StoreResult<u64> {
        let mut t = self.tables().await?;
        t.require_player(to)?;
        let mut moved = 0u64;
        for row in t.encounter_players.values_mut().filter(|e| e.player_id == from) {
            row.player_id = to;
            moved += 1;
        }
        for row in t.name_world_history.values_mut().filter(|h| h.player_id == from) {
            row.player_id = to;
            moved += 1;
        }
        for row in t.customize_history.values_mut().filter(|h| h.player_id == from) {
            row.player_id = to;
            moved += 1;
        }
        tracing::debug!(from, to, moved, "Reassigned player references");
        Ok(moved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use playertrack_core::lookup::LookupType;

    async fn seeded() -> (MemoryStore, DbId) {
        let store = MemoryStore::new();
        let id = store
            .create_player(&Player::new("Foo Bar", 1, Utc::now()))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn relations_are_joined_on_read() {
        let (store, id) = seeded().await;
        let cat = store.create_category(&Category::new(0, "Friends", 1)).await.unwrap();
        let tag = store.create_tag(&Tag::new(0, "vip")).await.unwrap();
        store.assign_category(id, cat).await.unwrap();
        store.assign_tag(id, tag).await.unwrap();

        let player = store.get_player(id).await.unwrap().unwrap();
        assert!(player.has_category(cat));
        assert!(player.has_tag(tag));

        store.delete_category(cat).await.unwrap();
        let player = store.get_player(id).await.unwrap().unwrap();
        assert!(player.assigned_categories.is_empty());
    }

    #[tokio::test]
    async fn update_does_not_touch_assignments() {
        let (store, id) = seeded().await;
        let cat = store.create_category(&Category::new(0, "Friends", 1)).await.unwrap();
        store.assign_category(id, cat).await.unwrap();

        let mut player = store.get_player(id).await.unwrap().unwrap();
        player.assigned_categories.clear();
        player.notes = "updated".into();
        store.update_player(&player).await.unwrap();

        let player = store.get_player(id).await.unwrap().unwrap();
        assert_eq!(player.notes, "updated");
        assert!(player.has_category(cat));
    }

    #[tokio::test]
    async fn delete_cascades() {
        let (store, id) = seeded().await;
        store.insert_player_config(id).await.unwrap();
        store.create_encounter_player(1, id).await.unwrap();
        let player = store.get_player(id).await.unwrap().unwrap();
        store
            .create_lookup(&LodestoneLookup::for_player(&player, LookupType::Batch, Utc::now()))
            .await
            .unwrap();

        store.delete_player(id).await.unwrap();
        assert!(store.get_player(id).await.unwrap().is_none());
        assert!(store.get_lookups_by_player(id).await.unwrap().is_empty());
        assert!(store.get_players_with_encounters().await.unwrap().is_empty());
        assert!(!store.has_player_config(id).await.unwrap());
    }

    #[tokio::test]
    async fn reassign_moves_encounters_and_history() {
        let (store, from) = seeded().await;
        let to = store
            .create_player(&Player::new("Foo Baz", 1, Utc::now()))
            .await
            .unwrap();
        store.create_encounter_player(1, from).await.unwrap();
        store
            .create_name_world_history(&NameWorldHistory::new(from, "Old", 1, Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.reassign_player_references(from, to).await.unwrap(), 2);
        assert_eq!(store.get_encounter_players(to).await.unwrap().len(), 1);
        assert_eq!(store.get_name_world_history(to).await.unwrap().len(), 1);
        assert!(store.get_encounter_players(from).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_lookups_exclude_blocked_and_terminal() {
        let (store, id) = seeded().await;
        let player = store.get_player(id).await.unwrap().unwrap();
        let mut lookup = LodestoneLookup::for_player(&player, LookupType::Batch, Utc::now());
        let open = store.create_lookup(&lookup).await.unwrap();
        lookup.status = LodestoneStatus::Blocked;
        store.create_lookup(&lookup).await.unwrap();
        lookup.status = LodestoneStatus::Failed;
        store.create_lookup(&lookup).await.unwrap();

        let pending = store.get_pending_lookups(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, open);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let (store, id) = seeded().await;
        store.set_unavailable(true);
        assert_matches!(store.get_player(id).await, Err(StoreError::Unavailable(_)));
        store.set_unavailable(false);
        assert!(store.get_player(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store = MemoryStore::new();
        assert_matches!(
            store.update_player(&Player::new("Ghost", 1, Utc::now())).await,
            Err(StoreError::NotFound { entity: "player", .. })
        );
        assert_matches!(
            store.delete_tag(5).await,
            Err(StoreError::NotFound { entity: "tag", id: 5 })
        );
    }
}
