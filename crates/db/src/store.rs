//! Persistence port for players and their dependent records.

use std::collections::HashSet;

use async_trait::async_trait;
use playertrack_core::history::{CustomizeHistory, EncounterPlayer, NameWorldHistory};
use playertrack_core::lookup::LodestoneLookup;
use playertrack_core::player::{Category, Player, Tag};
use playertrack_core::types::{DbId, LodestoneId};

/// Errors surfaced by a [`PlayerStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for players, categories, tags, lookups, and history.
///
/// Player rows returned by [`get_all_players_with_relations`] carry their
/// category and tag assignments; [`update_player`] writes scalar fields only,
/// assignments change through the dedicated methods.
///
/// [`get_all_players_with_relations`]: PlayerStore::get_all_players_with_relations
/// [`update_player`]: PlayerStore::update_player
#[async_trait]
pub trait PlayerStore: Send + Sync {
    // -- Players ---------------------------------------------------------

    async fn get_all_players_with_relations(&self) -> StoreResult<Vec<Player>>;

    async fn get_player(&self, id: DbId) -> StoreResult<Option<Player>>;

    async fn get_players_by_lodestone_id(&self, lodestone_id: LodestoneId)
        -> StoreResult<Vec<Player>>;

    /// Insert a player and return its new id.
    async fn create_player(&self, player: &Player) -> StoreResult<DbId>;

    async fn update_player(&self, player: &Player) -> StoreResult<()>;

    /// Delete a player together with every dependent row.
    async fn delete_player(&self, id: DbId) -> StoreResult<()>;

    /// Ids of players referenced by at least one encounter.
    async fn get_players_with_encounters(&self) -> StoreResult<HashSet<DbId>>;

    async fn delete_player_config(&self, player_id: DbId) -> StoreResult<()>;

    // -- Categories / tags -----------------------------------------------

    async fn get_categories(&self) -> StoreResult<Vec<Category>>;

    async fn create_category(&self, category: &Category) -> StoreResult<DbId>;

    async fn update_category(&self, category: &Category) -> StoreResult<()>;

    /// Delete a category and all of its assignments.
    async fn delete_category(&self, id: DbId) -> StoreResult<()>;

    async fn assign_category(&self, player_id: DbId, category_id: DbId) -> StoreResult<()>;

    async fn unassign_category(&self, player_id: DbId, category_id: DbId) -> StoreResult<()>;

    async fn delete_category_assignments(&self, player_id: DbId) -> StoreResult<()>;

    async fn get_tags(&self) -> StoreResult<Vec<Tag>>;

    async fn create_tag(&self, tag: &Tag) -> StoreResult<DbId>;

    /// Delete a tag and all of its assignments.
    async fn delete_tag(&self, id: DbId) -> StoreResult<()>;

    async fn assign_tag(&self, player_id: DbId, tag_id: DbId) -> StoreResult<()>;

    async fn delete_tag_assignments(&self, player_id: DbId) -> StoreResult<()>;

    // -- Lookups ---------------------------------------------------------

    async fn create_lookup(&self, lookup: &LodestoneLookup) -> StoreResult<DbId>;

    async fn update_lookup(&self, lookup: &LodestoneLookup) -> StoreResult<()>;

    async fn get_lookup(&self, id: DbId) -> StoreResult<Option<LodestoneLookup>>;

    /// All lookups for a player, oldest first.
    async fn get_lookups_by_player(&self, player_id: DbId) -> StoreResult<Vec<LodestoneLookup>>;

    /// Unverified lookups ready to send, oldest first.
    async fn get_pending_lookups(&self, limit: usize) -> StoreResult<Vec<LodestoneLookup>>;

    /// Lookups parked behind a prerequisite.
    async fn get_blocked_lookups(&self) -> StoreResult<Vec<LodestoneLookup>>;

    async fn get_lookups_by_prerequisite(
        &self,
        prerequisite_id: DbId,
    ) -> StoreResult<Vec<LodestoneLookup>>;

    // -- History / encounters --------------------------------------------

    async fn create_name_world_history(&self, row: &NameWorldHistory) -> StoreResult<DbId>;

    /// Name/world history for a player, oldest first.
    async fn get_name_world_history(&self, player_id: DbId) -> StoreResult<Vec<NameWorldHistory>>;

    async fn create_customize_history(&self, row: &CustomizeHistory) -> StoreResult<DbId>;

    async fn get_customize_history(&self, player_id: DbId) -> StoreResult<Vec<CustomizeHistory>>;

    async fn create_encounter_player(&self, encounter_id: DbId, player_id: DbId)
        -> StoreResult<DbId>;

    async fn get_encounter_players(&self, player_id: DbId) -> StoreResult<Vec<EncounterPlayer>>;

    /// Point encounter and history rows owned by `from` at `to`. Returns the
    /// number of rows moved.
    async fn reassign_player_references(&self, from: DbId, to: DbId) -> StoreResult<u64>;
}
