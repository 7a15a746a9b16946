//! Multi-index player cache.
//!
//! [`PlayerCache`] owns the in-memory player arena and five views over it:
//! all, current, recent, by-category, and by-tag. A single
//! `tokio::sync::RwLock` guards the arena and every view together, and each
//! mutation removes the affected player from every view and reinserts it
//! before the lock is released, so readers never see a half-applied change.
//! Notifications go out on the [`EventBus`] after the lock is dropped.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use playertrack_core::config::TrackerConfig;
use playertrack_core::player::{player_key, Category, Player};
use playertrack_core::ranking::{
    derive_fields, CategoryTable, DisplayDefaults, NoCategoryPlacement, PlayerOrdering,
    SecondarySort,
};
use playertrack_core::search::{NameMatchMode, SearchContext, SearchQuery};
use playertrack_core::types::{DbId, Timestamp, WorldId};
use playertrack_core::worlds::WorldRegistry;
use playertrack_db::{PlayerStore, StoreError};
use playertrack_events::bus::{EventBus, TrackerEvent, PLAYER_ADDED, PLAYER_UPDATED};
use tokio::sync::RwLock;

use crate::index::{PlayerIndex, RecentIndex};

// ---------------------------------------------------------------------------
// View filter / settings
// ---------------------------------------------------------------------------

/// Selects which view a read or resort targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewFilter {
    All,
    Current,
    Recent,
    Category(DbId),
    Tag(DbId),
}

/// Construction-time cache settings.
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    pub placement: NoCategoryPlacement,
    pub name_mode: NameMatchMode,
    pub display_defaults: DisplayDefaults,
    pub worlds: WorldRegistry,
}

impl CacheSettings {
    pub fn from_config(config: &TrackerConfig, worlds: WorldRegistry) -> Self {
        Self {
            placement: config.no_category_placement,
            name_mode: config.name_search_mode,
            display_defaults: config.display_defaults,
            worlds,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheState
// ---------------------------------------------------------------------------

/// Arena plus every view. Only ever touched under the cache lock.
#[derive(Debug)]
struct CacheState {
    players: HashMap<DbId, Player>,
    /// Unmerged duplicates share a key until the merge catches up.
    keys: HashMap<String, BTreeSet<DbId>>,
    content_ids: HashMap<u64, DbId>,
    categories: CategoryTable,
    placement: NoCategoryPlacement,
    defaults: DisplayDefaults,
    all: PlayerIndex,
    current: PlayerIndex,
    recent: RecentIndex,
    by_category: HashMap<DbId, PlayerIndex>,
    by_tag: HashMap<DbId, PlayerIndex>,
    /// Bumped by every add/update/remove.
    generation: u64,
    /// Generation of the last add/update/remove per player.
    touched: HashMap<DbId, u64>,
}

impl CacheState {
    fn empty(
        categories: CategoryTable,
        placement: NoCategoryPlacement,
        defaults: DisplayDefaults,
    ) -> Self {
        let by_name = PlayerOrdering::new(placement, SecondarySort::Name);
        Self {
            players: HashMap::new(),
            keys: HashMap::new(),
            content_ids: HashMap::new(),
            categories,
            placement,
            defaults,
            all: PlayerIndex::new(by_name),
            current: PlayerIndex::new(by_name),
            recent: RecentIndex::new(PlayerOrdering::new(placement, SecondarySort::LastSeenDesc)),
            by_category: HashMap::new(),
            by_tag: HashMap::new(),
            generation: 0,
            touched: HashMap::new(),
        }
    }

    /// Build a state from scratch. `recent` supplies each recent player's
    /// original timestamp; anything missing is stamped `now`.
    fn build(
        players: impl IntoIterator<Item = Player>,
        categories: CategoryTable,
        placement: NoCategoryPlacement,
        defaults: DisplayDefaults,
        recent: &HashMap<DbId, Timestamp>,
        now: Timestamp,
    ) -> Self {
        let mut state = Self::empty(categories, placement, defaults);
        for player in players {
            let since = recent.get(&player.id).copied();
            state.insert(player, since, now);
        }
        state
    }

    /// Swap in a rebuilt state, keeping the mutation log.
    fn replace(&mut self, mut next: CacheState) {
        next.generation = self.generation;
        next.touched = std::mem::take(&mut self.touched);
        *self = next;
    }

    fn touch(&mut self, id: DbId) {
        self.generation += 1;
        self.touched.insert(id, self.generation);
    }

    /// Players added, updated or removed after `generation`.
    fn touched_since(&self, generation: u64) -> Vec<DbId> {
        self.touched
            .iter()
            .filter(|(_, touched)| **touched > generation)
            .map(|(id, _)| *id)
            .collect()
    }

    fn by_name(&self) -> PlayerOrdering {
        PlayerOrdering::new(self.placement, SecondarySort::Name)
    }

    /// Derive fields and add `player` to the arena and every view it belongs to.
    ///
    /// A recent player's timestamp is the later of `recent_since` (or `now`
    /// when it is new to the view) and its `last_seen`, so every sighting
    /// restarts the window.
    fn insert(&mut self, mut player: Player, recent_since: Option<Timestamp>, now: Timestamp) {
        derive_fields(&mut player, &self.categories, self.defaults);
        let id = player.id;
        let by_name = self.by_name();

        self.keys.entry(player.key.clone()).or_default().insert(id);
        if player.content_id != 0 {
            self.content_ids.insert(player.content_id, id);
        }
        self.players.insert(id, player);

        let Some(player) = self.players.get(&id) else {
            return;
        };
        self.all.insert(player, &self.players, &self.categories);
        if player.is_current {
            self.current.insert(player, &self.players, &self.categories);
        }
        if player.is_recent {
            self.recent.insert(
                player,
                recent_since.unwrap_or(now).max(player.last_seen),
                &self.players,
                &self.categories,
            );
        }
        for category in &player.assigned_categories {
            self.by_category
                .entry(category.id)
                .or_insert_with(|| PlayerIndex::new(by_name))
                .insert(player, &self.players, &self.categories);
        }
        for tag in &player.assigned_tags {
            self.by_tag
                .entry(tag.id)
                .or_insert_with(|| PlayerIndex::new(by_name))
                .insert(player, &self.players, &self.categories);
        }
    }

    /// Remove a player from the arena and every view. Returns the player and
    /// the time it became recent, if it was.
    fn take(&mut self, id: DbId) -> Option<(Player, Option<Timestamp>)> {
        let player = self.players.remove(&id)?;
        self.all.remove(id);
        self.current.remove(id);
        let since = self.recent.remove(id);
        for index in self.by_category.values_mut() {
            index.remove(id);
        }
        for index in self.by_tag.values_mut() {
            index.remove(id);
        }
        if let Some(ids) = self.keys.get_mut(&player.key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.keys.remove(&player.key);
            }
        }
        if self.content_ids.get(&player.content_id) == Some(&id) {
            self.content_ids.remove(&player.content_id);
        }
        Some((player, since))
    }

    /// Remove-then-reinsert. Returns `true` if the player was already cached.
    fn upsert(&mut self, player: Player, now: Timestamp) -> bool {
        let previous = self.take(player.id);
        let existed = previous.is_some();
        let since = previous.and_then(|(_, since)| since);
        self.insert(player, since, now);
        existed
    }

    /// Rebuild every view with a new category table, keeping presence flags
    /// and recent timestamps.
    fn rebuild_with(&mut self, categories: CategoryTable, now: Timestamp) {
        let recent = self.recent.snapshot();
        let players: Vec<Player> = self
            .players
            .drain()
            .map(|(_, mut player)| {
                for assigned in &mut player.assigned_categories {
                    if let Some(current) = categories.get(assigned.id) {
                        *assigned = current.clone();
                    }
                }
                player
            })
            .collect();
        let next = Self::build(players, categories, self.placement, self.defaults, &recent, now);
        self.replace(next);
    }

    fn set_placement(&mut self, placement: NoCategoryPlacement) {
        self.placement = placement;
        let by_name = self.by_name();
        self.all.set_ordering(by_name);
        self.current.set_ordering(by_name);
        self.recent
            .index_mut()
            .set_ordering(PlayerOrdering::new(placement, SecondarySort::LastSeenDesc));
        for index in self.by_category.values_mut().chain(self.by_tag.values_mut()) {
            index.set_ordering(by_name);
        }
        self.resort_all();
    }

    fn resort(&mut self, filter: ViewFilter) {
        let (arena, table) = (&self.players, &self.categories);
        match filter {
            ViewFilter::All => self.all.resort(arena, table),
            ViewFilter::Current => self.current.resort(arena, table),
            ViewFilter::Recent => self.recent.index_mut().resort(arena, table),
            ViewFilter::Category(id) => {
                if let Some(index) = self.by_category.get_mut(&id) {
                    index.resort(arena, table);
                }
            }
            ViewFilter::Tag(id) => {
                if let Some(index) = self.by_tag.get_mut(&id) {
                    index.resort(arena, table);
                }
            }
        }
    }

    fn resort_all(&mut self) {
        let (arena, table) = (&self.players, &self.categories);
        self.all.resort(arena, table);
        self.current.resort(arena, table);
        self.recent.index_mut().resort(arena, table);
        for index in self.by_category.values_mut().chain(self.by_tag.values_mut()) {
            index.resort(arena, table);
        }
    }

    fn view(&self, filter: ViewFilter) -> Option<&PlayerIndex> {
        match filter {
            ViewFilter::All => Some(&self.all),
            ViewFilter::Current => Some(&self.current),
            ViewFilter::Recent => Some(self.recent.index()),
            ViewFilter::Category(id) => self.by_category.get(&id),
            ViewFilter::Tag(id) => self.by_tag.get(&id),
        }
    }

    fn with_key(&self, name: &str, world_id: WorldId) -> impl Iterator<Item = &Player> {
        self.keys
            .get(&player_key(name, world_id))
            .into_iter()
            .flatten()
            .filter_map(move |id| self.players.get(id))
    }

    fn resolve(&self, ids: &[DbId]) -> Vec<Player> {
        ids.iter()
            .filter_map(|id| self.players.get(id))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PlayerCache
// ---------------------------------------------------------------------------

/// Shared, lock-guarded player cache.
///
/// Created once and shared via `Arc<PlayerCache>`. Writers persist first and
/// then push the result through [`add`](Self::add) / [`update`](Self::update);
/// the cache itself only reads from the store during [`load`](Self::load).
pub struct PlayerCache {
    state: RwLock<CacheState>,
    store: Arc<dyn PlayerStore>,
    events: Arc<EventBus>,
    worlds: WorldRegistry,
    name_mode: NameMatchMode,
}

impl PlayerCache {
    pub fn new(store: Arc<dyn PlayerStore>, events: Arc<EventBus>, settings: CacheSettings) -> Self {
        Self {
            state: RwLock::new(CacheState::empty(
                CategoryTable::default(),
                settings.placement,
                settings.display_defaults,
            )),
            store,
            events,
            worlds: settings.worlds,
            name_mode: settings.name_mode,
        }
    }

    pub fn worlds(&self) -> &WorldRegistry {
        &self.worlds
    }

    // -- Mutations -------------------------------------------------------

    /// Reload every player and category from the store.
    ///
    /// The new state is built off to the side and swapped in only when both
    /// reads succeed; on error the previous state stays authoritative.
    /// Current/recent membership is process-local and carried over from the
    /// state being replaced. Players added, updated or removed while the
    /// store was being read keep their cached version.
    pub async fn load(&self) -> Result<(), StoreError> {
        let started = self.state.read().await.generation;
        let players = match self.store.get_all_players_with_relations().await {
            Ok(players) => players,
            Err(e) => {
                tracing::error!(error = %e, "Player cache reload failed, keeping previous state");
                return Err(e);
            }
        };
        let categories = match self.store.get_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::error!(error = %e, "Category reload failed, keeping previous state");
                return Err(e);
            }
        };

        let count = {
            let mut state = self.state.write().await;
            let mut players: HashMap<DbId, Player> =
                players.into_iter().map(|p| (p.id, p)).collect();
            let raced = state.touched_since(started);
            for id in &raced {
                match state.players.get(id) {
                    Some(cached) => players.insert(*id, cached.clone()),
                    None => players.remove(id),
                };
            }
            if !raced.is_empty() {
                tracing::debug!(raced = raced.len(), "Kept cached players changed during reload");
            }

            let current: HashSet<DbId> = state.current.ids().iter().copied().collect();
            let recent = state.recent.snapshot();
            let players = players.into_values().map(|mut player| {
                player.is_current = current.contains(&player.id);
                player.is_recent = recent.contains_key(&player.id);
                player
            });
            let next = CacheState::build(
                players,
                CategoryTable::new(categories),
                state.placement,
                state.defaults,
                &recent,
                Utc::now(),
            );
            state.replace(next);
            state.players.len()
        };

        tracing::info!(count, "Player cache loaded");
        self.publish_changed("load");
        Ok(())
    }

    /// Insert or replace a persisted player.
    pub async fn add(&self, player: Player) {
        if player.id == 0 {
            tracing::warn!(name = %player.name, "Refusing to cache an unsaved player");
            return;
        }
        let id = player.id;
        let existed = {
            let mut state = self.state.write().await;
            state.touch(id);
            state.upsert(player, Utc::now())
        };
        let event_type = if existed { PLAYER_UPDATED } else { PLAYER_ADDED };
        self.events.publish(TrackerEvent::new(event_type).with_player(id));
        self.publish_changed("add");
    }

    /// Replace a cached player. No-op when the player is not cached.
    pub async fn update(&self, player: Player) {
        let id = player.id;
        let updated = {
            let mut state = self.state.write().await;
            if state.players.contains_key(&id) {
                state.touch(id);
                state.upsert(player, Utc::now());
                true
            } else {
                false
            }
        };
        if !updated {
            tracing::debug!(player_id = id, "Update for uncached player ignored");
            return;
        }
        self.events.publish(TrackerEvent::player_updated(id));
        self.publish_changed("update");
    }

    /// Drop a player from the cache. Returns `false` if it was not cached.
    pub async fn remove(&self, player_id: DbId) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            state.touch(player_id);
            state.take(player_id).is_some()
        };
        if removed {
            self.publish_changed("remove");
        } else {
            tracing::debug!(player_id, "Remove for uncached player ignored");
        }
        removed
    }

    /// Resort only the view selected by `filter`.
    pub async fn resort(&self, filter: ViewFilter) {
        {
            let mut state = self.state.write().await;
            state.resort(filter);
        }
        self.publish_changed("resort");
    }

    /// Strip a deleted category from every player, then resort everything.
    /// Returns the number of players affected.
    pub async fn remove_category(&self, category_id: DbId) -> usize {
        let affected = {
            let mut state = self.state.write().await;
            state.categories.remove(category_id);
            let ids: Vec<DbId> = state
                .by_category
                .remove(&category_id)
                .map(|index| index.ids().to_vec())
                .unwrap_or_default();
            let now = Utc::now();
            for id in &ids {
                if let Some((mut player, since)) = state.take(*id) {
                    player.unassign_category(category_id);
                    state.insert(player, since, now);
                }
            }
            state.resort_all();
            ids.len()
        };
        tracing::info!(category_id, affected, "Category removed from cache");
        self.publish_changed("remove_category");
        affected
    }

    /// Strip a deleted tag from every player. Returns the number affected.
    pub async fn remove_tag(&self, tag_id: DbId) -> usize {
        let affected = {
            let mut state = self.state.write().await;
            let ids: Vec<DbId> = state
                .by_tag
                .remove(&tag_id)
                .map(|index| index.ids().to_vec())
                .unwrap_or_default();
            let now = Utc::now();
            for id in &ids {
                if let Some((mut player, since)) = state.take(*id) {
                    player.unassign_tag(tag_id);
                    state.insert(player, since, now);
                }
            }
            ids.len()
        };
        tracing::info!(tag_id, affected, "Tag removed from cache");
        self.publish_changed("remove_tag");
        affected
    }

    /// Replace the category table (e.g. after a rank change). Re-derives every
    /// player and rebuilds every view.
    pub async fn set_categories(&self, categories: Vec<Category>) {
        {
            let mut state = self.state.write().await;
            state.rebuild_with(CategoryTable::new(categories), Utc::now());
        }
        self.publish_changed("set_categories");
    }

    /// Insert or replace one category, then rebuild as [`set_categories`](Self::set_categories).
    pub async fn upsert_category(&self, category: Category) {
        {
            let mut state = self.state.write().await;
            let mut table = state.categories.clone();
            table.insert(category);
            state.rebuild_with(table, Utc::now());
        }
        self.publish_changed("upsert_category");
    }

    pub async fn set_no_category_placement(&self, placement: NoCategoryPlacement) {
        {
            let mut state = self.state.write().await;
            state.set_placement(placement);
        }
        self.publish_changed("set_placement");
    }

    fn publish_changed(&self, op: &str) {
        self.events
            .publish(TrackerEvent::cache_changed().with_payload(serde_json::json!({ "op": op })));
    }

    // -- Reads -----------------------------------------------------------

    pub async fn get_by_id(&self, id: DbId) -> Option<Player> {
        self.state.read().await.players.get(&id).cloned()
    }

    /// The lowest-id player holding this name/world.
    pub async fn get_by_name_and_world(&self, name: &str, world_id: WorldId) -> Option<Player> {
        let state = self.state.read().await;
        let player = state.with_key(name, world_id).next().cloned();
        player
    }

    /// Every player holding this name/world, lowest id first.
    pub async fn get_all_by_name_and_world(&self, name: &str, world_id: WorldId) -> Vec<Player> {
        let state = self.state.read().await;
        state.with_key(name, world_id).cloned().collect()
    }

    pub async fn get_by_content_id(&self, content_id: u64) -> Option<Player> {
        if content_id == 0 {
            return None;
        }
        let state = self.state.read().await;
        let id = state.content_ids.get(&content_id)?;
        state.players.get(id).cloned()
    }

    /// Every player in the view, in view order.
    pub async fn get_players(&self, filter: ViewFilter) -> Vec<Player> {
        let state = self.state.read().await;
        state
            .view(filter)
            .map(|index| state.resolve(index.ids()))
            .unwrap_or_default()
    }

    pub async fn get_page(&self, filter: ViewFilter, offset: usize, count: usize) -> Vec<Player> {
        let state = self.state.read().await;
        state
            .view(filter)
            .map(|index| state.resolve(index.page(offset, count)))
            .unwrap_or_default()
    }

    /// Page over the players in the view that match `query`.
    pub async fn search(
        &self,
        filter: ViewFilter,
        query: &SearchQuery,
        offset: usize,
        count: usize,
    ) -> Vec<Player> {
        let state = self.state.read().await;
        let Some(index) = state.view(filter) else {
            return Vec::new();
        };
        let ctx = self.search_context();
        let ids = index.filtered_page(offset, count, |id| {
            state
                .players
                .get(&id)
                .is_some_and(|p| query.matches(p, &ctx))
        });
        state.resolve(&ids)
    }

    pub async fn count(&self, filter: ViewFilter) -> usize {
        self.state
            .read()
            .await
            .view(filter)
            .map_or(0, PlayerIndex::len)
    }

    pub async fn count_matching(&self, filter: ViewFilter, query: &SearchQuery) -> usize {
        let state = self.state.read().await;
        let ctx = self.search_context();
        state.view(filter).map_or(0, |index| {
            index.count_matching(|id| {
                state
                    .players
                    .get(&id)
                    .is_some_and(|p| query.matches(p, &ctx))
            })
        })
    }

    pub async fn ids(&self, filter: ViewFilter) -> Vec<DbId> {
        self.state
            .read()
            .await
            .view(filter)
            .map(|index| index.ids().to_vec())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.players.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn categories(&self) -> Vec<Category> {
        let state = self.state.read().await;
        let mut categories: Vec<Category> = state.categories.iter().cloned().collect();
        categories.sort_by_key(|c| (c.rank, c.id));
        categories
    }

    /// When a recent player became recent.
    pub async fn recent_since(&self, player_id: DbId) -> Option<Timestamp> {
        self.state.read().await.recent.since(player_id)
    }

    /// Recent players whose timestamp is older than `now - threshold`.
    pub async fn expired_recent(&self, threshold: Duration, now: Timestamp) -> Vec<DbId> {
        let cutoff = chrono::Duration::from_std(threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .unwrap_or(Timestamp::MIN_UTC);
        self.state.read().await.recent.expired(cutoff)
    }

    fn search_context(&self) -> SearchContext<'_> {
        SearchContext {
            worlds: &self.worlds,
            name_mode: self.name_mode,
        }
    }
}
