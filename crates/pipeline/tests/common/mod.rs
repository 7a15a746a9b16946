#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use playertrack_cache::{CacheSettings, PlayerCache};
use playertrack_core::player::{player_key, Player};
use playertrack_core::types::{LodestoneId, WorldId};
use playertrack_core::worlds::{World, WorldRegistry};
use playertrack_db::{MemoryStore, PlayerStore};
use playertrack_events::EventBus;
use playertrack_pipeline::{IdentityOutcome, IdentityService, VerificationPipeline};

pub const GILGAMESH: WorldId = 63;
pub const CACTUAR: WorldId = 79;
pub const TEST_WORLD: WorldId = 3000;

/// Identity service answering from a fixed table. Unknown characters are
/// not found.
#[derive(Default)]
pub struct ScriptedIdentity {
    answers: Mutex<HashMap<String, IdentityOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedIdentity {
    pub fn answer(&self, name: &str, world_id: WorldId, outcome: IdentityOutcome) {
        self.answers
            .lock()
            .unwrap()
            .insert(player_key(name, world_id), outcome);
    }

    pub fn verified(&self, name: &str, world_id: WorldId, lodestone_id: LodestoneId) {
        self.answer(
            name,
            world_id,
            IdentityOutcome::Verified {
                lodestone_id,
                name: name.to_string(),
                world_id,
            },
        );
    }

    pub fn renamed(
        &self,
        name: &str,
        world_id: WorldId,
        lodestone_id: LodestoneId,
        new_name: &str,
        new_world_id: WorldId,
    ) {
        self.answer(
            name,
            world_id,
            IdentityOutcome::Verified {
                lodestone_id,
                name: new_name.to_string(),
                world_id: new_world_id,
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for ScriptedIdentity {
    async fn verify(&self, name: &str, world_id: WorldId) -> IdentityOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .get(&player_key(name, world_id))
            .cloned()
            .unwrap_or(IdentityOutcome::NotFound)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventBus>,
    pub cache: Arc<PlayerCache>,
    pub identity: Arc<ScriptedIdentity>,
    pub pipeline: VerificationPipeline,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::default());
        let settings = CacheSettings {
            worlds: WorldRegistry::new([
                World::new(GILGAMESH, "Gilgamesh", "Aether"),
                World::new(CACTUAR, "Cactuar", "Aether"),
                World::new(TEST_WORLD, "Testbed", "Internal").test(),
            ]),
            ..Default::default()
        };
        let cache = Arc::new(PlayerCache::new(store.clone(), events.clone(), settings));
        let identity = Arc::new(ScriptedIdentity::default());
        let pipeline =
            VerificationPipeline::new(store.clone(), cache.clone(), events.clone(), identity.clone());
        Self {
            store,
            events,
            cache,
            identity,
            pipeline,
        }
    }

    /// Persist a player and push it into the cache.
    pub async fn player(&self, name: &str, world_id: WorldId) -> Player {
        self.player_with(name, world_id, |_| {}).await
    }

    pub async fn player_with(
        &self,
        name: &str,
        world_id: WorldId,
        edit: impl FnOnce(&mut Player),
    ) -> Player {
        let mut player = Player::new(name, world_id, Utc::now());
        edit(&mut player);
        player.id = self.store.create_player(&player).await.unwrap();
        self.cache.add(player.clone()).await;
        player
    }

    /// A player that was verified `days_ago` days ago.
    pub async fn verified_player(
        &self,
        name: &str,
        world_id: WorldId,
        lodestone_id: LodestoneId,
        days_ago: i64,
    ) -> Player {
        self.player_with(name, world_id, |p| {
            p.lodestone_id = lodestone_id;
            p.lodestone_status = playertrack_core::lookup::LodestoneStatus::Verified;
            p.lodestone_verified_on = Some(Utc::now() - Duration::days(days_ago));
            p.created = Utc::now() - Duration::days(days_ago + 1);
        })
        .await
    }

    pub async fn stored(&self, id: i64) -> Option<Player> {
        self.store.get_player(id).await.unwrap()
    }
}
