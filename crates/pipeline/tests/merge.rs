mod common;

use chrono::{Duration, Utc};
use common::{Harness, CACTUAR, GILGAMESH};
use playertrack_core::lookup::LodestoneStatus;
use playertrack_core::player::{Category, Tag};
use playertrack_db::PlayerStore;
use playertrack_events::bus::PLAYERS_MERGED;

/// Two records of one character: the first verified long ago on Gilgamesh,
/// the second seen more recently on Cactuar.
async fn duplicates(h: &Harness) -> (i64, i64) {
    let now = Utc::now();
    let old = h
        .player_with("Aria Moon", GILGAMESH, |p| {
            p.lodestone_id = 500;
            p.lodestone_status = LodestoneStatus::Verified;
            p.lodestone_verified_on = Some(now - Duration::days(10));
            p.created = now - Duration::days(20);
            p.last_seen = now - Duration::days(5);
            p.seen_count = 3;
            p.notes = String::new();
        })
        .await;
    let new = h
        .player_with("Aria Moon", CACTUAR, |p| {
            p.lodestone_id = 500;
            p.lodestone_status = LodestoneStatus::Verified;
            p.lodestone_verified_on = Some(now - Duration::days(1));
            p.created = now - Duration::days(2);
            p.last_seen = now - Duration::days(1);
            p.seen_count = 4;
            p.notes = "met in a raid".into();
        })
        .await;
    (old.id, new.id)
}

#[tokio::test]
async fn merge_folds_loser_into_earliest_verified() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    let (old, new) = duplicates(&h).await;

    let tag_id = h.store.create_tag(&Tag::new(0, "vip")).await.unwrap();
    let category_id = h
        .store
        .create_category(&Category::new(0, "Friends", 1))
        .await
        .unwrap();
    h.store.assign_tag(new, tag_id).await.unwrap();
    h.store.assign_category(old, category_id).await.unwrap();
    h.store.create_encounter_player(77, new).await.unwrap();
    h.store.insert_player_config(new).await.unwrap();
    h.cache.load().await.unwrap();

    let survivor = h.pipeline.merger().merge_by_lodestone_id(500).await.unwrap();
    assert_eq!(survivor, Some(old));

    assert!(h.stored(new).await.is_none());
    assert!(!h.store.has_player_config(new).await.unwrap());

    let merged = h.stored(old).await.unwrap();
    assert_eq!(merged.world_id, CACTUAR);
    assert_eq!(merged.seen_count, 7);
    assert_eq!(merged.notes, "met in a raid");
    assert_eq!(merged.assigned_tags.len(), 1);
    assert_eq!(merged.assigned_categories.len(), 1);

    let history = h.store.get_name_world_history(old).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].world_id, GILGAMESH);

    let encounters = h.store.get_encounter_players(old).await.unwrap();
    assert_eq!(encounters.len(), 1);
    assert_eq!(encounters[0].encounter_id, 77);
    assert!(h.store.get_players_with_encounters().await.unwrap().contains(&old));

    assert!(h.cache.get_by_id(new).await.is_none());
    let cached = h
        .cache
        .get_by_name_and_world("Aria Moon", CACTUAR)
        .await
        .unwrap();
    assert_eq!(cached.id, old);
    assert_eq!(cached.primary_category_id, category_id);

    let mut announced = false;
    while let Ok(event) = rx.try_recv() {
        if event.is(PLAYERS_MERGED) {
            announced = true;
            assert_eq!(event.player_id, Some(old));
            assert_eq!(event.payload["merged"][0], new);
        }
    }
    assert!(announced);
}

#[tokio::test]
async fn merge_is_idempotent() {
    let h = Harness::new();
    let (old, _) = duplicates(&h).await;

    assert_eq!(
        h.pipeline.merger().merge_by_lodestone_id(500).await.unwrap(),
        Some(old)
    );
    let after_first = h.stored(old).await.unwrap();

    assert_eq!(h.pipeline.merger().merge_by_lodestone_id(500).await.unwrap(), None);
    assert_eq!(h.pipeline.merger().sweep().await.unwrap(), 0);
    assert_eq!(h.stored(old).await.unwrap(), after_first);
}

#[tokio::test]
async fn merge_ignores_unknown_and_unique_ids() {
    let h = Harness::new();
    h.verified_player("Solo Player", GILGAMESH, 42, 3).await;

    assert_eq!(h.pipeline.merger().merge_by_lodestone_id(0).await.unwrap(), None);
    assert_eq!(h.pipeline.merger().merge_by_lodestone_id(42).await.unwrap(), None);
    assert_eq!(h.pipeline.merger().merge_by_lodestone_id(7).await.unwrap(), None);
    assert_eq!(h.cache.len().await, 1);
}

#[tokio::test]
async fn sweep_merges_every_group() {
    let h = Harness::new();
    duplicates(&h).await;
    h.verified_player("Bram Stone", GILGAMESH, 600, 9).await;
    h.verified_player("Bram Stone", CACTUAR, 600, 3).await;
    h.verified_player("Cleo Moon", GILGAMESH, 700, 3).await;

    assert_eq!(h.pipeline.merger().sweep().await.unwrap(), 2);
    assert_eq!(h.store.get_all_players_with_relations().await.unwrap().len(), 3);
    assert_eq!(h.cache.len().await, 3);
}

#[tokio::test]
async fn opportunistic_merge_matches_sweep() {
    let by_id = Harness::new();
    let (old, _) = duplicates(&by_id).await;
    by_id.pipeline.merger().merge_by_lodestone_id(500).await.unwrap();

    let by_sweep = Harness::new();
    let (sweep_old, _) = duplicates(&by_sweep).await;
    by_sweep.pipeline.merger().sweep().await.unwrap();

    let a = by_id.stored(old).await.unwrap();
    let b = by_sweep.stored(sweep_old).await.unwrap();
    assert_eq!(a.name, b.name);
    assert_eq!(a.world_id, b.world_id);
    assert_eq!(a.seen_count, b.seen_count);
    assert_eq!(a.notes, b.notes);
}
