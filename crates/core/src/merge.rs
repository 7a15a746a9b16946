//! Duplicate player merge rules.
//!
//! Decides which record survives and how a losing record's data folds into
//! it. The pipeline crate performs the storage side effects.

use std::cmp::Ordering;

use crate::history::{CustomizeHistory, NameWorldHistory};
use crate::lookup::LodestoneStatus;
use crate::player::Player;
use crate::types::Timestamp;

/// Survivor-first order: earliest verification (unverified first), then
/// earliest creation, then lowest id.
pub fn merge_order(a: &Player, b: &Player) -> Ordering {
    a.lodestone_verified_on
        .cmp(&b.lodestone_verified_on)
        .then_with(|| a.created.cmp(&b.created))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort `players` so index 0 is the survivor and the rest are losers in
/// processing order.
pub fn sort_for_merge(players: &mut [Player]) {
    players.sort_by(merge_order);
}

/// History rows produced by folding one loser into the survivor.
#[derive(Debug, Default, PartialEq)]
pub struct MergeHistory {
    pub name_world: Option<NameWorldHistory>,
    pub customize: Option<CustomizeHistory>,
}

/// Fold `loser` into `survivor`.
///
/// Whichever record was seen last keeps its name/world and appearance; the
/// other one is returned as a history row attributed to the survivor.
pub fn absorb(survivor: &mut Player, loser: &Player, now: Timestamp) -> MergeHistory {
    let loser_is_newer = loser.last_seen > survivor.last_seen;
    let mut history = MergeHistory::default();

    if !survivor.matches_identity(&loser.name, loser.world_id) {
        let (old_name, old_world) = if loser_is_newer {
            let old = (survivor.name.clone(), survivor.world_id);
            survivor.rename(loser.name.clone(), loser.world_id);
            old
        } else {
            (loser.name.clone(), loser.world_id)
        };
        history.name_world = Some(NameWorldHistory::new(survivor.id, old_name, old_world, now));
    }

    if let Some(theirs) = &loser.customize {
        match survivor.customize.take() {
            Some(mine) if mine != *theirs => {
                let (kept, old) = if loser_is_newer {
                    (theirs.clone(), mine)
                } else {
                    (mine, theirs.clone())
                };
                survivor.customize = Some(kept);
                history.customize = Some(CustomizeHistory::new(survivor.id, old, now));
            }
            Some(mine) => survivor.customize = Some(mine),
            None => survivor.customize = Some(theirs.clone()),
        }
    }

    if survivor.content_id == 0 {
        survivor.content_id = loser.content_id;
    }
    if loser.is_current && !survivor.is_current {
        survivor.entity_id = loser.entity_id;
    }
    if survivor.free_company.as_deref().map_or(true, str::is_empty) {
        survivor.free_company = loser.free_company.clone();
    }
    if survivor.notes.trim().is_empty() {
        survivor.notes = loser.notes.clone();
    }
    if survivor.lodestone_id == 0 {
        survivor.lodestone_id = loser.lodestone_id;
    }
    if survivor.lodestone_verified_on.is_none() {
        survivor.lodestone_verified_on = loser.lodestone_verified_on;
    }
    if survivor.lodestone_status != LodestoneStatus::Verified
        && loser.lodestone_status == LodestoneStatus::Verified
    {
        survivor.lodestone_status = LodestoneStatus::Verified;
    }

    survivor.seen_count = survivor.seen_count.saturating_add(loser.seen_count);
    survivor.created = survivor.created.min(loser.created);
    survivor.first_seen = survivor.first_seen.min(loser.first_seen);
    survivor.last_seen = survivor.last_seen.max(loser.last_seen);
    survivor.is_current |= loser.is_current;
    survivor.is_recent |= loser.is_recent;

    for category in &loser.assigned_categories {
        survivor.assign_category(category.clone());
    }
    for tag in &loser.assigned_tags {
        survivor.assign_tag(tag.clone());
    }

    survivor.updated = now;
    history
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
