//! Sorted id indices over the player arena.
//!
//! An index never owns players; it stores ids kept in the order given by its
//! [`PlayerOrdering`], resolving them against the arena passed to each call.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use playertrack_core::player::Player;
use playertrack_core::ranking::{CategoryTable, PlayerOrdering};
use playertrack_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// PlayerIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlayerIndex {
    ordering: PlayerOrdering,
    ids: Vec<DbId>,
    members: HashSet<DbId>,
}

impl PlayerIndex {
    pub fn new(ordering: PlayerOrdering) -> Self {
        Self {
            ordering,
            ids: Vec::new(),
            members: HashSet::new(),
        }
    }

    pub fn ordering(&self) -> PlayerOrdering {
        self.ordering
    }

    /// Replace the ordering. Call [`resort`](Self::resort) afterwards.
    pub fn set_ordering(&mut self, ordering: PlayerOrdering) {
        self.ordering = ordering;
    }

    pub fn contains(&self, id: DbId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Insert `player` at its sorted position. Every other member must be
    /// present in `arena`.
    pub fn insert(&mut self, player: &Player, arena: &HashMap<DbId, Player>, table: &CategoryTable) {
        if !self.members.insert(player.id) {
            return;
        }
        let ordering = self.ordering;
        let pos = self.ids.partition_point(|id| match arena.get(id) {
            Some(other) => ordering.compare(other, player, table) == Ordering::Less,
            None => true,
        });
        self.ids.insert(pos, player.id);
    }

    pub fn remove(&mut self, id: DbId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        if let Some(pos) = self.ids.iter().position(|x| *x == id) {
            self.ids.remove(pos);
        }
        true
    }

    pub fn ids(&self) -> &[DbId] {
        &self.ids
    }

    pub fn page(&self, offset: usize, count: usize) -> &[DbId] {
        let start = offset.min(self.ids.len());
        let end = start.saturating_add(count).min(self.ids.len());
        &self.ids[start..end]
    }

    /// Page over the members accepted by `predicate`, in index order.
    pub fn filtered_page(
        &self,
        offset: usize,
        count: usize,
        predicate: impl Fn(DbId) -> bool,
    ) -> Vec<DbId> {
        self.ids
            .iter()
            .copied()
            .filter(|id| predicate(*id))
            .skip(offset)
            .take(count)
            .collect()
    }

    pub fn count_matching(&self, predicate: impl Fn(DbId) -> bool) -> usize {
        self.ids.iter().filter(|id| predicate(**id)).count()
    }

    pub fn resort(&mut self, arena: &HashMap<DbId, Player>, table: &CategoryTable) {
        let ordering = self.ordering;
        self.ids.sort_by(|a, b| match (arena.get(a), arena.get(b)) {
            (Some(pa), Some(pb)) => ordering.compare(pa, pb, table),
            _ => a.cmp(b),
        });
    }
}

// ---------------------------------------------------------------------------
// RecentIndex
// ---------------------------------------------------------------------------

/// Index of recently seen players, each stamped with when it became recent.
#[derive(Debug, Clone)]
pub struct RecentIndex {
    index: PlayerIndex,
    since: HashMap<DbId, Timestamp>,
}

impl RecentIndex {
    pub fn new(ordering: PlayerOrdering) -> Self {
        Self {
            index: PlayerIndex::new(ordering),
            since: HashMap::new(),
        }
    }

    pub fn index(&self) -> &PlayerIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut PlayerIndex {
        &mut self.index
    }

    pub fn insert(
        &mut self,
        player: &Player,
        since: Timestamp,
        arena: &HashMap<DbId, Player>,
        table: &CategoryTable,
    ) {
        self.index.insert(player, arena, table);
        self.since.insert(player.id, since);
    }

    /// Remove a member, returning the timestamp it became recent.
    pub fn remove(&mut self, id: DbId) -> Option<Timestamp> {
        self.index.remove(id);
        self.since.remove(&id)
    }

    pub fn since(&self, id: DbId) -> Option<Timestamp> {
        self.since.get(&id).copied()
    }

    /// Members that became recent strictly before `cutoff`, in index order.
    pub fn expired(&self, cutoff: Timestamp) -> Vec<DbId> {
        self.index
            .ids()
            .iter()
            .copied()
            .filter(|id| self.since.get(id).is_some_and(|since| *since < cutoff))
            .collect()
    }

    pub fn snapshot(&self) -> HashMap<DbId, Timestamp> {
        self.since.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
