//! Category ranking, derived player fields, and the player sort order.
//!
//! Stateless: everything is computed from the [`CategoryTable`] and an
//! [`PlayerOrdering`] policy handed in by the caller.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::CoreError;
use crate::player::{Category, Player};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Where players without a ranked category sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoCategoryPlacement {
    Top,
    #[default]
    Bottom,
    /// Sort as if the player had a category of rank 0.
    RankZero,
}

impl FromStr for NoCategoryPlacement {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "rank_zero" => Ok(Self::RankZero),
            other => Err(CoreError::Validation(format!(
                "Invalid no-category placement '{other}'. Must be one of: top, bottom, rank_zero"
            ))),
        }
    }
}

/// Key used after category rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondarySort {
    /// Case-insensitive name.
    Name,
    /// Most recently seen first.
    LastSeenDesc,
}

// ---------------------------------------------------------------------------
// Category table
// ---------------------------------------------------------------------------

/// Configured categories keyed by id; the source of truth for ranks.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    by_id: HashMap<DbId, Category>,
}

impl CategoryTable {
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            by_id: categories.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: DbId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn rank(&self, id: DbId) -> Option<i32> {
        self.by_id.get(&id).map(|c| c.rank)
    }

    pub fn insert(&mut self, category: Category) {
        self.by_id.insert(category.id, category);
    }

    pub fn remove(&mut self, id: DbId) -> Option<Category> {
        self.by_id.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.by_id.values()
    }
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Display values used when the primary category has no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayDefaults {
    pub color: u32,
    pub icon: u32,
}

/// The assigned category with the lowest configured rank, or 0.
///
/// Categories missing from `table` are ignored. Equal ranks fall back to the
/// lower id so the result never depends on assignment order.
pub fn primary_category_id(player: &Player, table: &CategoryTable) -> DbId {
    player
        .assigned_categories
        .iter()
        .filter_map(|c| table.rank(c.id).map(|rank| (rank, c.id)))
        .min()
        .map(|(_, id)| id)
        .unwrap_or(0)
}

/// Recompute `primary_category_id`, `display_color`, and `display_icon`.
pub fn derive_fields(player: &mut Player, table: &CategoryTable, defaults: DisplayDefaults) {
    player.primary_category_id = primary_category_id(player, table);
    let primary = table.get(player.primary_category_id);
    player.display_color = primary.and_then(|c| c.color).unwrap_or(defaults.color);
    player.display_icon = primary.and_then(|c| c.icon).unwrap_or(defaults.icon);
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Total order over players: category rank, secondary key, then id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOrdering {
    pub placement: NoCategoryPlacement,
    pub secondary: SecondarySort,
}

impl PlayerOrdering {
    pub fn new(placement: NoCategoryPlacement, secondary: SecondarySort) -> Self {
        Self {
            placement,
            secondary,
        }
    }

    /// Compare two players whose derived fields are current.
    pub fn compare(&self, a: &Player, b: &Player, table: &CategoryTable) -> Ordering {
        self.rank_key(a, table)
            .cmp(&self.rank_key(b, table))
            .then_with(|| self.secondary_key(a, b))
            .then_with(|| a.id.cmp(&b.id))
    }

    fn rank_key(&self, player: &Player, table: &CategoryTable) -> i64 {
        match table.rank(player.primary_category_id) {
            Some(rank) => i64::from(rank),
            None => match self.placement {
                NoCategoryPlacement::Top => i64::MIN,
                NoCategoryPlacement::Bottom => i64::MAX,
                NoCategoryPlacement::RankZero => 0,
            },
        }
    }

    fn secondary_key(&self, a: &Player, b: &Player) -> Ordering {
        match self.secondary {
            SecondarySort::Name => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.world_id.cmp(&b.world_id)),
            SecondarySort::LastSeenDesc => b.last_seen.cmp(&a.last_seen),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
