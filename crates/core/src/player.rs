//! Player, category, and tag models.
//!
//! A [`Player`] is one tracked character. Categories and tags are attached
//! by value so the cache can filter and sort without consulting storage.

use serde::{Deserialize, Serialize};

use crate::lookup::LodestoneStatus;
use crate::types::{DbId, LodestoneId, Timestamp, WorldId};

// ---------------------------------------------------------------------------
// Category / Tag
// ---------------------------------------------------------------------------

/// A ranked grouping label. Lower `rank` means higher precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: DbId,
    pub name: String,
    pub rank: i32,
    /// Per-category display override, applied to players whose primary
    /// category this is.
    pub color: Option<u32>,
    pub icon: Option<u32>,
}

impl Category {
    pub fn new(id: DbId, name: impl Into<String>, rank: i32) -> Self {
        Self {
            id,
            name: name.into(),
            rank,
            color: None,
            icon: None,
        }
    }
}

/// An unordered label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: DbId,
    pub name: String,
    pub color: u32,
}

impl Tag {
    pub fn new(id: DbId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Byte offsets into the customize blob.
const CUSTOMIZE_RACE: usize = 0;
const CUSTOMIZE_GENDER: usize = 1;

/// One tracked character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: DbId,
    /// Derived from `name` + `world_id`; see [`player_key`].
    pub key: String,
    pub content_id: u64,
    /// In-process object handle; only meaningful while `is_current`.
    pub entity_id: u32,

    pub name: String,
    pub world_id: WorldId,
    pub customize: Option<Vec<u8>>,
    pub free_company: Option<String>,
    pub notes: String,
    pub assigned_categories: Vec<Category>,
    pub assigned_tags: Vec<Tag>,

    // Derived on every cache insertion.
    pub primary_category_id: DbId,
    pub display_color: u32,
    pub display_icon: u32,

    pub lodestone_id: LodestoneId,
    pub lodestone_status: LodestoneStatus,
    pub lodestone_verified_on: Option<Timestamp>,

    pub is_current: bool,
    pub is_recent: bool,
    pub seen_count: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Player {
    /// Build an unsaved player (id 0) observed at `now`.
    pub fn new(name: impl Into<String>, world_id: WorldId, now: Timestamp) -> Self {
        let name = name.into();
        Self {
            id: 0,
            key: player_key(&name, world_id),
            content_id: 0,
            entity_id: 0,
            name,
            world_id,
            customize: None,
            free_company: None,
            notes: String::new(),
            assigned_categories: Vec::new(),
            assigned_tags: Vec::new(),
            primary_category_id: 0,
            display_color: 0,
            display_icon: 0,
            lodestone_id: 0,
            lodestone_status: LodestoneStatus::Unverified,
            lodestone_verified_on: None,
            is_current: false,
            is_recent: false,
            seen_count: 0,
            first_seen: now,
            last_seen: now,
            created: now,
            updated: now,
        }
    }

    /// Change name and world, keeping `key` in sync.
    pub fn rename(&mut self, name: impl Into<String>, world_id: WorldId) {
        self.name = name.into();
        self.world_id = world_id;
        self.key = player_key(&self.name, self.world_id);
    }

    pub fn has_identity(&self) -> bool {
        !self.name.trim().is_empty() && self.world_id != 0
    }

    /// Same name/world as far as [`player_key`] can tell.
    pub fn matches_identity(&self, name: &str, world_id: WorldId) -> bool {
        self.world_id == world_id && player_key(&self.name, self.world_id) == player_key(name, world_id)
    }

    pub fn has_category(&self, category_id: DbId) -> bool {
        self.assigned_categories.iter().any(|c| c.id == category_id)
    }

    /// Assign a category. Returns `false` if it was already assigned.
    pub fn assign_category(&mut self, category: Category) -> bool {
        if self.has_category(category.id) {
            return false;
        }
        self.assigned_categories.push(category);
        true
    }

    /// Unassign a category. Returns `true` if it was assigned.
    pub fn unassign_category(&mut self, category_id: DbId) -> bool {
        let before = self.assigned_categories.len();
        self.assigned_categories.retain(|c| c.id != category_id);
        before != self.assigned_categories.len()
    }

    pub fn has_tag(&self, tag_id: DbId) -> bool {
        self.assigned_tags.iter().any(|t| t.id == tag_id)
    }

    /// Assign a tag. Returns `false` if it was already assigned.
    pub fn assign_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag(tag.id) {
            return false;
        }
        self.assigned_tags.push(tag);
        true
    }

    /// Unassign a tag. Returns `true` if it was assigned.
    pub fn unassign_tag(&mut self, tag_id: DbId) -> bool {
        let before = self.assigned_tags.len();
        self.assigned_tags.retain(|t| t.id != tag_id);
        before != self.assigned_tags.len()
    }

    /// Race byte from the customize blob, if present.
    pub fn race(&self) -> Option<u8> {
        self.customize_byte(CUSTOMIZE_RACE)
    }

    /// Gender byte from the customize blob, if present.
    pub fn gender(&self) -> Option<u8> {
        self.customize_byte(CUSTOMIZE_GENDER)
    }

    fn customize_byte(&self, offset: usize) -> Option<u8> {
        self.customize
            .as_deref()
            .and_then(|c| c.get(offset))
            .copied()
    }
}

/// Lookup key for a name/world pair: upper-cased name with spaces replaced
/// by underscores, then `_<world_id>`.
pub fn player_key(name: &str, world_id: WorldId) -> String {
    format!("{}_{}", name.to_uppercase().replace(' ', "_"), world_id)
}

/// Display name of a race byte.
pub fn race_name(race: u8) -> Option<&'static str> {
    match race {
        1 => Some("Hyur"),
        2 => Some("Elezen"),
        3 => Some("Lalafell"),
        4 => Some("Miqo'te"),
        5 => Some("Roegadyn"),
        6 => Some("Au Ra"),
        7 => Some("Hrothgar"),
        8 => Some("Viera"),
        _ => None,
    }
}

/// Display name of a gender byte.
pub fn gender_name(gender: u8) -> Option<&'static str> {
    match gender {
        0 => Some("Male"),
        1 => Some("Female"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    #[test]
    fn key_is_uppercased_with_underscores() {
        assert_eq!(player_key("Foo Bar", 73), "FOO_BAR_73");
    }

    #[test]
    fn rename_updates_key() {
        let mut p = Player::new("Foo Bar", 1, now());
        p.rename("Baz Qux", 2);
        assert_eq!(p.key, "BAZ_QUX_2");
        assert!(p.matches_identity("Baz Qux", 2));
    }

    #[test]
    fn identity_match_ignores_case() {
        let p = Player::new("Foo Bar", 1, now());
        assert!(p.matches_identity("FOO BAR", 1));
        assert!(p.matches_identity("foo bar", 1));
        assert!(!p.matches_identity("Foo Baz", 1));
        assert!(!p.matches_identity("Foo Bar", 2));
    }

    #[test]
    fn category_assignment_is_unique_by_id() {
        let mut p = Player::new("Foo Bar", 1, now());
        assert!(p.assign_category(Category::new(3, "Friends", 1)));
        assert!(!p.assign_category(Category::new(3, "Renamed", 9)));
        assert_eq!(p.assigned_categories.len(), 1);
        assert!(p.unassign_category(3));
        assert!(!p.unassign_category(3));
    }

    #[test]
    fn tag_assignment_is_unique_by_id() {
        let mut p = Player::new("Foo Bar", 1, now());
        assert!(p.assign_tag(Tag::new(1, "vip")));
        assert!(!p.assign_tag(Tag::new(1, "vip")));
        assert!(p.has_tag(1));
    }

    #[test]
    fn identity_requires_name_and_world() {
        assert!(!Player::new("", 1, now()).has_identity());
        assert!(!Player::new("Foo Bar", 0, now()).has_identity());
        assert!(Player::new("Foo Bar", 1, now()).has_identity());
    }

    #[test]
    fn race_and_gender_read_from_customize() {
        let mut p = Player::new("Foo Bar", 1, now());
        assert_eq!(p.race(), None);
        p.customize = Some(vec![4, 1, 0, 0]);
        assert_eq!(p.race().and_then(race_name), Some("Miqo'te"));
        assert_eq!(p.gender().and_then(gender_name), Some("Female"));
    }
}
