//! Name/world and appearance history rows.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp, WorldId};

/// A name/world the player previously went by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameWorldHistory {
    pub id: DbId,
    pub player_id: DbId,
    pub player_name: String,
    pub world_id: WorldId,
    pub created: Timestamp,
}

impl NameWorldHistory {
    pub fn new(player_id: DbId, player_name: impl Into<String>, world_id: WorldId, now: Timestamp) -> Self {
        Self {
            id: 0,
            player_id,
            player_name: player_name.into(),
            world_id,
            created: now,
        }
    }
}

/// An appearance blob the player previously had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizeHistory {
    pub id: DbId,
    pub player_id: DbId,
    pub customize: Vec<u8>,
    pub created: Timestamp,
}

impl CustomizeHistory {
    pub fn new(player_id: DbId, customize: Vec<u8>, now: Timestamp) -> Self {
        Self {
            id: 0,
            player_id,
            customize,
            created: now,
        }
    }
}

/// A player's presence in one recorded encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterPlayer {
    pub id: DbId,
    pub encounter_id: DbId,
    pub player_id: DbId,
    pub created: Timestamp,
}
