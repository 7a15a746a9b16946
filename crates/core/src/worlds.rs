//! Static world / data-center reference data.
//!
//! The registry is supplied by the embedder (it comes from game data sheets)
//! and is read-only once built.

use std::collections::HashMap;

use crate::types::WorldId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub data_center: String,
    /// Test / sandbox data centers have no public character pages.
    pub is_test: bool,
}

impl World {
    pub fn new(id: WorldId, name: impl Into<String>, data_center: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data_center: data_center.into(),
            is_test: false,
        }
    }

    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorldRegistry {
    worlds: HashMap<WorldId, World>,
}

impl WorldRegistry {
    pub fn new(worlds: impl IntoIterator<Item = World>) -> Self {
        Self {
            worlds: worlds.into_iter().map(|w| (w.id, w)).collect(),
        }
    }

    pub fn get(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id)
    }

    pub fn world_name(&self, id: WorldId) -> Option<&str> {
        self.get(id).map(|w| w.name.as_str())
    }

    pub fn data_center(&self, id: WorldId) -> Option<&str> {
        self.get(id).map(|w| w.data_center.as_str())
    }

    /// Unknown worlds are treated as live.
    pub fn is_test_world(&self, id: WorldId) -> bool {
        self.get(id).is_some_and(|w| w.is_test)
    }
}
