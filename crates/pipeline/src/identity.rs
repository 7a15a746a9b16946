//! Port for the external character-identity service.

use async_trait::async_trait;
use playertrack_core::types::{LodestoneId, WorldId};

/// Result of asking the identity service about one name/world pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// The character exists. `name` and `world_id` are its current identity,
    /// which may differ from what was asked for.
    Verified {
        lodestone_id: LodestoneId,
        name: String,
        world_id: WorldId,
    },
    NotFound,
    /// Transport or service failure. Treated as a failed lookup.
    Error(String),
}

/// Verifies a character identity. Implementations own their transport and
/// any retry policy; the pipeline only consumes the outcome.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn verify(&self, name: &str, world_id: WorldId) -> IdentityOutcome;
}
