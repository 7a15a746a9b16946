//! Lodestone identity lookups: record type, status machine, and issuance rules.
//!
//! Pure domain logic. The pipeline crate owns the I/O that drives these
//! transitions.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::player::Player;
use crate::types::{DbId, LodestoneId, Timestamp, WorldId};

// ---------------------------------------------------------------------------
// Status / type
// ---------------------------------------------------------------------------

/// Verification status, shared by lookups and by the player they describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodestoneStatus {
    Unverified,
    Verified,
    Failed,
    Cancelled,
    Blocked,
    NotApplicable,
}

impl LodestoneStatus {
    /// Terminal statuses are retained for history and never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Verified | Self::Failed | Self::Cancelled | Self::NotApplicable
        )
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is an allowed lookup transition.
    pub fn can_transition_to(self, next: LodestoneStatus) -> bool {
        use LodestoneStatus::*;
        matches!(
            (self, next),
            (Unverified, Verified)
                | (Unverified, Failed)
                | (Unverified, Cancelled)
                | (Unverified, Blocked)
                | (Unverified, NotApplicable)
                | (Blocked, Verified)
                | (Blocked, Failed)
                | (Blocked, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
            Self::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupType {
    /// Issued on first sighting.
    Batch,
    /// Re-verification of an already verified player.
    Refresh,
}

// ---------------------------------------------------------------------------
// LodestoneLookup
// ---------------------------------------------------------------------------

/// One outstanding or completed identity-verification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodestoneLookup {
    pub id: DbId,
    pub player_id: DbId,
    pub player_name: String,
    pub world_id: WorldId,
    pub lodestone_id: LodestoneId,
    pub lookup_type: LookupType,
    pub status: LodestoneStatus,
    /// Another player's lookup that must resolve before this one proceeds.
    pub prerequisite_lookup_id: Option<DbId>,
    /// Identity reported by the verification service.
    pub updated_player_name: Option<String>,
    pub updated_world_id: Option<WorldId>,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl LodestoneLookup {
    /// Build an unsaved lookup for `player` with the given type.
    pub fn for_player(player: &Player, lookup_type: LookupType, now: Timestamp) -> Self {
        Self {
            id: 0,
            player_id: player.id,
            player_name: player.name.clone(),
            world_id: player.world_id,
            lodestone_id: match lookup_type {
                LookupType::Batch => 0,
                LookupType::Refresh => player.lodestone_id,
            },
            lookup_type,
            status: LodestoneStatus::Unverified,
            prerequisite_lookup_id: None,
            updated_player_name: None,
            updated_world_id: None,
            created: now,
            updated: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Move to `next`, rejecting transitions the status machine forbids.
    pub fn transition(&mut self, next: LodestoneStatus, now: Timestamp) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Lookup {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated = now;
        Ok(())
    }

    /// Name/world the service confirmed, falling back to the requested identity.
    pub fn confirmed_identity(&self) -> (&str, WorldId) {
        (
            self.updated_player_name
                .as_deref()
                .unwrap_or(&self.player_name),
            self.updated_world_id.unwrap_or(self.world_id),
        )
    }
}

// ---------------------------------------------------------------------------
// Issuance rules
// ---------------------------------------------------------------------------

/// Why a refresh lookup was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRefusal {
    /// The player has never been verified.
    NotVerified,
    /// The latest lookup is already a refresh and nothing changed since.
    AlreadyRefreshed,
}

/// Decide whether a refresh may be issued for `player`.
///
/// `latest` is the player's most recent lookup; `last_identity_change` is when
/// the player's name/world last changed, if ever. A refresh issued at or after
/// that point blocks another one indefinitely.
pub fn check_refresh(
    player: &Player,
    latest: Option<&LodestoneLookup>,
    last_identity_change: Option<Timestamp>,
) -> Result<(), RefreshRefusal> {
    if player.lodestone_id == 0 {
        return Err(RefreshRefusal::NotVerified);
    }
    if let Some(latest) = latest {
        if latest.lookup_type == LookupType::Refresh {
            let refreshed_since_change = match last_identity_change {
                Some(changed) => latest.created >= changed,
                None => true,
            };
            if refreshed_since_change {
                return Err(RefreshRefusal::AlreadyRefreshed);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    fn verified_player() -> Player {
        let mut p = Player::new("Foo Bar", 1, Utc::now());
        p.id = 7;
        p.lodestone_id = 1234;
        p
    }

    // -- Status machine ------------------------------------------------------

    #[test]
    fn terminal_statuses() {
        assert!(LodestoneStatus::Verified.is_terminal());
        assert!(LodestoneStatus::Failed.is_terminal());
        assert!(LodestoneStatus::Cancelled.is_terminal());
        assert!(LodestoneStatus::NotApplicable.is_terminal());
        assert!(LodestoneStatus::Unverified.is_open());
        assert!(LodestoneStatus::Blocked.is_open());
    }

    #[test]
    fn blocked_cannot_go_back_to_unverified() {
        assert!(!LodestoneStatus::Blocked.can_transition_to(LodestoneStatus::Unverified));
        assert!(LodestoneStatus::Blocked.can_transition_to(LodestoneStatus::Verified));
    }

    #[test]
    fn transition_rejects_leaving_terminal_state() {
        let mut lookup = LodestoneLookup::for_player(&verified_player(), LookupType::Batch, Utc::now());
        lookup.transition(LodestoneStatus::Failed, Utc::now()).unwrap();
        assert_matches!(
            lookup.transition(LodestoneStatus::Verified, Utc::now()),
            Err(CoreError::Conflict(_))
        );
    }

    #[test]
    fn refresh_lookup_carries_known_lodestone_id() {
        let p = verified_player();
        let batch = LodestoneLookup::for_player(&p, LookupType::Batch, Utc::now());
        let refresh = LodestoneLookup::for_player(&p, LookupType::Refresh, Utc::now());
        assert_eq!(batch.lodestone_id, 0);
        assert_eq!(refresh.lodestone_id, 1234);
    }

    #[test]
    fn confirmed_identity_falls_back_to_request() {
        let mut lookup = LodestoneLookup::for_player(&verified_player(), LookupType::Batch, Utc::now());
        assert_eq!(lookup.confirmed_identity(), ("Foo Bar", 1));
        lookup.updated_player_name = Some("Bar Baz".into());
        lookup.updated_world_id = Some(2);
        assert_eq!(lookup.confirmed_identity(), ("Bar Baz", 2));
    }

    // -- Refresh rules -------------------------------------------------------

    #[test]
    fn refresh_refused_without_lodestone_id() {
        let mut p = verified_player();
        p.lodestone_id = 0;
        assert_eq!(check_refresh(&p, None, None), Err(RefreshRefusal::NotVerified));
    }

    #[test]
    fn refresh_allowed_after_batch() {
        let p = verified_player();
        let latest = LodestoneLookup::for_player(&p, LookupType::Batch, Utc::now());
        assert_eq!(check_refresh(&p, Some(&latest), None), Ok(()));
    }

    #[test]
    fn refresh_refused_when_nothing_changed_since_last_refresh() {
        let p = verified_player();
        let now = Utc::now();
        let latest = LodestoneLookup::for_player(&p, LookupType::Refresh, now);
        assert_eq!(
            check_refresh(&p, Some(&latest), Some(now - Duration::days(1))),
            Err(RefreshRefusal::AlreadyRefreshed)
        );
        assert_eq!(
            check_refresh(&p, Some(&latest), None),
            Err(RefreshRefusal::AlreadyRefreshed)
        );
    }

    #[test]
    fn refresh_allowed_after_identity_change() {
        let p = verified_player();
        let now = Utc::now();
        let latest = LodestoneLookup::for_player(&p, LookupType::Refresh, now - Duration::days(2));
        assert_eq!(check_refresh(&p, Some(&latest), Some(now)), Ok(()));
    }
}
