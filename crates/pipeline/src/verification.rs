//! Lodestone verification pipeline.
//!
//! Lookups move through the status machine in
//! [`playertrack_core::lookup`]. A verified identity that would rename a
//! player onto another tracked player's name/world does not rename; instead
//! the other player gets a forced refresh and this lookup is parked as
//! `Blocked` behind it. Resolving a prerequisite releases its dependents
//! through a work queue, so chains of any length settle without recursion.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use playertrack_cache::PlayerCache;
use playertrack_core::history::NameWorldHistory;
use playertrack_core::lookup::{check_refresh, LodestoneLookup, LodestoneStatus, LookupType};
use playertrack_core::player::Player;
use playertrack_core::types::DbId;
use playertrack_db::PlayerStore;
use playertrack_events::bus::{EventBus, TrackerEvent, LOOKUP_RESOLVED};

use crate::error::{PipelineError, PipelineResult};
use crate::identity::{IdentityOutcome, IdentityService};
use crate::merge::DuplicateMerger;

pub struct VerificationPipeline {
    store: Arc<dyn PlayerStore>,
    cache: Arc<PlayerCache>,
    events: Arc<EventBus>,
    identity: Arc<dyn IdentityService>,
    merger: DuplicateMerger,
}

impl VerificationPipeline {
    pub fn new(
        store: Arc<dyn PlayerStore>,
        cache: Arc<PlayerCache>,
        events: Arc<EventBus>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        let merger = DuplicateMerger::new(store.clone(), cache.clone(), events.clone());
        Self {
            store,
            cache,
            events,
            identity,
            merger,
        }
    }

    pub fn merger(&self) -> &DuplicateMerger {
        &self.merger
    }

    // -- Issuing ---------------------------------------------------------

    /// Issue a batch lookup for a newly seen player.
    ///
    /// Skips players without a name/world and players that already have an
    /// open lookup. Players on a test world get a `NotApplicable` lookup
    /// straight away. Returns the new lookup id, if one was created.
    pub async fn request_batch(&self, player_id: DbId) -> PipelineResult<Option<DbId>> {
        let Some(player) = self.player(player_id).await? else {
            tracing::warn!(player_id, "Batch lookup requested for unknown player");
            return Ok(None);
        };
        if !player.has_identity() {
            tracing::debug!(player_id, "Skipping batch lookup, player has no name/world");
            return Ok(None);
        }
        let lookups = self.store.get_lookups_by_player(player_id).await?;
        if lookups.iter().any(LodestoneLookup::is_open) {
            tracing::debug!(player_id, "Skipping batch lookup, one is already open");
            return Ok(None);
        }

        let mut lookup = LodestoneLookup::for_player(&player, LookupType::Batch, Utc::now());
        lookup.id = self.store.create_lookup(&lookup).await?;
        let lookup_id = lookup.id;

        if self.cache.worlds().is_test_world(player.world_id) {
            self.apply_terminal(lookup, LodestoneStatus::NotApplicable)
                .await?;
        } else {
            tracing::debug!(player_id, lookup_id, "Batch lookup issued");
        }
        Ok(Some(lookup_id))
    }

    /// Issue a refresh lookup for an already verified player.
    ///
    /// Refused when the player was never verified, or when its latest lookup
    /// is a refresh issued since the last name/world change.
    pub async fn request_refresh(&self, player_id: DbId) -> PipelineResult<DbId> {
        let player = self
            .player(player_id)
            .await?
            .ok_or(PipelineError::PlayerNotFound(player_id))?;
        self.issue_refresh(&player, false).await
    }

    /// Cancel the player's open lookups and issue a refresh. Dependents of a
    /// cancelled lookup are re-pointed at the new one.
    async fn issue_refresh(&self, player: &Player, force: bool) -> PipelineResult<DbId> {
        let lookups = self.store.get_lookups_by_player(player.id).await?;
        if !force {
            let last_change = self
                .store
                .get_name_world_history(player.id)
                .await?
                .last()
                .map(|row| row.created);
            if let Err(refusal) = check_refresh(player, lookups.last(), last_change) {
                tracing::debug!(player_id = player.id, ?refusal, "Refresh refused");
                return Err(PipelineError::RefreshRefused(refusal));
            }
        }

        let now = Utc::now();
        let mut cancelled = Vec::new();
        for mut open in lookups.into_iter().filter(LodestoneLookup::is_open) {
            open.transition(LodestoneStatus::Cancelled, now)?;
            self.store.update_lookup(&open).await?;
            self.publish_resolved(&open);
            cancelled.push(open.id);
        }

        let mut refresh = LodestoneLookup::for_player(player, LookupType::Refresh, now);
        refresh.id = self.store.create_lookup(&refresh).await?;

        for lookup_id in cancelled {
            for mut dependent in self.store.get_lookups_by_prerequisite(lookup_id).await? {
                if dependent.status != LodestoneStatus::Blocked {
                    continue;
                }
                dependent.prerequisite_lookup_id = Some(refresh.id);
                dependent.updated = now;
                self.store.update_lookup(&dependent).await?;
            }
        }

        tracing::info!(
            player_id = player.id,
            lookup_id = refresh.id,
            forced = force,
            "Refresh lookup issued"
        );
        Ok(refresh.id)
    }

    // -- Processing ------------------------------------------------------

    /// Verify up to `batch_size` open lookups, oldest first.
    ///
    /// A failure on one lookup is logged and does not stop the rest.
    /// Returns the number of lookups resolved.
    pub async fn process_pending(&self, batch_size: usize) -> PipelineResult<usize> {
        if let Err(e) = self.release_stranded().await {
            tracing::error!(error = %e, "Releasing stranded lookups failed");
        }

        let pending = self.store.get_pending_lookups(batch_size).await?;
        let mut resolved = 0;

        for lookup in pending {
            let lookup_id = lookup.id;
            let result = if self.cache.worlds().is_test_world(lookup.world_id) {
                self.resolve_not_applicable(lookup_id).await
            } else {
                let outcome = self
                    .identity
                    .verify(&lookup.player_name, lookup.world_id)
                    .await;
                self.resolve(lookup_id, outcome).await
            };
            match result {
                Ok(status) => {
                    resolved += 1;
                    tracing::debug!(lookup_id, status = status.as_str(), "Lookup processed");
                }
                Err(e) => {
                    tracing::error!(lookup_id, error = %e, "Lookup resolution failed");
                }
            }
        }
        Ok(resolved)
    }

    /// Apply an identity-service outcome to an open lookup.
    ///
    /// A result for a lookup that is no longer `Unverified` (cancelled by a
    /// newer refresh, say) is discarded and the current status returned.
    pub async fn resolve(
        &self,
        lookup_id: DbId,
        outcome: IdentityOutcome,
    ) -> PipelineResult<LodestoneStatus> {
        let Some(mut lookup) = self.unverified(lookup_id).await? else {
            return self.current_status(lookup_id).await;
        };

        let status = match outcome {
            IdentityOutcome::Verified {
                lodestone_id,
                name,
                world_id,
            } => {
                lookup.lodestone_id = lodestone_id;
                lookup.updated_player_name = Some(name);
                lookup.updated_world_id = Some(world_id);
                self.apply_verified(lookup, false).await?
            }
            IdentityOutcome::NotFound => {
                self.apply_terminal(lookup, LodestoneStatus::Failed).await?
            }
            IdentityOutcome::Error(message) => {
                tracing::warn!(lookup_id, error = %message, "Identity service error");
                self.apply_terminal(lookup, LodestoneStatus::Failed).await?
            }
        };

        if status.is_terminal() {
            self.release_dependents(lookup_id, status).await;
        }
        Ok(status)
    }

    async fn resolve_not_applicable(&self, lookup_id: DbId) -> PipelineResult<LodestoneStatus> {
        match self.unverified(lookup_id).await? {
            Some(lookup) => {
                let status = self
                    .apply_terminal(lookup, LodestoneStatus::NotApplicable)
                    .await?;
                self.release_dependents(lookup_id, status).await;
                Ok(status)
            }
            None => self.current_status(lookup_id).await,
        }
    }

    /// Settle a verified lookup against its player.
    ///
    /// `released` marks a lookup freed by its prerequisite. A collision that
    /// persists at that point does not block again: when the occupant holds
    /// the same lodestone id the rename is left to the merge, otherwise the
    /// rename goes ahead.
    async fn apply_verified(
        &self,
        mut lookup: LodestoneLookup,
        released: bool,
    ) -> PipelineResult<LodestoneStatus> {
        let now = Utc::now();
        let Some(mut player) = self.player(lookup.player_id).await? else {
            tracing::warn!(
                lookup_id = lookup.id,
                player_id = lookup.player_id,
                "Lookup player no longer exists"
            );
            lookup.transition(LodestoneStatus::Cancelled, now)?;
            self.store.update_lookup(&lookup).await?;
            return Ok(LodestoneStatus::Cancelled);
        };

        let (name, world_id) = {
            let (name, world_id) = lookup.confirmed_identity();
            (name.to_string(), world_id)
        };

        if !player.matches_identity(&name, world_id) {
            let occupant = self
                .cache
                .get_all_by_name_and_world(&name, world_id)
                .await
                .into_iter()
                .find(|other| other.id != player.id);

            match occupant {
                Some(occupant) if !released => {
                    let prerequisite = self.issue_refresh(&occupant, true).await?;
                    lookup.prerequisite_lookup_id = Some(prerequisite);
                    lookup.transition(LodestoneStatus::Blocked, now)?;
                    self.store.update_lookup(&lookup).await?;

                    player.lodestone_status = LodestoneStatus::Blocked;
                    player.updated = now;
                    self.save_player(player).await?;

                    tracing::info!(
                        lookup_id = lookup.id,
                        occupant_id = occupant.id,
                        prerequisite_lookup_id = prerequisite,
                        "Identity collision, lookup blocked"
                    );
                    self.publish_resolved(&lookup);
                    return Ok(LodestoneStatus::Blocked);
                }
                Some(occupant)
                    if occupant.lodestone_id != 0 && occupant.lodestone_id == lookup.lodestone_id =>
                {
                    tracing::debug!(
                        player_id = player.id,
                        occupant_id = occupant.id,
                        "Collision with the same character, leaving rename to merge"
                    );
                }
                _ => {
                    let row = NameWorldHistory::new(player.id, player.name.clone(), player.world_id, now);
                    self.store.create_name_world_history(&row).await?;
                    tracing::info!(
                        player_id = player.id,
                        from = %player.name,
                        to = %name,
                        world_id,
                        "Player renamed by lookup"
                    );
                    player.rename(name, world_id);
                }
            }
        }

        if player.lodestone_id == 0 {
            player.lodestone_id = lookup.lodestone_id;
        }
        player.lodestone_status = LodestoneStatus::Verified;
        player.lodestone_verified_on = Some(now);
        player.updated = now;

        lookup.transition(LodestoneStatus::Verified, now)?;
        self.store.update_lookup(&lookup).await?;
        self.save_player(player).await?;
        self.publish_resolved(&lookup);

        if let Err(e) = self.merger.merge_by_lodestone_id(lookup.lodestone_id).await {
            tracing::error!(
                lodestone_id = lookup.lodestone_id,
                error = %e,
                "Duplicate merge after verification failed"
            );
        }
        Ok(LodestoneStatus::Verified)
    }

    /// Move a lookup to a terminal non-verified status and mirror it on the
    /// player.
    async fn apply_terminal(
        &self,
        mut lookup: LodestoneLookup,
        status: LodestoneStatus,
    ) -> PipelineResult<LodestoneStatus> {
        let now = Utc::now();
        lookup.transition(status, now)?;
        self.store.update_lookup(&lookup).await?;

        if let Some(mut player) = self.player(lookup.player_id).await? {
            player.lodestone_status = status;
            player.lodestone_verified_on = Some(now);
            player.updated = now;
            self.save_player(player).await?;
        }

        self.publish_resolved(&lookup);
        Ok(status)
    }

    /// Settle blocked lookups whose prerequisite is already settled or no
    /// longer exists.
    ///
    /// A prerequisite disappears with its player, for instance when that
    /// player is merged away. Its dependents are released as if it had been
    /// cancelled. Returns the number of prerequisites handled.
    async fn release_stranded(&self) -> PipelineResult<usize> {
        let mut roots: BTreeMap<DbId, LodestoneStatus> = BTreeMap::new();
        for lookup in self.store.get_blocked_lookups().await? {
            let Some(prerequisite_id) = lookup.prerequisite_lookup_id else {
                tracing::warn!(lookup_id = lookup.id, "Blocked lookup without prerequisite");
                continue;
            };
            if roots.contains_key(&prerequisite_id) {
                continue;
            }
            let status = match self.store.get_lookup(prerequisite_id).await? {
                None => LodestoneStatus::Cancelled,
                Some(prerequisite) if prerequisite.status.is_terminal() => prerequisite.status,
                Some(_) => continue,
            };
            roots.insert(prerequisite_id, status);
        }

        let count = roots.len();
        for (prerequisite_id, status) in roots {
            tracing::info!(
                prerequisite_lookup_id = prerequisite_id,
                status = status.as_str(),
                "Releasing lookups behind a settled prerequisite"
            );
            self.release_dependents(prerequisite_id, status).await;
        }
        Ok(count)
    }

    /// Release lookups waiting on `root`, then on whatever those settle to.
    ///
    /// A failed prerequisite fails its dependents. Any other settled
    /// prerequisite re-resolves them without blocking again. The cache is
    /// reloaded once if anything was re-resolved.
    async fn release_dependents(&self, root: DbId, status: LodestoneStatus) {
        let mut queue = VecDeque::from([(root, status)]);
        let mut released = 0usize;

        while let Some((prerequisite_id, status)) = queue.pop_front() {
            let dependents = match self.store.get_lookups_by_prerequisite(prerequisite_id).await {
                Ok(dependents) => dependents,
                Err(e) => {
                    tracing::error!(
                        lookup_id = prerequisite_id,
                        error = %e,
                        "Failed to load dependent lookups"
                    );
                    continue;
                }
            };

            for mut dependent in dependents
                .into_iter()
                .filter(|l| l.status == LodestoneStatus::Blocked)
            {
                let lookup_id = dependent.id;
                dependent.prerequisite_lookup_id = None;
                let result = match status {
                    LodestoneStatus::Verified
                    | LodestoneStatus::Cancelled
                    | LodestoneStatus::NotApplicable => {
                        released += 1;
                        self.apply_verified(dependent, true).await
                    }
                    LodestoneStatus::Failed => {
                        self.apply_terminal(dependent, LodestoneStatus::Failed).await
                    }
                    LodestoneStatus::Unverified | LodestoneStatus::Blocked => continue,
                };
                match result {
                    Ok(next) => queue.push_back((lookup_id, next)),
                    Err(e) => {
                        tracing::error!(lookup_id, error = %e, "Dependent lookup resolution failed");
                    }
                }
            }
        }

        if released > 0 {
            tracing::info!(released, "Dependent lookups released");
            if let Err(e) = self.cache.load().await {
                tracing::error!(error = %e, "Cache reload after release failed");
            }
        }
    }

    // -- Helpers ---------------------------------------------------------

    /// Live copy from the cache, falling back to the store.
    async fn player(&self, player_id: DbId) -> PipelineResult<Option<Player>> {
        if let Some(player) = self.cache.get_by_id(player_id).await {
            return Ok(Some(player));
        }
        Ok(self.store.get_player(player_id).await?)
    }

    async fn save_player(&self, player: Player) -> PipelineResult<()> {
        self.store.update_player(&player).await?;
        self.cache.update(player).await;
        Ok(())
    }

    /// The lookup if it is still waiting for a result.
    async fn unverified(&self, lookup_id: DbId) -> PipelineResult<Option<LodestoneLookup>> {
        let lookup = self
            .store
            .get_lookup(lookup_id)
            .await?
            .ok_or(PipelineError::LookupNotFound(lookup_id))?;
        if lookup.status == LodestoneStatus::Unverified {
            Ok(Some(lookup))
        } else {
            tracing::debug!(
                lookup_id,
                status = lookup.status.as_str(),
                "Discarding result for settled lookup"
            );
            Ok(None)
        }
    }

    async fn current_status(&self, lookup_id: DbId) -> PipelineResult<LodestoneStatus> {
        self.store
            .get_lookup(lookup_id)
            .await?
            .map(|lookup| lookup.status)
            .ok_or(PipelineError::LookupNotFound(lookup_id))
    }

    fn publish_resolved(&self, lookup: &LodestoneLookup) {
        self.events.publish(
            TrackerEvent::new(LOOKUP_RESOLVED)
                .with_player(lookup.player_id)
                .with_payload(serde_json::json!({
                    "lookup_id": lookup.id,
                    "status": lookup.status.as_str(),
                    "lodestone_id": lookup.lodestone_id,
                })),
        );
    }
}
