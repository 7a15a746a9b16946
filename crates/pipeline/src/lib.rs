//! Identity reconciliation: lodestone verification and duplicate merging.
//!
//! - [`VerificationPipeline`] drives lookups against an [`IdentityService`]
//!   and applies the outcomes to players.
//! - [`DuplicateMerger`] folds players that share a lodestone id into one.

pub mod error;
pub mod identity;
pub mod merge;
pub mod verification;

pub use error::{PipelineError, PipelineResult};
pub use identity::{IdentityOutcome, IdentityService};
pub use merge::DuplicateMerger;
pub use verification::VerificationPipeline;
