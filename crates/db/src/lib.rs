//! Persistence port for the player tracker.
//!
//! - [`PlayerStore`]: async repository trait the cache and pipeline depend on.
//! - [`MemoryStore`]: in-process implementation.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{PlayerStore, StoreError, StoreResult};
