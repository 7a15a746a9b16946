//! In-memory player cache.
//!
//! - [`PlayerCache`]: lock-guarded arena with all/current/recent/category/tag views.
//! - [`index`]: sorted id indices the views are built from.

pub mod cache;
pub mod index;

pub use cache::{CacheSettings, PlayerCache, ViewFilter};
