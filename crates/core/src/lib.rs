//! Domain types and pure logic for player tracking.
//!
//! Nothing in this crate performs I/O; storage, notification, and identity
//! verification live in the sibling crates.

pub mod config;
pub mod error;
pub mod history;
pub mod lookup;
pub mod merge;
pub mod player;
pub mod ranking;
pub mod search;
pub mod types;
pub mod worlds;
