//! Player tracker notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TrackerEvent`]: the event envelope delivered to subscribers.

pub mod bus;

pub use bus::{EventBus, TrackerEvent};
