//! Streaming relay for one conversation turn.
//!
//! - `engine` drives the turn against a store and a completion source
//! - `turn` holds the per-turn state machine and accumulators
//! - `event` encodes outbound frames
//! - `locks` keeps turns on one conversation from overlapping

pub mod engine;
pub mod event;
pub mod locks;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{RelayEngine, RelaySettings, TurnOptions, TurnStream};
pub use event::RelayEvent;
