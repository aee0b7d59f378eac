//! Completion source abstraction for Parley.
//!
//! - `CompletionSource`: object-safe trait for streaming providers
//! - `DeltaStream`: the boxed delta stream every source returns

pub mod source;
