//! Completion source implementations.

pub mod deepseek;
