//! Plain data shared across the crate.

pub mod chart;
pub mod engine;
pub mod replay;
pub mod settings;
pub mod stats;
