//! GoPlus security API adapter: the heuristic audit stage.

pub mod client;
pub mod types;

pub use client::{GoPlusClient, GoPlusConfig, GoPlusError};
