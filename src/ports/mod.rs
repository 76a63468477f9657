//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Chain reads and pool event subscriptions
//! - The two audit-stage scanners
//!
//! Hand-rolled mocks for all ports live in `mocks`.

pub mod chain;
pub mod mocks;
pub mod scanner;

pub use chain::{ChainClient, ChainClientFactory, ChainError, PoolEvent, PoolEventKind};
pub use scanner::{DeepScanner, HeuristicScanner};
