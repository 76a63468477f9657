//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - GoPlus: security API client, the heuristic audit stage
//! - Mythril: symbolic-execution subprocess, the deep audit stage
//! - EVM: websocket chain clients and pool event subscriptions
//! - Discovery: NDJSON candidate feed off stdin
//! - CLI: command-line interface handlers

pub mod cli;
pub mod discovery;
pub mod evm;
pub mod goplus;
pub mod mythril;

pub use cli::CliApp;
pub use discovery::spawn_stdin_feed;
pub use evm::{EvmClient, EvmClientFactory};
pub use goplus::GoPlusClient;
pub use mythril::MythrilScanner;
