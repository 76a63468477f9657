//! EVM chain adapter over ethers websockets.

pub mod chains;
pub mod client;

pub use chains::{chain_name, ChainSettings};
pub use client::{EvmClient, EvmClientFactory};
