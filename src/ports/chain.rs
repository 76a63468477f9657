use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use thiserror::Error;
use tokio::sync::mpsc;

/// Chain access error type
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("contract call error: {0}")]
    Call(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("no settings for chain {0}")]
    UnknownChain(u64),
}

/// Which pool event stream to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEventKind {
    /// Reserve-sync events from constant-product pools
    ReserveSync,
    /// Swap events from concentrated-liquidity pools
    Swap,
}

/// Decoded pool event delivered on a subscription channel.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Sync { reserve0: U256, reserve1: U256 },
    Swap { sqrt_price_x96: U256 },
}

/// Chain read/subscribe port trait
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current reserves of a constant-product pair, in pair order
    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256), ChainError>;

    /// Address of token0 of a pair
    async fn token0(&self, pair: Address) -> Result<Address, ChainError>;

    /// Current sqrt price (X96) of a concentrated-liquidity pool
    async fn slot0_sqrt_price(&self, pool: Address) -> Result<U256, ChainError>;

    /// ERC-20 decimals of a token
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;

    /// ERC-20 balance of `holder` in `token`
    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ChainError>;

    /// Subscribe to decoded events of one pool.
    /// The stream ends when the receiver is dropped or the connection closes.
    async fn subscribe_pool_events(
        &self,
        pool: Address,
        kind: PoolEventKind,
    ) -> Result<mpsc::Receiver<PoolEvent>, ChainError>;
}

/// Builds fresh chain sessions. Connection rotation asks for a new client
/// and rebuilds everything downstream on top of it.
#[async_trait]
pub trait ChainClientFactory: Send + Sync {
    async fn connect(&self, chain_id: u64) -> Result<Arc<dyn ChainClient>, ChainError>;
}
