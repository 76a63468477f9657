//! EVM Client
//!
//! Websocket-backed implementation of the chain port. Pool event
//! subscriptions are raw log subscriptions decoded into typed events and
//! forwarded over a channel; the forwarder ends when the receiver is dropped
//! or the connection closes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::RawLog;
use ethers::contract::{abigen, EthEvent};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Address, Filter, U256};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::chains::{chain_name, ChainSettings};
use crate::ports::chain::{ChainClient, ChainClientFactory, ChainError, PoolEvent, PoolEventKind};

abigen!(
    IUniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        function token0() external view returns (address)
        event Sync(uint112 reserve0, uint112 reserve1)
    ]"#
);

abigen!(
    IUniswapV3Pool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
        event Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick)
    ]"#
);

abigen!(
    Ierc20,
    r#"[
        function decimals() external view returns (uint8)
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);

fn call_err(err: impl std::fmt::Display) -> ChainError {
    ChainError::Call(err.to_string())
}

pub struct EvmClient {
    provider: Arc<Provider<Ws>>,
    chain_id: u64,
}

impl EvmClient {
    pub async fn connect(ws_url: &str, chain_id: u64) -> Result<Self, ChainError> {
        let ws = Ws::connect(ws_url)
            .await
            .map_err(|e| ChainError::Connection(e.to_string()))?;
        info!(chain = %chain_name(chain_id), "chain session established");
        Ok(Self {
            provider: Arc::new(Provider::new(ws)),
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256), ChainError> {
        let contract = IUniswapV2Pair::new(pair, Arc::clone(&self.provider));
        let (reserve0, reserve1, _) = contract.get_reserves().call().await.map_err(call_err)?;
        Ok((U256::from(reserve0), U256::from(reserve1)))
    }

    async fn token0(&self, pair: Address) -> Result<Address, ChainError> {
        let contract = IUniswapV2Pair::new(pair, Arc::clone(&self.provider));
        contract.token_0().call().await.map_err(call_err)
    }

    async fn slot0_sqrt_price(&self, pool: Address) -> Result<U256, ChainError> {
        let contract = IUniswapV3Pool::new(pool, Arc::clone(&self.provider));
        let slot0 = contract.slot_0().call().await.map_err(call_err)?;
        Ok(slot0.0)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        let contract = Ierc20::new(token, Arc::clone(&self.provider));
        contract.decimals().call().await.map_err(call_err)
    }

    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ChainError> {
        let contract = Ierc20::new(token, Arc::clone(&self.provider));
        contract.balance_of(holder).call().await.map_err(call_err)
    }

    async fn subscribe_pool_events(
        &self,
        pool: Address,
        kind: PoolEventKind,
    ) -> Result<mpsc::Receiver<PoolEvent>, ChainError> {
        let topic0 = match kind {
            PoolEventKind::ReserveSync => SyncFilter::signature(),
            PoolEventKind::Swap => SwapFilter::signature(),
        };
        let filter = Filter::new().address(pool).topic0(topic0);
        let provider = Arc::clone(&self.provider);

        let (tx, rx) = mpsc::channel(64);
        // the subscription borrows the provider, so both live in the
        // forwarder task
        tokio::spawn(async move {
            let mut stream = match provider.subscribe_logs(&filter).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(?pool, error = %err, "log subscription failed");
                    return;
                }
            };
            while let Some(log) = stream.next().await {
                let raw = RawLog {
                    topics: log.topics,
                    data: log.data.to_vec(),
                };
                let event = match kind {
                    PoolEventKind::ReserveSync => match SyncFilter::decode_log(&raw) {
                        Ok(sync) => PoolEvent::Sync {
                            reserve0: U256::from(sync.reserve_0),
                            reserve1: U256::from(sync.reserve_1),
                        },
                        Err(err) => {
                            warn!(?pool, error = %err, "undecodable sync log");
                            continue;
                        }
                    },
                    PoolEventKind::Swap => match SwapFilter::decode_log(&raw) {
                        Ok(swap) => PoolEvent::Swap {
                            sqrt_price_x96: swap.sqrt_price_x96,
                        },
                        Err(err) => {
                            warn!(?pool, error = %err, "undecodable swap log");
                            continue;
                        }
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!(?pool, "pool event stream closed");
        });
        Ok(rx)
    }
}

/// Factory over the configured per-chain endpoints. Each `connect` opens a
/// fresh websocket, which is what the rotation timer relies on.
pub struct EvmClientFactory {
    settings: HashMap<u64, ChainSettings>,
}

impl EvmClientFactory {
    pub fn new(settings: HashMap<u64, ChainSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ChainClientFactory for EvmClientFactory {
    async fn connect(&self, chain_id: u64) -> Result<Arc<dyn ChainClient>, ChainError> {
        let settings = self
            .settings
            .get(&chain_id)
            .ok_or(ChainError::UnknownChain(chain_id))?;
        let client = EvmClient::connect(&settings.ws_url, chain_id).await?;
        Ok(Arc::new(client))
    }
}
