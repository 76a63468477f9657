//! Price subsystem: pool price engines, the target/rug listener, the
//! connection-rotation loop and the post-listing liquidity wait.

pub mod v2;
pub mod v3;

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::candidate::Candidate;
use crate::ports::chain::{ChainClient, ChainClientFactory, ChainError};

pub use v2::V2Engine;
pub use v3::V3Engine;

/// Sessions are torn down and rebuilt on this cadence to dodge stale
/// websocket subscriptions.
pub const ROTATION_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Post-listing liquidity poll: every 2.5s, up to 30 attempts.
pub const LIQUIDITY_POLL_INTERVAL: Duration = Duration::from_millis(2_500);
pub const LIQUIDITY_POLL_ATTEMPTS: u32 = 30;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("pool has no new-token reserve")]
    EmptyPool,
}

/// Terminal monitoring outcomes, pushed to the orchestrator.
#[derive(Debug, Clone)]
pub enum PriceAlert {
    RugPull { id: Uuid, base_reserve: U256 },
    TargetReached { id: Uuid, price: U256, target: U256 },
}

/// Slot for the single listener task of an engine. Held across arm so two
/// concurrent starts cannot both spawn.
pub(crate) type ListenerSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Alert sender retained from the last successful arm, for restarts.
pub(crate) type AlertSlot = Arc<RwLock<Option<mpsc::Sender<PriceAlert>>>>;

/// Pool price engine, one per candidate.
pub enum PriceEngine {
    V2(V2Engine),
    V3(V3Engine),
}

impl PriceEngine {
    pub fn new(client: Arc<dyn ChainClient>, candidate: &Candidate) -> Self {
        if candidate.v3 {
            PriceEngine::V3(V3Engine::new(client, candidate))
        } else {
            PriceEngine::V2(V2Engine::new(client, candidate))
        }
    }

    /// Current price in the engine's native units: base-per-new on the
    /// 18-digit basis for constant-product pools, sqrt price (X96) for
    /// concentrated-liquidity pools.
    pub async fn price(&self) -> Result<U256, PriceError> {
        match self {
            PriceEngine::V2(e) => e.price().await,
            PriceEngine::V3(e) => e.price().await,
        }
    }

    pub async fn start_target_listener(
        &self,
        alerts: mpsc::Sender<PriceAlert>,
    ) -> Result<bool, PriceError> {
        match self {
            PriceEngine::V2(e) => e.start_target_listener(alerts).await,
            PriceEngine::V3(e) => e.start_target_listener(alerts).await,
        }
    }

    pub async fn stop_target_listener(&self) -> bool {
        match self {
            PriceEngine::V2(e) => e.stop_target_listener().await,
            PriceEngine::V3(e) => e.stop_target_listener().await,
        }
    }

    pub async fn restart_target_listener(&self) -> Result<bool, PriceError> {
        match self {
            PriceEngine::V2(e) => e.restart_target_listener().await,
            PriceEngine::V3(e) => e.restart_target_listener().await,
        }
    }

    pub async fn active_listener_count(&self) -> usize {
        match self {
            PriceEngine::V2(e) => e.active_listener_count().await,
            PriceEngine::V3(e) => e.active_listener_count().await,
        }
    }
}

/// Poll the pair's base-token balance until liquidity shows up. Returns
/// `false` when the window closes with the pool still empty; read errors
/// count as an attempt and polling continues.
pub async fn await_liquidity(
    client: &dyn ChainClient,
    base_token: Address,
    pair: Address,
    attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=attempts {
        match client.balance_of(base_token, pair).await {
            Ok(balance) if !balance.is_zero() => {
                debug!(?pair, %balance, attempt, "liquidity arrived");
                return true;
            }
            Ok(_) => debug!(?pair, attempt, "pool still empty"),
            Err(err) => warn!(?pair, attempt, error = %err, "liquidity poll failed"),
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    false
}

/// Periodically replace the engine's chain session. The engine is rebuilt
/// over the candidate's shared market state, so the decimals, reserve side
/// and target survive the swap; the listener is re-armed only while a trade
/// is in progress.
pub fn spawn_rotation(
    factory: Arc<dyn ChainClientFactory>,
    candidate: Candidate,
    engine: Arc<RwLock<PriceEngine>>,
    alerts: mpsc::Sender<PriceAlert>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let client = match factory.connect(candidate.chain_id).await {
                Ok(client) => client,
                Err(err) => {
                    warn!(id = %candidate.id, error = %err, "rotation connect failed");
                    continue;
                }
            };
            let mut guard = engine.write().await;
            guard.stop_target_listener().await;
            *guard = PriceEngine::new(client, &candidate);
            if candidate.market.read().await.trade_in_progress {
                if let Err(err) = guard.start_target_listener(alerts.clone()).await {
                    warn!(id = %candidate.id, error = %err, "listener re-arm failed");
                }
            }
            info!(id = %candidate.id, "chain session rotated");
        }
    })
}
