//! Concentrated-liquidity pool engine. Price is the pool's slot0 sqrt price
//! and the target is tracked in the same units. Swap events do not carry
//! reserves, so the rug check re-reads the pool's base-token balance on
//! every event.

use std::sync::Arc;

use ethers::types::{Address, U256};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::candidate::{Candidate, SharedMarket};
use crate::domain::price_math::{increase_by_bps, rug_floor};
use crate::ports::chain::{ChainClient, PoolEvent, PoolEventKind};
use crate::price::{AlertSlot, ListenerSlot, PriceAlert, PriceError};

pub struct V3Engine {
    client: Arc<dyn ChainClient>,
    id: Uuid,
    pool: Address,
    base_token: Address,
    target_gain_bps: u32,
    rug_floor_thousandths: u32,
    market: SharedMarket,
    listener: ListenerSlot,
    alerts: AlertSlot,
}

impl V3Engine {
    pub fn new(client: Arc<dyn ChainClient>, candidate: &Candidate) -> Self {
        Self {
            client,
            id: candidate.id,
            pool: candidate.pair_address,
            base_token: candidate.base_token,
            target_gain_bps: candidate.target_gain_bps,
            rug_floor_thousandths: candidate.rug_floor_thousandths,
            market: Arc::clone(&candidate.market),
            listener: ListenerSlot::default(),
            alerts: AlertSlot::default(),
        }
    }

    async fn base_decimals(&self) -> Result<u8, PriceError> {
        if let Some(d) = self.market.read().await.base_token_decimal {
            return Ok(d);
        }
        let d = self.client.token_decimals(self.base_token).await?;
        self.market.write().await.base_token_decimal = Some(d);
        Ok(d)
    }

    /// Current sqrt price (X96) of the pool.
    pub async fn price(&self) -> Result<U256, PriceError> {
        Ok(self.client.slot0_sqrt_price(self.pool).await?)
    }

    /// Arm the target/rug listener; idempotent like the constant-product
    /// variant. Baseline and target are kept in sqrt-price units.
    pub async fn start_target_listener(
        &self,
        alerts: mpsc::Sender<PriceAlert>,
    ) -> Result<bool, PriceError> {
        let mut slot = self.listener.lock().await;
        if slot.is_some() {
            return Ok(false);
        }
        *self.alerts.write().await = Some(alerts.clone());

        let base_dec = self.base_decimals().await?;
        let sqrt_price = self.client.slot0_sqrt_price(self.pool).await?;
        {
            let mut market = self.market.write().await;
            if market.target_price.is_zero() {
                market.initial_price = sqrt_price;
                market.target_price = increase_by_bps(sqrt_price, self.target_gain_bps);
                info!(id = %self.id, price = %sqrt_price, target = %market.target_price,
                    "baseline sqrt price set");
            }
        }

        let rx = self
            .client
            .subscribe_pool_events(self.pool, PoolEventKind::Swap)
            .await?;
        let task = tokio::spawn(listen(
            rx,
            alerts,
            Arc::clone(&self.client),
            Arc::clone(&self.market),
            Arc::clone(&self.listener),
            self.id,
            self.base_token,
            self.pool,
            rug_floor(base_dec, self.rug_floor_thousandths),
        ));
        *slot = Some(task);
        Ok(true)
    }

    pub async fn stop_target_listener(&self) -> bool {
        match self.listener.lock().await.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub async fn restart_target_listener(&self) -> Result<bool, PriceError> {
        let alerts = self.alerts.read().await.clone();
        let Some(alerts) = alerts else {
            return Ok(false);
        };
        self.stop_target_listener().await;
        self.start_target_listener(alerts).await
    }

    pub async fn active_listener_count(&self) -> usize {
        usize::from(self.listener.lock().await.is_some())
    }

}

#[allow(clippy::too_many_arguments)]
async fn listen(
    mut rx: mpsc::Receiver<PoolEvent>,
    alerts: mpsc::Sender<PriceAlert>,
    client: Arc<dyn ChainClient>,
    market: SharedMarket,
    slot: ListenerSlot,
    id: Uuid,
    base_token: Address,
    pool: Address,
    floor: U256,
) {
    while let Some(event) = rx.recv().await {
        let PoolEvent::Swap { sqrt_price_x96 } = event else {
            continue;
        };

        // rug check strictly before the target check; a transient read
        // failure must not tear the listener down
        match client.balance_of(base_token, pool).await {
            Ok(balance) if balance < floor => {
                deactivate(&market, &slot).await;
                warn!(%id, %balance, "pool base balance drained, rug pull");
                let _ = alerts
                    .send(PriceAlert::RugPull {
                        id,
                        base_reserve: balance,
                    })
                    .await;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%id, error = %err, "balance read failed, keeping listener");
                continue;
            }
        }

        let target = market.read().await.target_price;
        // strictly past the target, not at it
        if !target.is_zero() && sqrt_price_x96 > target {
            deactivate(&market, &slot).await;
            info!(%id, price = %sqrt_price_x96, %target, "target sqrt price reached");
            let _ = alerts
                .send(PriceAlert::TargetReached {
                    id,
                    price: sqrt_price_x96,
                    target,
                })
                .await;
            return;
        }
        debug!(%id, price = %sqrt_price_x96, %target, "swap below target");
    }
}

async fn deactivate(market: &SharedMarket, slot: &ListenerSlot) {
    let _ = slot.lock().await.take();
    market.write().await.trade_in_progress = false;
}
