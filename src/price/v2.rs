//! Constant-product pool engine. Price comes straight from the pair's
//! reserves; the target listener recomputes it on every reserve-sync event.

use std::sync::Arc;

use ethers::types::{Address, U256};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::candidate::{Candidate, ReserveSide, SharedMarket};
use crate::domain::price_math::{increase_by_bps, pair_price, rug_floor};
use crate::ports::chain::{ChainClient, PoolEvent, PoolEventKind};
use crate::price::{AlertSlot, ListenerSlot, PriceAlert, PriceError};

pub struct V2Engine {
    client: Arc<dyn ChainClient>,
    id: Uuid,
    pair: Address,
    base_token: Address,
    new_token: Address,
    target_gain_bps: u32,
    rug_floor_thousandths: u32,
    market: SharedMarket,
    listener: ListenerSlot,
    alerts: AlertSlot,
}

impl V2Engine {
    pub fn new(client: Arc<dyn ChainClient>, candidate: &Candidate) -> Self {
        Self {
            client,
            id: candidate.id,
            pair: candidate.pair_address,
            base_token: candidate.base_token,
            new_token: candidate.new_token,
            target_gain_bps: candidate.target_gain_bps,
            rug_floor_thousandths: candidate.rug_floor_thousandths,
            market: Arc::clone(&candidate.market),
            listener: ListenerSlot::default(),
            alerts: AlertSlot::default(),
        }
    }

    /// Fill the decimals and the sticky base-reserve side on first use;
    /// later calls serve the cached values.
    async fn primed(&self) -> Result<(u8, u8, ReserveSide), PriceError> {
        let (cached_base, cached_new, cached_side) = {
            let market = self.market.read().await;
            (
                market.base_token_decimal,
                market.new_token_decimal,
                market.base_asset_reserve,
            )
        };
        let base_dec = match cached_base {
            Some(d) => d,
            None => self.client.token_decimals(self.base_token).await?,
        };
        let new_dec = match cached_new {
            Some(d) => d,
            None => self.client.token_decimals(self.new_token).await?,
        };
        let side = match cached_side {
            Some(side) => side,
            None => {
                let token0 = self.client.token0(self.pair).await?;
                if token0 == self.base_token {
                    ReserveSide::Token0
                } else {
                    ReserveSide::Token1
                }
            }
        };
        let mut market = self.market.write().await;
        market.base_token_decimal = Some(base_dec);
        market.new_token_decimal = Some(new_dec);
        market.base_asset_reserve = Some(side);
        Ok((base_dec, new_dec, side))
    }

    /// Spot price of the new token in base-token terms, on the 18-digit basis.
    pub async fn price(&self) -> Result<U256, PriceError> {
        let (base_dec, new_dec, side) = self.primed().await?;
        let (reserve0, reserve1) = self.client.get_reserves(self.pair).await?;
        let (base_reserve, new_reserve) = side.pick(reserve0, reserve1);
        pair_price(base_reserve, base_dec, new_reserve, new_dec).ok_or(PriceError::EmptyPool)
    }

    /// Arm the target/rug listener. Returns `false` without side effects if
    /// one is already active. The baseline and target prices are set only
    /// when no target exists yet, so a re-arm after a connection rotation
    /// keeps the original target.
    pub async fn start_target_listener(
        &self,
        alerts: mpsc::Sender<PriceAlert>,
    ) -> Result<bool, PriceError> {
        let mut slot = self.listener.lock().await;
        if slot.is_some() {
            return Ok(false);
        }
        *self.alerts.write().await = Some(alerts.clone());

        let (base_dec, new_dec, side) = self.primed().await?;
        let (reserve0, reserve1) = self.client.get_reserves(self.pair).await?;
        let (base_reserve, new_reserve) = side.pick(reserve0, reserve1);
        let price = pair_price(base_reserve, base_dec, new_reserve, new_dec)
            .ok_or(PriceError::EmptyPool)?;
        {
            let mut market = self.market.write().await;
            if market.target_price.is_zero() {
                market.initial_price = price;
                market.target_price = increase_by_bps(price, self.target_gain_bps);
                info!(id = %self.id, price = %price, target = %market.target_price,
                    "baseline price set");
            }
        }

        let rx = self
            .client
            .subscribe_pool_events(self.pair, PoolEventKind::ReserveSync)
            .await?;
        let task = tokio::spawn(listen(
            rx,
            alerts,
            Arc::clone(&self.market),
            Arc::clone(&self.listener),
            self.id,
            base_dec,
            new_dec,
            side,
            rug_floor(base_dec, self.rug_floor_thousandths),
        ));
        *slot = Some(task);
        Ok(true)
    }

    /// Cancel the active listener, if any.
    pub async fn stop_target_listener(&self) -> bool {
        match self.listener.lock().await.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Stop and re-arm with the sender from the last successful start.
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
    market: SharedMarket,
    slot: ListenerSlot,
    id: Uuid,
    base_dec: u8,
    new_dec: u8,
    side: ReserveSide,
    floor: U256,
) {
    while let Some(event) = rx.recv().await {
        let PoolEvent::Sync { reserve0, reserve1 } = event else {
            continue;
        };
        let (base_reserve, new_reserve) = side.pick(reserve0, reserve1);

        // rug check strictly before the target check
        if base_reserve < floor {
            deactivate(&market, &slot).await;
            warn!(%id, reserve = %base_reserve, "base reserve drained, rug pull");
            let _ = alerts
                .send(PriceAlert::RugPull {
                    id,
                    base_reserve,
                })
                .await;
            return;
        }

        let Some(price) = pair_price(base_reserve, base_dec, new_reserve, new_dec) else {
            continue;
        };
        let target = market.read().await.target_price;
        // strictly past the target, not at it
        if !target.is_zero() && price > target {
            deactivate(&market, &slot).await;
            info!(%id, %price, %target, "target price reached");
            let _ = alerts
                .send(PriceAlert::TargetReached { id, price, target })
                .await;
            return;
        }
        debug!(%id, %price, %target, "price update, target not reached");
    }
}

async fn deactivate(market: &SharedMarket, slot: &ListenerSlot) {
    let _ = slot.lock().await.take();
    market.write().await.trade_in_progress = false;
}
