//! Candidate
//!
//! A candidate is one freshly listed token/pool pair moving through the
//! triage lifecycle: discovered, audited, then (on a pass) monitored for a
//! price target or a rug pull.

use std::sync::Arc;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::price_math::{DEFAULT_RUG_FLOOR_THOUSANDTHS, DEFAULT_TARGET_GAIN_BPS};
use crate::domain::verdict::AuditVerdict;

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("invalid price string '{0}'")]
    InvalidPrice(String),
}

/// Which side of the pool holds the base asset. Pinned once at discovery so
/// later reserve reads stay consistent even if an upstream re-sorts tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveSide {
    Token0,
    Token1,
}

impl ReserveSide {
    /// Pick the base-side value out of a (reserve0, reserve1) pair.
    pub fn pick(self, reserve0: U256, reserve1: U256) -> (U256, U256) {
        match self {
            ReserveSide::Token0 => (reserve0, reserve1),
            ReserveSide::Token1 => (reserve1, reserve0),
        }
    }
}

/// Discovery-time description of a candidate. Everything the feed knows
/// before any chain reads happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Assigned by the orchestrator when the feed does not carry one
    pub id: Option<Uuid>,
    pub chain_id: u64,
    pub new_token: Address,
    pub base_token: Address,
    pub pair_address: Address,
    /// Concentrated-liquidity pool rather than constant-product
    #[serde(default)]
    pub v3: bool,
    /// Fee tier for concentrated-liquidity pools, in hundredths of a bip
    #[serde(default)]
    pub fee_tier: Option<u32>,
    #[serde(default = "default_target_gain_bps")]
    pub target_gain_bps: u32,
    #[serde(default = "default_rug_floor_thousandths")]
    pub rug_floor_thousandths: u32,
}

fn default_target_gain_bps() -> u32 {
    DEFAULT_TARGET_GAIN_BPS
}

fn default_rug_floor_thousandths() -> u32 {
    DEFAULT_RUG_FLOOR_THOUSANDTHS
}

/// Mutable market view of a candidate, shared between the engine, its
/// listener task, and the orchestrator behind one `Arc<RwLock<..>>`.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub base_token_decimal: Option<u8>,
    pub new_token_decimal: Option<u8>,
    /// Sticky base-asset side, resolved on the first reserve read
    pub base_asset_reserve: Option<ReserveSide>,
    /// Baseline price at listener arm time; zero until set
    pub initial_price: U256,
    /// Trigger price; zero until set
    pub target_price: U256,
    pub trade_in_progress: bool,
}

pub type SharedMarket = Arc<RwLock<MarketState>>;

/// One tracked token/pool pair with its shared market state and the latest
/// audit verdict, if any.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Uuid,
    pub chain_id: u64,
    pub new_token: Address,
    pub base_token: Address,
    pub pair_address: Address,
    pub v3: bool,
    pub fee_tier: Option<u32>,
    pub target_gain_bps: u32,
    pub rug_floor_thousandths: u32,
    pub market: SharedMarket,
    pub verdict: Option<AuditVerdict>,
}

impl Candidate {
    pub fn from_config(config: CandidateConfig) -> Self {
        Self {
            id: config.id.unwrap_or_else(Uuid::new_v4),
            chain_id: config.chain_id,
            new_token: config.new_token,
            base_token: config.base_token,
            pair_address: config.pair_address,
            v3: config.v3,
            fee_tier: config.fee_tier,
            target_gain_bps: config.target_gain_bps,
            rug_floor_thousandths: config.rug_floor_thousandths,
            market: Arc::new(RwLock::new(MarketState::default())),
            verdict: None,
        }
    }

    /// Snapshot into the external wire format.
    pub async fn to_record(&self) -> CandidateRecord {
        let market = self.market.read().await;
        CandidateRecord {
            id: self.id,
            chain_id: self.chain_id,
            new_token: format!("{:?}", self.new_token),
            base_token: format!("{:?}", self.base_token),
            pair_address: format!("{:?}", self.pair_address),
            v3: self.v3,
            fee_tier: self.fee_tier,
            base_token_decimal: market.base_token_decimal,
            new_token_decimal: market.new_token_decimal,
            base_asset_reserve: market.base_asset_reserve.map(|side| match side {
                ReserveSide::Token0 => 0,
                ReserveSide::Token1 => 1,
            }),
            initial_price: market.initial_price.to_string(),
            target_price: market.target_price.to_string(),
            trade_in_progress: Some(market.trade_in_progress),
            verdict: self.verdict.clone(),
            liquidity_listener: None,
            target_listener: None,
        }
    }

    /// Rebuild a candidate from a previously serialized record.
    pub fn from_record(record: CandidateRecord) -> Result<Self, CandidateError> {
        let parse = |s: &str| {
            s.parse::<Address>()
                .map_err(|_| CandidateError::InvalidAddress(s.to_string()))
        };
        let price = |s: &str| {
            U256::from_dec_str(s).map_err(|_| CandidateError::InvalidPrice(s.to_string()))
        };
        let market = MarketState {
            base_token_decimal: record.base_token_decimal,
            new_token_decimal: record.new_token_decimal,
            base_asset_reserve: match record.base_asset_reserve {
                Some(0) => Some(ReserveSide::Token0),
                Some(1) => Some(ReserveSide::Token1),
                _ => None,
            },
            initial_price: price(&record.initial_price)?,
            target_price: price(&record.target_price)?,
            trade_in_progress: record.trade_in_progress.unwrap_or(false),
        };
        Ok(Self {
            id: record.id,
            chain_id: record.chain_id,
            new_token: parse(&record.new_token)?,
            base_token: parse(&record.base_token)?,
            pair_address: parse(&record.pair_address)?,
            v3: record.v3,
            fee_tier: record.fee_tier,
            target_gain_bps: DEFAULT_TARGET_GAIN_BPS,
            rug_floor_thousandths: DEFAULT_RUG_FLOOR_THOUSANDTHS,
            market: Arc::new(RwLock::new(market)),
            verdict: record.verdict,
        })
    }
}

/// External wire format for a candidate. Field names are fixed by downstream
/// consumers, including the long-standing `intialPrice` spelling. Prices are
/// decimal strings because they outgrow float precision; listener handles are
/// runtime resources and always serialize as null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: Uuid,
    pub chain_id: u64,
    #[serde(rename = "newTokenAddress")]
    pub new_token: String,
    #[serde(rename = "baseTokenAddress")]
    pub base_token: String,
    pub pair_address: String,
    pub v3: bool,
    #[serde(rename = "fee")]
    pub fee_tier: Option<u32>,
    pub base_token_decimal: Option<u8>,
    pub new_token_decimal: Option<u8>,
    /// Side index of the base asset: 0, 1, or null when not yet resolved
    #[serde(default)]
    pub base_asset_reserve: Option<u8>,
    #[serde(rename = "intialPrice")]
    pub initial_price: String,
    pub target_price: String,
    #[serde(default)]
    pub trade_in_progress: Option<bool>,
    #[serde(rename = "auditResults")]
    pub verdict: Option<AuditVerdict>,
    #[serde(default)]
    pub liquidity_listener: Option<serde_json::Value>,
    #[serde(default)]
    pub target_listener: Option<serde_json::Value>,
}
