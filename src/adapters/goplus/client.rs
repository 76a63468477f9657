//! GoPlus Client
//!
//! Heuristic scanner backed by the GoPlus security API: one
//! address-reputation call and one token-security call per token. Every HTTP
//! request first waits on the shared per-minute limiter, the same one the
//! audit scheduler admits against, so the external ceiling holds even when
//! both race.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
    AddressSecurityResponse, TokenSecurityResponse, TokenSecurityResult, CODE_RATE_LIMITED,
};
use crate::domain::verdict::{HeuristicOutcome, TradingSecurity};
use crate::ports::scanner::HeuristicScanner;

#[derive(Debug, Error)]
pub enum GoPlusError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream rate limited")]
    RateLimited,

    #[error("empty or malformed payload: {0}")]
    EmptyPayload(String),
}

impl GoPlusError {
    /// Only a missing token record is worth another attempt; transport
    /// faults and upstream errors are definitive.
    fn retryable(&self) -> bool {
        matches!(self, GoPlusError::EmptyPayload(_))
    }
}

/// Configuration for the GoPlus client
#[derive(Debug, Clone)]
pub struct GoPlusConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Token-security fetch attempts before giving up (fresh listings often
    /// return an empty record for the first few minutes)
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Highest acceptable buy/sell tax, as a fraction
    pub max_tax: f64,
}

impl Default for GoPlusConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gopluslabs.io/api/v1".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 12,
            retry_delay: Duration::from_millis(1_000),
            max_tax: 0.10,
        }
    }
}

/// Client for the GoPlus security API
pub struct GoPlusClient {
    config: GoPlusConfig,
    http: Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl GoPlusClient {
    pub fn new(
        config: GoPlusConfig,
        limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Result<Self, GoPlusError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            http,
            limiter,
        })
    }

    async fn address_security(
        &self,
        chain_id: u64,
        token: Address,
    ) -> Result<AddressSecurityResponse, GoPlusError> {
        self.limiter.until_ready().await;
        let url = format!(
            "{}/address_security/{:?}?chain_id={}",
            self.config.base_url, token, chain_id
        );
        let response: AddressSecurityResponse = self.http.get(&url).send().await?.json().await?;
        if response.code == CODE_RATE_LIMITED {
            return Err(GoPlusError::RateLimited);
        }
        Ok(response)
    }

    async fn token_security_once(
        &self,
        chain_id: u64,
        token: Address,
    ) -> Result<TokenSecurityResult, GoPlusError> {
        self.limiter.until_ready().await;
        let url = format!(
            "{}/token_security/{}?contract_addresses={:?}",
            self.config.base_url, chain_id, token
        );
        let response: TokenSecurityResponse = self.http.get(&url).send().await?.json().await?;
        if response.code == CODE_RATE_LIMITED {
            return Err(GoPlusError::RateLimited);
        }
        let key = format!("{token:?}").to_lowercase();
        response
            .result
            .and_then(|mut map| map.remove(&key))
            .ok_or_else(|| GoPlusError::EmptyPayload(format!("no record for {key}")))
    }

    /// Token-security fetch with retries. Fresh listings take a while to be
    /// indexed, so an empty record is retried on a fixed delay until the
    /// attempt budget runs out; any other error fails right away.
    async fn token_security(
        &self,
        chain_id: u64,
        token: Address,
    ) -> Result<TokenSecurityResult, GoPlusError> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.token_security_once(chain_id, token).await {
                Ok(result) => return Ok(result),
                Err(err) if err.retryable() && attempt < attempts => {
                    debug!(?token, attempt, error = %err, "token not indexed yet");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Judge the token-security record: open source first, then contract-level
/// risks, then trading restrictions, then taxes. Returns the parsed fields
/// and the first rule violation, if any.
pub fn evaluate_security(
    result: &TokenSecurityResult,
    max_tax: f64,
) -> (TradingSecurity, Option<String>) {
    let security = result.to_security();
    let reason = if !security.open_source {
        Some("token is not open source".to_string())
    } else if let Some(name) = security.contract_risk() {
        Some(format!("contract security risk: {name}"))
    } else if security.trading_restriction().is_some() {
        Some("token cannot be traded freely".to_string())
    } else {
        match (security.buy_tax, security.sell_tax) {
            (Some(buy), Some(sell)) if buy > max_tax || sell > max_tax => {
                Some("tax too high".to_string())
            }
            (Some(_), Some(_)) => None,
            _ => Some("unknown tax".to_string()),
        }
    };
    (security, reason)
}

#[async_trait]
impl HeuristicScanner for GoPlusClient {
    async fn check(&self, chain_id: u64, token: Address) -> HeuristicOutcome {
        let flags = match self.address_security(chain_id, token).await {
            Ok(response) => response
                .result
                .unwrap_or_default()
                .to_flags(),
            Err(err) => {
                warn!(?token, error = %err, "address reputation fetch failed");
                return HeuristicOutcome::failed("could not fetch address reputation");
            }
        };
        if let Some(name) = flags.first_tripped() {
            return HeuristicOutcome {
                success: false,
                reputation: Some(flags),
                security: None,
                reason: Some(format!("malicious-reputation flag set: {name}")),
            };
        }

        let result = match self.token_security(chain_id, token).await {
            Ok(result) => result,
            Err(err) => {
                warn!(?token, error = %err, "token security fetch exhausted");
                return HeuristicOutcome {
                    success: false,
                    reputation: Some(flags),
                    security: None,
                    reason: Some("could not fetch token security data".to_string()),
                };
            }
        };
        let (security, reason) = evaluate_security(&result, self.config.max_tax);
        HeuristicOutcome {
            success: reason.is_none(),
            reputation: Some(flags),
            security: Some(security),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        open_source: &str,
        cannot_buy: &str,
        cannot_sell: &str,
        buy_tax: &str,
        sell_tax: &str,
    ) -> TokenSecurityResult {
        TokenSecurityResult {
            is_open_source: Some(open_source.into()),
            cannot_buy: Some(cannot_buy.into()),
            cannot_sell_all: Some(cannot_sell.into()),
            buy_tax: Some(buy_tax.into()),
            sell_tax: Some(sell_tax.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_token_passes() {
        let (security, reason) = evaluate_security(&record("1", "0", "0", "0.01", "0.02"), 0.10);
        assert!(reason.is_none());
        assert_eq!(security.buy_tax, Some(0.01));
        assert_eq!(security.sell_tax, Some(0.02));
    }

    #[test]
    fn test_closed_source_fails() {
        let (_, reason) = evaluate_security(&record("0", "0", "0", "0.01", "0.01"), 0.10);
        assert_eq!(reason.as_deref(), Some("token is not open source"));
    }

    #[test]
    fn test_blocked_trading_fails() {
        let (_, reason) = evaluate_security(&record("1", "1", "0", "0.01", "0.01"), 0.10);
        assert_eq!(reason.as_deref(), Some("token cannot be traded freely"));

        let (_, reason) = evaluate_security(&record("1", "0", "1", "0.01", "0.01"), 0.10);
        assert_eq!(reason.as_deref(), Some("token cannot be traded freely"));
    }

    #[test]
    fn test_contract_risk_fails_before_trading_checks() {
        let result = TokenSecurityResult {
            is_proxy: Some("1".into()),
            cannot_buy: Some("1".into()),
            ..record("1", "0", "0", "0.01", "0.01")
        };
        let (_, reason) = evaluate_security(&result, 0.10);
        assert_eq!(reason.as_deref(), Some("contract security risk: proxy"));
    }

    #[test]
    fn test_hidden_owner_fails() {
        let result = TokenSecurityResult {
            hidden_owner: Some("1".into()),
            ..record("1", "0", "0", "0.01", "0.01")
        };
        let (_, reason) = evaluate_security(&result, 0.10);
        assert_eq!(
            reason.as_deref(),
            Some("contract security risk: hidden_owner")
        );
    }

    #[test]
    fn test_gas_abuse_field_presence_fails() {
        let result = TokenSecurityResult {
            gas_abuse: Some("0".into()),
            ..record("1", "0", "0", "0.01", "0.01")
        };
        let (security, reason) = evaluate_security(&result, 0.10);
        assert!(security.gas_abuse);
        assert_eq!(reason.as_deref(), Some("contract security risk: gas_abuse"));
    }

    #[test]
    fn test_honeypot_and_blacklist_block_trading() {
        let result = TokenSecurityResult {
            is_honeypot: Some("1".into()),
            ..record("1", "0", "0", "0.01", "0.01")
        };
        let (_, reason) = evaluate_security(&result, 0.10);
        assert_eq!(reason.as_deref(), Some("token cannot be traded freely"));

        let result = TokenSecurityResult {
            is_blacklisted: Some("1".into()),
            ..record("1", "0", "0", "0.01", "0.01")
        };
        let (_, reason) = evaluate_security(&result, 0.10);
        assert_eq!(reason.as_deref(), Some("token cannot be traded freely"));
    }

    #[test]
    fn test_only_missing_records_are_retryable() {
        assert!(GoPlusError::EmptyPayload("no record for 0xabc".into()).retryable());
        assert!(!GoPlusError::RateLimited.retryable());
    }

    #[test]
    fn test_half_sell_tax_is_too_high() {
        let (security, reason) = evaluate_security(&record("1", "0", "0", "0.01", "0.5"), 0.10);
        assert_eq!(reason.as_deref(), Some("tax too high"));
        assert_eq!(security.sell_tax, Some(0.5));
    }

    #[test]
    fn test_tax_at_ceiling_passes() {
        let (_, reason) = evaluate_security(&record("1", "0", "0", "0.1", "0.1"), 0.10);
        assert!(reason.is_none());
    }

    #[test]
    fn test_blank_tax_is_unknown() {
        let (security, reason) = evaluate_security(&record("1", "0", "0", "", "0.01"), 0.10);
        assert_eq!(reason.as_deref(), Some("unknown tax"));
        assert_eq!(security.buy_tax, None);
    }

    #[test]
    fn test_config_defaults() {
        let config = GoPlusConfig::default();
        assert_eq!(config.max_retries, 12);
        assert!((config.max_tax - 0.10).abs() < f64::EPSILON);
    }
}
