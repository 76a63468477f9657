//! Per-chain connection settings.

use serde::{Deserialize, Serialize};

/// Endpoints for one chain. The websocket endpoint carries calls and log
/// subscriptions; the HTTP endpoint is handed to the static analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    pub ws_url: String,
    pub rpc_url: String,
}

/// Human name for log lines; unknown ids print as the number.
pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        1 => "ethereum".to_string(),
        10 => "optimism".to_string(),
        56 => "bnb".to_string(),
        8453 => "base".to_string(),
        42161 => "arbitrum".to_string(),
        other => other.to_string(),
    }
}
