//! GoPlus API Types
//!
//! Wire shapes of the address-security and token-security endpoints. The API
//! reports booleans as the strings "0"/"1" and taxes as decimal strings,
//! sometimes blank.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::verdict::{ReputationFlags, TradingSecurity};

/// Upstream status code meaning the per-minute call limit was hit
pub const CODE_RATE_LIMITED: i64 = 4029;

fn flag(raw: &Option<String>) -> bool {
    matches!(raw.as_deref(), Some("1"))
}

/// True for any non-zero count string.
fn count_flag(raw: &Option<String>) -> bool {
    matches!(raw.as_deref(), Some(s) if !s.is_empty() && s != "0")
}

/// Parse a tax string; blank or unparsable means unknown.
pub fn parse_tax(raw: &Option<String>) -> Option<f64> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressSecurityResponse {
    pub code: i64,
    pub message: Option<String>,
    pub result: Option<AddressSecurityResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressSecurityResult {
    pub honeypot_related_address: Option<String>,
    pub phishing_activities: Option<String>,
    pub blackmail_activities: Option<String>,
    pub stealing_attack: Option<String>,
    pub fake_kyc: Option<String>,
    pub malicious_mining_activities: Option<String>,
    pub darkweb_transactions: Option<String>,
    pub cybercrime: Option<String>,
    pub money_laundering: Option<String>,
    pub financial_crime: Option<String>,
    pub blacklist_doubt: Option<String>,
    /// Count, not a boolean
    pub number_of_malicious_contracts_created: Option<String>,
    pub reinit: Option<String>,
    pub fake_standard_interface: Option<String>,
    pub sanctioned: Option<String>,
    pub mixer: Option<String>,
    pub fake_token: Option<String>,
}

impl AddressSecurityResult {
    pub fn to_flags(&self) -> ReputationFlags {
        ReputationFlags {
            honeypot_related: flag(&self.honeypot_related_address),
            phishing_activities: flag(&self.phishing_activities),
            blackmail_activities: flag(&self.blackmail_activities),
            stealing_attack: flag(&self.stealing_attack),
            fake_kyc: flag(&self.fake_kyc),
            malicious_mining: flag(&self.malicious_mining_activities),
            darkweb_transactions: flag(&self.darkweb_transactions),
            cybercrime: flag(&self.cybercrime),
            money_laundering: flag(&self.money_laundering),
            financial_crime: flag(&self.financial_crime),
            blacklist_doubt: flag(&self.blacklist_doubt),
            malicious_contracts_created: count_flag(&self.number_of_malicious_contracts_created),
            reinit: flag(&self.reinit),
            fake_standard_interface: flag(&self.fake_standard_interface),
            sanctioned: flag(&self.sanctioned),
            mixer: flag(&self.mixer),
            fake_token: flag(&self.fake_token),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSecurityResponse {
    pub code: i64,
    pub message: Option<String>,
    /// Keyed by lowercased contract address
    pub result: Option<HashMap<String, TokenSecurityResult>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenSecurityResult {
    pub is_open_source: Option<String>,
    pub is_proxy: Option<String>,
    pub is_mintable: Option<String>,
    pub can_take_back_ownership: Option<String>,
    pub owner_change_balance: Option<String>,
    pub hidden_owner: Option<String>,
    pub selfdestruct: Option<String>,
    /// Only present when the contract abuses gas minting; any value is a risk
    pub gas_abuse: Option<String>,
    pub cannot_buy: Option<String>,
    pub cannot_sell_all: Option<String>,
    pub is_honeypot: Option<String>,
    pub transfer_pausable: Option<String>,
    pub is_blacklisted: Option<String>,
    pub is_anti_whale: Option<String>,
    pub anti_whale_modifiable: Option<String>,
    pub trading_cooldown: Option<String>,
    pub personal_slippage_modifiable: Option<String>,
    pub buy_tax: Option<String>,
    pub sell_tax: Option<String>,
}

impl TokenSecurityResult {
    pub fn to_security(&self) -> TradingSecurity {
        TradingSecurity {
            open_source: flag(&self.is_open_source),
            proxy: flag(&self.is_proxy),
            mintable: flag(&self.is_mintable),
            ownership_reclaimable: flag(&self.can_take_back_ownership),
            owner_can_change_balance: flag(&self.owner_change_balance),
            hidden_owner: flag(&self.hidden_owner),
            self_destruct: flag(&self.selfdestruct),
            gas_abuse: self.gas_abuse.is_some(),
            buy_blockable: flag(&self.cannot_buy),
            sell_blockable: flag(&self.cannot_sell_all),
            honeypot: flag(&self.is_honeypot),
            transfer_pausable: flag(&self.transfer_pausable),
            blacklisted: flag(&self.is_blacklisted),
            anti_whale: flag(&self.is_anti_whale),
            anti_whale_modifiable: flag(&self.anti_whale_modifiable),
            trading_cooldown: flag(&self.trading_cooldown),
            slippage_modifiable: flag(&self.personal_slippage_modifiable),
            buy_tax: parse_tax(&self.buy_tax),
            sell_tax: parse_tax(&self.sell_tax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_from_string_booleans() {
        let json = r#"{
            "code": 1,
            "message": "OK",
            "result": {
                "honeypot_related_address": "0",
                "phishing_activities": "0",
                "money_laundering": "1",
                "blacklist_doubt": "0"
            }
        }"#;
        let response: AddressSecurityResponse = serde_json::from_str(json).unwrap();
        let flags = response.result.unwrap().to_flags();
        assert!(flags.money_laundering);
        assert!(!flags.honeypot_related);
        assert_eq!(flags.first_tripped(), Some("money_laundering"));
    }

    #[test]
    fn test_malicious_contract_count_trips() {
        let result = AddressSecurityResult {
            number_of_malicious_contracts_created: Some("3".into()),
            ..Default::default()
        };
        assert_eq!(
            result.to_flags().first_tripped(),
            Some("malicious_contracts_created")
        );

        let clean = AddressSecurityResult {
            number_of_malicious_contracts_created: Some("0".into()),
            sanctioned: Some("0".into()),
            ..Default::default()
        };
        assert!(clean.to_flags().is_clear());
    }

    #[test]
    fn test_sanctioned_address_trips() {
        let result = AddressSecurityResult {
            sanctioned: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(result.to_flags().first_tripped(), Some("sanctioned"));
    }

    #[test]
    fn test_token_security_parse() {
        let json = r#"{
            "code": 1,
            "message": "OK",
            "result": {
                "0xabc": {
                    "is_open_source": "1",
                    "is_proxy": "0",
                    "is_mintable": "0",
                    "hidden_owner": "0",
                    "cannot_buy": "0",
                    "cannot_sell_all": "0",
                    "is_honeypot": "0",
                    "buy_tax": "0.05",
                    "sell_tax": ""
                }
            }
        }"#;
        let response: TokenSecurityResponse = serde_json::from_str(json).unwrap();
        let security = response.result.unwrap()["0xabc"].to_security();
        assert!(security.open_source);
        assert!(!security.buy_blockable);
        assert!(!security.honeypot);
        assert_eq!(security.buy_tax, Some(0.05));
        assert_eq!(security.sell_tax, None);
    }

    #[test]
    fn test_gas_abuse_presence_is_a_risk() {
        let clean = TokenSecurityResult::default();
        assert!(!clean.to_security().gas_abuse);

        // even a "0" here means the field showed up, which is itself a signal
        let abusive = TokenSecurityResult {
            gas_abuse: Some("0".into()),
            ..Default::default()
        };
        assert!(abusive.to_security().gas_abuse);
    }

    #[test]
    fn test_parse_tax_edge_cases() {
        assert_eq!(parse_tax(&Some("0.1".into())), Some(0.1));
        assert_eq!(parse_tax(&Some("".into())), None);
        assert_eq!(parse_tax(&Some("garbage".into())), None);
        assert_eq!(parse_tax(&None), None);
    }
}
