//! Audit Verdict
//!
//! Structured results for the two audit stages and their combination.
//! Stage outcomes are always well-formed: scanner faults are folded into
//! `success: false` with a reason at the scanner boundary, never raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Boolean risk flags from the address-reputation check. Every flag must be
/// clear for the check to pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationFlags {
    pub honeypot_related: bool,
    pub phishing_activities: bool,
    pub blackmail_activities: bool,
    pub stealing_attack: bool,
    pub fake_kyc: bool,
    pub malicious_mining: bool,
    pub darkweb_transactions: bool,
    pub cybercrime: bool,
    pub money_laundering: bool,
    pub financial_crime: bool,
    pub blacklist_doubt: bool,
    /// The deployer has created malicious contracts before
    pub malicious_contracts_created: bool,
    pub reinit: bool,
    pub fake_standard_interface: bool,
    pub sanctioned: bool,
    pub mixer: bool,
    pub fake_token: bool,
}

impl ReputationFlags {
    /// Name of the first risk flag that is set, if any.
    pub fn first_tripped(&self) -> Option<&'static str> {
        let checks: [(&'static str, bool); 17] = [
            ("honeypot_related", self.honeypot_related),
            ("phishing_activities", self.phishing_activities),
            ("blackmail_activities", self.blackmail_activities),
            ("stealing_attack", self.stealing_attack),
            ("fake_kyc", self.fake_kyc),
            ("malicious_mining", self.malicious_mining),
            ("darkweb_transactions", self.darkweb_transactions),
            ("cybercrime", self.cybercrime),
            ("money_laundering", self.money_laundering),
            ("financial_crime", self.financial_crime),
            ("blacklist_doubt", self.blacklist_doubt),
            ("malicious_contracts_created", self.malicious_contracts_created),
            ("reinit", self.reinit),
            ("fake_standard_interface", self.fake_standard_interface),
            ("sanctioned", self.sanctioned),
            ("mixer", self.mixer),
            ("fake_token", self.fake_token),
        ];
        checks.into_iter().find(|(_, set)| *set).map(|(name, _)| name)
    }

    /// True when no risk flag is set.
    pub fn is_clear(&self) -> bool {
        self.first_tripped().is_none()
    }
}

/// Token-security fields from the token metadata check: contract-level
/// risks, trading restrictions and taxes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSecurity {
    /// Contract source is verified/open source
    pub open_source: bool,
    pub proxy: bool,
    pub mintable: bool,
    /// Ownership can be taken back after renouncement
    pub ownership_reclaimable: bool,
    pub owner_can_change_balance: bool,
    pub hidden_owner: bool,
    pub self_destruct: bool,
    pub gas_abuse: bool,
    /// Buys can be blocked by the contract
    pub buy_blockable: bool,
    /// Sells can be blocked by the contract
    pub sell_blockable: bool,
    pub honeypot: bool,
    pub transfer_pausable: bool,
    pub blacklisted: bool,
    pub anti_whale: bool,
    pub anti_whale_modifiable: bool,
    pub trading_cooldown: bool,
    pub slippage_modifiable: bool,
    /// Buy tax as a fraction (0.05 = 5%); None when the API reports it blank
    pub buy_tax: Option<f64>,
    /// Sell tax as a fraction; None when unknown
    pub sell_tax: Option<f64>,
}

impl TradingSecurity {
    /// Name of the first contract-level risk that is set, if any.
    pub fn contract_risk(&self) -> Option<&'static str> {
        let checks: [(&'static str, bool); 7] = [
            ("proxy", self.proxy),
            ("mintable", self.mintable),
            ("ownership_reclaimable", self.ownership_reclaimable),
            ("owner_can_change_balance", self.owner_can_change_balance),
            ("hidden_owner", self.hidden_owner),
            ("self_destruct", self.self_destruct),
            ("gas_abuse", self.gas_abuse),
        ];
        checks.into_iter().find(|(_, set)| *set).map(|(name, _)| name)
    }

    /// Name of the first trading restriction that is set, if any.
    pub fn trading_restriction(&self) -> Option<&'static str> {
        let checks: [(&'static str, bool); 9] = [
            ("buy_blockable", self.buy_blockable),
            ("sell_blockable", self.sell_blockable),
            ("honeypot", self.honeypot),
            ("transfer_pausable", self.transfer_pausable),
            ("blacklisted", self.blacklisted),
            ("anti_whale", self.anti_whale),
            ("anti_whale_modifiable", self.anti_whale_modifiable),
            ("trading_cooldown", self.trading_cooldown),
            ("slippage_modifiable", self.slippage_modifiable),
        ];
        checks.into_iter().find(|(_, set)| *set).map(|(name, _)| name)
    }
}

/// Result of the fast heuristic stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicOutcome {
    pub success: bool,
    pub reputation: Option<ReputationFlags>,
    pub security: Option<TradingSecurity>,
    pub reason: Option<String>,
}

impl HeuristicOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reputation: None,
            security: None,
            reason: Some(reason.into()),
        }
    }
}

/// Severity reported by the static-analysis tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "High" => Severity::High,
            "Medium" => Severity::Medium,
            "Low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

/// One categorized finding from the deep static scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Function signature the finding points at, when the tool reports one
    pub function: Option<String>,
}

/// Result of the slow deep-scan stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepScanOutcome {
    pub success: bool,
    pub issues: Vec<Finding>,
    pub reason: Option<String>,
}

impl DeepScanOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            issues: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    pub fn clean() -> Self {
        Self {
            success: true,
            issues: Vec::new(),
            reason: None,
        }
    }
}

/// Combined verdict for one candidate: the AND of both stages, carrying both
/// partial results. `deep` is None when the pipeline short-circuited after a
/// heuristic failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub success: bool,
    pub heuristic: Option<HeuristicOutcome>,
    pub deep: Option<DeepScanOutcome>,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl AuditVerdict {
    /// Terminal verdict after a heuristic failure; the deep scan never ran.
    pub fn short_circuit(heuristic: HeuristicOutcome) -> Self {
        let reason = heuristic.reason.clone();
        Self {
            success: false,
            heuristic: Some(heuristic),
            deep: None,
            timestamp: Utc::now(),
            reason,
        }
    }

    /// Verdict combining both completed stages.
    pub fn combined(heuristic: HeuristicOutcome, deep: DeepScanOutcome) -> Self {
        let success = heuristic.success && deep.success;
        let reason = if success {
            None
        } else {
            deep.reason.clone().or_else(|| heuristic.reason.clone())
        };
        Self {
            success,
            heuristic: Some(heuristic),
            deep: Some(deep),
            timestamp: Utc::now(),
            reason,
        }
    }
}
