//! Mythril Adapter
//!
//! Deep audit stage: runs the `myth` symbolic-execution analyzer against the
//! deployed bytecode and judges the JSON report. The tool exits non-zero
//! after its internal execution timeout while still printing a valid partial
//! report, so stdout is parsed regardless of the exit code.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::verdict::{DeepScanOutcome, Finding, Severity};
use crate::ports::scanner::DeepScanner;

#[derive(Debug, Error)]
pub enum MythrilError {
    #[error("failed to launch analyzer: {0}")]
    Launch(#[from] std::io::Error),

    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("no usable report on stdout")]
    UnusableReport,

    #[error("no RPC endpoint configured for chain {0}")]
    UnknownChain(u64),
}

/// Base-chain system functions that trip Mythril's external-call detectors
/// on every stock token contract.
fn default_allowlist() -> HashMap<u64, Vec<String>> {
    HashMap::from([(
        8453,
        vec![
            "name()".to_string(),
            "link_classic_internal(uint64,int64) or symbol()".to_string(),
            "symbol() or link_classic_internal(uint64,int64)".to_string(),
        ],
    )])
}

/// Configuration for the Mythril scanner
#[derive(Debug, Clone)]
pub struct MythrilConfig {
    pub binary: String,
    /// Budget handed to the analyzer itself (`--execution-timeout`)
    pub execution_timeout: Duration,
    /// Outer kill switch for the whole subprocess
    pub hard_timeout: Duration,
    /// RPC endpoint per chain id, handed to the analyzer
    pub rpc_urls: HashMap<u64, String>,
    /// High-severity findings tolerated per chain, keyed by the reported
    /// function signature
    pub allowlist: HashMap<u64, Vec<String>>,
}

impl Default for MythrilConfig {
    fn default() -> Self {
        Self {
            binary: "myth".to_string(),
            execution_timeout: Duration::from_secs(30),
            hard_timeout: Duration::from_secs(120),
            rpc_urls: HashMap::new(),
            allowlist: default_allowlist(),
        }
    }
}

/// Top-level shape of a `myth analyze -o json` report
#[derive(Debug, Deserialize)]
struct MythrilReport {
    #[serde(default)]
    issues: Vec<MythrilIssue>,
}

#[derive(Debug, Deserialize)]
struct MythrilIssue {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: String,
    function: Option<String>,
}

impl From<MythrilIssue> for Finding {
    fn from(issue: MythrilIssue) -> Self {
        Finding {
            severity: Severity::parse(&issue.severity),
            title: issue.title,
            description: issue.description,
            function: issue.function,
        }
    }
}

/// Judge a parsed report: any High finding fails the scan unless its
/// function is allow-listed for the chain.
pub fn judge_findings(
    chain_id: u64,
    issues: Vec<Finding>,
    allowlist: &HashMap<u64, Vec<String>>,
) -> DeepScanOutcome {
    let allowed = allowlist.get(&chain_id);
    let blocking = issues.iter().find(|finding| {
        finding.severity == Severity::High
            && !finding
                .function
                .as_ref()
                .zip(allowed)
                .is_some_and(|(function, list)| list.contains(function))
    });
    let reason = blocking.map(|finding| format!("high-severity finding: {}", finding.title));
    DeepScanOutcome {
        success: reason.is_none(),
        issues,
        reason,
    }
}

/// Deep scanner over the `myth` subprocess
pub struct MythrilScanner {
    config: MythrilConfig,
}

impl MythrilScanner {
    pub fn new(config: MythrilConfig) -> Self {
        Self { config }
    }

    async fn analyze(&self, chain_id: u64, token: Address) -> Result<Vec<Finding>, MythrilError> {
        let rpc_url = self
            .config
            .rpc_urls
            .get(&chain_id)
            .ok_or(MythrilError::UnknownChain(chain_id))?;

        let mut command = Command::new(&self.config.binary);
        command
            .arg("analyze")
            .arg("-a")
            .arg(format!("{token:?}"))
            .arg("--rpc")
            .arg(rpc_url)
            .arg("-o")
            .arg("json")
            .arg("--execution-timeout")
            .arg(self.config.execution_timeout.as_secs().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.hard_timeout, command.output())
            .await
            .map_err(|_| MythrilError::Timeout(self.config.hard_timeout))??;

        if !output.status.success() {
            debug!(?token, status = ?output.status.code(),
                "analyzer exited non-zero, parsing stdout anyway");
        }
        let report: MythrilReport =
            serde_json::from_slice(&output.stdout).map_err(|_| MythrilError::UnusableReport)?;
        Ok(report.issues.into_iter().map(Finding::from).collect())
    }
}

#[async_trait]
impl DeepScanner for MythrilScanner {
    async fn scan(&self, chain_id: u64, token: Address) -> DeepScanOutcome {
        match self.analyze(chain_id, token).await {
            Ok(issues) => judge_findings(chain_id, issues, &self.config.allowlist),
            Err(err) => {
                warn!(?token, error = %err, "static analysis did not complete");
                DeepScanOutcome::failed(format!("static analysis failed: {err}"))
            }
        }
    }
}
