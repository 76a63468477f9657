//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml
//! structure. Every section has working defaults; the only thing a config
//! file must provide is at least one chain's endpoints.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::evm::ChainSettings;
use crate::adapters::goplus::GoPlusConfig;
use crate::adapters::mythril::MythrilConfig;
use crate::application::orchestrator::OrchestratorConfig;
use crate::audit::pipeline::PipelineConfig;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub goplus: GoPlusSection,
    #[serde(default)]
    pub mythril: MythrilSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub archive: ArchiveSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Keyed by chain id
    pub chains: HashMap<String, ChainSettings>,
}

/// Audit pipeline section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Heuristic dispatch cadence in milliseconds
    pub heuristic_tick_ms: u64,
    /// Deep-scan dispatch cadence in milliseconds
    pub deep_tick_ms: u64,
    /// External API ceiling: calls per rolling minute
    pub heuristic_calls_per_minute: u32,
    /// Concurrent static-analysis subprocesses
    pub deep_concurrency: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            heuristic_tick_ms: 1_000,
            deep_tick_ms: 1_100,
            heuristic_calls_per_minute: 30,
            deep_concurrency: 4,
        }
    }
}

/// GoPlus API section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoPlusSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Highest acceptable buy/sell tax, as a fraction
    pub max_tax: f64,
}

impl Default for GoPlusSection {
    fn default() -> Self {
        let d = GoPlusConfig::default();
        Self {
            base_url: d.base_url,
            timeout_secs: d.timeout.as_secs(),
            max_retries: d.max_retries,
            retry_delay_ms: d.retry_delay.as_millis() as u64,
            max_tax: d.max_tax,
        }
    }
}

/// Mythril analyzer section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MythrilSection {
    pub binary: String,
    pub execution_timeout_secs: u64,
    pub hard_timeout_secs: u64,
}

impl Default for MythrilSection {
    fn default() -> Self {
        let d = MythrilConfig::default();
        Self {
            binary: d.binary,
            execution_timeout_secs: d.execution_timeout.as_secs(),
            hard_timeout_secs: d.hard_timeout.as_secs(),
        }
    }
}

/// Price monitor section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub target_gain_bps: u32,
    pub rug_floor_thousandths: u32,
    /// Connection rotation cadence
    pub rotation_minutes: u64,
    pub wait_for_liquidity: bool,
    pub liquidity_attempts: u32,
    pub liquidity_interval_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            target_gain_bps: 2_500,
            rug_floor_thousandths: 1,
            rotation_minutes: 15,
            wait_for_liquidity: true,
            liquidity_attempts: 30,
            liquidity_interval_ms: 2_500,
        }
    }
}

/// Audit archive section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    pub dir: String,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            dir: "archive".to_string(),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.heuristic_calls_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "heuristic_calls_per_minute must be > 0".to_string(),
            ));
        }
        if self.audit.deep_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "deep_concurrency must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.goplus.max_tax) {
            return Err(ConfigError::ValidationError(format!(
                "max_tax must be within 0..=1, got {}",
                self.goplus.max_tax
            )));
        }
        if self.monitor.target_gain_bps == 0 {
            return Err(ConfigError::ValidationError(
                "target_gain_bps must be > 0".to_string(),
            ));
        }
        if self.chains.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [chains.<id>] section is required".to_string(),
            ));
        }
        for (key, settings) in &self.chains {
            if key.parse::<u64>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "chain key '{key}' is not a numeric chain id"
                )));
            }
            if settings.ws_url.is_empty() || settings.rpc_url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "chain {key} needs both ws_url and rpc_url"
                )));
            }
        }
        Ok(())
    }

    /// Chain settings keyed by numeric chain id. `validate` has already
    /// checked the keys parse.
    pub fn chain_settings(&self) -> HashMap<u64, ChainSettings> {
        self.chains
            .iter()
            .filter_map(|(key, settings)| Some((key.parse().ok()?, settings.clone())))
            .collect()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            heuristic_tick: Duration::from_millis(self.audit.heuristic_tick_ms),
            deep_tick: Duration::from_millis(self.audit.deep_tick_ms),
            heuristic_calls_per_minute: self.audit.heuristic_calls_per_minute,
            deep_concurrency: self.audit.deep_concurrency,
        }
    }

    pub fn goplus_config(&self) -> GoPlusConfig {
        GoPlusConfig {
            base_url: self.goplus.base_url.clone(),
            timeout: Duration::from_secs(self.goplus.timeout_secs),
            max_retries: self.goplus.max_retries,
            retry_delay: Duration::from_millis(self.goplus.retry_delay_ms),
            max_tax: self.goplus.max_tax,
        }
    }

    pub fn mythril_config(&self) -> MythrilConfig {
        MythrilConfig {
            binary: self.mythril.binary.clone(),
            execution_timeout: Duration::from_secs(self.mythril.execution_timeout_secs),
            hard_timeout: Duration::from_secs(self.mythril.hard_timeout_secs),
            rpc_urls: self
                .chain_settings()
                .into_iter()
                .map(|(id, settings)| (id, settings.rpc_url))
                .collect(),
            ..Default::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            wait_for_liquidity: self.monitor.wait_for_liquidity,
            liquidity_attempts: self.monitor.liquidity_attempts,
            liquidity_interval: Duration::from_millis(self.monitor.liquidity_interval_ms),
            rotation_period: Duration::from_secs(self.monitor.rotation_minutes * 60),
        }
    }
}
