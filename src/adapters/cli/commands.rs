//! CLI Command Definitions
//!
//! Argument surface for the pairguard binary. Execution lives in `main.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pairguard - New-Pair Triage Bot for EVM DEXes
#[derive(Parser, Debug)]
#[command(
    name = "pairguard",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "New-pair triage bot for EVM DEXes",
    long_about = "Pairguard audits freshly listed tokens through a two-stage pipeline \
                  (security API heuristics, then symbolic execution) and watches the \
                  pools of survivors for price targets and rug pulls."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the triage loop against a discovery feed on stdin
    Run(RunCmd),

    /// Audit a single token and print the verdict
    Audit(AuditCmd),

    /// Read the current price of a pool
    Price(PriceCmd),
}

/// Run the triage loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/pairguard.toml")]
    pub config: PathBuf,
}

/// One-off two-stage audit of a token
#[derive(Parser, Debug)]
pub struct AuditCmd {
    /// Token contract address
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Chain id the token lives on
    #[arg(long, value_name = "ID", default_value = "8453")]
    pub chain: u64,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/pairguard.toml")]
    pub config: PathBuf,

    /// Skip the deep static scan
    #[arg(long)]
    pub heuristic_only: bool,
}

/// One-off pool price read
#[derive(Parser, Debug)]
pub struct PriceCmd {
    /// Pool (pair) contract address
    #[arg(value_name = "POOL")]
    pub pool: String,

    /// Base (quote) token address
    #[arg(value_name = "BASE")]
    pub base: String,

    /// Newly listed token address
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Treat the pool as concentrated-liquidity (sqrt price)
    #[arg(long)]
    pub v3: bool,

    /// Chain id the pool lives on
    #[arg(long, value_name = "ID", default_value = "8453")]
    pub chain: u64,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/pairguard.toml")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_app_parse_run() {
        let args = vec!["pairguard", "run", "--config", "test.toml"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("test.toml"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let args = vec!["pairguard", "run"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("config/pairguard.toml"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_app_parse_audit() {
        let args = vec![
            "pairguard",
            "audit",
            "0x1111111111111111111111111111111111111111",
            "--chain",
            "1",
            "--heuristic-only",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Audit(cmd) => {
                assert_eq!(cmd.token, "0x1111111111111111111111111111111111111111");
                assert_eq!(cmd.chain, 1);
                assert!(cmd.heuristic_only);
            }
            _ => panic!("Expected Audit command"),
        }
    }

    #[test]
    fn test_audit_defaults_to_base_chain() {
        let args = vec!["pairguard", "audit", "0xdead"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Audit(cmd) => {
                assert_eq!(cmd.chain, 8453);
                assert!(!cmd.heuristic_only);
            }
            _ => panic!("Expected Audit command"),
        }
    }

    #[test]
    fn test_cli_app_parse_price() {
        let args = vec![
            "pairguard",
            "price",
            "0x3333333333333333333333333333333333333333",
            "0x2222222222222222222222222222222222222222",
            "0x1111111111111111111111111111111111111111",
            "--v3",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Price(cmd) => {
                assert_eq!(cmd.pool, "0x3333333333333333333333333333333333333333");
                assert!(cmd.v3);
                assert_eq!(cmd.chain, 8453);
            }
            _ => panic!("Expected Price command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = vec!["pairguard", "-v", "--debug", "run"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        assert!(app.debug);
    }
}
