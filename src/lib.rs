#![allow(dead_code, unused_imports, unused_variables)]
//! Pairguard - New-Pair Triage Bot for EVM DEXes
//!
//! Audits freshly listed tokens through a two-stage pipeline and watches the
//! pools of survivors for price targets and rug pulls.
//!
//! # Modules
//!
//! - `domain`: Core business logic (Candidate, MarketState, verdicts, price math)
//! - `ports`: Trait abstractions (ChainClient, HeuristicScanner, DeepScanner)
//! - `audit`: Two-stage audit pipeline with rate and concurrency gates
//! - `price`: Pool price engines, target/rug listeners, connection rotation
//! - `adapters`: External implementations (GoPlus, Mythril, EVM, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Orchestrator and audit archive

pub mod adapters;
pub mod application;
pub mod audit;
pub mod config;
pub mod domain;
pub mod ports;
pub mod price;
