//! Domain Layer - Core triage logic for the pair-guard bot
//!
//! Pure domain types and math with no external I/O. All chain and scanner
//! interactions happen through the ports layer.

pub mod candidate;
pub mod price_math;
pub mod verdict;

pub use candidate::{
    Candidate, CandidateConfig, CandidateError, CandidateRecord, MarketState, ReserveSide,
    SharedMarket,
};
pub use verdict::{
    AuditVerdict, DeepScanOutcome, Finding, HeuristicOutcome, ReputationFlags, Severity,
    TradingSecurity,
};
