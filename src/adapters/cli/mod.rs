//! CLI Adapter
//!
//! Command-line surface for the pairguard binary.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{AuditCmd, CliApp, Command, PriceCmd, RunCmd};
