use async_trait::async_trait;
use ethers::types::Address;

use crate::domain::verdict::{DeepScanOutcome, HeuristicOutcome};

/// Fast reputation/metadata check. Implementations fold every fault into a
/// `success:false` outcome with a reason; the pipeline never sees an `Err`
/// from a stage.
#[async_trait]
pub trait HeuristicScanner: Send + Sync {
    async fn check(&self, chain_id: u64, token: Address) -> HeuristicOutcome;
}

/// Slow static-analysis scan. Same contract as [`HeuristicScanner`]: faults
/// become structured failures, never panics or errors.
#[async_trait]
pub trait DeepScanner: Send + Sync {
    async fn scan(&self, chain_id: u64, token: Address) -> DeepScanOutcome;
}
