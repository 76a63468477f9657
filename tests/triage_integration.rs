//! Triage Pipeline Integration Tests
//!
//! Integration tests that verify the triage components work together:
//! 1. Discovery feed -> audit pipeline -> verdict routing
//! 2. Passed audits arm the price listener on the pool
//! 3. Price alerts (target reached, rug pull) end monitoring
//!
//! All tests are deterministic (no real network calls) and use the
//! hand-rolled port mocks with fast pipeline ticks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

use pairguard::application::{AuditArchive, OrchestratorConfig, Registry, TriageOrchestrator};
use pairguard::audit::pipeline::PipelineConfig;
use pairguard::domain::candidate::CandidateConfig;
use pairguard::domain::verdict::HeuristicOutcome;
use pairguard::ports::chain::PoolEvent;
use pairguard::ports::mocks::{
    MockChainClient, MockChainFactory, MockDeepScanner, MockHeuristicScanner,
};

// ============================================================================
// Test Fixtures
// ============================================================================

const BASE: u8 = 0x22;
const PAIR: u8 = 0x33;

fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

fn units(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

fn candidate_config(token: u8) -> CandidateConfig {
    CandidateConfig {
        id: None,
        chain_id: 8453,
        new_token: addr(token),
        base_token: addr(BASE),
        pair_address: addr(PAIR),
        v3: false,
        fee_tier: None,
        target_gain_bps: 2_500,
        rug_floor_thousandths: 1,
    }
}

/// A funded two-sided pool: 500k base against 1k of the new token, so the
/// initial price is 500e18 and the 25% target is 625e18.
fn pool_client(token: u8) -> Arc<MockChainClient> {
    Arc::new(
        MockChainClient::new()
            .with_decimals(addr(BASE), 18)
            .with_decimals(addr(token), 18)
            .with_token0(addr(PAIR), addr(BASE))
            .with_reserves(addr(PAIR), units(500_000), units(1_000))
            .with_balances(addr(BASE), addr(PAIR), vec![units(500_000)]),
    )
}

struct Harness {
    feed_tx: mpsc::Sender<CandidateConfig>,
    shutdown_tx: watch::Sender<bool>,
    registry: Registry,
    archive_dir: PathBuf,
    run: tokio::task::JoinHandle<()>,
}

/// Spin up an orchestrator over the given mocks with millisecond pipeline
/// ticks, running in a background task the way the binary runs it.
fn start_triage(
    client: Arc<MockChainClient>,
    heuristic: MockHeuristicScanner,
    deep: MockDeepScanner,
) -> Harness {
    let factory = Arc::new(MockChainFactory::new());
    factory.push(client);

    let archive_dir = tempfile::tempdir().unwrap().into_path();
    let archive = AuditArchive::new(&archive_dir).unwrap();

    let orchestrator = TriageOrchestrator::new(
        factory,
        Arc::new(heuristic),
        Arc::new(deep),
        PipelineConfig {
            heuristic_tick: Duration::from_millis(10),
            deep_tick: Duration::from_millis(12),
            ..PipelineConfig::default()
        },
        archive,
        OrchestratorConfig {
            wait_for_liquidity: true,
            liquidity_attempts: 3,
            liquidity_interval: Duration::from_millis(5),
            rotation_period: Duration::from_secs(3600),
        },
    );
    let registry = orchestrator.registry();

    let (feed_tx, feed_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(orchestrator.run(feed_rx, shutdown_rx));

    Harness {
        feed_tx,
        shutdown_tx,
        registry,
        archive_dir,
        run,
    }
}

/// Poll until the condition holds; panics after two seconds.
async fn settle<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(Duration::from_secs(2), async {
        loop {
            if cond().await {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_clean_token_flows_to_armed_listener() {
    let client = pool_client(0x11);
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new(),
        MockDeepScanner::new(),
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let registry = harness.registry.clone();
    settle("audit to pass and the listener to arm", || {
        let registry = registry.clone();
        async move {
            let registry = registry.read().await;
            match registry.values().next() {
                Some(tracked) => tracked.candidate.market.read().await.trade_in_progress,
                None => false,
            }
        }
    })
    .await;

    let registry = harness.registry.read().await;
    let tracked = registry.values().next().unwrap();
    let verdict = tracked.candidate.verdict.as_ref().unwrap();
    assert!(verdict.success);
    assert!(verdict.deep.is_some());

    let market = tracked.candidate.market.read().await;
    assert_eq!(market.initial_price, units(500));
    assert_eq!(market.target_price, units(625));
    drop(market);
    drop(registry);

    let archive = AuditArchive::new(&harness.archive_dir).unwrap();
    assert_eq!(archive.load(true).unwrap().len(), 1);
    assert!(archive.load(false).unwrap().is_empty());

    harness.run.abort();
}

#[tokio::test]
async fn test_flagged_token_is_dropped_without_deep_scan() {
    let client = pool_client(0x11);
    let deep = MockDeepScanner::new();
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new()
            .with_outcome(addr(0x11), HeuristicOutcome::failed("tax too high")),
        deep,
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let dir = harness.archive_dir.clone();
    settle("failed verdict to reach the archive", || {
        let dir = dir.clone();
        async move {
            let archive = AuditArchive::new(&dir).unwrap();
            !archive.load(false).unwrap().is_empty()
        }
    })
    .await;

    assert!(harness.registry.read().await.is_empty());

    let archive = AuditArchive::new(&harness.archive_dir).unwrap();
    let failed = archive.load(false).unwrap();
    assert_eq!(failed.len(), 1);
    let verdict = failed[0].verdict.as_ref().unwrap();
    assert_eq!(verdict.reason.as_deref(), Some("tax too high"));
    // heuristic failure short-circuits: no deep stage in the verdict
    assert!(verdict.deep.is_none());

    harness.run.abort();
}

#[tokio::test]
async fn test_target_reached_ends_monitoring() {
    let client = pool_client(0x11);
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new(),
        MockDeepScanner::new(),
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let registry = harness.registry.clone();
    settle("listener to arm", || {
        let registry = registry.clone();
        async move {
            let registry = registry.read().await;
            match registry.values().next() {
                Some(tracked) => tracked.candidate.market.read().await.trade_in_progress,
                None => false,
            }
        }
    })
    .await;

    // Reserves move past the 625e18 target
    client
        .emit(PoolEvent::Sync {
            reserve0: units(700_000),
            reserve1: units(1_000),
        })
        .await;

    let registry = harness.registry.clone();
    settle("target alert to clear the registry", || {
        let registry = registry.clone();
        async move { registry.read().await.is_empty() }
    })
    .await;

    harness.run.abort();
}

#[tokio::test]
async fn test_rug_pull_ends_monitoring() {
    let client = pool_client(0x11);
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new(),
        MockDeepScanner::new(),
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let registry = harness.registry.clone();
    settle("listener to arm", || {
        let registry = registry.clone();
        async move {
            let registry = registry.read().await;
            match registry.values().next() {
                Some(tracked) => tracked.candidate.market.read().await.trade_in_progress,
                None => false,
            }
        }
    })
    .await;

    // Base side drained below the rug floor (0.001 base tokens)
    client
        .emit(PoolEvent::Sync {
            reserve0: U256::from(100_000_000_000_000u64),
            reserve1: units(1),
        })
        .await;

    let registry = harness.registry.clone();
    settle("rug alert to clear the registry", || {
        let registry = registry.clone();
        async move { registry.read().await.is_empty() }
    })
    .await;

    harness.run.abort();
}

#[tokio::test]
async fn test_duplicate_discoveries_audit_once() {
    let client = pool_client(0x11);
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new(),
        MockDeepScanner::new(),
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();
    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();
    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let registry = harness.registry.clone();
    settle("the single survivor to arm", || {
        let registry = registry.clone();
        async move {
            let registry = registry.read().await;
            match registry.values().next() {
                Some(tracked) => tracked.candidate.market.read().await.trade_in_progress,
                None => false,
            }
        }
    })
    .await;

    assert_eq!(harness.registry.read().await.len(), 1);

    let archive = AuditArchive::new(&harness.archive_dir).unwrap();
    assert_eq!(archive.load(true).unwrap().len(), 1);

    harness.run.abort();
}

#[tokio::test]
async fn test_shutdown_stops_the_loop_and_listeners() {
    let client = pool_client(0x11);
    let harness = start_triage(
        Arc::clone(&client),
        MockHeuristicScanner::new(),
        MockDeepScanner::new(),
    );

    harness.feed_tx.send(candidate_config(0x11)).await.unwrap();

    let registry = harness.registry.clone();
    settle("listener to arm", || {
        let registry = registry.clone();
        async move {
            let registry = registry.read().await;
            match registry.values().next() {
                Some(tracked) => tracked.candidate.market.read().await.trade_in_progress,
                None => false,
            }
        }
    })
    .await;

    harness.shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(2), harness.run)
        .await
        .expect("run loop exits on shutdown")
        .unwrap();

    assert!(harness.registry.read().await.is_empty());
}
