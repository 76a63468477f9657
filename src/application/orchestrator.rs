//! Triage Orchestrator
//!
//! Owns the candidate registry and wires the subsystems together: discovery
//! feed in, audit pipeline verdicts and price alerts out. A candidate is
//! dropped on a failed audit, a rug pull, a reached target, or a liquidity
//! window that closes empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use governor::DefaultDirectRateLimiter;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::archive::AuditArchive;
use crate::audit::pipeline::{AuditPipeline, AuditRequest, PipelineConfig};
use crate::domain::candidate::{Candidate, CandidateConfig};
use crate::domain::verdict::AuditVerdict;
use crate::ports::chain::ChainClientFactory;
use crate::ports::scanner::{DeepScanner, HeuristicScanner};
use crate::price::{
    await_liquidity, spawn_rotation, PriceAlert, PriceEngine, LIQUIDITY_POLL_ATTEMPTS,
    LIQUIDITY_POLL_INTERVAL, ROTATION_PERIOD,
};

/// Orchestrator-level settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hold new candidates until the pool shows base-token liquidity
    pub wait_for_liquidity: bool,
    pub liquidity_attempts: u32,
    pub liquidity_interval: Duration,
    pub rotation_period: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait_for_liquidity: true,
            liquidity_attempts: LIQUIDITY_POLL_ATTEMPTS,
            liquidity_interval: LIQUIDITY_POLL_INTERVAL,
            rotation_period: ROTATION_PERIOD,
        }
    }
}

/// One registry entry: the candidate plus its monitoring machinery once the
/// audit has passed.
pub struct Tracked {
    pub candidate: Candidate,
    engine: Option<Arc<RwLock<PriceEngine>>>,
    rotation: Option<JoinHandle<()>>,
}

pub type Registry = Arc<RwLock<HashMap<Uuid, Tracked>>>;

enum InternalEvent {
    /// Liquidity window closed with the pool still empty
    Discard(Uuid),
}

pub struct TriageOrchestrator {
    factory: Arc<dyn ChainClientFactory>,
    pipeline: Arc<AuditPipeline>,
    archive: AuditArchive,
    config: OrchestratorConfig,
    registry: Registry,
    verdict_rx: Option<mpsc::Receiver<(Uuid, AuditVerdict)>>,
    alert_tx: mpsc::Sender<PriceAlert>,
    alert_rx: Option<mpsc::Receiver<PriceAlert>>,
    event_tx: mpsc::Sender<InternalEvent>,
    event_rx: Option<mpsc::Receiver<InternalEvent>>,
}

impl TriageOrchestrator {
    pub fn new(
        factory: Arc<dyn ChainClientFactory>,
        heuristic: Arc<dyn HeuristicScanner>,
        deep: Arc<dyn DeepScanner>,
        pipeline_config: PipelineConfig,
        archive: AuditArchive,
        config: OrchestratorConfig,
    ) -> Self {
        Self::build(factory, archive, config, |verdict_tx| {
            AuditPipeline::new(pipeline_config, heuristic, deep, verdict_tx)
        })
    }

    /// Same as `new` but the heuristic call budget is drawn from an
    /// externally owned limiter, so HTTP callers can share it.
    pub fn with_limiter(
        factory: Arc<dyn ChainClientFactory>,
        heuristic: Arc<dyn HeuristicScanner>,
        deep: Arc<dyn DeepScanner>,
        pipeline_config: PipelineConfig,
        limiter: Arc<DefaultDirectRateLimiter>,
        archive: AuditArchive,
        config: OrchestratorConfig,
    ) -> Self {
        Self::build(factory, archive, config, |verdict_tx| {
            AuditPipeline::with_limiter(pipeline_config, heuristic, deep, verdict_tx, limiter)
        })
    }

    fn build(
        factory: Arc<dyn ChainClientFactory>,
        archive: AuditArchive,
        config: OrchestratorConfig,
        make_pipeline: impl FnOnce(mpsc::Sender<(Uuid, AuditVerdict)>) -> AuditPipeline,
    ) -> Self {
        let (verdict_tx, verdict_rx) = mpsc::channel(64);
        let (alert_tx, alert_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let mut pipeline = make_pipeline(verdict_tx);
        pipeline.start();
        Self {
            factory,
            pipeline: Arc::new(pipeline),
            archive,
            config,
            registry: Arc::new(RwLock::new(HashMap::new())),
            verdict_rx: Some(verdict_rx),
            alert_tx,
            alert_rx: Some(alert_rx),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Shared view of the registry, mainly for inspection in tests and the
    /// CLI status path.
    pub fn registry(&self) -> Registry {
        Arc::clone(&self.registry)
    }

    /// Register a discovered pair and hand it to the audit pipeline, after
    /// the optional liquidity wait. Duplicate tokens are dropped here so the
    /// registry mirrors the pipeline's own dedup.
    pub async fn admit(&mut self, config: CandidateConfig) -> Option<Uuid> {
        let candidate = Candidate::from_config(config);
        let id = candidate.id;
        {
            let mut registry = self.registry.write().await;
            let duplicate = registry
                .values()
                .any(|t| t.candidate.new_token == candidate.new_token);
            if duplicate {
                warn!(token = ?candidate.new_token, "token already tracked, dropping");
                return None;
            }
            info!(%id, token = ?candidate.new_token, chain = candidate.chain_id, "candidate admitted");
            registry.insert(
                id,
                Tracked {
                    candidate: candidate.clone(),
                    engine: None,
                    rotation: None,
                },
            );
        }

        let factory = Arc::clone(&self.factory);
        let pipeline = Arc::clone(&self.pipeline);
        let event_tx = self.event_tx.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            if config.wait_for_liquidity {
                let client = match factory.connect(candidate.chain_id).await {
                    Ok(client) => client,
                    Err(err) => {
                        error!(%id, error = %err, "connect for liquidity wait failed");
                        let _ = event_tx.send(InternalEvent::Discard(id)).await;
                        return;
                    }
                };
                let funded = await_liquidity(
                    client.as_ref(),
                    candidate.base_token,
                    candidate.pair_address,
                    config.liquidity_attempts,
                    config.liquidity_interval,
                )
                .await;
                if !funded {
                    warn!(%id, "pool never funded, discarding candidate");
                    let _ = event_tx.send(InternalEvent::Discard(id)).await;
                    return;
                }
            }
            let request = AuditRequest {
                id,
                chain_id: candidate.chain_id,
                token: candidate.new_token,
            };
            if pipeline.submit(request).await.is_err() {
                warn!(%id, "audit pipeline is gone, discarding candidate");
                let _ = event_tx.send(InternalEvent::Discard(id)).await;
            }
        });
        Some(id)
    }

    /// Route one audit verdict: archive it, then either drop the candidate
    /// or start monitoring it. The registry lock is only held to read or
    /// update the entry; chain and archive I/O run without it.
    pub async fn handle_verdict(&mut self, id: Uuid, verdict: AuditVerdict) {
        let candidate = {
            let mut registry = self.registry.write().await;
            let Some(tracked) = registry.get_mut(&id) else {
                warn!(%id, "verdict for unknown candidate");
                return;
            };
            tracked.candidate.verdict = Some(verdict.clone());
            tracked.candidate.clone()
        };
        if let Err(err) = self.archive.record(&candidate).await {
            error!(%id, error = %err, "archive write failed");
        }

        if !verdict.success {
            info!(%id, reason = ?verdict.reason, "audit failed, dropping candidate");
            self.remove(id).await;
            return;
        }

        let client = match self.factory.connect(candidate.chain_id).await {
            Ok(client) => client,
            Err(err) => {
                error!(%id, error = %err, "connect for monitoring failed, dropping candidate");
                self.remove(id).await;
                return;
            }
        };
        let engine = Arc::new(RwLock::new(PriceEngine::new(client, &candidate)));
        let armed = {
            let guard = engine.read().await;
            guard.start_target_listener(self.alert_tx.clone()).await
        };
        match armed {
            Ok(_) => {
                candidate.market.write().await.trade_in_progress = true;
                let rotation = spawn_rotation(
                    Arc::clone(&self.factory),
                    candidate.clone(),
                    Arc::clone(&engine),
                    self.alert_tx.clone(),
                    self.config.rotation_period,
                );
                let mut registry = self.registry.write().await;
                match registry.get_mut(&id) {
                    Some(tracked) => {
                        tracked.rotation = Some(rotation);
                        tracked.engine = Some(engine);
                        info!(%id, "audit passed, price listener armed");
                    }
                    None => {
                        // candidate was removed while the listener was arming
                        rotation.abort();
                        engine.read().await.stop_target_listener().await;
                        candidate.market.write().await.trade_in_progress = false;
                    }
                }
            }
            Err(err) => {
                error!(%id, error = %err, "listener arm failed, dropping candidate");
                self.remove(id).await;
            }
        }
    }

    /// Route one price alert. Both outcomes end monitoring; they are logged
    /// distinctly because a rug pull is an incident, not a result.
    pub async fn handle_alert(&mut self, alert: PriceAlert) {
        match alert {
            PriceAlert::RugPull { id, base_reserve } => {
                warn!(%id, %base_reserve, "RUG PULL - liquidity pulled out from under the pair");
                self.remove(id).await;
            }
            PriceAlert::TargetReached { id, price, target } => {
                info!(%id, %price, %target, "target reached, sell trigger");
                self.remove(id).await;
            }
        }
    }

    async fn handle_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Discard(id) => self.remove(id).await,
        }
    }

    async fn remove(&mut self, id: Uuid) {
        drop_tracked(self.registry.write().await.remove(&id)).await;
    }

    /// Main loop: feed, verdicts, alerts and internal events, until the feed
    /// ends or shutdown flips.
    pub async fn run(
        mut self,
        mut feed: mpsc::Receiver<CandidateConfig>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut verdict_rx = self.verdict_rx.take().expect("run called once");
        let mut alert_rx = self.alert_rx.take().expect("run called once");
        let mut event_rx = self.event_rx.take().expect("run called once");
        loop {
            tokio::select! {
                maybe = feed.recv() => match maybe {
                    Some(config) => {
                        self.admit(config).await;
                    }
                    None => break,
                },
                Some((id, verdict)) = verdict_rx.recv() => self.handle_verdict(id, verdict).await,
                Some(alert) = alert_rx.recv() => self.handle_alert(alert).await,
                Some(event) = event_rx.recv() => self.handle_event(event).await,
                _ = shutdown.changed() => break,
            }
        }
        let ids: Vec<Uuid> = self.registry.read().await.keys().copied().collect();
        for id in ids {
            self.remove(id).await;
        }
        info!("orchestrator stopped");
    }
}

async fn drop_tracked(tracked: Option<Tracked>) {
    let Some(tracked) = tracked else { return };
    if let Some(rotation) = tracked.rotation {
        rotation.abort();
    }
    if let Some(engine) = tracked.engine {
        engine.read().await.stop_target_listener().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::verdict::{DeepScanOutcome, HeuristicOutcome};
    use crate::ports::mocks::{
        MockChainClient, MockChainFactory, MockDeepScanner, MockHeuristicScanner,
    };
    use ethers::types::{Address, U256};

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn units(n: u64, decimals: u8) -> U256 {
        U256::from(n) * U256::exp10(decimals as usize)
    }

    fn sample_config(token: u8) -> CandidateConfig {
        CandidateConfig {
            id: None,
            chain_id: 8453,
            new_token: addr(token),
            base_token: addr(0x22),
            pair_address: addr(0x33),
            v3: false,
            fee_tier: None,
            target_gain_bps: 2_500,
            rug_floor_thousandths: 1,
        }
    }

    fn pool_client(token: u8) -> Arc<MockChainClient> {
        Arc::new(
            MockChainClient::new()
                .with_decimals(addr(0x22), 18)
                .with_decimals(addr(token), 18)
                .with_token0(addr(0x33), addr(0x22))
                .with_reserves(addr(0x33), units(500_000, 18), units(1_000, 18))
                .with_balances(addr(0x22), addr(0x33), vec![units(10, 18)]),
        )
    }

    fn orchestrator(client: Arc<MockChainClient>) -> TriageOrchestrator {
        let factory = Arc::new(MockChainFactory::new());
        factory.push(client);
        let dir = tempfile::tempdir().unwrap().into_path();
        let archive = AuditArchive::new(&dir).unwrap();
        TriageOrchestrator::new(
            factory,
            Arc::new(MockHeuristicScanner::new()),
            Arc::new(MockDeepScanner::new()),
            PipelineConfig::default(),
            archive,
            OrchestratorConfig {
                wait_for_liquidity: false,
                liquidity_interval: Duration::from_millis(5),
                liquidity_attempts: 3,
                rotation_period: Duration::from_secs(3600),
            },
        )
    }

    fn passing_verdict() -> AuditVerdict {
        AuditVerdict::combined(
            HeuristicOutcome {
                success: true,
                reputation: None,
                security: None,
                reason: None,
            },
            DeepScanOutcome::clean(),
        )
    }

    #[tokio::test]
    async fn test_admit_registers_and_dedups() {
        let mut orch = orchestrator(pool_client(0x11));
        let first = orch.admit(sample_config(0x11)).await;
        let second = orch.admit(sample_config(0x11)).await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(orch.registry.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_verdict_drops_candidate() {
        let mut orch = orchestrator(pool_client(0x11));
        let id = orch.admit(sample_config(0x11)).await.unwrap();

        orch.handle_verdict(
            id,
            AuditVerdict::short_circuit(HeuristicOutcome::failed("tax too high")),
        )
        .await;

        assert!(orch.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_passed_verdict_arms_listener() {
        let mut orch = orchestrator(pool_client(0x11));
        let id = orch.admit(sample_config(0x11)).await.unwrap();

        orch.handle_verdict(id, passing_verdict()).await;

        let registry = orch.registry.read().await;
        let tracked = registry.get(&id).expect("candidate kept");
        let engine = tracked.engine.as_ref().expect("engine built");
        assert_eq!(engine.read().await.active_listener_count().await, 1);
        assert!(tracked.rotation.is_some());
        let market = tracked.candidate.market.read().await;
        assert!(market.trade_in_progress);
        assert_eq!(market.target_price, units(625, 18));
    }

    #[tokio::test]
    async fn test_verdict_for_removed_candidate_is_ignored() {
        let mut orch = orchestrator(pool_client(0x11));
        let id = orch.admit(sample_config(0x11)).await.unwrap();
        orch.remove(id).await;

        orch.handle_verdict(id, passing_verdict()).await;

        assert!(orch.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_rug_alert_removes_candidate() {
        let mut orch = orchestrator(pool_client(0x11));
        let id = orch.admit(sample_config(0x11)).await.unwrap();
        orch.handle_verdict(id, passing_verdict()).await;

        orch.handle_alert(PriceAlert::RugPull {
            id,
            base_reserve: U256::zero(),
        })
        .await;

        assert!(orch.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_target_alert_removes_candidate() {
        let mut orch = orchestrator(pool_client(0x11));
        let id = orch.admit(sample_config(0x11)).await.unwrap();
        orch.handle_verdict(id, passing_verdict()).await;

        orch.handle_alert(PriceAlert::TargetReached {
            id,
            price: units(700, 18),
            target: units(625, 18),
        })
        .await;

        assert!(orch.registry.read().await.is_empty());
    }
}
