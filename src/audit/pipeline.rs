//! Audit Pipeline
//!
//! Two-stage admission control for candidate tokens: a fast heuristic scan
//! gated by a shared per-minute rate limiter, then a slow static scan gated
//! by a concurrency cap. All queue state lives in one task; interval timers
//! and workers only send messages into it, so a tick can be driven manually
//! and the whole pipeline stays deterministic under test.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::verdict::{AuditVerdict, DeepScanOutcome, HeuristicOutcome};
use crate::ports::scanner::{DeepScanner, HeuristicScanner};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline task is not running")]
    NotRunning,
}

/// Tuning knobs for the pipeline. Defaults mirror the external API ceiling
/// (30 heuristic calls per rolling minute) and the host's appetite for
/// static-analysis subprocesses (4 at a time).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub heuristic_tick: Duration,
    pub deep_tick: Duration,
    pub heuristic_calls_per_minute: u32,
    pub deep_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            heuristic_tick: Duration::from_millis(1_000),
            deep_tick: Duration::from_millis(1_100),
            heuristic_calls_per_minute: 30,
            deep_concurrency: 4,
        }
    }
}

/// One token submitted for auditing.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub id: Uuid,
    pub chain_id: u64,
    pub token: Address,
}

enum PipelineMsg {
    Submit(AuditRequest),
    TickHeuristic,
    TickDeep,
    HeuristicDone { id: Uuid, outcome: HeuristicOutcome },
    DeepDone { id: Uuid, outcome: DeepScanOutcome },
    Shutdown,
}

struct HeuristicItem {
    request: AuditRequest,
    running: bool,
}

struct DeepItem {
    request: AuditRequest,
    heuristic: HeuristicOutcome,
    running: bool,
}

struct PipelineState {
    heuristic_queue: VecDeque<HeuristicItem>,
    deep_queue: VecDeque<DeepItem>,
    /// Token addresses anywhere in the pipeline, for duplicate suppression
    in_flight_tokens: HashSet<Address>,
    limiter: Arc<DefaultDirectRateLimiter>,
    deep_permits: Arc<Semaphore>,
    heuristic_scanner: Arc<dyn HeuristicScanner>,
    deep_scanner: Arc<dyn DeepScanner>,
    verdict_tx: mpsc::Sender<(Uuid, AuditVerdict)>,
    msg_tx: mpsc::Sender<PipelineMsg>,
}

impl PipelineState {
    fn submit(&mut self, request: AuditRequest) {
        if !self.in_flight_tokens.insert(request.token) {
            debug!(token = ?request.token, "duplicate submission ignored");
            return;
        }
        info!(id = %request.id, token = ?request.token, "queued for heuristic scan");
        self.heuristic_queue.push_back(HeuristicItem {
            request,
            running: false,
        });
    }

    /// Dispatch at most one idle heuristic item, respecting the rolling
    /// call budget. An exhausted budget leaves the queue untouched.
    fn tick_heuristic(&mut self) {
        let Some(item) = self.heuristic_queue.iter_mut().find(|i| !i.running) else {
            return;
        };
        if self.limiter.check().is_err() {
            debug!("heuristic call budget exhausted, holding queue");
            return;
        }
        item.running = true;
        let request = item.request.clone();
        let scanner = Arc::clone(&self.heuristic_scanner);
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let outcome = scanner.check(request.chain_id, request.token).await;
            let _ = msg_tx
                .send(PipelineMsg::HeuristicDone {
                    id: request.id,
                    outcome,
                })
                .await;
        });
    }

    /// Dispatch at most one idle deep item if a concurrency permit is free.
    fn tick_deep(&mut self) {
        let Some(item) = self.deep_queue.iter_mut().find(|i| !i.running) else {
            return;
        };
        let Ok(permit) = Arc::clone(&self.deep_permits).try_acquire_owned() else {
            debug!("deep-scan slots full, holding queue");
            return;
        };
        item.running = true;
        let request = item.request.clone();
        let scanner = Arc::clone(&self.deep_scanner);
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let outcome = scanner.scan(request.chain_id, request.token).await;
            drop(permit);
            let _ = msg_tx
                .send(PipelineMsg::DeepDone {
                    id: request.id,
                    outcome,
                })
                .await;
        });
    }

    async fn heuristic_done(&mut self, id: Uuid, outcome: HeuristicOutcome) {
        let item = match self
            .heuristic_queue
            .iter()
            .position(|i| i.request.id == id)
            .and_then(|pos| self.heuristic_queue.remove(pos))
        {
            Some(item) => item,
            None => {
                warn!(%id, "heuristic result for unknown item");
                return;
            }
        };
        let request = item.request;

        if !outcome.success {
            info!(id = %id, reason = ?outcome.reason, "heuristic scan failed, short-circuiting");
            self.finish(request.token, id, AuditVerdict::short_circuit(outcome))
                .await;
            return;
        }

        // hand-off dedup: the same token may have raced in through another id
        if self
            .deep_queue
            .iter()
            .any(|i| i.request.token == request.token)
        {
            debug!(token = ?request.token, "token already awaiting deep scan");
            return;
        }
        debug!(id = %id, "heuristic scan passed, queued for deep scan");
        self.deep_queue.push_back(DeepItem {
            request,
            heuristic: outcome,
            running: false,
        });
    }

    async fn deep_done(&mut self, id: Uuid, outcome: DeepScanOutcome) {
        let item = match self
            .deep_queue
            .iter()
            .position(|i| i.request.id == id)
            .and_then(|pos| self.deep_queue.remove(pos))
        {
            Some(item) => item,
            None => {
                warn!(%id, "deep-scan result for unknown item");
                return;
            }
        };
        let verdict = AuditVerdict::combined(item.heuristic, outcome);
        info!(id = %id, success = verdict.success, "audit complete");
        self.finish(item.request.token, id, verdict).await;
    }

    async fn finish(&mut self, token: Address, id: Uuid, verdict: AuditVerdict) {
        self.in_flight_tokens.remove(&token);
        if self.verdict_tx.send((id, verdict)).await.is_err() {
            warn!(%id, "verdict receiver dropped");
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PipelineMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                PipelineMsg::Submit(request) => self.submit(request),
                PipelineMsg::TickHeuristic => self.tick_heuristic(),
                PipelineMsg::TickDeep => self.tick_deep(),
                PipelineMsg::HeuristicDone { id, outcome } => {
                    self.heuristic_done(id, outcome).await
                }
                PipelineMsg::DeepDone { id, outcome } => self.deep_done(id, outcome).await,
                PipelineMsg::Shutdown => break,
            }
        }
        info!("audit pipeline stopped");
    }
}

/// Handle to the pipeline task. Ticks normally come from the interval tasks
/// started by [`AuditPipeline::start`], but can be sent manually.
pub struct AuditPipeline {
    tx: mpsc::Sender<PipelineMsg>,
    state_task: JoinHandle<()>,
    interval_tasks: Vec<JoinHandle<()>>,
    config: PipelineConfig,
}

impl AuditPipeline {
    pub fn new(
        config: PipelineConfig,
        heuristic_scanner: Arc<dyn HeuristicScanner>,
        deep_scanner: Arc<dyn DeepScanner>,
        verdict_tx: mpsc::Sender<(Uuid, AuditVerdict)>,
    ) -> Self {
        let quota = NonZeroU32::new(config.heuristic_calls_per_minute.max(1))
            .expect("max(1) is non-zero");
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(quota)));
        Self::with_limiter(config, heuristic_scanner, deep_scanner, verdict_tx, limiter)
    }

    /// Build the pipeline around an externally owned limiter so the
    /// heuristic scanner adapter can share the same call budget.
    pub fn with_limiter(
        config: PipelineConfig,
        heuristic_scanner: Arc<dyn HeuristicScanner>,
        deep_scanner: Arc<dyn DeepScanner>,
        verdict_tx: mpsc::Sender<(Uuid, AuditVerdict)>,
        limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let state = PipelineState {
            heuristic_queue: VecDeque::new(),
            deep_queue: VecDeque::new(),
            in_flight_tokens: HashSet::new(),
            limiter,
            deep_permits: Arc::new(Semaphore::new(config.deep_concurrency)),
            heuristic_scanner,
            deep_scanner,
            verdict_tx,
            msg_tx: tx.clone(),
        };
        let state_task = tokio::spawn(state.run(rx));
        Self {
            tx,
            state_task,
            interval_tasks: Vec::new(),
            config,
        }
    }

    pub async fn submit(&self, request: AuditRequest) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineMsg::Submit(request))
            .await
            .map_err(|_| PipelineError::NotRunning)
    }

    pub async fn tick_heuristic(&self) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineMsg::TickHeuristic)
            .await
            .map_err(|_| PipelineError::NotRunning)
    }

    pub async fn tick_deep(&self) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineMsg::TickDeep)
            .await
            .map_err(|_| PipelineError::NotRunning)
    }

    /// Start the two interval tasks that drive the stage ticks.
    pub fn start(&mut self) {
        if !self.interval_tasks.is_empty() {
            return;
        }
        for (period, msg_of) in [
            (
                self.config.heuristic_tick,
                (|| PipelineMsg::TickHeuristic) as fn() -> PipelineMsg,
            ),
            (self.config.deep_tick, || PipelineMsg::TickDeep),
        ] {
            let tx = self.tx.clone();
            self.interval_tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if tx.send(msg_of()).await.is_err() {
                        break;
                    }
                }
            }));
        }
        info!(
            heuristic_ms = self.config.heuristic_tick.as_millis() as u64,
            deep_ms = self.config.deep_tick.as_millis() as u64,
            "audit pipeline started"
        );
    }

    /// Stop the interval tasks and the state task. In-flight workers finish
    /// but their results are discarded.
    pub async fn stop(&mut self) {
        for task in self.interval_tasks.drain(..) {
            task.abort();
        }
        let _ = self.tx.send(PipelineMsg::Shutdown).await;
    }
}

impl Drop for AuditPipeline {
    fn drop(&mut self) {
        for task in &self.interval_tasks {
            task.abort();
        }
        self.state_task.abort();
    }
}
