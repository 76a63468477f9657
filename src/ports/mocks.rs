//! Hand-rolled mocks for the chain and scanner ports. Used by unit and
//! integration tests; every mock records its calls and serves configured
//! responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use tokio::sync::mpsc;

use crate::domain::verdict::{DeepScanOutcome, HeuristicOutcome, ReputationFlags, TradingSecurity};
use crate::ports::chain::{ChainClient, ChainClientFactory, ChainError, PoolEvent, PoolEventKind};
use crate::ports::scanner::{DeepScanner, HeuristicScanner};

fn passing_heuristic() -> HeuristicOutcome {
    HeuristicOutcome {
        success: true,
        reputation: Some(ReputationFlags::default()),
        security: Some(TradingSecurity {
            open_source: true,
            buy_tax: Some(0.01),
            sell_tax: Some(0.01),
            ..Default::default()
        }),
        reason: None,
    }
}

/// Mock heuristic scanner with per-token outcomes and a call counter
#[derive(Default)]
pub struct MockHeuristicScanner {
    calls: Arc<Mutex<Vec<Address>>>,
    outcomes: Mutex<HashMap<Address, HeuristicOutcome>>,
    delay: Option<Duration>,
}

impl MockHeuristicScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the outcome for a token; unconfigured tokens pass
    pub fn with_outcome(self, token: Address, outcome: HeuristicOutcome) -> Self {
        self.outcomes.lock().unwrap().insert(token, outcome);
        self
    }

    /// Builder method to make every check take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Address> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeuristicScanner for MockHeuristicScanner {
    async fn check(&self, _chain_id: u64, token: Address) -> HeuristicOutcome {
        self.calls.lock().unwrap().push(token);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .unwrap_or_else(passing_heuristic)
    }
}

/// Mock deep scanner that tracks its concurrency high-water mark
#[derive(Default)]
pub struct MockDeepScanner {
    calls: Arc<Mutex<Vec<Address>>>,
    outcomes: Mutex<HashMap<Address, DeepScanOutcome>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDeepScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, token: Address, outcome: DeepScanOutcome) -> Self {
        self.outcomes.lock().unwrap().insert(token, outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of scans that were ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeepScanner for MockDeepScanner {
    async fn scan(&self, _chain_id: u64, token: Address) -> DeepScanOutcome {
        self.calls.lock().unwrap().push(token);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .unwrap_or_else(DeepScanOutcome::clean)
    }
}

/// Mock chain client with scripted reads and test-driven event injection
#[derive(Default)]
pub struct MockChainClient {
    reserves: Mutex<HashMap<Address, (U256, U256)>>,
    token0s: Mutex<HashMap<Address, Address>>,
    sqrt_prices: Mutex<HashMap<Address, U256>>,
    decimals: Mutex<HashMap<Address, u8>>,
    /// Balance values served in order for (token, holder); the last value
    /// repeats once the script runs out
    balances: Mutex<HashMap<(Address, Address), Vec<U256>>>,
    /// Senders handed back so tests can push pool events into listeners
    event_senders: Mutex<Vec<mpsc::Sender<PoolEvent>>>,
    balance_calls: AtomicUsize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserves(self, pair: Address, reserve0: U256, reserve1: U256) -> Self {
        self.reserves.lock().unwrap().insert(pair, (reserve0, reserve1));
        self
    }

    pub fn with_token0(self, pair: Address, token: Address) -> Self {
        self.token0s.lock().unwrap().insert(pair, token);
        self
    }

    pub fn with_sqrt_price(self, pool: Address, sqrt_price: U256) -> Self {
        self.sqrt_prices.lock().unwrap().insert(pool, sqrt_price);
        self
    }

    pub fn with_decimals(self, token: Address, decimals: u8) -> Self {
        self.decimals.lock().unwrap().insert(token, decimals);
        self
    }

    pub fn with_balances(self, token: Address, holder: Address, values: Vec<U256>) -> Self {
        self.balances.lock().unwrap().insert((token, holder), values);
        self
    }

    pub fn set_reserves(&self, pair: Address, reserve0: U256, reserve1: U256) {
        self.reserves.lock().unwrap().insert(pair, (reserve0, reserve1));
    }

    pub fn balance_call_count(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Push an event into every active subscription. Returns how many
    /// subscribers received it.
    pub async fn emit(&self, event: PoolEvent) -> usize {
        let senders: Vec<_> = self.event_senders.lock().unwrap().clone();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256), ChainError> {
        self.reserves
            .lock()
            .unwrap()
            .get(&pair)
            .copied()
            .ok_or_else(|| ChainError::Call(format!("no reserves configured for {pair:?}")))
    }

    async fn token0(&self, pair: Address) -> Result<Address, ChainError> {
        self.token0s
            .lock()
            .unwrap()
            .get(&pair)
            .copied()
            .ok_or_else(|| ChainError::Call(format!("no token0 configured for {pair:?}")))
    }

    async fn slot0_sqrt_price(&self, pool: Address) -> Result<U256, ChainError> {
        self.sqrt_prices
            .lock()
            .unwrap()
            .get(&pool)
            .copied()
            .ok_or_else(|| ChainError::Call(format!("no sqrt price configured for {pool:?}")))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        self.decimals
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .ok_or_else(|| ChainError::Call(format!("no decimals configured for {token:?}")))
    }

    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ChainError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let mut balances = self.balances.lock().unwrap();
        let script = balances
            .get_mut(&(token, holder))
            .ok_or_else(|| ChainError::Call(format!("no balance configured for {token:?}")))?;
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            script
                .first()
                .copied()
                .ok_or_else(|| ChainError::Call("balance script empty".into()))
        }
    }

    async fn subscribe_pool_events(
        &self,
        _pool: Address,
        _kind: PoolEventKind,
    ) -> Result<mpsc::Receiver<PoolEvent>, ChainError> {
        let (tx, rx) = mpsc::channel(64);
        self.event_senders.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Mock factory that hands out pre-built clients in order and counts connects
#[derive(Default)]
pub struct MockChainFactory {
    clients: Mutex<Vec<Arc<MockChainClient>>>,
    connects: AtomicUsize,
}

impl MockChainFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a client; the last one repeats once the queue is exhausted
    pub fn push(&self, client: Arc<MockChainClient>) {
        self.clients.lock().unwrap().push(client);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClientFactory for MockChainFactory {
    async fn connect(&self, chain_id: u64) -> Result<Arc<dyn ChainClient>, ChainError> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst);
        let clients = self.clients.lock().unwrap();
        let client = clients
            .get(n)
            .or_else(|| clients.last())
            .cloned()
            .ok_or(ChainError::UnknownChain(chain_id))?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[tokio::test]
    async fn test_mock_heuristic_records_calls() {
        let scanner = MockHeuristicScanner::new()
            .with_outcome(addr(1), HeuristicOutcome::failed("tax too high"));

        let bad = scanner.check(8453, addr(1)).await;
        let good = scanner.check(8453, addr(2)).await;

        assert!(!bad.success);
        assert!(good.success);
        assert_eq!(scanner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_chain_balance_script() {
        let client = MockChainClient::new().with_balances(
            addr(1),
            addr(2),
            vec![U256::zero(), U256::from(100u64)],
        );

        assert_eq!(client.balance_of(addr(1), addr(2)).await.unwrap(), U256::zero());
        assert_eq!(
            client.balance_of(addr(1), addr(2)).await.unwrap(),
            U256::from(100u64)
        );
        // last value repeats
        assert_eq!(
            client.balance_of(addr(1), addr(2)).await.unwrap(),
            U256::from(100u64)
        );
        assert_eq!(client.balance_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_chain_event_injection() {
        let client = MockChainClient::new();
        let mut rx = client
            .subscribe_pool_events(addr(9), PoolEventKind::ReserveSync)
            .await
            .unwrap();

        let delivered = client
            .emit(PoolEvent::Sync {
                reserve0: U256::from(1u64),
                reserve1: U256::from(2u64),
            })
            .await;

        assert_eq!(delivered, 1);
        assert!(matches!(rx.recv().await, Some(PoolEvent::Sync { .. })));
    }

    #[tokio::test]
    async fn test_mock_factory_sequences_clients() {
        let factory = MockChainFactory::new();
        factory.push(Arc::new(MockChainClient::new().with_decimals(addr(1), 6)));
        factory.push(Arc::new(MockChainClient::new().with_decimals(addr(1), 18)));

        let first = factory.connect(8453).await.unwrap();
        let second = factory.connect(8453).await.unwrap();
        let third = factory.connect(8453).await.unwrap();

        assert_eq!(first.token_decimals(addr(1)).await.unwrap(), 6);
        assert_eq!(second.token_decimals(addr(1)).await.unwrap(), 18);
        assert_eq!(third.token_decimals(addr(1)).await.unwrap(), 18);
        assert_eq!(factory.connect_count(), 3);
    }
}
