use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use oxidity_rebalancer::domain::error::AppError;
use oxidity_rebalancer::domain::types::{
    AccountState, Allocation, HeldAllocation, RiskPolicy, RiskTier, YieldQuote,
};
use oxidity_rebalancer::infrastructure::network::vault::Ledger;
use oxidity_rebalancer::services::agent::decision::DecisionEngine;
use oxidity_rebalancer::services::agent::executor::RebalanceExecutor;
use oxidity_rebalancer::services::agent::rates::RateFeed;
use oxidity_rebalancer::services::agent::scheduler::{AgentStats, CycleScheduler};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockLedger {
    configured: bool,
    height: AtomicU64,
    states: HashMap<Address, AccountState>,
    failing: HashSet<Address>,
    height_calls: AtomicUsize,
    state_calls: AtomicUsize,
}

impl MockLedger {
    fn new(states: HashMap<Address, AccountState>, failing: HashSet<Address>) -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            height: AtomicU64::new(0),
            states,
            failing,
            height_calls: AtomicUsize::new(0),
            state_calls: AtomicUsize::new(0),
        })
    }

    fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            configured: false,
            height: AtomicU64::new(0),
            states: HashMap::new(),
            failing: HashSet::new(),
            height_calls: AtomicUsize::new(0),
            state_calls: AtomicUsize::new(0),
        })
    }

    fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn block_height(&self) -> Result<u64, AppError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn account_state(&self, account: Address) -> Result<AccountState, AppError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&account) {
            return Err(AppError::RpcUnavailable("state read timed out".into()));
        }
        self.states
            .get(&account)
            .cloned()
            .ok_or_else(|| AppError::RpcUnavailable("unknown account".into()))
    }
}

struct MockFeed {
    quotes: Vec<YieldQuote>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl MockFeed {
    fn new(quotes: Vec<YieldQuote>) -> Arc<Self> {
        Arc::new(Self {
            quotes,
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RateFeed for MockFeed {
    async fn fetch_quotes(&self) -> Result<Vec<YieldQuote>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::SourceUnavailable("oracle offline".into()));
        }
        Ok(self.quotes.clone())
    }
}

#[derive(Default)]
struct MockExecutor {
    executed: Mutex<Vec<Address>>,
}

#[async_trait]
impl RebalanceExecutor for MockExecutor {
    async fn execute(
        &self,
        account: Address,
        _allocation: &Allocation,
        _rationale: &str,
    ) -> Result<B256, AppError> {
        self.executed.lock().unwrap().push(account);
        Ok(B256::repeat_byte(7))
    }
}

fn quote(name: &str, apy: f64) -> YieldQuote {
    YieldQuote {
        id: name.to_lowercase().replace(' ', "-"),
        name: name.to_string(),
        protocol: "Test".to_string(),
        address: Address::ZERO,
        apy,
        liquidity_usd: 1_000_000.0,
        risk: RiskTier::Low,
        observed_at: 0,
    }
}

fn active_account(balance: u64) -> AccountState {
    AccountState {
        balance: U256::from(balance),
        risk_policy: RiskPolicy::Balanced,
        is_active: true,
        allocation: HeldAllocation::empty(),
        deposit_ts: 0,
        last_rebalance_ts: 0,
        total_yield_earned: U256::ZERO,
    }
}

fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

fn scheduler_with(
    ledger: Arc<MockLedger>,
    feed: Arc<MockFeed>,
    executor: Arc<MockExecutor>,
    accounts: Vec<Address>,
) -> (CycleScheduler, Arc<AgentStats>) {
    let stats = Arc::new(AgentStats::default());
    let scheduler = CycleScheduler::new(
        ledger,
        feed,
        DecisionEngine::new(None, 50),
        executor,
        accounts,
        Duration::from_millis(10),
        stats.clone(),
    );
    (scheduler, stats)
}

#[tokio::test]
async fn one_failing_account_does_not_block_the_others() {
    let mut states = HashMap::new();
    states.insert(addr(1), active_account(1_000_000));
    states.insert(addr(3), active_account(2_000_000));
    let ledger = MockLedger::new(states, HashSet::from([addr(2)]));
    ledger.set_height(1);
    let feed = MockFeed::new(vec![quote("Best", 20.0)]);
    let executor = Arc::new(MockExecutor::default());
    let (mut scheduler, stats) = scheduler_with(
        ledger.clone(),
        feed,
        executor.clone(),
        vec![addr(1), addr(2), addr(3)],
    );

    scheduler.tick().await.unwrap();

    let executed = executor.executed.lock().unwrap().clone();
    assert_eq!(executed, vec![addr(1), addr(3)]);
    assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.rebalanced.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn repeated_height_does_no_ledger_or_quote_work() {
    let mut states = HashMap::new();
    states.insert(addr(1), active_account(1_000_000));
    let ledger = MockLedger::new(states, HashSet::new());
    ledger.set_height(5);
    let feed = MockFeed::new(vec![quote("Best", 20.0)]);
    let executor = Arc::new(MockExecutor::default());
    let (mut scheduler, _stats) =
        scheduler_with(ledger.clone(), feed.clone(), executor, vec![addr(1)]);

    scheduler.tick().await.unwrap();
    let quote_calls_after_first = feed.calls.load(Ordering::SeqCst);
    let state_calls_after_first = ledger.state_calls.load(Ordering::SeqCst);

    // Same height again: only the height probe itself is allowed.
    scheduler.tick().await.unwrap();

    assert_eq!(feed.calls.load(Ordering::SeqCst), quote_calls_after_first);
    assert_eq!(
        ledger.state_calls.load(Ordering::SeqCst),
        state_calls_after_first
    );
    assert_eq!(ledger.height_calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.cycles(), 1);
}

#[tokio::test]
async fn quote_failure_aborts_cycle_and_height_is_retried() {
    let mut states = HashMap::new();
    states.insert(addr(1), active_account(1_000_000));
    let ledger = MockLedger::new(states, HashSet::new());
    ledger.set_height(9);
    let feed = MockFeed::new(vec![quote("Best", 20.0)]);
    feed.fail_next.store(true, Ordering::SeqCst);
    let executor = Arc::new(MockExecutor::default());
    let (mut scheduler, _stats) =
        scheduler_with(ledger.clone(), feed.clone(), executor.clone(), vec![addr(1)]);

    let err = scheduler.tick().await.unwrap_err();
    assert!(matches!(err, AppError::SourceUnavailable(_)));
    assert_eq!(ledger.state_calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.last_height(), 0);

    // Feed recovers; the same block height is picked up on the next tick.
    scheduler.tick().await.unwrap();
    assert_eq!(scheduler.last_height(), 9);
    assert_eq!(executor.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn inactive_and_empty_accounts_are_skipped() {
    let mut inactive = active_account(1_000_000);
    inactive.is_active = false;
    let mut states = HashMap::new();
    states.insert(addr(1), inactive);
    states.insert(addr(2), active_account(0));
    let ledger = MockLedger::new(states, HashSet::new());
    ledger.set_height(1);
    let feed = MockFeed::new(vec![quote("Best", 20.0)]);
    let executor = Arc::new(MockExecutor::default());
    let (mut scheduler, stats) =
        scheduler_with(ledger, feed, executor.clone(), vec![addr(1), addr(2)]);

    scheduler.tick().await.unwrap();

    assert!(executor.executed.lock().unwrap().is_empty());
    assert_eq!(stats.skipped.load(Ordering::Relaxed), 2);
    assert_eq!(stats.processed.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn unconfigured_vault_still_cycles_without_account_reads() {
    let ledger = MockLedger::unconfigured();
    ledger.set_height(1);
    let feed = MockFeed::new(vec![quote("Best", 20.0)]);
    let executor = Arc::new(MockExecutor::default());
    let (mut scheduler, stats) =
        scheduler_with(ledger.clone(), feed.clone(), executor, vec![addr(1)]);

    scheduler.tick().await.unwrap();

    assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.state_calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.cycles.load(Ordering::Relaxed), 1);
}
