//! Scripted collaborators for exercising the saga without a wallet, RPC
//! endpoints or a routing provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{ExecutionError, ProviderError, ReaderError, RpcError, SignerError};
use crate::execution::abi;
use crate::execution::reader::ChainReader;
use crate::execution::signer::{ContractCall, Receipt, SignOutcome, Signer, SwitchPolicy};
use crate::funding::allowance::AllowanceManager;
use crate::funding::balance::BalanceVerifier;
use crate::funding::bridge::BridgeExecutor;
use crate::funding::deposit::{DepositConfig, DepositExecutor};
use crate::funding::orchestrator::FundingOrchestrator;
use crate::funding::progress::{ChannelReporter, FanoutReporter, ProgressEvent, ProgressReporter};
use crate::funding::session::{Phase, Session};
use crate::funding::{FundingMode, OrchestratorConfig};
use crate::ledger::catalog::{builtin_sources, LedgerCatalog};
use crate::ledger::models::{Address, Asset, AssetRef, Ledger, LedgerId, TxHash};
use crate::routing::aggregator::RouteAggregator;
use crate::routing::models::{
    LegPhase, Route, RouteOrder, RouteRequest, RouteStep, SettledRoute, StepStatus, StepUpdate,
    StepUpdateSender,
};
use crate::routing::resolver::RouteResolver;

pub const DESTINATION: LedgerId = LedgerId(999);
pub const DEST_USDC: Address = Address::from_literal("0x1111111111111111111111111111111111111111");
pub const CUSTODY: Address = Address::from_literal("0x2222222222222222222222222222222222222222");
pub const OWNER: Address = Address::from_literal("0x3333333333333333333333333333333333333333");
pub const ARB_USDC: Address = Address::from_literal("0xaf88d065e77c8cC2239327C5EDb3A432268e5831");
pub const LIFI_DIAMOND: Address =
    Address::from_literal("0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE");

pub fn settlement_asset() -> Asset {
    Asset::token("USDC", "USD Coin", DEST_USDC, 6)
}

pub fn source_usdc() -> Asset {
    Asset::token("USDC", "USD Coin", ARB_USDC, 6)
}

pub fn catalog() -> LedgerCatalog {
    LedgerCatalog::new(
        builtin_sources(),
        Ledger::new(DESTINATION, "HyperEVM", Asset::native("HYPE", "Hype")),
        settlement_asset(),
        CUSTODY,
    )
}

pub fn deposit_config() -> DepositConfig {
    DepositConfig {
        destination: DESTINATION,
        settlement_asset: settlement_asset(),
        custody_contract: CUSTODY,
        first_deposit_minimum: Some(1_000_000),
        switch: switch_policy(),
    }
}

pub fn switch_policy() -> SwitchPolicy {
    SwitchPolicy {
        attempts: 3,
        interval: Duration::from_millis(1),
    }
}

/// Arbitrum USDC to destination USDC in one step
pub fn route(from_amount: u128, to_amount: u128) -> Route {
    Route {
        id: "route-1".to_string(),
        from_ledger: LedgerId::ARBITRUM,
        to_ledger: DESTINATION,
        from_asset: AssetRef::Contract(ARB_USDC),
        to_asset: AssetRef::Contract(DEST_USDC),
        from_amount,
        to_amount,
        to_amount_min: to_amount - to_amount / 200,
        steps: vec![RouteStep {
            id: "step-1".to_string(),
            tool: "across".to_string(),
            from_ledger: LedgerId::ARBITRUM,
            to_ledger: DESTINATION,
            from_asset: AssetRef::Contract(ARB_USDC),
            from_amount,
            approval_address: Some(LIFI_DIAMOND),
            status: StepStatus::NotStarted,
            raw: serde_json::json!({ "id": "step-1" }),
        }],
    }
}

pub fn settled(received: u128) -> SettledRoute {
    SettledRoute {
        route_id: "route-1".to_string(),
        step_statuses: vec![StepStatus::Done],
        received_amount: Some(received),
        received_asset: Some(AssetRef::Contract(DEST_USDC)),
        received_ledger: Some(DESTINATION),
        tx_hashes: vec![TxHash::from("0xb1")],
    }
}

/// In-memory balances and allowances
pub struct MockChain {
    balances: Mutex<HashMap<(LedgerId, AssetRef, Address), u128>>,
    allowances: Mutex<HashMap<(LedgerId, Address, Address, Address), u128>>,
    fail_all: AtomicBool,
    fail_balances: AtomicBool,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            fail_all: AtomicBool::new(false),
            fail_balances: AtomicBool::new(false),
        }
    }

    pub fn set_balance(&self, ledger: LedgerId, asset: AssetRef, owner: Address, units: u128) {
        self.balances.lock().insert((ledger, asset, owner), units);
    }

    /// Settlement asset held by `OWNER` on the destination
    pub fn fund_settlement(&self, units: u128) {
        self.set_balance(DESTINATION, AssetRef::Contract(DEST_USDC), OWNER, units);
    }

    pub fn set_allowance(
        &self,
        ledger: LedgerId,
        token: Address,
        owner: Address,
        spender: Address,
        units: u128,
    ) {
        self.allowances
            .lock()
            .insert((ledger, token, owner, spender), units);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.fail_balances.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> ReaderError {
        ReaderError::Rpc(RpcError::Decode("node unavailable".to_string()))
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn balance(
        &self,
        ledger: LedgerId,
        asset: &AssetRef,
        owner: &Address,
    ) -> Result<u128, ReaderError> {
        if self.fail_all.load(Ordering::SeqCst) || self.fail_balances.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self
            .balances
            .lock()
            .get(&(ledger, *asset, *owner))
            .copied()
            .unwrap_or(0))
    }

    async fn allowance(
        &self,
        ledger: LedgerId,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u128, ReaderError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self
            .allowances
            .lock()
            .get(&(ledger, *token, *owner, *spender))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Reject,
    Fail(String),
    /// Submitted, but the receipt reports a revert
    Revert,
}

/// Wallet that signs whatever it is asked to unless scripted otherwise.
///
/// Confirmed approvals are written to the backing `MockChain`, and deposits
/// under the configured minimum fail the way a node reports the revert.
pub struct MockWallet {
    chain: Arc<MockChain>,
    active: Mutex<LedgerId>,
    honor_switches: AtomicBool,
    /// Reads that still report the old ledger after a switch
    switch_lag: AtomicUsize,
    pending_switch: Mutex<Option<(LedgerId, usize)>>,
    switch_requests: Mutex<Vec<LedgerId>>,
    script: Mutex<VecDeque<Option<Scripted>>>,
    sent: Mutex<Vec<ContractCall>>,
    receipts: Mutex<HashMap<TxHash, bool>>,
    deposit_minimum: Mutex<Option<u128>>,
    nonce: AtomicUsize,
}

impl MockWallet {
    pub fn new(chain: Arc<MockChain>, active: LedgerId) -> Self {
        Self {
            chain,
            active: Mutex::new(active),
            honor_switches: AtomicBool::new(true),
            switch_lag: AtomicUsize::new(0),
            pending_switch: Mutex::new(None),
            switch_requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            deposit_minimum: Mutex::new(None),
            nonce: AtomicUsize::new(0),
        }
    }

    /// Script the next signature request
    pub fn script(&self, outcome: Scripted) {
        self.script_after(0, outcome);
    }

    /// Script the signature request `skip` requests from now
    pub fn script_after(&self, skip: usize, outcome: Scripted) {
        let mut script = self.script.lock();
        if script.len() <= skip {
            script.resize(skip + 1, None);
        }
        script[skip] = Some(outcome);
    }

    pub fn ignore_switches(&self) {
        self.honor_switches.store(false, Ordering::SeqCst);
    }

    /// Keep reporting the previous ledger for `reads` reads after a switch
    pub fn lag_switches(&self, reads: usize) {
        self.switch_lag.store(reads, Ordering::SeqCst);
    }

    pub fn set_deposit_minimum(&self, minimum: Option<u128>) {
        *self.deposit_minimum.lock() = minimum;
    }

    /// Calls that were actually submitted
    pub fn sent(&self) -> Vec<ContractCall> {
        self.sent.lock().clone()
    }

    pub fn switch_requests(&self) -> Vec<LedgerId> {
        self.switch_requests.lock().clone()
    }

    fn apply_approval(&self, call: &ContractCall) {
        let Some((selector, words)) = abi::call_words(&call.data) else {
            return;
        };
        if selector != abi::selector(abi::APPROVE).as_slice() || words.len() != 2 {
            return;
        }
        if let (Some(spender), Some(amount)) =
            (abi::decode_address(words[0]), abi::decode_uint(words[1]))
        {
            self.chain
                .set_allowance(call.ledger, call.to, OWNER, spender, amount);
        }
    }

    fn below_deposit_minimum(&self, call: &ContractCall) -> bool {
        let Some(minimum) = *self.deposit_minimum.lock() else {
            return false;
        };
        match abi::call_words(&call.data) {
            Some((selector, words)) if selector == abi::selector(abi::DEPOSIT).as_slice() => words
                .first()
                .and_then(|word| abi::decode_uint(word))
                .map_or(false, |amount| amount < minimum),
            _ => false,
        }
    }
}

#[async_trait]
impl Signer for MockWallet {
    fn address(&self) -> Address {
        OWNER
    }

    async fn active_ledger(&self) -> Result<LedgerId, SignerError> {
        let mut pending = self.pending_switch.lock();
        let current = *pending;
        match current {
            Some((ledger, 0)) => {
                *self.active.lock() = ledger;
                *pending = None;
            }
            Some((ledger, reads)) => *pending = Some((ledger, reads - 1)),
            None => {}
        }
        Ok(*self.active.lock())
    }

    async fn switch_ledger(&self, ledger: LedgerId) -> SignOutcome<()> {
        self.switch_requests.lock().push(ledger);
        if self.honor_switches.load(Ordering::SeqCst) {
            match self.switch_lag.load(Ordering::SeqCst) {
                0 => *self.active.lock() = ledger,
                reads => *self.pending_switch.lock() = Some((ledger, reads)),
            }
        }
        SignOutcome::Submitted(())
    }

    async fn sign_and_send(&self, call: &ContractCall) -> SignOutcome<TxHash> {
        let scripted = self.script.lock().pop_front().flatten();

        let reverts = match scripted {
            Some(Scripted::Reject) => return SignOutcome::Rejected,
            Some(Scripted::Fail(reason)) => return SignOutcome::Failed(reason),
            Some(Scripted::Revert) => true,
            None => false,
        };

        if self.below_deposit_minimum(call) {
            return SignOutcome::Failed("execution reverted: deposit below minimum".to_string());
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx_hash = TxHash(format!("0x{:064x}", nonce + 1));

        if !reverts {
            self.apply_approval(call);
        }
        self.sent.lock().push(call.clone());
        self.receipts.lock().insert(tx_hash.clone(), !reverts);

        SignOutcome::Submitted(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: &TxHash) -> Result<Receipt, SignerError> {
        let success = self
            .receipts
            .lock()
            .get(tx_hash)
            .copied()
            .ok_or_else(|| SignerError::ConfirmationTimeout(tx_hash.to_string()))?;

        Ok(Receipt {
            tx_hash: tx_hash.clone(),
            success,
            block_number: Some(1),
        })
    }
}

#[derive(Debug, Clone)]
pub enum MockExecution {
    Settle(SettledRoute),
    Reject,
    StepFailed(String),
    /// Wallet stuck on Base when the route starts on Arbitrum
    SwitchFailed,
    ProviderDown,
}

/// Aggregator that returns fixed routes and replays scripted step updates
pub struct MockAggregator {
    routes: Mutex<Vec<Route>>,
    quote_failure: Mutex<Option<u16>>,
    updates: Mutex<Vec<StepUpdate>>,
    execution: Mutex<MockExecution>,
    last_request: Mutex<Option<RouteRequest>>,
    executions: AtomicUsize,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            quote_failure: Mutex::new(None),
            updates: Mutex::new(vec![
                StepUpdate::new(0, LegPhase::Submission, StepStatus::ActionRequired),
                StepUpdate::new(0, LegPhase::Confirmation, StepStatus::Pending),
                StepUpdate::new(0, LegPhase::Relay, StepStatus::Pending),
                StepUpdate::new(0, LegPhase::DestinationSettlement, StepStatus::Done),
            ]),
            execution: Mutex::new(MockExecution::Settle(settled(98_000_000))),
            last_request: Mutex::new(None),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn set_routes(&self, routes: Vec<Route>) {
        *self.routes.lock() = routes;
    }

    pub fn fail_quotes(&self, status: u16) {
        *self.quote_failure.lock() = Some(status);
    }

    pub fn set_updates(&self, updates: Vec<StepUpdate>) {
        *self.updates.lock() = updates;
    }

    pub fn set_execution(&self, execution: MockExecution) {
        *self.execution.lock() = execution;
    }

    pub fn last_request(&self) -> Option<RouteRequest> {
        self.last_request.lock().clone()
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteAggregator for MockAggregator {
    async fn quote(&self, request: &RouteRequest) -> Result<Vec<Route>, ProviderError> {
        *self.last_request.lock() = Some(request.clone());

        if let Some(status) = *self.quote_failure.lock() {
            return Err(ProviderError::Status {
                status,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.routes.lock().clone())
    }

    async fn execute(
        &self,
        _route: &Route,
        updates: StepUpdateSender,
    ) -> Result<SettledRoute, ExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        let scripted = self.updates.lock().clone();
        for update in scripted {
            let _ = updates.send(update);
            tokio::task::yield_now().await;
        }

        let execution = self.execution.lock().clone();
        match execution {
            MockExecution::Settle(settled) => Ok(settled),
            MockExecution::Reject => Err(ExecutionError::Rejected),
            MockExecution::StepFailed(reason) => Err(ExecutionError::StepFailed { step: 0, reason }),
            MockExecution::SwitchFailed => Err(ExecutionError::ChainSwitchFailed {
                expected: LedgerId::ARBITRUM,
                actual: Some(LedgerId::BASE),
            }),
            MockExecution::ProviderDown => Err(ExecutionError::Provider(ProviderError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            })),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Keeps every event it is given
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events.lock().iter().map(|event| event.phase).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

/// An orchestrator wired to mocks, with a funded owner on Arbitrum.
/// Progress goes both to `reporter` and to the `progress` channel.
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub wallet: Arc<MockWallet>,
    pub aggregator: Arc<MockAggregator>,
    pub reporter: Arc<RecordingReporter>,
    pub progress: watch::Receiver<ProgressEvent>,
    pub orchestrator: FundingOrchestrator,
}

impl Harness {
    pub fn new(mode: FundingMode) -> Self {
        let chain = Arc::new(MockChain::new());
        chain.set_balance(LedgerId::ARBITRUM, AssetRef::Contract(ARB_USDC), OWNER, 1_000_000_000);
        chain.set_balance(LedgerId::ARBITRUM, AssetRef::Native, OWNER, 10u128.pow(18));
        chain.fund_settlement(98_000_000);

        let wallet = Arc::new(MockWallet::new(chain.clone(), LedgerId::ARBITRUM));
        let aggregator = Arc::new(MockAggregator::new());
        aggregator.set_routes(vec![route(100_000_000, 98_500_000)]);
        let reporter = Arc::new(RecordingReporter::new());
        let (channel, progress) = ChannelReporter::new(ProgressEvent::from(&Session::new()));
        let recording: Arc<dyn ProgressReporter> = reporter.clone();
        let channel: Arc<dyn ProgressReporter> = Arc::new(channel);

        let allowances = Arc::new(AllowanceManager::new(chain.clone(), wallet.clone()));
        let orchestrator = FundingOrchestrator::new(
            Arc::new(catalog()),
            wallet.clone(),
            BalanceVerifier::new(chain.clone()),
            RouteResolver::new(aggregator.clone(), dec!(0.005), RouteOrder::Recommended),
            Arc::new(BridgeExecutor::new(
                aggregator.clone(),
                DESTINATION,
                settlement_asset(),
                dec!(0.005),
            )),
            Arc::new(DepositExecutor::new(
                wallet.clone(),
                BalanceVerifier::new(chain.clone()),
                allowances,
                deposit_config(),
            )),
            Arc::new(FanoutReporter::new(vec![recording, channel.clone()])),
            OrchestratorConfig { mode },
        );
        channel.report(&orchestrator.snapshot());

        Self {
            chain,
            wallet,
            aggregator,
            reporter,
            progress,
            orchestrator,
        }
    }
}
