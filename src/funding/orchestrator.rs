use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::error::{FundingError, TransitionError};
use crate::execution::signer::Signer;
use crate::funding::balance::BalanceVerifier;
use crate::funding::bridge::BridgeExecutor;
use crate::funding::deposit::DepositExecutor;
use crate::funding::progress::{ProgressEvent, ProgressReporter};
use crate::funding::session::{Phase, RouteSummary, Session};
use crate::funding::{FundingMode, OrchestratorConfig};
use crate::ledger::catalog::LedgerCatalog;
use crate::ledger::models::{LedgerId, SubAccount, TransferIntent};
use crate::routing::resolver::RouteResolver;

/// The funding state machine.
///
/// Owns exactly one session. Every operation is serialized by `&mut self`;
/// the HTTP layer wraps the orchestrator in a mutex and refuses, rather than
/// queues, requests that arrive while an operation is running.
///
/// ```text
/// SelectLedger -> SelectAsset -> EnterAmount -> Confirm -> Bridging -> Depositing -> Success
///       \______ destination ledger ______/         ^            |            |
///                                                  |__ rejected_|____________|
///                                    any other failure ---------------------> Error
/// ```
pub struct FundingOrchestrator {
    catalog: Arc<LedgerCatalog>,
    signer: Arc<dyn Signer>,
    balances: BalanceVerifier,
    resolver: RouteResolver,
    bridge: Arc<BridgeExecutor>,
    deposit: Arc<DepositExecutor>,
    reporter: Arc<dyn ProgressReporter>,
    config: OrchestratorConfig,
    session: Session,
}

impl FundingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<LedgerCatalog>,
        signer: Arc<dyn Signer>,
        balances: BalanceVerifier,
        resolver: RouteResolver,
        bridge: Arc<BridgeExecutor>,
        deposit: Arc<DepositExecutor>,
        reporter: Arc<dyn ProgressReporter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            signer,
            balances,
            resolver,
            bridge,
            deposit,
            reporter,
            config,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &LedgerCatalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> ProgressEvent {
        ProgressEvent::from(&self.session)
    }

    fn publish(&self) {
        self.reporter.report(&self.snapshot());
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> Result<(), TransitionError> {
        let phase = self.session.phase;
        if phase == expected {
            Ok(())
        } else if phase.is_terminal() {
            Err(TransitionError::SessionClosed)
        } else if phase.is_pending() {
            Err(TransitionError::OperationPending)
        } else {
            Err(TransitionError::InvalidPhase { phase, operation })
        }
    }

    /// Record a classified failure. Rejections go back to `Confirm` without
    /// an error; everything else is terminal.
    fn fail(&mut self, failure: FundingError) {
        if failure.is_benign() {
            info!(session = %self.session.id, "Signature declined, back to confirmation");
            self.session.phase = Phase::Confirm;
            self.session.error = None;
        } else {
            error!(session = %self.session.id, code = failure.code(), "Funding failed: {}", failure);
            self.session.phase = Phase::Error;
            self.session.error = Some(failure);
        }
        self.publish();
    }

    pub fn select_ledger(&mut self, ledger: LedgerId) -> Result<ProgressEvent, TransitionError> {
        self.expect_phase(Phase::SelectLedger, "select_ledger")?;

        let name = self
            .catalog
            .ledger(ledger)
            .map(|l| l.name.clone())
            .ok_or(TransitionError::UnknownLedger(ledger))?;

        let deposit_only = self.catalog.is_destination(ledger);
        if deposit_only && self.config.mode == FundingMode::BridgeOnly {
            return Err(TransitionError::DestinationAsSource(ledger));
        }

        self.session.ledger = Some(ledger);
        self.session.deposit_only = deposit_only;

        if deposit_only {
            self.session.asset = Some(self.catalog.settlement_asset().clone());
            self.session.phase = Phase::EnterAmount;
        } else {
            self.session.phase = Phase::SelectAsset;
        }

        info!(session = %self.session.id, "Selected ledger {} ({})", name, ledger);
        self.publish();
        Ok(self.snapshot())
    }

    pub fn select_asset(&mut self, symbol: &str) -> Result<ProgressEvent, TransitionError> {
        self.expect_phase(Phase::SelectAsset, "select_asset")?;

        let ledger = self.session.ledger.ok_or(TransitionError::InvalidPhase {
            phase: self.session.phase,
            operation: "select_asset",
        })?;

        let asset = self
            .catalog
            .asset(ledger, symbol)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownAsset {
                ledger,
                symbol: symbol.to_string(),
            })?;

        info!(session = %self.session.id, "Selected asset {}", asset.symbol);
        self.session.asset = Some(asset);
        self.session.phase = Phase::EnterAmount;
        self.publish();
        Ok(self.snapshot())
    }

    fn step_descriptions(&self, intent: &TransferIntent) -> Vec<String> {
        let symbol = &intent.source_asset.symbol;
        let destination = self
            .catalog
            .ledger(self.catalog.destination())
            .map(|l| l.name.as_str())
            .unwrap_or("destination");

        if self.session.deposit_only {
            return vec![format!(
                "Deposit {} {} into {} account",
                intent.amount, symbol, intent.sub_account
            )];
        }

        let source = self
            .catalog
            .ledger(intent.source_ledger)
            .map(|l| l.name.as_str())
            .unwrap_or("source");
        let send = format!(
            "Send {} {} from {} to {}",
            intent.amount, symbol, source, destination
        );

        match self.config.mode {
            FundingMode::BridgeOnly => vec![send],
            FundingMode::AutoDeposit => vec![
                send,
                format!("Deposit into {} account", intent.sub_account),
            ],
        }
    }

    /// Parse the amount, check the source balance and resolve a route.
    ///
    /// Pre-flight failures (insufficient funds, no route) end the session in
    /// `Error`; a malformed amount leaves it in `EnterAmount`.
    #[instrument(skip(self), fields(session = %self.session.id))]
    pub async fn enter_amount(
        &mut self,
        amount: &str,
        sub_account: SubAccount,
    ) -> Result<ProgressEvent, TransitionError> {
        self.expect_phase(Phase::EnterAmount, "enter_amount")?;

        let (ledger, asset) = match (self.session.ledger, self.session.asset.clone()) {
            (Some(ledger), Some(asset)) => (ledger, asset),
            _ => {
                return Err(TransitionError::InvalidPhase {
                    phase: self.session.phase,
                    operation: "enter_amount",
                })
            }
        };

        let intent = TransferIntent::new(ledger, asset, amount, sub_account)?;
        self.session.steps = self.step_descriptions(&intent);
        self.session.intent = Some(intent.clone());

        let owner = self.signer.address();
        match self
            .balances
            .check(ledger, &intent.source_asset, &owner, intent.amount_units)
            .await
        {
            Ok(check) if !check.sufficient => {
                self.fail(FundingError::InsufficientBalance {
                    have: check.formatted,
                    need: intent.amount.clone(),
                });
                return Ok(self.snapshot());
            }
            Ok(_) => {}
            Err(e) => warn!("Balance pre-check failed, proceeding: {}", e),
        }

        if !self.session.deposit_only {
            let settlement = self.catalog.settlement_asset().clone();
            match self
                .resolver
                .best(&intent, self.catalog.destination(), &settlement, owner)
                .await
            {
                Ok(route) => {
                    self.session.quote = Some(RouteSummary::new(&route, &settlement));
                    self.session.route = Some(route);
                }
                Err(e) => {
                    self.fail(e.into());
                    return Ok(self.snapshot());
                }
            }
        }

        self.session.phase = Phase::Confirm;
        self.publish();
        Ok(self.snapshot())
    }

    /// Whether `confirm` would be accepted right now
    pub fn can_confirm(&self) -> Result<(), TransitionError> {
        self.expect_phase(Phase::Confirm, "confirm")
    }

    /// Run the saga from `Confirm`.
    ///
    /// When a bridge has already been verified (the user declined a deposit
    /// signature earlier) this resumes at the deposit.
    #[instrument(skip(self), fields(session = %self.session.id))]
    pub async fn confirm(&mut self) -> Result<ProgressEvent, TransitionError> {
        self.can_confirm()?;

        let intent = self
            .session
            .intent
            .clone()
            .ok_or(TransitionError::InvalidPhase {
                phase: self.session.phase,
                operation: "confirm",
            })?;
        self.session.error = None;

        if self.session.deposit_only {
            self.run_deposit(intent.amount_units, intent.sub_account).await;
            return Ok(self.snapshot());
        }

        let amount = match self.session.bridged_units {
            Some(amount) => {
                info!("Bridge already verified, resuming at deposit");
                amount
            }
            None => match self.run_bridge().await {
                Some(amount) => amount,
                None => return Ok(self.snapshot()),
            },
        };

        match self.config.mode {
            FundingMode::BridgeOnly => {
                let total = self.session.steps.len();
                self.session.advance_cursor(total);
                self.session.phase = Phase::Success;
                info!("Bridge-only funding complete");
                self.publish();
            }
            FundingMode::AutoDeposit => self.run_deposit(amount, intent.sub_account).await,
        }

        Ok(self.snapshot())
    }

    /// Bridge and verify; `None` when the session was moved out of
    /// `Bridging` by a failure
    async fn run_bridge(&mut self) -> Option<u128> {
        let Some(route) = self.session.route.clone() else {
            self.fail(FundingError::NoRouteFound);
            return None;
        };

        self.session.phase = Phase::Bridging;
        self.publish();

        let result = {
            let session = &mut self.session;
            let reporter = &self.reporter;
            self.bridge
                .execute(&route, |stage| {
                    if session.advance_stage(stage) {
                        reporter.report(&ProgressEvent::from(&*session));
                    }
                })
                .await
        };

        match result {
            Ok(outcome) => {
                for tx_hash in outcome.tx_hashes {
                    self.session.record_tx(tx_hash);
                }

                let settlement = self.catalog.settlement_asset();
                self.session.bridged_units = Some(outcome.received_amount);
                self.session.bridged_amount = Some(settlement.format(outcome.received_amount));
                self.session.advance_cursor(1);
                self.publish();

                Some(outcome.received_amount)
            }
            Err(e) => {
                self.fail(e.into());
                None
            }
        }
    }

    async fn run_deposit(&mut self, amount: u128, sub_account: SubAccount) {
        self.session.phase = Phase::Depositing;
        self.publish();

        match self.deposit.execute(amount, sub_account).await {
            Ok(receipt) => {
                info!(
                    "Deposited {} into {} ({})",
                    receipt.formatted, receipt.sub_account, receipt.tx_hash
                );
                self.session.record_tx(receipt.tx_hash.clone());
                self.session.deposit = Some(receipt);
                let total = self.session.steps.len();
                self.session.advance_cursor(total);
                self.session.phase = Phase::Success;
                self.publish();
            }
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn back(&mut self) -> Result<ProgressEvent, TransitionError> {
        match self.session.phase {
            Phase::Success | Phase::Error => return Err(TransitionError::SessionClosed),
            Phase::Bridging | Phase::Depositing => return Err(TransitionError::OperationPending),
            Phase::SelectLedger => return Err(TransitionError::AtStart),
            Phase::SelectAsset => {
                self.session.ledger = None;
                self.session.phase = Phase::SelectLedger;
            }
            Phase::EnterAmount => {
                self.session.clear_amount();
                self.session.asset = None;
                if self.session.deposit_only {
                    self.session.ledger = None;
                    self.session.deposit_only = false;
                    self.session.phase = Phase::SelectLedger;
                } else {
                    self.session.phase = Phase::SelectAsset;
                }
            }
            Phase::Confirm => {
                if self.session.bridged_units.is_some() {
                    return Err(TransitionError::BridgeSettled);
                }
                self.session.clear_amount();
                self.session.phase = Phase::EnterAmount;
            }
        }

        self.publish();
        Ok(self.snapshot())
    }

    /// Start over with a fresh session
    pub fn reset(&mut self) -> ProgressEvent {
        if let (Some(amount), None) = (&self.session.bridged_amount, &self.session.deposit) {
            warn!(
                session = %self.session.id,
                "Resetting with {} bridged but not deposited",
                amount
            );
        }

        self.session = Session::new();
        info!(session = %self.session.id, "Session reset");
        self.publish();
        self.snapshot()
    }
}
