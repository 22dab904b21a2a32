use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::error::{BridgeError, ExecutionError};
use crate::funding::session::BridgeStage;
use crate::ledger::models::{Asset, LedgerId, TxHash};
use crate::routing::aggregator::RouteAggregator;
use crate::routing::models::{Route, SettledRoute, StepStatus, StepUpdate};
use crate::routing::slippage::RealizedSlippage;

/// A bridge transfer that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    /// Smallest units of the settlement asset that landed on the destination
    pub received_amount: u128,
    pub tx_hashes: Vec<TxHash>,
}

/// Executes a route through the aggregator and verifies it independently.
///
/// The provider saying "done" is never enough: every step must be done and
/// a positive amount must have arrived. When the provider names the
/// receiving ledger or token, they must be the destination and the
/// settlement asset.
pub struct BridgeExecutor {
    aggregator: Arc<dyn RouteAggregator>,
    destination: LedgerId,
    settlement_asset: Asset,
    slippage_tolerance: Decimal,
}

impl BridgeExecutor {
    pub fn new(
        aggregator: Arc<dyn RouteAggregator>,
        destination: LedgerId,
        settlement_asset: Asset,
        slippage_tolerance: Decimal,
    ) -> Self {
        Self {
            aggregator,
            destination,
            settlement_asset,
            slippage_tolerance,
        }
    }

    /// Execute `route`, calling `on_stage` each time the coarse stage moves
    /// forward. Step updates are drained concurrently with the execution.
    #[instrument(skip(self, route, on_stage), fields(route_id = %route.id))]
    pub async fn execute<F>(&self, route: &Route, mut on_stage: F) -> Result<BridgeOutcome, BridgeError>
    where
        F: FnMut(BridgeStage) + Send,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StepUpdate>();
        let mut stage: Option<BridgeStage> = None;
        // Index of the last step whose transaction went out
        let mut submitted: Option<usize> = None;

        let mut apply = |update: StepUpdate| {
            debug!(
                "Step {} update: {:?} {:?} {:?}",
                update.step, update.phase, update.status, update.tx_hash
            );
            if update.tx_hash.is_some() {
                submitted = Some(submitted.map_or(update.step, |last| last.max(update.step)));
            }
            let next = BridgeStage::from(update.phase);
            if stage.map_or(true, |current| next > current) {
                stage = Some(next);
                on_stage(next);
            }
        };

        info!("Starting bridge via {}", self.aggregator.name());

        let execution = self.aggregator.execute(route, sender);
        tokio::pin!(execution);

        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                Some(update) = receiver.recv() => apply(update),
            }
        };

        while let Ok(update) = receiver.try_recv() {
            apply(update);
        }

        let settled = result.map_err(|e| Self::classify(e, submitted))?;

        let received_amount = self.verify(&settled)?;
        self.log_slippage(route, received_amount);

        info!(
            "Bridge verified: {} {} received on ledger {}",
            self.settlement_asset.format(received_amount),
            self.settlement_asset.symbol,
            self.destination
        );

        Ok(BridgeOutcome {
            received_amount,
            tx_hashes: settled.tx_hashes,
        })
    }

    /// Once a step's transaction is out, funds may be between ledgers and
    /// declining or failing a later prompt can no longer be retried from
    /// the start
    fn classify(error: ExecutionError, submitted: Option<usize>) -> BridgeError {
        match (error, submitted) {
            (ExecutionError::Rejected, None) => BridgeError::Rejected,
            (ExecutionError::Rejected, Some(step)) => BridgeError::Incomplete(format!(
                "a later signature was declined after step {} was submitted",
                step
            )),
            (ExecutionError::ChainSwitchFailed { expected, actual }, None) => {
                BridgeError::ChainSwitchFailed { expected, actual }
            }
            (ExecutionError::ChainSwitchFailed { expected, .. }, Some(step)) => {
                BridgeError::Incomplete(format!(
                    "wallet did not switch to ledger {} after step {} was submitted",
                    expected, step
                ))
            }
            (ExecutionError::Provider(e), _) => BridgeError::Provider(e.to_string()),
            (ExecutionError::StepFailed { step, reason }, _) => {
                BridgeError::Incomplete(format!("step {} failed: {}", step, reason))
            }
        }
    }

    /// The verification gate
    pub fn verify(&self, settled: &SettledRoute) -> Result<u128, BridgeError> {
        if settled.step_statuses.is_empty() {
            return Err(BridgeError::Incomplete("route reported no steps".to_string()));
        }

        if let Some((index, status)) = settled
            .step_statuses
            .iter()
            .enumerate()
            .find(|(_, status)| **status != StepStatus::Done)
        {
            return Err(BridgeError::Incomplete(format!(
                "step {} is {:?}",
                index, status
            )));
        }

        let received = match settled.received_amount {
            Some(amount) if amount > 0 => amount,
            _ => {
                return Err(BridgeError::Incomplete(
                    "no amount received on the destination ledger".to_string(),
                ))
            }
        };

        if let Some(ledger) = settled.received_ledger {
            if ledger != self.destination {
                return Err(BridgeError::Incomplete(format!(
                    "funds arrived on ledger {} instead of {}",
                    ledger, self.destination
                )));
            }
        }

        if let Some(asset) = &settled.received_asset {
            if *asset != self.settlement_asset.reference {
                return Err(BridgeError::Incomplete(format!(
                    "received {:?} instead of {}",
                    asset, self.settlement_asset.symbol
                )));
            }
        }

        Ok(received)
    }

    fn log_slippage(&self, route: &Route, received: u128) {
        let Some(slippage) = RealizedSlippage::calculate(
            route.to_amount,
            received,
            self.settlement_asset.decimals,
            self.slippage_tolerance,
        ) else {
            return;
        };

        if slippage.is_acceptable {
            debug!("Realized slippage: {}", slippage.to_display_string());
        } else {
            warn!(
                "Realized slippage above tolerance: {}",
                slippage.to_display_string()
            );
        }
    }
}
