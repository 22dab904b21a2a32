use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::FundingError;
use crate::funding::session::{BridgeStage, Phase, RouteSummary, Session};
use crate::ledger::models::{LedgerId, SubAccount, TxHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub code: String,
    pub message: String,
}

impl From<&FundingError> for ErrorView {
    fn from(error: &FundingError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.user_message(),
        }
    }
}

/// Session state published on every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub session_id: Uuid,
    pub phase: Phase,
    pub ledger: Option<LedgerId>,
    pub asset: Option<String>,
    pub amount: Option<String>,
    pub sub_account: Option<SubAccount>,
    pub route: Option<RouteSummary>,
    pub step_index: usize,
    pub step_descriptions: Vec<String>,
    pub bridge_stage: Option<BridgeStage>,
    pub bridged_amount: Option<String>,
    pub tx_hashes: Vec<TxHash>,
    pub deposit_tx: Option<TxHash>,
    pub error: Option<ErrorView>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Session> for ProgressEvent {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            phase: session.phase,
            ledger: session.ledger,
            asset: session.asset.as_ref().map(|asset| asset.symbol.clone()),
            amount: session.intent.as_ref().map(|intent| intent.amount.clone()),
            sub_account: session.intent.as_ref().map(|intent| intent.sub_account),
            route: session.quote.clone(),
            step_index: session.cursor(),
            step_descriptions: session.steps.clone(),
            bridge_stage: session.bridge_stage(),
            bridged_amount: session.bridged_amount.clone(),
            tx_hashes: session.tx_hashes.clone(),
            deposit_tx: session.deposit.as_ref().map(|receipt| receipt.tx_hash.clone()),
            error: session.error.as_ref().map(ErrorView::from),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for progress events
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Keeps the latest event in a watch channel for any number of readers
pub struct ChannelReporter {
    sender: watch::Sender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(initial: ProgressEvent) -> (Self, watch::Receiver<ProgressEvent>) {
        let (sender, receiver) = watch::channel(initial);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: &ProgressEvent) {
        self.sender.send_replace(event.clone());
    }
}

pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: &ProgressEvent) {
        match &event.error {
            Some(view) => error!(
                session = %event.session_id,
                phase = %event.phase,
                code = %view.code,
                "Funding failed: {}",
                view.message
            ),
            None => info!(
                session = %event.session_id,
                phase = %event.phase,
                step = event.step_index,
                steps = event.step_descriptions.len(),
                stage = ?event.bridge_stage,
                "Funding progress"
            ),
        }
    }
}

/// Forwards every event to each inner reporter in order
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl FanoutReporter {
    pub fn new(reporters: Vec<Arc<dyn ProgressReporter>>) -> Self {
        Self { reporters }
    }
}

impl ProgressReporter for FanoutReporter {
    fn report(&self, event: &ProgressEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_keeps_latest_event() {
        let mut session = Session::new();
        let (reporter, receiver) = ChannelReporter::new(ProgressEvent::from(&session));

        session.phase = Phase::SelectAsset;
        reporter.report(&ProgressEvent::from(&session));
        session.phase = Phase::EnterAmount;
        reporter.report(&ProgressEvent::from(&session));

        assert_eq!(receiver.borrow().phase, Phase::EnterAmount);
        assert_eq!(reporter.subscribe().borrow().session_id, session.id);
    }

    #[test]
    fn test_error_view_uses_user_message() {
        let mut session = Session::new();
        session.phase = Phase::Error;
        session.error = Some(FundingError::NoRouteFound);

        let event = ProgressEvent::from(&session);
        let view = event.error.unwrap();
        assert_eq!(view.code, "NO_ROUTE_FOUND");
        assert!(view.message.contains("No route"));
    }

    #[test]
    fn test_fanout_reaches_every_reporter() {
        let session = Session::new();
        let (first, first_rx) = ChannelReporter::new(ProgressEvent::from(&session));
        let (second, second_rx) = ChannelReporter::new(ProgressEvent::from(&session));

        let fanout = FanoutReporter::new(vec![Arc::new(first), Arc::new(LogReporter), Arc::new(second)]);

        let mut next = session.clone();
        next.phase = Phase::SelectAsset;
        fanout.report(&ProgressEvent::from(&next));

        assert_eq!(first_rx.borrow().phase, Phase::SelectAsset);
        assert_eq!(second_rx.borrow().phase, Phase::SelectAsset);
    }
}
