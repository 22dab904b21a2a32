use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::FundingError;
use crate::funding::deposit::DepositReceipt;
use crate::ledger::models::{Asset, LedgerId, TransferIntent, TxHash};
use crate::routing::models::{LegPhase, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    SelectLedger,
    SelectAsset,
    EnterAmount,
    Confirm,
    Bridging,
    Depositing,
    Success,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::SelectLedger => "SELECT_LEDGER",
            Phase::SelectAsset => "SELECT_ASSET",
            Phase::EnterAmount => "ENTER_AMOUNT",
            Phase::Confirm => "CONFIRM",
            Phase::Bridging => "BRIDGING",
            Phase::Depositing => "DEPOSITING",
            Phase::Success => "SUCCESS",
            Phase::Error => "ERROR",
        }
    }

    /// Left only through reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Success | Phase::Error)
    }

    /// An external operation is running
    pub fn is_pending(&self) -> bool {
        matches!(self, Phase::Bridging | Phase::Depositing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse bridge progress shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStage {
    Sending,
    Settling,
}

impl From<LegPhase> for BridgeStage {
    fn from(phase: LegPhase) -> Self {
        match phase {
            LegPhase::Submission | LegPhase::Confirmation => BridgeStage::Sending,
            LegPhase::Relay | LegPhase::DestinationSettlement => BridgeStage::Settling,
        }
    }
}

/// Quote details kept for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub id: String,
    pub tools: Vec<String>,
    pub to_amount: String,
    pub to_amount_min: String,
}

impl RouteSummary {
    pub fn new(route: &Route, destination_asset: &Asset) -> Self {
        Self {
            id: route.id.clone(),
            tools: route.tools(),
            to_amount: destination_asset.format(route.to_amount),
            to_amount_min: destination_asset.format(route.to_amount_min),
        }
    }
}

/// The single orchestration session.
///
/// `cursor` and `bridge_stage` only move forward; use the `advance_*`
/// methods rather than assigning them.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub phase: Phase,
    pub ledger: Option<LedgerId>,
    pub asset: Option<Asset>,
    /// Source is the destination ledger, so there is nothing to bridge
    pub deposit_only: bool,
    pub intent: Option<TransferIntent>,
    pub route: Option<Route>,
    pub quote: Option<RouteSummary>,
    pub steps: Vec<String>,
    cursor: usize,
    bridge_stage: Option<BridgeStage>,
    /// Verified amount received on the destination ledger
    pub bridged_units: Option<u128>,
    pub bridged_amount: Option<String>,
    pub tx_hashes: Vec<TxHash>,
    pub error: Option<FundingError>,
    pub deposit: Option<DepositReceipt>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::SelectLedger,
            ledger: None,
            asset: None,
            deposit_only: false,
            intent: None,
            route: None,
            quote: None,
            steps: Vec::new(),
            cursor: 0,
            bridge_stage: None,
            bridged_units: None,
            bridged_amount: None,
            tx_hashes: Vec::new(),
            error: None,
            deposit: None,
            started_at: Utc::now(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn bridge_stage(&self) -> Option<BridgeStage> {
        self.bridge_stage
    }

    /// Move the cursor to `to` unless it is already past it
    pub fn advance_cursor(&mut self, to: usize) {
        let to = to.min(self.steps.len());
        self.cursor = self.cursor.max(to);
    }

    /// Fold a stage in; returns whether it moved forward
    pub fn advance_stage(&mut self, stage: BridgeStage) -> bool {
        match self.bridge_stage {
            Some(current) if current >= stage => false,
            _ => {
                self.bridge_stage = Some(stage);
                true
            }
        }
    }

    pub fn record_tx(&mut self, tx_hash: TxHash) {
        if !self.tx_hashes.contains(&tx_hash) {
            self.tx_hashes.push(tx_hash);
        }
    }

    /// Forget everything entered from `EnterAmount` on. Only valid before
    /// a bridge settles; the next confirmation is a new transfer.
    pub fn clear_amount(&mut self) {
        self.intent = None;
        self.route = None;
        self.quote = None;
        self.steps.clear();
        self.cursor = 0;
        self.bridge_stage = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
