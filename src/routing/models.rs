use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ledger::models::{Address, AssetRef, LedgerId, TxHash};

/// Provider-side ordering preference for candidate routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteOrder {
    #[default]
    Recommended,
    Cheapest,
    Fastest,
}

impl RouteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOrder::Recommended => "RECOMMENDED",
            RouteOrder::Cheapest => "CHEAPEST",
            RouteOrder::Fastest => "FASTEST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Pending,
    ActionRequired,
    Done,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed)
    }
}

/// Route discovery request
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub from_ledger: LedgerId,
    pub from_asset: AssetRef,
    pub to_ledger: LedgerId,
    pub to_asset: AssetRef,
    pub from_amount: u128,
    pub from_address: Address,
    pub to_address: Address,
    /// Tolerance as a fraction (0.005 = 0.5%)
    pub slippage: Decimal,
    pub order: RouteOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStep {
    pub id: String,
    pub tool: String,
    pub from_ledger: LedgerId,
    pub to_ledger: LedgerId,
    pub from_asset: AssetRef,
    pub from_amount: u128,
    /// Spender the provider needs approved before the step's transaction
    pub approval_address: Option<Address>,
    pub status: StepStatus,
    /// Provider payload, sent back verbatim when requesting the transaction
    #[serde(skip)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub id: String,
    pub from_ledger: LedgerId,
    pub to_ledger: LedgerId,
    pub from_asset: AssetRef,
    pub to_asset: AssetRef,
    pub from_amount: u128,
    pub to_amount: u128,
    pub to_amount_min: u128,
    pub steps: Vec<RouteStep>,
}

impl Route {
    pub fn tools(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.tool.clone()).collect()
    }

    pub fn delivers_to(&self, ledger: LedgerId, asset: &AssetRef) -> bool {
        self.to_ledger == ledger && &self.to_asset == asset
    }
}

/// Where a leg of a bridge transfer currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegPhase {
    Submission,
    Confirmation,
    Relay,
    DestinationSettlement,
}

/// Asynchronous progress report from the execution engine
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub step: usize,
    pub phase: LegPhase,
    pub status: StepStatus,
    pub tx_hash: Option<TxHash>,
}

impl StepUpdate {
    pub fn new(step: usize, phase: LegPhase, status: StepStatus) -> Self {
        Self {
            step,
            phase,
            status,
            tx_hash: None,
        }
    }

    pub fn with_tx(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }
}

pub type StepUpdateSender = mpsc::UnboundedSender<StepUpdate>;

/// What the provider reports once it stops executing a route.
///
/// Nothing here is trusted: the bridge executor verifies it before the
/// transfer counts as landed.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledRoute {
    pub route_id: String,
    pub step_statuses: Vec<StepStatus>,
    pub received_amount: Option<u128>,
    pub received_asset: Option<AssetRef>,
    /// Ledger the provider says the funds arrived on
    pub received_ledger: Option<LedgerId>,
    pub tx_hashes: Vec<TxHash>,
}
