use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::funding::session::Phase;
use crate::ledger::models::{Address, Asset, Ledger, LedgerId, SubAccount};

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize, Validate)]
pub struct SelectLedgerRequest {
    #[validate(range(min = 1, message = "must be a chain id"))]
    pub ledger_id: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectAssetRequest {
    #[validate(length(min = 1, max = 16, message = "must be an asset symbol"))]
    pub symbol: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EnterAmountRequest {
    /// Decimal string in display units, e.g. "100.5"
    #[validate(length(min = 1, max = 64, message = "must be a decimal amount"))]
    pub amount: String,
    #[serde(default = "default_sub_account")]
    pub sub_account: SubAccount,
}

fn default_sub_account() -> SubAccount {
    SubAccount::Perp
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LedgersResponse {
    pub destination: LedgerId,
    pub settlement_asset: Asset,
    pub custody_contract: Address,
    pub ledgers: Vec<Ledger>,
}

/// Returned when a confirmation has been handed to the background saga
#[derive(Debug, Serialize)]
pub struct ConfirmAccepted {
    pub session_id: Uuid,
    /// Where to follow the saga's progress
    pub stream: String,
}
