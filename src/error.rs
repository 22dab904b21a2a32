use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::funding::session::Phase;
use crate::ledger::models::LedgerId;

/// Top-level error type for the service surface
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session is busy with another operation")]
    SessionBusy,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Wallet error: {0}")]
    Signer(#[from] SignerError),

    #[error("Routing provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Decimal amount parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,

    #[error("Amount is not a plain decimal number: {0}")]
    Invalid(String),

    #[error("Amount does not fit in 128 bits")]
    Overflow,

    #[error("Unsupported precision: {0} decimals")]
    UnsupportedPrecision(u8),

    #[error("Amount must be greater than zero")]
    Zero,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("Address is not valid hex: {0}")]
    InvalidHex(String),

    #[error("Address must be 20 bytes: {0}")]
    InvalidLength(String),
}

/// JSON-RPC transport errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Decode(String),
}

/// Routing provider (route aggregator) errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum SignerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Wallet exposes no account")]
    NoAccount,

    #[error("Transaction {0} was not confirmed in time")]
    ConfirmationTimeout(String),

    #[error("Malformed wallet response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("No RPC endpoint configured for ledger {0}")]
    UnknownLedger(LedgerId),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Route discovery errors
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("No route found")]
    NoRouteFound,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors raised by a route aggregator while executing a route
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("User rejected a route step signature")]
    Rejected,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Route step {step} failed: {reason}")]
    StepFailed { step: usize, reason: String },

    #[error("Wallet did not switch to ledger {expected} (active: {actual:?})")]
    ChainSwitchFailed {
        expected: LedgerId,
        actual: Option<LedgerId>,
    },
}

/// Why the wallet could not be moved onto a ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerSwitchError {
    #[error("User rejected the ledger switch")]
    Rejected,

    #[error("Wallet did not switch to ledger {expected} (active: {actual:?})")]
    NotSwitched {
        expected: LedgerId,
        actual: Option<LedgerId>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllowanceError {
    #[error("User rejected the approval")]
    Rejected,

    #[error("Approval failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("User rejected a bridge signature")]
    Rejected,

    #[error("Bridge incomplete: {0}")]
    Incomplete(String),

    #[error("Routing provider error: {0}")]
    Provider(String),

    #[error("Wallet did not switch to ledger {expected} (active: {actual:?})")]
    ChainSwitchFailed {
        expected: LedgerId,
        actual: Option<LedgerId>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepositError {
    #[error("User rejected a deposit signature")]
    Rejected,

    #[error("Wallet did not switch to ledger {expected} (active: {actual:?})")]
    ChainSwitchFailed {
        expected: LedgerId,
        actual: Option<LedgerId>,
    },

    #[error("Insufficient destination balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Deposit of {amount} is below the first-deposit minimum")]
    BelowMinimum {
        amount: String,
        minimum: Option<String>,
    },

    #[error("Deposit failed: {0}")]
    Failed(String),
}

/// Classified saga failure, the only error kind stored in a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("Signature request was declined")]
    UserRejected,

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("No route found for this transfer")]
    NoRouteFound,

    #[error("Routing provider error: {0}")]
    ProviderError(String),

    #[error("Bridge transfer could not be verified: {0}")]
    BridgeIncomplete(String),

    #[error("Wallet did not switch to ledger {expected}")]
    ChainSwitchFailed {
        expected: LedgerId,
        actual: Option<LedgerId>,
    },

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Deposit of {amount} is below the first-deposit minimum")]
    DepositBelowMinimum {
        amount: String,
        minimum: Option<String>,
    },

    #[error("Deposit failed: {0}")]
    DepositFailed(String),
}

impl FundingError {
    /// Rejections return the session to `Confirm` without surfacing an error
    pub fn is_benign(&self) -> bool {
        matches!(self, FundingError::UserRejected)
    }

    pub fn code(&self) -> &'static str {
        match self {
            FundingError::UserRejected => "USER_REJECTED",
            FundingError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FundingError::NoRouteFound => "NO_ROUTE_FOUND",
            FundingError::ProviderError(_) => "PROVIDER_ERROR",
            FundingError::BridgeIncomplete(_) => "BRIDGE_INCOMPLETE",
            FundingError::ChainSwitchFailed { .. } => "CHAIN_SWITCH_FAILED",
            FundingError::ApprovalFailed(_) => "APPROVAL_FAILED",
            FundingError::DepositBelowMinimum { .. } => "DEPOSIT_BELOW_MINIMUM",
            FundingError::DepositFailed(_) => "DEPOSIT_FAILED",
        }
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            FundingError::InsufficientBalance { have, need } => format!(
                "Your balance of {} is not enough to send {}. Lower the amount or top up the source account.",
                have, need
            ),
            FundingError::NoRouteFound => {
                "No route is available for this transfer. Try a different asset or amount.".to_string()
            }
            FundingError::ProviderError(_) => {
                "The routing provider is unavailable right now. Please try again shortly.".to_string()
            }
            FundingError::BridgeIncomplete(_) => {
                "The bridge transfer could not be verified on the destination ledger. Check your wallet before trying again.".to_string()
            }
            FundingError::ChainSwitchFailed { expected, .. } => format!(
                "Your wallet did not switch to ledger {}. Switch manually and try again.",
                expected
            ),
            FundingError::DepositBelowMinimum { minimum: Some(minimum), .. } => format!(
                "A first deposit into a new account must be at least {}. Increase the amount and try again.",
                minimum
            ),
            FundingError::DepositBelowMinimum { minimum: None, .. } => {
                "This deposit is below the minimum for a first deposit into a new account. Increase the amount and try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<RouteError> for FundingError {
    fn from(error: RouteError) -> Self {
        match error {
            RouteError::NoRouteFound => FundingError::NoRouteFound,
            RouteError::Provider(e) => FundingError::ProviderError(e.to_string()),
        }
    }
}

impl From<BridgeError> for FundingError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Rejected => FundingError::UserRejected,
            BridgeError::Incomplete(reason) => FundingError::BridgeIncomplete(reason),
            BridgeError::Provider(reason) => FundingError::ProviderError(reason),
            BridgeError::ChainSwitchFailed { expected, actual } => {
                FundingError::ChainSwitchFailed { expected, actual }
            }
        }
    }
}

impl From<LedgerSwitchError> for DepositError {
    fn from(error: LedgerSwitchError) -> Self {
        match error {
            LedgerSwitchError::Rejected => DepositError::Rejected,
            LedgerSwitchError::NotSwitched { expected, actual } => {
                DepositError::ChainSwitchFailed { expected, actual }
            }
        }
    }
}

impl From<DepositError> for FundingError {
    fn from(error: DepositError) -> Self {
        match error {
            DepositError::Rejected => FundingError::UserRejected,
            DepositError::ChainSwitchFailed { expected, actual } => {
                FundingError::ChainSwitchFailed { expected, actual }
            }
            DepositError::InsufficientBalance { have, need } => {
                FundingError::InsufficientBalance { have, need }
            }
            DepositError::ApprovalFailed(reason) => FundingError::ApprovalFailed(reason),
            DepositError::BelowMinimum { amount, minimum } => {
                FundingError::DepositBelowMinimum { amount, minimum }
            }
            DepositError::Failed(reason) => FundingError::DepositFailed(reason),
        }
    }
}

/// State machine misuse: the operation does not fit the current phase
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("'{operation}' is not allowed in phase {phase}")]
    InvalidPhase {
        phase: Phase,
        operation: &'static str,
    },

    #[error("Unknown ledger: {0}")]
    UnknownLedger(LedgerId),

    #[error("Asset {symbol} is not available on ledger {ledger}")]
    UnknownAsset { ledger: LedgerId, symbol: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Session has finished; reset to start over")]
    SessionClosed,

    #[error("An operation is in progress")]
    OperationPending,

    #[error("Already at the first step")]
    AtStart,

    #[error("Bridged funds are waiting to be deposited")]
    BridgeSettled,

    #[error("Ledger {0} is the destination and cannot be a bridge source")]
    DestinationAsSource(LedgerId),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            AppError::SessionBusy => (StatusCode::CONFLICT, "SESSION_BUSY", self.to_string()),
            AppError::Transition(TransitionError::UnknownLedger(_))
            | AppError::Transition(TransitionError::UnknownAsset { .. }) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_SELECTION", self.to_string())
            }
            AppError::Transition(TransitionError::InvalidAmount(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_AMOUNT", self.to_string())
            }
            AppError::Transition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION", self.to_string()),
            AppError::Signer(_) => (
                StatusCode::BAD_GATEWAY,
                "WALLET_ERROR",
                "The wallet endpoint failed".to_string(),
            ),
            AppError::Provider(_) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "The routing provider failed".to_string(),
            ),
            AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<AddressError> for AppError {
    fn from(error: AddressError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Internal(format!("HTTP client error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
