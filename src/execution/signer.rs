use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{LedgerSwitchError, SignerError};
use crate::ledger::models::{Address, LedgerId, TxHash};

/// A transaction for the user to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub ledger: LedgerId,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: u128,
}

impl ContractCall {
    pub fn new(ledger: LedgerId, to: Address, data: Vec<u8>) -> Self {
        Self {
            ledger,
            to,
            data,
            value: 0,
        }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Outcome of anything that prompts the user.
///
/// Rejection is decided once, where the wallet answers, so callers never
/// pattern-match wallet error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome<T> {
    Submitted(T),
    Rejected,
    Failed(String),
}

impl<T> SignOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SignOutcome<U> {
        match self {
            SignOutcome::Submitted(value) => SignOutcome::Submitted(f(value)),
            SignOutcome::Rejected => SignOutcome::Rejected,
            SignOutcome::Failed(reason) => SignOutcome::Failed(reason),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SignOutcome::Rejected)
    }
}

/// The user's wallet.
///
/// `active_ledger` must query the wallet itself on every call; cached
/// connection state lags behind ledger switches.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Account that signs and owns the funds
    fn address(&self) -> Address;

    async fn active_ledger(&self) -> Result<LedgerId, SignerError>;

    async fn switch_ledger(&self, ledger: LedgerId) -> SignOutcome<()>;

    async fn sign_and_send(&self, call: &ContractCall) -> SignOutcome<TxHash>;

    async fn await_confirmation(&self, tx_hash: &TxHash) -> Result<Receipt, SignerError>;
}

/// How long to keep re-reading the wallet after asking it to switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SwitchPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// Make `expected` the wallet's active ledger.
///
/// The wallet is asked once, then re-read up to `policy.attempts` times.
/// A failed switch request is not final: some wallets report an error and
/// switch anyway.
pub async fn ensure_active_ledger(
    signer: &dyn Signer,
    expected: LedgerId,
    policy: SwitchPolicy,
) -> Result<(), LedgerSwitchError> {
    let mut actual = match signer.active_ledger().await {
        Ok(active) if active == expected => return Ok(()),
        Ok(active) => Some(active),
        Err(e) => {
            warn!("Could not read active ledger: {}", e);
            None
        }
    };

    info!("Switching wallet from {:?} to ledger {}", actual, expected);

    match signer.switch_ledger(expected).await {
        SignOutcome::Submitted(()) => {}
        SignOutcome::Rejected => return Err(LedgerSwitchError::Rejected),
        SignOutcome::Failed(reason) => warn!("Ledger switch request failed: {}", reason),
    }

    for attempt in 1..=policy.attempts {
        match signer.active_ledger().await {
            Ok(active) if active == expected => return Ok(()),
            Ok(active) => actual = Some(active),
            Err(e) => warn!("Active ledger read {} failed: {}", attempt, e),
        }
        tokio::time::sleep(policy.interval).await;
    }

    Err(LedgerSwitchError::NotSwitched { expected, actual })
}

/// EIP-1193 "user rejected request"
pub const USER_REJECTED_CODE: i64 = 4001;

const REJECTION_PHRASES: &[&str] = &[
    "user rejected",
    "user denied",
    "rejected the request",
    "request rejected",
    "user cancelled",
    "user canceled",
    "action_rejected",
];

/// Whether a wallet error means the user declined the prompt
pub fn is_user_rejection(code: Option<i64>, message: &str) -> bool {
    if code == Some(USER_REJECTED_CODE) {
        return true;
    }

    let message = message.to_lowercase();
    REJECTION_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::testing::{MockChain, MockWallet};
    use std::sync::Arc;

    #[test]
    fn test_rejection_by_code() {
        assert!(is_user_rejection(Some(4001), "anything"));
        assert!(!is_user_rejection(Some(-32000), "execution reverted"));
    }

    #[test]
    fn test_rejection_by_message() {
        assert!(is_user_rejection(None, "MetaMask Tx Signature: User denied transaction signature."));
        assert!(is_user_rejection(None, "User rejected the request."));
        assert!(is_user_rejection(Some(-32603), "ACTION_REJECTED"));
        assert!(!is_user_rejection(None, "insufficient funds for gas"));
    }

    fn policy() -> SwitchPolicy {
        SwitchPolicy {
            attempts: 3,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_switch_waits_out_a_lagging_wallet() {
        let wallet = MockWallet::new(Arc::new(MockChain::new()), LedgerId::BASE);
        wallet.lag_switches(2);

        ensure_active_ledger(&wallet, LedgerId::ARBITRUM, policy())
            .await
            .unwrap();

        assert_eq!(wallet.switch_requests(), vec![LedgerId::ARBITRUM]);
    }

    #[tokio::test]
    async fn test_switch_gives_up_after_attempts() {
        let wallet = MockWallet::new(Arc::new(MockChain::new()), LedgerId::BASE);
        wallet.ignore_switches();

        let result = ensure_active_ledger(&wallet, LedgerId::ARBITRUM, policy()).await;

        assert_eq!(
            result,
            Err(LedgerSwitchError::NotSwitched {
                expected: LedgerId::ARBITRUM,
                actual: Some(LedgerId::BASE),
            })
        );
    }

    #[tokio::test]
    async fn test_no_switch_when_already_active() {
        let wallet = MockWallet::new(Arc::new(MockChain::new()), LedgerId::ARBITRUM);

        ensure_active_ledger(&wallet, LedgerId::ARBITRUM, policy())
            .await
            .unwrap();

        assert!(wallet.switch_requests().is_empty());
    }

    #[test]
    fn test_outcome_map_keeps_classification() {
        let submitted: SignOutcome<u8> = SignOutcome::Submitted(1);
        assert_eq!(submitted.map(|v| v + 1), SignOutcome::Submitted(2));

        let rejected: SignOutcome<u8> = SignOutcome::Rejected;
        assert!(rejected.map(|v| v + 1).is_rejected());
    }
}
