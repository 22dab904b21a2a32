use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::AllowanceError;
use crate::execution::abi;
use crate::execution::reader::ChainReader;
use crate::execution::signer::{ContractCall, SignOutcome, Signer};
use crate::ledger::models::{Address, LedgerId, TxHash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceOutcome {
    AlreadySufficient,
    Approved(TxHash),
}

/// Grants token allowances, only when the current one falls short.
///
/// Calling `ensure` again with an unchanged allowance is a no-op, so every
/// deposit attempt (retries included) runs it unconditionally.
pub struct AllowanceManager {
    reader: Arc<dyn ChainReader>,
    signer: Arc<dyn Signer>,
}

impl AllowanceManager {
    pub fn new(reader: Arc<dyn ChainReader>, signer: Arc<dyn Signer>) -> Self {
        Self { reader, signer }
    }

    #[instrument(skip(self), fields(ledger = %ledger, token = %token, spender = %spender))]
    pub async fn ensure(
        &self,
        ledger: LedgerId,
        token: &Address,
        spender: &Address,
        required: u128,
    ) -> Result<AllowanceOutcome, AllowanceError> {
        let owner = self.signer.address();

        let current = self
            .reader
            .allowance(ledger, token, &owner, spender)
            .await
            .map_err(|e| AllowanceError::Failed(format!("allowance read failed: {}", e)))?;

        if current >= required {
            debug!("Allowance {} covers {}, no approval needed", current, required);
            return Ok(AllowanceOutcome::AlreadySufficient);
        }

        info!("Requesting approval of {} (current allowance {})", required, current);

        let call = ContractCall::new(ledger, *token, abi::encode_approve(spender, required));
        let tx_hash = match self.signer.sign_and_send(&call).await {
            SignOutcome::Submitted(tx_hash) => tx_hash,
            SignOutcome::Rejected => return Err(AllowanceError::Rejected),
            SignOutcome::Failed(reason) => return Err(AllowanceError::Failed(reason)),
        };

        let receipt = self
            .signer
            .await_confirmation(&tx_hash)
            .await
            .map_err(|e| AllowanceError::Failed(e.to_string()))?;

        if !receipt.success {
            return Err(AllowanceError::Failed(format!(
                "approval {} reverted",
                tx_hash
            )));
        }

        match self.reader.allowance(ledger, token, &owner, spender).await {
            Ok(granted) if granted < required => {
                return Err(AllowanceError::Failed(format!(
                    "allowance is {} after approval {}, need {}",
                    granted, tx_hash, required
                )));
            }
            Ok(_) => {}
            Err(e) => warn!("Could not re-read allowance after {}: {}", tx_hash, e),
        }

        info!("Approval {} confirmed", tx_hash);
        Ok(AllowanceOutcome::Approved(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::testing::{self, MockChain, MockWallet, Scripted};

    fn manager(chain: &Arc<MockChain>, wallet: &Arc<MockWallet>) -> AllowanceManager {
        AllowanceManager::new(chain.clone(), wallet.clone())
    }

    #[tokio::test]
    async fn test_equal_allowance_sends_nothing() {
        let chain = Arc::new(MockChain::new());
        let wallet = Arc::new(MockWallet::new(chain.clone(), testing::DESTINATION));
        chain.set_allowance(
            testing::DESTINATION,
            testing::DEST_USDC,
            testing::OWNER,
            testing::CUSTODY,
            98_000_000,
        );

        let outcome = manager(&chain, &wallet)
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 98_000_000)
            .await
            .unwrap();

        assert_eq!(outcome, AllowanceOutcome::AlreadySufficient);
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn test_approves_full_required_amount_once() {
        let chain = Arc::new(MockChain::new());
        let wallet = Arc::new(MockWallet::new(chain.clone(), testing::DESTINATION));
        let manager = manager(&chain, &wallet);
        // approve() overwrites, so a partial allowance is replaced, not topped up
        chain.set_allowance(
            testing::DESTINATION,
            testing::DEST_USDC,
            testing::OWNER,
            testing::CUSTODY,
            2_000_000,
        );

        let first = manager
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 5_000_000)
            .await
            .unwrap();
        let second = manager
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 5_000_000)
            .await
            .unwrap();

        assert!(matches!(first, AllowanceOutcome::Approved(_)));
        assert_eq!(second, AllowanceOutcome::AlreadySufficient);

        let sent = wallet.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, testing::DEST_USDC);
        assert_eq!(
            sent[0].data,
            abi::encode_approve(&testing::CUSTODY, 5_000_000)
        );
    }

    #[tokio::test]
    async fn test_rejection_is_distinguished_from_failure() {
        let chain = Arc::new(MockChain::new());
        let wallet = Arc::new(MockWallet::new(chain.clone(), testing::DESTINATION));
        let manager = manager(&chain, &wallet);

        wallet.script(Scripted::Reject);
        let rejected = manager
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 1)
            .await;
        assert_eq!(rejected, Err(AllowanceError::Rejected));

        wallet.script(Scripted::Revert);
        let reverted = manager
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 1)
            .await;
        assert!(matches!(reverted, Err(AllowanceError::Failed(_))));
    }

    #[tokio::test]
    async fn test_read_failure_is_approval_failure() {
        let chain = Arc::new(MockChain::new());
        let wallet = Arc::new(MockWallet::new(chain.clone(), testing::DESTINATION));
        chain.fail_reads(true);

        let result = manager(&chain, &wallet)
            .ensure(testing::DESTINATION, &testing::DEST_USDC, &testing::CUSTODY, 1)
            .await;

        assert!(matches!(result, Err(AllowanceError::Failed(_))));
        assert!(wallet.sent().is_empty());
    }
}
