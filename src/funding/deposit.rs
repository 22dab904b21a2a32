use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

use crate::error::{AllowanceError, DepositError};
use crate::execution::abi;
use crate::execution::signer::{ensure_active_ledger, ContractCall, SignOutcome, Signer, SwitchPolicy};
use crate::funding::allowance::{AllowanceManager, AllowanceOutcome};
use crate::funding::balance::BalanceVerifier;
use crate::ledger::models::{Address, Asset, LedgerId, SubAccount, TxHash};

/// Revert texts custody contracts use for an undersized first deposit
const BELOW_MINIMUM_MARKERS: &[&str] = &[
    "first deposit",
    "deposit below min",
    "below minimum deposit",
    "deposit too small",
];

#[derive(Debug, Clone)]
pub struct DepositConfig {
    pub destination: LedgerId,
    pub settlement_asset: Asset,
    pub custody_contract: Address,
    /// Smallest first deposit the venue accepts, in settlement units
    pub first_deposit_minimum: Option<u128>,
    pub switch: SwitchPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub amount: u128,
    pub formatted: String,
    pub sub_account: SubAccount,
    pub selector: u32,
    pub tx_hash: TxHash,
}

/// Moves settled funds from the wallet into a custody sub-account
pub struct DepositExecutor {
    signer: Arc<dyn Signer>,
    balances: BalanceVerifier,
    allowances: Arc<AllowanceManager>,
    config: DepositConfig,
    /// Sub-accounts this process has deposited into; their minimum no
    /// longer applies
    funded: Mutex<HashSet<SubAccount>>,
}

impl DepositExecutor {
    pub fn new(
        signer: Arc<dyn Signer>,
        balances: BalanceVerifier,
        allowances: Arc<AllowanceManager>,
        config: DepositConfig,
    ) -> Self {
        Self {
            signer,
            balances,
            allowances,
            config,
            funded: Mutex::new(HashSet::new()),
        }
    }

    #[instrument(skip(self), fields(destination = %self.config.destination))]
    pub async fn execute(
        &self,
        amount: u128,
        sub_account: SubAccount,
    ) -> Result<DepositReceipt, DepositError> {
        let asset = &self.config.settlement_asset;
        let formatted = asset.format(amount);

        ensure_active_ledger(self.signer.as_ref(), self.config.destination, self.config.switch)
            .await?;
        self.check_balance(amount).await?;

        let mut value = 0;
        match asset.reference.contract() {
            Some(token) => {
                let outcome = self
                    .allowances
                    .ensure(
                        self.config.destination,
                        token,
                        &self.config.custody_contract,
                        amount,
                    )
                    .await
                    .map_err(|e| match e {
                        AllowanceError::Rejected => DepositError::Rejected,
                        AllowanceError::Failed(reason) => DepositError::ApprovalFailed(reason),
                    })?;

                if let AllowanceOutcome::Approved(tx_hash) = outcome {
                    info!("Custody contract approved in {}", tx_hash);
                }
            }
            None => value = amount,
        }

        let selector = sub_account.selector();
        let call = ContractCall::new(
            self.config.destination,
            self.config.custody_contract,
            abi::encode_deposit(amount, selector),
        )
        .with_value(value);

        info!("Depositing {} {} into {}", formatted, asset.symbol, sub_account);

        let tx_hash = match self.signer.sign_and_send(&call).await {
            SignOutcome::Submitted(tx_hash) => tx_hash,
            SignOutcome::Rejected => return Err(DepositError::Rejected),
            SignOutcome::Failed(reason) => return Err(self.classify_failure(amount, reason)),
        };

        let receipt = self
            .signer
            .await_confirmation(&tx_hash)
            .await
            .map_err(|e| DepositError::Failed(e.to_string()))?;

        if !receipt.success {
            return Err(self.classify_revert(amount, sub_account, &tx_hash));
        }

        info!("Deposit {} confirmed", tx_hash);
        self.funded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(sub_account);

        Ok(DepositReceipt {
            amount,
            formatted,
            sub_account,
            selector,
            tx_hash,
        })
    }

    async fn check_balance(&self, amount: u128) -> Result<(), DepositError> {
        let asset = &self.config.settlement_asset;
        let owner = self.signer.address();

        match self
            .balances
            .check(self.config.destination, asset, &owner, amount)
            .await
        {
            Ok(check) if !check.sufficient => Err(DepositError::InsufficientBalance {
                have: check.formatted,
                need: asset.format(amount),
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Destination balance check failed, proceeding: {}", e);
                Ok(())
            }
        }
    }

    fn below_minimum(&self, amount: u128) -> DepositError {
        DepositError::BelowMinimum {
            amount: self.config.settlement_asset.format(amount),
            minimum: self
                .config
                .first_deposit_minimum
                .map(|minimum| self.config.settlement_asset.format(minimum)),
        }
    }

    fn classify_failure(&self, amount: u128, reason: String) -> DepositError {
        let lowered = reason.to_lowercase();
        if BELOW_MINIMUM_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            return self.below_minimum(amount);
        }
        DepositError::Failed(reason)
    }

    /// A mined revert carries no reason; fall back to the configured minimum,
    /// unless the sub-account is already known to hold a deposit
    fn classify_revert(
        &self,
        amount: u128,
        sub_account: SubAccount,
        tx_hash: &TxHash,
    ) -> DepositError {
        let funded = self
            .funded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&sub_account);

        match self.config.first_deposit_minimum {
            Some(minimum) if amount < minimum && !funded => self.below_minimum(amount),
            _ => DepositError::Failed(format!("deposit {} reverted", tx_hash)),
        }
    }
}
