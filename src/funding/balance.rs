use std::sync::Arc;
use tracing::debug;

use crate::error::ReaderError;
use crate::execution::reader::ChainReader;
use crate::ledger::models::{Address, Asset, LedgerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCheck {
    pub sufficient: bool,
    pub actual: u128,
    /// `actual` rendered in the asset's decimals
    pub formatted: String,
}

/// Pre-flight balance check.
///
/// A read error is returned as-is; callers decide to proceed rather than
/// treat it as insufficient funds.
pub struct BalanceVerifier {
    reader: Arc<dyn ChainReader>,
}

impl BalanceVerifier {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    pub async fn check(
        &self,
        ledger: LedgerId,
        asset: &Asset,
        owner: &Address,
        required: u128,
    ) -> Result<BalanceCheck, ReaderError> {
        let actual = self.reader.balance(ledger, &asset.reference, owner).await?;
        let formatted = asset.format(actual);

        debug!(
            "Balance of {} on ledger {}: {} {} (need {})",
            owner,
            ledger,
            formatted,
            asset.symbol,
            asset.format(required)
        );

        Ok(BalanceCheck {
            sufficient: actual >= required,
            actual,
            formatted,
        })
    }
}
