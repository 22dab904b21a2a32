use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{RpcError, SignerError};
use crate::execution::json_rpc::{parse_quantity, to_data, to_quantity, JsonRpcClient};
use crate::execution::signer::{is_user_rejection, ContractCall, Receipt, SignOutcome, Signer};
use crate::ledger::models::{Address, LedgerId, TxHash};

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub receipt_poll_interval: Duration,
    pub receipt_poll_attempts: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            receipt_poll_interval: Duration::from_secs(2),
            receipt_poll_attempts: 600,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

fn parse_u64(raw: &str) -> Result<u64, SignerError> {
    let value = parse_quantity(raw)?;
    u64::try_from(value).map_err(|_| SignerError::Decode(format!("{} does not fit in 64 bits", raw)))
}

/// Signer backed by an EIP-1193 wallet reachable over JSON-RPC.
///
/// The wallet prompts the user for every switch and transaction; its
/// answers are classified into `SignOutcome` here and nowhere else.
pub struct JsonRpcWalletSigner {
    rpc: JsonRpcClient,
    account: Address,
    config: WalletConfig,
}

impl JsonRpcWalletSigner {
    /// Ask the wallet for its account and bind to the first one
    pub async fn connect(rpc: JsonRpcClient, config: WalletConfig) -> Result<Self, SignerError> {
        let accounts: Vec<Address> = rpc.call("eth_requestAccounts", json!([])).await?;
        let account = accounts.into_iter().next().ok_or(SignerError::NoAccount)?;

        info!("Wallet connected at {} with account {}", rpc.url(), account);

        Ok(Self {
            rpc,
            account,
            config,
        })
    }

    fn classify<T>(error: RpcError) -> SignOutcome<T> {
        match error {
            RpcError::Remote { code, message } if is_user_rejection(Some(code), &message) => {
                SignOutcome::Rejected
            }
            RpcError::Remote { message, .. } => SignOutcome::Failed(message),
            other => SignOutcome::Failed(other.to_string()),
        }
    }
}

#[async_trait]
impl Signer for JsonRpcWalletSigner {
    fn address(&self) -> Address {
        self.account
    }

    async fn active_ledger(&self) -> Result<LedgerId, SignerError> {
        let raw: String = self.rpc.call("eth_chainId", json!([])).await?;
        Ok(LedgerId(parse_u64(&raw)?))
    }

    async fn switch_ledger(&self, ledger: LedgerId) -> SignOutcome<()> {
        debug!("Requesting wallet switch to ledger {}", ledger);

        match self
            .rpc
            .call::<serde_json::Value>(
                "wallet_switchEthereumChain",
                json!([{ "chainId": ledger.to_hex() }]),
            )
            .await
        {
            Ok(_) => SignOutcome::Submitted(()),
            Err(e) => Self::classify(e),
        }
    }

    async fn sign_and_send(&self, call: &ContractCall) -> SignOutcome<TxHash> {
        let tx = json!({
            "from": self.account,
            "to": call.to,
            "data": to_data(&call.data),
            "value": to_quantity(call.value),
            "chainId": call.ledger.to_hex(),
        });

        match self.rpc.call::<String>("eth_sendTransaction", json!([tx])).await {
            Ok(hash) => {
                info!("Transaction {} submitted on ledger {}", hash, call.ledger);
                SignOutcome::Submitted(TxHash(hash))
            }
            Err(e) => {
                let outcome = Self::classify(e);
                if let SignOutcome::Failed(reason) = &outcome {
                    warn!("Transaction to {} failed before submission: {}", call.to, reason);
                }
                outcome
            }
        }
    }

    async fn await_confirmation(&self, tx_hash: &TxHash) -> Result<Receipt, SignerError> {
        for _ in 0..self.config.receipt_poll_attempts {
            let receipt: Option<WireReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash.as_str()]))
                .await?;

            if let Some(receipt) = receipt {
                let block_number = match receipt.block_number.as_deref() {
                    Some(raw) => Some(parse_u64(raw)?),
                    None => None,
                };

                return Ok(Receipt {
                    tx_hash: tx_hash.clone(),
                    success: receipt.status.as_deref() == Some("0x1"),
                    block_number,
                });
            }

            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }

        Err(SignerError::ConfirmationTimeout(tx_hash.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wallet_errors() {
        let rejected: SignOutcome<()> = JsonRpcWalletSigner::classify(RpcError::Remote {
            code: 4001,
            message: "User rejected the request.".to_string(),
        });
        assert!(rejected.is_rejected());

        let failed: SignOutcome<()> = JsonRpcWalletSigner::classify(RpcError::Remote {
            code: -32000,
            message: "execution reverted: below minimum deposit".to_string(),
        });
        assert_eq!(
            failed,
            SignOutcome::Failed("execution reverted: below minimum deposit".to_string())
        );

        let decode: SignOutcome<()> =
            JsonRpcWalletSigner::classify(RpcError::Decode("bad".to_string()));
        assert!(matches!(decode, SignOutcome::Failed(_)));
    }

    #[test]
    fn test_receipt_wire_format() {
        let receipt: WireReceipt =
            serde_json::from_str(r#"{"status":"0x1","blockNumber":"0x10","gasUsed":"0x5208"}"#)
                .unwrap();
        assert_eq!(receipt.status.as_deref(), Some("0x1"));
        assert_eq!(receipt.block_number.as_deref(), Some("0x10"));
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        assert_eq!(parse_u64("0x10").unwrap(), 16);
        assert!(matches!(
            parse_u64("0x10000000000000000"),
            Err(SignerError::Decode(_))
        ));
    }
}
