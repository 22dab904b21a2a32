use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

use crate::error::{ReaderError, RpcError};
use crate::execution::abi;
use crate::execution::json_rpc::{parse_data, parse_quantity, to_data, JsonRpcClient};
use crate::ledger::models::{Address, AssetRef, LedgerId};

/// Read-only chain state
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn balance(
        &self,
        ledger: LedgerId,
        asset: &AssetRef,
        owner: &Address,
    ) -> Result<u128, ReaderError>;

    async fn allowance(
        &self,
        ledger: LedgerId,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u128, ReaderError>;
}

/// Reads balances and allowances from public RPC endpoints, one per ledger
pub struct JsonRpcChainReader {
    clients: HashMap<LedgerId, JsonRpcClient>,
}

impl JsonRpcChainReader {
    pub fn new(http: reqwest::Client, endpoints: HashMap<LedgerId, String>) -> Self {
        let clients = endpoints
            .into_iter()
            .map(|(ledger, url)| (ledger, JsonRpcClient::new(http.clone(), url)))
            .collect();

        Self { clients }
    }

    pub fn supports(&self, ledger: LedgerId) -> bool {
        self.clients.contains_key(&ledger)
    }

    fn client(&self, ledger: LedgerId) -> Result<&JsonRpcClient, ReaderError> {
        self.clients
            .get(&ledger)
            .ok_or(ReaderError::UnknownLedger(ledger))
    }

    async fn eth_call(
        &self,
        ledger: LedgerId,
        to: &Address,
        data: Vec<u8>,
    ) -> Result<u128, ReaderError> {
        let raw: String = self
            .client(ledger)?
            .call(
                "eth_call",
                json!([{ "to": to, "data": to_data(&data) }, "latest"]),
            )
            .await?;

        let bytes = parse_data(&raw)?;
        abi::decode_uint(&bytes)
            .ok_or_else(|| RpcError::Decode(format!("short eth_call result: {}", raw)).into())
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn balance(
        &self,
        ledger: LedgerId,
        asset: &AssetRef,
        owner: &Address,
    ) -> Result<u128, ReaderError> {
        match asset {
            AssetRef::Native => {
                let raw: String = self
                    .client(ledger)?
                    .call("eth_getBalance", json!([owner, "latest"]))
                    .await?;
                Ok(parse_quantity(&raw)?)
            }
            AssetRef::Contract(token) => {
                self.eth_call(ledger, token, abi::encode_balance_of(owner))
                    .await
            }
        }
    }

    async fn allowance(
        &self,
        ledger: LedgerId,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u128, ReaderError> {
        self.eth_call(ledger, token, abi::encode_allowance(owner, spender))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_ledger_is_reported() {
        let reader = JsonRpcChainReader::new(
            reqwest::Client::new(),
            HashMap::from([(LedgerId::BASE, "http://localhost:8545".to_string())]),
        );

        assert!(reader.supports(LedgerId::BASE));
        let result = reader
            .balance(LedgerId::POLYGON, &AssetRef::Native, &Address::ZERO)
            .await;
        assert!(matches!(
            result,
            Err(ReaderError::UnknownLedger(LedgerId::POLYGON))
        ));
    }
}
