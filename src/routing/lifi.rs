//! Route aggregator speaking the LI.FI REST API.
//!
//! Quotes come from `POST /v1/advanced/routes`. Each step is executed by
//! fetching its transaction from `POST /v1/advanced/stepTransaction`, having
//! the user sign it, and polling `GET /v1/status` until the bridge reports
//! a terminal state.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{AllowanceError, ExecutionError, LedgerSwitchError, ProviderError};
use crate::execution::json_rpc::{parse_data, parse_quantity};
use crate::execution::signer::{
    ensure_active_ledger, ContractCall, SignOutcome, Signer, SwitchPolicy,
};
use crate::funding::allowance::AllowanceManager;
use crate::ledger::models::{Address, AssetRef, LedgerId, TxHash};
use crate::routing::aggregator::RouteAggregator;
use crate::routing::models::{
    LegPhase, Route, RouteRequest, RouteStep, SettledRoute, StepStatus, StepUpdate,
    StepUpdateSender,
};

const API_KEY_HEADER: &str = "x-lifi-api-key";

#[derive(Debug, Clone)]
pub struct LifiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub integrator: String,
    pub status_poll_interval: Duration,
    pub status_poll_attempts: u32,
    pub switch: SwitchPolicy,
}

impl Default for LifiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://li.quest".to_string(),
            api_key: None,
            integrator: "funding-orchestrator".to_string(),
            status_poll_interval: Duration::from_secs(5),
            status_poll_attempts: 360,
            switch: SwitchPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoutes {
    #[serde(default)]
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    id: String,
    from_chain_id: u64,
    to_chain_id: u64,
    from_amount: String,
    to_amount: String,
    to_amount_min: String,
    from_token: WireToken,
    to_token: WireToken,
    steps: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStep {
    id: String,
    tool: String,
    action: WireAction,
    #[serde(default)]
    estimate: Option<WireEstimate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAction {
    from_chain_id: u64,
    to_chain_id: u64,
    from_token: WireToken,
    from_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEstimate {
    #[serde(default)]
    approval_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStepTransaction {
    #[serde(default)]
    transaction_request: Option<WireTransactionRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransactionRequest {
    to: Address,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus {
    status: String,
    #[serde(default)]
    substatus: Option<String>,
    #[serde(default)]
    substatus_message: Option<String>,
    #[serde(default)]
    receiving: Option<WireTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransfer {
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    token: Option<WireToken>,
    #[serde(default)]
    chain_id: Option<u64>,
}

/// Where a step stands according to the status endpoint
#[derive(Debug, Clone, PartialEq)]
enum LegStatus {
    InFlight(LegPhase),
    Done {
        amount: Option<u128>,
        asset: Option<AssetRef>,
        ledger: Option<LedgerId>,
    },
    Failed(String),
}

fn parse_amount(field: &str, raw: &str) -> Result<u128, ProviderError> {
    raw.parse::<u128>()
        .map_err(|_| ProviderError::Decode(format!("{} is not an integer amount: {}", field, raw)))
}

impl WireRoute {
    fn into_route(self) -> Result<Route, ProviderError> {
        let steps = self
            .steps
            .into_iter()
            .map(|raw| {
                let step: WireStep = serde_json::from_value(raw.clone())
                    .map_err(|e| ProviderError::Decode(format!("route step: {}", e)))?;

                Ok(RouteStep {
                    id: step.id,
                    tool: step.tool,
                    from_ledger: LedgerId(step.action.from_chain_id),
                    to_ledger: LedgerId(step.action.to_chain_id),
                    from_asset: AssetRef::from_provider_address(step.action.from_token.address),
                    from_amount: parse_amount("action.fromAmount", &step.action.from_amount)?,
                    approval_address: step.estimate.and_then(|e| e.approval_address),
                    status: StepStatus::NotStarted,
                    raw,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(Route {
            id: self.id,
            from_ledger: LedgerId(self.from_chain_id),
            to_ledger: LedgerId(self.to_chain_id),
            from_asset: AssetRef::from_provider_address(self.from_token.address),
            to_asset: AssetRef::from_provider_address(self.to_token.address),
            from_amount: parse_amount("fromAmount", &self.from_amount)?,
            to_amount: parse_amount("toAmount", &self.to_amount)?,
            to_amount_min: parse_amount("toAmountMin", &self.to_amount_min)?,
            steps,
        })
    }
}

impl WireStatus {
    fn classify(self) -> Result<LegStatus, ProviderError> {
        match self.status.as_str() {
            // Refunded funds went back to the sender; partial means the
            // bridge delivered some other token than the one routed
            "DONE" if matches!(self.substatus.as_deref(), Some("REFUNDED" | "PARTIAL")) => {
                Ok(LegStatus::Failed(format!(
                    "transfer ended {}: {}",
                    self.substatus.as_deref().unwrap_or_default().to_lowercase(),
                    self.substatus_message.unwrap_or_default()
                )))
            }
            "DONE" => {
                let receiving = self.receiving.unwrap_or(WireTransfer {
                    amount: None,
                    token: None,
                    chain_id: None,
                });
                let amount = receiving
                    .amount
                    .as_deref()
                    .map(|raw| parse_amount("receiving.amount", raw))
                    .transpose()?;

                Ok(LegStatus::Done {
                    amount,
                    asset: receiving
                        .token
                        .map(|token| AssetRef::from_provider_address(token.address)),
                    ledger: receiving.chain_id.map(LedgerId),
                })
            }
            "FAILED" | "INVALID" => Ok(LegStatus::Failed(
                self.substatus_message
                    .or(self.substatus)
                    .unwrap_or_else(|| self.status.clone()),
            )),
            _ => match self.substatus.as_deref() {
                Some("WAIT_DESTINATION_TRANSACTION") => {
                    Ok(LegStatus::InFlight(LegPhase::DestinationSettlement))
                }
                _ => Ok(LegStatus::InFlight(LegPhase::Relay)),
            },
        }
    }
}

pub struct LifiAggregator {
    http: Client,
    config: LifiConfig,
    signer: Arc<dyn Signer>,
    allowances: Arc<AllowanceManager>,
}

impl LifiAggregator {
    pub fn new(
        http: Client,
        config: LifiConfig,
        signer: Arc<dyn Signer>,
        allowances: Arc<AllowanceManager>,
    ) -> Self {
        Self {
            http,
            config,
            signer,
            allowances,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn step_transaction(&self, step: &RouteStep) -> Result<ContractCall, ProviderError> {
        let response = self
            .authorize(self.http.post(self.url("/v1/advanced/stepTransaction")))
            .json(&step.raw)
            .send()
            .await?;

        let populated: WireStepTransaction = Self::read_json(response).await?;
        let request = populated.transaction_request.ok_or_else(|| {
            ProviderError::Decode(format!("step {} has no transactionRequest", step.id))
        })?;

        let data = parse_data(&request.data).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let value = match request.value.as_deref() {
            Some(raw) => parse_quantity(raw).map_err(|e| ProviderError::Decode(e.to_string()))?,
            None => 0,
        };
        let ledger = request.chain_id.map(LedgerId).unwrap_or(step.from_ledger);

        Ok(ContractCall::new(ledger, request.to, data).with_value(value))
    }

    async fn leg_status(
        &self,
        step: &RouteStep,
        tx_hash: &TxHash,
    ) -> Result<LegStatus, ProviderError> {
        let response = self
            .authorize(self.http.get(self.url("/v1/status")))
            .query(&[
                ("txHash", tx_hash.as_str().to_string()),
                ("bridge", step.tool.clone()),
                ("fromChain", step.from_ledger.to_string()),
                ("toChain", step.to_ledger.to_string()),
            ])
            .send()
            .await?;

        let status: WireStatus = Self::read_json(response).await?;
        status.classify()
    }

    async fn ensure_ledger(&self, ledger: LedgerId) -> Result<(), ExecutionError> {
        ensure_active_ledger(self.signer.as_ref(), ledger, self.config.switch)
            .await
            .map_err(|e| match e {
                LedgerSwitchError::Rejected => ExecutionError::Rejected,
                LedgerSwitchError::NotSwitched { expected, actual } => {
                    ExecutionError::ChainSwitchFailed { expected, actual }
                }
            })
    }

    /// Whether a failed status lookup is worth another poll
    fn status_lookup_is_transient(error: &ProviderError) -> bool {
        match error {
            // The status API does not know a fresh transaction yet
            ProviderError::Status { status: 404, .. } => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Transport(_) => true,
            ProviderError::Decode(_) => false,
        }
    }

    /// Run one step to a terminal state, or until the status poll gives up
    async fn execute_step(
        &self,
        index: usize,
        step: &RouteStep,
        updates: &StepUpdateSender,
        tx_hashes: &mut Vec<TxHash>,
    ) -> Result<LegStatus, ExecutionError> {
        let send = |update: StepUpdate| {
            let _ = updates.send(update);
        };

        send(StepUpdate::new(index, LegPhase::Submission, StepStatus::ActionRequired));

        self.ensure_ledger(step.from_ledger).await?;

        if let (Some(token), Some(spender)) = (step.from_asset.contract(), step.approval_address) {
            self.allowances
                .ensure(step.from_ledger, token, &spender, step.from_amount)
                .await
                .map_err(|e| match e {
                    AllowanceError::Rejected => ExecutionError::Rejected,
                    AllowanceError::Failed(reason) => ExecutionError::StepFailed {
                        step: index,
                        reason,
                    },
                })?;
        }

        let call = self.step_transaction(step).await?;
        let tx_hash = match self.signer.sign_and_send(&call).await {
            SignOutcome::Submitted(tx_hash) => tx_hash,
            SignOutcome::Rejected => return Err(ExecutionError::Rejected),
            SignOutcome::Failed(reason) => {
                return Err(ExecutionError::StepFailed { step: index, reason })
            }
        };
        tx_hashes.push(tx_hash.clone());

        send(
            StepUpdate::new(index, LegPhase::Confirmation, StepStatus::Pending)
                .with_tx(tx_hash.clone()),
        );

        let receipt = self
            .signer
            .await_confirmation(&tx_hash)
            .await
            .map_err(|e| ExecutionError::StepFailed {
                step: index,
                reason: e.to_string(),
            })?;
        if !receipt.success {
            return Err(ExecutionError::StepFailed {
                step: index,
                reason: format!("transaction {} reverted", tx_hash),
            });
        }

        send(StepUpdate::new(index, LegPhase::Relay, StepStatus::Pending).with_tx(tx_hash.clone()));

        for _ in 0..self.config.status_poll_attempts {
            match self.leg_status(step, &tx_hash).await {
                Ok(LegStatus::InFlight(phase)) => {
                    send(StepUpdate::new(index, phase, StepStatus::Pending));
                }
                Ok(status) => return Ok(status),
                Err(e) if Self::status_lookup_is_transient(&e) => {
                    warn!("Status lookup for {} failed, polling again: {}", tx_hash, e)
                }
                Err(e) => return Err(ExecutionError::Provider(e)),
            }
            tokio::time::sleep(self.config.status_poll_interval).await;
        }

        warn!(
            "Step {} ({}) still in flight after {} status polls",
            index, step.tool, self.config.status_poll_attempts
        );
        Ok(LegStatus::InFlight(LegPhase::Relay))
    }
}

#[async_trait]
impl RouteAggregator for LifiAggregator {
    async fn quote(&self, request: &RouteRequest) -> Result<Vec<Route>, ProviderError> {
        let body = json!({
            "fromChainId": request.from_ledger.as_u64(),
            "toChainId": request.to_ledger.as_u64(),
            "fromTokenAddress": request.from_asset.provider_address(),
            "toTokenAddress": request.to_asset.provider_address(),
            "fromAmount": request.from_amount.to_string(),
            "fromAddress": request.from_address,
            "toAddress": request.to_address,
            "options": {
                "slippage": request.slippage,
                "order": request.order.as_str(),
                "integrator": self.config.integrator,
            }
        });

        debug!("Requesting routes: {}", body);

        let response = self
            .authorize(self.http.post(self.url("/v1/advanced/routes")))
            .json(&body)
            .send()
            .await?;

        let routes: WireRoutes = Self::read_json(response).await?;
        routes
            .routes
            .into_iter()
            .map(WireRoute::into_route)
            .collect()
    }

    #[instrument(skip(self, route, updates), fields(route_id = %route.id))]
    async fn execute(
        &self,
        route: &Route,
        updates: StepUpdateSender,
    ) -> Result<SettledRoute, ExecutionError> {
        let mut statuses = vec![StepStatus::NotStarted; route.steps.len()];
        let mut tx_hashes = Vec::new();
        let mut received_amount = None;
        let mut received_asset = None;
        let mut received_ledger = None;

        for (index, step) in route.steps.iter().enumerate() {
            info!("Executing step {} via {}", index, step.tool);
            statuses[index] = StepStatus::Pending;

            match self
                .execute_step(index, step, &updates, &mut tx_hashes)
                .await?
            {
                LegStatus::Done {
                    amount,
                    asset,
                    ledger,
                } => {
                    statuses[index] = StepStatus::Done;
                    received_amount = amount;
                    received_asset = asset;
                    received_ledger = ledger;
                    let _ = updates.send(StepUpdate::new(
                        index,
                        LegPhase::DestinationSettlement,
                        StepStatus::Done,
                    ));
                }
                LegStatus::Failed(reason) => {
                    return Err(ExecutionError::StepFailed { step: index, reason });
                }
                LegStatus::InFlight(_) => break,
            }
        }

        Ok(SettledRoute {
            route_id: route.id.clone(),
            step_statuses: statuses,
            received_amount,
            received_asset,
            received_ledger,
            tx_hashes,
        })
    }

    fn name(&self) -> &str {
        "lifi"
    }
}
