use config::{builder::DefaultState, ConfigBuilder, Environment};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::execution::signer::SwitchPolicy;
use crate::funding::FundingMode;
use crate::ledger::amount::parse_units;
use crate::ledger::models::{Address, LedgerId};
use crate::routing::models::RouteOrder;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub wallet: WalletSettings,
    pub aggregator: AggregatorSettings,
    pub destination: DestinationSettings,
    /// Source ledger RPC endpoints keyed by chain id
    #[serde(default)]
    pub rpc: HashMap<String, String>,
    pub funding: FundingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletSettings {
    /// EIP-1193 style JSON-RPC endpoint that prompts the user for signatures
    pub rpc_url: String,
    pub receipt_poll_interval_ms: u64,
    pub receipt_poll_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub integrator: String,
    /// Fraction, 0.005 = 0.5%
    pub slippage: Decimal,
    pub order: RouteOrder,
    pub request_timeout_secs: u64,
    pub status_poll_interval_ms: u64,
    pub status_poll_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationSettings {
    pub ledger_id: LedgerId,
    pub name: String,
    pub native_symbol: String,
    pub rpc_url: String,
    pub settlement_token: Address,
    pub settlement_symbol: String,
    pub settlement_decimals: u8,
    pub custody_contract: Address,
    /// Decimal string in settlement asset units
    pub first_deposit_minimum: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FundingSettings {
    pub mode: FundingMode,
    pub switch_attempts: u32,
    pub switch_interval_ms: u64,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    config::Config::builder()
        .set_default("server.bind_address", "0.0.0.0:8080")?
        .set_default("wallet.rpc_url", "http://127.0.0.1:1248")?
        .set_default("wallet.receipt_poll_interval_ms", 2_000_i64)?
        .set_default("wallet.receipt_poll_attempts", 600_i64)?
        .set_default("aggregator.base_url", "https://li.quest")?
        .set_default("aggregator.integrator", "funding-orchestrator")?
        .set_default("aggregator.slippage", "0.005")?
        .set_default("aggregator.order", "RECOMMENDED")?
        .set_default("aggregator.request_timeout_secs", 30_i64)?
        .set_default("aggregator.status_poll_interval_ms", 5_000_i64)?
        .set_default("aggregator.status_poll_attempts", 360_i64)?
        .set_default("destination.ledger_id", 999_i64)?
        .set_default("destination.name", "HyperEVM")?
        .set_default("destination.native_symbol", "HYPE")?
        .set_default("destination.rpc_url", "https://rpc.hyperliquid.xyz/evm")?
        .set_default("destination.settlement_symbol", "USDC")?
        .set_default("destination.settlement_decimals", 6_i64)?
        .set_default("rpc.1", "https://eth.llamarpc.com")?
        .set_default("rpc.10", "https://mainnet.optimism.io")?
        .set_default("rpc.137", "https://polygon-rpc.com")?
        .set_default("rpc.8453", "https://mainnet.base.org")?
        .set_default("rpc.42161", "https://arb1.arbitrum.io/rpc")?
        .set_default("funding.mode", "auto_deposit")?
        .set_default("funding.switch_attempts", 10_i64)?
        .set_default("funding.switch_interval_ms", 500_i64)
}

impl Settings {
    /// Defaults overlaid by `FUNDING__SECTION__KEY` environment variables
    pub fn from_env() -> AppResult<Self> {
        let builder = defaults()?.add_source(
            Environment::with_prefix("FUNDING")
                .prefix_separator("__")
                .separator("__"),
        );
        Self::build(builder)
    }

    /// Defaults overlaid by a TOML document
    pub fn from_toml(document: &str) -> AppResult<Self> {
        let builder = defaults()?.add_source(config::File::from_str(
            document,
            config::FileFormat::Toml,
        ));
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> AppResult<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        let slippage = self.aggregator.slippage;
        if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(AppError::Config(format!(
                "aggregator.slippage must be a fraction between 0 and 1, got {}",
                slippage
            )));
        }

        if self.wallet.receipt_poll_attempts == 0
            || self.aggregator.status_poll_attempts == 0
            || self.funding.switch_attempts == 0
        {
            return Err(AppError::Config("poll attempt caps must be positive".to_string()));
        }

        self.first_deposit_minimum()?;
        self.rpc_endpoints()?;
        Ok(())
    }

    pub fn first_deposit_minimum(&self) -> AppResult<Option<u128>> {
        self.destination
            .first_deposit_minimum
            .as_deref()
            .map(|minimum| {
                parse_units(minimum, self.destination.settlement_decimals).map_err(|e| {
                    AppError::Config(format!("destination.first_deposit_minimum: {}", e))
                })
            })
            .transpose()
    }

    /// Every configured RPC endpoint, the destination included
    pub fn rpc_endpoints(&self) -> AppResult<HashMap<LedgerId, String>> {
        let mut endpoints = HashMap::with_capacity(self.rpc.len() + 1);
        for (key, url) in &self.rpc {
            let id = key
                .parse::<u64>()
                .map_err(|_| AppError::Config(format!("rpc.{} is not a chain id", key)))?;
            endpoints.insert(LedgerId(id), url.clone());
        }
        endpoints.insert(self.destination.ledger_id, self.destination.rpc_url.clone());
        Ok(endpoints)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregator.request_timeout_secs)
    }

    /// Shared by every ledger switch, source or destination
    pub fn switch_policy(&self) -> SwitchPolicy {
        SwitchPolicy {
            attempts: self.funding.switch_attempts,
            interval: Duration::from_millis(self.funding.switch_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DESTINATION: &str = r#"
        [destination]
        settlement_token = "0x1111111111111111111111111111111111111111"
        custody_contract = "0x2222222222222222222222222222222222222222"
    "#;

    #[test]
    fn test_defaults_with_required_destination() {
        let settings = Settings::from_toml(DESTINATION).unwrap();

        assert_eq!(settings.server.bind_address, "0.0.0.0:8080");
        assert_eq!(settings.aggregator.slippage, dec!(0.005));
        assert_eq!(settings.aggregator.order, RouteOrder::Recommended);
        assert_eq!(settings.funding.mode, FundingMode::AutoDeposit);
        assert_eq!(settings.destination.ledger_id, LedgerId(999));
        assert_eq!(settings.first_deposit_minimum().unwrap(), None);
        assert_eq!(
            settings.switch_policy(),
            SwitchPolicy {
                attempts: 10,
                interval: Duration::from_millis(500),
            }
        );

        let endpoints = settings.rpc_endpoints().unwrap();
        assert!(endpoints.contains_key(&LedgerId::ARBITRUM));
        assert_eq!(
            endpoints.get(&LedgerId(999)).map(String::as_str),
            Some("https://rpc.hyperliquid.xyz/evm")
        );
    }

    #[test]
    fn test_overrides() {
        let document = format!(
            "{}\nfirst_deposit_minimum = \"5\"\n\n[funding]\nmode = \"bridge_only\"\n\n[aggregator]\norder = \"FASTEST\"\nslippage = 0.01\n",
            DESTINATION
        );
        let settings = Settings::from_toml(&document).unwrap();

        assert_eq!(settings.funding.mode, FundingMode::BridgeOnly);
        assert_eq!(settings.aggregator.order, RouteOrder::Fastest);
        assert_eq!(settings.aggregator.slippage, dec!(0.01));
        assert_eq!(settings.first_deposit_minimum().unwrap(), Some(5_000_000));
    }

    #[test]
    fn test_missing_custody_contract_is_config_error() {
        let result = Settings::from_toml(
            "[destination]\nsettlement_token = \"0x1111111111111111111111111111111111111111\"\n",
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_out_of_range_slippage_is_rejected() {
        let document = format!("{}\n[aggregator]\nslippage = 1.5\n", DESTINATION);
        assert!(matches!(
            Settings::from_toml(&document),
            Err(AppError::Config(_))
        ));
    }
}
