use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    config::Settings,
    error::AppResult,
    execution::{
        json_rpc::JsonRpcClient,
        reader::JsonRpcChainReader,
        signer::Signer,
        wallet::{JsonRpcWalletSigner, WalletConfig},
    },
    funding::{
        allowance::AllowanceManager,
        balance::BalanceVerifier,
        bridge::BridgeExecutor,
        deposit::{DepositConfig, DepositExecutor},
        orchestrator::FundingOrchestrator,
        progress::{ChannelReporter, FanoutReporter, LogReporter, ProgressEvent, ProgressReporter},
        session::Session,
        OrchestratorConfig,
    },
    ledger::{
        catalog::{builtin_sources, LedgerCatalog},
        models::{Asset, Ledger},
    },
    routing::{
        lifi::{LifiAggregator, LifiConfig},
        resolver::RouteResolver,
    },
};

fn build_catalog(settings: &Settings, reader: &JsonRpcChainReader) -> LedgerCatalog {
    let destination = &settings.destination;

    let sources: Vec<Ledger> = builtin_sources()
        .into_iter()
        .filter(|ledger| {
            let supported = reader.supports(ledger.id);
            if !supported {
                warn!("No RPC endpoint for {} ({}), leaving it out", ledger.name, ledger.id);
            }
            supported
        })
        .collect();

    LedgerCatalog::new(
        sources,
        Ledger::new(
            destination.ledger_id,
            &destination.name,
            Asset::native(&destination.native_symbol, &destination.native_symbol),
        ),
        Asset::token(
            &destination.settlement_symbol,
            &destination.settlement_symbol,
            destination.settlement_token,
            destination.settlement_decimals,
        ),
        destination.custody_contract,
    )
}

/// Wire every component. The wallet, chain reader and routing provider are
/// constructed here once and shared through `Arc`s.
pub async fn initialize_app_state(settings: &Settings) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()?;

    // Wallet
    let wallet = JsonRpcWalletSigner::connect(
        JsonRpcClient::new(http.clone(), settings.wallet.rpc_url.clone()),
        WalletConfig {
            receipt_poll_interval: Duration::from_millis(settings.wallet.receipt_poll_interval_ms),
            receipt_poll_attempts: settings.wallet.receipt_poll_attempts,
        },
    )
    .await?;
    let signer: Arc<dyn Signer> = Arc::new(wallet);
    info!("✅ Wallet connected as {}", signer.address());

    // Chain reads
    let reader = Arc::new(JsonRpcChainReader::new(http.clone(), settings.rpc_endpoints()?));
    let catalog = Arc::new(build_catalog(settings, &reader));
    info!(
        "✅ {} ledgers available, destination {}",
        catalog.ledgers().len(),
        catalog.destination()
    );

    let allowances = Arc::new(AllowanceManager::new(reader.clone(), signer.clone()));

    // Routing provider
    let aggregator = Arc::new(LifiAggregator::new(
        http.clone(),
        LifiConfig {
            base_url: settings.aggregator.base_url.clone(),
            api_key: settings.aggregator.api_key.clone(),
            integrator: settings.aggregator.integrator.clone(),
            status_poll_interval: Duration::from_millis(settings.aggregator.status_poll_interval_ms),
            status_poll_attempts: settings.aggregator.status_poll_attempts,
            switch: settings.switch_policy(),
        },
        signer.clone(),
        allowances.clone(),
    ));
    info!("✅ Routing provider at {}", settings.aggregator.base_url);

    let slippage = settings.aggregator.slippage;
    let resolver = RouteResolver::new(aggregator.clone(), slippage, settings.aggregator.order);
    let bridge = Arc::new(BridgeExecutor::new(
        aggregator,
        catalog.destination(),
        catalog.settlement_asset().clone(),
        slippage,
    ));

    let deposit = Arc::new(DepositExecutor::new(
        signer.clone(),
        BalanceVerifier::new(reader.clone()),
        allowances,
        DepositConfig {
            destination: catalog.destination(),
            settlement_asset: catalog.settlement_asset().clone(),
            custody_contract: catalog.custody_contract(),
            first_deposit_minimum: settings.first_deposit_minimum()?,
            switch: settings.switch_policy(),
        },
    ));

    // Progress goes to the HTTP stream and the log
    let (channel, progress) = ChannelReporter::new(ProgressEvent::from(&Session::new()));
    let channel: Arc<dyn ProgressReporter> = Arc::new(channel);
    let log: Arc<dyn ProgressReporter> = Arc::new(LogReporter);
    let reporter = Arc::new(FanoutReporter::new(vec![channel.clone(), log]));

    let orchestrator = FundingOrchestrator::new(
        catalog,
        signer,
        BalanceVerifier::new(reader),
        resolver,
        bridge,
        deposit,
        reporter,
        OrchestratorConfig {
            mode: settings.funding.mode,
        },
    );
    channel.report(&orchestrator.snapshot());

    info!("✅ Funding orchestrator ready in {:?} mode", settings.funding.mode);

    Ok(AppState::new(orchestrator, progress))
}
