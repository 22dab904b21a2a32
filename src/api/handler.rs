use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    funding::{orchestrator::FundingOrchestrator, progress::ProgressEvent},
    ledger::{catalog::LedgerCatalog, models::LedgerId},
    middleware::ValidatedJson,
};

#[derive(Clone)]
pub struct AppState {
    /// Held for the whole of an operation; a second request while it is
    /// held is refused with `SESSION_BUSY`
    pub orchestrator: Arc<Mutex<FundingOrchestrator>>,
    /// Latest published session state, readable while the saga runs
    pub progress: watch::Receiver<ProgressEvent>,
    pub catalog: Arc<LedgerCatalog>,
}

impl AppState {
    pub fn new(orchestrator: FundingOrchestrator, progress: watch::Receiver<ProgressEvent>) -> Self {
        let catalog = Arc::new(orchestrator.catalog().clone());
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            progress,
            catalog,
        }
    }

    fn try_orchestrator(&self) -> AppResult<tokio::sync::MutexGuard<'_, FundingOrchestrator>> {
        self.orchestrator.try_lock().map_err(|_| AppError::SessionBusy)
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let phase = state.progress.borrow().phase;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        phase,
        timestamp: Utc::now(),
    }))
}

/// GET /ledgers - Supported source ledgers and the destination
pub async fn list_ledgers(State(state): State<AppState>) -> AppResult<Json<LedgersResponse>> {
    Ok(Json(LedgersResponse {
        destination: state.catalog.destination(),
        settlement_asset: state.catalog.settlement_asset().clone(),
        custody_contract: state.catalog.custody_contract(),
        ledgers: state.catalog.ledgers().to_vec(),
    }))
}

/// GET /funding/session
pub async fn get_session(State(state): State<AppState>) -> AppResult<Json<ProgressEvent>> {
    let event = state.progress.borrow().clone();
    Ok(Json(event))
}

/// POST /funding/ledger
pub async fn select_ledger(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SelectLedgerRequest>,
) -> AppResult<Json<ProgressEvent>> {
    let mut orchestrator = state.try_orchestrator()?;
    let event = orchestrator.select_ledger(LedgerId(request.ledger_id))?;
    Ok(Json(event))
}

/// POST /funding/asset
pub async fn select_asset(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SelectAssetRequest>,
) -> AppResult<Json<ProgressEvent>> {
    let mut orchestrator = state.try_orchestrator()?;
    let event = orchestrator.select_asset(&request.symbol)?;
    Ok(Json(event))
}

/// POST /funding/amount - Pre-flight checks and route resolution
pub async fn enter_amount(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<EnterAmountRequest>,
) -> AppResult<Json<ProgressEvent>> {
    let mut orchestrator = state.try_orchestrator()?;
    let event = orchestrator
        .enter_amount(&request.amount, request.sub_account)
        .await?;
    Ok(Json(event))
}

/// POST /funding/confirm
///
/// The saga waits on wallet prompts and bridge settlement, so it runs in the
/// background holding the session lock; progress is on the stream.
pub async fn confirm(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<ConfirmAccepted>)> {
    let mut orchestrator = state
        .orchestrator
        .clone()
        .try_lock_owned()
        .map_err(|_| AppError::SessionBusy)?;

    orchestrator.can_confirm()?;
    let session_id = orchestrator.session().id;

    info!("🔄 Funding saga started for session {}", session_id);

    tokio::spawn(async move {
        match orchestrator.confirm().await {
            Ok(event) => info!(
                "Funding saga for session {} settled in {}",
                event.session_id, event.phase
            ),
            Err(e) => warn!("Funding saga for session {} refused: {}", session_id, e),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ConfirmAccepted {
            session_id,
            stream: "/api/v1/funding/stream".to_string(),
        }),
    ))
}

/// POST /funding/back
pub async fn back(State(state): State<AppState>) -> AppResult<Json<ProgressEvent>> {
    let mut orchestrator = state.try_orchestrator()?;
    let event = orchestrator.back()?;
    Ok(Json(event))
}

/// POST /funding/reset
pub async fn reset(State(state): State<AppState>) -> AppResult<Json<ProgressEvent>> {
    let mut orchestrator = state.try_orchestrator()?;
    Ok(Json(orchestrator.reset()))
}
