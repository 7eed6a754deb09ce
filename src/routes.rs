//! HTTP routes for registering, verifying and auditing identity commitments.

use std::sync::MutexGuard;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::LedgerError;
use crate::identity::commitment;
use crate::ledger::{ChainStatus, Ledger, RepairReport};
use crate::model::Block;
use crate::AppState;

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/identities", post(register_identity))
        .route("/verify", post(verify_identity))
        .route("/chain", get(chain_data))
        .route("/validate", get(validate_chain))
        .route("/repair", post(repair_chain))
        .route("/blocks/last", get(last_block))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}

fn lock_ledger(state: &AppState) -> Result<MutexGuard<'_, Ledger>, ApiError> {
    state.ledger.lock().map_err(|_| {
        error!("ledger lock poisoned");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ledger unavailable".to_string(),
        )
    })
}

fn ledger_error(e: LedgerError) -> ApiError {
    match e {
        LedgerError::DuplicateEntry(_) => (
            StatusCode::CONFLICT,
            "this identity is already on the ledger".into(),
        ),
        other => {
            error!(error = %other, "ledger operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

#[derive(Deserialize)]
pub struct IdentityInput {
    pub id_number: String,
}

/// POST /identities: commit a new identity. Refused while the chain is broken.
pub async fn register_identity(
    State(state): State<AppState>,
    Json(payload): Json<IdentityInput>,
) -> Result<Json<Block>, ApiError> {
    let mut guard = lock_ledger(&state)?;
    if let ChainStatus::Invalid { index, .. } = guard.is_chain_valid() {
        warn!(index, "registration refused: chain compromised");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("ledger compromised at block {index}; registrations disabled until repair"),
        ));
    }

    let hash = commitment(payload.id_number.trim().as_bytes())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let block = guard.append(&hash).map_err(ledger_error)?;
    Ok(Json(block))
}

#[derive(Serialize)]
pub struct VerifyOutput {
    pub hash: String,
    pub registered: bool,
}

/// POST /verify
pub async fn verify_identity(
    State(state): State<AppState>,
    Json(payload): Json<IdentityInput>,
) -> Result<Json<VerifyOutput>, ApiError> {
    let hash = commitment(payload.id_number.trim().as_bytes())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let registered = lock_ledger(&state)?.verify_identity(&hash);
    Ok(Json(VerifyOutput { hash, registered }))
}

#[derive(Serialize)]
pub struct ChainOutput {
    pub chain: Vec<Block>,
    pub is_valid: bool,
    pub tampered_block_index: Option<u64>,
}

/// GET /chain
pub async fn chain_data(State(state): State<AppState>) -> Result<Json<ChainOutput>, ApiError> {
    let guard = lock_ledger(&state)?;
    let status = guard.is_chain_valid();
    Ok(Json(ChainOutput {
        chain: guard.blocks().to_vec(),
        is_valid: status.is_valid(),
        tampered_block_index: status.tampered_index(),
    }))
}

/// GET /validate: first broken block, if any.
#[derive(Serialize)]
pub struct ValidateResp {
    pub ok: bool,
    pub tampered_block_index: Option<u64>,
    pub reason: Option<String>,
}
pub async fn validate_chain(State(state): State<AppState>) -> Result<Json<ValidateResp>, ApiError> {
    let status = lock_ledger(&state)?.is_chain_valid();
    Ok(Json(ValidateResp {
        ok: status.is_valid(),
        tampered_block_index: status.tampered_index(),
        reason: status.reason().map(|r| r.to_string()),
    }))
}

/// POST /repair: administrative re-link. The report says plainly that block
/// contents were not checked.
pub async fn repair_chain(State(state): State<AppState>) -> Result<Json<RepairReport>, ApiError> {
    let report = lock_ledger(&state)?.repair_chain().map_err(ledger_error)?;
    info!(relinked = report.relinked.len(), "repair requested over http");
    Ok(Json(report))
}

/// GET /blocks/last
pub async fn last_block(State(state): State<AppState>) -> Result<Json<Block>, ApiError> {
    let guard = lock_ledger(&state)?;
    let block = guard.get_last_block().map_err(ledger_error)?;
    Ok(Json(block.clone()))
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
