//! Ingest & reconciliation handlers

use axum::{extract::{State, Path}, Json};
use serde::Deserialize;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::ingest::{IngestSummary, RowKind};
use crate::reconcile::ReconcileReport;
use crate::store::RecordStore;

#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    /// Bare file name inside the drop directory
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// Guessed from the file name when absent
    pub kind: Option<RowKind>,
}

/// Ingest one file from the drop directory
pub async fn ingest<S: RecordStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<IngestRequest>,
) -> AppResult<Json<IngestSummary>> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let kind = req
        .kind
        .or_else(|| RowKind::from_file_name(&req.file_name))
        .ok_or_else(|| AppError::ValidationError(format!(
            "cannot tell the kind of '{}', pass \"kind\": \"alert\" or \"incident\"",
            req.file_name
        )))?;

    let summary = state.service.ingest_file(&req.file_name, kind).await?;
    Ok(Json(summary))
}

/// Re-evaluate every alert of a user
pub async fn reconcile_user<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
) -> AppResult<Json<ReconcileReport>> {
    Ok(Json(state.service.reconcile_user(&user).await?))
}
