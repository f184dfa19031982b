//! Alerts handlers

use axum::{extract::{State, Path}, http::StatusCode, Json};

use crate::{AppState, AppResult};
use crate::models::{AlertRecord, CreateAlertRequest, UpdateAlertRequest};
use crate::store::RecordStore;

/// Create alert and associate it with a containing incident
pub async fn create<S: RecordStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<CreateAlertRequest>,
) -> AppResult<(StatusCode, Json<AlertRecord>)> {
    let alert = state.service.create_alert(req).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// Get single alert
pub async fn get<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> AppResult<Json<AlertRecord>> {
    Ok(Json(state.service.get_alert(&id).await?))
}

/// Update alert. Changing user, time or name re-keys the alert.
pub async fn update<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAlertRequest>,
) -> AppResult<Json<AlertRecord>> {
    Ok(Json(state.service.update_alert(&id, req).await?))
}

pub async fn delete<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.service.delete_alert(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
