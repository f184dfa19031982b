//! Incidents handlers

use axum::{extract::{State, Path}, http::StatusCode, Json};

use crate::{AppState, AppResult};
use crate::models::{AlertRecord, CreateIncidentRequest, IncidentRecord, UpdateIncidentRequest};
use crate::reconcile::ReconcileReport;
use crate::store::RecordStore;

/// Create incident and pull in the alerts its window covers
pub async fn create<S: RecordStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<CreateIncidentRequest>,
) -> AppResult<(StatusCode, Json<IncidentRecord>)> {
    let incident = state.service.create_incident(req).await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

/// Get single incident
pub async fn get<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> AppResult<Json<IncidentRecord>> {
    Ok(Json(state.service.get_incident(&id).await?))
}

/// Alerts currently associated with an incident
pub async fn alerts<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<AlertRecord>>> {
    Ok(Json(state.service.incident_alerts(&id).await?))
}

pub async fn update<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateIncidentRequest>,
) -> AppResult<Json<IncidentRecord>> {
    Ok(Json(state.service.update_incident(&id, req).await?))
}

/// Delete incident; its alerts fall back to another incident or are cleared
pub async fn delete<S: RecordStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> AppResult<Json<ReconcileReport>> {
    Ok(Json(state.service.delete_incident(&id).await?))
}
