//! Record service
//!
//! The one place where alerts, incidents, the store and the reconciler meet.
//! Neither model knows about the other; every write that can move an alert in
//! or out of an incident window goes through here and triggers the matching
//! reconciliation.
//!
//! Identity fields (`user`, `occurred_at`, `alert_name` for alerts; `user`,
//! `window_start`, `window_end` for incidents) are never updated in place:
//! the record is re-created under its new identity and the old one removed.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

use crate::ingest::{
    self, FileLifecycle, FileMoveError, IngestError, IngestSummary, ParsedRecords, RowKind,
};
use crate::models::{
    stored_precision, AlertRecord, CreateAlertRequest, CreateIncidentRequest, IncidentRecord,
    NewAlert, NewIncident, UpdateAlertRequest, UpdateIncidentRequest,
};
use crate::normalize::{normalize_evidence, parse_timestamp_value, parse_windows};
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};
use crate::store::{RecordStore, StoreError};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Identity already taken
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    File(#[from] FileMoveError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Rejected(msg) => ServiceError::Validation(msg),
            other => ServiceError::Store(other),
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NotFound(what) => ServiceError::NotFound(what),
            ReconcileError::Store(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

pub struct RecordService<S> {
    store: Arc<S>,
    reconciler: Reconciler<S>,
    files: FileLifecycle,
}

impl<S: RecordStore> RecordService<S> {
    pub fn new(store: Arc<S>, files: FileLifecycle) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            store,
            files,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn files(&self) -> &FileLifecycle {
        &self.files
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    pub async fn create_alert(&self, req: CreateAlertRequest) -> ServiceResult<AlertRecord> {
        req.validate()?;

        let occurred_at = match &req.occurred_at {
            None | Some(Value::Null) => Utc::now(),
            Some(v) => timestamp_field("occurred_at", v)?,
        };

        let alert = AlertRecord::new(NewAlert {
            user: user_field(&req.user)?,
            occurred_at,
            evidence: normalize_evidence(&req.evidence),
            score: req.score.unwrap_or(0.0),
            alert_name: req.alert_name,
            mitre_tactic: req.mitre_tactic,
            mitre_technique: req.mitre_technique,
            logs: req.logs,
            detection_model: req.detection_model,
            description: req.description,
        });

        let alert = self.store.insert_alert(&alert).await?;
        self.reconciler.reconcile_alert(&alert.id).await?;
        tracing::info!("Created alert {} for user {}", alert.id, alert.user);

        self.get_alert(&alert.id).await
    }

    pub async fn get_alert(&self, id: &str) -> ServiceResult<AlertRecord> {
        self.store
            .find_alert_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("alert {}", id)))
    }

    pub async fn update_alert(&self, id: &str, req: UpdateAlertRequest) -> ServiceResult<AlertRecord> {
        req.validate()?;
        let current = self.get_alert(id).await?;

        let mut next = current.clone();
        if let Some(user) = &req.user {
            next.user = user_field(user)?;
        }
        if let Some(v) = &req.occurred_at {
            next.occurred_at = stored_precision(timestamp_field("occurred_at", v)?);
        }
        if let Some(v) = &req.evidence {
            next.evidence = normalize_evidence(v);
        }
        if let Some(score) = req.score {
            next.score = score;
        }
        if let Some(name) = req.alert_name {
            next.alert_name = name;
        }
        if let Some(v) = req.mitre_tactic {
            next.mitre_tactic = v;
        }
        if let Some(v) = req.mitre_technique {
            next.mitre_technique = v;
        }
        if let Some(v) = req.logs {
            next.logs = v;
        }
        if let Some(v) = req.detection_model {
            next.detection_model = v;
        }
        if let Some(v) = req.description {
            next.description = v;
        }

        let new_id = next.computed_identity();
        if new_id == current.id {
            return self
                .store
                .update_alert(&next)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("alert {}", id)));
        }

        if self.store.find_alert_by_id(&new_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!("alert {} already exists", new_id)));
        }

        next.id = new_id;
        next.updated_at = Utc::now();
        let next = self.store.insert_alert(&next).await?;
        self.store.delete_alert(&current.id).await?;
        tracing::info!("Alert {} re-keyed to {}", current.id, next.id);

        self.reconciler.reconcile_alert(&next.id).await?;
        self.get_alert(&next.id).await
    }

    pub async fn delete_alert(&self, id: &str) -> ServiceResult<()> {
        if !self.store.delete_alert(id).await? {
            return Err(ServiceError::NotFound(format!("alert {}", id)));
        }
        tracing::info!("Deleted alert {}", id);
        Ok(())
    }

    // ========================================================================
    // INCIDENTS
    // ========================================================================

    pub async fn create_incident(&self, req: CreateIncidentRequest) -> ServiceResult<IncidentRecord> {
        req.validate()?;

        let incident = IncidentRecord::new(NewIncident {
            user: user_field(&req.user)?,
            window_start: timestamp_field("window_start", &req.window_start)?,
            window_end: timestamp_field("window_end", &req.window_end)?,
            score: req.score.unwrap_or(0.0),
            windows: parse_windows(&req.windows),
        })
        .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let incident = self.store.insert_incident(&incident).await?;
        let report = self.reconciler.reconcile_incident(&incident.id).await?;
        tracing::info!(
            "Created incident {} for user {} ({} alerts associated)",
            incident.id, incident.user, report.associated
        );

        Ok(incident)
    }

    pub async fn get_incident(&self, id: &str) -> ServiceResult<IncidentRecord> {
        self.store
            .find_incident_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("incident {}", id)))
    }

    pub async fn incident_alerts(&self, id: &str) -> ServiceResult<Vec<AlertRecord>> {
        let incident = self.get_incident(id).await?;
        Ok(self.store.find_alerts_by_incident(&incident.id).await?)
    }

    pub async fn update_incident(
        &self,
        id: &str,
        req: UpdateIncidentRequest,
    ) -> ServiceResult<IncidentRecord> {
        req.validate()?;
        let current = self.get_incident(id).await?;

        let mut next = current.clone();
        if let Some(user) = &req.user {
            next.user = user_field(user)?;
        }
        if let Some(v) = &req.window_start {
            next.window_start = stored_precision(timestamp_field("window_start", v)?);
        }
        if let Some(v) = &req.window_end {
            next.window_end = stored_precision(timestamp_field("window_end", v)?);
        }
        if let Some(score) = req.score {
            next.score = score;
        }
        if let Some(v) = &req.windows {
            next.windows = parse_windows(v).into_iter().map(stored_precision).collect();
        }

        if next.window_start > next.window_end {
            return Err(ServiceError::Validation(format!(
                "window start {} is after window end {}",
                next.window_start, next.window_end
            )));
        }

        let new_id = next.computed_identity();
        if new_id == current.id {
            return self
                .store
                .update_incident(&next)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("incident {}", id)));
        }

        if self.store.find_incident_by_id(&new_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!("incident {} already exists", new_id)));
        }

        next.id = new_id;
        next.updated_at = Utc::now();
        let next = self.store.insert_incident(&next).await?;
        self.store.delete_incident(&current.id).await?;
        tracing::info!("Incident {} re-keyed to {}", current.id, next.id);

        // alerts inside the new window first, then whatever still points at the old id
        self.reconciler.reconcile_incident(&next.id).await?;
        self.reconciler.release_incident(&current.user, &current.id).await?;

        Ok(next)
    }

    pub async fn delete_incident(&self, id: &str) -> ServiceResult<ReconcileReport> {
        let incident = self.get_incident(id).await?;
        if !self.store.delete_incident(id).await? {
            return Err(ServiceError::NotFound(format!("incident {}", id)));
        }

        let report = self.reconciler.release_incident(&incident.user, id).await?;
        tracing::info!(
            "Deleted incident {} ({} alerts re-homed, {} cleared)",
            id, report.associated, report.cleared
        );
        Ok(report)
    }

    // ========================================================================
    // RECONCILIATION & INGEST
    // ========================================================================

    pub async fn reconcile_user(&self, user: &str) -> ServiceResult<ReconcileReport> {
        Ok(self.reconciler.reconcile_user(user).await?)
    }

    /// Ingest a file sitting in the drop directory.
    pub async fn ingest_file(&self, file_name: &str, kind: RowKind) -> ServiceResult<IngestSummary> {
        let path = self.files.resolve(file_name)?;
        self.ingest_path(&path, kind).await
    }

    /// Read, persist and reconcile every valid row of `path`, then move it
    /// to the processed directory.
    ///
    /// File-level failures leave the file where it is.
    pub async fn ingest_path(&self, path: &Path, kind: RowKind) -> ServiceResult<IngestSummary> {
        let mut summary = IngestSummary::new(kind, path);
        tracing::info!("Ingest run {} started: {} ({})", summary.run_id, path.display(), kind);

        let source = path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || ingest::read_file(&source, kind))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;

        match parsed {
            ParsedRecords::Incidents(file) => {
                summary.rows_read = file.rows_read;
                summary.parsed = file.records.len();
                summary.skipped = file.skipped;

                let mut inserted = Vec::new();
                for incident in &file.records {
                    let result = self.store.insert_incident(incident).await;
                    if record_insert(&mut summary, result, &incident.id) {
                        inserted.push(incident.id.clone());
                    }
                }
                for id in &inserted {
                    match self.reconciler.reconcile_incident(id).await {
                        Ok(report) => summary.reconcile_failures += report.failed.len(),
                        Err(e) => {
                            tracing::warn!("Reconciliation of incident {} failed: {}", id, e);
                            summary.reconcile_failures += 1;
                        }
                    }
                }
            }
            ParsedRecords::Alerts(file) => {
                summary.rows_read = file.rows_read;
                summary.parsed = file.records.len();
                summary.skipped = file.skipped;

                let mut inserted = Vec::new();
                for alert in &file.records {
                    let result = self.store.insert_alert(alert).await;
                    if record_insert(&mut summary, result, &alert.id) {
                        inserted.push(alert.id.clone());
                    }
                }
                for id in &inserted {
                    if let Err(e) = self.reconciler.reconcile_alert(id).await {
                        tracing::warn!("Reconciliation of alert {} failed: {}", id, e);
                        summary.reconcile_failures += 1;
                    }
                }
            }
        }

        match self.files.mark_processed(path) {
            Ok(dest) => summary.moved_to = Some(dest),
            Err(e) => tracing::error!("Ingested {} but could not move it: {}", path.display(), e),
        }

        summary.finished_at = Utc::now();
        tracing::info!(
            "Ingest run {} finished: {} rows, {} inserted, {} duplicates, {} skipped, {} store failures",
            summary.run_id,
            summary.rows_read,
            summary.inserted,
            summary.duplicates,
            summary.skipped.len(),
            summary.store_failures
        );
        Ok(summary)
    }
}

/// Count one insert attempt. True if the record was stored.
fn record_insert<T>(summary: &mut IngestSummary, result: Result<T, StoreError>, id: &str) -> bool {
    match result {
        Ok(_) => {
            summary.inserted += 1;
            true
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Record {} already stored", id);
            summary.duplicates += 1;
            false
        }
        Err(e) => {
            tracing::warn!("Failed to store record {}: {}", id, e);
            summary.store_failures += 1;
            false
        }
    }
}

fn user_field(raw: &str) -> ServiceResult<String> {
    match raw.trim() {
        "" => Err(ServiceError::Validation("user must not be blank".to_string())),
        user => Ok(user.to_string()),
    }
}

fn timestamp_field(field: &str, value: &Value) -> ServiceResult<chrono::DateTime<Utc>> {
    parse_timestamp_value(value).map_err(|e| ServiceError::Validation(format!("{}: {}", field, e)))
}
