//! Record persistence
//!
//! The reconciler and ingestion code only see [`RecordStore`]. Uniqueness of
//! record identities is the store's job and surfaces as
//! [`StoreError::Conflict`].

pub mod postgres;
pub mod memory;

use std::future::Future;

use thiserror::Error;

use crate::models::{AlertRecord, Association, IncidentRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record with the same identity already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store rejected the record's shape
    #[error("rejected by store: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
            if db.is_check_violation() {
                return StoreError::Rejected(db.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

/// Persistence primitives needed by ingestion and reconciliation.
pub trait RecordStore: Send + Sync + 'static {
    fn insert_alert(&self, alert: &AlertRecord)
        -> impl Future<Output = StoreResult<AlertRecord>> + Send;

    fn insert_incident(&self, incident: &IncidentRecord)
        -> impl Future<Output = StoreResult<IncidentRecord>> + Send;

    fn find_alert_by_id(&self, id: &str)
        -> impl Future<Output = StoreResult<Option<AlertRecord>>> + Send;

    fn find_incident_by_id(&self, id: &str)
        -> impl Future<Output = StoreResult<Option<IncidentRecord>>> + Send;

    /// Ordered by `occurred_at`, then id
    fn find_alerts_by_user(&self, user: &str)
        -> impl Future<Output = StoreResult<Vec<AlertRecord>>> + Send;

    /// Ordered by `window_start`, `window_end`, then id
    fn find_incidents_by_user(&self, user: &str)
        -> impl Future<Output = StoreResult<Vec<IncidentRecord>>> + Send;

    fn find_alerts_by_incident(&self, incident_id: &str)
        -> impl Future<Output = StoreResult<Vec<AlertRecord>>> + Send;

    /// Saves non-identity, non-association fields. `None` if the alert is gone.
    fn update_alert(&self, alert: &AlertRecord)
        -> impl Future<Output = StoreResult<Option<AlertRecord>>> + Send;

    /// Saves non-identity fields. `None` if the incident is gone.
    fn update_incident(&self, incident: &IncidentRecord)
        -> impl Future<Output = StoreResult<Option<IncidentRecord>>> + Send;

    /// Returns false if the alert no longer exists
    fn update_alert_association(
        &self,
        id: &str,
        association: &Association,
    )
        -> impl Future<Output = StoreResult<bool>> + Send;

    fn delete_alert(&self, id: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    fn delete_incident(&self, id: &str) -> impl Future<Output = StoreResult<bool>> + Send;
}
