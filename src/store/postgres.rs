//! PostgreSQL store

use sqlx::PgPool;

use super::{RecordStore, StoreResult};
use crate::models::{AlertRecord, Association, IncidentRecord};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RecordStore for PgStore {
    async fn insert_alert(&self, alert: &AlertRecord) -> StoreResult<AlertRecord> {
        Ok(AlertRecord::insert(&self.pool, alert).await?)
    }

    async fn insert_incident(&self, incident: &IncidentRecord) -> StoreResult<IncidentRecord> {
        Ok(IncidentRecord::insert(&self.pool, incident).await?)
    }

    async fn find_alert_by_id(&self, id: &str) -> StoreResult<Option<AlertRecord>> {
        Ok(AlertRecord::find_by_id(&self.pool, id).await?)
    }

    async fn find_incident_by_id(&self, id: &str) -> StoreResult<Option<IncidentRecord>> {
        Ok(IncidentRecord::find_by_id(&self.pool, id).await?)
    }

    async fn find_alerts_by_user(&self, user: &str) -> StoreResult<Vec<AlertRecord>> {
        Ok(AlertRecord::find_by_user(&self.pool, user).await?)
    }

    async fn find_incidents_by_user(&self, user: &str) -> StoreResult<Vec<IncidentRecord>> {
        Ok(IncidentRecord::find_by_user(&self.pool, user).await?)
    }

    async fn find_alerts_by_incident(&self, incident_id: &str) -> StoreResult<Vec<AlertRecord>> {
        Ok(AlertRecord::find_by_incident(&self.pool, incident_id).await?)
    }

    async fn update_alert(&self, alert: &AlertRecord) -> StoreResult<Option<AlertRecord>> {
        Ok(AlertRecord::update(&self.pool, alert).await?)
    }

    async fn update_incident(&self, incident: &IncidentRecord) -> StoreResult<Option<IncidentRecord>> {
        Ok(IncidentRecord::update(&self.pool, incident).await?)
    }

    async fn update_alert_association(&self, id: &str, association: &Association) -> StoreResult<bool> {
        Ok(AlertRecord::update_association(&self.pool, id, association).await?)
    }

    async fn delete_alert(&self, id: &str) -> StoreResult<bool> {
        Ok(AlertRecord::delete(&self.pool, id).await?)
    }

    async fn delete_incident(&self, id: &str) -> StoreResult<bool> {
        Ok(IncidentRecord::delete(&self.pool, id).await?)
    }
}
