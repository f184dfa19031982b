//! In-memory store with the same uniqueness semantics as Postgres

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use super::{RecordStore, StoreError, StoreResult};
use crate::models::{AlertRecord, Association, IncidentRecord};

#[derive(Clone, Default)]
pub struct MemoryStore {
    alerts: Arc<RwLock<HashMap<String, AlertRecord>>>,
    incidents: Arc<RwLock<HashMap<String, IncidentRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.read().len()
    }
}

impl RecordStore for MemoryStore {
    async fn insert_alert(&self, alert: &AlertRecord) -> StoreResult<AlertRecord> {
        let mut alerts = self.alerts.write();
        if alerts.contains_key(&alert.id) {
            return Err(StoreError::Conflict(format!("alert {} already exists", alert.id)));
        }
        alerts.insert(alert.id.clone(), alert.clone());
        Ok(alert.clone())
    }

    async fn insert_incident(&self, incident: &IncidentRecord) -> StoreResult<IncidentRecord> {
        if incident.window_start > incident.window_end {
            return Err(StoreError::Rejected(format!("incident {} has an inverted window", incident.id)));
        }
        let mut incidents = self.incidents.write();
        if incidents.contains_key(&incident.id) {
            return Err(StoreError::Conflict(format!("incident {} already exists", incident.id)));
        }
        incidents.insert(incident.id.clone(), incident.clone());
        Ok(incident.clone())
    }

    async fn find_alert_by_id(&self, id: &str) -> StoreResult<Option<AlertRecord>> {
        Ok(self.alerts.read().get(id).cloned())
    }

    async fn find_incident_by_id(&self, id: &str) -> StoreResult<Option<IncidentRecord>> {
        Ok(self.incidents.read().get(id).cloned())
    }

    async fn find_alerts_by_user(&self, user: &str) -> StoreResult<Vec<AlertRecord>> {
        let mut list: Vec<AlertRecord> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.user == user)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn find_incidents_by_user(&self, user: &str) -> StoreResult<Vec<IncidentRecord>> {
        let mut list: Vec<IncidentRecord> = self
            .incidents
            .read()
            .values()
            .filter(|i| i.user == user)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.window_start
                .cmp(&b.window_start)
                .then_with(|| a.window_end.cmp(&b.window_end))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(list)
    }

    async fn find_alerts_by_incident(&self, incident_id: &str) -> StoreResult<Vec<AlertRecord>> {
        let mut list: Vec<AlertRecord> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.incident_id.as_deref() == Some(incident_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_alert(&self, alert: &AlertRecord) -> StoreResult<Option<AlertRecord>> {
        let mut alerts = self.alerts.write();
        Ok(alerts.get_mut(&alert.id).map(|stored| {
            stored.evidence = alert.evidence.clone();
            stored.score = alert.score;
            stored.mitre_tactic = alert.mitre_tactic.clone();
            stored.mitre_technique = alert.mitre_technique.clone();
            stored.logs = alert.logs.clone();
            stored.detection_model = alert.detection_model.clone();
            stored.description = alert.description.clone();
            stored.updated_at = Utc::now();
            stored.clone()
        }))
    }

    async fn update_incident(&self, incident: &IncidentRecord) -> StoreResult<Option<IncidentRecord>> {
        let mut incidents = self.incidents.write();
        Ok(incidents.get_mut(&incident.id).map(|stored| {
            stored.score = incident.score;
            stored.windows = incident.windows.clone();
            stored.updated_at = Utc::now();
            stored.clone()
        }))
    }

    async fn update_alert_association(&self, id: &str, association: &Association) -> StoreResult<bool> {
        let mut alerts = self.alerts.write();
        match alerts.get_mut(id) {
            Some(stored) => {
                stored.set_association(association.clone());
                stored.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_alert(&self, id: &str) -> StoreResult<bool> {
        Ok(self.alerts.write().remove(id).is_some())
    }

    async fn delete_incident(&self, id: &str) -> StoreResult<bool> {
        Ok(self.incidents.write().remove(id).is_some())
    }
}
