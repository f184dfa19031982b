//! Alert ↔ incident reconciliation
//!
//! Keeps `is_under_incident` / `incident_id` on alerts consistent with the
//! incident windows of the same user. Every run happens inside the user's
//! lock; each alert is still read, evaluated and written on its own, so a
//! failure on one alert never stops the rest.
//!
//! When several incidents of a user contain the same instant, the alert goes
//! to the one with the earliest `window_start`, then earliest `window_end`,
//! then smallest id. Both the alert-side and incident-side paths use the same
//! rule, so the final association depends only on stored data.

pub mod locks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{AlertRecord, Association, IncidentRecord};
use crate::store::{RecordStore, StoreError};
pub use locks::UserLocks;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of evaluating a single alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "incident_id", rename_all = "snake_case")]
pub enum AlertOutcome {
    Associated(String),
    Cleared,
    Unchanged,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub associated: usize,
    pub cleared: usize,
    pub unchanged: usize,
    /// (alert id, error)
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    fn record(&mut self, alert_id: &str, result: Result<AlertOutcome, StoreError>) {
        self.examined += 1;
        match result {
            Ok(AlertOutcome::Associated(_)) => self.associated += 1,
            Ok(AlertOutcome::Cleared) => self.cleared += 1,
            Ok(AlertOutcome::Unchanged) => self.unchanged += 1,
            Err(e) => {
                tracing::warn!("Reconciliation failed for alert {}: {}", alert_id, e);
                self.failed.push((alert_id.to_string(), e.to_string()));
            }
        }
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.examined += other.examined;
        self.associated += other.associated;
        self.cleared += other.cleared;
        self.unchanged += other.unchanged;
        self.failed.extend(other.failed);
    }
}

/// Pick the incident an alert at `at` belongs to.
pub fn select_incident<'a>(
    incidents: &'a [IncidentRecord],
    user: &str,
    at: DateTime<Utc>,
) -> Option<&'a IncidentRecord> {
    incidents
        .iter()
        .filter(|i| i.covers(user, at))
        .min_by(|a, b| {
            a.window_start
                .cmp(&b.window_start)
                .then_with(|| a.window_end.cmp(&b.window_end))
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// Association the alert should carry given the user's incidents
pub fn desired_association(alert: &AlertRecord, incidents: &[IncidentRecord]) -> Association {
    match select_incident(incidents, &alert.user, alert.occurred_at) {
        Some(incident) => Association::to(&incident.id),
        None => Association::none(),
    }
}

pub struct Reconciler<S> {
    store: Arc<S>,
    locks: UserLocks,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
        }
    }

    /// Alert created, or its user / time changed.
    pub async fn reconcile_alert(&self, alert_id: &str) -> Result<AlertOutcome, ReconcileError> {
        let user = self
            .store
            .find_alert_by_id(alert_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("alert {}", alert_id)))?
            .user;

        let _guard = self.locks.acquire(&user).await;

        // re-read under the lock
        let alert = self
            .store
            .find_alert_by_id(alert_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("alert {}", alert_id)))?;
        let incidents = self.store.find_incidents_by_user(&alert.user).await?;

        Ok(self.apply(&alert, &incidents).await?)
    }

    /// Incident created, or its user / window changed.
    ///
    /// Looks at the user's alerts that fall inside the window or currently
    /// point at this incident.
    pub async fn reconcile_incident(&self, incident_id: &str) -> Result<ReconcileReport, ReconcileError> {
        let user = self
            .store
            .find_incident_by_id(incident_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("incident {}", incident_id)))?
            .user;

        let _guard = self.locks.acquire(&user).await;

        let incident = self
            .store
            .find_incident_by_id(incident_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("incident {}", incident_id)))?;
        let incidents = self.store.find_incidents_by_user(&incident.user).await?;
        let alerts = self.store.find_alerts_by_user(&incident.user).await?;

        let mut report = ReconcileReport::default();
        for alert in alerts.iter().filter(|a| {
            incident.contains(a.occurred_at) || a.incident_id.as_deref() == Some(incident_id)
        }) {
            let result = self.apply(alert, &incidents).await;
            report.record(&alert.id, result);
        }

        tracing::debug!(
            "Reconciled incident {}: {} examined, {} associated, {} cleared",
            incident_id, report.examined, report.associated, report.cleared
        );
        Ok(report)
    }

    /// Incident removed or re-keyed: re-home every alert still pointing at it.
    pub async fn release_incident(
        &self,
        user: &str,
        incident_id: &str,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _guard = self.locks.acquire(user).await;

        let alerts = self.store.find_alerts_by_incident(incident_id).await?;
        let mut report = ReconcileReport::default();
        let mut incidents: Option<(String, Vec<IncidentRecord>)> = None;

        for alert in &alerts {
            let cached = match &incidents {
                Some((u, list)) if *u == alert.user => Ok(list.clone()),
                _ => self.store.find_incidents_by_user(&alert.user).await,
            };
            let result = match cached {
                Ok(list) => {
                    let outcome = self.apply(alert, &list).await;
                    incidents = Some((alert.user.clone(), list));
                    outcome
                }
                Err(e) => Err(e),
            };
            report.record(&alert.id, result);
        }

        Ok(report)
    }

    /// Re-evaluate every alert of a user.
    pub async fn reconcile_user(&self, user: &str) -> Result<ReconcileReport, ReconcileError> {
        let _guard = self.locks.acquire(user).await;

        let incidents = self.store.find_incidents_by_user(user).await?;
        let alerts = self.store.find_alerts_by_user(user).await?;

        let mut report = ReconcileReport::default();
        for alert in &alerts {
            let result = self.apply(alert, &incidents).await;
            report.record(&alert.id, result);
        }
        Ok(report)
    }

    async fn apply(
        &self,
        alert: &AlertRecord,
        incidents: &[IncidentRecord],
    ) -> Result<AlertOutcome, StoreError> {
        let desired = desired_association(alert, incidents);
        if desired == alert.association() {
            return Ok(AlertOutcome::Unchanged);
        }

        let found = self.store.update_alert_association(&alert.id, &desired).await?;
        if !found {
            tracing::debug!("Alert {} disappeared before its association was saved", alert.id);
            return Ok(AlertOutcome::Unchanged);
        }

        Ok(match desired.incident_id {
            Some(id) => AlertOutcome::Associated(id),
            None => AlertOutcome::Cleared,
        })
    }
}

#[cfg(test)]
mod tests;
