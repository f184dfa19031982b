//! Alert model

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use validator::Validate;

use super::{stored_precision, Evidence};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AlertRecord {
    /// Hash of (user, occurred_at, alert_name)
    pub id: String,
    #[sqlx(rename = "username")]
    pub user: String,
    pub occurred_at: DateTime<Utc>,
    #[sqlx(json)]
    pub evidence: Evidence,
    pub score: f64,
    pub alert_name: String,
    pub mitre_tactic: String,
    pub mitre_technique: String,
    pub logs: String,
    pub detection_model: String,
    pub description: String,
    pub is_under_incident: bool,
    pub incident_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized alert content, before identity is assigned
#[derive(Debug, Clone, Default)]
pub struct NewAlert {
    pub user: String,
    pub occurred_at: DateTime<Utc>,
    pub evidence: Evidence,
    pub score: f64,
    pub alert_name: String,
    pub mitre_tactic: String,
    pub mitre_technique: String,
    pub logs: String,
    pub detection_model: String,
    pub description: String,
}

/// The alert fields owned by the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Association {
    pub is_under_incident: bool,
    pub incident_id: Option<String>,
}

impl Association {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to(incident_id: &str) -> Self {
        Self {
            is_under_incident: true,
            incident_id: Some(incident_id.to_string()),
        }
    }
}

/// Create alert request. Time and evidence accept every shape the CSV ingest accepts.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlertRequest {
    #[validate(length(min = 1, message = "user must not be empty"))]
    pub user: String,
    #[serde(default)]
    pub occurred_at: Option<serde_json::Value>,
    #[serde(default)]
    pub evidence: serde_json::Value,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub alert_name: String,
    #[serde(default)]
    pub mitre_tactic: String,
    #[serde(default)]
    pub mitre_technique: String,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub detection_model: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAlertRequest {
    #[validate(length(min = 1, message = "user must not be empty"))]
    pub user: Option<String>,
    pub occurred_at: Option<serde_json::Value>,
    pub evidence: Option<serde_json::Value>,
    pub score: Option<f64>,
    pub alert_name: Option<String>,
    pub mitre_tactic: Option<String>,
    pub mitre_technique: Option<String>,
    pub logs: Option<String>,
    pub detection_model: Option<String>,
    pub description: Option<String>,
}

/// Deterministic alert identity
pub fn alert_identity(user: &str, occurred_at: &DateTime<Utc>, alert_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b"|");
    hasher.update(stored_precision(*occurred_at).to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    hasher.update(b"|");
    hasher.update(alert_name.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl AlertRecord {
    pub fn new(data: NewAlert) -> Self {
        let now = Utc::now();
        let occurred_at = stored_precision(data.occurred_at);
        Self {
            id: alert_identity(&data.user, &occurred_at, &data.alert_name),
            user: data.user,
            occurred_at,
            evidence: data.evidence,
            score: data.score,
            alert_name: data.alert_name,
            mitre_tactic: data.mitre_tactic,
            mitre_technique: data.mitre_technique,
            logs: data.logs,
            detection_model: data.detection_model,
            description: data.description,
            is_under_incident: false,
            incident_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity derived from the current field values
    pub fn computed_identity(&self) -> String {
        alert_identity(&self.user, &self.occurred_at, &self.alert_name)
    }

    pub fn association(&self) -> Association {
        Association {
            is_under_incident: self.is_under_incident,
            incident_id: self.incident_id.clone(),
        }
    }

    pub fn set_association(&mut self, association: Association) {
        self.is_under_incident = association.is_under_incident;
        self.incident_id = association.incident_id;
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub async fn insert(pool: &PgPool, alert: &AlertRecord) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>(
            r#"
            INSERT INTO alerts (id, username, occurred_at, evidence, score, alert_name, mitre_tactic,
                                mitre_technique, logs, detection_model, description,
                                is_under_incident, incident_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#
        )
        .bind(&alert.id)
        .bind(&alert.user)
        .bind(alert.occurred_at)
        .bind(sqlx::types::Json(&alert.evidence))
        .bind(alert.score)
        .bind(&alert.alert_name)
        .bind(&alert.mitre_tactic)
        .bind(&alert.mitre_technique)
        .bind(&alert.logs)
        .bind(&alert.detection_model)
        .bind(&alert.description)
        .bind(alert.is_under_incident)
        .bind(&alert.incident_id)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user(pool: &PgPool, user: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>(
            "SELECT * FROM alerts WHERE username = $1 ORDER BY occurred_at ASC, id ASC"
        )
        .bind(user)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_incident(pool: &PgPool, incident_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>(
            "SELECT * FROM alerts WHERE incident_id = $1 ORDER BY occurred_at ASC, id ASC"
        )
        .bind(incident_id)
        .fetch_all(pool)
        .await
    }

    /// Save non-identity fields. Identity changes go through delete + insert.
    pub async fn update(pool: &PgPool, alert: &AlertRecord) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>(
            r#"
            UPDATE alerts
            SET evidence = $2, score = $3, mitre_tactic = $4, mitre_technique = $5, logs = $6,
                detection_model = $7, description = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(&alert.id)
        .bind(sqlx::types::Json(&alert.evidence))
        .bind(alert.score)
        .bind(&alert.mitre_tactic)
        .bind(&alert.mitre_technique)
        .bind(&alert.logs)
        .bind(&alert.detection_model)
        .bind(&alert.description)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_association(
        pool: &PgPool,
        id: &str,
        association: &Association,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET is_under_incident = $2, incident_id = $3, updated_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(association.is_under_incident)
        .bind(&association.incident_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
