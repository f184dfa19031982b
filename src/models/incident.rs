//! Incident model

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use validator::Validate;

use super::stored_precision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IncidentRecord {
    /// Hash of (user, window_start, window_end)
    pub id: String,
    #[sqlx(rename = "username")]
    pub user: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub score: f64,
    /// Discrete timestamps composing the incident, in source order
    pub windows: Vec<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized incident content, before identity is assigned
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub user: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub score: f64,
    pub windows: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncidentError {
    #[error("window start {start} is after window end {end}")]
    InvertedWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIncidentRequest {
    #[validate(length(min = 1, message = "user must not be empty"))]
    pub user: String,
    pub window_start: serde_json::Value,
    pub window_end: serde_json::Value,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub windows: serde_json::Value,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateIncidentRequest {
    #[validate(length(min = 1, message = "user must not be empty"))]
    pub user: Option<String>,
    pub window_start: Option<serde_json::Value>,
    pub window_end: Option<serde_json::Value>,
    pub score: Option<f64>,
    pub windows: Option<serde_json::Value>,
}

/// Deterministic incident identity
pub fn incident_identity(user: &str, start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b"|");
    hasher.update(stored_precision(*start).to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    hasher.update(b"|");
    hasher.update(stored_precision(*end).to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    format!("{:x}", hasher.finalize())
}

impl IncidentRecord {
    pub fn new(data: NewIncident) -> Result<Self, IncidentError> {
        let window_start = stored_precision(data.window_start);
        let window_end = stored_precision(data.window_end);
        if window_start > window_end {
            return Err(IncidentError::InvertedWindow {
                start: window_start,
                end: window_end,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: incident_identity(&data.user, &window_start, &window_end),
            user: data.user,
            window_start,
            window_end,
            score: data.score,
            windows: data.windows.into_iter().map(stored_precision).collect(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Identity derived from the current field values
    pub fn computed_identity(&self) -> String {
        incident_identity(&self.user, &self.window_start, &self.window_end)
    }

    /// Inclusive on both bounds
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.window_start <= at && at <= self.window_end
    }

    /// Same user and the window contains `at`
    pub fn covers(&self, user: &str, at: DateTime<Utc>) -> bool {
        self.user == user && self.contains(at)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub async fn insert(pool: &PgPool, incident: &IncidentRecord) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, IncidentRecord>(
            r#"
            INSERT INTO incidents (id, username, window_start, window_end, score, windows, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#
        )
        .bind(&incident.id)
        .bind(&incident.user)
        .bind(incident.window_start)
        .bind(incident.window_end)
        .bind(incident.score)
        .bind(&incident.windows)
        .bind(incident.created_at)
        .bind(incident.updated_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, IncidentRecord>("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user(pool: &PgPool, user: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, IncidentRecord>(
            "SELECT * FROM incidents WHERE username = $1 ORDER BY window_start ASC, window_end ASC, id ASC"
        )
        .bind(user)
        .fetch_all(pool)
        .await
    }

    /// Save non-identity fields. Identity changes go through delete + insert.
    pub async fn update(pool: &PgPool, incident: &IncidentRecord) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, IncidentRecord>(
            r#"
            UPDATE incidents
            SET score = $2, windows = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(&incident.id)
        .bind(incident.score)
        .bind(&incident.windows)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM incidents WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
