//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Simple query protocol: several statements in one round trip
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Incidents: id is a hash of (username, window_start, window_end)
CREATE TABLE IF NOT EXISTS incidents (
    id VARCHAR(64) PRIMARY KEY,
    username VARCHAR(255) NOT NULL,
    window_start TIMESTAMPTZ NOT NULL,
    window_end TIMESTAMPTZ NOT NULL,
    score DOUBLE PRECISION NOT NULL DEFAULT 0,
    windows TIMESTAMPTZ[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT incidents_window_order CHECK (window_start <= window_end)
);

-- Alerts: id is a hash of (username, occurred_at, alert_name).
-- incident_id is maintained by the reconciler, not by a foreign key.
CREATE TABLE IF NOT EXISTS alerts (
    id VARCHAR(64) PRIMARY KEY,
    username VARCHAR(255) NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    evidence JSONB NOT NULL DEFAULT '{"site": "", "count": 0, "list_raw_events": []}',
    score DOUBLE PRECISION NOT NULL DEFAULT 0,
    alert_name TEXT NOT NULL DEFAULT '',
    mitre_tactic TEXT NOT NULL DEFAULT '',
    mitre_technique TEXT NOT NULL DEFAULT '',
    logs TEXT NOT NULL DEFAULT '',
    detection_model TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    is_under_incident BOOLEAN NOT NULL DEFAULT false,
    incident_id VARCHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT alerts_evidence_shape CHECK (
        jsonb_typeof(evidence) = 'object'
        AND jsonb_typeof(evidence -> 'site') = 'string'
        AND jsonb_typeof(evidence -> 'count') = 'number'
        AND jsonb_typeof(evidence -> 'list_raw_events') = 'array'
    )
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_incidents_user_window ON incidents(username, window_start, window_end);
CREATE INDEX IF NOT EXISTS idx_alerts_user_time ON alerts(username, occurred_at);
CREATE INDEX IF NOT EXISTS idx_alerts_incident ON alerts(incident_id);
"#;
