//! CSV ingestion
//!
//! Reads an incident or alert export top to bottom and turns every usable row
//! into a complete record. Failures are tiered:
//!
//! - file level (missing / unreadable file, bad header): [`IngestError`], nothing is read
//! - row level (missing mandatory cell, bad timestamp, inverted window): row skipped with a warning
//! - field level (score, windows, evidence): best fallback substituted, row kept

pub mod files;
pub mod scanner;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AlertRecord, Evidence, IncidentError, IncidentRecord, NewAlert, NewIncident};
use crate::normalize::{normalize_evidence_str, parse_timestamp, parse_windows_str, TimestampError};

pub use files::{FileLifecycle, FileMoveError};

// ============================================================================
// KINDS & ERRORS
// ============================================================================

/// Which column set a file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Incident,
    Alert,
}

impl RowKind {
    /// Guess the kind from a file name (`incidents_2024.csv`, `Alert-Export.csv`).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("incident") {
            Some(RowKind::Incident)
        } else if lower.contains("alert") {
            Some(RowKind::Alert)
        } else {
            None
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Incident => write!(f, "incident"),
            RowKind::Alert => write!(f, "alert"),
        }
    }
}

impl FromStr for RowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incident" | "incidents" => Ok(RowKind::Incident),
            "alert" | "alerts" => Ok(RowKind::Alert),
            other => Err(format!("unknown row kind '{}'", other)),
        }
    }
}

/// File-level failure: nothing was ingested
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("cannot open {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read header of {path}: {message}")]
    BadHeader { path: PathBuf, message: String },
}

/// Row-level failure: the row is skipped
#[derive(Debug, Error)]
pub enum RowError {
    #[error("missing mandatory field '{0}'")]
    MissingField(&'static str),

    #[error("invalid timestamp in '{field}': {source}")]
    Timestamp {
        field: &'static str,
        #[source]
        source: TimestampError,
    },

    #[error(transparent)]
    Window(#[from] IncidentError),

    #[error("malformed row: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number in the file, header included
    pub row: usize,
    pub reason: String,
}

/// Rows of one file after normalization
#[derive(Debug)]
pub struct ParsedFile<T> {
    pub records: Vec<T>,
    pub rows_read: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug)]
pub enum ParsedRecords {
    Incidents(ParsedFile<IncidentRecord>),
    Alerts(ParsedFile<AlertRecord>),
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub kind: RowKind,
    pub file: PathBuf,
    pub rows_read: usize,
    pub parsed: usize,
    pub skipped: Vec<SkippedRow>,
    pub inserted: usize,
    pub duplicates: usize,
    pub store_failures: usize,
    /// Alerts whose association could not be brought up to date
    pub reconcile_failures: usize,
    /// Where the file ended up, if the move succeeded
    pub moved_to: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestSummary {
    pub fn new(kind: RowKind, file: &Path) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            kind,
            file: file.to_path_buf(),
            rows_read: 0,
            parsed: 0,
            skipped: Vec::new(),
            inserted: 0,
            duplicates: 0,
            store_failures: 0,
            reconcile_failures: 0,
            moved_to: None,
            started_at: now,
            finished_at: now,
        }
    }
}

// ============================================================================
// ROW ACCESS
// ============================================================================

/// One CSV row keyed by header
struct Row<'a> {
    headers: &'a [String],
    cells: HashMap<&'a str, &'a str>,
}

impl<'a> Row<'a> {
    fn new(headers: &'a [String], record: &'a csv::StringRecord) -> Self {
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.as_str(), v))
            .collect();
        Self { headers, cells }
    }

    /// Trimmed, non-empty cell. Falls back to a case-insensitive header match.
    fn get(&self, name: &str) -> Option<&'a str> {
        let raw = match self.cells.get(name) {
            Some(v) => Some(*v),
            None => self
                .headers
                .iter()
                .find(|h| h.eq_ignore_ascii_case(name))
                .and_then(|h| self.cells.get(h.as_str()).copied()),
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<&'a str, RowError> {
        self.get(name).ok_or(RowError::MissingField(name))
    }

    fn timestamp(&self, name: &'static str) -> Result<DateTime<Utc>, RowError> {
        parse_timestamp(self.require(name)?).map_err(|source| RowError::Timestamp { field: name, source })
    }

    /// Decimal cell; unparseable values fall back to 0
    fn score(&self) -> f64 {
        match self.get("score") {
            None => 0.0,
            Some(v) => match v.parse::<f64>() {
                Ok(s) if s.is_finite() => s,
                _ => {
                    tracing::warn!("Unparseable score '{}', using 0", v);
                    0.0
                }
            },
        }
    }

    fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }
}

// ============================================================================
// ROW BUILDERS
// ============================================================================

fn incident_from_row(row: &Row) -> Result<IncidentRecord, RowError> {
    let user = row.require("user")?;
    let window_start = row.timestamp("windows_start")?;
    let window_end = row.timestamp("windows_end")?;

    let incident = IncidentRecord::new(NewIncident {
        user: user.to_string(),
        window_start,
        window_end,
        score: row.score(),
        windows: row.get("windows").map(parse_windows_str).unwrap_or_default(),
    })?;
    Ok(incident)
}

fn alert_from_row(row: &Row) -> Result<AlertRecord, RowError> {
    let user = row.require("user")?;
    let occurred_at = match row.get("datestr") {
        Some(_) => row.timestamp("datestr")?,
        None => Utc::now(),
    };
    let evidence = row.get("evidence").map(normalize_evidence_str).unwrap_or_else(Evidence::default);

    Ok(AlertRecord::new(NewAlert {
        user: user.to_string(),
        occurred_at,
        evidence,
        score: row.score(),
        alert_name: row.text("alert_name"),
        mitre_tactic: row.text("MITRE_tactic"),
        mitre_technique: row.text("MITRE_technique"),
        logs: row.text("Logs"),
        detection_model: row.text("Detection_model"),
        description: row.text("Description"),
    }))
}

// ============================================================================
// FILE READERS
// ============================================================================

pub fn read_incidents(path: &Path) -> Result<ParsedFile<IncidentRecord>, IngestError> {
    read_rows(path, RowKind::Incident, incident_from_row)
}

pub fn read_alerts(path: &Path) -> Result<ParsedFile<AlertRecord>, IngestError> {
    read_rows(path, RowKind::Alert, alert_from_row)
}

pub fn read_file(path: &Path, kind: RowKind) -> Result<ParsedRecords, IngestError> {
    Ok(match kind {
        RowKind::Incident => ParsedRecords::Incidents(read_incidents(path)?),
        RowKind::Alert => ParsedRecords::Alerts(read_alerts(path)?),
    })
}

fn read_rows<T>(
    path: &Path,
    kind: RowKind,
    build: impl Fn(&Row) -> Result<T, RowError>,
) -> Result<ParsedFile<T>, IngestError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IngestError::FileNotFound(path.to_path_buf()),
        _ => IngestError::Unreadable { path: path.to_path_buf(), source: e },
    })?;

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| IngestError::BadHeader { path: path.to_path_buf(), message: e.to_string() })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut parsed = ParsedFile {
        records: Vec::new(),
        rows_read: 0,
        skipped: Vec::new(),
    };

    for (idx, result) in rdr.records().enumerate() {
        // +2 for header + 1-based
        let line = idx + 2;
        parsed.rows_read += 1;

        let outcome = result
            .map_err(|e| RowError::Malformed(e.to_string()))
            .and_then(|record| build(&Row::new(&headers, &record)));

        match outcome {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping {} row {} of {}: {}", kind, line, path.display(), e);
                parsed.skipped.push(SkippedRow { row: line, reason: e.to_string() });
            }
        }
    }

    if parsed.records.is_empty() {
        tracing::warn!(
            "No valid {} rows in {} ({} read, {} skipped)",
            kind,
            path.display(),
            parsed.rows_read,
            parsed.skipped.len()
        );
    } else {
        tracing::info!(
            "Parsed {} {} records from {} ({} skipped)",
            parsed.records.len(),
            kind,
            path.display(),
            parsed.skipped.len()
        );
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests;
