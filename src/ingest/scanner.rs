//! Background drop-directory scanner

use std::sync::Arc;
use std::time::Duration;

use super::{IngestSummary, RowKind};
use crate::service::{RecordService, ServiceError};
use crate::store::RecordStore;

/// Scan the drop directory every `interval` until the task is dropped.
pub async fn run<S: RecordStore>(service: Arc<RecordService<S>>, interval: Duration) {
    tracing::info!(
        "Drop directory scanner started: {} every {:?}",
        service.files().drop_dir().display(),
        interval
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let summaries = scan_once(&service).await;
        if !summaries.is_empty() {
            tracing::debug!("Scanner ingested {} files", summaries.len());
        }
    }
}

/// Ingest every pending file once, in name order.
///
/// Files whose kind cannot be told from the name stay where they are. Files
/// that fail at file level are moved to the error directory if still present.
pub async fn scan_once<S: RecordStore>(service: &RecordService<S>) -> Vec<IngestSummary> {
    let pending = match service.files().pending() {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("Cannot list {}: {}", service.files().drop_dir().display(), e);
            return Vec::new();
        }
    };

    let mut summaries = Vec::new();
    for path in pending {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(kind) = RowKind::from_file_name(&name) else {
            tracing::warn!("Cannot tell whether {} holds alerts or incidents, leaving it", name);
            continue;
        };

        match service.ingest_path(&path, kind).await {
            Ok(summary) => summaries.push(summary),
            Err(ServiceError::Ingest(e)) if path.exists() => {
                tracing::error!("Ingest of {} failed: {}", name, e);
                if let Err(move_err) = service.files().mark_failed(&path) {
                    tracing::error!("Could not move {} to the error directory: {}", name, move_err);
                }
            }
            Err(e) => tracing::error!("Ingest of {} failed: {}", name, e),
        }
    }
    summaries
}
