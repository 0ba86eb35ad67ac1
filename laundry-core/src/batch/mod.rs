//! Object-created batch handling.
//!
//! ```text
//! notification ──► for each record:
//!     location()  ── malformed ──► failed
//!     fetch()     ── error ──────► failed + redeliver
//!     stage → classify → DetectionEvent
//!     deliver()   ── error ──────► failed + redeliver
//!     cleanup staged file (always)
//! ```
//!
//! One bad record never stops the rest of the batch.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    classifier::ClipClassifier,
    error::Result,
    events::{DetectionEvent, ObjectCreatedNotification, ObjectLocation},
    storage::{ObjectStore, StagedClip},
    transport::ResultSink,
};

/// Summary of one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    /// `bucket/key` (or a record index for malformed records) per failure.
    pub failed_files: Vec<String>,
    /// Items whose failure is worth retrying by re-sending the record.
    pub redeliver: Vec<String>,
}

impl BatchReport {
    pub fn needs_redelivery(&self) -> bool {
        !self.redeliver.is_empty()
    }
}

enum ItemFailure {
    /// Retrying the same record will not help.
    Drop(String),
    /// Retrying may succeed.
    Redeliver(String),
}

pub struct BatchHandler<S, K> {
    classifier: ClipClassifier,
    store: S,
    sink: K,
    staging_dir: PathBuf,
}

impl<S: ObjectStore, K: ResultSink> BatchHandler<S, K> {
    pub fn new(classifier: ClipClassifier, store: S, sink: K, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            classifier,
            store,
            sink,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn process(&self, notification: &ObjectCreatedNotification) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, record) in notification.records.iter().enumerate() {
            let location = match record.location() {
                Ok(location) => location,
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed record");
                    report.failed += 1;
                    report.failed_files.push(format!("record[{index}]"));
                    continue;
                }
            };

            match self.process_item(&location) {
                Ok(()) => report.processed += 1,
                Err(ItemFailure::Drop(reason)) => {
                    warn!(file = %location.display_name(), %reason, "record failed");
                    report.failed += 1;
                    report.failed_files.push(location.display_name());
                }
                Err(ItemFailure::Redeliver(reason)) => {
                    warn!(file = %location.display_name(), %reason, "record failed; marking for redelivery");
                    report.failed += 1;
                    report.failed_files.push(location.display_name());
                    report.redeliver.push(location.display_name());
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            redeliver = report.redeliver.len(),
            "batch complete"
        );
        report
    }

    fn process_item(&self, location: &ObjectLocation) -> std::result::Result<(), ItemFailure> {
        info!(bucket = %location.bucket, key = %location.key, "processing clip");

        let bytes = self
            .store
            .fetch(&location.bucket, &location.key)
            .map_err(|e| ItemFailure::Redeliver(format!("fetch failed: {e}")))?;

        let mut staged = StagedClip::write(&self.staging_dir, &bytes)
            .map_err(|e| ItemFailure::Redeliver(format!("staging failed: {e}")))?;

        let result = staged
            .path()
            .map(|path| self.classifier.classify_file(path))
            .unwrap_or_default();
        staged.cleanup();

        let timestamp = location
            .event_time
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(now_rfc3339);
        let event = DetectionEvent::new(location.key.clone(), timestamp, &result);

        self.sink.deliver(&event).map(|_| ()).map_err(|e| {
            if let crate::transport::DeliveryError::Permanent { .. } = e {
                ItemFailure::Drop(format!("delivery rejected: {e}"))
            } else {
                ItemFailure::Redeliver(format!("delivery failed: {e}"))
            }
        })
    }
}

/// Parse and process a raw notification body.
pub fn process_json<S: ObjectStore, K: ResultSink>(
    handler: &BatchHandler<S, K>,
    raw: &str,
) -> Result<BatchReport> {
    let notification = ObjectCreatedNotification::from_json(raw)?;
    Ok(handler.process(&notification))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
