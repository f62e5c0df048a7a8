// User feedback on transliterations, kept in memory and mirrored to a JSON file

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::errors::{FeedbackError, FeedbackResult};
use crate::utils::Metrics;

/// Body of a feedback submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub original_text: Option<String>,
    pub expected_output: Option<String>,
    pub accuracy: Option<f64>,
    pub manual_correction: Option<String>,
}

impl FeedbackRequest {
    fn into_entry(self) -> FeedbackResult<FeedbackEntry> {
        Ok(FeedbackEntry {
            original_text: self
                .original_text
                .ok_or(FeedbackError::MissingField("originalText"))?,
            expected_output: self
                .expected_output
                .ok_or(FeedbackError::MissingField("expectedOutput"))?,
            accuracy: self.accuracy.ok_or(FeedbackError::MissingField("accuracy"))?,
            manual_correction: self.manual_correction.unwrap_or_default(),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub original_text: String,
    pub expected_output: String,
    pub manual_correction: String,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeedbackStore {
    path: PathBuf,
    entries: Arc<RwLock<Vec<FeedbackEntry>>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    metrics: Option<Metrics>,
}

impl FeedbackStore {
    /// Open the store, reading any entries already on disk.
    ///
    /// A missing file starts empty; so does an unreadable one, with a warning.
    pub async fn load(path: impl AsRef<Path>, metrics: Option<Metrics>) -> Self {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<Vec<FeedbackEntry>>(&data) {
                Ok(entries) => {
                    info!("✓ Loaded {} feedback entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring unreadable feedback file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read feedback file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            metrics,
        }
    }

    /// Validate and record one submission.
    ///
    /// Only a missing required field is an error; failing to write the file
    /// is logged and the entry stays in memory.
    pub async fn submit(&self, request: FeedbackRequest) -> FeedbackResult<FeedbackEntry> {
        let entry = request.into_entry()?;
        self.entries.write().push(entry.clone());
        if let Some(ref m) = self.metrics {
            m.record_feedback();
        }

        if let Err(e) = self.persist().await {
            warn!("Feedback kept in memory only: {}", e);
        }
        Ok(entry)
    }

    /// Rewrite the whole file from memory
    pub async fn persist(&self) -> FeedbackResult<()> {
        let _guard = self.write_lock.lock().await;
        let json = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries)?
        };

        let tmp = self.path.with_extension("json.tmp");
        let save_failed = |source| FeedbackError::SaveFailed {
            path: self.path.display().to_string(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(save_failed)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(save_failed)?;

        debug!("Feedback saved to {}", self.path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<FeedbackEntry> {
        self.entries.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
