//! Persistence of synthesized insights
//!
//! The coordinator hands each insight to an [`InsightStore`] on a tracked
//! background task; `AgentCoordinator::flush` waits for those writes. A
//! failing store is logged and never fails the request.

use crate::error::{OrchestratorError, Result};
use crate::synthesis::SynthesizedInsight;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Destination for synthesized insights
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Persist one insight
    async fn store_insight(&self, insight: &SynthesizedInsight) -> Result<()>;

    /// Get the store's name
    fn name(&self) -> &str;
}

/// Store that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInsightStore;

#[async_trait]
impl InsightStore for NoopInsightStore {
    async fn store_insight(&self, _insight: &SynthesizedInsight) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlInsightStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlInsightStore {
    /// Create a store appending to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File the store appends to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InsightStore for JsonlInsightStore {
    async fn store_insight(&self, insight: &SynthesizedInsight) -> Result<()> {
        let mut line = serde_json::to_vec(insight)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                OrchestratorError::Persistence(format!("{}: {e}", self.path.display()))
            })?;
        file.write_all(&line)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
