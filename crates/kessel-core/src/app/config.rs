//! Runtime configuration, deserializable from JSON.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::worker_loop::WorkerConfig;
use crate::domain::{KesselError, Result};
use crate::impls::{FileQueueAdapter, FileQueueConfig, InMemoryQueueAdapter, SampleHandlerConfig};
use crate::ports::QueueAdapter;

/// Which queue backend the worker runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueAdapterType {
    #[default]
    #[serde(rename = "file_queue_adapter", alias = "FileQueueAdapter")]
    File,
    /// Process-local; only useful when publisher and worker share the process.
    #[serde(rename = "memory", alias = "InMemoryQueueAdapter")]
    Memory,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KesselConfig {
    /// `null` keeps the worker polling forever.
    pub shutdown_after_number_of_empty_iterations: Option<u32>,
    pub sleep_duration_ms: u64,
    pub queue_adapter_type: QueueAdapterType,
    pub file_queue_adapter: FileQueueConfig,
    pub sample_handlers: SampleHandlerConfig,
}

impl Default for KesselConfig {
    fn default() -> Self {
        Self {
            shutdown_after_number_of_empty_iterations: Some(5),
            sleep_duration_ms: 5_000,
            queue_adapter_type: QueueAdapterType::default(),
            file_queue_adapter: FileQueueConfig::default(),
            sample_handlers: SampleHandlerConfig::default(),
        }
    }
}

impl KesselConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KesselError::Config(e.to_string()))
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KesselError::storage(path, e))?;
        let config = serde_json::from_str(&text)
            .map_err(|e| KesselError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::from_millis(self.sleep_duration_ms)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_idle_shutdown(self.shutdown_after_number_of_empty_iterations)
            .with_sleep_duration(self.sleep_duration())
    }

    /// Builds the configured adapter.
    pub async fn open_adapter(&self) -> Result<Arc<dyn QueueAdapter>> {
        let adapter: Arc<dyn QueueAdapter> = match self.queue_adapter_type {
            QueueAdapterType::File => {
                Arc::new(FileQueueAdapter::open(self.file_queue_adapter.clone()).await?)
            }
            QueueAdapterType::Memory => Arc::new(InMemoryQueueAdapter::new()),
        };
        Ok(adapter)
    }
}
