//! AppBuilder - Handler の登録と起動時検証
//!
//! # Fail-fast
//! - `expect_request_types()` で処理するつもりの request_type を宣言
//! - `build()` 時に「期待集合 ⊆ 登録済み集合」をチェック
//! - 不足があれば BuildError を返す（worker を起動してから unroutable に気づくより早い）

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::worker_loop::{Worker, WorkerConfig};
use crate::domain::KesselError;
use crate::impls::sample_handlers::{SampleHandlerConfig, register_sample_handlers};
use crate::ports::QueueAdapter;
use crate::typed::{Handler, HandlerRegistry};

/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<String, _>("echo", EchoHandler::new("/tmp/out"))?
///     .expect_request_types(&["echo"])
///     .build()?;
/// let worker = app.worker(adapter, WorkerConfig::default());
/// ```
pub struct AppBuilder {
    registry: HandlerRegistry,
    expected_request_types: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing request types: {0:?}. These request types were expected but not registered.")]
    MissingRequestTypes(Vec<String>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            expected_request_types: None,
        }
    }

    /// Handler を登録
    pub fn register<T, H>(
        mut self,
        request_type: impl Into<String>,
        handler: H,
    ) -> Result<Self, KesselError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        H: Handler<T> + 'static,
    {
        self.registry.register::<T, H>(request_type, handler)?;
        Ok(self)
    }

    /// `echo`, `upper`, ... のサンプル Handler をまとめて登録
    pub fn with_sample_handlers(mut self, config: &SampleHandlerConfig) -> Result<Self, KesselError> {
        register_sample_handlers(&mut self.registry, config)?;
        Ok(self)
    }

    /// 期待される request_type のリストを設定
    pub fn expect_request_types(mut self, request_types: &[&str]) -> Self {
        self.expected_request_types = Some(request_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected_request_types {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRequestTypes(missing));
            }
        }
        Ok(App {
            registry: Arc::new(self.registry),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 検証済みの Handler 集合。ここから Worker を作る。
pub struct App {
    registry: Arc<HandlerRegistry>,
}

impl App {
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn worker(&self, adapter: Arc<dyn QueueAdapter>, config: WorkerConfig) -> Worker {
        Worker::new(adapter, Arc::clone(&self.registry), config)
    }
}
