//! Sample handlers used by `kessel run` and by the tests.
//!
//! | request_type  | handler                  | result                         |
//! |---------------|--------------------------|--------------------------------|
//! | `echo`        | `EchoHandler`            | writes payload to a file       |
//! | `upper`       | `UpperCaseHandler`       | writes upper-cased payload     |
//! | `lower`       | `LowerCaseHandler`       | writes lower-cased payload     |
//! | `success`     | `AlwaysSucceedHandler`   | success                        |
//! | `fail`        | `AlwaysFailHandler`      | fatal                          |
//! | `transient`   | `AlwaysTransientHandler` | transient                      |
//! | `fifty-fifty` | `FiftyFiftyHandler`      | success or transient at random |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use ulid::Ulid;

use crate::domain::{RequestResult, Result};
use crate::typed::{Handler, HandlerRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleHandlerConfig {
    /// Where the echo family writes `<ulid>.echo.txt` files.
    pub destination_directory: PathBuf,
}

impl Default for SampleHandlerConfig {
    fn default() -> Self {
        Self {
            destination_directory: PathBuf::from("/tmp/kessel/echo-output"),
        }
    }
}

/// Writes the payload text to `<destination>/<ulid>.echo.txt`.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    destination_directory: PathBuf,
}

impl EchoHandler {
    pub fn new(destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            destination_directory: destination_directory.into(),
        }
    }

    pub fn destination_directory(&self) -> &Path {
        &self.destination_directory
    }

    async fn write(&self, text: &str) -> RequestResult {
        // A disk problem may clear up, so write failures are retried.
        if let Err(e) = tokio::fs::create_dir_all(&self.destination_directory).await {
            return RequestResult::transient(format!(
                "create {}: {e}",
                self.destination_directory.display()
            ));
        }
        let path = self
            .destination_directory
            .join(format!("{}.echo.txt", Ulid::new()));
        match tokio::fs::write(&path, text).await {
            Ok(()) => {
                debug!(path = %path.display(), "echo written");
                RequestResult::success()
            }
            Err(e) => RequestResult::transient(format!("write {}: {e}", path.display())),
        }
    }
}

#[async_trait]
impl Handler<String> for EchoHandler {
    async fn handle(&self, payload: String) -> RequestResult {
        self.write(&payload).await
    }
}

#[derive(Debug, Clone)]
pub struct UpperCaseHandler(EchoHandler);

impl UpperCaseHandler {
    pub fn new(destination_directory: impl Into<PathBuf>) -> Self {
        Self(EchoHandler::new(destination_directory))
    }
}

#[async_trait]
impl Handler<String> for UpperCaseHandler {
    async fn handle(&self, payload: String) -> RequestResult {
        self.0.write(&payload.to_uppercase()).await
    }
}

#[derive(Debug, Clone)]
pub struct LowerCaseHandler(EchoHandler);

impl LowerCaseHandler {
    pub fn new(destination_directory: impl Into<PathBuf>) -> Self {
        Self(EchoHandler::new(destination_directory))
    }
}

#[async_trait]
impl Handler<String> for LowerCaseHandler {
    async fn handle(&self, payload: String) -> RequestResult {
        self.0.write(&payload.to_lowercase()).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSucceedHandler;

#[async_trait]
impl Handler<Value> for AlwaysSucceedHandler {
    async fn handle(&self, _payload: Value) -> RequestResult {
        RequestResult::success()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFailHandler;

#[async_trait]
impl Handler<Value> for AlwaysFailHandler {
    async fn handle(&self, _payload: Value) -> RequestResult {
        RequestResult::fatal("something unexpected occurred")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTransientHandler;

#[async_trait]
impl Handler<Value> for AlwaysTransientHandler {
    async fn handle(&self, _payload: Value) -> RequestResult {
        RequestResult::transient("temporarily unavailable, try again later")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FiftyFiftyHandler;

#[async_trait]
impl Handler<Value> for FiftyFiftyHandler {
    async fn handle(&self, _payload: Value) -> RequestResult {
        if rand::thread_rng().gen_bool(0.5) {
            RequestResult::success()
        } else {
            RequestResult::transient("coin came up tails, try again")
        }
    }
}

/// Registers every sample handler under its request type.
pub fn register_sample_handlers(
    registry: &mut HandlerRegistry,
    config: &SampleHandlerConfig,
) -> Result<()> {
    let dir = &config.destination_directory;
    registry.register::<String, _>("echo", EchoHandler::new(dir))?;
    registry.register::<String, _>("upper", UpperCaseHandler::new(dir))?;
    registry.register::<String, _>("lower", LowerCaseHandler::new(dir))?;
    registry.register::<Value, _>("success", AlwaysSucceedHandler)?;
    registry.register::<Value, _>("fail", AlwaysFailHandler)?;
    registry.register::<Value, _>("transient", AlwaysTransientHandler)?;
    registry.register::<Value, _>("fifty-fifty", FiftyFiftyHandler)?;
    Ok(())
}
