//! kessel-core
//!
//! Broker-agnostic message queue: a message model, a `QueueAdapter` port,
//! a filesystem queue whose only lock is an atomic rename, and a worker that
//! routes messages to handlers by request type.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, eligibility, outcome, retry, state, errors）
//! - **ports**: 抽象化レイヤー（QueueAdapter, Clock, IdGenerator）
//! - **impls**: 実装（FileQueueAdapter, InMemoryQueueAdapter, sample handlers）
//! - **typed**: 型付き Handler API（Handler trait, HandlerRegistry）
//! - **app**: アプリケーション層（AppBuilder, Worker, KesselConfig）
//! - **observability**: adapter / worker のカウンタ
//! - **telemetry**: tracing subscriber の初期化

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod telemetry;
pub mod typed;

pub use app::{AppBuilder, KesselConfig, Worker, WorkerConfig};
pub use domain::{KesselError, Message, MessageId, MessageState, RequestResult, Result};
pub use impls::{FileQueueAdapter, FileQueueConfig, InMemoryQueueAdapter};
pub use ports::QueueAdapter;
pub use typed::{Handler, HandlerRegistry};
