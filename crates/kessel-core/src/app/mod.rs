//! App - アプリケーション層
//!
//! ports と impls を組み合わせて worker を動かす。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: Handler の登録と起動時検証
//! - **Worker**: dequeue → handle → commit/rollback のループ
//! - **KesselConfig**: JSON 設定ファイル

pub mod builder;
pub mod config;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{KesselConfig, QueueAdapterType};
pub use self::worker_loop::{Disposition, RunSummary, StopReason, Worker, WorkerConfig};
