//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FileQueueAdapter**: ディレクトリと rename によるキュー（複数プロセス間で共有可能）
//! - **InMemoryQueueAdapter**: 同一プロセス内だけのキュー（組み込み・テスト用）
//! - **sample_handlers**: 動作確認用の Handler 群

pub mod file_queue;
pub mod memory_queue;
pub mod sample_handlers;

pub use self::file_queue::{FileQueueAdapter, FileQueueConfig};
pub use self::memory_queue::InMemoryQueueAdapter;
pub use self::sample_handlers::{SampleHandlerConfig, register_sample_handlers};
