//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の仕組み（ファイルシステム、時刻、ID 採番）への入口で、
//! 実装は `impls` に置く。

pub mod clock;
pub mod id_generator;
pub mod queue_adapter;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue_adapter::QueueAdapter;
