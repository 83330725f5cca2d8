//! IdGenerator port - ID 生成の抽象化
//!
//! # ULID の特性
//! - 先頭 48bit がミリ秒 timestamp → 文字列ソート = 時刻順
//! - 後半 80bit がランダム → 複数プロセス・複数ホストで調整なしに生成可能
//!
//! 同一ミリ秒内でも順序を保つため `ulid::Generator`（monotonic）を使う。
//! プロセスをまたいだ同一ミリ秒の順序は保証しない（best-effort FIFO）。

use std::sync::Mutex;
use std::time::SystemTime;

use ulid::Generator;

use crate::domain::{KesselError, MessageId, Result};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> Result<MessageId>;
}

/// ULID ベースの ID 生成器。Clock から timestamp を取る。
pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> Result<MessageId> {
        let at: SystemTime = self.clock.now().into();
        let mut generator = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        let ulid = generator
            .generate_from_datetime(at)
            .map_err(|e| KesselError::IdGeneration(e.to_string()))?;
        Ok(MessageId::from(ulid))
    }
}
