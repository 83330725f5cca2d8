//! QueueAdapter port - すべてのバックエンドが満たす契約
//!
//! # 状態遷移の責任
//! - adapter が状態遷移（queued / locked / archived）を管理する
//! - worker は handler の結果を commit / rollback として報告するだけ
//!
//! # 保証
//! - `enqueue`: 永続化が完了してから返る。書きかけのレコードは `dequeue` から見えない
//! - `dequeue`: 同じメッセージを同時に二つの呼び出し元へ渡さない（at-least-once, not exactly-once）
//! - `commit` / `rollback`: `dequeue` が返したメッセージにのみ有効

use async_trait::async_trait;

use crate::domain::{Message, MessageId, MessageState, Result};

#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Persist a new message and return it with its assigned id.
    async fn enqueue(&self, message: Message) -> Result<Message>;

    /// Reserve the next eligible message, or `None` when nothing is deliverable now.
    async fn dequeue(&self) -> Result<Option<Message>>;

    /// Finish a reserved message. `success = false` dead-letters it.
    async fn commit(&self, message: &Message, success: bool) -> Result<()>;

    /// Return a reserved message to the eligible pool with one more failed attempt.
    async fn rollback(&self, message: &Message) -> Result<()>;

    /// Read a stored message wherever it currently lives.
    async fn peek(&self, id: &MessageId) -> Result<Option<Message>>;

    /// Remove a queued (not reserved, not archived) message.
    /// Returns `false` when there was no queued message with this id.
    async fn delete(&self, id: &MessageId) -> Result<bool>;

    /// Diagnostic only: the answer can be stale by the time it is read.
    async fn lookup_state(&self, id: &MessageId) -> Result<MessageState>;
}
