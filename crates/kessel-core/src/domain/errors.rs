//! Errors - エラー型と分類
//!
//! Handler の結果（success / transient / fatal）はエラーではなく `RequestResult` で表す。
//! ここに来るのは「その操作を続けられない」ものだけ：
//! - Storage / Malformed / IdMismatch: ディスク I/O 失敗や壊れたレコード（呼び出し元へ伝播、内部リトライなし）
//! - InvalidMessageId / InvalidPath / MissingId / IdAlreadyAssigned / NotLocked: 呼び出し側の誤用
//! - DuplicateHandler / Config: 起動時の構成ミス
//!
//! lock の rename 競合（NotFound / AlreadyExists）は想定内なのでここには現れない。

use std::path::PathBuf;

use thiserror::Error;

use super::MessageId;

#[derive(Debug, Error)]
pub enum KesselError {
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed message record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("message record {path} carries id={record_id} but is stored as {file_id}")]
    IdMismatch {
        path: PathBuf,
        record_id: MessageId,
        file_id: MessageId,
    },

    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid message id '{0}': not usable as a file name")]
    InvalidMessageId(String),

    #[error("invalid message path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("message has no id")]
    MissingId,

    #[error("message already has id={existing}, refusing to assign {requested}")]
    IdAlreadyAssigned {
        existing: MessageId,
        requested: MessageId,
    },

    #[error("message {0} already exists in the queue storage")]
    DuplicateMessage(MessageId),

    #[error("message {0} is not locked")]
    NotLocked(MessageId),

    #[error("duplicate handler for request_type={0}")]
    DuplicateHandler(String),

    #[error("id generation failed: {0}")]
    IdGeneration(String),

    #[error("config error: {0}")]
    Config(String),
}

impl KesselError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Disk or record-level failure. The worker stops on these.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            KesselError::Storage { .. }
                | KesselError::Malformed { .. }
                | KesselError::IdMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, KesselError>;
