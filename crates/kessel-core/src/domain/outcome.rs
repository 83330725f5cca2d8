//! RequestResult: what a handler reports back to the worker.
//!
//! The worker maps each kind to a queue transition:
//! - `Success`   -> commit (archive as success)
//! - `Transient` -> rollback (back to the eligible pool, attempts + 1)
//! - `Fatal`     -> commit as failure (dead-letter)

use serde::{Deserialize, Serialize};

use super::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Transient,
    Fatal,
}

/// Immutable once built: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    kind: ResultKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    /// Messages the handler wants published once this one succeeds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    responses: Vec<Message>,
}

impl RequestResult {
    pub fn success() -> Self {
        Self {
            kind: ResultKind::Success,
            error: None,
            responses: Vec::new(),
        }
    }

    pub fn transient(error: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Transient,
            error: Some(error.into()),
            responses: Vec::new(),
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Fatal,
            error: Some(error.into()),
            responses: Vec::new(),
        }
    }

    pub fn with_responses(mut self, responses: impl IntoIterator<Item = Message>) -> Self {
        self.responses.extend(responses);
        self
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn responses(&self) -> &[Message] {
        &self.responses
    }

    pub(crate) fn into_responses(self) -> Vec<Message> {
        self.responses
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResultKind::Success
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ResultKind::Transient
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ResultKind::Fatal
    }
}
