//! Message state as seen from storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a message currently lives.
///
/// State transitions:
/// - Queued -> Locked (dequeue wins the lock)
/// - Queued -> ArchivedFailure (attempts exhausted or expired, found during a scan)
/// - Locked -> ArchivedSuccess (commit success)
/// - Locked -> ArchivedFailure (commit failure)
/// - Locked -> Queued (rollback, attempts + 1)
///
/// `Unknown` is not a state of the machine; it answers a lookup for an id that
/// no location holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageState {
    Unknown,
    Queued,
    Locked,
    ArchivedSuccess,
    ArchivedFailure,
}

impl MessageState {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageState::Unknown => "unknown",
            MessageState::Queued => "queued",
            MessageState::Locked => "locked",
            MessageState::ArchivedSuccess => "archived-success",
            MessageState::ArchivedFailure => "archived-failure",
        }
    }

    /// Archived either way; no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageState::ArchivedSuccess | MessageState::ArchivedFailure
        )
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for state in [
            MessageState::Unknown,
            MessageState::Queued,
            MessageState::Locked,
            MessageState::ArchivedSuccess,
            MessageState::ArchivedFailure,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn only_archives_are_terminal() {
        assert!(MessageState::ArchivedSuccess.is_terminal());
        assert!(MessageState::ArchivedFailure.is_terminal());
        assert!(!MessageState::Locked.is_terminal());
        assert!(!MessageState::Queued.is_terminal());
    }
}
