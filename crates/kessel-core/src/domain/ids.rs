//! Message identifiers.
//!
//! The filesystem adapter generates ULIDs (see `ports::id_generator`): 48-bit
//! millisecond timestamp + 80-bit randomness, Crockford base32. Sorting file
//! names therefore sorts messages oldest-first.
//!
//! Other backends may hand out numeric ids; `MessageId` only requires a string.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use ulid::Ulid;

use super::errors::{KesselError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rejects ids that would escape or confuse the storage directories.
    ///
    /// An id is unsafe if it:
    /// - is empty
    /// - contains a path separator (`/` or `\`) or a NUL byte
    /// - starts with a dot (hidden file, `.` / `..` traversal)
    pub fn validate_for_path(&self) -> Result<()> {
        let id = self.as_str();
        if id.is_empty()
            || id.contains('/')
            || id.contains('\\')
            || id.contains('\0')
            || id.starts_with('.')
        {
            return Err(KesselError::InvalidMessageId(id.to_string()));
        }
        Ok(())
    }
}

impl From<Ulid> for MessageId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Accepts both `"abc"` and `123` on the wire; numbers are kept as their decimal text.
impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or unsigned integer message id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MessageId, E> {
                Ok(MessageId::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<MessageId, E> {
                Ok(MessageId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MessageId, E> {
                Ok(MessageId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MessageId, E> {
                u64::try_from(v)
                    .map(MessageId::from)
                    .map_err(|_| E::custom("negative message id"))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
