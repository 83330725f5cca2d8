//! Message - the unit of work.
//!
//! # Wire format
//! A message is stored and transported as one JSON object:
//!
//! ```json
//! {
//!   "id": "01J9Z6Q4X4N7M3C2V1B0A9S8D7",
//!   "header": { "request_type": "echo", "delay": "2026-01-01T00:00:00Z", "attempts": 0 },
//!   "body": { "payload": "hello world" }
//! }
//! ```
//!
//! # 設計
//! - 内部は型付き（id / request_type / delay / expiration / attempts）
//! - body と未知の header キーだけが自由形式の JSON map
//! - `get` / `set` はドット区切りパスで wire 形式と同じ見え方を提供する
//!   （"body.payload", "header.request_type", "body.parent.k1"）
//!
//! `id` と `header.attempts` は queue adapter の管理下にあるため `set` では変更できない。

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MessageId;
use super::errors::{KesselError, Result};

/// Body key that conventionally holds the primary content.
pub const PAYLOAD_KEY: &str = "payload";

/// When a header timestamp takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Relative to the moment the message is built.
    After(Duration),
    /// Absolute point in time.
    At(DateTime<Utc>),
}

impl Schedule {
    pub fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::At(at) => at,
            Schedule::After(after) => add_duration(now, after),
        }
    }
}

impl From<Duration> for Schedule {
    fn from(d: Duration) -> Self {
        Schedule::After(d)
    }
}

impl From<DateTime<Utc>> for Schedule {
    fn from(at: DateTime<Utc>) -> Self {
        Schedule::At(at)
    }
}

/// `now + d`, saturating at the far end of chrono's range.
pub(crate) fn add_duration(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_type: Option<String>,

    /// Not deliverable before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay: Option<DateTime<Utc>>,

    /// Dead-lettered instead of delivered after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<DateTime<Utc>>,

    /// Failed delivery attempts (rollbacks) so far.
    #[serde(default)]
    attempts: u32,

    /// Any other header keys, e.g. `source`.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Header {
    pub fn request_type(&self) -> Option<&str> {
        self.request_type.as_deref()
    }

    pub fn delay(&self) -> Option<DateTime<Utc>> {
        self.delay
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<MessageId>,

    #[serde(default)]
    header: Header,

    #[serde(default)]
    body: Map<String, Value>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message whose `body.payload` is `payload`.
    pub fn with_payload(payload: impl Into<Value>) -> Self {
        Self::new().with_body_item(PAYLOAD_KEY, payload)
    }

    pub fn with_request_type(mut self, request_type: impl Into<String>) -> Self {
        self.header.request_type = Some(request_type.into());
        self
    }

    pub fn with_body_item(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`Message::set_header_item`]; same validation.
    pub fn with_header_item(mut self, key: &str, value: impl Into<Value>) -> Result<Self> {
        self.set_header_item(key, value)?;
        Ok(self)
    }

    /// Replaces the whole body.
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Hold the message back until the schedule elapses. Relative schedules are
    /// resolved against the wall clock now.
    pub fn with_delay(self, delay: impl Into<Schedule>) -> Self {
        self.with_delay_from(delay, Utc::now())
    }

    pub fn with_delay_from(mut self, delay: impl Into<Schedule>, now: DateTime<Utc>) -> Self {
        self.header.delay = Some(delay.into().resolve(now));
        self
    }

    pub fn with_expiration(self, expiration: impl Into<Schedule>) -> Self {
        self.with_expiration_from(expiration, Utc::now())
    }

    pub fn with_expiration_from(
        mut self,
        expiration: impl Into<Schedule>,
        now: DateTime<Utc>,
    ) -> Self {
        self.header.expiration = Some(expiration.into().resolve(now));
        self
    }

    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    /// The id, or `MissingId` for a message that was never enqueued.
    pub fn require_id(&self) -> Result<&MessageId> {
        self.id.as_ref().ok_or(KesselError::MissingId)
    }

    /// Sets the id. Assigning the same id again is a no-op; a different id is rejected.
    pub fn assign_id(&mut self, id: MessageId) -> Result<()> {
        match &self.id {
            None => {
                self.id = Some(id);
                Ok(())
            }
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(KesselError::IdAlreadyAssigned {
                existing: existing.clone(),
                requested: id,
            }),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn request_type(&self) -> Option<&str> {
        self.header.request_type()
    }

    pub fn delay(&self) -> Option<DateTime<Utc>> {
        self.header.delay
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.header.expiration
    }

    pub fn attempts(&self) -> u32 {
        self.header.attempts
    }

    pub fn payload(&self) -> Option<&Value> {
        self.body.get(PAYLOAD_KEY)
    }

    pub fn get_body_item(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn set_body_item(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.body.insert(key.into(), value.into());
    }

    pub fn get_header_item(&self, key: &str) -> Option<Value> {
        self.get(&format!("header.{key}"))
    }

    pub fn set_header_item(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set(&format!("header.{key}"), value)
    }

    /// Rollback bookkeeping: one more failed delivery.
    pub(crate) fn record_failed_attempt(&mut self) {
        self.header.attempts = self.header.attempts.saturating_add(1);
    }

    pub(crate) fn defer_until(&mut self, at: DateTime<Utc>) {
        self.header.delay = Some(at);
    }

    /// Reads a value by dot-separated path over the wire representation.
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current.clone())
    }

    /// Writes a value by dot-separated path, creating intermediate objects.
    ///
    /// The result must still be a valid message: typed header fields only
    /// accept values of their type (`header.delay` must be an RFC 3339
    /// timestamp, and so on).
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let invalid = |reason: &str| KesselError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let keys: Vec<&str> = path.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        match keys.as_slice() {
            ["id", ..] => return Err(invalid("id is assigned by the queue adapter")),
            ["header", "attempts", ..] => return Err(invalid("attempts is managed by the queue")),
            ["header"] => return Err(invalid("header cannot be replaced wholesale")),
            ["header", ..] | ["body", ..] => {}
            _ => return Err(invalid("path must start with header. or body.")),
        }

        let mut root = serde_json::to_value(&*self)?;
        set_nested(&mut root, &keys, value.into()).map_err(|reason| invalid(&reason))?;
        *self = serde_json::from_value(root).map_err(|e| invalid(&e.to_string()))?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

fn set_nested(root: &mut Value, keys: &[&str], value: Value) -> std::result::Result<(), String> {
    let (last, parents) = keys
        .split_last()
        .ok_or_else(|| "empty path".to_string())?;
    let mut current = root;
    for key in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| format!("'{key}' is below a non-object value"))?;
        current = object
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let object = current
        .as_object_mut()
        .ok_or_else(|| format!("'{last}' is below a non-object value"))?;
    object.insert(last.to_string(), value);
    Ok(())
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
