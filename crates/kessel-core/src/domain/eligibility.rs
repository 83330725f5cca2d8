//! Delivery eligibility checks shared by every queue adapter.
//!
//! Order matters and is fixed:
//! 1. delay in the future       -> Deferred (stays queued)
//! 2. attempts >= max_attempts  -> DeadLetter(AttemptsExhausted)
//! 3. expiration in the past    -> DeadLetter(Expired)
//! 4. otherwise                 -> Ready (try to lock)

use chrono::{DateTime, Utc};
use std::fmt;

use super::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    AttemptsExhausted,
    Expired,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadLetterReason::AttemptsExhausted => f.write_str("attempts exhausted"),
            DeadLetterReason::Expired => f.write_str("expired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Deferred,
    DeadLetter(DeadLetterReason),
    Ready,
}

impl Eligibility {
    /// `max_attempts` of `None` or `Some(0)` means unlimited.
    pub fn evaluate(message: &Message, now: DateTime<Utc>, max_attempts: Option<u32>) -> Self {
        if message.delay().is_some_and(|delay| delay > now) {
            return Eligibility::Deferred;
        }
        if let Some(limit) = max_attempts.filter(|&limit| limit > 0)
            && message.attempts() >= limit
        {
            return Eligibility::DeadLetter(DeadLetterReason::AttemptsExhausted);
        }
        if message.expiration().is_some_and(|expiration| expiration < now) {
            return Eligibility::DeadLetter(DeadLetterReason::Expired);
        }
        Eligibility::Ready
    }
}
