//! In-memory queue adapter.
//!
//! Same state machine as the file queue, kept in one process. Useful for
//! tests and for running handlers without touching the disk.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::message::add_duration;
use crate::domain::{
    Eligibility, KesselError, Message, MessageId, MessageState, Result, RetryPolicy,
};
use crate::observability::{QueueCounters, QueueStats};
use crate::ports::{Clock, IdGenerator, QueueAdapter, SystemClock, UlidGenerator};

/// Stored message plus the location it currently occupies.
#[derive(Debug, Clone)]
struct Slot {
    state: MessageState,
    message: Message,
}

/// Messages keyed by id. BTreeMap keeps the pool in id (= time) order.
#[derive(Default)]
struct InMemoryQueueState {
    slots: BTreeMap<MessageId, Slot>,
}

pub struct InMemoryQueueAdapter {
    state: Mutex<InMemoryQueueState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    max_attempts: Option<u32>,
    retry_backoff: Option<RetryPolicy>,
    counters: QueueCounters,
}

impl InMemoryQueueAdapter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            state: Mutex::new(InMemoryQueueState::default()),
            clock,
            ids,
            max_attempts: None,
            retry_backoff: None,
            counters: QueueCounters::default(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_retry_backoff(mut self, policy: RetryPolicy) -> Self {
        self.retry_backoff = Some(policy);
        self
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Number of messages currently in `state`.
    pub async fn count(&self, state: MessageState) -> usize {
        let guard = self.state.lock().await;
        guard.slots.values().filter(|s| s.state == state).count()
    }

    fn locked_slot<'a>(
        state: &'a mut InMemoryQueueState,
        message: &Message,
    ) -> Result<(MessageId, &'a mut Slot)> {
        let id = message.require_id()?;
        match state.slots.get_mut(id) {
            Some(slot) if slot.state == MessageState::Locked => Ok((id.clone(), slot)),
            _ => Err(KesselError::NotLocked(id.clone())),
        }
    }
}

impl Default for InMemoryQueueAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueAdapter for InMemoryQueueAdapter {
    async fn enqueue(&self, mut message: Message) -> Result<Message> {
        let mut guard = self.state.lock().await;
        match message.id() {
            Some(id) if guard.slots.contains_key(id) => {
                return Err(KesselError::DuplicateMessage(id.clone()));
            }
            Some(_) => {}
            None => message.assign_id(self.ids.generate_message_id()?)?,
        }
        let id = message.require_id()?.clone();
        guard.slots.insert(
            id.clone(),
            Slot {
                state: MessageState::Queued,
                message: message.clone(),
            },
        );
        self.counters.enqueued();
        debug!(%id, request_type = ?message.request_type(), "enqueued");
        Ok(message)
    }

    async fn dequeue(&self) -> Result<Option<Message>> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;

        let mut expired = Vec::new();
        let mut taken = None;
        for (id, slot) in guard.slots.iter() {
            if slot.state != MessageState::Queued {
                continue;
            }
            match Eligibility::evaluate(&slot.message, now, self.max_attempts) {
                Eligibility::Deferred => continue,
                Eligibility::DeadLetter(reason) => expired.push((id.clone(), reason)),
                Eligibility::Ready => {
                    taken = Some(id.clone());
                    break;
                }
            }
        }

        for (id, reason) in expired {
            if let Some(slot) = guard.slots.get_mut(&id) {
                slot.state = MessageState::ArchivedFailure;
                warn!(%id, %reason, "dead-lettered during scan");
                self.counters.dead_lettered();
            }
        }

        let Some(id) = taken else {
            trace!("no message found");
            return Ok(None);
        };
        let Some(slot) = guard.slots.get_mut(&id) else {
            return Ok(None);
        };
        slot.state = MessageState::Locked;
        self.counters.dequeued();
        debug!(%id, "dequeued");
        Ok(Some(slot.message.clone()))
    }

    async fn commit(&self, message: &Message, success: bool) -> Result<()> {
        let mut guard = self.state.lock().await;
        let (id, slot) = Self::locked_slot(&mut guard, message)?;
        slot.state = if success {
            MessageState::ArchivedSuccess
        } else {
            MessageState::ArchivedFailure
        };
        self.counters.committed(success);
        debug!(%id, success, "committed");
        Ok(())
    }

    async fn rollback(&self, message: &Message) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let (id, slot) = Self::locked_slot(&mut guard, message)?;
        slot.message.record_failed_attempt();
        if let Some(policy) = &self.retry_backoff {
            let delay = policy.next_delay(slot.message.attempts());
            slot.message.defer_until(add_duration(now, delay));
        }
        slot.state = MessageState::Queued;
        self.counters.rolled_back();
        debug!(%id, attempts = slot.message.attempts(), "rolled back");
        Ok(())
    }

    async fn peek(&self, id: &MessageId) -> Result<Option<Message>> {
        let guard = self.state.lock().await;
        Ok(guard.slots.get(id).map(|s| s.message.clone()))
    }

    async fn delete(&self, id: &MessageId) -> Result<bool> {
        let mut guard = self.state.lock().await;
        match guard.slots.get(id) {
            Some(slot) if slot.state == MessageState::Queued => {
                guard.slots.remove(id);
                debug!(%id, "deleted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lookup_state(&self, id: &MessageId) -> Result<MessageState> {
        let guard = self.state.lock().await;
        Ok(guard
            .slots
            .get(id)
            .map_or(MessageState::Unknown, |s| s.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::time::Duration;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let qa = InMemoryQueueAdapter::new();
        let a = qa.enqueue(Message::with_payload("a")).await.unwrap();
        let b = qa.enqueue(Message::with_payload("b")).await.unwrap();

        assert_eq!(qa.dequeue().await.unwrap().unwrap().id(), a.id());
        assert_eq!(qa.dequeue().await.unwrap().unwrap().id(), b.id());
        assert!(qa.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_requeues_with_attempt() {
        let qa = InMemoryQueueAdapter::new();
        qa.enqueue(Message::with_payload("x")).await.unwrap();

        let first = qa.dequeue().await.unwrap().unwrap();
        qa.rollback(&first).await.unwrap();
        let second = qa.dequeue().await.unwrap().unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.attempts(), 1);
        assert_eq!(
            qa.lookup_state(first.id().unwrap()).await.unwrap(),
            MessageState::Locked
        );
    }

    #[tokio::test]
    async fn test_max_attempts_dead_letters() {
        let qa = InMemoryQueueAdapter::new().with_max_attempts(2);
        let m = qa.enqueue(Message::with_payload("x")).await.unwrap();

        for _ in 0..2 {
            let dq = qa.dequeue().await.unwrap().unwrap();
            qa.rollback(&dq).await.unwrap();
        }
        assert!(qa.dequeue().await.unwrap().is_none());
        assert_eq!(
            qa.lookup_state(m.id().unwrap()).await.unwrap(),
            MessageState::ArchivedFailure
        );
        assert_eq!(qa.stats().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_delay_and_expiration() {
        let clock = clock();
        let qa = InMemoryQueueAdapter::with_clock(Arc::new(clock.clone()));

        let delayed = qa
            .enqueue(Message::with_payload("later").with_delay_from(Duration::from_secs(5), clock.now()))
            .await
            .unwrap();
        let expired = qa
            .enqueue(Message::with_payload("old").with_expiration(clock.now() - TimeDelta::seconds(1)))
            .await
            .unwrap();

        assert!(qa.dequeue().await.unwrap().is_none());
        assert_eq!(
            qa.lookup_state(expired.id().unwrap()).await.unwrap(),
            MessageState::ArchivedFailure
        );

        clock.advance(Duration::from_secs(5));
        assert_eq!(qa.dequeue().await.unwrap().unwrap().id(), delayed.id());
    }

    #[tokio::test]
    async fn test_commit_requires_lock() {
        let qa = InMemoryQueueAdapter::new();
        let m = qa.enqueue(Message::with_payload("x")).await.unwrap();

        assert!(matches!(
            qa.commit(&m, true).await,
            Err(KesselError::NotLocked(_))
        ));

        let dq = qa.dequeue().await.unwrap().unwrap();
        qa.commit(&dq, false).await.unwrap();
        assert_eq!(qa.count(MessageState::ArchivedFailure).await, 1);
        assert!(!qa.delete(m.id().unwrap()).await.unwrap());
        assert!(qa.peek(m.id().unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let qa = InMemoryQueueAdapter::new();
        let mut m = Message::with_payload("x");
        m.assign_id(MessageId::new("fixed")).unwrap();
        qa.enqueue(m.clone()).await.unwrap();

        assert!(matches!(
            qa.enqueue(m).await,
            Err(KesselError::DuplicateMessage(_))
        ));
    }
}
