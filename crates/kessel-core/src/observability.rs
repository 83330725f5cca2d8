//! Counters for queue and worker activity.
//!
//! Each adapter / worker owns its counters; nothing is process-global.
//! `snapshot()` gives a serializable view for logging or a status command.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub committed_success: u64,
    pub committed_failure: u64,
    pub rolled_back: u64,
    /// Archived to failure during a scan (attempts exhausted or expired).
    pub dead_lettered: u64,
    /// Lost lock races. Expected under contention, never an error.
    pub lock_collisions: u64,
}

#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    committed_success: AtomicU64,
    committed_failure: AtomicU64,
    rolled_back: AtomicU64,
    dead_lettered: AtomicU64,
    lock_collisions: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn committed(&self, success: bool) {
        if success {
            self.committed_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.committed_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_collision(&self) {
        self.lock_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            committed_success: self.committed_success.load(Ordering::Relaxed),
            committed_failure: self.committed_failure.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            lock_collisions: self.lock_collisions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub dequeue_attempts: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub transient: u64,
    pub fatal: u64,
    /// No handler registered for the request type; counted in `fatal` too.
    pub unroutable: u64,
    pub responses_published: u64,
}

#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    dequeue_attempts: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    transient: AtomicU64,
    fatal: AtomicU64,
    unroutable: AtomicU64,
    responses_published: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn dequeue_attempt(&self) {
        self.dequeue_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transient(&self) {
        self.transient.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fatal(&self) {
        self.fatal.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn response_published(&self) {
        self.responses_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            dequeue_attempts: self.dequeue_attempts.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            transient: self.transient.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            responses_published: self.responses_published.load(Ordering::Relaxed),
        }
    }
}
