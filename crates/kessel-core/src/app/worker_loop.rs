//! Worker - dequeue → handle → commit / rollback のループ
//!
//! # フロー（1 iteration）
//! 1. shutdown 要求が来ていれば抜ける
//! 2. `QueueAdapter::dequeue()`
//! 3. message があれば request_type で Handler を引いて実行
//!    - 未登録なら fatal 扱い（unroutable）
//! 4. RequestResult に従って状態を進める
//!    - success   → `commit(true)`、その後 response message を enqueue
//!    - transient → `rollback()`
//!    - fatal     → `commit(false)`（dead-letter）
//! 5. message がなければ空振りカウンタを進め、閾値に達したら停止。
//!    そうでなければ sleep（shutdown で中断可能）
//!
//! Handler 実行中に shutdown が来ても中断しない。commit/rollback まで終えてから抜ける。
//! adapter のストレージエラーは回復せず `run` から返す。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::{Message, RequestResult, ResultKind, Result};
use crate::observability::{WorkerCounters, WorkerStats};
use crate::ports::QueueAdapter;
use crate::typed::HandlerRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Stop after this many consecutive empty polls. `None`: never stop on idleness.
    pub shutdown_after_number_of_empty_iterations: Option<u32>,
    /// Sleep between empty polls.
    pub sleep_duration: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_after_number_of_empty_iterations: Some(5),
            sleep_duration: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn with_idle_shutdown(mut self, empty_iterations: Option<u32>) -> Self {
        self.shutdown_after_number_of_empty_iterations = empty_iterations;
        self
    }

    pub fn with_sleep_duration(mut self, sleep_duration: Duration) -> Self {
        self.sleep_duration = sleep_duration;
        self
    }
}

/// Where a processed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded; archived as success.
    Committed,
    /// Transient failure; back in the eligible pool.
    RolledBack,
    /// Fatal failure or no handler; archived as failure.
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Empty-iteration threshold reached.
    Idle,
    /// Cancellation token fired.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub processed: u64,
    pub stop_reason: StopReason,
}

pub struct Worker {
    adapter: Arc<dyn QueueAdapter>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    counters: WorkerCounters,
}

impl Worker {
    pub fn new(
        adapter: Arc<dyn QueueAdapter>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            adapter,
            registry,
            config,
            counters: WorkerCounters::default(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Runs until idle or cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary> {
        info!(
            handlers = ?self.registry.registered_types(),
            idle_shutdown = ?self.config.shutdown_after_number_of_empty_iterations,
            sleep = ?self.config.sleep_duration,
            "worker started"
        );

        let mut iterations = 0u64;
        let mut processed = 0u64;
        let mut empty_iterations = 0u32;

        let stop_reason = loop {
            if shutdown.is_cancelled() {
                break StopReason::Shutdown;
            }
            iterations += 1;
            self.counters.dequeue_attempt();

            if let Some(message) = self.adapter.dequeue().await? {
                empty_iterations = 0;
                self.process(message).await?;
                processed += 1;
                continue;
            }

            empty_iterations = empty_iterations.saturating_add(1);
            trace!(
                empty_iterations,
                max = ?self.config.shutdown_after_number_of_empty_iterations,
                "no message available"
            );
            if let Some(limit) = self.config.shutdown_after_number_of_empty_iterations
                && empty_iterations >= limit
            {
                info!(empty_iterations, "no message available, shutting down");
                break StopReason::Idle;
            }

            debug!(sleep = ?self.config.sleep_duration, "no message available, sleep");
            tokio::select! {
                _ = shutdown.cancelled() => break StopReason::Shutdown,
                _ = tokio::time::sleep(self.config.sleep_duration) => {}
            }
        };

        info!(iterations, processed, ?stop_reason, stats = ?self.stats(), "worker stopped");
        Ok(RunSummary {
            iterations,
            processed,
            stop_reason,
        })
    }

    /// Dispatches one locked message and settles it with the adapter.
    pub async fn process(&self, message: Message) -> Result<Disposition> {
        let id = message.require_id()?.clone();
        info!(%id, request_type = ?message.request_type(), attempts = message.attempts(), "processing message");

        let result = self.dispatch(&message).await;
        trace!(%id, ?result, "handler returned");

        let disposition = match result.kind() {
            ResultKind::Success => {
                self.adapter.commit(&message, true).await?;
                self.counters.succeeded();
                info!(%id, "message successfully processed");
                self.publish_responses(result).await?;
                Disposition::Committed
            }
            ResultKind::Transient => {
                self.adapter.rollback(&message).await?;
                self.counters.transient();
                warn!(%id, error = ?result.error(), "transient failure, rolled back");
                Disposition::RolledBack
            }
            ResultKind::Fatal => {
                self.adapter.commit(&message, false).await?;
                self.counters.fatal();
                warn!(%id, error = ?result.error(), "fatal failure, dead-lettered");
                Disposition::DeadLettered
            }
        };
        self.counters.processed();
        Ok(disposition)
    }

    async fn dispatch(&self, message: &Message) -> RequestResult {
        let handler = message
            .request_type()
            .and_then(|request_type| self.registry.get(request_type));
        let Some(handler) = handler else {
            self.counters.unroutable();
            warn!(id = ?message.id(), request_type = ?message.request_type(), "no handler for message type");
            return RequestResult::fatal(format!(
                "no handler for message type {}",
                message.request_type().unwrap_or("<none>")
            ));
        };
        let payload = message.payload().cloned().unwrap_or_default();
        handler.handle_dyn(payload).await
    }

    async fn publish_responses(&self, result: RequestResult) -> Result<()> {
        for response in result.into_responses() {
            let published = self.adapter.enqueue(response).await?;
            self.counters.response_published();
            debug!(id = ?published.id(), request_type = ?published.request_type(), "response published");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageState;
    use crate::impls::InMemoryQueueAdapter;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::Value;

    struct Outcome(ResultKind);

    #[async_trait]
    impl crate::typed::Handler<Value> for Outcome {
        async fn handle(&self, _payload: Value) -> RequestResult {
            match self.0 {
                ResultKind::Success => RequestResult::success(),
                ResultKind::Transient => RequestResult::transient("later"),
                ResultKind::Fatal => RequestResult::fatal("never"),
            }
        }
    }

    /// Answers every request with one `ack` response carrying the same payload.
    struct Reply;

    #[async_trait]
    impl crate::typed::Handler<Value> for Reply {
        async fn handle(&self, payload: Value) -> RequestResult {
            RequestResult::success()
                .with_responses([Message::with_payload(payload).with_request_type("ack")])
        }
    }

    fn worker(adapter: Arc<InMemoryQueueAdapter>, config: WorkerConfig) -> Worker {
        let mut registry = HandlerRegistry::new();
        registry.register::<Value, _>("success", Outcome(ResultKind::Success)).unwrap();
        registry.register::<Value, _>("transient", Outcome(ResultKind::Transient)).unwrap();
        registry.register::<Value, _>("fatal", Outcome(ResultKind::Fatal)).unwrap();
        registry.register::<Value, _>("reply", Reply).unwrap();
        Worker::new(adapter, Arc::new(registry), config)
    }

    fn fast() -> WorkerConfig {
        WorkerConfig::default()
            .with_idle_shutdown(Some(1))
            .with_sleep_duration(Duration::from_millis(1))
    }

    #[rstest]
    #[case("success", Disposition::Committed, MessageState::ArchivedSuccess)]
    #[case("transient", Disposition::RolledBack, MessageState::Queued)]
    #[case("fatal", Disposition::DeadLettered, MessageState::ArchivedFailure)]
    #[case("unregistered", Disposition::DeadLettered, MessageState::ArchivedFailure)]
    #[tokio::test]
    async fn test_process_settles_by_result(
        #[case] request_type: &str,
        #[case] expected: Disposition,
        #[case] state: MessageState,
    ) {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let w = worker(Arc::clone(&adapter), fast());

        let m = adapter
            .enqueue(Message::with_payload("x").with_request_type(request_type))
            .await
            .unwrap();
        let locked = adapter.dequeue().await.unwrap().unwrap();

        assert_eq!(w.process(locked).await.unwrap(), expected);
        assert_eq!(adapter.lookup_state(m.id().unwrap()).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_missing_request_type_is_unroutable() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let w = worker(Arc::clone(&adapter), fast());

        adapter.enqueue(Message::with_payload("x")).await.unwrap();
        let locked = adapter.dequeue().await.unwrap().unwrap();

        assert_eq!(w.process(locked).await.unwrap(), Disposition::DeadLettered);
        assert_eq!(w.stats().unroutable, 1);
        assert_eq!(w.stats().fatal, 1);
    }

    #[tokio::test]
    async fn test_responses_published_after_success() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let w = worker(Arc::clone(&adapter), fast());

        adapter
            .enqueue(Message::with_payload("ping").with_request_type("reply"))
            .await
            .unwrap();
        let locked = adapter.dequeue().await.unwrap().unwrap();
        w.process(locked).await.unwrap();

        let response = adapter.dequeue().await.unwrap().unwrap();
        assert_eq!(response.request_type(), Some("ack"));
        assert_eq!(response.payload(), Some(&Value::from("ping")));
        assert_eq!(w.stats().responses_published, 1);
    }

    #[tokio::test]
    async fn test_run_drains_then_stops_idle() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let w = worker(Arc::clone(&adapter), fast().with_idle_shutdown(Some(3)));

        for _ in 0..4 {
            adapter
                .enqueue(Message::with_payload("x").with_request_type("success"))
                .await
                .unwrap();
        }

        let summary = w.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Idle);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.iterations, 4 + 3);
        assert_eq!(adapter.count(MessageState::ArchivedSuccess).await, 4);
        assert_eq!(w.stats().dequeue_attempts, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_not_poll() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let w = worker(Arc::clone(&adapter), fast());
        adapter
            .enqueue(Message::with_payload("x").with_request_type("success"))
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let summary = w.run(token).await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert_eq!(summary.iterations, 0);
        assert_eq!(adapter.count(MessageState::Queued).await, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_idle_sleep() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let config = WorkerConfig::default()
            .with_idle_shutdown(None)
            .with_sleep_duration(Duration::from_secs(3600));
        let w = Arc::new(worker(adapter, config));

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let w = Arc::clone(&w);
            let token = token.clone();
            async move { w.run(token).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not observe cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert_eq!(summary.processed, 0);
    }

    /// Signals `started`, then holds the message until `release` fires.
    struct Gate {
        started: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl crate::typed::Handler<Value> for Gate {
        async fn handle(&self, _payload: Value) -> RequestResult {
            self.started.notify_one();
            self.release.notified().await;
            RequestResult::success()
        }
    }

    #[tokio::test]
    async fn test_cancel_during_handler_finishes_current_message() {
        let adapter = Arc::new(InMemoryQueueAdapter::new());
        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());

        let mut registry = HandlerRegistry::new();
        registry
            .register::<Value, _>(
                "gate",
                Gate {
                    started: Arc::clone(&started),
                    release: Arc::clone(&release),
                },
            )
            .unwrap();
        let config = WorkerConfig::default()
            .with_idle_shutdown(None)
            .with_sleep_duration(Duration::from_secs(3600));
        let w = Arc::new(Worker::new(
            Arc::clone(&adapter) as Arc<dyn QueueAdapter>,
            Arc::new(registry),
            config,
        ));

        let m = adapter
            .enqueue(Message::with_payload("x").with_request_type("gate"))
            .await
            .unwrap();
        adapter
            .enqueue(Message::with_payload("y").with_request_type("gate"))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let w = Arc::clone(&w);
            let token = token.clone();
            async move { w.run(token).await }
        });

        started.notified().await;
        token.cancel();
        release.notify_one();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop after the current message")
            .unwrap()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert_eq!(summary.processed, 1);
        assert_eq!(
            adapter.lookup_state(m.id().unwrap()).await.unwrap(),
            MessageState::ArchivedSuccess
        );
        // the second message is never taken
        assert_eq!(adapter.count(MessageState::Queued).await, 1);
    }

    #[tokio::test]
    async fn test_transient_until_max_attempts_then_dead_letter() {
        let adapter = Arc::new(InMemoryQueueAdapter::new().with_max_attempts(2));
        let w = worker(Arc::clone(&adapter), fast());

        let m = adapter
            .enqueue(Message::with_payload("x").with_request_type("transient"))
            .await
            .unwrap();

        let summary = w.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(
            adapter.lookup_state(m.id().unwrap()).await.unwrap(),
            MessageState::ArchivedFailure
        );
    }
}
