//! FileQueueAdapter - ディレクトリと rename だけで作るキュー
//!
//! # レイアウト
//! ```text
//! <base_path>/<id>.message                  eligible pool (queued)
//! <base_path>/lock/<id>.message.lock        reserved (locked, in-flight)
//! <base_path>/archive/success/<id>.message  terminal success
//! <base_path>/archive/failure/<id>.message  terminal failure (dead-letter)
//! ```
//!
//! # 排他制御
//! lock サーバは存在しない。pool から lock/ への `rename` が唯一の排他プリミティブで、
//! rename に勝ったプロセスだけがそのメッセージを所有する。
//! 負けた側は NotFound / AlreadyExists を受け取り、次の候補へ進む（エラーにはしない）。
//!
//! rename の原子性は同一ファイルシステム内でしか成り立たないため、
//! 4 つのディレクトリはすべて `base_path` の下に置く。
//!
//! # 書き込み
//! `<name>.tmp` に書いて fsync してから rename する。スキャンは `.message` で終わる
//! 通常ファイルしか見ないので、書きかけのファイルが dequeue されることはない。

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::message::add_duration;
use crate::domain::{
    Eligibility, KesselError, Message, MessageId, MessageState, Result, RetryPolicy,
};
use crate::observability::{QueueCounters, QueueStats};
use crate::ports::{Clock, IdGenerator, QueueAdapter, SystemClock, UlidGenerator};

const MESSAGE_SUFFIX: &str = ".message";
const LOCK_SUFFIX: &str = ".lock";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileQueueConfig {
    /// Root of the queue. Everything else lives below it.
    pub base_path: PathBuf,

    /// Skip a random number of leading candidates in `[0, range]` to spread
    /// concurrent workers across the pool. 0 keeps strict name order.
    pub skip_random_messages_range: usize,

    /// Dead-letter messages whose attempts reached this value. `None` or 0: unlimited.
    pub max_number_of_attempts: Option<u32>,

    /// Push `header.delay` forward on rollback. `None` leaves the delay alone.
    pub retry_backoff: Option<RetryPolicy>,

    /// fsync files and directories after each write.
    pub fsync: bool,
}

impl Default for FileQueueConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/tmp/kessel/default"),
            skip_random_messages_range: 0,
            max_number_of_attempts: None,
            retry_backoff: None,
            fsync: true,
        }
    }
}

impl FileQueueConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn with_skip_range(mut self, range: usize) -> Self {
        self.skip_random_messages_range = range;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_number_of_attempts = Some(max_attempts);
        self
    }

    pub fn with_retry_backoff(mut self, policy: RetryPolicy) -> Self {
        self.retry_backoff = Some(policy);
        self
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_path.join("lock")
    }

    pub fn archive_success_path(&self) -> PathBuf {
        self.base_path.join("archive").join("success")
    }

    pub fn archive_failure_path(&self) -> PathBuf {
        self.base_path.join("archive").join("failure")
    }
}

/// A file in the eligible pool, as seen by one directory scan.
#[derive(Debug, Clone)]
struct Candidate {
    id: MessageId,
    path: PathBuf,
}

pub struct FileQueueAdapter {
    config: FileQueueConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    counters: QueueCounters,
}

impl FileQueueAdapter {
    /// Open (and create if needed) a queue rooted at `config.base_path`.
    pub async fn open(config: FileQueueConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: FileQueueConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let adapter = Self {
            config,
            clock,
            ids,
            counters: QueueCounters::default(),
        };
        adapter.create_directories().await?;
        debug!(base_path = %adapter.config.base_path.display(), "file queue opened");
        Ok(adapter)
    }

    pub fn config(&self) -> &FileQueueConfig {
        &self.config
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    async fn create_directories(&self) -> Result<()> {
        for dir in [
            self.config.base_path.clone(),
            self.config.lock_path(),
            self.config.archive_success_path(),
            self.config.archive_failure_path(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| KesselError::storage(&dir, e))?;
        }
        Ok(())
    }

    fn message_file_name(id: &MessageId) -> String {
        format!("{id}{MESSAGE_SUFFIX}")
    }

    pub fn queued_file_path(&self, id: &MessageId) -> PathBuf {
        self.config.base_path.join(Self::message_file_name(id))
    }

    pub fn lock_file_path(&self, id: &MessageId) -> PathBuf {
        self.config
            .lock_path()
            .join(format!("{id}{MESSAGE_SUFFIX}{LOCK_SUFFIX}"))
    }

    pub fn archive_file_path(&self, id: &MessageId, success: bool) -> PathBuf {
        let dir = if success {
            self.config.archive_success_path()
        } else {
            self.config.archive_failure_path()
        };
        dir.join(Self::message_file_name(id))
    }

    /// Location lookup order used by `peek` and `lookup_state`.
    fn locations(&self, id: &MessageId) -> [(MessageState, PathBuf); 4] {
        [
            (MessageState::Queued, self.queued_file_path(id)),
            (MessageState::Locked, self.lock_file_path(id)),
            (MessageState::ArchivedSuccess, self.archive_file_path(id, true)),
            (MessageState::ArchivedFailure, self.archive_file_path(id, false)),
        ]
    }

    /// Pool entries ending in `.message`, oldest (smallest name) first.
    async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let dir = &self.config.base_path;
        trace!(dir = %dir.display(), "scanning eligible pool");

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| KesselError::storage(dir, e))?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KesselError::storage(dir, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(MESSAGE_SUFFIX) else {
                continue;
            };
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                // gone since the listing: someone else took it
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(KesselError::storage(entry.path(), e)),
            }
            candidates.push(Candidate {
                id: MessageId::new(stem),
                path: entry.path(),
            });
        }
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates)
    }

    fn skip_count(&self) -> usize {
        match self.config.skip_random_messages_range {
            0 => 0,
            range => rand::thread_rng().gen_range(0..=range),
        }
    }

    /// Reads a stored record. `None` when the file does not exist (moved by someone else).
    async fn read_message(&self, path: &Path) -> Result<Option<Message>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KesselError::storage(path, e)),
        };
        let message = Message::from_json_slice(&bytes).map_err(|source| KesselError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(message))
    }

    /// Write `message` to `path` so that readers see either nothing or the whole record.
    async fn write_atomic(&self, path: &Path, message: &Message) -> Result<()> {
        let bytes = message.to_json_pretty()?;
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(TEMP_SUFFIX);
        let tmp_path = path.with_file_name(tmp_name);

        {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| KesselError::storage(&tmp_path, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| KesselError::storage(&tmp_path, e))?;
            if self.config.fsync {
                file.sync_all()
                    .await
                    .map_err(|e| KesselError::storage(&tmp_path, e))?;
            }
        }

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| KesselError::storage(path, e))?;

        if let Some(parent) = path.parent() {
            self.sync_dir(parent).await?;
        }
        Ok(())
    }

    async fn sync_dir(&self, dir: &Path) -> Result<()> {
        if !self.config.fsync {
            return Ok(());
        }
        let handle = tokio::fs::File::open(dir)
            .await
            .map_err(|e| KesselError::storage(dir, e))?;
        handle
            .sync_all()
            .await
            .map_err(|e| KesselError::storage(dir, e))
    }

    /// Rename used as a lock / state transition.
    ///
    /// `Ok(false)` means the source was gone or the target taken: another
    /// worker won the race.
    async fn try_move(&self, from: &Path, to: &Path) -> Result<bool> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(true),
            Err(e) if is_lost_race(&e) => {
                trace!(from = %from.display(), to = %to.display(), kind = ?e.kind(), "lost rename race");
                Ok(false)
            }
            Err(e) => Err(KesselError::storage(from, e)),
        }
    }

    /// Evaluate one candidate and lock it if it is deliverable.
    ///
    /// Returns the locked message, or `None` when the candidate is deferred,
    /// was dead-lettered, or another worker got there first.
    async fn try_take(&self, candidate: &Candidate) -> Result<Option<Message>> {
        let Some(message) = self.read_message(&candidate.path).await? else {
            trace!(id = %candidate.id, "candidate vanished before load");
            self.counters.lock_collision();
            return Ok(None);
        };
        trace!(
            id = %candidate.id,
            delay = ?message.delay(),
            expiration = ?message.expiration(),
            attempts = message.attempts(),
            "loaded candidate"
        );

        // the record must agree with its file name before it can be locked
        if let Some(record_id) = message.id() {
            if *record_id != candidate.id {
                return Err(KesselError::IdMismatch {
                    path: candidate.path.clone(),
                    record_id: record_id.clone(),
                    file_id: candidate.id.clone(),
                });
            }
        }

        let now = self.clock.now();
        match Eligibility::evaluate(&message, now, self.config.max_number_of_attempts) {
            Eligibility::Deferred => {
                trace!(id = %candidate.id, "message delayed, leave queued");
                Ok(None)
            }
            Eligibility::DeadLetter(reason) => {
                let target = self.archive_file_path(&candidate.id, false);
                if self.try_move(&candidate.path, &target).await? {
                    warn!(id = %candidate.id, %reason, "dead-lettered during scan");
                    self.counters.dead_lettered();
                }
                Ok(None)
            }
            Eligibility::Ready => self.lock(candidate).await,
        }
    }

    async fn lock(&self, candidate: &Candidate) -> Result<Option<Message>> {
        let lock_path = self.lock_file_path(&candidate.id);
        trace!(from = %candidate.path.display(), to = %lock_path.display(), "attempt to lock");
        if !self.try_move(&candidate.path, &lock_path).await? {
            self.counters.lock_collision();
            return Ok(None);
        }

        // We own it now; the file can only disappear through our own commit/rollback.
        let mut message = self
            .read_message(&lock_path)
            .await?
            .ok_or_else(|| KesselError::storage(&lock_path, io::Error::from(ErrorKind::NotFound)))?;
        if let Err(e) = message.assign_id(candidate.id.clone()) {
            // rewritten between load and lock: hand it back to the pool unowned
            self.try_move(&lock_path, &candidate.path).await?;
            return Err(e);
        }
        Ok(Some(message))
    }
}

fn is_lost_race(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::AlreadyExists)
}

#[async_trait]
impl QueueAdapter for FileQueueAdapter {
    async fn enqueue(&self, mut message: Message) -> Result<Message> {
        match message.id() {
            Some(id) => {
                // producer-chosen id: best-effort duplicate check across all locations
                id.validate_for_path()?;
                if self.lookup_state(id).await? != MessageState::Unknown {
                    return Err(KesselError::DuplicateMessage(id.clone()));
                }
            }
            None => message.assign_id(self.ids.generate_message_id()?)?,
        }
        let id = message.require_id()?.clone();
        let path = self.queued_file_path(&id);

        self.write_atomic(&path, &message).await?;
        self.counters.enqueued();
        debug!(%id, path = %path.display(), request_type = ?message.request_type(), "enqueued");
        Ok(message)
    }

    async fn dequeue(&self) -> Result<Option<Message>> {
        let candidates = self.list_candidates().await?;
        if candidates.is_empty() {
            trace!("no message found");
            return Ok(None);
        }

        let skip = self.skip_count();
        for candidate in candidates.iter().skip(skip) {
            if let Some(message) = self.try_take(candidate).await? {
                self.counters.dequeued();
                debug!(id = %candidate.id, "dequeued");
                return Ok(Some(message));
            }
        }

        // Skipping must never starve a non-empty pool: try the last skipped one.
        if skip > 0 {
            let fallback = &candidates[skip.min(candidates.len()) - 1];
            trace!(id = %fallback.id, skip, "skipped past every candidate, trying last skipped");
            if let Some(message) = self.try_take(fallback).await? {
                self.counters.dequeued();
                debug!(id = %fallback.id, "dequeued (fallback)");
                return Ok(Some(message));
            }
        }

        trace!("no message could be locked");
        Ok(None)
    }

    async fn commit(&self, message: &Message, success: bool) -> Result<()> {
        let id = message.require_id()?;
        id.validate_for_path()?;

        let from = self.lock_file_path(id);
        let to = self.archive_file_path(id, success);
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KesselError::NotLocked(id.clone()));
            }
            Err(e) => return Err(KesselError::storage(&from, e)),
        }
        if let Some(parent) = to.parent() {
            self.sync_dir(parent).await?;
        }

        self.counters.committed(success);
        debug!(%id, success, "committed");
        Ok(())
    }

    async fn rollback(&self, message: &Message) -> Result<()> {
        let id = message.require_id()?;
        id.validate_for_path()?;

        let lock_path = self.lock_file_path(id);
        let Some(mut stored) = self.read_message(&lock_path).await? else {
            return Err(KesselError::NotLocked(id.clone()));
        };
        stored.record_failed_attempt();
        if let Some(policy) = &self.config.retry_backoff {
            let delay = policy.next_delay(stored.attempts());
            stored.defer_until(add_duration(self.clock.now(), delay));
        }
        self.write_atomic(&lock_path, &stored).await?;

        let queued_path = self.queued_file_path(id);
        match tokio::fs::rename(&lock_path, &queued_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KesselError::NotLocked(id.clone()));
            }
            Err(e) => return Err(KesselError::storage(&lock_path, e)),
        }
        self.sync_dir(&self.config.base_path).await?;

        self.counters.rolled_back();
        debug!(%id, attempts = stored.attempts(), delay = ?stored.delay(), "rolled back");
        Ok(())
    }

    async fn peek(&self, id: &MessageId) -> Result<Option<Message>> {
        id.validate_for_path()?;
        for (_, path) in self.locations(id) {
            if let Some(message) = self.read_message(&path).await? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    async fn delete(&self, id: &MessageId) -> Result<bool> {
        id.validate_for_path()?;
        let path = self.queued_file_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%id, "deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(KesselError::storage(&path, e)),
        }
    }

    async fn lookup_state(&self, id: &MessageId) -> Result<MessageState> {
        id.validate_for_path()?;
        for (state, path) in self.locations(id) {
            let exists = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| KesselError::storage(&path, e))?;
            if exists {
                trace!(%id, %state, "lookup message state");
                return Ok(state);
            }
        }
        Ok(MessageState::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> FileQueueAdapter {
        FileQueueAdapter::open(FileQueueConfig::new(dir.path()))
            .await
            .unwrap()
    }

    async fn open_with(config: FileQueueConfig, clock: &FixedClock) -> FileQueueAdapter {
        FileQueueAdapter::open_with_clock(config, Arc::new(clock.clone()))
            .await
            .unwrap()
    }

    fn fixed_clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn open_creates_layout_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        let _again = open(&dir).await;

        assert!(qa.config().lock_path().is_dir());
        assert!(qa.config().archive_success_path().is_dir());
        assert!(qa.config().archive_failure_path().is_dir());
    }

    #[tokio::test]
    async fn file_paths_follow_layout() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        let id = MessageId::new("123");

        assert_eq!(qa.queued_file_path(&id), dir.path().join("123.message"));
        assert_eq!(
            qa.lock_file_path(&id),
            dir.path().join("lock").join("123.message.lock")
        );
        assert_eq!(
            qa.archive_file_path(&id, true),
            dir.path().join("archive/success/123.message")
        );
        assert_eq!(
            qa.archive_file_path(&id, false),
            dir.path().join("archive/failure/123.message")
        );
    }

    #[tokio::test]
    async fn enqueue_writes_one_json_file_and_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;

        let m = qa
            .enqueue(Message::with_payload("hello world").with_request_type("echo"))
            .await
            .unwrap();
        let id = m.id().unwrap();

        let raw = std::fs::read(qa.queued_file_path(id)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["id"], id.as_str());
        assert_eq!(value["header"]["request_type"], "echo");
        assert_eq!(value["body"]["payload"], "hello world");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(names.is_empty(), "temp files left behind: {names:?}");
        assert_eq!(qa.stats().enqueued, 1);
    }

    #[tokio::test]
    async fn enqueue_keeps_producer_id_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;

        let mut m = Message::with_payload("x");
        m.assign_id(MessageId::new("custom-1")).unwrap();
        let stored = qa.enqueue(m.clone()).await.unwrap();
        assert_eq!(stored.id(), Some(&MessageId::new("custom-1")));

        let err = qa.enqueue(m).await.unwrap_err();
        assert!(matches!(err, KesselError::DuplicateMessage(_)));

        let mut bad = Message::new();
        bad.assign_id(MessageId::new("../escape")).unwrap();
        assert!(matches!(
            qa.enqueue(bad).await.unwrap_err(),
            KesselError::InvalidMessageId(_)
        ));
    }

    #[tokio::test]
    async fn scan_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("half.message.tmp"), "{").unwrap();
        std::fs::create_dir(dir.path().join("subdir.message")).unwrap();

        assert!(qa.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        std::fs::write(dir.path().join("01BROKEN.message"), "{ not json").unwrap();

        let err = qa.dequeue().await.unwrap_err();
        assert!(matches!(err, KesselError::Malformed { .. }));
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn record_id_disagreeing_with_file_name_stays_queued() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        std::fs::write(
            dir.path().join("AAA.message"),
            r#"{"id":"BBB","header":{},"body":{"payload":"x"}}"#,
        )
        .unwrap();

        let err = qa.dequeue().await.unwrap_err();
        assert!(matches!(
            &err,
            KesselError::IdMismatch { record_id, file_id, .. }
                if record_id.as_str() == "BBB" && file_id.as_str() == "AAA"
        ));
        assert!(err.is_storage());

        let id = MessageId::new("AAA");
        assert_eq!(qa.lookup_state(&id).await.unwrap(), MessageState::Queued);
        assert!(!qa.lock_file_path(&id).exists());
    }

    #[tokio::test]
    async fn delayed_message_becomes_available_when_clock_passes_delay() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        let qa = open_with(FileQueueConfig::new(dir.path()), &clock).await;

        let m = Message::with_payload("later")
            .with_delay_from(Duration::from_secs(5), clock.now());
        let m = qa.enqueue(m).await.unwrap();

        assert!(qa.dequeue().await.unwrap().is_none());
        assert_eq!(
            qa.lookup_state(m.id().unwrap()).await.unwrap(),
            MessageState::Queued
        );

        clock.advance(Duration::from_secs(5));
        let dq = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(dq.id(), m.id());
    }

    #[tokio::test]
    async fn delayed_head_does_not_block_later_messages() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        let qa = open_with(FileQueueConfig::new(dir.path()), &clock).await;

        qa.enqueue(Message::with_payload("m1").with_delay_from(Duration::from_secs(60), clock.now()))
            .await
            .unwrap();
        let m2 = qa.enqueue(Message::with_payload("m2")).await.unwrap();

        let dq = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(dq.id(), m2.id());
    }

    #[tokio::test]
    async fn expired_message_is_dead_lettered_and_scan_continues() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        let qa = open_with(FileQueueConfig::new(dir.path()), &clock).await;

        let expired = qa
            .enqueue(Message::with_payload("old").with_expiration(clock.now() - TimeDelta::seconds(1)))
            .await
            .unwrap();
        let fresh = qa.enqueue(Message::with_payload("fresh")).await.unwrap();

        let dq = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(dq.id(), fresh.id());
        assert_eq!(
            qa.lookup_state(expired.id().unwrap()).await.unwrap(),
            MessageState::ArchivedFailure
        );
        assert_eq!(qa.stats().dead_lettered, 1);
    }

    #[tokio::test]
    async fn rollback_with_backoff_defers_redelivery() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        let config = FileQueueConfig::new(dir.path())
            .with_retry_backoff(RetryPolicy::exponential(Duration::from_secs(10), 2.0));
        let qa = open_with(config, &clock).await;

        qa.enqueue(Message::with_payload("x")).await.unwrap();
        let dq = qa.dequeue().await.unwrap().unwrap();
        qa.rollback(&dq).await.unwrap();

        assert!(qa.dequeue().await.unwrap().is_none());
        clock.advance(Duration::from_secs(10));
        let again = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(again.attempts(), 1);
        assert_eq!(again.delay(), Some(clock.now()));
    }

    #[tokio::test]
    async fn rollback_without_backoff_keeps_delay() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        let qa = open_with(FileQueueConfig::new(dir.path()), &clock).await;

        let past = clock.now() - TimeDelta::seconds(30);
        qa.enqueue(Message::with_payload("x").with_delay(past)).await.unwrap();
        let dq = qa.dequeue().await.unwrap().unwrap();
        qa.rollback(&dq).await.unwrap();

        let again = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(again.delay(), Some(past));
    }

    #[tokio::test]
    async fn commit_and_rollback_require_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;

        let queued = qa.enqueue(Message::with_payload("x")).await.unwrap();
        assert!(matches!(
            qa.commit(&queued, true).await.unwrap_err(),
            KesselError::NotLocked(_)
        ));
        assert!(matches!(
            qa.rollback(&queued).await.unwrap_err(),
            KesselError::NotLocked(_)
        ));
        assert!(matches!(
            qa.commit(&Message::new(), true).await.unwrap_err(),
            KesselError::MissingId
        ));
    }

    #[tokio::test]
    async fn peek_finds_message_in_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;

        let m = qa.enqueue(Message::with_payload("peekaboo")).await.unwrap();
        let id = m.id().unwrap().clone();
        assert_eq!(qa.peek(&id).await.unwrap().unwrap().payload(), m.payload());

        let dq = qa.dequeue().await.unwrap().unwrap();
        assert!(qa.peek(&id).await.unwrap().is_some());

        qa.commit(&dq, true).await.unwrap();
        assert!(qa.peek(&id).await.unwrap().is_some());

        assert!(qa.peek(&MessageId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_only_touches_the_eligible_pool() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;

        let m1 = qa.enqueue(Message::with_payload("m1")).await.unwrap();
        let m2 = qa.enqueue(Message::with_payload("m2")).await.unwrap();

        let locked = qa.dequeue().await.unwrap().unwrap();
        assert_eq!(locked.id(), m1.id());
        assert!(!qa.delete(m1.id().unwrap()).await.unwrap());
        assert_eq!(
            qa.lookup_state(m1.id().unwrap()).await.unwrap(),
            MessageState::Locked
        );

        assert!(qa.delete(m2.id().unwrap()).await.unwrap());
        assert!(!qa.delete(m2.id().unwrap()).await.unwrap());
        assert_eq!(
            qa.lookup_state(m2.id().unwrap()).await.unwrap(),
            MessageState::Unknown
        );
    }

    #[tokio::test]
    async fn skipping_still_drains_every_message() {
        let dir = tempfile::tempdir().unwrap();
        let qa = FileQueueAdapter::open(FileQueueConfig::new(dir.path()).with_skip_range(3))
            .await
            .unwrap();

        let mut expected = Vec::new();
        for i in 0..5 {
            let m = qa.enqueue(Message::with_payload(format!("m{i}"))).await.unwrap();
            expected.push(m.id().unwrap().clone());
        }

        let mut seen = Vec::new();
        while let Some(m) = qa.dequeue().await.unwrap() {
            seen.push(m.id().unwrap().clone());
            qa.commit(&m, true).await.unwrap();
        }
        seen.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn inspection_rejects_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let qa = open(&dir).await;
        let id = MessageId::new("../../etc/passwd");

        assert!(matches!(
            qa.lookup_state(&id).await.unwrap_err(),
            KesselError::InvalidMessageId(_)
        ));
        assert!(qa.peek(&id).await.is_err());
        assert!(qa.delete(&id).await.is_err());
    }
}
