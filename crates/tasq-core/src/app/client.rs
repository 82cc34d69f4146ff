//! Client - タスクの投入
//!
//! # フロー
//! - delay == 0: TaskMessage を作って ready queue の末尾に追加
//! - delay > 0: scheduled set に「現在時刻 + delay」のスコアで追加（poller が後で昇格）
//!
//! ストアへの変更は 1 回だけ。失敗はそのまま呼び出し元に返します（ここではリトライしない）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::domain::{DEFAULT_RETRY_LIMIT, Task, TaskId, TaskMessage, TasqError};
use crate::impls::RedisStore;
use crate::ports::{Clock, IdGenerator, OrderedStore, SystemClock, UlidGenerator, to_score};
use crate::queue::Keys;

pub struct Client {
    store: Arc<dyn OrderedStore>,
    keys: Keys,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    default_retry_limit: u32,
}

impl Client {
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            keys: Keys::default(),
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            default_retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn from_config(store: Arc<dyn OrderedStore>, config: &Config) -> Self {
        Self::new(store)
            .with_keys(Keys::new(&config.key_prefix))
            .with_default_retry_limit(config.default_retry_limit)
    }

    /// Connect to the Redis store named in `config`.
    pub async fn connect(config: &Config) -> Result<Self, TasqError> {
        let store = RedisStore::connect(&config.redis).await?;
        Ok(Self::from_config(Arc::new(store), config))
    }

    pub fn with_keys(mut self, keys: Keys) -> Self {
        self.keys = keys;
        self
    }

    /// Also re-seeds the id generator so ids follow the same clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    pub fn with_default_retry_limit(mut self, retry_limit: u32) -> Self {
        self.default_retry_limit = retry_limit;
        self
    }

    /// Submit `task` to `queue`, runnable after `delay`.
    pub async fn enqueue(
        &self,
        queue: &str,
        task: Task,
        delay: Duration,
    ) -> Result<TaskId, TasqError> {
        self.enqueue_with_retry(queue, task, delay, self.default_retry_limit)
            .await
    }

    /// Submit `task` to run at `at`; times at or before now enqueue immediately.
    pub async fn enqueue_at(
        &self,
        queue: &str,
        task: Task,
        at: DateTime<Utc>,
    ) -> Result<TaskId, TasqError> {
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        self.enqueue(queue, task, delay).await
    }

    #[instrument(skip(self, task), fields(task_type = task.task_type()))]
    pub async fn enqueue_with_retry(
        &self,
        queue: &str,
        task: Task,
        delay: Duration,
        retry_limit: u32,
    ) -> Result<TaskId, TasqError> {
        let id = self.ids.generate_task_id();
        let message = TaskMessage::new(id.clone(), queue, task, retry_limit);
        let data = message.encode()?;

        if delay.is_zero() {
            self.store.push(&self.keys.queue(queue), &data).await?;
            debug!(task_id = %id, "task enqueued");
        } else {
            let score = to_score(self.clock.now()) + delay.as_secs_f64();
            self.store
                .schedule(self.keys.scheduled(), score, &data)
                .await?;
            debug!(task_id = %id, due_at = score, "task scheduled");
        }
        Ok(id)
    }
}
