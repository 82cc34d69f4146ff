//! Dispatcher - ready queue からの取り出しと handler 実行
//!
//! # フロー
//! 1. 登録済み全 queue に対して blocking pop（タイムアウト付き）
//! 2. TaskMessage にデコード（壊れたデータはログして破棄）
//! 3. worker pool の slot を取得（満杯ならここで止まる = backpressure）
//! 4. slot を持たせて実行を spawn し、すぐ次の pop へ
//! 5. 失敗時: retry_count++ / error_msg 更新 → retry set か dead set へ
//! 6. bookkeeping が終わってから slot を返す
//!
//! # シャットダウン
//! - pop のタイムアウトごとに shutdown を確認する（pop 自体はキャンセルしない）
//! - shutdown 後に手元に来たメッセージは queue の先頭に戻す
//! - 実行中のタスクは slot で追跡しているので、`WorkerPool::drain` で待てる

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::app::pool::{Slot, WorkerPool};
use crate::app::registry::HandlerRegistry;
use crate::domain::TaskMessage;
use crate::ports::{Clock, IdGenerator, OrderedStore, UlidGenerator, to_score};
use crate::queue::{Decision, Keys, RetryPolicy};

pub struct Dispatcher {
    store: Arc<dyn OrderedStore>,
    keys: Keys,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    registry: HandlerRegistry,
    pool: WorkerPool,
    policy: RetryPolicy,
    dequeue_timeout: Duration,
    dead_retention: Duration,
    ready_keys: Vec<String>,
}

pub struct DispatcherOptions {
    pub policy: RetryPolicy,
    pub dequeue_timeout: Duration,
    pub dead_retention: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn OrderedStore>,
        keys: Keys,
        clock: Arc<dyn Clock>,
        registry: HandlerRegistry,
        pool: WorkerPool,
        options: DispatcherOptions,
    ) -> Self {
        let ready_keys = registry.queues().map(|q| keys.queue(q)).collect();
        Self {
            store,
            keys,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            registry,
            pool,
            policy: options.policy,
            dequeue_timeout: options.dequeue_timeout,
            dead_retention: options.dead_retention,
            ready_keys,
        }
    }

    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.registry.queues()
    }

    /// Loop until the shutdown flag flips to `true` (or its sender is dropped).
    #[instrument(name = "dispatcher", skip_all)]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(queues = ?self.ready_keys, capacity = self.pool.capacity(), "dispatcher started");
        loop {
            if stopping(&shutdown) {
                break;
            }

            let (key, data) = match self
                .store
                .pop_blocking(&self.ready_keys, self.dequeue_timeout)
                .await
            {
                Ok(Some(popped)) => popped,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to pop from ready queues");
                    // Throttle on a failing store; the pop timeout is the natural pace.
                    tokio::select! {
                        _ = tokio::time::sleep(self.dequeue_timeout) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };

            if stopping(&shutdown) {
                self.hand_back(&key, &data).await;
                break;
            }

            let Some(queue) = self.keys.queue_name(&key).map(str::to_string) else {
                error!(key, "popped from an unknown key; discarding");
                continue;
            };
            let mut message = match TaskMessage::decode(&data) {
                Ok(message) => message,
                Err(e) => {
                    error!(queue, data, error = %e, "discarding undecodable task message");
                    continue;
                }
            };
            if message.queue.is_empty() {
                message.queue = queue.clone();
            }
            // Identical bare bodies would collapse into one retry/dead set member.
            if message.id.is_empty() {
                message.id = self.ids.generate_task_id();
            }

            let slot = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                slot = self.pool.acquire() => slot,
            };
            let Some(slot) = slot else {
                self.hand_back(&key, &data).await;
                break;
            };

            debug!(task_id = %message.id, queue, "task dispatched");
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.execute(queue, message, slot).await });
        }
        info!("dispatcher stopped");
    }

    /// Run one message to a terminal point (success, retry scheduled, or dead),
    /// then give the slot back.
    pub async fn execute(&self, queue: String, message: TaskMessage, slot: Slot) {
        let outcome = match self.registry.get(&queue) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                let task = message.task();
                // Own task so a panicking handler surfaces as a JoinError.
                match tokio::spawn(async move { handler.handle(&task).await }).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) if e.is_panic() => Err("handler panicked".to_string()),
                    Err(e) => Err(format!("handler aborted: {e}")),
                }
            }
            None => Err(format!("no handler registered for queue {queue}")),
        };

        match outcome {
            Ok(()) => debug!(task_id = %message.id, queue, "task succeeded"),
            Err(error) => self.fail(message, error).await,
        }
        slot.release();
    }

    async fn fail(&self, mut message: TaskMessage, error: String) {
        message.record_failure(error);
        warn!(
            task_id = %message.id,
            queue = %message.queue,
            retried = message.retry_count,
            retry_limit = message.retry_limit,
            error = %message.last_error,
            "task handler failed"
        );

        let data = match message.encode() {
            Ok(data) => data,
            Err(e) => {
                error!(severity = "severe", task_id = %message.id, error = %e,
                    "could not encode failed task; task is lost");
                return;
            }
        };
        let now = to_score(self.clock.now());

        match self.policy.decide(&message) {
            Decision::Retry { delay } => {
                let due_at = now + delay.as_secs_f64();
                match self.store.schedule(self.keys.retry(), due_at, &data).await {
                    Ok(()) => debug!(task_id = %message.id, ?delay, "retry scheduled"),
                    Err(e) => error!(
                        severity = "severe",
                        task_id = %message.id,
                        data = %data,
                        error = %e,
                        "could not add task to retry set; task is lost"
                    ),
                }
            }
            Decision::Dead => {
                let trim_before = now - self.dead_retention.as_secs_f64();
                match self.store.bury(self.keys.dead(), now, &data, trim_before).await {
                    Ok(()) => warn!(
                        task_id = %message.id,
                        queue = %message.queue,
                        retried = message.retry_count,
                        error = %message.last_error,
                        "retry exhausted; task is dead"
                    ),
                    Err(e) => error!(
                        severity = "severe",
                        task_id = %message.id,
                        data = %data,
                        error = %e,
                        "could not add task to dead set; task is lost"
                    ),
                }
            }
        }
    }

    async fn hand_back(&self, key: &str, data: &str) {
        match self.store.push_front(key, data).await {
            Ok(()) => debug!(key, "returned undispatched message to its queue"),
            Err(e) => error!(
                severity = "severe",
                key,
                data,
                error = %e,
                "could not return message after shutdown; task is lost"
            ),
        }
    }
}

/// Shutdown requested, or nobody is left to request it.
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
