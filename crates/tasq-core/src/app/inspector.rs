//! Inspector - ストアの中身を読むだけの運用向けビュー
//!
//! queue ごとの件数、scheduled / retry / dead set の一覧、
//! task id からの所在確認を提供します。書き込みは一切しません。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::domain::{TaskId, TaskMessage, TaskState, TasqError};
use crate::ports::{OrderedStore, from_score};
use crate::queue::Keys;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub ready: BTreeMap<String, usize>,
    pub scheduled: usize,
    pub retry: usize,
    pub dead: usize,
}

/// A decoded set member and the time attached to its score.
///
/// `at` is the due time for scheduled/retry entries and the burial time for dead ones.
#[derive(Debug, Clone, Serialize)]
pub struct SetEntry {
    pub message: TaskMessage,
    pub at: DateTime<Utc>,
}

pub struct Inspector {
    store: Arc<dyn OrderedStore>,
    keys: Keys,
}

impl Inspector {
    pub fn new(store: Arc<dyn OrderedStore>, keys: Keys) -> Self {
        Self { store, keys }
    }

    pub async fn counts(&self, queues: &[&str]) -> Result<QueueCounts, TasqError> {
        let mut ready = BTreeMap::new();
        for queue in queues {
            let len = self.store.list_len(&self.keys.queue(queue)).await?;
            ready.insert(queue.to_string(), len);
        }
        Ok(QueueCounts {
            ready,
            scheduled: self.store.set_len(self.keys.scheduled()).await?,
            retry: self.store.set_len(self.keys.retry()).await?,
            dead: self.store.set_len(self.keys.dead()).await?,
        })
    }

    /// Messages waiting in `queue`, head first.
    pub async fn ready(&self, queue: &str) -> Result<Vec<TaskMessage>, TasqError> {
        let raw = self.store.list_range(&self.keys.queue(queue)).await?;
        Ok(raw.iter().filter_map(|data| decode(data)).collect())
    }

    pub async fn scheduled(&self) -> Result<Vec<SetEntry>, TasqError> {
        self.entries(self.keys.scheduled()).await
    }

    pub async fn retries(&self) -> Result<Vec<SetEntry>, TasqError> {
        self.entries(self.keys.retry()).await
    }

    pub async fn dead(&self) -> Result<Vec<SetEntry>, TasqError> {
        self.entries(self.keys.dead()).await
    }

    /// Every place a message with `id` currently sits.
    ///
    /// Usually one state, empty once the task has succeeded or is executing.
    /// Two entries mean a duplicate, which is worth a look.
    pub async fn locate(&self, queues: &[&str], id: &TaskId) -> Result<Vec<TaskState>, TasqError> {
        let mut found = Vec::new();
        for queue in queues {
            if self.ready(queue).await?.iter().any(|m| &m.id == id) {
                found.push(TaskState::Ready);
            }
        }
        let sets = [
            (self.keys.scheduled(), TaskState::Scheduled),
            (self.keys.retry(), TaskState::RetryScheduled),
            (self.keys.dead(), TaskState::Dead),
        ];
        for (set, state) in sets {
            if self.entries(set).await?.iter().any(|e| &e.message.id == id) {
                found.push(state);
            }
        }
        Ok(found)
    }

    async fn entries(&self, set: &str) -> Result<Vec<SetEntry>, TasqError> {
        let raw = self.store.set_entries(set).await?;
        Ok(raw
            .iter()
            .filter_map(|(data, score)| {
                Some(SetEntry {
                    message: decode(data)?,
                    at: from_score(*score)?,
                })
            })
            .collect())
    }
}

fn decode(data: &str) -> Option<TaskMessage> {
    match TaskMessage::decode(data) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(data, error = %e, "skipping undecodable entry");
            None
        }
    }
}
