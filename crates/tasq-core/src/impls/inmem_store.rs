//! InMemoryStore - 開発・テスト用のストア
//!
//! # 実装詳細
//! - list は `HashMap<String, VecDeque<String>>`
//! - sorted set は `HashMap<String, HashMap<String, f64>>`（範囲取得時にソート）
//! - 全操作が 1 つの Mutex の中で完結するので、`promote` / `bury` も自然にアトミック
//! - push 時は Notify で blocking pop を起こす
//! - `close()` 後は全操作が `StoreError::Closed`（ストア停止の再現用）

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;

use crate::ports::{OrderedStore, StoreError};

#[derive(Default)]
struct State {
    closed: bool,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashMap<String, f64>>,
}

impl State {
    fn push_back(&mut self, list: &str, value: &str) {
        self.lists
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
    }

    fn sorted(&self, set: &str) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> = self
            .sets
            .get(set)
            .map(|members| members.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        // Same order as a sorted set: score, then member.
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    fn remove(&mut self, set: &str, member: &str) -> bool {
        self.sets
            .get_mut(set)
            .is_some_and(|members| members.remove(member).is_some())
    }
}

pub struct InMemoryStore {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }
}

impl InMemoryStore {
    /// Fail every later operation with `StoreError::Closed`, waking blocked pops.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    async fn open(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderedStore for InMemoryStore {
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.open().await?.push_back(list, value);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn push_front(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.open()
            .await?
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push between the check
            // and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.open().await?;
                for list in lists {
                    if let Some(value) = state.lists.get_mut(list).and_then(VecDeque::pop_front) {
                        return Ok(Some((list.clone(), value)));
                    }
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn schedule(&self, set: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.open()
            .await?
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn due(&self, set: &str, max_score: f64) -> Result<Vec<String>, StoreError> {
        let state = self.open().await?;
        Ok(state
            .sorted(set)
            .into_iter()
            .filter(|(_, score)| *score <= max_score)
            .map(|(member, _)| member)
            .collect())
    }

    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.open().await?.remove(set, member))
    }

    async fn promote(&self, set: &str, member: &str, list: &str) -> Result<bool, StoreError> {
        let moved = {
            let mut state = self.open().await?;
            let removed = state.remove(set, member);
            if removed {
                state.push_back(list, member);
            }
            removed
        };
        if moved {
            self.notify.notify_waiters();
        }
        Ok(moved)
    }

    async fn bury(
        &self,
        set: &str,
        score: f64,
        member: &str,
        trim_before: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.open().await?;
        let members = state.sets.entry(set.to_string()).or_default();
        members.insert(member.to_string(), score);
        members.retain(|_, s| *s >= trim_before);
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        Ok(self.open().await?.lists.get(list).map_or(0, VecDeque::len))
    }

    async fn set_len(&self, set: &str) -> Result<usize, StoreError> {
        Ok(self.open().await?.sets.get(set).map_or(0, HashMap::len))
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .open()
            .await?
            .lists
            .get(list)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_entries(&self, set: &str) -> Result<Vec<(String, f64)>, StoreError> {
        Ok(self.open().await?.sorted(set))
    }
}
