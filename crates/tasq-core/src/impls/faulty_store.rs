//! Test double: an `InMemoryStore` whose operations can be made to fail.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::impls::InMemoryStore;
use crate::ports::{OrderedStore, StoreError};

/// Failure budgets count down; `usize::MAX` means "always fail".
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    pub pop_failures: AtomicUsize,
    pub pop_calls: AtomicUsize,
    pub promote_failures: AtomicUsize,
    pub fail_schedule: AtomicBool,
    pub fail_bury: AtomicBool,
    /// Set whose `due` query fails.
    pub fail_due_on: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn spend(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            usize::MAX => Some(usize::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

fn injected(flag: &AtomicBool) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Closed);
    }
    Ok(())
}

#[async_trait]
impl OrderedStore for FaultyStore {
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.inner.push(list, value).await
    }

    async fn push_front(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.inner.push_front(list, value).await
    }

    async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        self.pop_calls.fetch_add(1, Ordering::SeqCst);
        if spend(&self.pop_failures) {
            return Err(StoreError::Other("connection reset".to_string()));
        }
        self.inner.pop_blocking(lists, timeout).await
    }

    async fn schedule(&self, set: &str, score: f64, member: &str) -> Result<(), StoreError> {
        injected(&self.fail_schedule)?;
        self.inner.schedule(set, score, member).await
    }

    async fn due(&self, set: &str, max_score: f64) -> Result<Vec<String>, StoreError> {
        let failing = self
            .fail_due_on
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_deref()
            == Some(set);
        if failing {
            return Err(StoreError::Other(format!("due on {set} failed")));
        }
        self.inner.due(set, max_score).await
    }

    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.remove(set, member).await
    }

    async fn promote(&self, set: &str, member: &str, list: &str) -> Result<bool, StoreError> {
        if spend(&self.promote_failures) {
            return Err(StoreError::Other("promote failed".to_string()));
        }
        self.inner.promote(set, member, list).await
    }

    async fn bury(
        &self,
        set: &str,
        score: f64,
        member: &str,
        trim_before: f64,
    ) -> Result<(), StoreError> {
        injected(&self.fail_bury)?;
        self.inner.bury(set, score, member, trim_before).await
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        self.inner.list_len(list).await
    }

    async fn set_len(&self, set: &str) -> Result<usize, StoreError> {
        self.inner.set_len(set).await
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_range(list).await
    }

    async fn set_entries(&self, set: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.inner.set_entries(set).await
    }
}
