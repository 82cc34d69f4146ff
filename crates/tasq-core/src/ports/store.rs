//! OrderedStore port - 外部の順序付きストア（Redis 互換）
//!
//! コアが必要とするのは list と sorted set のアトミックな操作だけです。
//! ストア本体は外部コンポーネントであり、この trait が唯一の接点になります。
//!
//! # 実装
//! - `RedisStore`: 本番用
//! - `InMemoryStore`: 開発・テスト用

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Atomic list and sorted-set primitives.
///
/// # 設計原則
/// - 1 操作 = 1 アトミックなストア変更（途中状態は外から見えない）
/// - 複合操作（`promote`, `bury`）はストア側のトランザクションで実行する
/// - アプリケーション側のロックは使わない
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Append `value` to the tail of `list`.
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Prepend `value` to the head of `list`.
    async fn push_front(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Pop from the head of the first non-empty list, waiting up to `timeout`.
    ///
    /// Returns `(list, value)`, or `None` when the wait timed out.
    async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError>;

    /// Add `member` to `set` with `score` (updates the score if present).
    async fn schedule(&self, set: &str, score: f64, member: &str) -> Result<(), StoreError>;

    /// Members of `set` with score in `(-inf, max_score]`, lowest score first.
    async fn due(&self, set: &str, max_score: f64) -> Result<Vec<String>, StoreError>;

    /// Remove `member`; `true` only if this call deleted it.
    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Atomically remove `member` from `set` and, only if it was removed,
    /// append it to `list`. Returns whether this call moved it.
    async fn promote(&self, set: &str, member: &str, list: &str) -> Result<bool, StoreError>;

    /// Atomically add `member` to `set` and drop entries scored before `trim_before`.
    async fn bury(
        &self,
        set: &str,
        score: f64,
        member: &str,
        trim_before: f64,
    ) -> Result<(), StoreError>;

    async fn list_len(&self, list: &str) -> Result<usize, StoreError>;

    async fn set_len(&self, set: &str) -> Result<usize, StoreError>;

    /// Whole list, head first.
    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError>;

    /// Whole set with scores, lowest score first.
    async fn set_entries(&self, set: &str) -> Result<Vec<(String, f64)>, StoreError>;
}
