//! RedisStore - 本番用のストア（Redis 互換）
//!
//! # 接続
//! - 通常コマンド用と blocking pop 用で ConnectionManager を分けます。
//!   BLPOP はサーバー側で接続を占有するので、同じ多重化接続に載せると
//!   ZADD などの他コマンドがタイムアウトまで待たされるためです。
//! - ConnectionManager は切断時に自動で再接続します。
//!
//! # アトミック性
//! - `promote`: Lua スクリプト（ZREM が成功した時だけ RPUSH）
//! - `bury`: MULTI/EXEC パイプライン（ZADD + ZREMRANGEBYSCORE）

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Deserialize;

use crate::ports::{OrderedStore, StoreError};

/// Remove-gated push: the member reaches the list only if this call removed it.
const PROMOTE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// Connection settings for the store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RedisOpt {
    /// `host:port`, or a full `redis://` URL.
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisOpt {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
        }
    }
}

impl RedisOpt {
    pub fn url(&self) -> String {
        if self.addr.starts_with("redis://") || self.addr.starts_with("rediss://") {
            return self.addr.clone();
        }
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{password}@{}/{}", self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    blocking: ConnectionManager,
    promote: redis::Script,
}

impl RedisStore {
    pub async fn connect(opt: &RedisOpt) -> Result<Self, StoreError> {
        let client = redis::Client::open(opt.url())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;
        tracing::info!(addr = %opt.addr, db = opt.db, "connected to redis");
        Ok(Self {
            conn,
            blocking,
            promote: redis::Script::new(PROMOTE_SCRIPT),
        })
    }
}

#[async_trait]
impl OrderedStore for RedisStore {
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(list, value).await?;
        Ok(())
    }

    async fn push_front(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(list, value).await?;
        Ok(())
    }

    async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        if lists.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        let mut conn = self.blocking.clone();
        // Fractional timeouts need Redis >= 6; keep at least 1ms so 0 never means "forever".
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(lists)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;
        Ok(popped)
    }

    async fn schedule(&self, set: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zadd(set, member, score).await?;
        Ok(())
    }

    async fn due(&self, set: &str, max_score: f64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(set, "-inf", max_score).await?;
        Ok(members)
    }

    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(set, member).await?;
        Ok(removed > 0)
    }

    async fn promote(&self, set: &str, member: &str, list: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let moved: i64 = self
            .promote
            .key(set)
            .key(list)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    async fn bury(
        &self,
        set: &str,
        score: f64,
        member: &str,
        trim_before: f64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // Exclusive upper bound: entries scored exactly at the cutoff are kept.
        let cutoff = format!("({trim_before}");
        redis::pipe()
            .atomic()
            .zadd(set, member, score)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(set)
            .arg("-inf")
            .arg(cutoff)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(list).await?)
    }

    async fn set_len(&self, set: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(set).await?)
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(list, 0, -1).await?)
    }

    async fn set_entries(&self, set: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zrange_withscores(set, 0, -1).await?)
    }
}
