//! Impls - OrderedStore の実装
//!
//! # 含まれる実装
//! - **RedisStore**: 本番用（redis crate, tokio）
//! - **InMemoryStore**: 開発・テスト用

#[cfg(test)]
pub(crate) mod faulty_store;
pub mod inmem_store;
pub mod redis_store;

pub use self::inmem_store::InMemoryStore;
pub use self::redis_store::{RedisOpt, RedisStore};
