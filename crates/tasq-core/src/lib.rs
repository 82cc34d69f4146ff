//! tasq-core
//!
//! Redis をバックエンドにした分散タスクキューのコアです。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, message, state, errors）
//! - **ports**: 抽象化レイヤー（OrderedStore, Clock, IdGenerator）
//! - **queue**: キー配置とリトライ方針
//! - **app**: Client / Poller / Dispatcher / WorkerPool / Launcher / Inspector
//! - **impls**: 実装（RedisStore, InMemoryStore）
//! - **config**: 設定値

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use crate::app::{Client, Inspector, Launcher, TaskHandler, handler_fn};
pub use crate::config::Config;
pub use crate::domain::{HandlerError, Task, TaskId, TaskMessage, TasqError};
