//! App - アプリケーション層
//!
//! ports を組み合わせてキューの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **Client**: タスクの投入（即時 / 遅延）
//! - **Poller**: scheduled / retry set から ready queue への昇格
//! - **Dispatcher**: ready queue からの取り出しと handler 実行、失敗時の記録
//! - **WorkerPool**: 同時実行数の制限
//! - **HandlerRegistry**: queue 名 → handler の対応
//! - **Launcher**: 上記の組み立てと起動・停止
//! - **Inspector**: 読み取り専用の運用ビュー

pub mod client;
pub mod dispatcher;
pub mod inspector;
pub mod launcher;
pub mod poller;
pub mod pool;
pub mod registry;

pub use self::client::Client;
pub use self::dispatcher::{Dispatcher, DispatcherOptions};
pub use self::inspector::{Inspector, QueueCounts, SetEntry};
pub use self::launcher::{Launcher, LauncherBuilder};
pub use self::poller::Poller;
pub use self::pool::{Slot, WorkerPool};
pub use self::registry::{HandlerFn, HandlerRegistry, TaskHandler, handler_fn};
