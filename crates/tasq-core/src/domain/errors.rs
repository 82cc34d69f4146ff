//! Errors - エラー型と分類
//!
//! ライブラリ全体で使う `TasqError` と、ユーザー handler が返す
//! `HandlerError` を定義します。

use thiserror::Error;

use crate::ports::StoreError;

/// Error returned by a user task handler.
///
/// Any error type works; only its `Display` text is kept (as `error_msg`).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum TasqError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("duplicate handler for queue={0}")]
    DuplicateHandler(String),

    #[error("no handlers registered; a launcher needs at least one queue to consume")]
    NoHandlers,

    #[error("task payload must be a JSON object, got {0}")]
    InvalidPayload(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("launcher already started")]
    AlreadyStarted,

    #[error("launcher was never started")]
    NotStarted,
}
