use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{HandlerError, Task, TasqError};

/// A handler for the tasks of one queue.
///
/// The handler gets the reconstructed `Task` and decides what to do by
/// `task.task_type()`. Returning `Err` schedules a retry (or marks the task
/// dead once its retry budget is spent).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Adapter that turns an async closure into a [`TaskHandler`].
pub struct HandlerFn<F> {
    f: F,
}

/// ```ignore
/// let handler = handler_fn(|task: Task| async move {
///     println!("{}", task.task_type());
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        (self.f)(task.clone()).await
    }
}

/// Registry of handlers (queue name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Owned by the dispatcher and used read-only afterwards, so no locks.
/// - Ordered by queue name so the dispatcher polls queues in a stable order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler for a queue. One handler per queue.
    pub fn register(
        &mut self,
        queue: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), TasqError> {
        let queue = queue.into();
        if self.handlers.contains_key(&queue) {
            return Err(TasqError::DuplicateHandler(queue));
        }
        self.handlers.insert(queue, handler);
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(queue)
    }

    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn handle(&self, _task: &Task) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registered_handler_runs() {
        let mut reg = HandlerRegistry::new();
        reg.register("default", Arc::new(OkHandler)).unwrap();

        let task = Task::from_value("ok", json!({})).unwrap();
        let handler = reg.get("default").unwrap();
        handler.handle(&task).await.unwrap();
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register("default", Arc::new(OkHandler)).unwrap();
        let err = reg.register("default", Arc::new(OkHandler)).unwrap_err();
        assert!(matches!(err, TasqError::DuplicateHandler(q) if q == "default"));
    }

    #[test]
    fn queues_are_sorted() {
        let mut reg = HandlerRegistry::new();
        reg.register("emails", Arc::new(OkHandler)).unwrap();
        reg.register("critical", Arc::new(OkHandler)).unwrap();
        assert_eq!(reg.queues().collect::<Vec<_>>(), vec!["critical", "emails"]);
        assert!(!reg.is_empty());
    }

    #[tokio::test]
    async fn closures_become_handlers() {
        let handler = handler_fn(|task: Task| async move {
            match task.get_str("email") {
                Some(_) => Ok(()),
                None => Err(HandlerError::from("missing email")),
            }
        });

        let good = Task::from_value("send_email", json!({ "email": "a@b.com" })).unwrap();
        let bad = Task::from_value("send_email", json!({})).unwrap();
        assert!(handler.handle(&good).await.is_ok());
        assert_eq!(handler.handle(&bad).await.unwrap_err().to_string(), "missing email");
    }
}
