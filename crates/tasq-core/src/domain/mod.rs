//! Domain model (ids, tasks, task messages, states, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod state;
pub mod task;

pub use self::errors::{HandlerError, TasqError};
pub use self::ids::TaskId;
pub use self::message::{DEFAULT_RETRY_LIMIT, TaskMessage};
pub use self::state::TaskState;
pub use self::task::{Payload, Task};
