//! Queue module: key layout and retry policy.

mod keys;
mod retry;

pub use keys::{DEFAULT_PREFIX, Keys};
pub use retry::{Decision, RetryPolicy};
