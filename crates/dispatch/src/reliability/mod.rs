//! Reliability policies for task execution

mod retry;

pub use retry::RetryPolicy;
