//! Batch execution engine
//!
//! Provides the bounded-concurrency task pool and the batch runner built on it.

mod parallel;
mod runner;

pub use parallel::{run_pool, Task, TaskPool, TaskResult, TaskStatus};
pub use runner::{BatchError, BatchRunner, DEFAULT_SNAPSHOT_EVERY};
