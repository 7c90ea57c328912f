//! Data models for batch prompt testing
//!
//! This module contains the data structures shared by the runner, the
//! analytics and the persistence layer.

mod batch;
mod test_case;

pub use batch::{
    BatchRunConfig, BatchRunResult, BatchRunState, BatchStatistics, BatchStatus, Cost, RunStatus,
    TokenUsage,
};
pub use test_case::TestCase;
