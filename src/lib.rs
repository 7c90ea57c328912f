//! prompt-bench - repeated prompt testing with rule-based grading
//!
//! Runs one prompt many times against a text-generation responder, grades
//! every response with declarative rules and summarizes the batch.
//!
//! ## Features
//!
//! - Bounded-concurrency task pool with cooperative cancellation
//! - Sequential or parallel batches with immediate retries and live state
//! - Pure rule engine: equals, contains, starts/ends with, regex, length
//! - Percentile and consistency analytics over a finished batch
//! - JSON session storage with periodic snapshots
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prompt_bench::executor::BatchRunner;
//! use prompt_bench::models::{BatchRunConfig, TestCase};
//! use prompt_bench::responder::EchoResponder;
//! use prompt_bench::rules::{Aggregation, Rule, RuleSet};
//!
//! # async fn demo() -> Result<(), prompt_bench::executor::BatchError> {
//! let case = TestCase::new("greeting", "Say hello").with_rule_set(RuleSet::new(
//!     "tone",
//!     Aggregation::And,
//!     vec![Rule::contains("hello", "hello")],
//! ));
//! let runner = BatchRunner::new(Arc::new(EchoResponder::new()));
//! let state = runner
//!     .run_batch(BatchRunConfig::new("echo", "echo-1", case).with_runs(5))
//!     .await?;
//! println!("{}", state.statistics());
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod cli;
pub mod config;
pub mod executor;
pub mod http;
pub mod models;
pub mod output;
pub mod responder;
pub mod results;
pub mod rules;
pub mod utils;
