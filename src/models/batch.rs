//! Batch run models
//!
//! Defines batch configuration, per-run results, the live batch state and the
//! statistics derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TestCase;
use crate::rules::RuleSetResult;

/// Token counts reported by a responder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Monetary cost of one call, in USD
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl Cost {
    pub fn new(input_cost: f64, output_cost: f64) -> Self {
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// Configuration for one batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRunConfig {
    pub run_count: u32,
    #[serde(default)]
    pub max_retries: u32,
    /// Delay between sequential runs
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub allow_parallel: bool,
    #[serde(default = "default_parallel_concurrency")]
    pub parallel_concurrency: usize,
    pub provider_id: String,
    pub model: String,
    pub test_case: TestCase,
}

fn default_parallel_concurrency() -> usize {
    4
}

impl BatchRunConfig {
    pub fn new(
        provider_id: impl Into<String>,
        model: impl Into<String>,
        test_case: TestCase,
    ) -> Self {
        Self {
            run_count: 1,
            max_retries: 0,
            delay_ms: 0,
            temperature: None,
            max_tokens: None,
            allow_parallel: false,
            parallel_concurrency: default_parallel_concurrency(),
            provider_id: provider_id.into(),
            model: model.into(),
            test_case,
        }
    }

    pub fn with_runs(mut self, run_count: u32) -> Self {
        self.run_count = run_count;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn parallel(mut self, concurrency: usize) -> Self {
        self.allow_parallel = true;
        self.parallel_concurrency = concurrency;
        self
    }

    /// Whether this batch goes through the task pool
    pub fn is_parallel(&self) -> bool {
        self.allow_parallel && self.run_count > 1
    }
}

/// Outcome of a single run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            RunStatus::Success => "✓",
            RunStatus::Failed => "!",
            RunStatus::Cancelled => "○",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Failed => write!(f, "FAILED"),
            RunStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Result of one run within a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRunResult {
    pub run_index: u32,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub cost: Option<Cost>,
    /// Grading verdict; always false unless the call succeeded
    pub passed: bool,
    pub token_usage: Option<TokenUsage>,
    pub retry_count: u32,
    pub response: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub rule_results: Vec<RuleSetResult>,
    pub timestamp: DateTime<Utc>,
}

impl BatchRunResult {
    pub fn success(run_index: u32, response: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            run_index,
            status: RunStatus::Success,
            duration_ms,
            cost: None,
            passed: false,
            token_usage: None,
            retry_count: 0,
            response: Some(response.into()),
            error: None,
            rule_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(run_index: u32, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            run_index,
            status: RunStatus::Failed,
            duration_ms,
            cost: None,
            passed: false,
            token_usage: None,
            retry_count: 0,
            response: None,
            error: Some(error.into()),
            rule_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled(run_index: u32, duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Cancelled,
            error: Some("Run cancelled".to_string()),
            ..Self::failed(run_index, "", duration_ms)
        }
    }

    pub fn with_verdict(mut self, passed: bool, rule_results: Vec<RuleSetResult>) -> Self {
        self.passed = passed;
        self.rule_results = rule_results;
        self
    }

    pub fn with_usage(mut self, token_usage: TokenUsage, cost: Cost) -> Self {
        self.token_usage = Some(token_usage);
        self.cost = Some(cost);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Entry for the batch error list; only failed runs have one
    pub fn error_entry(&self) -> Option<String> {
        if self.status != RunStatus::Failed {
            return None;
        }
        Some(format!(
            "Run {}: {}",
            self.run_index + 1,
            self.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

impl fmt::Display for BatchRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if !self.is_success() {
            self.status.to_string()
        } else if self.passed {
            "PASS".to_string()
        } else {
            "FAIL".to_string()
        };
        write!(
            f,
            "{} Run {} {} [{}ms]",
            self.status.symbol(),
            self.run_index + 1,
            verdict,
            self.duration_ms
        )?;
        if self.retry_count > 0 {
            write!(f, " ({} retries)", self.retry_count)?;
        }
        if let Some(err) = &self.error {
            write!(f, " - {err}")?;
        }
        Ok(())
    }
}

/// Lifecycle phase of a batch, derived from the state flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Idle => write!(f, "idle"),
            BatchStatus::Running => write!(f, "running"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Live state of one batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRunState {
    pub is_running: bool,
    pub is_cancelled: bool,
    pub completed_runs: u32,
    pub total_runs: u32,
    pub results: Vec<BatchRunResult>,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl BatchRunState {
    /// Fresh state for a batch that is about to start
    pub fn started(total_runs: u32) -> Self {
        Self {
            is_running: true,
            total_runs,
            results: Vec::with_capacity(total_runs as usize),
            start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn status(&self) -> BatchStatus {
        if self.is_running {
            BatchStatus::Running
        } else if self.is_cancelled {
            BatchStatus::Cancelled
        } else if self.start_time.is_some() {
            BatchStatus::Completed
        } else {
            BatchStatus::Idle
        }
    }

    /// Percentage of runs completed
    pub fn progress(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            (self.completed_runs as f64 / self.total_runs as f64) * 100.0
        }
    }

    pub fn statistics(&self) -> BatchStatistics {
        BatchStatistics::from_state(self)
    }

    /// Wall-clock duration, up to now while running
    pub fn elapsed_ms(&self) -> u64 {
        match self.start_time {
            Some(start) => {
                let end = self.end_time.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds().max(0) as u64
            }
            None => 0,
        }
    }
}

/// Statistics derived from a batch's results
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_runs: u32,
    pub completed_runs: u32,
    pub passed_runs: u32,
    /// Runs whose call succeeded but whose response failed grading
    pub failed_runs: u32,
    /// Runs whose call never succeeded
    pub error_runs: u32,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub progress: f64,
}

impl BatchStatistics {
    pub fn from_state(state: &BatchRunState) -> Self {
        let results = &state.results;
        let passed_runs = results.iter().filter(|r| r.passed).count() as u32;
        let failed_runs = results
            .iter()
            .filter(|r| r.is_success() && !r.passed)
            .count() as u32;
        let error_runs = results.iter().filter(|r| !r.is_success()).count() as u32;

        let completed = state.completed_runs;
        let pass_rate = if completed > 0 {
            (passed_runs as f64 / completed as f64) * 100.0
        } else {
            0.0
        };
        let avg_duration_ms = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.duration_ms as f64).sum::<f64>() / results.len() as f64
        };
        let total_cost = results
            .iter()
            .filter_map(|r| r.cost.map(|c| c.total_cost))
            .sum();
        let total_tokens = results
            .iter()
            .filter_map(|r| r.token_usage.map(|u| u.total_tokens))
            .sum();

        Self {
            total_runs: state.total_runs,
            completed_runs: completed,
            passed_runs,
            failed_runs,
            error_runs,
            pass_rate,
            avg_duration_ms,
            total_cost,
            total_tokens,
            progress: state.progress(),
        }
    }
}

impl fmt::Display for BatchStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} runs | Pass: {} | Fail: {} | Error: {} | Pass Rate: {:.1}% | Avg: {:.0}ms | Cost: ${:.4}",
            self.completed_runs,
            self.total_runs,
            self.passed_runs,
            self.failed_runs,
            self.error_runs,
            self.pass_rate,
            self.avg_duration_ms,
            self.total_cost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(results: Vec<BatchRunResult>, total: u32) -> BatchRunState {
        BatchRunState {
            completed_runs: results.len() as u32,
            total_runs: total,
            results,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_result_creation() {
        let ok = BatchRunResult::success(0, "hi", 120).with_verdict(true, vec![]);
        assert!(ok.is_success());
        assert!(ok.passed);

        let err = BatchRunResult::failed(1, "boom", 30).with_retry_count(2);
        assert_eq!(err.status, RunStatus::Failed);
        assert!(!err.passed);
        assert_eq!(err.retry_count, 2);

        let cancelled = BatchRunResult::cancelled(2, 5);
        assert_eq!(cancelled.status, RunStatus::Cancelled);
        assert_eq!(cancelled.run_index, 2);

        assert_eq!(err.error_entry().as_deref(), Some("Run 2: boom"));
        assert_eq!(ok.error_entry(), None);
        assert_eq!(cancelled.error_entry(), None);
    }

    #[test]
    fn test_statistics() {
        let results = vec![
            BatchRunResult::success(0, "a", 100)
                .with_verdict(true, vec![])
                .with_usage(TokenUsage::new(10, 5), Cost::new(0.01, 0.02)),
            BatchRunResult::success(1, "b", 200)
                .with_verdict(false, vec![])
                .with_usage(TokenUsage::new(10, 10), Cost::new(0.01, 0.01)),
            BatchRunResult::failed(2, "timeout", 300),
        ];
        let stats = state_with(results, 4).statistics();

        assert_eq!(stats.completed_runs, 3);
        assert_eq!(stats.passed_runs, 1);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.error_runs, 1);
        assert!((stats.pass_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.avg_duration_ms, 200.0);
        assert!((stats.total_cost - 0.05).abs() < 1e-9);
        assert_eq!(stats.total_tokens, 35);
        assert_eq!(stats.progress, 75.0);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = BatchRunState::default().statistics();
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.avg_duration_ms, 0.0);
        assert_eq!(stats.progress, 0.0);
    }

    #[test]
    fn test_status_transitions() {
        let mut state = BatchRunState::default();
        assert_eq!(state.status(), BatchStatus::Idle);

        state = BatchRunState::started(3);
        assert_eq!(state.status(), BatchStatus::Running);

        state.is_running = false;
        assert_eq!(state.status(), BatchStatus::Completed);

        state.is_cancelled = true;
        assert_eq!(state.status(), BatchStatus::Cancelled);
    }

    #[test]
    fn test_is_parallel() {
        let tc = TestCase::new("t", "p");
        let config = BatchRunConfig::new("echo", "m", tc).with_runs(1).parallel(4);
        assert!(!config.is_parallel());
        assert!(config.with_runs(2).is_parallel());
    }
}
