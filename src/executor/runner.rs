//! Batch execution runner
//!
//! Runs one test case `run_count` times against a responder, either one run
//! after another or through the [`TaskPool`]. The live [`BatchRunState`] is
//! published on a watch channel after every change.

use chrono::Utc;
use futures::FutureExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::parallel::{Task, TaskPool, TaskStatus};
use crate::models::{BatchRunConfig, BatchRunResult, BatchRunState, BatchStatistics, BatchStatus};
use crate::responder::{CompletionRequest, Responder};
use crate::results::{BatchSnapshot, NullStore, SessionStatus, SessionStore};
use crate::rules::validate_rule_sets;
use crate::utils::timer::Timer;

/// Default number of completed runs between persisted snapshots
pub const DEFAULT_SNAPSHOT_EVERY: u32 = 5;

/// Errors that prevent a batch from starting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("A batch is already running on this runner")]
    AlreadyRunning,

    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),
}

/// Orchestrates the runs of one batch at a time
pub struct BatchRunner {
    responder: Arc<dyn Responder>,
    store: Arc<dyn SessionStore>,
    snapshot_every: u32,
    state: watch::Sender<BatchRunState>,
    cancel: Mutex<CancellationToken>,
}

impl BatchRunner {
    /// Create a runner that persists nothing
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        let (state, _) = watch::channel(BatchRunState::default());
        Self {
            responder,
            store: Arc::new(NullStore),
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            state,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Persist a snapshot every `n` completed runs; zero disables snapshots
    pub fn with_snapshot_every(mut self, n: u32) -> Self {
        self.snapshot_every = n;
        self
    }

    /// Current state
    pub fn state(&self) -> BatchRunState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<BatchRunState> {
        self.state.subscribe()
    }

    pub fn statistics(&self) -> BatchStatistics {
        self.state.borrow().statistics()
    }

    pub fn progress(&self) -> f64 {
        self.state.borrow().progress()
    }

    pub fn status(&self) -> BatchStatus {
        self.state.borrow().status()
    }

    /// Stop issuing new runs. Calls already in flight see the fired token.
    pub fn cancel_batch(&self) {
        let token = self.token();
        let marked = self.state.send_if_modified(|state| {
            if state.is_running && !state.is_cancelled {
                state.is_cancelled = true;
                true
            } else {
                false
            }
        });

        if marked {
            info!("Cancelling batch");
            token.cancel();
        } else {
            debug!("No running batch to cancel");
        }
    }

    /// Return to idle. Ignored while a batch is running.
    pub fn reset_batch(&self) {
        let reset = self.state.send_if_modified(|state| {
            if state.is_running {
                false
            } else {
                *state = BatchRunState::default();
                true
            }
        });

        if !reset {
            warn!("Ignoring reset while a batch is running");
        }
    }

    fn token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the runner for a new batch and install a fresh token
    fn begin(&self, total_runs: u32) -> Result<CancellationToken, BatchError> {
        let mut current = self.token();
        let claimed = self.state.send_if_modified(|state| {
            if state.is_running {
                false
            } else {
                *state = BatchRunState::started(total_runs);
                true
            }
        });

        if !claimed {
            return Err(BatchError::AlreadyRunning);
        }

        *current = CancellationToken::new();
        Ok(current.clone())
    }

    /// Run a whole batch and return its final state
    pub async fn run_batch(&self, config: BatchRunConfig) -> Result<BatchRunState, BatchError> {
        validate_config(&config)?;
        let token = self.begin(config.run_count)?;
        let mut guard = RunGuard {
            state: &self.state,
            token: token.clone(),
            armed: true,
        };

        let parallel = config.is_parallel();
        info!(
            "Starting batch of {} runs for '{}' on {}/{} ({})",
            config.run_count,
            config.test_case.display_name(),
            config.provider_id,
            config.model,
            if parallel {
                format!("parallel x{}", config.parallel_concurrency)
            } else {
                "sequential".to_string()
            }
        );

        let started_at = self.state.borrow().start_time.unwrap_or_else(Utc::now);
        let session_id = match self.store.create_session(&config, started_at).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to create session: {:#}", e);
                None
            }
        };
        let session_id = session_id.as_deref();

        if parallel {
            self.run_parallel(&config, &token, session_id).await;
        } else {
            self.run_sequential(&config, &token, session_id).await;
        }

        let cancelled = token.is_cancelled();
        guard.armed = false;
        self.state.send_modify(|state| {
            state.is_running = false;
            state.is_cancelled = cancelled;
            state.end_time = Some(Utc::now());
            if parallel {
                state.results.sort_by_key(|r| r.run_index);
                state.errors = state.results.iter().filter_map(|r| r.error_entry()).collect();
            }
        });

        let final_state = self.state();
        let statistics = final_state.statistics();
        let session_status = if cancelled {
            SessionStatus::Cancelled
        } else if statistics.completed_runs > 0 && statistics.error_runs == statistics.completed_runs
        {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };

        info!(
            "Batch {} in {}ms - {}",
            final_state.status(),
            final_state.elapsed_ms(),
            statistics
        );

        if let Some(id) = session_id {
            let snapshot = BatchSnapshot {
                results: final_state.results.clone(),
                statistics,
            };
            let ended_at = final_state.end_time.unwrap_or_else(Utc::now);
            if let Err(e) = self
                .store
                .finish_session(id, &snapshot, session_status, ended_at)
                .await
            {
                warn!("Failed to finish session {}: {:#}", id, e);
            }
        }

        Ok(final_state)
    }

    async fn run_sequential(
        &self,
        config: &BatchRunConfig,
        token: &CancellationToken,
        session_id: Option<&str>,
    ) {
        for run_index in 0..config.run_count {
            if token.is_cancelled() {
                info!("Batch cancelled before run {}", run_index + 1);
                break;
            }

            if run_index > 0 && config.delay_ms > 0 {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Batch cancelled before run {}", run_index + 1);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.delay_ms)) => {}
                }
            }

            let result = self.call_with_retry(config, run_index, token).await;
            self.settle(result, session_id).await;
        }
    }

    async fn run_parallel(
        &self,
        config: &BatchRunConfig,
        token: &CancellationToken,
        session_id: Option<&str>,
    ) {
        let tasks: Vec<_> = (0..config.run_count)
            .map(move |run_index| {
                Task::new(format!("run-{}", run_index + 1), move || {
                    async move {
                        let result = self.call_with_retry(config, run_index, token).await;
                        self.settle(result.clone(), session_id).await;
                        Ok::<_, anyhow::Error>(result)
                    }
                    .boxed()
                })
            })
            .collect();

        let outcomes = TaskPool::new(config.parallel_concurrency)
            .run(tasks, token)
            .await;

        for (index, outcome) in outcomes.into_iter().enumerate() {
            if outcome.status == TaskStatus::Failed {
                let message = outcome.error.unwrap_or_default();
                self.settle(BatchRunResult::failed(index as u32, message, 0), session_id)
                    .await;
            }
        }
    }

    /// Perform one run: call the responder, retrying immediately on failure
    async fn call_with_retry(
        &self,
        config: &BatchRunConfig,
        run_index: u32,
        token: &CancellationToken,
    ) -> BatchRunResult {
        let request = build_request(config);
        let timer = Timer::start(format!("run {}", run_index + 1));
        let mut attempts = 0;

        loop {
            debug!("Run {} attempt {}", run_index + 1, attempts + 1);

            match self.responder.call(request.clone(), token).await {
                Ok(response) => {
                    let outcome = validate_rule_sets(&config.test_case.rules, &response.content);
                    return BatchRunResult::success(run_index, response.content, timer.stop())
                        .with_verdict(outcome.pass, outcome.rule_sets)
                        .with_usage(response.usage, response.cost)
                        .with_retry_count(attempts);
                }
                Err(e) if e.is_cancelled() => {
                    debug!("Run {} cancelled", run_index + 1);
                    return BatchRunResult::cancelled(run_index, timer.stop())
                        .with_retry_count(attempts);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts <= config.max_retries && !token.is_cancelled() {
                        warn!(
                            "Run {} failed ({}), retry {}/{}",
                            run_index + 1,
                            e,
                            attempts,
                            config.max_retries
                        );
                        continue;
                    }

                    if attempts <= config.max_retries {
                        return BatchRunResult::cancelled(run_index, timer.stop())
                            .with_retry_count(attempts - 1);
                    }

                    warn!("Run {} failed after {} attempts: {}", run_index + 1, attempts, e);
                    return BatchRunResult::failed(run_index, e.to_string(), timer.stop())
                        .with_retry_count(config.max_retries);
                }
            }
        }
    }

    /// Record a finished run and checkpoint when due
    async fn settle(&self, result: BatchRunResult, session_id: Option<&str>) {
        debug!("{}", result);

        let mut completed = 0;
        self.state.send_modify(|state| {
            if let Some(entry) = result.error_entry() {
                state.errors.push(entry);
            }
            state.results.push(result);
            state.completed_runs = (state.completed_runs + 1).min(state.total_runs);
            completed = state.completed_runs;
        });

        let Some(id) = session_id else {
            return;
        };
        if self.snapshot_every == 0 || completed % self.snapshot_every != 0 {
            return;
        }

        let snapshot = {
            let state = self.state.borrow();
            BatchSnapshot {
                results: state.results.clone(),
                statistics: state.statistics(),
            }
        };
        if let Err(e) = self.store.save_snapshot(id, &snapshot).await {
            warn!("Failed to save snapshot for session {}: {:#}", id, e);
        }
    }
}

/// Returns the runner to idle when a `run_batch` future is dropped mid-batch
struct RunGuard<'a> {
    state: &'a watch::Sender<BatchRunState>,
    token: CancellationToken,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!("Batch dropped before finishing, marking it cancelled");
        self.token.cancel();
        self.state.send_modify(|state| {
            state.is_running = false;
            state.is_cancelled = true;
            state.end_time = Some(Utc::now());
        });
    }
}

fn validate_config(config: &BatchRunConfig) -> Result<(), BatchError> {
    if config.run_count == 0 {
        return Err(BatchError::InvalidConfig(
            "run count must be at least 1".to_string(),
        ));
    }
    if config.model.trim().is_empty() {
        return Err(BatchError::InvalidConfig("model is empty".to_string()));
    }
    if config.test_case.prompt.trim().is_empty() {
        return Err(BatchError::InvalidConfig(format!(
            "test case '{}' has an empty prompt",
            config.test_case.id
        )));
    }
    Ok(())
}

fn build_request(config: &BatchRunConfig) -> CompletionRequest {
    let mut request = CompletionRequest::new(config.model.clone(), config.test_case.prompt.clone());
    request.temperature = config.temperature;
    request.max_tokens = config.max_tokens;
    request.system_prompt = config.test_case.system_prompt.clone();
    request
}
