//! Bounded-concurrency task pool
//!
//! Executes a fixed list of independent futures with at most `concurrency`
//! outstanding at a time. All futures are polled on the caller's task, so
//! "parallel" means overlapping waits rather than multiple threads.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type TaskFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a>;

/// One independent unit of asynchronous work
pub struct Task<'a, T> {
    pub id: String,
    execute: TaskFn<'a, T>,
}

impl<'a, T> Task<'a, T> {
    pub fn new<F>(id: impl Into<String>, execute: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a,
    {
        Self {
            id: id.into(),
            execute: Box::new(execute),
        }
    }
}

impl<T> fmt::Debug for Task<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}

/// Final status of a submitted task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one task, positionally matching its input
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    pub id: String,
    pub status: TaskStatus,
    pub value: Option<T>,
    pub error: Option<String>,
}

impl<T> TaskResult<T> {
    fn completed(id: String, value: T) -> Self {
        Self {
            id,
            status: TaskStatus::Completed,
            value: Some(value),
            error: None,
        }
    }

    fn failed(id: String, error: String) -> Self {
        Self {
            id,
            status: TaskStatus::Failed,
            value: None,
            error: Some(error),
        }
    }

    fn cancelled(id: String) -> Self {
        Self {
            id,
            status: TaskStatus::Cancelled,
            value: None,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Bounded-concurrency executor
#[derive(Clone, Copy, Debug)]
pub struct TaskPool {
    concurrency: usize,
}

impl TaskPool {
    /// Create a pool; a concurrency of zero is treated as one
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task and return one result per task, in input order
    pub async fn run<'a, T>(
        &self,
        tasks: Vec<Task<'a, T>>,
        cancel: &CancellationToken,
    ) -> Vec<TaskResult<T>>
    where
        T: Send + 'a,
    {
        self.run_with_progress(tasks, cancel, |_, _| {}).await
    }

    /// Like [`TaskPool::run`], calling `on_settled` with the input index each
    /// time a task finishes or is skipped because of cancellation.
    pub async fn run_with_progress<'a, T, F>(
        &self,
        tasks: Vec<Task<'a, T>>,
        cancel: &CancellationToken,
        mut on_settled: F,
    ) -> Vec<TaskResult<T>>
    where
        T: Send + 'a,
        F: FnMut(usize, &TaskResult<T>),
    {
        let total = tasks.len();
        let mut slots: Vec<Option<TaskResult<T>>> = (0..total).map(|_| None).collect();
        let mut pending = tasks.into_iter().enumerate();
        let mut active = FuturesUnordered::new();

        loop {
            while active.len() < self.concurrency {
                let Some((index, task)) = pending.next() else {
                    break;
                };

                if cancel.is_cancelled() {
                    debug!("Skipping task {} after cancellation", task.id);
                    let result = TaskResult::cancelled(task.id);
                    on_settled(index, &result);
                    slots[index] = Some(result);
                    continue;
                }

                debug!("Starting task {} ({}/{})", task.id, index + 1, total);
                let Task { id, execute } = task;
                let future = execute();
                active.push(async move {
                    let result = match future.await {
                        Ok(value) => TaskResult::completed(id, value),
                        Err(e) => TaskResult::failed(id, format!("{e:#}")),
                    };
                    (index, result)
                });
            }

            match active.next().await {
                Some((index, result)) => {
                    on_settled(index, &result);
                    slots[index] = Some(result);
                }
                None => break,
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| TaskResult::cancelled(format!("task-{index}")))
            })
            .collect()
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Run `tasks` with at most `concurrency` outstanding
pub async fn run_pool<'a, T>(
    tasks: Vec<Task<'a, T>>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Vec<TaskResult<T>>
where
    T: Send + 'a,
{
    TaskPool::new(concurrency).run(tasks, cancel).await
}
