//! Batch session persistence
//!
//! The runner reports to a [`SessionStore`] at batch start, at periodic
//! checkpoints and at the end. Store failures never affect the batch; the
//! in-memory state stays authoritative.

mod storage;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{BatchRunConfig, BatchRunResult, BatchStatistics};

pub use storage::{JsonFileStore, SessionSummary, StoredSession};

/// Terminal or in-progress status of a persisted session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a batch handed to the store
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub results: Vec<BatchRunResult>,
    pub statistics: BatchStatistics,
}

/// Persistence collaborator for batch sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a new session and return its id
    async fn create_session(
        &self,
        config: &BatchRunConfig,
        started_at: DateTime<Utc>,
    ) -> Result<String>;

    async fn save_snapshot(&self, session_id: &str, snapshot: &BatchSnapshot) -> Result<()>;

    async fn finish_session(
        &self,
        session_id: &str,
        snapshot: &BatchSnapshot,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Store that keeps nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn create_session(
        &self,
        _config: &BatchRunConfig,
        _started_at: DateTime<Utc>,
    ) -> Result<String> {
        Ok(String::new())
    }

    async fn save_snapshot(&self, _session_id: &str, _snapshot: &BatchSnapshot) -> Result<()> {
        Ok(())
    }

    async fn finish_session(
        &self,
        _session_id: &str,
        _snapshot: &BatchSnapshot,
        _status: SessionStatus,
        _ended_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}
