//! Results storage and retrieval
//!
//! Persists one pretty-printed JSON document per batch session, grouped in a
//! directory per provider.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{BatchSnapshot, SessionStatus, SessionStore};
use crate::models::{BatchRunConfig, BatchRunResult, BatchRunState, BatchStatistics};

/// Stored batch session containing all results
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredSession {
    /// Unique session ID
    pub id: String,

    /// Test case identifier
    pub test_case_id: String,

    /// Test case display name
    pub test_case_name: String,

    /// Provider the batch ran against
    pub provider_id: String,

    /// Model the batch ran against
    pub model: String,

    pub status: SessionStatus,

    /// Timestamp when the batch started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the batch reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// Batch configuration
    pub config: SessionConfig,

    /// Results recorded so far
    pub results: Vec<BatchRunResult>,

    /// Statistics at the last checkpoint
    pub statistics: BatchStatistics,

    /// Environment info
    pub environment: EnvironmentInfo,
}

/// Batch settings recorded with a session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub run_count: u32,
    pub max_retries: u32,
    pub delay_ms: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub allow_parallel: bool,
    pub parallel_concurrency: usize,
}

impl From<&BatchRunConfig> for SessionConfig {
    fn from(config: &BatchRunConfig) -> Self {
        Self {
            run_count: config.run_count,
            max_retries: config.max_retries,
            delay_ms: config.delay_ms,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            allow_parallel: config.allow_parallel,
            parallel_concurrency: config.parallel_concurrency,
        }
    }
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Tool version
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredSession {
    /// Create a new session record for a batch that is starting
    pub fn new(config: &BatchRunConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_session_id(),
            test_case_id: config.test_case.id.clone(),
            test_case_name: config.test_case.display_name().to_string(),
            provider_id: config.provider_id.clone(),
            model: config.model.clone(),
            status: SessionStatus::Running,
            started_at,
            completed_at: None,
            config: SessionConfig::from(config),
            results: Vec::new(),
            statistics: BatchStatistics {
                total_runs: config.run_count,
                ..Default::default()
            },
            environment: EnvironmentInfo::default(),
        }
    }

    /// Replace results and statistics with a newer snapshot
    pub fn apply_snapshot(&mut self, snapshot: &BatchSnapshot) {
        self.results = snapshot.results.clone();
        self.statistics = snapshot.statistics.clone();
    }

    /// Rebuild the batch state as of the last save
    pub fn to_state(&self) -> BatchRunState {
        BatchRunState {
            is_running: self.status == SessionStatus::Running,
            is_cancelled: self.status == SessionStatus::Cancelled,
            completed_runs: self.statistics.completed_runs,
            total_runs: self.statistics.total_runs,
            results: self.results.clone(),
            errors: self.results.iter().filter_map(|r| r.error_entry()).collect(),
            start_time: Some(self.started_at),
            end_time: self.completed_at,
        }
    }
}

/// Generate unique session ID
fn generate_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Brief session information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub provider_id: String,
    pub model: String,
    pub test_case_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_runs: u32,
    pub total_runs: u32,
    pub pass_rate: f64,
}

/// JSON file backed session store
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    /// Base directory for results
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a new store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create with the platform data directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prompt-bench")
            .join("sessions");
        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding a provider's sessions
    fn provider_dir(&self, provider: &str) -> PathBuf {
        self.base_dir.join(sanitize(provider))
    }

    fn session_path(&self, provider: &str, session_id: &str) -> PathBuf {
        self.provider_dir(provider).join(format!("{session_id}.json"))
    }

    /// Locate a session file without knowing its provider
    fn find_path(&self, session_id: &str) -> Result<PathBuf> {
        let file_name = format!("{session_id}.json");
        for provider in self.list_providers()? {
            let path = self.provider_dir(&provider).join(&file_name);
            if path.exists() {
                return Ok(path);
            }
        }
        bail!("Session not found: {session_id}")
    }

    /// Write a session document
    pub fn save(&self, session: &StoredSession) -> Result<PathBuf> {
        let dir = self.provider_dir(&session.provider_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = self.session_path(&session.provider_id, &session.id);
        let file = File::create(&path).context("Failed to create session file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, session).context("Failed to write session")?;

        debug!("Saved session to {}", path.display());
        Ok(path)
    }

    /// Load a session by id
    pub fn load(&self, session_id: &str) -> Result<StoredSession> {
        let path = self.find_path(session_id)?;
        self.load_from_path(&path)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<StoredSession> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open session file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse session")
    }

    /// List all providers with stored sessions
    pub fn list_providers(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut providers = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    providers.push(name.to_string());
                }
            }
        }

        providers.sort();
        Ok(providers)
    }

    /// Load every session, optionally restricted to one provider, newest first
    pub fn load_all(&self, provider: Option<&str>) -> Result<Vec<StoredSession>> {
        let providers = match provider {
            Some(p) => vec![sanitize(p)],
            None => self.list_providers()?,
        };

        let mut sessions = Vec::new();
        for provider in providers {
            let dir = self.provider_dir(&provider);
            if !dir.exists() {
                continue;
            }

            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    match self.load_from_path(&path) {
                        Ok(session) => sessions.push(session),
                        Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                    }
                }
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    /// Brief listing of sessions, newest first
    pub fn list_sessions(&self, provider: Option<&str>) -> Result<Vec<SessionSummary>> {
        Ok(self
            .load_all(provider)?
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id,
                provider_id: s.provider_id,
                model: s.model,
                test_case_id: s.test_case_id,
                status: s.status,
                started_at: s.started_at,
                completed_runs: s.statistics.completed_runs,
                total_runs: s.statistics.total_runs,
                pass_rate: s.statistics.pass_rate,
            })
            .collect())
    }

    /// Most recent session
    pub fn latest(&self, provider: Option<&str>) -> Result<Option<StoredSession>> {
        Ok(self.load_all(provider)?.into_iter().next())
    }

    /// Delete a session
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.find_path(session_id)?;
        fs::remove_file(&path)?;
        info!("Deleted session: {}", path.display());
        Ok(())
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::default_dir()
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn create_session(
        &self,
        config: &BatchRunConfig,
        started_at: DateTime<Utc>,
    ) -> Result<String> {
        let session = StoredSession::new(config, started_at);
        let path = self.save(&session)?;
        info!("Recording session {} at {}", session.id, path.display());
        Ok(session.id)
    }

    async fn save_snapshot(&self, session_id: &str, snapshot: &BatchSnapshot) -> Result<()> {
        let mut session = self.load(session_id)?;
        session.apply_snapshot(snapshot);
        self.save(&session)?;
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: &str,
        snapshot: &BatchSnapshot,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut session = self.load(session_id)?;
        session.apply_snapshot(snapshot);
        session.status = status;
        session.completed_at = Some(ended_at);
        self.save(&session)?;
        Ok(())
    }
}

/// Make a provider id safe to use as a directory name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
