//! Configuration module
//!
//! Handles loading and managing configuration. Values come from a YAML or
//! JSON file, then `PROMPT_BENCH_*` environment variables, then command-line
//! flags.

pub mod env;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::executor::DEFAULT_SNAPSHOT_EVERY;
use crate::http::Pricing;

pub use env::EnvConfig;

/// Config file names searched in the working directory
const LOCAL_CONFIG_FILES: [&str; 3] = ["prompt-bench.yaml", "prompt-bench.yml", "prompt-bench.json"];

/// Application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Responder connection settings
    pub responder: ResponderConfig,

    /// Defaults applied to every batch
    pub batch: BatchDefaults,

    /// Session persistence
    pub storage: StorageConfig,

    /// Default output format
    pub format: Option<String>,
}

/// Which responder implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponderKind {
    /// Offline echo of the prompt
    #[default]
    Echo,
    /// Any OpenAI-compatible chat completions endpoint
    OpenaiCompatible,
}

/// Responder connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub kind: ResponderKind,

    /// Provider id recorded with sessions
    pub provider_id: String,

    pub base_url: String,

    /// Inline API key; prefer `api_key_env`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    pub model: String,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    pub pricing: Pricing,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            kind: ResponderKind::Echo,
            provider_id: "echo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            model: "echo-1".to_string(),
            timeout_secs: 60,
            pricing: Pricing::default(),
        }
    }
}

impl ResponderConfig {
    /// Inline key first, then the named environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|v| !v.is_empty())
        })
    }
}

/// Defaults applied to every batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
    pub runs: u32,
    pub max_retries: u32,
    pub delay_ms: u64,
    pub parallel: bool,
    pub concurrency: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            runs: 5,
            max_retries: 1,
            delay_ms: 0,
            parallel: false,
            concurrency: 4,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Session persistence settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Save sessions at all
    pub enabled: bool,

    /// Session directory; the platform data directory when unset
    pub results_dir: Option<PathBuf>,

    /// Completed runs between snapshots
    pub snapshot_every: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            results_dir: None,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

impl StorageConfig {
    pub fn results_dir(&self) -> PathBuf {
        self.results_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("prompt-bench")
                .join("sessions")
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Default location of the user config file
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("prompt-bench").join("config.yaml"))
    }

    /// First existing config file in the standard locations
    pub fn find() -> Option<PathBuf> {
        LOCAL_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .chain(Self::user_config_path())
            .find(|p| p.is_file())
    }

    /// Load the explicit file if given, else the first one found, else defaults.
    /// Returns the path that was read, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        match Self::find() {
            Some(path) => {
                debug!("Using config file {}", path.display());
                Ok((Self::load(&path)?, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Overlay environment variables
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(url) = &env.base_url {
            self.responder.base_url = url.clone();
            if self.responder.kind == ResponderKind::Echo {
                self.responder.kind = ResponderKind::OpenaiCompatible;
                if self.responder.provider_id == "echo" {
                    self.responder.provider_id = "openai-compatible".to_string();
                }
            }
        }
        if let Some(key) = &env.api_key {
            self.responder.api_key = Some(key.clone());
        }
        if let Some(model) = &env.model {
            self.responder.model = model.clone();
        }
        if let Some(runs) = env.runs {
            self.batch.runs = runs;
        }
        if let Some(parallel) = env.parallel {
            self.batch.parallel = parallel;
        }
        if let Some(concurrency) = env.concurrency {
            self.batch.concurrency = concurrency;
        }
        if let Some(retries) = env.retries {
            self.batch.max_retries = retries;
        }
        if let Some(delay) = env.delay_ms {
            self.batch.delay_ms = delay;
        }
        if let Some(dir) = &env.results_dir {
            self.storage.results_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = &env.format {
            self.format = Some(format.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.responder.kind, ResponderKind::Echo);
        assert_eq!(config.responder.timeout_secs, 60);
        assert_eq!(config.batch.runs, 5);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.storage.snapshot_every, DEFAULT_SNAPSHOT_EVERY);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt-bench.yaml");
        std::fs::write(
            &path,
            "responder:\n  kind: openai-compatible\n  model: gpt-4o-mini\nbatch:\n  runs: 20\n  parallel: true\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.responder.kind, ResponderKind::OpenaiCompatible);
        assert_eq!(config.responder.model, "gpt-4o-mini");
        assert_eq!(config.responder.timeout_secs, 60);
        assert_eq!(config.batch.runs, 20);
        assert!(config.batch.parallel);
        assert_eq!(config.batch.max_retries, 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["nested/config.yaml", "config.json"] {
            let path = dir.path().join(name);
            let mut config = AppConfig::default();
            config.batch.delay_ms = 750;
            config.responder.pricing = Pricing::new(0.15, 0.6);
            config.save(&path).unwrap();

            let loaded = AppConfig::load(&path).unwrap();
            assert_eq!(loaded.batch, config.batch);
            assert_eq!(loaded.responder.pricing, config.responder.pricing);
        }
    }

    #[test]
    fn test_discover_missing_explicit_file() {
        let err = AppConfig::discover(Some(Path::new("/nonexistent/prompt-bench.yaml")))
            .unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_apply_env() {
        let mut config = AppConfig::default();
        let env = EnvConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            model: Some("llama3".to_string()),
            runs: Some(3),
            parallel: Some(true),
            retries: Some(0),
            results_dir: Some("/tmp/sessions".to_string()),
            ..Default::default()
        };
        config.apply_env(&env);

        assert_eq!(config.responder.kind, ResponderKind::OpenaiCompatible);
        assert_eq!(config.responder.provider_id, "openai-compatible");
        assert_eq!(config.responder.model, "llama3");
        assert_eq!(config.batch.runs, 3);
        assert!(config.batch.parallel);
        assert_eq!(config.batch.max_retries, 0);
        assert_eq!(config.storage.results_dir(), PathBuf::from("/tmp/sessions"));
    }

    #[test]
    fn test_resolve_api_key_prefers_inline() {
        let responder = ResponderConfig {
            api_key: Some("inline".to_string()),
            api_key_env: Some("PROMPT_BENCH_TEST_UNSET_KEY".to_string()),
            ..Default::default()
        };
        assert_eq!(responder.resolve_api_key().as_deref(), Some("inline"));

        let responder = ResponderConfig {
            api_key: None,
            ..responder
        };
        assert_eq!(responder.resolve_api_key(), None);
    }
}
