//! Environment variable configuration
//!
//! Provides `PROMPT_BENCH_*` overrides on top of the configuration file.

use std::env;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PROMPT_BENCH";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Responder base URL from PROMPT_BENCH_BASE_URL
    pub base_url: Option<String>,
    /// API key from PROMPT_BENCH_API_KEY
    pub api_key: Option<String>,
    /// Model from PROMPT_BENCH_MODEL
    pub model: Option<String>,
    /// Runs per batch from PROMPT_BENCH_RUNS
    pub runs: Option<u32>,
    /// Parallel mode from PROMPT_BENCH_PARALLEL
    pub parallel: Option<bool>,
    /// Pool size from PROMPT_BENCH_CONCURRENCY
    pub concurrency: Option<usize>,
    /// Retries per run from PROMPT_BENCH_RETRIES
    pub retries: Option<u32>,
    /// Delay between sequential runs from PROMPT_BENCH_DELAY_MS
    pub delay_ms: Option<u64>,
    /// Session directory from PROMPT_BENCH_RESULTS_DIR
    pub results_dir: Option<String>,
    /// Config file from PROMPT_BENCH_CONFIG
    pub config_file: Option<String>,
    /// Verbose from PROMPT_BENCH_VERBOSE
    pub verbose: Option<bool>,
    /// Output format from PROMPT_BENCH_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            base_url: get_env("BASE_URL"),
            api_key: get_env("API_KEY"),
            model: get_env("MODEL"),
            runs: get_env_parse("RUNS"),
            parallel: get_env_bool("PARALLEL"),
            concurrency: get_env_parse("CONCURRENCY"),
            retries: get_env_parse("RETRIES"),
            delay_ms: get_env_parse("DELAY_MS"),
            results_dir: get_env("RESULTS_DIR"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
            format: get_env("FORMAT"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.base_url.is_some()
            || self.api_key.is_some()
            || self.model.is_some()
            || self.runs.is_some()
            || self.parallel.is_some()
            || self.concurrency.is_some()
            || self.retries.is_some()
            || self.delay_ms.is_some()
            || self.results_dir.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
            || self.format.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        let api_key = self.api_key.as_ref().map(|_| "<set>");
        println!("Environment Configuration:");
        println!("  {ENV_PREFIX}_BASE_URL:    {:?}", self.base_url);
        println!("  {ENV_PREFIX}_API_KEY:     {:?}", api_key);
        println!("  {ENV_PREFIX}_MODEL:       {:?}", self.model);
        println!("  {ENV_PREFIX}_RUNS:        {:?}", self.runs);
        println!("  {ENV_PREFIX}_PARALLEL:    {:?}", self.parallel);
        println!("  {ENV_PREFIX}_CONCURRENCY: {:?}", self.concurrency);
        println!("  {ENV_PREFIX}_RETRIES:     {:?}", self.retries);
        println!("  {ENV_PREFIX}_DELAY_MS:    {:?}", self.delay_ms);
        println!("  {ENV_PREFIX}_RESULTS_DIR: {:?}", self.results_dir);
        println!("  {ENV_PREFIX}_CONFIG:      {:?}", self.config_file);
        println!("  {ENV_PREFIX}_VERBOSE:     {:?}", self.verbose);
        println!("  {ENV_PREFIX}_FORMAT:      {:?}", self.format);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all PROMPT_BENCH environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_BASE_URL      Responder base URL (OpenAI-compatible)");
    println!("  {ENV_PREFIX}_API_KEY       API key sent as a bearer token");
    println!("  {ENV_PREFIX}_MODEL         Model name");
    println!("  {ENV_PREFIX}_RUNS          Runs per batch");
    println!("  {ENV_PREFIX}_PARALLEL      Run the batch in parallel (true/false)");
    println!("  {ENV_PREFIX}_CONCURRENCY   Maximum runs in flight in parallel mode");
    println!("  {ENV_PREFIX}_RETRIES       Immediate retries per failed run");
    println!("  {ENV_PREFIX}_DELAY_MS      Delay between sequential runs");
    println!("  {ENV_PREFIX}_RESULTS_DIR   Directory for saved sessions");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE       Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_FORMAT        Output format (table, json, json-pretty, summary)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_BASE_URL=http://localhost:11434/v1");
    println!("  export {ENV_PREFIX}_MODEL=llama3");
    println!("  prompt-bench run case.yaml --runs 10 --parallel");
}
