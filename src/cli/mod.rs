//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Repeat a prompt against a model and grade every response
#[derive(Parser, Debug)]
#[command(name = "prompt-bench")]
#[command(version)]
#[command(about = "Run a prompt many times and judge each response against declarative rules")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a batch for one test case
    Run(RunArgs),

    /// Grade a single response without calling a model
    Validate(ValidateArgs),

    /// View saved sessions
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test case file (YAML or JSON)
    pub test_case: PathBuf,

    /// Number of runs
    #[arg(short = 'n', long)]
    pub runs: Option<u32>,

    /// Immediate retries per failed run
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Delay between sequential runs in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Run in parallel
    #[arg(short, long)]
    pub parallel: bool,

    /// Maximum runs in flight (when parallel)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Responder base URL; selects the OpenAI-compatible responder
    #[arg(long)]
    pub base_url: Option<String>,

    /// Use the offline echo responder
    #[arg(long, conflicts_with = "base_url")]
    pub echo: bool,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum output tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Save the report to file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not save the session
    #[arg(long)]
    pub no_save: bool,

    /// Suppress per-run progress lines
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Test case file (YAML or JSON)
    pub test_case: PathBuf,

    /// Response text to grade
    #[arg(short, long, conflicts_with = "response_file")]
    pub response: Option<String>,

    /// File holding the response text
    #[arg(long)]
    pub response_file: Option<PathBuf>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List saved sessions, newest first
    List {
        /// Filter by provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show one session ("latest" for the most recent)
    Show {
        /// Session id
        #[arg(default_value = "latest")]
        id: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Export the report to file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show environment overrides instead
        #[arg(long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a configuration file with default values
    Init {
        /// Output path
        #[arg(short, long, default_value = "prompt-bench.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List supported environment variables
    Env,
}
