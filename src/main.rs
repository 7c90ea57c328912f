//! prompt-bench - run a prompt many times and grade every response
//!
//! ## Usage
//!
//! ```bash
//! # Ten sequential runs against the offline echo responder
//! prompt-bench run case.yaml --echo --runs 10
//!
//! # Parallel runs against an OpenAI-compatible endpoint
//! prompt-bench run case.yaml --base-url http://localhost:11434/v1 --model llama3 -n 20 -p -j 4
//!
//! # Grade a response without calling a model
//! prompt-bench validate case.yaml --response "Hello, world!"
//!
//! # Saved sessions
//! prompt-bench results list
//! prompt-bench results show latest
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use prompt_bench::cli::{self, Args};
use prompt_bench::config::{env, AppConfig, EnvConfig, ResponderKind};
use prompt_bench::executor::BatchRunner;
use prompt_bench::http::OpenAiCompatibleResponder;
use prompt_bench::models::{BatchRunConfig, TestCase};
use prompt_bench::output::{
    follow_progress, write_report_to_file, BatchReport, OutputFormat, ResultFormatter,
};
use prompt_bench::responder::{EchoResponder, Responder};
use prompt_bench::results::{JsonFileStore, NullStore, SessionStore};
use prompt_bench::rules::validate_rule_sets;
use prompt_bench::utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env_config = EnvConfig::load();

    let quiet = matches!(&args.command, cli::Command::Run(run) if run.quiet);
    let verbose = args.verbose || env_config.verbose.unwrap_or(false);
    init_logger(LogLevel::from_flags(verbose, quiet));

    let config_path = args
        .config
        .clone()
        .or_else(|| env_config.config_file.as_ref().map(Into::into));
    let (mut config, loaded_from) = AppConfig::discover(config_path.as_deref())?;
    if let Some(path) = &loaded_from {
        info!("Loaded configuration from {}", path.display());
    }
    config.apply_env(&env_config);

    match args.command {
        cli::Command::Run(run_args) => {
            run_batch(run_args, config).await?;
        }
        cli::Command::Validate(validate_args) => {
            validate_response(validate_args)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, &config)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &config)?;
        }
    }

    Ok(())
}

fn parse_format(format: Option<&str>) -> Result<OutputFormat> {
    match format {
        None => Ok(OutputFormat::Table),
        Some(name) => OutputFormat::from_str(name)
            .with_context(|| format!("Unknown output format: {name}")),
    }
}

fn build_responder(config: &AppConfig) -> Result<Arc<dyn Responder>> {
    let responder = &config.responder;
    match responder.kind {
        ResponderKind::Echo => Ok(Arc::new(EchoResponder::new())),
        ResponderKind::OpenaiCompatible => {
            let mut client = OpenAiCompatibleResponder::with_timeout(
                responder.provider_id.clone(),
                responder.base_url.clone(),
                responder.timeout_secs,
            )?
            .pricing(responder.pricing);
            match responder.resolve_api_key() {
                Some(key) => client = client.api_key(key),
                None => warn!("No API key configured for {}", responder.base_url),
            }
            Ok(Arc::new(client))
        }
    }
}

async fn run_batch(args: cli::RunArgs, mut config: AppConfig) -> Result<()> {
    if args.echo {
        config.responder.kind = ResponderKind::Echo;
        config.responder.provider_id = "echo".to_string();
    }
    if let Some(url) = &args.base_url {
        config.responder.kind = ResponderKind::OpenaiCompatible;
        config.responder.base_url = url.clone();
        if config.responder.provider_id == "echo" {
            config.responder.provider_id = "openai-compatible".to_string();
        }
    }
    if let Some(model) = &args.model {
        config.responder.model = model.clone();
    }

    let format = parse_format(args.format.as_deref().or(config.format.as_deref()))?;
    let test_case = TestCase::load(&args.test_case)?;
    let defaults = &config.batch;

    let mut batch = BatchRunConfig::new(
        config.responder.provider_id.clone(),
        config.responder.model.clone(),
        test_case,
    )
    .with_runs(args.runs.unwrap_or(defaults.runs))
    .with_retries(args.retries.unwrap_or(defaults.max_retries))
    .with_delay_ms(args.delay_ms.unwrap_or(defaults.delay_ms));
    batch.temperature = args.temperature.or(defaults.temperature);
    batch.max_tokens = args.max_tokens.or(defaults.max_tokens);
    if args.parallel || defaults.parallel {
        batch = batch.parallel(args.concurrency.unwrap_or(defaults.concurrency));
    }

    let store: Arc<dyn SessionStore> = if config.storage.enabled && !args.no_save {
        Arc::new(JsonFileStore::new(config.storage.results_dir()))
    } else {
        Arc::new(NullStore)
    };

    let runner = Arc::new(
        BatchRunner::new(build_responder(&config)?)
            .with_store(store)
            .with_snapshot_every(config.storage.snapshot_every),
    );

    let interrupt = {
        let runner = runner.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing runs already in flight");
                runner.cancel_batch();
            }
        })
    };

    let show_progress = !args.quiet
        && matches!(format, OutputFormat::Table | OutputFormat::Summary);
    let progress = show_progress.then(|| {
        tokio::spawn(follow_progress(runner.subscribe(), |line| eprintln!("{line}")))
    });

    let result = runner.run_batch(batch.clone()).await;
    interrupt.abort();
    if let Some(handle) = progress {
        // A batch that started always publishes a finished state the printer stops on.
        if result.is_ok() {
            let _ = handle.await;
        } else {
            handle.abort();
        }
    }
    let state = result?;

    let report = BatchReport::new(
        &batch.test_case.id,
        &batch.provider_id,
        &batch.model,
        &state,
    );
    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_batch(&report));

    if let Some(path) = &args.output {
        write_report_to_file(path, &report, format)?;
        println!("✓ Report saved to: {}", path.display());
    }

    if state.is_cancelled {
        warn!(
            "Batch cancelled after {}/{} runs",
            state.completed_runs, state.total_runs
        );
    }

    Ok(())
}

fn validate_response(args: cli::ValidateArgs) -> Result<()> {
    let test_case = TestCase::load(&args.test_case)?;
    let response = match (&args.response, &args.response_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file: {}", path.display()))?,
        (None, None) => bail!("Provide --response or --response-file"),
    };

    let outcome = validate_rule_sets(&test_case.rules, &response);
    let formatter = ResultFormatter::new(parse_format(Some(&args.format))?);
    println!("{}", formatter.format_validation(&outcome));

    if !outcome.pass {
        bail!("Response failed validation");
    }
    Ok(())
}

fn show_results(args: cli::ResultsArgs, config: &AppConfig) -> Result<()> {
    let store = JsonFileStore::new(config.storage.results_dir());

    match args.action {
        cli::ResultsAction::List { provider, format } => {
            let sessions = store.list_sessions(provider.as_deref())?;
            let formatter = ResultFormatter::new(parse_format(Some(&format))?);
            println!("{}", formatter.format_sessions(&sessions));
        }

        cli::ResultsAction::Show { id, format, export } => {
            let session = if id == "latest" {
                match store.latest(None)? {
                    Some(session) => session,
                    None => {
                        println!("No saved sessions in {}", store.base_dir().display());
                        return Ok(());
                    }
                }
            } else {
                store.load(&id)?
            };

            let format = parse_format(Some(&format))?;
            let state = session.to_state();
            let report = BatchReport::new(
                &session.test_case_id,
                &session.provider_id,
                &session.model,
                &state,
            );
            println!("Session {} ({})", session.id, session.status);
            println!("{}", ResultFormatter::new(format).format_batch(&report));

            if let Some(path) = &export {
                write_report_to_file(path, &report, format)?;
                println!("✓ Report exported to: {}", path.display());
            }
        }

        cli::ResultsAction::Delete { id } => {
            store.delete(&id)?;
            println!("✓ Deleted session {id}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, config: &AppConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
            } else {
                let output = if format == "json" {
                    serde_json::to_string_pretty(config)?
                } else {
                    serde_yaml::to_string(config)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Init { output, force } => {
            if Path::new(&output).exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            AppConfig::default().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Env => {
            env::print_env_help();
        }
    }

    Ok(())
}
