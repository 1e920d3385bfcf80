//! archforge: provision and tear down a scalable AWS web architecture
//!
//! Reads the architecture from a YAML variables file and runs the create or
//! delete pipeline, either from the interactive menu or as a one-shot
//! command.

use anyhow::{Context, Result};
use archforge_common::defaults::DEFAULT_VARS_PATH;
use archforge_orchestrator::aws::{AwsContext, AwsProvider, caller_identity};
use archforge_orchestrator::config::ArchitectureConfig;
use archforge_orchestrator::error::PipelineError;
use archforge_orchestrator::menu::{MenuActions, MenuInput, run_menu};
use archforge_orchestrator::pipeline::{Direction, LogReporter, RunSummary, Sequencer};
use archforge_orchestrator::report;
use clap::{Parser, Subcommand, ValueEnum};
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "archforge")]
#[command(about = "Provision and tear down a scalable AWS web architecture")]
#[command(version)]
struct Args {
    /// Path to the YAML variables file
    #[arg(long, global = true, env = "ARCHFORGE_VARS", default_value = DEFAULT_VARS_PATH)]
    vars: PathBuf,

    /// AWS region (overrides the variables file)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true)]
    aws_profile: Option<String>,

    /// Readiness waiter timeout in seconds (overrides the variables file)
    #[arg(long, global = true)]
    waiter_timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive menu (the default)
    Menu,

    /// Create the full architecture
    Create,

    /// Delete the full architecture
    Delete,

    /// Show which configured resources exist
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List the stages a pipeline would run, without calling AWS
    Plan {
        /// Pipeline to list
        #[arg(long, value_enum, default_value_t = PlanDirection::Create)]
        direction: PlanDirection,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanDirection {
    Create,
    Delete,
}

impl From<PlanDirection> for Direction {
    fn from(direction: PlanDirection) -> Self {
        match direction {
            PlanDirection::Create => Direction::Create,
            PlanDirection::Delete => Direction::Delete,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    let hint = e
        .downcast_ref::<PipelineError>()
        .and_then(|p| p.source.provider_error())
        .and_then(|p| p.suggestion());
    if let Some(hint) = hint {
        let _ = writeln!(stderr, "  \x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Log filter used when `RUST_LOG` is unset; the AWS SDK crates stay at warnings
const DEFAULT_LOG_FILTER: &str = "info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk=warn";

/// `RUST_LOG` wins outright when it parses; otherwise fall back to the default.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = ArchitectureConfig::load(&args.vars)
        .with_context(|| format!("Failed to load variables file {}", args.vars.display()))?
        .with_region(args.region)
        .context("Invalid --region override")?
        .with_waiter_timeout(args.waiter_timeout)
        .context("Invalid --waiter-timeout override")?;

    let command = args.command.unwrap_or(Command::Menu);
    if let Command::Plan { direction } = command {
        let rows = report::plan(&config, direction.into());
        println!("{}", report::plan_table(&rows));
        return Ok(());
    }

    if let Some(profile) = &args.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }
    let aws = AwsContext::with_profile(&config.region, args.aws_profile.as_deref()).await;
    let caller = caller_identity(&aws).await?;
    info!(account_id = %caller.account, stack = %config.stack_name, "Using AWS account");
    let provider = AwsProvider::from_context(&aws);

    let mut actions = PipelineActions {
        config: &config,
        provider: &provider,
        reporter: LogReporter::new(),
    };

    match command {
        Command::Menu => {
            let mut input = MenuInput::spawn(std::io::BufReader::new(std::io::stdin()));
            run_menu(&mut input, std::io::stdout(), &mut actions)
                .await
                .context("Menu input/output failed")?;
        }
        Command::Create => print_summary(&actions.create().await?),
        Command::Delete => print_summary(&actions.delete().await?),
        Command::Status { format } => {
            let rows = report::collect_status(&config, &provider).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Table => println!("{}", report::status_table(&rows)),
            }
        }
        Command::Plan { .. } => {}
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\n{} finished: {} stages in {}s (run {})",
        summary.direction,
        summary.stages.len(),
        summary.elapsed.as_secs(),
        summary.run_id
    );
}

/// Runs the pipelines against AWS for the menu and one-shot commands
struct PipelineActions<'a> {
    config: &'a ArchitectureConfig,
    provider: &'a AwsProvider,
    reporter: LogReporter,
}

impl MenuActions for PipelineActions<'_> {
    async fn create(&mut self) -> Result<RunSummary, PipelineError> {
        let cancel = CancellationToken::new();
        let sequencer = Sequencer::new(self.config, self.provider, &self.reporter, cancel.clone());
        cancel_on_ctrl_c(cancel, sequencer.create()).await
    }

    async fn delete(&mut self) -> Result<RunSummary, PipelineError> {
        let cancel = CancellationToken::new();
        let sequencer = Sequencer::new(self.config, self.provider, &self.reporter, cancel.clone());
        cancel_on_ctrl_c(cancel, sequencer.delete()).await
    }

    async fn interrupted(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; only the menu's exit option remains
            std::future::pending::<()>().await;
        }
    }
}

/// Drive `run` to completion, cancelling its token on Ctrl-C.
///
/// The pipeline stops at the next stage boundary or waiter poll.
async fn cancel_on_ctrl_c<T>(cancel: CancellationToken, run: impl Future<Output = T>) -> T {
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling the running pipeline");
            cancel.cancel();
        }
    });
    let result = run.await;
    watcher.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_rust_log_replaces_default_filter() {
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter(Some("aws_sdk_ec2=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn test_default_filter_without_rust_log() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
    }
}
