//! `deepcheck` -- command-line client for the deepfake detection backend.
//!
//! Uploads media files one at a time, triggers their analysis, polls
//! until each job finishes and prints the verdicts. Ctrl-C cancels the
//! running batch. `bulk` sends many files in one request instead and
//! leaves polling to `jobs`.
//!
//! # Environment variables
//!
//! | Variable               | Default                 | Description                      |
//! |------------------------|-------------------------|----------------------------------|
//! | `DEEPCHECK_API_URL`    | `http://localhost:5000` | Backend base URL                 |
//! | `REQUEST_TIMEOUT_SECS` | `30`                    | Per-request HTTP timeout         |
//! | `POLL_INTERVAL_MS`     | `1000`                  | Delay between status polls       |
//! | `POLL_TIMEOUT_SECS`    | unset                   | Give up on a job after this long |
//!
//! Command-line flags take precedence over the environment.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use deepcheck_client::api::{ExportFormat, JobQuery};
use deepcheck_client::config::ClientConfig;
use deepcheck_core::job::StatusKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "deepcheck", version, about = "Deepfake detection client")]
struct Cli {
    /// Backend base URL, e.g. `http://host:5000`.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the backend is reachable and healthy.
    Health,
    /// Print the backend's model status.
    Models,
    /// Upload and analyse files, one after another.
    Analyze(AnalyzeArgs),
    /// Upload files in a single request and start their analysis.
    Bulk(BulkArgs),
    /// List jobs known to the backend, newest first.
    Jobs {
        /// Page size (at most 100).
        #[arg(long)]
        limit: Option<u32>,
        /// Number of jobs to skip.
        #[arg(long)]
        offset: Option<u32>,
        /// Only show jobs in this status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Show a single job.
    Job { id: String },
    /// Show aggregate statistics.
    Stats,
    /// Download the backend's export of every result.
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Media files to analyse.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write a CSV report of the completed analyses.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Delay between status polls in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up on a job after this many seconds.
    #[arg(long)]
    max_wait_secs: Option<u64>,

    /// Print workflow events as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct BulkArgs {
    /// Media files to upload.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Only upload; leave the jobs pending.
    #[arg(long)]
    no_analyze: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<StatusArg> for StatusKind {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => Self::Pending,
            StatusArg::Processing => Self::Processing,
            StatusArg::Completed => Self::Completed,
            StatusArg::Failed => Self::Failed,
        }
    }
}

fn job_query(limit: Option<u32>, offset: Option<u32>, status: Option<StatusArg>) -> JobQuery {
    let mut query = JobQuery::new();
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = offset {
        query = query.with_offset(offset);
    }
    if let Some(status) = status {
        query = query.with_status(status.into());
    }
    query
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => Self::Csv,
            FormatArg::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepcheck=info,deepcheck_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }

    tracing::debug!(api_url = %config.api_url, "Using backend");

    match cli.command {
        Command::Health => commands::health(&config).await,
        Command::Models => commands::models(&config).await,
        Command::Analyze(args) => {
            if let Some(interval) = args.poll_interval_ms {
                config.poll_interval_ms = interval;
            }
            if let Some(max_wait) = args.max_wait_secs {
                config.poll_timeout_secs = Some(max_wait);
            }
            commands::analyze(&config, args).await
        }
        Command::Bulk(args) => commands::bulk(&config, args).await,
        Command::Jobs {
            limit,
            offset,
            status,
        } => commands::jobs(&config, &job_query(limit, offset, status)).await,
        Command::Job { id } => commands::job(&config, &id).await,
        Command::Stats => commands::stats(&config).await,
        Command::Export { format, output } => {
            commands::export(&config, format.into(), &output).await
        }
    }
}
