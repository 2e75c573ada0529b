//! Subcommand implementations.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use deepcheck_client::api::{DetectorApi, ExportFormat, JobQuery};
use deepcheck_client::config::ClientConfig;
use deepcheck_client::events::WorkflowEvent;
use deepcheck_client::upload::{ProgressFn, UploadSource};
use deepcheck_client::workflow::{Workflow, WorkflowState};
use deepcheck_core::format::format_file_size;
use deepcheck_core::types::JobId;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::output::{self, EventPrinter};
use crate::{AnalyzeArgs, BulkArgs};

fn status_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

pub async fn health(config: &ClientConfig) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let health = api
        .health()
        .await
        .with_context(|| format!("Backend at {} is unreachable", api.api_url()))?;
    println!("{}", output::health(&health));
    Ok(status_code(health.is_healthy()))
}

pub async fn models(config: &ClientConfig) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let status = api.model_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn analyze(config: &ClientConfig, args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let workflow = Workflow::from_config(config)?;
    let mut state = WorkflowState::new();

    // Unreadable paths cannot become records; report them and go on.
    let mut unreadable = 0;
    for path in &args.files {
        match UploadSource::from_path(path).await {
            Ok(source) => {
                state.enqueue(source);
            }
            Err(e) => {
                unreadable += 1;
                tracing::error!(path = %path.display(), error = %e, "Cannot read file");
            }
        }
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let printer = tokio::spawn(print_events(workflow.subscribe(), args.json));
    let summary = workflow.run(&mut state, &cancel).await;

    // Dropping the workflow closes the event channel and ends the printer.
    drop(workflow);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer stopped unexpectedly");
    }

    if let Some(path) = &args.report {
        write_file(path, state.results().to_csv().as_bytes()).await?;
    }
    if !args.json {
        println!(
            "{}",
            output::batch_summary(&summary, &state.results().summary())
        );
    }

    Ok(status_code(
        summary.failed == 0 && !summary.cancelled && unreadable == 0,
    ))
}

pub async fn bulk(config: &ClientConfig, args: BulkArgs) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let source = UploadSource::from_path(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        sources.push(source);
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let on_progress: ProgressFn =
        Arc::new(|pct: u8| tracing::debug!(percent = pct, "Bulk upload progress"));
    let bulk = api.bulk_upload(&sources, on_progress, &cancel).await?;
    if let Some(message) = &bulk.message {
        println!("{message}");
    }

    let mut failed = 0;
    for job_id in &bulk.job_ids {
        if args.no_analyze {
            println!("{job_id}  pending");
            continue;
        }
        match api.start_analysis(job_id).await {
            Ok(_) => println!("{job_id}  analysis started"),
            Err(e) => {
                failed += 1;
                println!("{job_id}  failed to start: {e}");
            }
        }
    }

    let skipped = sources.len() - bulk.job_ids.len().min(sources.len());
    if skipped > 0 {
        println!("{skipped} file(s) skipped by the backend");
    }
    Ok(status_code(failed == 0 && skipped == 0))
}

pub async fn jobs(config: &ClientConfig, query: &JobQuery) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let list = api.list_jobs_with(query).await?;
    println!("{}", output::job_table(&list.jobs));
    println!("{}", output::page_footer(&list));
    Ok(ExitCode::SUCCESS)
}

pub async fn job(config: &ClientConfig, id: &str) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let job_id = JobId::new(id)?;
    let job = api
        .get_job(&job_id)
        .await
        .with_context(|| format!("Failed to fetch job {job_id}"))?;
    println!("{}", output::job_detail(&job));
    Ok(ExitCode::SUCCESS)
}

pub async fn stats(config: &ClientConfig) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let stats = api.statistics().await?;
    println!("{}", output::statistics(&stats));
    Ok(ExitCode::SUCCESS)
}

pub async fn export(
    config: &ClientConfig,
    format: ExportFormat,
    path: &Path,
) -> anyhow::Result<ExitCode> {
    let api = DetectorApi::from_config(config)?;
    let bytes = api
        .export(format)
        .await
        .with_context(|| format!("Failed to download {} export", format.as_str()))?;
    write_file(path, &bytes).await?;
    println!(
        "Saved {} export ({}) to {}",
        format.as_str(),
        format_file_size(bytes.len() as u64),
        path.display()
    );
    Ok(ExitCode::SUCCESS)
}

// ---- helpers ----

async fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "File written");
    Ok(())
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, cancelling batch");
                cancel.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install Ctrl-C handler"),
        }
    });
}

async fn print_events(mut rx: broadcast::Receiver<WorkflowEvent>, json: bool) {
    let mut printer = EventPrinter::new();
    loop {
        match rx.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            },
            Ok(event) => {
                if let Some(line) = printer.line(&event) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
