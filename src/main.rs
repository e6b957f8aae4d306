//! CLI entry point for the tomefetch tool.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tomefetch_core::cache::DiskPageCache;
use tomefetch_core::source::{ManifestSource, RemoteSource};
use tomefetch_core::{
    Collaborators, DownloadJob, DownloadJobState, DownloadManager, DownloadSettings, HttpClient,
};
use tracing::{debug, error, info};

mod cli;
mod progress;

use cli::Args;

/// Exit code for a cancelled download (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Job id used for the single job a CLI run starts.
const CLI_JOB_ID: u32 = 1;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_settings = match &args.config {
        Some(path) => DownloadSettings::load_from(path)?,
        None => DownloadSettings::load_default()?,
    };
    let settings = args.apply_to(file_settings);
    let output_dir = settings
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let client =
        HttpClient::new_with_timeouts(settings.connect_timeout_secs, settings.read_timeout_secs);
    let source = Arc::new(ManifestSource::with_client(client.inner().clone()));

    let item = source
        .get_details(&ManifestSource::item_for(&args.manifest_url))
        .await
        .with_context(|| format!("cannot load manifest {}", args.manifest_url))?;
    info!(item_id = item.id, title = %item.title, "manifest loaded");

    let mut collaborators = Collaborators::new(&output_dir)
        .with_client(client)
        .with_source(source);
    if let Some(dir) = &settings.cache_dir {
        collaborators = collaborators.with_cache(Arc::new(DiskPageCache::new(dir)));
    }

    let manager = DownloadManager::new(settings, collaborators)?;
    let job = manager.start(item, args.chapters.clone(), CLI_JOB_ID);

    let ui = progress::spawn_progress_ui(&job, !args.quiet);
    spawn_cancel_on_ctrl_c(job.clone());
    spawn_resume_on_enter(job.clone());

    let terminal = job.wait().await;
    if let Err(error) = ui.await {
        debug!(error = %error, "progress ui task ended abnormally");
    }

    Ok(report(&terminal))
}

/// Cancels the job on the first Ctrl-C.
fn spawn_cancel_on_ctrl_c(job: DownloadJob) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            job.cancel();
        }
    });
}

/// Resumes a paused job whenever a line is read from stdin.
///
/// Runs on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_resume_on_enter(job: DownloadJob) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() || job.is_finished() {
                break;
            }
            if job.is_paused() {
                info!("resuming download");
                job.resume();
            }
        }
    });
}

fn report(terminal: &DownloadJobState) -> ExitCode {
    match terminal {
        DownloadJobState::Done { result, .. } => {
            println!("{}", result.path.display());
            ExitCode::SUCCESS
        }
        DownloadJobState::Cancelled { .. } => {
            info!("download cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        DownloadJobState::Error { error, .. } => {
            error!(error = %error, "download failed");
            ExitCode::FAILURE
        }
        other => {
            error!(state = other.name(), "job ended without a terminal state");
            ExitCode::FAILURE
        }
    }
}
