//! CLI entry point for segmerge.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use segmerge_core::{
    HttpClient, HttpFetcher, ManifestFileResolver, ManifestResolver, Pipeline, PipelineReport,
    PlaylistResolver, TitleOutcome,
};
use tracing::{debug, error, info};

mod app_config;
mod cli;

use app_config::{FileConfig, Settings, load_file_config, resolve_settings};
use cli::{Args, InputKind};

/// Exit code when the run finished but something failed along the way.
const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    match run(&args).await {
        Ok(report) => {
            print_summary(&report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_PARTIAL)
            }
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("segmerge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Priority: `RUST_LOG` env var > quiet flag > verbose flag > default (info).
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: &Args) -> Result<PipelineReport> {
    let loaded = load_file_config(args.config.as_deref())?;
    let file_config = match loaded {
        Some((path, config)) => {
            info!(path = %path.display(), "loaded config file");
            config
        }
        None => FileConfig::default(),
    };
    let settings = resolve_settings(args, &file_config);
    debug!(?settings, "settings resolved");

    let pipeline = build_pipeline(args, settings);
    let pipeline = if !args.quiet && io::stderr().is_terminal() {
        pipeline.with_progress(progress_bar())
    } else {
        pipeline
    };

    info!(inputs = args.inputs.len(), "segmerge starting");
    let report = pipeline
        .run(&args.inputs)
        .await
        .context("pipeline failed")?;
    Ok(report)
}

fn build_pipeline(args: &Args, settings: Settings) -> Pipeline {
    let client = HttpClient::new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    );

    let resolver: Box<dyn ManifestResolver> = match args.input_kind {
        InputKind::Manifest => Box::new(ManifestFileResolver::new()),
        InputKind::Playlist => {
            let resolver = PlaylistResolver::new(client.clone());
            match &args.title {
                Some(title) => Box::new(resolver.with_title(title)),
                None => Box::new(resolver),
            }
        }
    };

    let fetcher = HttpFetcher::new(client, settings.options.media, settings.fetch_policy);
    Pipeline::new(resolver, Arc::new(fetcher), settings.options)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} segments ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn print_summary(report: &PipelineReport) {
    for failure in &report.resolve_failures {
        println!("unresolved  {}: {}", failure.input, failure.error);
    }

    for title in &report.titles {
        let line = match &title.outcome {
            TitleOutcome::Merged(artifact) if artifact.is_partial() => format!(
                "partial     {} -> {} (missing {:?})",
                title.title,
                artifact.path.display(),
                artifact.missing
            ),
            TitleOutcome::Merged(artifact) => {
                format!("merged      {} -> {}", title.title, artifact.path.display())
            }
            TitleOutcome::Empty => format!("empty       {}", title.title),
            TitleOutcome::SkippedIncomplete { missing } => {
                format!("incomplete  {} (missing {missing:?})", title.title)
            }
            TitleOutcome::MergeFailed { error } => format!("failed      {}: {error}", title.title),
        };
        println!("{line}");

        for failed in &title.failed {
            println!(
                "  segment {} failed after {} attempts: {}",
                failed.entry.index, failed.attempts, failed.last_error
            );
        }
    }

    println!(
        "{} title(s), {} failed segment(s), {} round(s), {} attempt(s)",
        report.titles.len(),
        report.failed_segments(),
        report.rounds,
        report.attempts
    );
}
