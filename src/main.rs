//! CLI entry point for media-archiver.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use media_archiver::config::resolve_settings_path;
use media_archiver::download::DownloadCoordinator;
use media_archiver::message::Message;
use media_archiver::pipeline::{MessagePipeline, Trigger};
use media_archiver::platform::OfflinePlatform;
use media_archiver::resolver::ResolverRegistry;
use media_archiver::store::SqliteDownloadStore;
use media_archiver::{Database, Settings, setup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
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

    debug!(?args, "CLI arguments parsed");

    let settings_path = resolve_settings_path(args.settings.as_deref());
    match args.command {
        Command::Init { force } => run_init(&settings_path, force),
        Command::Process { file, history } => {
            let trigger = if history {
                Trigger::History
            } else {
                Trigger::Live
            };
            run_process(&settings_path, file.as_deref(), trigger, args.quiet).await
        }
        Command::Stats { channel, limit } => {
            run_stats(&settings_path, channel.as_deref(), limit).await
        }
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        return Settings::load(path);
    }
    info!(path = %path.display(), "no settings file found, using defaults");
    Ok(Settings::default())
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Settings file {} already exists. Pass --force to overwrite it",
            path.display()
        );
    }

    let settings = setup::run(io::stdin().lock(), io::stdout().lock())
        .context("Setup did not complete")?;
    settings.save(path)?;
    info!(path = %path.display(), "created settings file");
    Ok(())
}

fn parse_messages(input: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(line = index + 1, error = %e, "skipping unparseable message"),
        }
    }
    messages
}

async fn run_process(
    settings_path: &Path,
    file: Option<&Path>,
    trigger: Trigger,
    quiet: bool,
) -> Result<()> {
    let input = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None if !io::stdin().is_terminal() => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        None => {
            info!("No input provided. Pipe JSON-lines messages via stdin or pass a file.");
            return Ok(());
        }
    };

    let messages = parse_messages(&input);
    if messages.is_empty() {
        info!("No messages found in input");
        return Ok(());
    }

    let settings = Arc::new(load_settings(settings_path)?);
    let db = Database::new(&settings.database_path)
        .await
        .with_context(|| format!("Failed to open {}", settings.database_path.display()))?;
    let store = Arc::new(SqliteDownloadStore::new(db));

    let cancel = CancellationToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            cancel_signal.cancel();
        }
    });

    let coordinator = DownloadCoordinator::from_settings(
        &settings,
        store,
        Arc::new(OfflinePlatform::new()),
    )
    .with_cancellation(cancel.clone());
    let pipeline = Arc::new(MessagePipeline::new(
        Arc::clone(&settings),
        Arc::new(ResolverRegistry::new()),
        Arc::new(coordinator),
    ));

    let progress = progress_bar(messages.len(), quiet);
    let mut handles = Vec::with_capacity(messages.len());
    for message in messages {
        let pipeline = Arc::clone(&pipeline);
        let progress = progress.clone();
        handles.push(tokio::spawn(async move {
            pipeline.process(Arc::new(message), trigger).await;
            progress.inc(1);
        }));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "message task panicked");
        }
    }
    progress.finish_and_clear();

    let stats = pipeline.stats();
    info!(
        downloaded = stats.downloaded(),
        skipped = stats.skipped(),
        failed = stats.failed(),
        ignored = stats.ignored(),
        cancelled = cancel.is_cancelled(),
        "Processing complete"
    );
    Ok(())
}

fn progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} messages")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

async fn run_stats(settings_path: &Path, channel: Option<&str>, limit: i64) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let database_path: PathBuf = settings.database_path;
    let store = SqliteDownloadStore::new(
        Database::new(&database_path)
            .await
            .with_context(|| format!("Failed to open {}", database_path.display()))?,
    );

    let count = store.count_downloads(channel).await?;
    match channel {
        Some(channel) => {
            println!("{count} downloads archived for channel {channel}");
            for record in store.downloads_for_channel(channel, limit).await? {
                println!(
                    "{}  {}  {}",
                    record.time.format("%Y-%m-%d %H:%M:%S"),
                    record.destination,
                    record.url
                );
            }
        }
        None => println!("{count} downloads archived"),
    }
    Ok(())
}
