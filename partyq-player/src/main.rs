//! partyq - shared party music queue
//!
//! Starts the request pipeline and playback loop, optionally installs a party
//! playlist and queues tracks given on the command line, then plays until
//! interrupted. Party events are logged as they happen.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use partyq_common::{PartyEvent, User};
use partyq_player::config::BackendKind;
use partyq_player::{playback, reference, resolver, Party, PlayerConfig};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for partyq
#[derive(Parser, Debug)]
#[command(name = "partyq")]
#[command(about = "Shared music queue for a party")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PARTYQ_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for downloaded audio
    #[arg(long, env = "PARTYQ_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Number of resolution workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Party playlist to draw from while the queue is empty
    #[arg(short, long)]
    playlist: Option<String>,

    /// Host name credited for playlist suggestions
    #[arg(long, default_value = "host")]
    host: String,

    /// Track references to queue at startup
    #[arg(short, long)]
    enqueue: Vec<String>,

    /// Don't stream anything, only simulate track lengths
    #[arg(long)]
    dry_run: bool,
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let path = partyq_common::config::resolve_config_file(args.config.as_deref(), "PARTYQ_CONFIG")
        .context("Failed to locate config file")?;

    let mut config = match &path {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(workers) = args.workers {
        config.worker_count = Some(workers);
    }
    if args.dry_run {
        config.backend.kind = BackendKind::Clock;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize tracing
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("partyq_player={},partyq_common={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting partyq {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Cache directory: {}", config.cache_dir.display());
    info!("Resolution workers: {}", config.effective_worker_count());

    let (media_resolver, enumerator) = resolver::from_config(&config);
    let backend =
        playback::backend::from_config(&config.backend).context("Failed to create stream backend")?;

    let party = Arc::new(
        Party::new(&config, media_resolver, enumerator).context("Failed to create party")?,
    );

    let logger = tokio::spawn(log_events(party.subscribe()));

    party.start(backend).context("Failed to start playback")?;

    if let Some(playlist) = &args.playlist {
        let playlist = reference::check_playlist_reference(playlist)?.to_string();
        let host = args.host.clone();
        let party = Arc::clone(&party);
        match tokio::task::spawn_blocking(move || party.start_party(&playlist, &host)).await? {
            Ok(installed) => info!(
                "Party started by {} with {} playlist tracks",
                installed.host,
                installed.references.len()
            ),
            Err(e) => error!("Could not start the party: {}", e),
        }
    }

    let requester = User::named("cli");
    for raw in &args.enqueue {
        let track_ref = match reference::check_track_reference(raw) {
            Ok(r) => r.to_string(),
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        let party = Arc::clone(&party);
        let requester = requester.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = party.add_track(&track_ref, &requester) {
                warn!("{} not added: {}", track_ref, e);
            }
        });
    }

    shutdown_signal().await;

    let stopping = Arc::clone(&party);
    let history = tokio::task::spawn_blocking(move || {
        let history = stopping.stop_party();
        stopping.shutdown();
        history
    })
    .await?;

    info!("Thanks for the party! Here's the song history:");
    for (idx, track) in history.iter().enumerate() {
        info!("  {}. {}", idx + 1, track);
    }

    drop(party);
    logger.abort();

    info!("partyq shutdown complete");
    Ok(())
}

/// Log every party event until the bus closes
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<PartyEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                PartyEvent::TrackEnqueued { track, position, .. } => {
                    info!("Queued #{}: {}", position, track)
                }
                PartyEvent::ResolutionFailed {
                    source_reference,
                    reason,
                    ..
                } => warn!("Could not resolve {}: {}", source_reference, reason),
                PartyEvent::TrackStarted { track, .. } => info!("Playing: {}", track),
                PartyEvent::SkipVote {
                    voter,
                    votes,
                    threshold,
                    ..
                } => info!("Skip vote by {} ({}/{})", voter, votes, threshold),
                other => info!("Party event: {}", other.event_type()),
            },
            Err(RecvError::Lagged(missed)) => warn!("Event log lagged, {} events missed", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping the party");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping the party");
        },
    }
}
