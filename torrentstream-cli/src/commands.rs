//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Subcommand, ValueEnum};
use torrentstream_core::config::StreamConfig;
use torrentstream_core::engine::{SimulatedEngine, StorageMode, SwarmProfile};
use torrentstream_core::{
    FirstFile, FirstMedia, LargestMedia, MagnetLink, PlaybackOrchestrator, PlayerLauncher,
    StreamController, StreamError, StreamRequest, TorrentStreamError,
};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Play a magnet link in an external player while it downloads
    Play {
        /// Magnet link
        magnet: String,
        /// Player command (defaults to $TORRENTSTREAM_PLAYER, $PLAYER or xdg-open)
        #[arg(long)]
        player: Option<String>,
        /// Download directory (defaults to a temporary directory)
        #[arg(long)]
        save_path: Option<PathBuf>,
        /// Keep downloaded content after playback
        #[arg(long)]
        keep: bool,
        /// Percentage of the file required before playback starts
        #[arg(long)]
        threshold: Option<f64>,
        /// Disk allocation for downloaded content (sparse, allocate)
        #[arg(long)]
        storage_mode: Option<StorageMode>,
        /// How the file to play is chosen
        #[arg(long, value_enum, default_value = "largest")]
        selector: SelectorKind,
    },
    /// Serve streams over HTTP
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Directory downloads are written to and served from
        #[arg(long)]
        download_root: Option<PathBuf>,
        /// Also open every stream in the configured player
        #[arg(long)]
        open: bool,
    },
}

/// File selection strategies offered on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SelectorKind {
    /// Largest media file not matching an ignore pattern
    Largest,
    /// First media file not matching an ignore pattern
    FirstMedia,
    /// First file of the torrent
    FirstFile,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Play {
            magnet,
            player,
            save_path,
            keep,
            threshold,
            storage_mode,
            selector,
        } => {
            let options = PlayOptions {
                player,
                save_path,
                keep,
                threshold,
                storage_mode,
                selector,
            };
            play(magnet, options).await
        }
        Commands::Serve {
            host,
            port,
            download_root,
            open,
        } => serve(host, port, download_root, open).await,
    }
}

/// Overrides for a single `play` run
pub struct PlayOptions {
    pub player: Option<String>,
    pub save_path: Option<PathBuf>,
    pub keep: bool,
    pub threshold: Option<f64>,
    pub storage_mode: Option<StorageMode>,
    pub selector: SelectorKind,
}

/// Plays one magnet link until the player exits and the download completes
///
/// # Errors
/// - `EngineError::InvalidMagnetLink` - Magnet link could not be parsed
/// - `TorrentStreamError::Configuration` - Invalid threshold
/// - Any terminal `StreamError` of the run
pub async fn play(magnet: String, options: PlayOptions) -> Result<()> {
    let mut config = StreamConfig::from_env();
    if let Some(player) = options.player {
        config.player.command = player;
    }
    if let Some(threshold) = options.threshold {
        config.playback.cache_fill_threshold_percent = threshold;
    }

    let magnet = MagnetLink::parse(&magnet)?;
    println!("Streaming {}", magnet.display_name().unwrap_or("magnet link"));

    let engine = Arc::new(SimulatedEngine::new(
        config.engine.clone(),
        SwarmProfile::from(&config.simulation),
    ));
    let orchestrator = PlaybackOrchestrator::new(engine, config.playback.clone())?;

    let launcher = PlayerLauncher::from_config(&config.player);
    println!("Player: {}", launcher.command());
    let ignore = config.playback.ignore_patterns.clone();
    let mut request = match options.selector {
        SelectorKind::Largest => StreamRequest::new(magnet, LargestMedia::new(ignore), launcher),
        SelectorKind::FirstMedia => StreamRequest::new(magnet, FirstMedia::new(ignore), launcher),
        SelectorKind::FirstFile => StreamRequest::new(magnet, FirstFile, launcher),
    }
    .remove_after(!options.keep);
    if let Some(save_path) = options.save_path {
        request = request.with_save_path(save_path);
    }
    if let Some(storage_mode) = options.storage_mode {
        request = request.with_storage_mode(storage_mode);
    }

    let active = orchestrator.start(request).await?;
    let controller = active.controller().clone();
    println!("Download directory: {}", controller.save_path().display());
    let reporter = tokio::spawn(report_progress(controller.clone()));

    let result = tokio::select! {
        result = active.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, cancelling stream");
            controller.cancel().await?;
            Err(StreamError::Cancelled)
        }
    };
    reporter.abort();

    match result {
        Ok(outcome) => {
            println!(
                "Finished {} in {:.0}s",
                outcome.file.path(),
                outcome.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(StreamError::Cancelled) => Ok(()),
        Err(error) => {
            if let Err(e) = controller.release().await {
                tracing::warn!("Failed to release {}: {}", controller.info_hash(), e);
            }
            Err(anyhow!(TorrentStreamError::from(error).user_message()))
        }
    }
}

/// Prints one line per monitor report
async fn report_progress(controller: StreamController) {
    let mut progress = controller.subscribe_progress();

    while progress.changed().await.is_ok() {
        let Some(report) = progress.borrow_and_update().clone() else {
            continue;
        };

        match (report.file_path, report.file_percent) {
            (Some(path), Some(percent)) => println!(
                "{:>7.2}%  {:>11}  {:>3} peers  {}  {}",
                percent,
                format_rate(report.status.download_rate),
                report.status.num_peers,
                controller.state(),
                path
            ),
            _ => println!(
                "{}  {}  {}  {}",
                report.status.progress_formatted(),
                controller.state(),
                report.status.state,
                report.status.name
            ),
        }
    }
}

fn format_rate(bytes_per_second: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let rate = bytes_per_second as f64;
    if rate >= MIB {
        format!("{:.1} MiB/s", rate / MIB)
    } else {
        format!("{:.1} KiB/s", rate / 1024.0)
    }
}

/// Start the HTTP server
///
/// # Errors
/// - Server could not bind or failed while running
pub async fn serve(
    host: String,
    port: u16,
    download_root: Option<PathBuf>,
    open: bool,
) -> Result<()> {
    let mut config = StreamConfig::from_env();
    config.server.host = host;
    config.server.port = port;

    let download_root = download_root
        .or_else(|| config.engine.download_root.clone())
        .unwrap_or_else(|| std::env::temp_dir().join("torrentstream"));

    println!(
        "torrentstream serving on {} (downloads in {})",
        config.server.base_url(),
        download_root.display()
    );

    torrentstream_web::run_server(config, download_root, open)
        .await
        .map_err(|e| anyhow!("Server error: {e}"))
}
