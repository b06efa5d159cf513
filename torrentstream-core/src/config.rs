//! Centralized configuration for torrentstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use rand::{Rng, rng};

use crate::TorrentStreamError;
use crate::engine::StorageMode;

/// Default trackers injected into every magnet link.
pub const DEFAULT_TRACKERS: &[&str] = &[
    "udp://tracker.openbittorrent.com:80/announce",
    "udp://tracker.publicbt.com:80/announce",
];

/// Default DHT bootstrap routers.
pub const DEFAULT_DHT_ROUTERS: &[(&str, u16)] = &[
    ("router.utorrent.com", 6881),
    ("router.bittorrent.com", 6881),
    ("dht.transmissionbt.com", 6881),
    ("router.bitcomet.com", 6881),
    ("dht.aelitis.com", 6881),
];

/// Default session extensions.
pub const DEFAULT_EXTENSIONS: &[&str] = &["ut_pex", "ut_metadata", "smart_ban"];

/// Central configuration for all torrentstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub engine: EngineConfig,
    pub playback: PlaybackConfig,
    pub player: PlayerConfig,
    pub server: ServerConfig,
    pub simulation: SimulationConfig,
}

/// Session-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Listen port range (first, last)
    pub listen_ports: (u16, u16),
    pub extensions: Vec<String>,
    pub dht_routers: Vec<(String, u16)>,
    /// Trackers appended to every ingested magnet link
    pub trackers: Vec<String>,
    pub storage_mode: StorageMode,
    /// Parent directory for downloads (None = per-run temporary directory)
    pub download_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut rng = rng();
        let first: u16 = rng.random_range(1024..=2000);
        let second: u16 = rng.random_range(1024..=2000);

        Self {
            listen_ports: (first.min(second), first.max(second)),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            dht_routers: DEFAULT_DHT_ROUTERS
                .iter()
                .map(|(host, port)| (host.to_string(), *port))
                .collect(),
            trackers: DEFAULT_TRACKERS.iter().map(|s| s.to_string()).collect(),
            storage_mode: StorageMode::Sparse,
            download_root: None,
        }
    }
}

/// Time budgets and thresholds of the playback state machine.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Bound on waiting for torrent metadata
    pub metadata_timeout: Duration,
    /// Bound on waiting for the selected file to reach the threshold
    pub cache_fill_timeout: Duration,
    /// Minimum percentage of the selected file present before playback
    pub cache_fill_threshold_percent: f64,
    /// Interval between engine predicate polls
    pub poll_interval: Duration,
    /// Interval between alert drains and progress reports
    pub monitor_interval: Duration,
    /// Path substrings that disqualify a file from playback (case-insensitive)
    pub ignore_patterns: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(10 * 60),
            cache_fill_timeout: Duration::from_secs(5 * 60),
            cache_fill_threshold_percent: 5.0,
            poll_interval: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(1),
            ignore_patterns: vec!["sample".to_string()],
        }
    }
}

impl PlaybackConfig {
    /// Checks that every budget is usable.
    ///
    /// # Errors
    /// - `TorrentStreamError::Configuration` - Zero interval or threshold outside (0, 100]
    pub fn validate(&self) -> Result<(), TorrentStreamError> {
        if self.poll_interval.is_zero() || self.monitor_interval.is_zero() {
            return Err(TorrentStreamError::Configuration {
                reason: "poll and monitor intervals must be non-zero".to_string(),
            });
        }

        let threshold = self.cache_fill_threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(TorrentStreamError::Configuration {
                reason: format!("cache fill threshold {threshold}% is outside (0, 100]"),
            });
        }

        Ok(())
    }
}

/// External player used by the player stream function.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "xdg-open".to_string(),
            args: Vec::new(),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route prefix under which downloaded files are served
    pub streams_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            streams_prefix: "/streams".to_string(),
        }
    }
}

impl ServerConfig {
    /// Base URL clients use to reach the server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Simulated swarm configuration for development and testing.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub tick: Duration,
    /// Ticks until metadata arrives (None = never)
    pub metadata_after_ticks: Option<u32>,
    pub bytes_per_tick: u64,
    pub peers: u32,
    pub seeds: u32,
    pub preseeded: bool,
    pub materialize: bool,
    pub synthesized_size: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            metadata_after_ticks: Some(3),
            bytes_per_tick: 4 * 1024 * 1024, // 4 MiB/s
            peers: 12,
            seeds: 4,
            preseeded: false,
            materialize: true,
            synthesized_size: 700 * 1024 * 1024, // 700 MiB
        }
    }
}

impl StreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_parse::<u64>("TORRENTSTREAM_METADATA_TIMEOUT") {
            config.playback.metadata_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_parse::<u64>("TORRENTSTREAM_CACHE_FILL_TIMEOUT") {
            config.playback.cache_fill_timeout = Duration::from_secs(seconds);
        }

        if let Some(percent) = env_parse::<f64>("TORRENTSTREAM_CACHE_THRESHOLD") {
            config.playback.cache_fill_threshold_percent = percent;
        }

        if let Some(millis) = env_parse::<u64>("TORRENTSTREAM_POLL_INTERVAL_MS") {
            config.playback.poll_interval = Duration::from_millis(millis);
        }

        if let Ok(root) = std::env::var("TORRENTSTREAM_DOWNLOAD_ROOT") {
            config.engine.download_root = Some(PathBuf::from(root));
        }

        if let Some(mode) = env_parse::<StorageMode>("TORRENTSTREAM_STORAGE_MODE") {
            config.engine.storage_mode = mode;
        }

        if let Ok(player) = std::env::var("TORRENTSTREAM_PLAYER").or_else(|_| std::env::var("PLAYER")) {
            config.player.command = player;
        }

        if let Some(port) = env_parse::<u16>("TORRENTSTREAM_SERVER_PORT") {
            config.server.port = port;
        }

        if let Some(rate) = env_parse::<u64>("TORRENTSTREAM_SIMULATED_RATE") {
            config.simulation.bytes_per_tick = rate;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Intervals are shortened and nothing is written to disk by the
    /// simulated swarm.
    pub fn for_testing() -> Self {
        Self {
            playback: PlaybackConfig {
                metadata_timeout: Duration::from_secs(2),
                cache_fill_timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(50),
                monitor_interval: Duration::from_millis(10),
                ..PlaybackConfig::default()
            },
            simulation: SimulationConfig {
                tick: Duration::from_millis(10),
                metadata_after_ticks: Some(1),
                bytes_per_tick: 64 * 1024,
                materialize: false,
                synthesized_size: 1024 * 1024,
                ..SimulationConfig::default()
            },
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = StreamConfig::default();

        assert_eq!(config.playback.metadata_timeout, Duration::from_secs(600));
        assert_eq!(config.playback.cache_fill_timeout, Duration::from_secs(300));
        assert_eq!(config.playback.cache_fill_threshold_percent, 5.0);
        assert_eq!(config.playback.poll_interval, Duration::from_secs(5));
        assert_eq!(config.playback.monitor_interval, Duration::from_secs(1));
        assert_eq!(config.playback.ignore_patterns, vec!["sample"]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.trackers.len(), 2);
    }

    #[test]
    fn test_listen_ports_within_range_and_ordered() {
        for _ in 0..20 {
            let (low, high) = EngineConfig::default().listen_ports;
            assert!((1024..=2000).contains(&low));
            assert!((1024..=2000).contains(&high));
            assert!(low <= high);
        }
    }

    #[test]
    fn test_validate_rejects_bad_threshold_and_intervals() {
        let mut playback = PlaybackConfig::default();
        assert!(playback.validate().is_ok());

        playback.cache_fill_threshold_percent = 0.0;
        assert!(playback.validate().is_err());

        playback.cache_fill_threshold_percent = 100.0;
        assert!(playback.validate().is_ok());

        playback.poll_interval = Duration::ZERO;
        assert!(matches!(
            playback.validate(),
            Err(TorrentStreamError::Configuration { .. })
        ));
    }

    #[test]
    fn test_testing_preset_is_fast() {
        let config = StreamConfig::for_testing();
        assert!(config.playback.poll_interval < Duration::from_secs(1));
        assert!(!config.simulation.materialize);
        assert!(config.playback.validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("TORRENTSTREAM_METADATA_TIMEOUT", "60");
            std::env::set_var("TORRENTSTREAM_CACHE_THRESHOLD", "2.5");
            std::env::set_var("TORRENTSTREAM_STORAGE_MODE", "allocate");
            std::env::set_var("TORRENTSTREAM_PLAYER", "mpv");
        }

        let config = StreamConfig::from_env();

        assert_eq!(config.playback.metadata_timeout, Duration::from_secs(60));
        assert_eq!(config.playback.cache_fill_threshold_percent, 2.5);
        assert_eq!(config.engine.storage_mode, StorageMode::Allocate);
        assert_eq!(config.player.command, "mpv");

        // Cleanup
        unsafe {
            std::env::remove_var("TORRENTSTREAM_METADATA_TIMEOUT");
            std::env::remove_var("TORRENTSTREAM_CACHE_THRESHOLD");
            std::env::remove_var("TORRENTSTREAM_STORAGE_MODE");
            std::env::remove_var("TORRENTSTREAM_PLAYER");
        }
    }
}
