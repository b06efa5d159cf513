//! Magnet link parsing and tracker injection

use std::fmt;
use std::str::FromStr;

use super::EngineError;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary, taken from the `xt=urn:btih:`
/// parameter of a magnet link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Short prefix used in synthesized names and log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(EngineError::InvalidMagnetLink {
                reason: format!("invalid info hash length: {} (expected 40)", s.len()),
            });
        }

        let bytes = hex::decode(s).map_err(|e| EngineError::InvalidMagnetLink {
            reason: format!("invalid hex in info hash {s}: {e}"),
        })?;

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

/// Parsed magnet link.
///
/// Keeps the original URI so that it can be handed to the engine verbatim,
/// plus the fields the orchestrator needs for naming and tracker injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    uri: String,
    info_hash: InfoHash,
    display_name: Option<String>,
    trackers: Vec<String>,
}

impl MagnetLink {
    /// Parses a magnet URI.
    ///
    /// # Errors
    /// - `EngineError::InvalidMagnetLink` - Malformed URI or missing `btih` topic
    pub fn parse(uri: &str) -> Result<Self, EngineError> {
        let uri = uri.trim();
        let magnet = magnet_url::Magnet::new(uri).map_err(|e| EngineError::InvalidMagnetLink {
            reason: format!("{e}"),
        })?;

        let info_hash = Self::extract_info_hash(uri)?;

        Ok(Self {
            uri: uri.to_string(),
            info_hash,
            display_name: magnet.display_name().map(|s| s.to_string()),
            trackers: magnet.trackers().to_vec(),
        })
    }

    fn extract_info_hash(uri: &str) -> Result<InfoHash, EngineError> {
        let query = uri
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| EngineError::InvalidMagnetLink {
                reason: format!("missing query in {uri}"),
            })?;

        query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| EngineError::InvalidMagnetLink {
                reason: format!("missing btih exact topic in {uri}"),
            })?
            .parse()
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    /// Returns a copy with `trackers` appended as `tr=` parameters.
    ///
    /// Trackers already present in the link are not repeated.
    pub fn with_trackers(&self, trackers: &[String]) -> Self {
        let mut link = self.clone();
        for tracker in trackers {
            if link.trackers.iter().any(|existing| existing == tracker) {
                continue;
            }
            link.uri
                .push_str(&format!("&tr={}", urlencoding::encode(tracker)));
            link.trackers.push(tracker.clone());
        }
        link
    }
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl FromStr for MagnetLink {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
