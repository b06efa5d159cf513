//! Stream function that publishes the selected file over HTTP.

use async_trait::async_trait;
use torrentstream_core::catalog::FileEntry;
use torrentstream_core::engine::InfoHash;
use torrentstream_core::{PlayerLauncher, StreamContext, StreamError, StreamFunction};

/// Route of `file` below the served download root.
///
/// Every path segment is percent-encoded.
pub fn stream_path(prefix: &str, info_hash: InfoHash, file: &FileEntry) -> String {
    let encoded: Vec<_> = file
        .path()
        .split('/')
        .map(urlencoding::encode)
        .collect();
    format!(
        "{}/{}/{}",
        prefix.trim_end_matches('/'),
        info_hash,
        encoded.join("/")
    )
}

/// Announces the browser-facing URL of the selected file and optionally
/// opens it in a player.
///
/// The file itself is served by the static route, so without a player the
/// stream function completes immediately and the run only waits for the
/// download.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    base_url: String,
    prefix: String,
    player: Option<PlayerLauncher>,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            prefix: prefix.into(),
            player: None,
        }
    }

    pub fn with_player(mut self, player: PlayerLauncher) -> Self {
        self.player = Some(player);
        self
    }

    pub fn url_for(&self, info_hash: InfoHash, file: &FileEntry) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            stream_path(&self.prefix, info_hash, file)
        )
    }
}

#[async_trait]
impl StreamFunction for HttpPublisher {
    async fn stream(&self, ctx: &StreamContext, file: &FileEntry) -> Result<(), StreamError> {
        let url = self.url_for(ctx.info_hash, file);
        tracing::info!("Serving {} at {}", file.path(), url);

        match &self.player {
            Some(player) => player.launch(&url, &ctx.cancel).await,
            None => Ok(()),
        }
    }
}
