//! HTTP request handlers

pub mod streams;

pub use streams::{StreamQuery, StreamSummary, cancel_stream, list_streams, start_stream};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use torrentstream_core::engine::InfoHash;
use torrentstream_core::{EngineError, FailureReason, StreamError};

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(EngineError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Stream {info_hash} failed: {reason}")]
    StreamFailed {
        info_hash: InfoHash,
        reason: FailureReason,
    },

    #[error("Stream {info_hash} was cancelled")]
    Cancelled { info_hash: InfoHash },

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidMagnet(_) => StatusCode::BAD_REQUEST,
            ApiError::Stream(StreamError::Engine(EngineError::DuplicateTorrent { .. })) => {
                StatusCode::CONFLICT
            }
            ApiError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::StreamFailed { reason, .. } => match reason {
                FailureReason::MetadataTimeout | FailureReason::CacheFillTimeout => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                FailureReason::NoPlayableSource => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::Cancelled { .. } => StatusCode::GONE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        (status, self.to_string()).into_response()
    }
}
