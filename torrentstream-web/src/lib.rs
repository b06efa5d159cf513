//! Torrentstream Web - HTTP surface
//!
//! `GET /stream?magnet=...` starts a playback run and redirects to the file
//! once it streams, `DELETE /stream?magnet=...` cancels it, and the download
//! root is served below the streams prefix.

pub mod handlers;
pub mod publisher;
pub mod server;

pub use handlers::ApiError;
pub use publisher::HttpPublisher;
pub use server::{AppState, build_router, run_server};
