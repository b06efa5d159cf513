use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use torrentstream_core::config::StreamConfig;
use torrentstream_core::engine::{SimulatedEngine, SimulatedFile, SwarmProfile};
use torrentstream_core::{MagnetLink, PlaybackOrchestrator, TorrentEngine};
use torrentstream_web::handlers::StreamSummary;
use torrentstream_web::{AppState, build_router};
use tower::ServiceExt;

const MAGNET: &str = "magnet:?xt=urn:btih:3b245504cf5f11bbdbe1201cea6a6bf45aee1bc0&dn=Clip";

struct TestApp {
    router: Router,
    engine: Arc<SimulatedEngine>,
    magnet: MagnetLink,
    _root: tempfile::TempDir,
}

impl TestApp {
    fn new(files: Vec<SimulatedFile>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = StreamConfig::for_testing();
        config.simulation.materialize = true;

        let engine = Arc::new(SimulatedEngine::new(
            config.engine.clone(),
            SwarmProfile::from(&config.simulation),
        ));
        let magnet = MagnetLink::parse(MAGNET).unwrap();
        engine.register_content(magnet.info_hash(), files);

        let orchestrator = Arc::new(
            PlaybackOrchestrator::new(engine.clone(), config.playback.clone()).unwrap(),
        );
        let state = AppState::new(orchestrator, &config, root.path().to_path_buf());

        Self {
            router: build_router(state),
            engine,
            magnet,
            _root: root,
        }
    }

    fn clip() -> Self {
        Self::new(vec![
            SimulatedFile::new("Clip/sample.mp4", 100),
            SimulatedFile::new("Clip/clip.mp4", 4096),
        ])
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    fn stream_uri(magnet: &str) -> String {
        format!("/stream?magnet={}", urlencoding::encode(magnet))
    }
}

#[tokio::test]
async fn test_get_stream_redirects_to_served_file() {
    let app = TestApp::clip();

    let (status, headers, _) = app.send(Method::GET, &TestApp::stream_uri(MAGNET)).await;

    assert_eq!(status, StatusCode::FOUND);
    let location = headers[header::LOCATION].to_str().unwrap().to_string();
    assert_eq!(
        location,
        format!("/streams/{}/Clip/clip.mp4", app.magnet.info_hash())
    );

    let (status, _, body) = app.send(Method::GET, &location).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());
}

#[tokio::test]
async fn test_repeated_get_joins_existing_run() {
    let app = TestApp::clip();
    let uri = TestApp::stream_uri(MAGNET);

    let (first, _, _) = app.send(Method::GET, &uri).await;
    let (second, _, _) = app.send(Method::GET, &uri).await;

    assert_eq!(first, StatusCode::FOUND);
    assert_eq!(second, StatusCode::FOUND);
    assert!(app.engine.active_torrents() <= 1);

    let (status, _, body) = app.send(Method::GET, "/api/streams").await;
    assert_eq!(status, StatusCode::OK);
    let streams: Vec<StreamSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].info_hash, app.magnet.info_hash().to_string());
    assert_eq!(streams[0].file.as_deref(), Some("Clip/clip.mp4"));
    assert!(streams[0].state == "STREAMING" || streams[0].state == "DONE");
}

#[tokio::test]
async fn test_delete_cancels_known_streams_only() {
    let app = TestApp::clip();
    let uri = TestApp::stream_uri(MAGNET);

    let (status, _, _) = app.send(Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.send(Method::GET, &uri).await;
    let (status, _, body) = app.send(Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    assert_eq!(app.engine.active_torrents(), 0);

    let (_, _, body) = app.send(Method::GET, "/api/streams").await;
    let streams: Vec<StreamSummary> = serde_json::from_slice(&body).unwrap();
    assert!(streams.is_empty());
}

#[tokio::test]
async fn test_invalid_magnet_is_bad_request() {
    let app = TestApp::clip();

    let (status, _, _) = app
        .send(Method::GET, &TestApp::stream_uri("magnet:?dn=nothing"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_torrent_without_media_is_unprocessable() {
    let app = TestApp::new(vec![
        SimulatedFile::new("Docs/readme.txt", 100),
        SimulatedFile::new("Docs/info.nfo", 100),
    ]);

    let (status, _, body) = app.send(Method::GET, &TestApp::stream_uri(MAGNET)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(String::from_utf8(body).unwrap().contains("NoPlayableSource"));

    // The failed run is released and forgotten before the response.
    assert_eq!(app.engine.active_torrents(), 0);
    let (_, _, body) = app.send(Method::GET, "/api/streams").await;
    let streams: Vec<StreamSummary> = serde_json::from_slice(&body).unwrap();
    assert!(streams.is_empty());

    // A new request starts a fresh run instead of tripping over the old one.
    let (status, _, _) = app.send(Method::GET, &TestApp::stream_uri(MAGNET)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.engine.active_torrents(), 0);
}
