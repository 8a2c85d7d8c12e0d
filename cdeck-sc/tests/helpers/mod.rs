//! Shared test fixtures: stub renderer, in-memory store, and local HTTP
//! servers standing in for asset storage and the caller's webhook.
//!
//! Not every fixture is used by every test binary.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use cdeck_common::timeline::{AudioPlacement, TimelineEntry};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;

use cdeck_sc::api::{create_router, AppContext};
use cdeck_sc::error::{Error, Result};
use cdeck_sc::fetch::AssetFetcher;
use cdeck_sc::notify::Notifier;
use cdeck_sc::pipeline::{start_workers, PipelineContext};
use cdeck_sc::publish::ObjectStore;
use cdeck_sc::registry::JobRegistry;
use cdeck_sc::render::MediaRenderer;

/// Renderer that writes placeholder bytes instead of invoking a binary.
/// Optionally fails at one named stage to exercise error paths.
pub struct StubRenderer {
    pub fail_stage: Option<&'static str>,
    /// Delay injected into every cut, to keep a worker busy
    pub cut_delay: Duration,
}

impl StubRenderer {
    pub fn ok() -> Self {
        Self {
            fail_stage: None,
            cut_delay: Duration::ZERO,
        }
    }

    pub fn failing_at(stage: &'static str) -> Self {
        Self {
            fail_stage: Some(stage),
            cut_delay: Duration::ZERO,
        }
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        if self.fail_stage == Some(stage) {
            return Err(Error::Render {
                stage,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaRenderer for StubRenderer {
    async fn cut_shot(&self, _entry: &TimelineEntry, _src: &Path, dest: &Path) -> Result<()> {
        self.check("cut")?;
        tokio::time::sleep(self.cut_delay).await;
        tokio::fs::write(dest, b"clip").await?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], dest: &Path) -> Result<()> {
        self.check("concat")?;
        tokio::fs::write(dest, format!("video:{}", clips.len())).await?;
        Ok(())
    }

    async fn prepare_track(&self, _placement: &AudioPlacement, _src: &Path, dest: &Path) -> Result<()> {
        self.check("track")?;
        tokio::fs::write(dest, b"stem").await?;
        Ok(())
    }

    async fn mix(
        &self,
        _video: &Path,
        stems: &[(PathBuf, u64)],
        _master_volume: f64,
        dest: &Path,
    ) -> Result<()> {
        self.check("mix")?;
        tokio::fs::write(dest, format!("mixed:{}", stems.len())).await?;
        Ok(())
    }

    async fn extract_frame(&self, _video: &Path, _at_ms: u64, dest: &Path) -> Result<()> {
        self.check("thumbnail")?;
        tokio::fs::write(dest, b"jpeg").await?;
        Ok(())
    }
}

/// Object store capturing uploads in memory.
///
/// `fail_content_type` makes uploads of that content type fail, to
/// exercise publish error paths; deletes are recorded, never fail.
#[derive(Default)]
pub struct MemStore {
    pub uploads: Mutex<Vec<(String, String)>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_content_type: Option<&'static str>,
}

impl MemStore {
    pub fn failing_uploads_of(content_type: &'static str) -> Self {
        Self {
            fail_content_type: Some(content_type),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn upload(&self, key: &str, content_type: &str, _bytes: Vec<u8>) -> Result<String> {
        if self.fail_content_type == Some(content_type) {
            return Err(Error::Publish(format!("injected upload failure for {key}")));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        Ok(format!("https://cdn.test/{key}"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Build a router backed by a real worker pool over stub renderer/store
pub fn test_app(
    renderer: Arc<dyn MediaRenderer>,
    store: Arc<MemStore>,
    shared_secret: &str,
    workers: usize,
    queue_capacity: usize,
) -> (Router, Arc<JobRegistry>) {
    let registry = Arc::new(JobRegistry::new());
    let scratch_root = std::env::temp_dir().join(format!("cdeck-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&scratch_root).unwrap();

    let ctx = Arc::new(PipelineContext {
        registry: Arc::clone(&registry),
        renderer,
        store,
        fetcher: AssetFetcher::new(Duration::from_secs(5)).unwrap(),
        notifier: Notifier::new(1, Duration::from_millis(10), Duration::from_secs(2)).unwrap(),
        scratch_root,
    });
    let queue = start_workers(ctx, workers, queue_capacity);

    let app = create_router(
        AppContext {
            registry: Arc::clone(&registry),
            queue,
        },
        shared_secret.to_string(),
    );
    (app, registry)
}

/// Serve a router on an ephemeral local port
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Local server answering every GET with fixed media bytes
pub async fn spawn_asset_server() -> SocketAddr {
    let app = Router::new()
        .route("/media/:name", get(|| async { "sourcebytes" }))
        .route(
            "/hang/:name",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        );
    spawn_server(app).await
}

#[derive(Clone, Default)]
pub struct WebhookState {
    pub received: Arc<Mutex<Vec<Value>>>,
    pub failures_before_success: Arc<AtomicU32>,
}

async fn webhook_handler(
    State(state): State<WebhookState>,
    Json(body): Json<Value>,
) -> StatusCode {
    if state.failures_before_success.load(Ordering::SeqCst) > 0 {
        state.failures_before_success.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.received.lock().unwrap().push(body);
    StatusCode::OK
}

/// Local webhook receiver recording delivered payloads; fails the first
/// `failures` requests with 500 to exercise retry.
pub async fn spawn_webhook_server(failures: u32) -> (SocketAddr, WebhookState) {
    let state = WebhookState::default();
    state
        .failures_before_success
        .store(failures, Ordering::SeqCst);
    let app = Router::new()
        .route("/hook", post(webhook_handler))
        .with_state(state.clone());
    (spawn_server(app).await, state)
}

/// Minimal valid compose body with one shot
pub fn compose_body(job_id: &str, source_url: &str, callback_url: &str) -> Value {
    serde_json::json!({
        "jobId": job_id,
        "sceneId": uuid::Uuid::new_v4(),
        "projectId": uuid::Uuid::new_v4(),
        "callbackUrl": callback_url,
        "shots": [{
            "id": "s1",
            "order": 0,
            "sourceUrl": source_url,
            "durationMs": 4000
        }]
    })
}

pub fn post_json(uri: &str, secret: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {secret}"))
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_authed(uri: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {secret}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
