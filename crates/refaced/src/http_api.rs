//! HTTP surface of the daemon.
//!
//! One operation endpoint (`POST /api/swap`) plus health and status
//! queries. Swap responses are always HTTP 200 with a `status` field in
//! the JSON body; callers distinguish success from failure by inspecting
//! it, not the status code.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use reface_core::provision::ProvisionReport;
use reface_core::staging::{Stager, StagingError};
use reface_core::{RequestWorkspace, SwapOutcome};

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: EngineHandle,
    stager: Stager,
    requests_root: PathBuf,
    model_path: PathBuf,
    allow_stale_inputs: bool,
    provision_report: ProvisionReport,
    started_at: DateTime<Utc>,
    swaps_completed: AtomicU64,
    swaps_failed: AtomicU64,
}

impl AppState {
    pub fn new(
        config: &Config,
        engine: EngineHandle,
        stager: Stager,
        provision_report: ProvisionReport,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                stager,
                requests_root: config.requests_root(),
                model_path: config.model_path(),
                allow_stale_inputs: config.allow_stale_inputs,
                provision_report,
                started_at: Utc::now(),
                swaps_completed: AtomicU64::new(0),
                swaps_failed: AtomicU64::new(0),
            }),
        }
    }
}

#[derive(Deserialize)]
pub struct SwapForm {
    pub target_url: String,
    pub source_url: String,
}

#[derive(Serialize, Deserialize)]
pub struct SwapResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl SwapResponse {
    fn success(outcome: &SwapOutcome) -> Self {
        Self {
            status: "success".to_string(),
            message: "Face swapping completed".to_string(),
            output_path: Some(outcome.output_path.display().to_string()),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message,
            output_path: None,
        }
    }
}

/// Everything that can sink a swap request. Collapsed into the generic
/// error payload at the handler boundary.
#[derive(Error, Debug)]
enum SwapFailure {
    #[error("failed to create request workspace: {0}")]
    Workspace(#[from] std::io::Error),
    #[error("failed to stage {input}: {source}")]
    Staging {
        input: &'static str,
        #[source]
        source: StagingError,
    },
    #[error("{0}")]
    Engine(#[from] EngineError),
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/swap", post(swap))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let inner = &state.inner;
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "model_present": inner.model_path.exists(),
        "provisioning": inner.provision_report,
        "uptime_secs": (Utc::now() - inner.started_at).num_seconds(),
        "swaps_completed": inner.swaps_completed.load(Ordering::Relaxed),
        "swaps_failed": inner.swaps_failed.load(Ordering::Relaxed),
    }))
}

async fn swap(State(state): State<AppState>, Form(form): Form<SwapForm>) -> Json<SwapResponse> {
    match handle_swap(&state, &form).await {
        Ok(outcome) => {
            state.inner.swaps_completed.fetch_add(1, Ordering::Relaxed);
            Json(SwapResponse::success(&outcome))
        }
        Err(e) => {
            state.inner.swaps_failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "swap request failed");
            Json(SwapResponse::error(e.to_string()))
        }
    }
}

/// The request pipeline: workspace, staging, tool invocation.
async fn handle_swap(state: &AppState, form: &SwapForm) -> Result<SwapOutcome, SwapFailure> {
    let workspace = RequestWorkspace::create(&state.inner.requests_root)?;
    tracing::info!(
        request = %workspace.id,
        target_url = %form.target_url,
        source_url = %form.source_url,
        "swap requested"
    );

    stage_input(state, &form.target_url, &workspace.target_video(), "target video").await?;
    stage_input(state, &form.source_url, &workspace.source_image(), "source image").await?;

    Ok(state.inner.engine.swap(workspace.job()).await?)
}

/// Stage one input, applying the stale-input policy on failure: when
/// enabled, a failed download is logged and the request proceeds with
/// whatever is at `dest` (stale or missing), letting the tool report the
/// consequence.
async fn stage_input(
    state: &AppState,
    url: &str,
    dest: &Path,
    input: &'static str,
) -> Result<(), SwapFailure> {
    match state.inner.stager.stage(url, dest).await {
        Ok(_) => Ok(()),
        Err(source) if state.inner.allow_stale_inputs => {
            tracing::warn!(
                input,
                error = %source,
                dest = %dest.display(),
                "download failed, proceeding with existing file if any"
            );
            Ok(())
        }
        Err(source) => Err(SwapFailure::Staging { input, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use reface_core::MockSwapTool;
    use tower::{Service, ServiceExt};

    use crate::engine::spawn_engine;

    fn test_config(work_dir: &Path) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            work_dir: work_dir.to_path_buf(),
            model_url: "https://localhost/unused".to_string(),
            pip_program: "true".to_string(),
            framework_index_url: "https://localhost/unused".to_string(),
            tool_program: "true".to_string(),
            tool_script: "run.py".to_string(),
            tool_dir: work_dir.to_path_buf(),
            execution_provider: "cpu".to_string(),
            frame_processor: "face_swapper".to_string(),
            allow_stale_inputs: false,
        }
    }

    fn test_state(work_dir: &Path, stager: Stager, tool: MockSwapTool) -> AppState {
        let config = test_config(work_dir);
        std::fs::create_dir_all(config.requests_root()).unwrap();
        AppState::new(
            &config,
            spawn_engine(Box::new(tool)),
            stager,
            ProvisionReport::default(),
        )
    }

    /// Serve fixed bytes for any `/uc?id=…` request on a loopback port,
    /// standing in for the file-sharing host.
    async fn spawn_file_host() -> String {
        let app = Router::new().route("/uc", get(|| async { "fake media bytes" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/uc?id=")
    }

    async fn post_swap(router: &mut Router, target_url: &str, source_url: &str) -> SwapResponse {
        let body = format!(
            "target_url={}&source_url={}",
            urlencode(target_url),
            urlencode(source_url)
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/swap")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        let resp = router
            .as_service()
            .ready()
            .await
            .unwrap()
            .call(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn urlencode(s: &str) -> String {
        s.replace(':', "%3A").replace('/', "%2F").replace('?', "%3F").replace('=', "%3D")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_router(test_state(dir.path(), Stager::new(), MockSwapTool::succeeding()));

        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let resp = app.as_service().ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reports_model_and_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_router(test_state(dir.path(), Stager::new(), MockSwapTool::succeeding()));

        let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        let resp = app.as_service().ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["model_present"], false);
        assert_eq!(json["swaps_completed"], 0);
        assert!(json["provisioning"]["steps"].is_array());
    }

    #[tokio::test]
    async fn test_swap_success_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_file_host().await;
        let state = test_state(dir.path(), Stager::with_download_base(base), MockSwapTool::succeeding());
        let mut app = app_router(state);

        let resp = post_swap(
            &mut app,
            "https://drive.google.com/file/d/ABC123/view",
            "https://drive.google.com/file/d/XYZ789/view",
        )
        .await;

        assert_eq!(resp.status, "success");
        assert_eq!(resp.message, "Face swapping completed");
        let output = PathBuf::from(resp.output_path.unwrap());
        assert!(output.starts_with(dir.path().join("requests")));
        assert!(output.ends_with("output_face_swap.mp4"));

        // Both inputs were staged into the request's own workspace.
        let request_dir = output.parent().unwrap();
        assert_eq!(
            std::fs::read(request_dir.join("target_video.mp4")).unwrap(),
            b"fake media bytes"
        );
        assert_eq!(
            std::fs::read(request_dir.join("source_image.jpg")).unwrap(),
            b"fake media bytes"
        );
    }

    #[tokio::test]
    async fn test_swap_malformed_link_is_generic_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_router(test_state(dir.path(), Stager::new(), MockSwapTool::succeeding()));

        let resp = post_swap(&mut app, "not-a-url", "also-not-a-url").await;

        assert_eq!(resp.status, "error");
        assert!(!resp.message.is_empty());
        assert!(resp.output_path.is_none());
    }

    #[tokio::test]
    async fn test_swap_tool_failure_is_generic_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_file_host().await;
        let state = test_state(
            dir.path(),
            Stager::with_download_base(base),
            MockSwapTool::failing("CUDA out of memory"),
        );
        let mut app = app_router(state);

        let resp = post_swap(
            &mut app,
            "https://drive.google.com/file/d/ABC123/view",
            "https://drive.google.com/file/d/XYZ789/view",
        )
        .await;

        assert_eq!(resp.status, "error");
        assert!(resp.message.contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_strict_policy_fails_request_on_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_router(test_state(dir.path(), Stager::new(), MockSwapTool::succeeding()));

        let resp = post_swap(&mut app, "not-a-url", "https://drive.google.com/file/d/X/view").await;

        assert_eq!(resp.status, "error");
        assert!(resp.message.contains("target video"), "got: {}", resp.message);
    }

    #[tokio::test]
    async fn test_legacy_policy_proceeds_and_surfaces_missing_input() {
        // Legacy mode logs a failed download and runs the tool anyway; with
        // nothing at the input path the tool reports the missing file and
        // the caller still gets the generic error payload.
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.allow_stale_inputs = true;
        std::fs::create_dir_all(config.requests_root()).unwrap();

        let tool = config.swap_tool();
        let state = AppState::new(
            &config,
            spawn_engine(Box::new(tool)),
            Stager::new(),
            ProvisionReport::default(),
        );
        let mut app = app_router(state);

        let resp = post_swap(&mut app, "not-a-url", "also-not-a-url").await;

        assert_eq!(resp.status, "error");
        assert!(resp.message.contains("missing input"), "got: {}", resp.message);
    }

    #[tokio::test]
    async fn test_concurrent_swaps_use_distinct_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_file_host().await;
        let state = test_state(dir.path(), Stager::with_download_base(base), MockSwapTool::succeeding());
        let mut app = app_router(state);

        let first = post_swap(
            &mut app,
            "https://drive.google.com/file/d/AAA/view",
            "https://drive.google.com/file/d/BBB/view",
        )
        .await;
        let second = post_swap(
            &mut app,
            "https://drive.google.com/file/d/CCC/view",
            "https://drive.google.com/file/d/DDD/view",
        )
        .await;

        assert_eq!(first.status, "success");
        assert_eq!(second.status, "success");
        assert_ne!(first.output_path, second.output_path);
    }
}
