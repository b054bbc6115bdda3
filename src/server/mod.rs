//! Web server module
//!
//! # Routes
//!
//! - `GET /` - Submission form with a progress bar
//! - `POST /start` - Submit a URL and mode, returns the task id
//! - `GET /progress/:id` - Poll a task
//! - `GET /fetch/:id` - Download the finished file, once
//! - `GET /health` - Liveness and task count

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::jobs::JobRunner;
use crate::Result;

pub mod delivery;
pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

/// Create the router with all route definitions
pub fn create_router(runner: Arc<JobRunner>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/start", post(routes::start))
        .route("/progress/:id", get(routes::progress))
        .route("/fetch/:id", get(delivery::fetch))
        .route("/health", get(routes::health))
        .with_state(AppState::new(runner))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C
pub async fn serve(runner: Arc<JobRunner>, bind_address: SocketAddr) -> Result<()> {
    tracing::info!(address = %bind_address, "Starting web server");

    let app = create_router(runner);

    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    tracing::info!(address = %listener.local_addr()?, "Web server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    tracing::info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::routes::{HealthResponse, ProgressResponse, StartResponse};
    use super::*;
    use crate::extractors::ProgressEvent;
    use crate::jobs::test_helpers::{wait_for, wait_until_finished, ScriptedExtractor};
    use crate::tasks::{MemoryTaskStore, TaskId, TaskStatus};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn test_app(extractor: ScriptedExtractor) -> (Router, Arc<JobRunner>, TempDir) {
        let root = tempdir().unwrap();
        let runner = Arc::new(JobRunner::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(extractor),
            root.path().to_path_buf(),
        ));
        (create_router(runner.clone()), runner, root)
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn submit(app: &Router, form: &str) -> TaskId {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/start")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(form.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let started: StartResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        started.id
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn poll(app: &Router, id: &TaskId) -> ProgressResponse {
        let response = get(app, &format!("/progress/{}", id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn job_dirs(root: &Path) -> usize {
        fs_err::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn test_index_serves_form() {
        let (app, _runner, _root) = test_app(ScriptedExtractor::new());

        let response = get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("/start"));
        assert!(html.contains("audio_only"));
    }

    #[tokio::test]
    async fn test_poll_unknown_task() {
        let (app, _runner, _root) = test_app(ScriptedExtractor::new());

        let progress = poll(&app, &TaskId::from("does-not-exist")).await;
        assert_eq!(progress.status, TaskStatus::Error);
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.error.as_deref(), Some("no such task"));
    }

    #[tokio::test]
    async fn test_invalid_mode_reported_through_polling() {
        let (app, runner, root) = test_app(ScriptedExtractor::new());

        let id = submit(&app, "url=https%3A%2F%2Fexample.com%2Fv&mode=karaoke").await;
        wait_until_finished(runner.store().as_ref(), &id).await;

        let progress = poll(&app, &id).await;
        assert_eq!(progress.status, TaskStatus::Error);
        assert_eq!(progress.error.as_deref(), Some("Invalid mode: karaoke"));
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_fetch_before_done() {
        let (app, runner, _root) = test_app(ScriptedExtractor::new());
        let store = runner.store();

        let starting = store.create();
        let downloading = store.create();
        store.update(&downloading, &mut |task| task.record_progress(40));
        let processing = store.create();
        store.update(&processing, &mut |task| task.mark_processing());
        let failed = store.create();
        store.update(&failed, &mut |task| task.fail("ERROR: Unsupported URL"));

        let cases = [
            (&starting, TaskStatus::Starting),
            (&downloading, TaskStatus::Downloading),
            (&processing, TaskStatus::Processing),
            (&failed, TaskStatus::Error),
        ];
        for (id, status) in cases {
            let response = get(&app, &format!("/fetch/{}", id)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", status);
            assert_eq!(body_bytes(response).await, b"Not ready");

            // Still pollable, nothing was claimed
            let task = store.get(id).unwrap();
            assert_eq!(task.status, status);
        }

        let response = get(&app, "/fetch/never-created").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_full_flow_delivers_once() {
        let extractor = ScriptedExtractor::new()
            .title("Café: Live?")
            .file("Café Live.mp3", 4096)
            .file("Café Live.webm", 9000)
            .artifact("Café Live.mp3")
            .events(vec![
                ProgressEvent::Downloading { percent: 33.3 },
                ProgressEvent::Downloading { percent: 100.0 },
                ProgressEvent::Finished,
            ]);
        let (app, runner, root) = test_app(extractor);

        let form = "url=https%3A%2F%2Fexample.com%2Fwatch%3Fv%3Dx&mode=audio_only";
        let id = submit(&app, form).await;
        let task = wait_until_finished(runner.store().as_ref(), &id).await;
        assert_eq!(task.status, TaskStatus::Done);
        let job_dir = task.job_dir.unwrap();

        let progress = poll(&app, &id).await;
        assert_eq!(progress.status, TaskStatus::Done);
        assert_eq!(progress.percent, 100);
        assert!(progress.error.is_none());

        let response = get(&app, &format!("/fetch/{}", id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "4096");
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment;"));
        assert!(disposition.contains("filename*=UTF-8''Caf%C3%A9%20Live.mp3"));

        assert_eq!(body_bytes(response).await.len(), 4096);

        let again = get(&app, &format!("/fetch/{}", id)).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);

        let progress = poll(&app, &id).await;
        assert_eq!(progress.error.as_deref(), Some("no such task"));

        wait_for(|| !job_dir.exists()).await;
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_dropped_response_still_cleans_up() {
        let (app, runner, _root) = test_app(ScriptedExtractor::new().file("v.mp4", 64));

        let id = submit(&app, "url=https%3A%2F%2Fexample.com%2Fv").await;
        let task = wait_until_finished(runner.store().as_ref(), &id).await;
        let job_dir = task.job_dir.unwrap();

        let response = get(&app, &format!("/fetch/{}", id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        drop(response);

        wait_for(|| !job_dir.exists()).await;
        assert!(runner.store().get(&id).is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let (app, runner, _root) = test_app(ScriptedExtractor::new());
        runner.store().create();

        let response = get(&app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.tasks, 1);
    }
}
