//! Submission, polling and health handlers

use axum::extract::{Path, State};
use axum::response::Html;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use super::state::AppState;
use crate::extractors::Mode;
use crate::tasks::{TaskId, TaskStatus};
use crate::MediaGrabError;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct StartForm {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    Mode::Combined.as_str().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub id: TaskId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub status: TaskStatus,
    pub percent: u8,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tasks: usize,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Always answers with a task id; bad input surfaces through polling
pub async fn start(
    State(state): State<AppState>,
    Form(form): Form<StartForm>,
) -> Json<StartResponse> {
    let id = state.runner.submit(&form.url, &form.mode);
    Json(StartResponse { id })
}

pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ProgressResponse> {
    let response = match state.store().get(&TaskId::from(id)) {
        Some(task) => ProgressResponse {
            status: task.status,
            percent: task.percent,
            error: task.error,
        },
        None => ProgressResponse {
            status: TaskStatus::Error,
            percent: 0,
            error: Some(MediaGrabError::NotFound.to_string()),
        },
    };

    Json(response)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tasks: state.store().len(),
    })
}
