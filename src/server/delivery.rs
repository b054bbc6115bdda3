//! One-shot delivery of finished artifacts.
//!
//! A fetch claims the task by removing it from the store, so at most one
//! request ever streams a given artifact. The job directory lives until the
//! response body is dropped, whether it was sent completely or not.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use std::path::{Path as FsPath, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use super::error::ApiError;
use super::state::AppState;
use crate::extractors::content_type_for_extension;
use crate::tasks::{TaskId, TaskStatus};
use crate::utils::{ascii_filename, download_filename, format_file_size, remove_job_dir};
use crate::MediaGrabError;

pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = TaskId::from(id);

    let ready = state
        .store()
        .get(&id)
        .map_or(false, |task| task.status == TaskStatus::Done);
    if !ready {
        return Err(MediaGrabError::NotReady.into());
    }

    // `done` is final, so the only way to lose the claim is a concurrent fetch
    let task = state.store().delete(&id).ok_or(MediaGrabError::NotReady)?;

    let Some(artifact) = task.artifact_path else {
        return Err(MediaGrabError::NotReady.into());
    };
    let job_dir = task
        .job_dir
        .or_else(|| artifact.parent().map(FsPath::to_path_buf));
    let guard = CleanupGuard::new(job_dir);

    let file = tokio::fs::File::open(&artifact).await.map_err(|err| {
        error!("Task {}: cannot open {}: {}", id, artifact.display(), err);
        ApiError::internal("Failed to open downloaded file")
    })?;
    let size = file.metadata().await.map(|m| m.len()).ok();

    let ext = artifact
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let filename = download_filename(task.display_title.as_deref(), &artifact);

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_extension(ext)),
    );
    if let Some(size) = size {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&filename))
            .map_err(|_| ApiError::internal("Failed to build download header"))?,
    );

    info!(
        "Task {} delivering {} ({})",
        id,
        filename,
        format_file_size(size.unwrap_or(0))
    );

    let stream = GuardedStream {
        inner: ReaderStream::new(file),
        _guard: guard,
    };
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// `attachment` disposition with an ASCII fallback and the exact UTF-8 name
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

/// Removes a job directory when dropped
struct CleanupGuard {
    dir: Option<PathBuf>,
}

impl CleanupGuard {
    fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_job_dir(&dir).await });
            }
            Err(_) => {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!("Failed to remove job directory {}: {}", dir.display(), err);
                }
            }
        }
    }
}

/// Response body stream that keeps the job directory alive
struct GuardedStream<S> {
    inner: S,
    _guard: CleanupGuard,
}

impl<S> Stream for GuardedStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
