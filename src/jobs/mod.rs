//! Background execution of submitted jobs.
//!
//! `JobRunner::submit` registers a task and spawns one worker for it. The
//! worker owns the task's mutable fields until it reaches `done` or `error`;
//! everything it learns flows into the [`TaskStore`].

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::extractors::progress::normalize_percent;
use crate::extractors::{
    progress_channel, validate_url, ExtractionOutcome, ExtractionRequest, MediaExtractor, Mode,
    ProgressEvent, YtDlpExtractor,
};
use crate::tasks::{TaskId, TaskStore};
use crate::utils::{format_file_size, largest_file_in, remove_job_dir, sanitize_filename};
use crate::{MediaGrabError, Result};

#[cfg(test)]
pub(crate) mod test_helpers;

/// Prefix of every job directory
pub const JOB_DIR_PREFIX: &str = "mg_";

/// Spawns and drives one worker per submitted job
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn TaskStore>,
    extractor: Arc<dyn MediaExtractor>,
    download_root: PathBuf,
    /// Bounds running workers when set; queued workers wait for a permit
    limiter: Option<Arc<Semaphore>>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn MediaExtractor>,
        download_root: PathBuf,
    ) -> Self {
        Self {
            store,
            extractor,
            download_root,
            limiter: None,
        }
    }

    /// Runner backed by yt-dlp with the configured limits
    pub fn from_config(config: &Config, store: Arc<dyn TaskStore>) -> Self {
        let extractor = Arc::new(YtDlpExtractor::from_config(&config.download));
        Self::new(store, extractor, config.download.download_root())
            .with_max_concurrent_jobs(config.download.max_concurrent_jobs)
    }

    /// Allow at most `max` jobs to run at once, 0 for no limit
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.limiter = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Register a task and start its worker. Returns without waiting; the
    /// URL and mode are only checked by the worker.
    pub fn submit(&self, url: &str, mode: &str) -> TaskId {
        let id = self.store.create();
        info!("Task {} submitted: {} ({})", id, url, mode);

        let runner = self.clone();
        let task_id = id.clone();
        let url = url.trim().to_string();
        let mode = mode.to_string();
        tokio::spawn(async move { runner.run(task_id, url, mode).await });

        id
    }

    /// Worker body. Every failure ends up in the task record.
    async fn run(&self, id: TaskId, url: String, mode: String) {
        let mode = match mode.parse::<Mode>() {
            Ok(mode) => mode,
            Err(err) => {
                warn!("Task {} rejected: {}", id, err);
                self.store.update(&id, &mut |task| task.fail(err.to_string()));
                return;
            }
        };

        if let Err(err) = validate_url(&url) {
            warn!("Task {} rejected: {}", id, err);
            self.store.update(&id, &mut |task| task.fail(err.to_string()));
            return;
        }

        let _permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let job_dir = match create_job_dir(&self.download_root) {
            Ok(dir) => dir,
            Err(err) => {
                error!("Task {} failed: {:#}", id, err);
                self.store.update(&id, &mut |task| task.fail(format!("{:#}", err)));
                return;
            }
        };
        self.store
            .update(&id, &mut |task| task.job_dir = Some(job_dir.clone()));

        let request = ExtractionRequest {
            url,
            mode,
            output_dir: job_dir.clone(),
        };

        match self.extract(&id, &request).await {
            Ok((artifact, title)) => {
                let size = fs_err::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
                info!(
                    "Task {} done: {} ({})",
                    id,
                    artifact.display(),
                    format_file_size(size)
                );
                self.store
                    .update(&id, &mut |task| task.complete(artifact.clone(), title.clone()));
            }
            Err(err) => {
                error!("Task {} failed: {:#}", id, err);
                remove_job_dir(&job_dir).await;
                self.store.update(&id, &mut |task| {
                    task.fail(format!("{:#}", err));
                    task.job_dir = None;
                });
            }
        }
    }

    /// Run the extractor while applying its progress events, then pick the
    /// artifact and the display title.
    async fn extract(&self, id: &TaskId, request: &ExtractionRequest) -> Result<(PathBuf, String)> {
        let (tx, mut rx) = progress_channel();

        let extraction = self.extractor.extract(request, tx);
        tokio::pin!(extraction);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.apply_progress(id, event),
                result = &mut extraction => break result,
            }
        };

        while let Ok(event) = rx.try_recv() {
            self.apply_progress(id, event);
        }

        let outcome = result?;
        let artifact = select_artifact(&outcome, &request.output_dir)?;
        let title = sanitize_filename(outcome.title.as_deref().unwrap_or_default());

        Ok((artifact, title))
    }

    fn apply_progress(&self, id: &TaskId, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading { percent } => {
                if let Some(percent) = normalize_percent(percent) {
                    debug!("Task {} at {}%", id, percent);
                    self.store.update(id, &mut |task| task.record_progress(percent));
                }
            }
            ProgressEvent::Finished => {
                debug!("Task {} transfer finished", id);
                self.store.update(id, &mut |task| task.mark_processing());
            }
        }
    }

    /// Remove finished tasks older than `ttl` along with their files.
    /// Returns how many tasks were removed.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let mut removed = 0;

        for task in self.store.list() {
            if !task.is_expired(ttl) {
                continue;
            }
            // Only the caller that actually removes the record cleans up
            if let Some(task) = self.store.delete(&task.id) {
                if let Some(dir) = &task.job_dir {
                    remove_job_dir(dir).await;
                }
                removed += 1;
            }
        }

        removed
    }

    /// Periodically sweep expired tasks until the returned handle is aborted
    pub fn spawn_sweeper(&self, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = runner.sweep_expired(ttl).await;
                if removed > 0 {
                    info!("Swept {} expired task(s)", removed);
                }
            }
        })
    }
}

/// Create a uniquely named directory for one job
fn create_job_dir(root: &Path) -> Result<PathBuf> {
    fs_err::create_dir_all(root)?;

    let dir = tempfile::Builder::new()
        .prefix(JOB_DIR_PREFIX)
        .tempdir_in(root)
        .with_context(|| format!("Failed to create job directory in {}", root.display()))?;

    Ok(dir.keep())
}

/// Pick the produced file: the one the extractor named for a single entry,
/// otherwise the largest file in the job directory.
pub fn select_artifact(outcome: &ExtractionOutcome, job_dir: &Path) -> Result<PathBuf> {
    if outcome.entries <= 1 {
        if let Some(path) = &outcome.artifact {
            if path.is_file() && path.starts_with(job_dir) {
                return Ok(path.clone());
            }
        }
    }

    largest_file_in(job_dir)?.ok_or_else(|| MediaGrabError::NoArtifact.into())
}
