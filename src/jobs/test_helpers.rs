//! In-process extractor and polling helpers shared by job and server tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::extractors::{
    ExtractionOutcome, ExtractionRequest, MediaExtractor, ProgressEvent, ProgressSender,
};
use crate::tasks::{Task, TaskId, TaskStore};
use crate::Result;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Extractor that replays a fixed script: emit events, write files, report
/// an outcome.
#[derive(Default, Clone)]
pub(crate) struct ScriptedExtractor {
    title: Option<String>,
    files: Vec<(String, usize)>,
    artifact: Option<String>,
    entries: usize,
    events: Vec<ProgressEvent>,
    delay: Duration,
    running: Option<Arc<AtomicUsize>>,
    peak: Option<Arc<AtomicUsize>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            entries: 1,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Write `name` with `size` bytes into the job directory
    pub fn file(mut self, name: &str, size: usize) -> Self {
        self.files.push((name.to_string(), size));
        self
    }

    /// Report `name` as the produced file
    pub fn artifact(mut self, name: &str) -> Self {
        self.artifact = Some(name.to_string());
        self
    }

    pub fn events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    /// Pause before each event and before finishing
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn track_concurrency(mut self, running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.running = Some(running);
        self.peak = Some(peak);
        self
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome> {
        if let (Some(running), Some(peak)) = (&self.running, &self.peak) {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
        }

        for event in &self.events {
            self.pause().await;
            let _ = progress.send(*event);
        }

        for (name, size) in &self.files {
            fs_err::write(request.output_dir.join(name), vec![0u8; *size])?;
        }
        self.pause().await;

        if let Some(running) = &self.running {
            running.fetch_sub(1, Ordering::SeqCst);
        }

        Ok(ExtractionOutcome {
            title: self.title.clone(),
            artifact: self
                .artifact
                .as_ref()
                .map(|name| request.output_dir.join(name)),
            entries: self.entries,
        })
    }
}

/// Poll until `condition` holds, panicking after a generous limit
pub(crate) async fn wait_for(mut condition: impl FnMut() -> bool) {
    let started = tokio::time::Instant::now();
    while !condition() {
        assert!(started.elapsed() < WAIT_LIMIT, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until the task is `done` or `error` and return its final state
pub(crate) async fn wait_until_finished(store: &dyn TaskStore, id: &TaskId) -> Task {
    wait_for(|| {
        store
            .get(id)
            .map_or(false, |task| task.status.is_terminal())
    })
    .await;

    store.get(id).expect("task disappeared while waiting")
}
