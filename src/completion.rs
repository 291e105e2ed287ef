use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::wait::CancelToken;

pub const IN_PROGRESS_MARKERS: [&str; 3] = [".crdownload", ".part", ".tmp"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    names: BTreeSet<String>,
}

impl DirectorySnapshot {
    pub fn capture(dir: &Path) -> Result<Self, HarvestError> {
        let names = list_dir(dir)?.into_iter().map(|entry| entry.name).collect();
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedFile {
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { files: Vec<DownloadedFile> },
    TimedOut { in_progress: Vec<String> },
    NotStarted,
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    pub poll_interval: Duration,
    pub start_window: Duration,
    pub markers: Vec<String>,
}

impl CompletionDetector {
    pub fn new(poll_interval: Duration, start_window: Duration) -> Self {
        Self {
            poll_interval,
            start_window,
            markers: IN_PROGRESS_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn is_in_progress(&self, name: &str) -> bool {
        self.markers.iter().any(|marker| name.ends_with(marker.as_str()))
    }

    pub fn await_completion(
        &self,
        dir: &Path,
        timeout: Duration,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<CompletionOutcome, HarvestError> {
        let baseline = DirectorySnapshot::capture(dir)?;
        self.await_completion_since(dir, &baseline, timeout, cancel, sink)
    }

    // Capture `baseline` before the click, so files that arrive quickly
    // still count as new.
    pub fn await_completion_since(
        &self,
        dir: &Path,
        baseline: &DirectorySnapshot,
        timeout: Duration,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<CompletionOutcome, HarvestError> {
        let started_at = Instant::now();
        let mut started = false;

        loop {
            cancel.check()?;
            let entries = list_dir(dir)?;
            let (in_progress, finished): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|entry| self.is_in_progress(&entry.name));

            let has_new = finished.iter().any(|entry| !baseline.contains(&entry.name));
            if !started && (!in_progress.is_empty() || has_new) {
                info!(dir = %dir.display(), "download started");
                started = true;
            }

            if started && in_progress.is_empty() {
                let files = finished
                    .into_iter()
                    .filter(|entry| !baseline.contains(&entry.name))
                    .map(|entry| DownloadedFile {
                        name: entry.name,
                        bytes: entry.bytes,
                    })
                    .collect::<Vec<_>>();
                info!(dir = %dir.display(), files = files.len(), "download completed");
                return Ok(CompletionOutcome::Completed { files });
            }

            for entry in &in_progress {
                debug!(file = %entry.name, bytes = entry.bytes, "download in progress");
                sink.event(ProgressEvent::Download {
                    file: entry.name.clone(),
                    bytes: entry.bytes,
                });
            }

            let elapsed = started_at.elapsed();
            if elapsed >= timeout {
                if started {
                    let in_progress = in_progress.into_iter().map(|entry| entry.name).collect();
                    warn!(dir = %dir.display(), "download timed out");
                    return Ok(CompletionOutcome::TimedOut { in_progress });
                }
                warn!(dir = %dir.display(), "download did not start");
                return Ok(CompletionOutcome::NotStarted);
            }
            if !started && elapsed >= self.start_window {
                warn!(dir = %dir.display(), "download did not start");
                return Ok(CompletionOutcome::NotStarted);
            }

            let mut remaining = timeout - elapsed;
            if !started {
                remaining = remaining.min(self.start_window - elapsed);
            }
            cancel.sleep(self.poll_interval.min(remaining))?;
        }
    }
}

struct DirEntryInfo {
    name: String,
    bytes: u64,
}

fn list_dir(dir: &Path) -> Result<Vec<DirEntryInfo>, HarvestError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| HarvestError::Filesystem(format!("list {}: {err}", dir.display())))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Files can vanish between listing and stat while the browser renames them.
        let bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        items.push(DirEntryInfo { name, bytes });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}
