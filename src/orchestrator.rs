use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::archive::ArchiveExtractor;
use crate::browser::{BrowserLauncher, SessionGuard};
use crate::completion::DownloadedFile;
use crate::config::{ResolvedConfig, Timing};
use crate::domain::{LinkId, LinkStatus};
use crate::error::HarvestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::provider::{AcquisitionContext, AcquisitionOutcome, ProviderSet, acquire};
use crate::registry::{Registry, TransferLink};
use crate::resolve::ManualSignal;
use crate::summary::Summary;
use crate::wait::CancelToken;

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub download_root: PathBuf,
    pub timing: Timing,
    pub interactive: bool,
}

impl RunSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            download_root: config.download_root.clone().into_std_path_buf(),
            timing: config.timing.clone(),
            interactive: config.interactive_fallback,
        }
    }

    pub fn link_dir(&self, id: &LinkId) -> PathBuf {
        self.download_root.join(format!("Link_{id}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub id: LinkId,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub files: Vec<DownloadedFile>,
    pub extracted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub attempted: Vec<LinkReport>,
    pub summary: Summary,
}

enum LinkResult {
    Completed {
        files: Vec<DownloadedFile>,
        extracted: usize,
    },
    Failed(String),
}

pub struct Orchestrator<L: BrowserLauncher, A: ArchiveExtractor> {
    launcher: L,
    archives: A,
    providers: ProviderSet,
    settings: RunSettings,
    cancel: CancelToken,
    manual: Option<Box<dyn ManualSignal>>,
}

impl<L: BrowserLauncher, A: ArchiveExtractor> Orchestrator<L, A> {
    pub fn new(launcher: L, archives: A, settings: RunSettings) -> Self {
        Self {
            launcher,
            archives,
            providers: ProviderSet::standard(),
            settings,
            cancel: CancelToken::new(),
            manual: None,
        }
    }

    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_manual(mut self, manual: Box<dyn ManualSignal>) -> Self {
        self.manual = Some(manual);
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn archives(&self) -> &A {
        &self.archives
    }

    pub fn run(
        &self,
        registry: &Registry,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, HarvestError> {
        let links = registry.load()?;
        let stale = links
            .iter()
            .filter(|link| link.status == LinkStatus::Processing && !link.processed)
            .count();
        if stale > 0 {
            warn!(count = stale, "resuming links left in processing by an earlier run");
        }

        let queue: Vec<TransferLink> = links.into_iter().filter(TransferLink::is_unresolved).collect();
        info!(total = queue.len(), registry = %registry.path(), "starting run");

        let mut attempted = Vec::new();
        for (index, link) in queue.iter().enumerate() {
            self.cancel.check()?;
            match registry.find(&link.id)? {
                Some(current) if current.is_unresolved() => {}
                Some(current) => {
                    info!(id = %link.id, status = %current.status, "link processed since the run started; skipping");
                    continue;
                }
                None => {
                    warn!(id = %link.id, "link removed from the registry since the run started; skipping");
                    continue;
                }
            }
            sink.event(ProgressEvent::LinkStarted {
                id: link.id.clone(),
                index,
                total: queue.len(),
                kind: link.provider_kind,
                url: link.url.clone(),
            });
            info!(id = %link.id, provider = %link.provider_kind, url = %link.url, "processing link");
            if !record(registry, &link.id, LinkStatus::Processing, None)? {
                continue;
            }

            let report = match self.process_link(link, sink) {
                Ok(LinkResult::Completed { files, extracted }) => {
                    record(registry, &link.id, LinkStatus::Completed, None)?;
                    LinkReport {
                        id: link.id.clone(),
                        status: LinkStatus::Completed,
                        detail: None,
                        files,
                        extracted,
                    }
                }
                Ok(LinkResult::Failed(reason)) if self.cancel.is_cancelled() => {
                    warn!(id = %link.id, reason = %reason, "run interrupted; link left in processing");
                    return Err(HarvestError::Cancelled);
                }
                Ok(LinkResult::Failed(reason)) => {
                    warn!(id = %link.id, reason = %reason, "link failed");
                    record(registry, &link.id, LinkStatus::Failed, Some(&reason))?;
                    LinkReport {
                        id: link.id.clone(),
                        status: LinkStatus::Failed,
                        detail: Some(reason),
                        files: Vec::new(),
                        extracted: 0,
                    }
                }
                // A terminal Ctrl-C also takes down the browser, so the
                // first symptom of an interrupt can be a browser error.
                Err(err) if matches!(err, HarvestError::Cancelled) || self.cancel.is_cancelled() => {
                    warn!(id = %link.id, error = %err, "run interrupted; link left in processing");
                    return Err(HarvestError::Cancelled);
                }
                Err(err) => {
                    let message = err.to_string();
                    error!(id = %link.id, error = %message, "link errored");
                    record(registry, &link.id, LinkStatus::Error, Some(&message))?;
                    LinkReport {
                        id: link.id.clone(),
                        status: LinkStatus::Error,
                        detail: Some(message),
                        files: Vec::new(),
                        extracted: 0,
                    }
                }
            };
            sink.event(ProgressEvent::LinkFinished {
                id: report.id.clone(),
                status: report.status,
                detail: report.detail.clone(),
            });
            attempted.push(report);

            if index + 1 < queue.len() {
                sink.event(ProgressEvent::Pacing {
                    delay: self.settings.timing.pacing,
                });
                self.cancel.sleep(self.settings.timing.pacing)?;
            }
        }

        let summary = Summary::from_links(&registry.load()?);
        info!(
            completed = summary.completed,
            failed = summary.failed,
            error = summary.error,
            pending = summary.pending,
            "run finished"
        );
        Ok(RunReport { attempted, summary })
    }

    fn process_link(
        &self,
        link: &TransferLink,
        sink: &dyn ProgressSink,
    ) -> Result<LinkResult, HarvestError> {
        let strategy = self
            .providers
            .get(link.provider_kind)
            .ok_or_else(|| HarvestError::UnsupportedProvider(link.provider_kind.to_string()))?;

        let dir = self.settings.link_dir(&link.id);
        fs::create_dir_all(&dir)
            .map_err(|err| HarvestError::Filesystem(format!("create {}: {err}", dir.display())))?;

        let timing = &self.settings.timing;
        let detector = timing.detector();
        let manual = if self.settings.interactive {
            self.manual.as_deref()
        } else {
            None
        };
        let ctx = AcquisitionContext {
            url: &link.url,
            download_dir: &dir,
            bounds: timing.resolve_bounds(self.settings.interactive),
            post_navigation: timing.post_navigation,
            dialog_presence: timing.dialog_presence,
            detector: &detector,
            completion_timeout: timing.completion_timeout,
            cancel: &self.cancel,
            manual,
            sink,
        };

        let mut session = SessionGuard::new(self.launcher.launch(&dir)?);
        let outcome = acquire(strategy, &mut *session, &ctx);
        if let Err(err) = session.release() {
            warn!(id = %link.id, error = %err, "failed to close browser session");
        }

        match outcome? {
            AcquisitionOutcome::Succeeded { files, dialogs } => {
                info!(id = %link.id, files = files.len(), dialogs, "download finished");
                let extracted = self.archives.extract_archives(&dir)?.len();
                if extracted > 0 {
                    sink.event(ProgressEvent::Extracted { entries: extracted });
                }
                Ok(LinkResult::Completed { files, extracted })
            }
            AcquisitionOutcome::Failed { reached, failure } => {
                let reached = reached.map(|step| step.as_str()).unwrap_or("start");
                info!(id = %link.id, reached, "acquisition stopped");
                Ok(LinkResult::Failed(failure.to_string()))
            }
        }
    }
}

fn record(
    registry: &Registry,
    id: &LinkId,
    status: LinkStatus,
    detail: Option<&str>,
) -> Result<bool, HarvestError> {
    match registry.update_status(id, status, detail) {
        Ok(_) => Ok(true),
        Err(err @ (HarvestError::LinkNotFound(_) | HarvestError::InvalidTransition { .. })) => {
            warn!(id = %id, status = %status, error = %err, "record changed during the run; status not written");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
