use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::completion::{CompletionDetector, CompletionOutcome, DirectorySnapshot, DownloadedFile};
use crate::dialog::{Negotiator, NegotiationFailure, await_any};
use crate::error::HarvestError;
use crate::progress::{AcquisitionStep, ProgressEvent, ProgressSink};
use crate::provider::ProviderStrategy;
use crate::resolve::{ManualSignal, ResolveBounds, ResolveOutcome, Resolver, Unresolved};
use crate::wait::CancelToken;

pub struct AcquisitionContext<'a> {
    pub url: &'a str,
    pub download_dir: &'a Path,
    pub bounds: ResolveBounds,
    pub post_navigation: Duration,
    pub dialog_presence: Duration,
    pub detector: &'a CompletionDetector,
    pub completion_timeout: Duration,
    pub cancel: &'a CancelToken,
    pub manual: Option<&'a dyn ManualSignal>,
    pub sink: &'a dyn ProgressSink,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("url is not a {0} link")]
    InvalidUrl(String),

    #[error("download control not found: {}", .0.as_str())]
    PrimaryActionUnresolved(Unresolved),

    #[error("dialog '{}' could not be resolved: {}", .0.kind, .0.reason.as_str())]
    Negotiation(NegotiationFailure),

    #[error("download did not finish in time ({} file(s) still in progress)", in_progress.len())]
    CompletionTimedOut { in_progress: Vec<String> },

    #[error("download did not start")]
    DownloadNotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    Succeeded {
        files: Vec<DownloadedFile>,
        dialogs: usize,
    },
    Failed {
        reached: Option<AcquisitionStep>,
        failure: StepFailure,
    },
}

pub fn acquire(
    strategy: &dyn ProviderStrategy,
    session: &mut dyn BrowserSession,
    ctx: &AcquisitionContext<'_>,
) -> Result<AcquisitionOutcome, HarvestError> {
    let kind = strategy.kind();
    if !strategy.validate(ctx.url) {
        warn!(provider = %kind, url = ctx.url, "url rejected by provider");
        return Ok(AcquisitionOutcome::Failed {
            reached: None,
            failure: StepFailure::InvalidUrl(kind.to_string()),
        });
    }

    ctx.cancel.check()?;
    session.navigate(ctx.url)?;
    step(ctx, AcquisitionStep::Navigated);

    let resolver = Resolver::new(ctx.bounds, ctx.cancel);
    let hints = strategy.post_navigation_wait_hints();
    if !await_any(session, &hints, &resolver, ctx.post_navigation)? {
        debug!(provider = %kind, "no wait hint appeared; resolving anyway");
    }

    let policy = strategy.primary_action_policy();
    let primary = match resolver
        .with_manual(ctx.manual)
        .resolve(session, &policy, None)?
    {
        ResolveOutcome::Found(resolved) => resolved,
        ResolveOutcome::NotFound(reason) => {
            return Ok(AcquisitionOutcome::Failed {
                reached: Some(AcquisitionStep::Navigated),
                failure: StepFailure::PrimaryActionUnresolved(reason),
            });
        }
    };
    debug!(provider = %kind, tier = ?primary.tier, element = %primary.element, "download control resolved");
    step(ctx, AcquisitionStep::PrimaryActionResolved);

    let baseline = DirectorySnapshot::capture(ctx.download_dir)?;
    ctx.cancel.check()?;
    session.click(primary.element)?;
    step(ctx, AcquisitionStep::ActionInvoked);

    let negotiator = Negotiator::new(Resolver::new(ctx.bounds, ctx.cancel), ctx.dialog_presence);
    let report = match negotiator.negotiate(session, &strategy.dialog_kinds())? {
        Ok(report) => report,
        Err(failure) => {
            return Ok(AcquisitionOutcome::Failed {
                reached: Some(AcquisitionStep::ActionInvoked),
                failure: StepFailure::Negotiation(failure),
            });
        }
    };
    step(ctx, AcquisitionStep::DialogsNegotiated);

    let timeout = strategy.completion_timeout(ctx.completion_timeout);
    let outcome = ctx.detector.await_completion_since(
        ctx.download_dir,
        &baseline,
        timeout,
        ctx.cancel,
        ctx.sink,
    )?;
    match outcome {
        CompletionOutcome::Completed { files } => {
            step(ctx, AcquisitionStep::CompletionAwaited);
            Ok(AcquisitionOutcome::Succeeded {
                files,
                dialogs: report.resolved(),
            })
        }
        CompletionOutcome::TimedOut { in_progress } => Ok(AcquisitionOutcome::Failed {
            reached: Some(AcquisitionStep::DialogsNegotiated),
            failure: StepFailure::CompletionTimedOut { in_progress },
        }),
        CompletionOutcome::NotStarted => Ok(AcquisitionOutcome::Failed {
            reached: Some(AcquisitionStep::DialogsNegotiated),
            failure: StepFailure::DownloadNotStarted,
        }),
    }
}

fn step(ctx: &AcquisitionContext<'_>, step: AcquisitionStep) {
    info!(step = step.as_str(), url = ctx.url, "acquisition step");
    ctx.sink.event(ProgressEvent::Step { step });
}
