use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::domain::{LinkId, LinkStatus, ProviderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionStep {
    Navigated,
    PrimaryActionResolved,
    ActionInvoked,
    DialogsNegotiated,
    CompletionAwaited,
}

impl AcquisitionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionStep::Navigated => "navigated",
            AcquisitionStep::PrimaryActionResolved => "primary-action-resolved",
            AcquisitionStep::ActionInvoked => "action-invoked",
            AcquisitionStep::DialogsNegotiated => "dialogs-negotiated",
            AcquisitionStep::CompletionAwaited => "completion-awaited",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    LinkStarted {
        id: LinkId,
        index: usize,
        total: usize,
        kind: ProviderKind,
        url: String,
    },
    Step {
        step: AcquisitionStep,
    },
    Download {
        file: String,
        bytes: u64,
    },
    Extracted {
        entries: usize,
    },
    LinkFinished {
        id: LinkId,
        status: LinkStatus,
        detail: Option<String>,
    },
    Pacing {
        #[serde(rename = "delay_ms", serialize_with = "millis")]
        delay: Duration,
    },
}

fn millis<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}
