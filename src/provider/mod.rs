pub mod acquire;
pub mod transfer_now;
pub mod video_host;
pub mod we_transfer;

use std::time::Duration;

use crate::dialog::DialogKind;
use crate::domain::ProviderKind;
use crate::locator::Locator;
use crate::resolve::ResolutionPolicy;

pub use acquire::{AcquisitionContext, AcquisitionOutcome, StepFailure, acquire};
pub use transfer_now::TransferNow;
pub use video_host::VideoHost;
pub use we_transfer::WeTransfer;

pub trait ProviderStrategy {
    fn kind(&self) -> ProviderKind;

    fn validate(&self, url: &str) -> bool {
        ProviderKind::classify(url) == Some(self.kind())
    }

    fn post_navigation_wait_hints(&self) -> Vec<Locator>;

    fn primary_action_locators(&self) -> Vec<Locator>;

    fn primary_action_keywords(&self) -> Vec<&'static str> {
        vec!["download"]
    }

    fn excluded_keywords(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn dialog_kinds(&self) -> Vec<DialogKind>;

    fn completion_timeout(&self, configured: Duration) -> Duration {
        configured
    }

    fn primary_action_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::new(
            format!("{} download control", self.kind()),
            self.primary_action_locators(),
        )
        .keywords(&self.primary_action_keywords())
        .excluding(&self.excluded_keywords())
    }
}

pub struct ProviderSet {
    strategies: Vec<Box<dyn ProviderStrategy>>,
}

impl ProviderSet {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn standard() -> Self {
        Self::empty()
            .with(Box::new(VideoHost))
            .with(Box::new(TransferNow))
            .with(Box::new(WeTransfer))
    }

    pub fn with(mut self, strategy: Box<dyn ProviderStrategy>) -> Self {
        self.strategies.retain(|existing| existing.kind() != strategy.kind());
        self.strategies.push(strategy);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&dyn ProviderStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.kind() == kind)
            .map(|strategy| strategy.as_ref())
    }
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn confirmation_dialog(name: &str, labels: &[&str]) -> DialogKind {
    let mut locators = Vec::new();
    for label in labels {
        locators.push(Locator::tag_with_text("button", label));
    }
    for label in labels {
        locators.push(Locator::aria_label("button", label));
    }
    DialogKind::page_level(name, ResolutionPolicy::new(name, locators))
}
