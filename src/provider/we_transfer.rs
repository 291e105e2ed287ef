use std::time::Duration;

use crate::dialog::DialogKind;
use crate::domain::ProviderKind;
use crate::locator::Locator;
use crate::provider::{ProviderStrategy, confirmation_dialog};

pub struct WeTransfer;

impl ProviderStrategy for WeTransfer {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WeTransfer
    }

    fn post_navigation_wait_hints(&self) -> Vec<Locator> {
        vec![
            Locator::css("[data-testid='download-button']"),
            Locator::css("button[class*='download']"),
            Locator::tag_with_text("button", "Download"),
        ]
    }

    fn primary_action_locators(&self) -> Vec<Locator> {
        vec![
            Locator::xpath(
                "//button[contains(text(), 'Download') and not(contains(text(), 'Scan'))]",
            ),
            Locator::xpath("//a[contains(text(), 'Download') and not(contains(text(), 'Scan'))]"),
            Locator::css("button[data-testid='download-button']"),
            Locator::css("button.button--download"),
        ]
    }

    fn excluded_keywords(&self) -> Vec<&'static str> {
        vec!["scan"]
    }

    fn completion_timeout(&self, configured: Duration) -> Duration {
        configured.saturating_mul(2)
    }

    fn dialog_kinds(&self) -> Vec<DialogKind> {
        vec![confirmation_dialog(
            "download confirmation",
            &["Allow", "OK", "Yes", "Continue", "Accept"],
        )]
    }
}
