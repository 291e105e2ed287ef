use crate::dialog::DialogKind;
use crate::domain::ProviderKind;
use crate::locator::Locator;
use crate::provider::{ProviderStrategy, confirmation_dialog};

pub struct TransferNow;

impl ProviderStrategy for TransferNow {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TransferNow
    }

    fn post_navigation_wait_hints(&self) -> Vec<Locator> {
        vec![
            Locator::xpath("//*[contains(text(), 'Download all')]"),
            Locator::xpath("//*[contains(@class, 'download')]"),
        ]
    }

    fn primary_action_locators(&self) -> Vec<Locator> {
        vec![
            Locator::tag_with_text("button", "Download all"),
            Locator::tag_with_text("a", "Download all"),
            Locator::xpath(
                "//button[contains(@class, 'download') and contains(text(), 'Download')]",
            ),
            Locator::xpath("//a[contains(@class, 'download') and contains(text(), 'Download')]"),
            Locator::xpath("//*[contains(text(), 'Download all')]"),
        ]
    }

    // The primary control itself says "Download", so the confirmation labels
    // leave it out to avoid clicking it twice.
    fn dialog_kinds(&self) -> Vec<DialogKind> {
        vec![confirmation_dialog(
            "download confirmation",
            &["Allow", "OK", "Yes", "Continue", "Accept"],
        )]
    }
}
