use crate::dialog::DialogKind;
use crate::domain::ProviderKind;
use crate::locator::Locator;
use crate::provider::ProviderStrategy;
use crate::resolve::ResolutionPolicy;

const DIALOG_CONTAINERS: [&str; 3] = ["[role='dialog']", ".ms-Dialog", ".od-Dialog"];

pub struct VideoHost;

impl ProviderStrategy for VideoHost {
    fn kind(&self) -> ProviderKind {
        ProviderKind::VideoHost
    }

    fn post_navigation_wait_hints(&self) -> Vec<Locator> {
        vec![
            Locator::css("[data-automationid='downloadButton']"),
            Locator::css("button[aria-label*='Download']"),
            Locator::css(".ms-Button[aria-label*='Download']"),
        ]
    }

    fn primary_action_locators(&self) -> Vec<Locator> {
        vec![
            Locator::css("button[data-automationid='downloadButton']"),
            Locator::css("[data-automationid='downloadButton']"),
            Locator::css("button[aria-label*='Download']"),
            Locator::css("button[title*='Download']"),
            Locator::css(".ms-Button[aria-label*='Download']"),
            Locator::xpath("//div[@data-automationid='DownloadCommand']"),
            Locator::xpath("//*[@title='Download']"),
            Locator::xpath("//i[contains(@class, 'ms-Icon--Download')]/.."),
            Locator::tag_with_text("button", "Download"),
        ]
    }

    fn dialog_kinds(&self) -> Vec<DialogKind> {
        let containers = || {
            DIALOG_CONTAINERS
                .iter()
                .map(|query| Locator::css(*query))
                .collect::<Vec<_>>()
        };
        vec![
            DialogKind::contained(
                "video-only download warning",
                containers(),
                ResolutionPolicy::new(
                    "download video button",
                    vec![
                        Locator::css("button[aria-label='Download video']"),
                        Locator::css("button[data-automationid='primaryButton']"),
                        Locator::css(".ms-Button--primary"),
                    ],
                )
                .keywords(&["download"]),
            ),
            DialogKind::contained(
                "download permission",
                containers(),
                ResolutionPolicy::new(
                    "allow button",
                    vec![
                        Locator::tag_with_text("button", "Allow"),
                        Locator::tag_with_text("button", "OK"),
                        Locator::tag_with_text("button", "Yes"),
                        Locator::css("button[data-automationid='primaryButton']"),
                        Locator::css(".ms-Button--primary"),
                    ],
                )
                .keywords(&["allow", "ok", "yes"]),
            ),
        ]
    }
}
