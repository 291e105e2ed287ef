use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::completion::CompletionDetector;
use crate::error::HarvestError;
use crate::extract::SheetSource;
use crate::resolve::ResolveBounds;

pub const DEFAULT_CONFIG_FILE: &str = "thv.json";
pub const DEFAULT_REGISTRY: &str = "transfer_links.json";
pub const DEFAULT_DOWNLOAD_ROOT: &str = "Downloads";
pub const DEFAULT_LINK_COLUMN: &str = "Link";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub registry: Option<Utf8PathBuf>,
    #[serde(default)]
    pub download_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    #[serde(default)]
    pub interactive_fallback: Option<bool>,
    #[serde(default)]
    pub sheet: Option<SheetEntry>,
    #[serde(default)]
    pub timing: Option<TimingEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SheetEntry {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimingEntry {
    #[serde(default)]
    pub locator_wait_ms: Option<u64>,
    #[serde(default)]
    pub refresh_settle_ms: Option<u64>,
    #[serde(default)]
    pub heuristic_wait_ms: Option<u64>,
    #[serde(default)]
    pub manual_wait_ms: Option<u64>,
    #[serde(default)]
    pub dialog_presence_ms: Option<u64>,
    #[serde(default)]
    pub post_navigation_ms: Option<u64>,
    #[serde(default)]
    pub start_window_ms: Option<u64>,
    #[serde(default)]
    pub completion_timeout_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub pacing_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    pub locator_wait: Duration,
    pub refresh_settle: Duration,
    pub heuristic_wait: Duration,
    pub manual_wait: Duration,
    pub dialog_presence: Duration,
    pub post_navigation: Duration,
    pub start_window: Duration,
    pub completion_timeout: Duration,
    pub poll_interval: Duration,
    pub pacing: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            locator_wait: Duration::from_secs(5),
            refresh_settle: Duration::from_secs(10),
            heuristic_wait: Duration::from_secs(5),
            manual_wait: Duration::from_secs(120),
            dialog_presence: Duration::from_secs(5),
            post_navigation: Duration::from_secs(20),
            start_window: Duration::from_secs(15),
            completion_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            pacing: Duration::from_secs(10),
        }
    }
}

impl Timing {
    pub fn resolve_bounds(&self, interactive: bool) -> ResolveBounds {
        ResolveBounds {
            per_locator: self.locator_wait,
            refresh: self.refresh_settle,
            heuristic: self.heuristic_wait,
            manual: interactive.then_some(self.manual_wait),
            poll_interval: self.poll_interval.min(Duration::from_millis(500)),
        }
    }

    pub fn detector(&self) -> CompletionDetector {
        CompletionDetector::new(self.poll_interval, self.start_window)
    }
}

#[derive(Debug, Clone)]
pub struct SheetConfig {
    pub source: Option<SheetSource>,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub registry: Utf8PathBuf,
    pub download_root: Utf8PathBuf,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub interactive_fallback: bool,
    pub sheet: SheetConfig,
    pub timing: Timing,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let sheet = config.sheet.unwrap_or_default();
        let timing = config.timing.unwrap_or_default();
        let defaults = Timing::default();
        let ms = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        ResolvedConfig {
            registry: config
                .registry
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_REGISTRY)),
            download_root: config
                .download_root
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DOWNLOAD_ROOT)),
            headless: config.headless.unwrap_or(false),
            chrome_executable: config.chrome_executable,
            interactive_fallback: config.interactive_fallback.unwrap_or(false),
            sheet: SheetConfig {
                source: sheet
                    .source
                    .filter(|source| !source.trim().is_empty())
                    .map(|source| SheetSource::parse(&source)),
                column: sheet
                    .column
                    .unwrap_or_else(|| DEFAULT_LINK_COLUMN.to_string()),
            },
            timing: Timing {
                locator_wait: ms(timing.locator_wait_ms, defaults.locator_wait),
                refresh_settle: ms(timing.refresh_settle_ms, defaults.refresh_settle),
                heuristic_wait: ms(timing.heuristic_wait_ms, defaults.heuristic_wait),
                manual_wait: ms(timing.manual_wait_ms, defaults.manual_wait),
                dialog_presence: ms(timing.dialog_presence_ms, defaults.dialog_presence),
                post_navigation: ms(timing.post_navigation_ms, defaults.post_navigation),
                start_window: ms(timing.start_window_ms, defaults.start_window),
                completion_timeout: ms(timing.completion_timeout_ms, defaults.completion_timeout),
                poll_interval: ms(timing.poll_interval_ms, defaults.poll_interval),
                pacing: ms(timing.pacing_ms, defaults.pacing),
            },
        }
    }
}
