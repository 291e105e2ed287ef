use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::config::ResolvedConfig;
use crate::error::HarvestError;
use crate::locator::{ElementHandle, Locator, LocatorKind};

const HANDLE_ATTRIBUTE: &str = "data-thv-handle";
const INTERACTIVE_SELECTOR: &str = "button, a, [role='button'], [role='menuitem'], \
     input[type='button'], input[type='submit']";

pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("THV_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    headless: bool,
    navigation_timeout: Duration,
    open: Arc<AtomicUsize>,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>, headless: bool) -> Self {
        Self {
            executable,
            headless,
            navigation_timeout: Duration::from_secs(60),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.chrome_executable.clone(), config.headless)
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    fn launch(&self, download_dir: &Path) -> Result<ChromiumSession, HarvestError> {
        let executable = self
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or(HarvestError::BrowserNotFound)?;
        let download_dir = download_dir
            .canonicalize()
            .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", download_dir.display())))?;
        let profile = tempfile::Builder::new()
            .prefix("thv-profile")
            .tempdir()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|err| HarvestError::Browser(format!("failed to start runtime: {err}")))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .user_data_dir(profile.path())
            .arg("--disable-notifications")
            .arg("--disable-blink-features=AutomationControlled");
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| HarvestError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, page, handler) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| HarvestError::Browser(format!("failed to launch Chromium: {e}")))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        debug!(error = %err, "devtools handler event failed");
                    }
                }
            });

            let behavior = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(download_dir.to_string_lossy().into_owned())
                .build()
                .map_err(HarvestError::Browser)?;
            browser
                .execute(behavior)
                .await
                .map_err(|e| HarvestError::Browser(format!("failed to set download directory: {e}")))?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| HarvestError::Browser(format!("failed to create new page: {e}")))?;
            Ok::<_, HarvestError>((browser, page, handler))
        })?;

        self.open.fetch_add(1, Ordering::Relaxed);
        info!(dir = %download_dir.display(), headless = self.headless, "browser session started");
        Ok(ChromiumSession {
            page,
            browser,
            handler,
            open: Arc::clone(&self.open),
            closed: false,
            next_handle: 1,
            navigation_timeout: self.navigation_timeout,
            _profile: profile,
            runtime,
        })
    }

    fn open_sessions(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

pub struct ChromiumSession {
    page: Page,
    browser: Browser,
    handler: JoinHandle<()>,
    open: Arc<AtomicUsize>,
    closed: bool,
    next_handle: u64,
    navigation_timeout: Duration,
    _profile: TempDir,
    // Dropped last: the browser and page still talk to it on drop.
    runtime: Runtime,
}

#[derive(Deserialize)]
struct FindResult {
    handles: Option<Vec<u64>>,
    next: u64,
}

impl ChromiumSession {
    fn evaluate<T: DeserializeOwned>(&self, script: String) -> Result<T, HarvestError> {
        self.runtime.block_on(async {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| HarvestError::Browser(format!("JS execution failed: {e}")))?;
            result
                .into_value::<T>()
                .map_err(|e| HarvestError::Browser(format!("failed to convert JS result: {e:?}")))
        })
    }

    fn on_element(&self, element: ElementHandle, body: &str) -> Result<Value, HarvestError> {
        let script = format!(
            "(() => {{ const el = document.querySelector('[{HANDLE_ATTRIBUTE}=\"{id}\"]'); \
             if (!el) return {{ stale: true }}; \
             return {{ stale: false, value: ({body}) }}; }})()",
            id = element.0
        );
        let mut result: Value = self.evaluate(script)?;
        if result.get("stale").and_then(Value::as_bool).unwrap_or(true) {
            return Err(HarvestError::StaleElement(element.to_string()));
        }
        Ok(result
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    fn find(
        &mut self,
        kind: LocatorKind,
        query: &str,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        let query = match (kind, scope) {
            // Absolute paths ignore the context node; anchor them to the scope.
            (LocatorKind::XPath, Some(_)) if query.starts_with('/') => format!(".{query}"),
            _ => query.to_string(),
        };
        let query = serde_json::to_string(&query)
            .map_err(|err| HarvestError::Browser(err.to_string()))?;
        let root = match scope {
            Some(handle) => format!(
                "document.querySelector('[{HANDLE_ATTRIBUTE}=\"{}\"]')",
                handle.0
            ),
            None => "document".to_string(),
        };
        let collect = match kind {
            LocatorKind::Css => format!("found = Array.from(root.querySelectorAll({query}));"),
            LocatorKind::XPath => format!(
                "const snap = document.evaluate({query}, root, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 for (let i = 0; i < snap.snapshotLength; i++) {{ \
                 const node = snap.snapshotItem(i); \
                 if (node.nodeType === 1) found.push(node); }}"
            ),
        };
        let script = format!(
            "(() => {{ const root = {root}; let next = {next}; \
             if (!root) return {{ handles: null, next }}; \
             let found = []; {collect} \
             const handles = found.map(el => {{ \
             if (!el.hasAttribute('{HANDLE_ATTRIBUTE}')) el.setAttribute('{HANDLE_ATTRIBUTE}', String(next++)); \
             return Number(el.getAttribute('{HANDLE_ATTRIBUTE}')); }}); \
             return {{ handles, next }}; }})()",
            next = self.next_handle
        );

        let result: FindResult = self.evaluate(script)?;
        self.next_handle = self.next_handle.max(result.next);
        match result.handles {
            Some(handles) => Ok(handles.into_iter().map(ElementHandle).collect()),
            None => Err(HarvestError::StaleElement(
                scope.map(|handle| handle.to_string()).unwrap_or_default(),
            )),
        }
    }

    fn navigation<F>(&self, what: &str, future: F) -> Result<(), HarvestError>
    where
        F: std::future::Future<Output = chromiumoxide::error::Result<()>>,
    {
        let timeout = self.navigation_timeout;
        let page = &self.page;
        self.runtime.block_on(async {
            let settled = async {
                future.await?;
                if let Err(e) = page.wait_for_navigation().await {
                    debug!(error = %e, "navigation did not settle");
                }
                Ok::<_, chromiumoxide::error::CdpError>(())
            };
            match tokio::time::timeout(timeout, settled).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(HarvestError::Browser(format!("{what} failed: {e}"))),
                Err(_) => Err(HarvestError::Browser(format!(
                    "{what} timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        })
    }
}

impl BrowserSession for ChromiumSession {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        debug!(url, "navigating");
        let page = self.page.clone();
        let url = url.to_string();
        self.navigation("navigation", async move { page.goto(url).await.map(|_| ()) })
    }

    fn refresh(&mut self) -> Result<(), HarvestError> {
        debug!("reloading page");
        let page = self.page.clone();
        self.navigation("reload", async move { page.reload().await.map(|_| ()) })
    }

    fn find_candidates(
        &mut self,
        locator: &Locator,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        self.find(locator.kind, &locator.query, scope)
    }

    fn is_visible(&mut self, element: ElementHandle) -> Result<bool, HarvestError> {
        let value = self.on_element(
            element,
            "(() => { const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; })()",
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn is_enabled(&mut self, element: ElementHandle) -> Result<bool, HarvestError> {
        let value = self.on_element(
            element,
            "!el.disabled && el.getAttribute('aria-disabled') !== 'true'",
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError> {
        debug!(%element, "clicking");
        self.on_element(
            element,
            "(() => { el.scrollIntoView({ block: 'center' }); el.click(); return true; })()",
        )?;
        Ok(())
    }

    fn read_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let name = serde_json::to_string(name)
            .map_err(|err| HarvestError::Browser(err.to_string()))?;
        let value = self.on_element(element, &format!("el.getAttribute({name})"))?;
        Ok(value.as_str().map(str::to_string))
    }

    fn text(&mut self, element: ElementHandle) -> Result<String, HarvestError> {
        let value = self.on_element(element, "(el.innerText || el.textContent || '').trim()")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn interactive_elements(
        &mut self,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        self.find(LocatorKind::Css, INTERACTIVE_SELECTOR, scope)
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.open.fetch_sub(1, Ordering::Relaxed);
        let browser = &mut self.browser;
        let result = self.runtime.block_on(async {
            browser
                .close()
                .await
                .map_err(|e| HarvestError::Browser(format!("failed to close browser: {e}")))?;
            let _ = browser.wait().await;
            Ok(())
        });
        self.handler.abort();
        info!("browser session closed");
        result
    }
}
