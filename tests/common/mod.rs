#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transfer_harvest::browser::{BrowserLauncher, BrowserSession};
use transfer_harvest::config::Timing;
use transfer_harvest::error::HarvestError;
use transfer_harvest::locator::{ElementHandle, Locator};
use transfer_harvest::resolve::ResolveBounds;
use transfer_harvest::wait::CancelToken;

/// One element of a scripted page.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub visible: bool,
    pub enabled: bool,
    pub interactive: bool,
    /// Locators that find this element.
    pub matches: Vec<Locator>,
    /// Index of the containing element, for scoped lookups.
    pub parent: Option<usize>,
    /// Elements made visible when this one is clicked.
    pub reveals: Vec<usize>,
    /// Elements hidden when this one is clicked.
    pub hides: Vec<usize>,
    /// File written into the download directory when clicked.
    pub downloads: Option<String>,
    /// Visibility checks that report the element as detached.
    pub stale_checks: usize,
    /// Clicking raises the session's interrupt and kills the browser.
    pub interrupts: bool,
}

impl FakeElement {
    pub fn button(text: &str) -> Self {
        Self {
            text: text.to_string(),
            visible: true,
            enabled: true,
            interactive: true,
            ..Self::default()
        }
    }

    pub fn container() -> Self {
        Self {
            visible: true,
            enabled: true,
            ..Self::default()
        }
    }

    pub fn matching(mut self, locator: Locator) -> Self {
        self.matches.push(locator);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn inside(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn reveals(mut self, indices: &[usize]) -> Self {
        self.reveals.extend_from_slice(indices);
        self
    }

    pub fn hides(mut self, indices: &[usize]) -> Self {
        self.hides.extend_from_slice(indices);
        self
    }

    pub fn downloads(mut self, file: &str) -> Self {
        self.downloads = Some(file.to_string());
        self
    }

    pub fn stale_for(mut self, checks: usize) -> Self {
        self.stale_checks = checks;
        self
    }

    pub fn interrupting(mut self) -> Self {
        self.interrupts = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub elements: Vec<FakeElement>,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self { elements }
    }
}

/// What happened during a session, shared with the test.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub navigations: Vec<String>,
    pub refreshes: usize,
    pub clicks: Vec<String>,
    pub closed: bool,
}

/// A scripted page. Each reload moves to the next state, if there is one.
pub struct FakeSession {
    states: Vec<FakePage>,
    state: usize,
    page: FakePage,
    generation: u64,
    download_dir: Option<PathBuf>,
    open: Option<Arc<AtomicUsize>>,
    interrupt: Option<CancelToken>,
    pub log: Arc<Mutex<SessionLog>>,
}

const GENERATION_STRIDE: u64 = 10_000;

impl FakeSession {
    pub fn new(states: Vec<FakePage>) -> Self {
        let page = states.first().cloned().unwrap_or_default();
        Self {
            states,
            state: 0,
            page,
            generation: 1,
            download_dir: None,
            open: None,
            interrupt: None,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn single(elements: Vec<FakeElement>) -> Self {
        Self::new(vec![FakePage::new(elements)])
    }

    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle(self.generation * GENERATION_STRIDE + index as u64)
    }

    fn element(&self, handle: ElementHandle) -> Result<(usize, &FakeElement), HarvestError> {
        let generation = handle.0 / GENERATION_STRIDE;
        let index = (handle.0 % GENERATION_STRIDE) as usize;
        if generation != self.generation {
            return Err(HarvestError::StaleElement(handle.to_string()));
        }
        self.page
            .elements
            .get(index)
            .map(|element| (index, element))
            .ok_or_else(|| HarvestError::StaleElement(handle.to_string()))
    }

    fn in_scope(&self, index: usize, scope: Option<ElementHandle>) -> Result<bool, HarvestError> {
        match scope {
            None => Ok(true),
            Some(scope) => {
                let (scope_index, _) = self.element(scope)?;
                Ok(self.page.elements[index].parent == Some(scope_index))
            }
        }
    }
}

impl BrowserSession for FakeSession {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), HarvestError> {
        self.log.lock().unwrap().refreshes += 1;
        if self.state + 1 < self.states.len() {
            self.state += 1;
        }
        self.page = self.states.get(self.state).cloned().unwrap_or_default();
        self.generation += 1;
        Ok(())
    }

    fn find_candidates(
        &mut self,
        locator: &Locator,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        let mut found = Vec::new();
        for (index, element) in self.page.elements.iter().enumerate() {
            if element.matches.contains(locator) && self.in_scope(index, scope)? {
                found.push(self.handle(index));
            }
        }
        Ok(found)
    }

    fn is_visible(&mut self, element: ElementHandle) -> Result<bool, HarvestError> {
        let (index, found) = self.element(element)?;
        let (stale, visible) = (found.stale_checks, found.visible);
        if stale > 0 {
            self.page.elements[index].stale_checks -= 1;
            return Err(HarvestError::StaleElement(element.to_string()));
        }
        Ok(visible)
    }

    fn is_enabled(&mut self, element: ElementHandle) -> Result<bool, HarvestError> {
        Ok(self.element(element)?.1.enabled)
    }

    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError> {
        let clicked = self.element(element)?.1.clone();
        self.log.lock().unwrap().clicks.push(clicked.text.clone());
        if clicked.interrupts {
            if let Some(interrupt) = &self.interrupt {
                interrupt.cancel();
            }
            return Err(HarvestError::Browser("connection closed".to_string()));
        }
        for &shown in &clicked.reveals {
            self.page.elements[shown].visible = true;
        }
        for &hidden in &clicked.hides {
            self.page.elements[hidden].visible = false;
        }
        if let (Some(file), Some(dir)) = (&clicked.downloads, &self.download_dir) {
            fs::write(dir.join(file), b"payload")
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn read_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        Ok(self.element(element)?.1.attrs.get(name).cloned())
    }

    fn text(&mut self, element: ElementHandle) -> Result<String, HarvestError> {
        Ok(self.element(element)?.1.text.clone())
    }

    fn interactive_elements(
        &mut self,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        let mut found = Vec::new();
        for (index, element) in self.page.elements.iter().enumerate() {
            if element.interactive && self.in_scope(index, scope)? {
                found.push(self.handle(index));
            }
        }
        Ok(found)
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        let mut log = self.log.lock().unwrap();
        if !log.closed {
            log.closed = true;
            if let Some(open) = &self.open {
                open.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Hands out one scripted session per launch, in order. Once the script runs
/// out, sessions show an empty page.
#[derive(Default)]
pub struct FakeLauncher {
    script: Mutex<VecDeque<Vec<FakePage>>>,
    pub open: Arc<AtomicUsize>,
    pub launched: AtomicUsize,
    pub logs: Mutex<Vec<Arc<Mutex<SessionLog>>>>,
    /// Launch fails with a browser error for these launch numbers (0-based).
    pub failing_launches: Vec<usize>,
    interrupt: Option<CancelToken>,
}

impl FakeLauncher {
    pub fn new(script: Vec<Vec<FakePage>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, launches: &[usize]) -> Self {
        self.failing_launches = launches.to_vec();
        self
    }

    pub fn interrupting(mut self, cancel: CancelToken) -> Self {
        self.interrupt = Some(cancel);
        self
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
}

impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    fn launch(&self, download_dir: &Path) -> Result<FakeSession, HarvestError> {
        let number = self.launched.fetch_add(1, Ordering::SeqCst);
        if self.failing_launches.contains(&number) {
            return Err(HarvestError::Browser("browser crashed on start".to_string()));
        }
        let states = self.script.lock().unwrap().pop_front().unwrap_or_default();
        let mut session = FakeSession::new(states);
        session.download_dir = Some(download_dir.to_path_buf());
        session.open = Some(Arc::clone(&self.open));
        session.interrupt = self.interrupt.clone();
        self.open.fetch_add(1, Ordering::SeqCst);
        self.logs.lock().unwrap().push(Arc::clone(&session.log));
        Ok(session)
    }

    fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Millisecond bounds so that tests finish quickly.
pub fn fast_bounds() -> ResolveBounds {
    ResolveBounds {
        per_locator: Duration::from_millis(20),
        refresh: Duration::from_millis(200),
        heuristic: Duration::from_millis(20),
        manual: None,
        poll_interval: Duration::from_millis(5),
    }
}

pub fn fast_timing() -> Timing {
    Timing {
        locator_wait: Duration::from_millis(20),
        refresh_settle: Duration::from_millis(200),
        heuristic_wait: Duration::from_millis(20),
        manual_wait: Duration::from_millis(50),
        dialog_presence: Duration::from_millis(30),
        post_navigation: Duration::from_millis(20),
        start_window: Duration::from_millis(150),
        completion_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
        pacing: Duration::from_millis(1),
    }
}
