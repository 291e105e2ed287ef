use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::HarvestError;
use crate::locator::{ElementHandle, Locator};
use crate::wait::{CancelToken, poll_until};

#[derive(Debug, Clone)]
pub struct ResolutionPolicy {
    pub target: String,
    pub locators: Vec<Locator>,
    pub keywords: Vec<String>,
    pub excluded: Vec<String>,
    pub allow_refresh: bool,
}

impl ResolutionPolicy {
    pub fn new(target: impl Into<String>, locators: Vec<Locator>) -> Self {
        Self {
            target: target.into(),
            locators,
            keywords: Vec::new(),
            excluded: Vec::new(),
            allow_refresh: true,
        }
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|word| word.to_string()).collect();
        self
    }

    pub fn excluding(mut self, excluded: &[&str]) -> Self {
        self.excluded = excluded.iter().map(|word| word.to_string()).collect();
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.allow_refresh = false;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveBounds {
    pub per_locator: Duration,
    pub refresh: Duration,
    pub heuristic: Duration,
    pub manual: Option<Duration>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Direct,
    AfterRefresh,
    Heuristic,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub element: ElementHandle,
    pub tier: ResolutionTier,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    NoMatch,
    NotInteractable,
}

impl Unresolved {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unresolved::NoMatch => "no locator matched",
            Unresolved::NotInteractable => "matched but not interactable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(Resolved),
    NotFound(Unresolved),
}

pub trait ManualSignal {
    fn request(&self, prompt: &str, timeout: Duration) -> bool;
}

pub struct StdinSignal;

impl ManualSignal for StdinSignal {
    fn request(&self, prompt: &str, timeout: Duration) -> bool {
        static LINES: OnceLock<Mutex<Receiver<String>>> = OnceLock::new();
        let lines = LINES.get_or_init(|| {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
            Mutex::new(rx)
        });

        let mut stderr = io::stderr();
        let _ = writeln!(
            stderr,
            "{prompt}\nPress Enter within {}s to continue, or wait to skip.",
            timeout.as_secs()
        );
        let _ = stderr.flush();

        let Ok(rx) = lines.lock() else {
            return false;
        };
        while rx.try_recv().is_ok() {}
        match rx.recv_timeout(timeout) {
            Ok(_) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

pub struct Resolver<'a> {
    pub bounds: ResolveBounds,
    pub cancel: &'a CancelToken,
    pub manual: Option<&'a dyn ManualSignal>,
}

impl<'a> Resolver<'a> {
    pub fn new(bounds: ResolveBounds, cancel: &'a CancelToken) -> Self {
        Self {
            bounds,
            cancel,
            manual: None,
        }
    }

    pub fn with_manual(mut self, manual: Option<&'a dyn ManualSignal>) -> Self {
        self.manual = manual;
        self
    }

    pub fn resolve(
        &self,
        session: &mut dyn BrowserSession,
        policy: &ResolutionPolicy,
        scope: Option<ElementHandle>,
    ) -> Result<ResolveOutcome, HarvestError> {
        let mut matched_any = false;

        let pass = self.ordered_pass(session, policy, scope, None)?;
        matched_any |= pass.matched;
        if let Some((element, locator)) = pass.found {
            return Ok(found(element, ResolutionTier::Direct, Some(locator)));
        }

        if policy.allow_refresh {
            info!(what = %policy.target, "no locator matched; reloading page");
            session.refresh()?;
            let deadline = Instant::now() + self.bounds.refresh;
            let pass = self.ordered_pass(session, policy, scope, Some(deadline))?;
            matched_any |= pass.matched;
            if let Some((element, locator)) = pass.found {
                return Ok(found(element, ResolutionTier::AfterRefresh, Some(locator)));
            }
        }

        if !policy.keywords.is_empty() {
            info!(what = %policy.target, keywords = ?policy.keywords, "trying keyword scan");
            if let Some(element) = self.keyword_scan(session, policy, scope)? {
                return Ok(found(element, ResolutionTier::Heuristic, None));
            }
        }

        if let (Some(manual), Some(timeout)) = (self.manual, self.bounds.manual) {
            let prompt = format!(
                "Could not locate '{}' automatically. Make it visible in the browser window.",
                policy.target
            );
            if manual.request(&prompt, timeout) {
                self.cancel.check()?;
                let pass = self.ordered_pass(session, policy, scope, None)?;
                matched_any |= pass.matched;
                if let Some((element, locator)) = pass.found {
                    return Ok(found(element, ResolutionTier::Manual, Some(locator)));
                }
            } else {
                warn!(what = %policy.target, "no manual signal before timeout");
            }
        }

        let reason = if matched_any {
            Unresolved::NotInteractable
        } else {
            Unresolved::NoMatch
        };
        warn!(what = %policy.target, reason = reason.as_str(), "resolution failed");
        Ok(ResolveOutcome::NotFound(reason))
    }

    fn ordered_pass(
        &self,
        session: &mut dyn BrowserSession,
        policy: &ResolutionPolicy,
        scope: Option<ElementHandle>,
        deadline: Option<Instant>,
    ) -> Result<PassResult, HarvestError> {
        let mut matched = false;
        for locator in &policy.locators {
            let mut bound = self.bounds.per_locator;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                bound = bound.min(remaining);
            }

            let hit = poll_until(bound, self.bounds.poll_interval, self.cancel, || {
                let candidates = unless_stale(session.find_candidates(locator, scope), Vec::new())?;
                if !candidates.is_empty() {
                    matched = true;
                }
                first_usable(&mut *session, &candidates, &policy.excluded)
            })?;
            if let Some(element) = hit {
                debug!(what = %policy.target, %locator, %element, "locator resolved");
                return Ok(PassResult {
                    found: Some((element, locator.clone())),
                    matched: true,
                });
            }
            debug!(what = %policy.target, %locator, "locator did not resolve");
        }
        Ok(PassResult {
            found: None,
            matched,
        })
    }

    fn keyword_scan(
        &self,
        session: &mut dyn BrowserSession,
        policy: &ResolutionPolicy,
        scope: Option<ElementHandle>,
    ) -> Result<Option<ElementHandle>, HarvestError> {
        let keywords: Vec<String> = policy.keywords.iter().map(|k| k.to_lowercase()).collect();
        poll_until(self.bounds.heuristic, self.bounds.poll_interval, self.cancel, || {
            for element in unless_stale(session.interactive_elements(scope), Vec::new())? {
                let Some(label) = unless_stale(describe(&mut *session, element).map(Some), None)?
                else {
                    continue;
                };
                if !keywords.iter().any(|keyword| label.contains(keyword.as_str())) {
                    continue;
                }
                if is_excluded(&label, &policy.excluded) {
                    continue;
                }
                if is_interactable(&mut *session, element)? {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        })
    }
}

struct PassResult {
    found: Option<(ElementHandle, Locator)>,
    matched: bool,
}

fn found(element: ElementHandle, tier: ResolutionTier, locator: Option<Locator>) -> ResolveOutcome {
    ResolveOutcome::Found(Resolved {
        element,
        tier,
        locator,
    })
}

pub(crate) fn first_usable(
    session: &mut dyn BrowserSession,
    candidates: &[ElementHandle],
    excluded: &[String],
) -> Result<Option<ElementHandle>, HarvestError> {
    for &element in candidates {
        if !excluded.is_empty() {
            match unless_stale(describe(session, element).map(Some), None)? {
                Some(label) if !is_excluded(&label, excluded) => {}
                _ => continue,
            }
        }
        if is_interactable(session, element)? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

pub fn is_interactable(
    session: &mut dyn BrowserSession,
    element: ElementHandle,
) -> Result<bool, HarvestError> {
    unless_stale(visible_and_enabled(session, element), false)
}

fn visible_and_enabled(
    session: &mut dyn BrowserSession,
    element: ElementHandle,
) -> Result<bool, HarvestError> {
    Ok(session.is_visible(element)? && session.is_enabled(element)?)
}

pub(crate) fn unless_stale<T>(result: Result<T, HarvestError>, fallback: T) -> Result<T, HarvestError> {
    match result {
        Err(HarvestError::StaleElement(handle)) => {
            debug!(%handle, "element went stale");
            Ok(fallback)
        }
        other => other,
    }
}

fn describe(session: &mut dyn BrowserSession, element: ElementHandle) -> Result<String, HarvestError> {
    let mut parts = vec![session.text(element)?];
    for name in ["aria-label", "title"] {
        if let Some(value) = session.read_attribute(element, name)? {
            parts.push(value);
        }
    }
    Ok(parts.join(" ").to_lowercase())
}

fn is_excluded(label: &str, excluded: &[String]) -> bool {
    excluded
        .iter()
        .any(|word| label.contains(word.to_lowercase().as_str()))
}
