use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::HarvestError;
use crate::locator::{ElementHandle, Locator};
use crate::resolve::{
    ResolutionPolicy, ResolutionTier, ResolveOutcome, Resolved, Resolver, Unresolved, first_usable,
    unless_stale,
};
use crate::wait::poll_until;

#[derive(Debug, Clone)]
pub enum DialogScope {
    Container(Vec<Locator>),
    Page,
}

#[derive(Debug, Clone)]
pub struct DialogKind {
    pub name: String,
    pub scope: DialogScope,
    pub resolve: ResolutionPolicy,
}

impl DialogKind {
    pub fn contained(name: &str, containers: Vec<Locator>, resolve: ResolutionPolicy) -> Self {
        Self {
            name: name.to_string(),
            scope: DialogScope::Container(containers),
            resolve: resolve.without_refresh(),
        }
    }

    pub fn page_level(name: &str, resolve: ResolutionPolicy) -> Self {
        Self {
            name: name.to_string(),
            scope: DialogScope::Page,
            resolve: resolve.without_refresh(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Resolved { kind: String },
    Absent { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationReport {
    pub outcomes: Vec<DialogOutcome>,
}

impl NegotiationReport {
    pub fn resolved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, DialogOutcome::Resolved { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationFailure {
    pub kind: String,
    pub reason: Unresolved,
}

pub struct Negotiator<'a> {
    pub resolver: Resolver<'a>,
    pub presence: Duration,
}

impl<'a> Negotiator<'a> {
    pub fn new(resolver: Resolver<'a>, presence: Duration) -> Self {
        Self { resolver, presence }
    }

    pub fn negotiate(
        &self,
        session: &mut dyn BrowserSession,
        kinds: &[DialogKind],
    ) -> Result<Result<NegotiationReport, NegotiationFailure>, HarvestError> {
        let mut report = NegotiationReport::default();
        let mut lingering: Vec<ElementHandle> = Vec::new();
        for kind in kinds {
            let (container, outcome) = match &kind.scope {
                DialogScope::Container(containers) => {
                    let Some(container) = self.await_container(session, containers, &lingering)?
                    else {
                        debug!(dialog = %kind.name, "dialog did not appear");
                        report.outcomes.push(DialogOutcome::Absent {
                            kind: kind.name.clone(),
                        });
                        continue;
                    };
                    let outcome = self.resolver.resolve(session, &kind.resolve, Some(container))?;
                    (Some(container), outcome)
                }
                DialogScope::Page => match self.await_control(session, &kind.resolve)? {
                    Some(resolved) => (None, ResolveOutcome::Found(resolved)),
                    None => {
                        debug!(dialog = %kind.name, "dialog did not appear");
                        report.outcomes.push(DialogOutcome::Absent {
                            kind: kind.name.clone(),
                        });
                        continue;
                    }
                },
            };

            match outcome {
                ResolveOutcome::Found(resolved) => {
                    session.click(resolved.element)?;
                    info!(dialog = %kind.name, tier = ?resolved.tier, "dialog resolved");
                    report.outcomes.push(DialogOutcome::Resolved {
                        kind: kind.name.clone(),
                    });
                    if let Some(container) = container {
                        if !self.await_dismissed(session, container)? {
                            debug!(dialog = %kind.name, %container, "dialog still shown after resolving");
                            lingering.push(container);
                        }
                    }
                }
                ResolveOutcome::NotFound(reason) => {
                    warn!(dialog = %kind.name, reason = reason.as_str(), "dialog left unresolved");
                    return Ok(Err(NegotiationFailure {
                        kind: kind.name.clone(),
                        reason,
                    }));
                }
            }
        }
        Ok(Ok(report))
    }

    fn await_control(
        &self,
        session: &mut dyn BrowserSession,
        policy: &ResolutionPolicy,
    ) -> Result<Option<Resolved>, HarvestError> {
        poll_until(
            self.presence,
            self.resolver.bounds.poll_interval,
            self.resolver.cancel,
            || {
                for locator in &policy.locators {
                    let candidates = unless_stale(session.find_candidates(locator, None), Vec::new())?;
                    if let Some(element) =
                        first_usable(&mut *session, &candidates, &policy.excluded)?
                    {
                        return Ok(Some(Resolved {
                            element,
                            tier: ResolutionTier::Direct,
                            locator: Some(locator.clone()),
                        }));
                    }
                }
                Ok(None)
            },
        )
    }

    fn await_container(
        &self,
        session: &mut dyn BrowserSession,
        containers: &[Locator],
        skip: &[ElementHandle],
    ) -> Result<Option<ElementHandle>, HarvestError> {
        poll_until(
            self.presence,
            self.resolver.bounds.poll_interval,
            self.resolver.cancel,
            || {
                for locator in containers {
                    for element in unless_stale(session.find_candidates(locator, None), Vec::new())? {
                        if skip.contains(&element) {
                            continue;
                        }
                        if unless_stale(session.is_visible(element), false)? {
                            return Ok(Some(element));
                        }
                    }
                }
                Ok(None)
            },
        )
    }

    fn await_dismissed(
        &self,
        session: &mut dyn BrowserSession,
        container: ElementHandle,
    ) -> Result<bool, HarvestError> {
        let gone = poll_until(
            self.presence,
            self.resolver.bounds.poll_interval,
            self.resolver.cancel,
            || match session.is_visible(container) {
                Ok(true) => Ok(None),
                Ok(false) | Err(HarvestError::StaleElement(_)) => Ok(Some(())),
                Err(err) => Err(err),
            },
        )?;
        Ok(gone.is_some())
    }
}

pub fn await_any(
    session: &mut dyn BrowserSession,
    hints: &[Locator],
    resolver: &Resolver<'_>,
    bound: Duration,
) -> Result<bool, HarvestError> {
    if hints.is_empty() {
        return Ok(true);
    }
    let hit = poll_until(bound, resolver.bounds.poll_interval, resolver.cancel, || {
        for locator in hints {
            for element in unless_stale(session.find_candidates(locator, None), Vec::new())? {
                if unless_stale(session.is_visible(element), false)? {
                    return Ok(Some(()));
                }
            }
        }
        Ok(None)
    })?;
    Ok(hit.is_some())
}
