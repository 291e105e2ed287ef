mod common;

use std::cell::Cell;
use std::time::Duration;

use assert_matches::assert_matches;
use transfer_harvest::browser::BrowserSession;
use transfer_harvest::locator::Locator;
use transfer_harvest::resolve::{
    ManualSignal, ResolutionPolicy, ResolutionTier, ResolveOutcome, Resolver, Unresolved,
    is_interactable,
};
use transfer_harvest::wait::CancelToken;

use common::{FakeElement, FakePage, FakeSession, fast_bounds};

fn five_locators() -> Vec<Locator> {
    (1..=5)
        .map(|n| Locator::css(format!("#download-{n}")))
        .collect()
}

#[test]
fn refresh_tier_resolves_second_locator() {
    let locators = five_locators();
    let before = FakePage::new(vec![FakeElement::button("Share")]);
    let after = FakePage::new(vec![
        FakeElement::button("Share"),
        FakeElement::button("Download").matching(locators[1].clone()),
    ]);
    let mut session = FakeSession::new(vec![before, after]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", locators.clone());

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(resolved.tier, ResolutionTier::AfterRefresh);
    assert_eq!(resolved.locator.as_ref(), Some(&locators[1]));
    assert!(is_interactable(&mut session, resolved.element).unwrap());
    assert_eq!(session.log.lock().unwrap().refreshes, 1);
}

#[test]
fn first_matching_locator_wins_without_refresh() {
    let locators = five_locators();
    let mut session = FakeSession::single(vec![
        FakeElement::button("Later").matching(locators[3].clone()),
        FakeElement::button("Earlier").matching(locators[0].clone()),
    ]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", locators);

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(resolved.tier, ResolutionTier::Direct);
    assert_eq!(session.text(resolved.element).unwrap(), "Earlier");
    assert_eq!(session.log.lock().unwrap().refreshes, 0);
}

#[test]
fn matched_but_disabled_is_not_interactable() {
    let locators = five_locators();
    let page = FakePage::new(vec![
        FakeElement::button("Download")
            .matching(locators[0].clone())
            .disabled(),
    ]);
    let mut session = FakeSession::new(vec![page.clone(), page]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", locators);

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    assert_matches!(outcome, ResolveOutcome::NotFound(Unresolved::NotInteractable));
}

#[test]
fn nothing_on_page_is_no_match() {
    let mut session = FakeSession::single(vec![FakeElement::button("Share")]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", five_locators());

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    assert_matches!(outcome, ResolveOutcome::NotFound(Unresolved::NoMatch));
}

#[test]
fn keyword_scan_matches_label_case_insensitively() {
    let mut session = FakeSession::single(vec![
        FakeElement::button("Share"),
        FakeElement::button("").attr("aria-label", "DOWNLOAD files"),
    ]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", five_locators()).keywords(&["download"]);

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(resolved.tier, ResolutionTier::Heuristic);
    assert!(resolved.locator.is_none());
}

#[test]
fn excluded_keyword_is_never_chosen() {
    let locator = Locator::css("button.download");
    let mut session = FakeSession::single(vec![
        FakeElement::button("Scan and download").matching(locator.clone()),
        FakeElement::button("Download").matching(locator.clone()),
    ]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", vec![locator]).excluding(&["scan"]);

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(session.text(resolved.element).unwrap(), "Download");
}

struct CountingSignal {
    calls: Cell<usize>,
    answer: bool,
}

impl ManualSignal for CountingSignal {
    fn request(&self, _prompt: &str, _timeout: Duration) -> bool {
        self.calls.set(self.calls.get() + 1);
        self.answer
    }
}

#[test]
fn manual_tier_runs_only_when_configured() {
    let signal = CountingSignal {
        calls: Cell::new(0),
        answer: false,
    };
    let cancel = CancelToken::new();
    let policy = ResolutionPolicy::new("download", five_locators()).without_refresh();

    let mut session = FakeSession::single(vec![]);
    let resolver = Resolver::new(fast_bounds(), &cancel).with_manual(Some(&signal as &dyn ManualSignal));
    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    assert_matches!(outcome, ResolveOutcome::NotFound(Unresolved::NoMatch));
    assert_eq!(signal.calls.get(), 0);

    let mut bounds = fast_bounds();
    bounds.manual = Some(Duration::from_millis(10));
    let resolver = Resolver::new(bounds, &cancel).with_manual(Some(&signal as &dyn ManualSignal));
    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    assert_matches!(outcome, ResolveOutcome::NotFound(Unresolved::NoMatch));
    assert_eq!(signal.calls.get(), 1);
}

#[test]
fn scoped_lookup_ignores_elements_outside_scope() {
    let dialog = Locator::css("[role='dialog']");
    let locator = Locator::css("button");
    let mut session = FakeSession::single(vec![
        FakeElement::container().matching(dialog.clone()),
        FakeElement::button("Outside").matching(locator.clone()),
        FakeElement::button("Inside").matching(locator.clone()).inside(0),
    ]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("button", vec![locator]).without_refresh();

    let scope = session.find_candidates(&dialog, None).unwrap();
    assert_eq!(scope.len(), 1);
    let outcome = resolver.resolve(&mut session, &policy, Some(scope[0])).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(session.text(resolved.element).unwrap(), "Inside");
}

#[test]
fn candidate_going_stale_is_polled_again() {
    let locators = five_locators();
    let mut session = FakeSession::single(vec![
        FakeElement::button("Download")
            .matching(locators[0].clone())
            .stale_for(1),
    ]);
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);
    let policy = ResolutionPolicy::new("download", locators);

    let outcome = resolver.resolve(&mut session, &policy, None).unwrap();
    let resolved = assert_matches!(outcome, ResolveOutcome::Found(resolved) => resolved);
    assert_eq!(resolved.tier, ResolutionTier::Direct);
    assert_eq!(session.log.lock().unwrap().refreshes, 0);
}

#[test]
fn stale_candidate_is_not_interactable() {
    let mut session = FakeSession::single(vec![FakeElement::button("Download").stale_for(1)]);
    let element = session.interactive_elements(None).unwrap()[0];
    assert!(!is_interactable(&mut session, element).unwrap());
    assert!(is_interactable(&mut session, element).unwrap());
}
