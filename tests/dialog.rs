mod common;

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use transfer_harvest::dialog::{DialogKind, DialogOutcome, Negotiator, await_any};
use transfer_harvest::locator::Locator;
use transfer_harvest::resolve::{ResolutionPolicy, Resolver, Unresolved};
use transfer_harvest::wait::CancelToken;

use common::{FakeElement, FakeSession, fast_bounds};

fn container() -> Locator {
    Locator::css("[role='dialog']")
}

fn warning_kind() -> DialogKind {
    DialogKind::contained(
        "warning",
        vec![Locator::css(".warning-dialog")],
        ResolutionPolicy::new("continue", vec![Locator::css("button.continue")]),
    )
}

fn permission_kind() -> DialogKind {
    DialogKind::contained(
        "permission",
        vec![container()],
        ResolutionPolicy::new("allow", vec![Locator::tag_with_text("button", "Allow")]),
    )
}

#[test]
fn absent_kind_does_not_block_present_one() {
    let mut session = FakeSession::single(vec![
        FakeElement::container().matching(container()),
        FakeElement::button("Allow")
            .matching(Locator::tag_with_text("button", "Allow"))
            .inside(0)
            .hides(&[0]),
    ]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(40));

    let started = Instant::now();
    let report = negotiator
        .negotiate(&mut session, &[warning_kind(), permission_kind()])
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(
        report.outcomes,
        vec![
            DialogOutcome::Absent {
                kind: "warning".to_string()
            },
            DialogOutcome::Resolved {
                kind: "permission".to_string()
            },
        ]
    );
    assert_eq!(report.resolved(), 1);
    assert_eq!(session.log.lock().unwrap().clicks, vec!["Allow".to_string()]);
}

#[test]
fn no_dialogs_at_all_is_success() {
    let mut session = FakeSession::single(vec![]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(10));

    let report = negotiator
        .negotiate(&mut session, &[warning_kind(), permission_kind()])
        .unwrap()
        .unwrap();
    assert_eq!(report.resolved(), 0);
    assert_eq!(report.outcomes.len(), 2);
}

#[test]
fn present_dialog_without_control_fails() {
    let mut session = FakeSession::single(vec![
        FakeElement::container().matching(container()),
        FakeElement::button("Cancel").inside(0),
    ]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(10));

    let failure = negotiator
        .negotiate(&mut session, &[permission_kind()])
        .unwrap()
        .unwrap_err();
    assert_eq!(failure.kind, "permission");
    assert_matches!(failure.reason, Unresolved::NoMatch);
    assert_eq!(session.log.lock().unwrap().refreshes, 0);
}

#[test]
fn page_level_kind_clicks_first_usable_control() {
    let ok = Locator::tag_with_text("button", "OK");
    let mut session = FakeSession::single(vec![
        FakeElement::button("OK").matching(ok.clone()).hidden(),
        FakeElement::button("OK").matching(ok.clone()),
    ]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(20));
    let kind = DialogKind::page_level("confirm", ResolutionPolicy::new("confirm", vec![ok]));

    let report = negotiator.negotiate(&mut session, &[kind]).unwrap().unwrap();
    assert_eq!(report.resolved(), 1);
}

#[test]
fn wait_hints_report_visibility() {
    let hint = Locator::css("[data-automationid='downloadButton']");
    let cancel = CancelToken::new();
    let resolver = Resolver::new(fast_bounds(), &cancel);

    let mut session = FakeSession::single(vec![FakeElement::button("Download").matching(hint.clone())]);
    assert!(await_any(&mut session, &[hint.clone()], &resolver, Duration::from_millis(10)).unwrap());

    let mut session = FakeSession::single(vec![
        FakeElement::button("Download").matching(hint.clone()).hidden(),
    ]);
    assert!(!await_any(&mut session, &[hint], &resolver, Duration::from_millis(10)).unwrap());
    assert!(await_any(&mut session, &[], &resolver, Duration::ZERO).unwrap());
}

#[test]
fn container_going_stale_once_is_still_negotiated() {
    let mut session = FakeSession::single(vec![
        FakeElement::container().matching(container()).stale_for(1),
        FakeElement::button("Allow")
            .matching(Locator::tag_with_text("button", "Allow"))
            .inside(0)
            .hides(&[0]),
    ]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(40));

    let report = negotiator
        .negotiate(&mut session, &[permission_kind()])
        .unwrap()
        .unwrap();
    assert_eq!(report.resolved(), 1);
}

#[test]
fn lingering_dialog_is_not_resolved_twice() {
    let primary = Locator::css(".ms-Button--primary");
    let first = DialogKind::contained(
        "warning",
        vec![container()],
        ResolutionPolicy::new("download video", vec![primary.clone()]),
    );
    let second = DialogKind::contained(
        "permission",
        vec![container()],
        ResolutionPolicy::new("allow", vec![primary.clone()]),
    );
    // The first dialog stays on screen after its button is clicked.
    let mut session = FakeSession::single(vec![
        FakeElement::container().matching(container()),
        FakeElement::button("Download video").matching(primary).inside(0),
    ]);
    let cancel = CancelToken::new();
    let negotiator = Negotiator::new(Resolver::new(fast_bounds(), &cancel), Duration::from_millis(20));

    let report = negotiator
        .negotiate(&mut session, &[first, second])
        .unwrap()
        .unwrap();
    assert_eq!(
        report.outcomes,
        vec![
            DialogOutcome::Resolved {
                kind: "warning".to_string()
            },
            DialogOutcome::Absent {
                kind: "permission".to_string()
            },
        ]
    );
    assert_eq!(session.log.lock().unwrap().clicks, vec!["Download video".to_string()]);
}
