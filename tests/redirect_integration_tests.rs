//! Integration tests for RedirectManager and ConflictResolver
//!
//! These tests verify:
//! - Non-destructive creation leaves blocking content untouched
//! - Existing redirects are replaced in place
//! - Conflicts are escalated once and retried with force only when accepted
//! - Forced requests are never escalated
#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Mutex;
use steamcmd_link::models::RedirectRequest;
use steamcmd_link::services::{
    ConflictKind, ConflictResolver, RedirectManager, is_redirect, redirect_target,
};
use steamcmd_link::ui::{
    AssumeYes, DecisionProvider, ExecutionSink, Interaction, Prompt, Reporter,
};
use tempfile::TempDir;

#[derive(Default)]
struct NullSink;

impl ExecutionSink for NullSink {
    fn message(&self, _text: &str) {}

    fn execute(&self, _program: &Utf8Path, _args: &[String], _expected_units: usize) -> Option<i32> {
        None
    }

    fn close(&self) {}
}

/// Answers every prompt the same way and keeps the affirmative labels it saw.
struct FixedDecider {
    accept: bool,
    seen: Mutex<Vec<String>>,
}

impl FixedDecider {
    fn new(accept: bool) -> Self {
        Self {
            accept,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl DecisionProvider for FixedDecider {
    fn ask(&self, prompt: &Prompt) -> String {
        self.seen.lock().unwrap().push(prompt.affirmative().to_string());
        if self.accept {
            prompt.affirmative().to_string()
        } else {
            prompt.negative().to_string()
        }
    }
}

#[derive(Default)]
struct CountingReporter {
    warnings: Mutex<usize>,
}

impl Reporter for CountingReporter {
    fn fatal(&self, _title: &str, _message: &str, _details: &str) {}

    fn warning(&self, _title: &str, _message: &str, _details: &str) {
        *self.warnings.lock().unwrap() += 1;
    }

    fn information(&self, _title: &str, _message: &str) {}
}

fn setup() -> (TempDir, Utf8PathBuf, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let source = root.join("Mods");
    fs::create_dir_all(&source).unwrap();
    (temp_dir, root, source)
}

#[test]
fn test_non_empty_directory_untouched_on_repeat() {
    let (_guard, root, source) = setup();
    let destination = root.join("294100");
    fs::create_dir_all(destination.join("2009463077")).unwrap();
    fs::write(destination.join("2009463077/About.xml"), "<ModMetaData/>").unwrap();

    let manager = RedirectManager::new();
    let request = RedirectRequest::new(&source, &destination, false);

    for _ in 0..2 {
        let err = manager.create_redirect(&request, None).unwrap_err();
        assert_eq!(err.kind(), ConflictKind::DestinationNonEmptyDirectory);
    }

    assert!(!is_redirect(&destination));
    assert_eq!(
        fs::read_to_string(destination.join("2009463077/About.xml")).unwrap(),
        "<ModMetaData/>"
    );
}

#[test]
fn test_redirect_replaced_in_place() {
    let (_guard, root, source) = setup();
    let other = root.join("Other");
    fs::create_dir_all(&other).unwrap();
    let destination = root.join("294100");

    let manager = RedirectManager::new();
    manager
        .create_redirect(&RedirectRequest::new(&other, &destination, false), None)
        .unwrap();
    manager
        .create_redirect(&RedirectRequest::new(&source, &destination, false), None)
        .unwrap();

    assert_eq!(redirect_target(&destination), Some(source));
    assert!(other.is_dir());
}

#[test]
fn test_declined_conflict_keeps_file() {
    let (_guard, root, source) = setup();
    let destination = root.join("294100");
    fs::write(&destination, "not a directory").unwrap();

    let decider = FixedDecider::new(false);
    let reporter = CountingReporter::default();
    let sink = NullSink;
    let io = Interaction::new(&sink, &decider, &reporter);

    let created = ConflictResolver::default()
        .create_with_recovery(&RedirectRequest::new(&source, &destination, false), &io);

    assert!(!created);
    assert_eq!(*decider.seen.lock().unwrap(), vec!["Delete File and Retry".to_string()]);
    assert_eq!(fs::read_to_string(&destination).unwrap(), "not a directory");
}

#[test]
fn test_accepted_conflict_creates_missing_parent() {
    let (_guard, root, source) = setup();
    let destination = root.join("steam/steamapps/workshop/content/294100");

    let decider = FixedDecider::new(true);
    let reporter = CountingReporter::default();
    let sink = NullSink;
    let io = Interaction::new(&sink, &decider, &reporter);

    let created = ConflictResolver::default()
        .create_with_recovery(&RedirectRequest::new(&source, &destination, false), &io);

    assert!(created);
    assert_eq!(
        *decider.seen.lock().unwrap(),
        vec!["Create Parent Directory and Retry".to_string()]
    );
    assert_eq!(redirect_target(&destination), Some(source));
}

#[test]
fn test_dialogues_disabled_never_prompt() {
    let (_guard, root, source) = setup();
    let destination = root.join("294100");
    fs::create_dir_all(destination.join("x")).unwrap();

    let decider = FixedDecider::new(true);
    let reporter = CountingReporter::default();
    let sink = NullSink;
    let io = Interaction::new(&sink, &decider, &reporter).without_dialogues();

    assert!(
        !ConflictResolver::default()
            .create_with_recovery(&RedirectRequest::new(&source, &destination, false), &io)
    );
    assert!(decider.seen.lock().unwrap().is_empty());
    assert!(destination.join("x").is_dir());
}

#[test]
fn test_unknown_failure_is_reported_not_prompted() {
    let (_guard, root, _source) = setup();
    let decider = FixedDecider::new(true);
    let reporter = CountingReporter::default();
    let sink = NullSink;
    let io = Interaction::new(&sink, &decider, &reporter);

    let created = ConflictResolver::default().create_with_recovery(
        &RedirectRequest::new(root.join("missing-source"), root.join("294100"), false),
        &io,
    );

    assert!(!created);
    assert!(decider.seen.lock().unwrap().is_empty());
    assert_eq!(*reporter.warnings.lock().unwrap(), 1);
}

#[test]
fn test_forced_request_short_circuits() {
    let (_guard, root, source) = setup();
    let destination = root.join("294100");
    fs::write(&destination, "file").unwrap();

    let manager = RedirectManager::new();
    let error = manager
        .create_redirect(&RedirectRequest::new(&source, &destination, false), None)
        .unwrap_err();

    let decider = FixedDecider::new(true);
    let resolver = ConflictResolver::new(manager);
    let forced = RedirectRequest::new(&source, &destination, true);

    assert!(!resolver.resolve_and_retry(&error, &forced, &decider, true, None));
    assert!(decider.seen.lock().unwrap().is_empty());
    assert!(destination.is_file());

    // Same conflict without force goes through the prompt and the forced retry
    let unforced = RedirectRequest::new(&source, &destination, false);
    assert!(resolver.resolve_and_retry(&error, &unforced, &AssumeYes, true, None));
    assert!(is_redirect(&destination));
}
