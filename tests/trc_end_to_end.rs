//! End-to-end scenarios (S1-S6) and the §8 testable properties, exercised
//! across `trc_core`/`trc_io`/`trc_match`/`trc_pipeline` together rather
//! than within one crate's unit tests.
//!
//! This mirrors the teacher's own top-level `tests/` convention: a
//! workspace-root integration file sitting outside any single crate's
//! `src/`. The per-scenario unit coverage that actually runs under `cargo
//! test` today lives alongside each crate (`trc_pipeline::update_run`'s
//! `s5_*`/`s6_*` tests, `trc_match::diff`'s `s4_*` test, `trc_io::loader`
//! and `trc_io::serializer`'s round-trip tests); this file gives the same
//! scenarios a single cross-crate narrative for a reader who wants the
//! whole story in one place.

use trc_core::db::{Database, TestKind};
use trc_core::matcher::Comparator;
use trc_core::result::{ExpectedAlternative, ExpectedResultEntry, ObservedResult, TestStatus};
use trc_core::tag::{TagExpr, TagSet};

use trc_match::diff::MatchStatus;
use trc_match::resolve::{resolve, Resolution};

use trc_pipeline::diff_run::{build_set, run_diff, SetSpec};
use trc_pipeline::ingest::{ingest_log, IngestOptions};
use trc_pipeline::update_run::{run_update, UpdateGroup};

/// S1: an iteration with no matching alternative and no default resolves
/// as unknown.
#[test]
fn s1_unresolved_iteration_has_no_expectation() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    let it = db.create_iter(t, vec![]);

    let resolution = resolve(db.iter(it), &TagSet::new());
    assert_eq!(resolution, Resolution::Unknown);
}

/// S2: a tag-gated alternative only applies once its predicate matches
/// the active tag set; otherwise the default applies.
#[test]
fn s2_tag_gated_alternative_falls_back_to_default() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    let it = db.create_iter(t, vec![]);
    db.iter_mut(it).expected.push_alternative(ExpectedAlternative {
        predicate: TagExpr::parse("linux").unwrap(),
        entries: vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Skipped))],
        key: None,
        notes: None,
    });
    db.iter_mut(it).expected.set_default(vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Passed))]).unwrap();

    let under_linux = resolve(db.iter(it), &TagSet::from_iter(["linux"]));
    assert_eq!(under_linux.entries().unwrap()[0].result.status, TestStatus::Skipped);

    let under_macos = resolve(db.iter(it), &TagSet::from_iter(["macos"]));
    assert_eq!(under_macos.entries().unwrap()[0].result.status, TestStatus::Passed);
}

/// S3: a log's observed outcome for an iteration is what the diff engine
/// compares against the database's resolved expectation.
#[test]
fn s3_log_replay_feeds_diff_as_an_observed_view() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    db.create_iter(t, vec![]);
    db.iter_mut(db.test(t).iterations[0])
        .expected
        .set_default(vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Passed))])
        .unwrap();

    let log = r#"<report><test name="pkg/script" result="FAILED"><meta><params/></meta></test></report>"#;
    let expected_set = SetSpec { name: "expected".into(), tags: TagSet::new(), ignored_keys: vec![], logs: vec![] };
    let observed_set =
        SetSpec { name: "observed".into(), tags: TagSet::new(), ignored_keys: vec![], logs: vec![log.to_string()] };

    let x = build_set(&mut db, &expected_set, Comparator::Exact, false).unwrap();
    let y = build_set(&mut db, &observed_set, Comparator::Exact, false).unwrap();
    let report = run_diff(&db, &x, &y);

    assert_eq!(report.get(TestStatus::Passed, TestStatus::Failed, MatchStatus::NoMatch), 1);
}

/// S4: a disjoint mismatch on an ignored key is reported, but not as a
/// hard no-match.
#[test]
fn s4_ignored_key_softens_a_mismatch() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    let it = db.create_iter(t, vec![]);

    let mut x = trc_match::diff::DiffSet::new("x", TagSet::new());
    let mut y = trc_match::diff::DiffSet::new("y", TagSet::new());
    x.overrides.insert(it, vec![ExpectedResultEntry { result: ObservedResult::new(TestStatus::Passed), key: Some("BUG-1".into()), notes: None }]);
    y.overrides.insert(it, vec![ExpectedResultEntry { result: ObservedResult::new(TestStatus::Failed), key: Some("BUG-1".into()), notes: None }]);
    x.ignored_keys.insert("BUG-1".to_string());

    let report = trc_match::diff::compare(&db, &x, &y);
    assert_eq!(report.get(TestStatus::Passed, TestStatus::Failed, MatchStatus::NoMatchIgnored), 1);
}

/// S5: an update run proposes a new tag-gated alternative ahead of the
/// existing default when a log disagrees with it.
#[test]
fn s5_update_proposes_conflict_alternative() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    let iter = db.create_iter(t, vec![]);
    db.iter_mut(iter)
        .expected
        .push_alternative(ExpectedAlternative {
            predicate: TagExpr::Always,
            entries: vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Passed))],
            key: None,
            notes: None,
        });

    let log = r#"<report><test name="pkg/script" result="FAILED"><meta><params/></meta></test></report>"#;
    let groups = vec![UpdateGroup { predicate: TagExpr::parse("linux").unwrap(), logs: vec![log.to_string()] }];
    let plan = run_update(&mut db, &groups, None, true, Comparator::Exact, TagSet::new(), false).unwrap();

    assert_eq!(plan.proposals.len(), 1);
    assert_eq!(db.iter(iter).expected.alternatives.len(), 2);
    assert_eq!(db.iter(iter).expected.alternatives[0].entries[0].result.status, TestStatus::Failed);
}

/// S6: three iterations that disagree on the expectation but agree on the
/// observed outcome, varying in one argument only, collapse to a single
/// wildcard iteration.
#[test]
fn s6_update_collapses_matching_iterations_into_a_wildcard() {
    let mut db = Database::new();
    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    db.create_iter(t, vec![("mode".into(), "a".into())]);
    db.create_iter(t, vec![("mode".into(), "b".into())]);
    db.create_iter(t, vec![("mode".into(), "c".into())]);

    let mk_log = |mode: &str| {
        format!(r#"<report><test name="pkg/script" result="FAILED"><meta><params><arg name="mode" value="{mode}"/></params></meta></test></report>"#)
    };
    let groups = vec![UpdateGroup {
        predicate: TagExpr::Always,
        logs: vec![mk_log("a"), mk_log("b"), mk_log("c")],
    }];

    let plan = run_update(&mut db, &groups, None, false, Comparator::Exact, TagSet::new(), false).unwrap();
    assert_eq!(plan.wildcard_plans.len(), 1);
    assert_eq!(db.test(t).iterations.len(), 1);
    assert!(db.iter(db.test(t).iterations[0]).is_wildcard());
}

/// §8 property: ingesting a log never chokes on an unrecognized but
/// well-formed sibling element — it's skipped, and the rest of the
/// document is still processed.
#[test]
fn ingest_skips_unrecognized_elements_without_losing_the_rest_of_the_log() {
    let mut db = Database::new();
    db.find_or_create_test(None, "pkg/script", TestKind::Script, true).unwrap();
    let uid = db.new_user();
    let log = r#"<report><future_block><nested/></future_block><test name="pkg/script" result="PASSED"><meta><params/></meta></test></report>"#;
    let opts = IngestOptions { comparator: Comparator::Exact, ..IngestOptions::default() };
    ingest_log(&mut db, uid, log, opts).unwrap();

    let t = db.find_or_create_test(None, "pkg/script", TestKind::Script, false).unwrap();
    let iter = db.test(t).iterations[0];
    let data = db
        .get_user_data(trc_core::db::NodeRef::Iter(iter), uid)
        .unwrap()
        .downcast_ref::<trc_pipeline::ingest::IterIngestData>()
        .unwrap();
    assert_eq!(data.observed[0].status, TestStatus::Passed);
}
