//! Diff orchestration: build each named [`DiffSet`] (optionally replaying a
//! log into it so its view is the log's observed outcomes rather than the
//! database's static expectations) and hand them to `trc_match::diff`.

use trc_core::db::Database;
use trc_core::matcher::Comparator;
use trc_core::tag::TagSet;

use trc_match::diff::{compare, DiffReport, DiffSet};

use crate::ingest::{ingest_log, IngestOptions};
use crate::PipelineResult;

/// One `--set NAME,tagset` declaration plus its optional modifiers.
pub struct SetSpec {
    pub name: String,
    pub tags: TagSet,
    pub ignored_keys: Vec<String>,
    /// Logs to replay into this set instead of resolving against `db`
    /// directly — the CLI's per-set `--log` directive.
    pub logs: Vec<String>,
}

/// Build a [`DiffSet`] for `spec`, replaying any attached logs under a
/// fresh user id and populating `overrides` from what they observed.
///
/// `ignore_log_tags` is the CLI's shared `--ignore-log-tags` flag, applied
/// to both sides of the diff the same way `spec.tags` seeds each side's
/// own `base_tags`.
pub fn build_set(db: &mut Database, spec: &SetSpec, comparator: Comparator, ignore_log_tags: bool) -> PipelineResult<DiffSet> {
    let mut set = DiffSet::new(spec.name.clone(), spec.tags.clone());
    set.ignored_keys.extend(spec.ignored_keys.iter().cloned());

    if spec.logs.is_empty() {
        return Ok(set);
    }

    let uid = db.new_user();
    for log in &spec.logs {
        let opts = IngestOptions { comparator, base_tags: spec.tags.clone(), ignore_log_tags, ..IngestOptions::default() };
        ingest_log(db, uid, log, opts)?;
    }

    // Collect every iteration touched under `uid` and substitute its
    // observed outcomes for the set's resolved view.
    for root in db.roots().to_vec() {
        collect_overrides(db, root, uid, &mut set);
    }
    db.free_user(uid);
    Ok(set)
}

fn collect_overrides(db: &Database, test: trc_core::db::TestId, uid: trc_core::db::UserId, set: &mut DiffSet) {
    for &iter in &db.test(test).iterations.clone() {
        if let Some(data) = db
            .get_user_data(trc_core::db::NodeRef::Iter(iter), uid)
            .and_then(|d| d.downcast_ref::<crate::ingest::IterIngestData>())
        {
            let entries: Vec<_> = data
                .observed
                .iter()
                .map(|o| trc_core::result::ExpectedResultEntry::new(o.clone()))
                .collect();
            set.overrides.insert(iter, entries);
        }
        for &child in &db.iter(iter).children.clone() {
            collect_overrides(db, child, uid, set);
        }
    }
}

/// Compare `x` and `y`, the common entry point for the diff CLI.
pub fn run_diff(db: &Database, x: &DiffSet, y: &DiffSet) -> DiffReport {
    compare(db, x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trc_core::db::TestKind;
    use trc_core::result::{ExpectedAlternative, ExpectedResultEntry, ObservedResult, TestStatus};
    use trc_core::tag::TagExpr;
    use trc_match::diff::MatchStatus;

    #[test]
    fn set_with_log_overrides_database_expectation() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let iter = db.create_iter(t, vec![("n".into(), "1".into())]);
        db.iter_mut(iter)
            .expected
            .push_alternative(ExpectedAlternative {
                predicate: TagExpr::Always,
                entries: vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Passed))],
                key: None,
                notes: None,
            });

        let log = r#"<report><test name="t" result="FAILED"><meta><params><arg name="n" value="1"/></params></meta></test></report>"#;
        let spec = SetSpec {
            name: "observed".to_string(),
            tags: TagSet::new(),
            ignored_keys: Vec::new(),
            logs: vec![log.to_string()],
        };
        let observed_set = build_set(&mut db, &spec, Comparator::Exact, false).unwrap();
        let expected_set = DiffSet::new("expected", TagSet::new());

        let report = run_diff(&db, &expected_set, &observed_set);
        assert_eq!(report.get(TestStatus::Passed, TestStatus::Failed, MatchStatus::NoMatch), 1);
    }

    #[test]
    fn set_without_logs_resolves_against_database_directly() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        db.create_iter(t, vec![]);
        let spec = SetSpec { name: "x".to_string(), tags: TagSet::new(), ignored_keys: vec![], logs: vec![] };
        let set = build_set(&mut db, &spec, Comparator::Exact, false).unwrap();
        assert!(set.overrides.is_empty());
    }
}
