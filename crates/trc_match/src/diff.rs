//! [MODULE G] Diff engine: compare two named expectation views of the same
//! database and collect a three-axis counter matrix plus per-set key
//! bookkeeping, as specified.
//!
//! A "set" is `(active tag set, expectations view)`; the default view
//! resolves every iteration against the set's tags via [`crate::resolve`].
//! Callers that want to diff an *observed* run instead of the database's
//! static expectations (the CLI's `--log` directive) populate `overrides`
//! with that run's per-iteration outcomes before calling [`compare`].

use std::collections::{BTreeSet, HashMap};

use trc_core::db::{Database, IterId, NodeRef};
use trc_core::result::{ExpectedResultEntry, TestStatus};
use trc_core::tag::TagSet;
use trc_core::walker::{Motion, Position, Walker};

use crate::resolve::{resolve, Resolution};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum MatchStatus {
    Match,
    NoMatch,
    NoMatchIgnored,
}

/// One named side of a comparison.
#[derive(Clone, Debug, Default)]
pub struct DiffSet {
    pub name: String,
    pub tags: TagSet,
    /// Keys for which a disjoint difference is tolerated (reported as
    /// `NoMatchIgnored` instead of `NoMatch`).
    pub ignored_keys: BTreeSet<String>,
    /// Per-iteration override, used to diff an ingested log's observed
    /// outcomes instead of the database's static expectations.
    pub overrides: HashMap<IterId, Vec<ExpectedResultEntry>>,
}

impl DiffSet {
    pub fn new(name: impl Into<String>, tags: TagSet) -> Self {
        DiffSet { name: name.into(), tags, ignored_keys: BTreeSet::new(), overrides: HashMap::new() }
    }

    fn resolve<'a>(&'a self, db: &'a Database, iter: IterId) -> Option<&'a [ExpectedResultEntry]> {
        if let Some(entries) = self.overrides.get(&iter) {
            return Some(entries);
        }
        match resolve(db.iter(iter), &self.tags) {
            Resolution::Matched(entries) => Some(entries),
            Resolution::Unknown => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiffReport {
    counters: HashMap<(TestStatus, TestStatus, MatchStatus), u64>,
    key_counts_x: HashMap<String, u64>,
    key_counts_y: HashMap<String, u64>,
    /// Iterations whose resolved entries mix more than one status, making
    /// the representative-status bucket ambiguous (§4.G tie-break note).
    pub diagnostics: Vec<String>,
}

impl DiffReport {
    pub fn get(&self, status_x: TestStatus, status_y: TestStatus, m: MatchStatus) -> u64 {
        self.counters.get(&(status_x, status_y, m)).copied().unwrap_or(0)
    }

    fn incr(&mut self, status_x: TestStatus, status_y: TestStatus, m: MatchStatus) {
        *self.counters.entry((status_x, status_y, m)).or_insert(0) += 1;
    }

    /// Keys sorted descending by occurrence count, ties broken by key string.
    pub fn keys_x(&self) -> Vec<(String, u64)> {
        sorted_keys(&self.key_counts_x)
    }

    pub fn keys_y(&self) -> Vec<(String, u64)> {
        sorted_keys(&self.key_counts_y)
    }
}

fn sorted_keys(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut out: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Representative status for one set's resolved entries: `Unspecified` if
/// unresolved or if the entries disagree on status (the ambiguous case
/// §4.G asks callers to flag with a diagnostic).
fn representative_status(entries: Option<&[ExpectedResultEntry]>) -> (TestStatus, bool) {
    match entries {
        None => (TestStatus::Unspecified, false),
        Some([]) => (TestStatus::Unspecified, false),
        Some(entries) => {
            let first = entries[0].result.status;
            let ambiguous = entries.iter().any(|e| e.result.status != first);
            if ambiguous {
                (TestStatus::Unspecified, true)
            } else {
                (first, false)
            }
        }
    }
}

fn entries_intersect(a: &[ExpectedResultEntry], b: &[ExpectedResultEntry]) -> bool {
    a.iter().any(|ea| b.iter().any(|eb| ea.result == eb.result))
}

fn involved_keys(entries: &[ExpectedResultEntry]) -> BTreeSet<String> {
    entries.iter().flat_map(|e| e.parsed_keys().into_iter().map(str::to_string)).collect()
}

/// Compare `x` and `y` across every iteration in `db`, walking it once via
/// [`Walker::step`].
pub fn compare(db: &Database, x: &DiffSet, y: &DiffSet) -> DiffReport {
    let mut report = DiffReport::default();
    let mut walker = Walker::new();

    loop {
        let motion = walker.step(db);
        if motion == Motion::Root {
            break;
        }
        // Each node arrives exactly once, via a `Son` or `Brother` motion;
        // the later `Father` motion revisits an ancestor already processed.
        if !matches!(motion, Motion::Son | Motion::Brother) {
            continue;
        }
        if let Position::Iter(iter_id) = walker.position() {
            let path = db.test_path(db.iter(iter_id).parent);
            let ex = x.resolve(db, iter_id);
            let ey = y.resolve(db, iter_id);
            let (status_x, ambiguous_x) = representative_status(ex);
            let (status_y, ambiguous_y) = representative_status(ey);

            if ambiguous_x || ambiguous_y {
                report.diagnostics.push(format!("{path}: ambiguous resolved status, reported as no-match"));
                report.incr(status_x, status_y, MatchStatus::NoMatch);
            } else {
                let intersect = match (ex, ey) {
                    (Some(a), Some(b)) => entries_intersect(a, b),
                    _ => false,
                };
                let m = if status_x == status_y && intersect {
                    MatchStatus::Match
                } else {
                    let mut keys = BTreeSet::new();
                    if let Some(a) = ex {
                        keys.extend(involved_keys(a));
                    }
                    if let Some(b) = ey {
                        keys.extend(involved_keys(b));
                    }
                    if !keys.is_empty() && keys.iter().all(|k| x.ignored_keys.contains(k) || y.ignored_keys.contains(k)) {
                        MatchStatus::NoMatchIgnored
                    } else {
                        MatchStatus::NoMatch
                    }
                };
                report.incr(status_x, status_y, m);

                if m != MatchStatus::Match {
                    if let Some(a) = ex {
                        for k in involved_keys(a) {
                            *report.key_counts_x.entry(k).or_insert(0) += 1;
                        }
                    }
                    if let Some(b) = ey {
                        for k in involved_keys(b) {
                            *report.key_counts_y.entry(k).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use trc_core::db::TestKind;
    use trc_core::result::ObservedResult;

    fn entry(status: TestStatus, key: Option<&str>) -> ExpectedResultEntry {
        ExpectedResultEntry { result: ObservedResult::new(status), key: key.map(str::to_string), notes: None }
    }

    #[test]
    fn s4_mismatched_status_is_no_match() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);
        db.iter_mut(it).expected.set_default(vec![entry(TestStatus::Passed, None)]).unwrap();

        let mut x = DiffSet::new("x", TagSet::from_iter(["A"]));
        let mut y = DiffSet::new("y", TagSet::from_iter(["A"]));
        x.overrides.insert(it, vec![entry(TestStatus::Passed, None)]);
        y.overrides.insert(it, vec![entry(TestStatus::Failed, None)]);

        let report = compare(&db, &x, &y);
        assert_eq!(report.get(TestStatus::Passed, TestStatus::Failed, MatchStatus::NoMatch), 1);
    }

    #[test]
    fn matching_status_and_intersecting_entries_is_match() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);
        db.iter_mut(it).expected.set_default(vec![entry(TestStatus::Passed, None)]).unwrap();

        let x = DiffSet::new("x", TagSet::new());
        let y = DiffSet::new("y", TagSet::new());
        let report = compare(&db, &x, &y);
        assert_eq!(report.get(TestStatus::Passed, TestStatus::Passed, MatchStatus::Match), 1);
    }

    #[test]
    fn disjoint_but_ignored_key_is_no_match_ignored() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);

        let mut x = DiffSet::new("x", TagSet::new());
        let mut y = DiffSet::new("y", TagSet::new());
        x.overrides.insert(it, vec![entry(TestStatus::Passed, Some("BUG-1"))]);
        y.overrides.insert(it, vec![entry(TestStatus::Failed, Some("BUG-1"))]);
        x.ignored_keys.insert("BUG-1".to_string());

        let report = compare(&db, &x, &y);
        assert_eq!(report.get(TestStatus::Passed, TestStatus::Failed, MatchStatus::NoMatchIgnored), 1);
    }

    #[test]
    fn diff_symmetry_on_match_axis() {
        let mut db = Database::new();
        let t1 = db.find_or_create_test(None, "t1", TestKind::Script, true).unwrap();
        db.create_iter(t1, vec![]);
        let t2 = db.find_or_create_test(None, "t2", TestKind::Script, true).unwrap();
        let it2 = db.create_iter(t2, vec![]);
        db.iter_mut(it2).expected.set_default(vec![entry(TestStatus::Passed, None)]).unwrap();

        let x = DiffSet::new("x", TagSet::new());
        let y = DiffSet::new("y", TagSet::new());
        let forward = compare(&db, &x, &y);
        let backward = compare(&db, &y, &x);
        for s1 in TestStatus::ALL {
            for s2 in TestStatus::ALL {
                assert_eq!(
                    forward.get(s1, s2, MatchStatus::Match),
                    backward.get(s2, s1, MatchStatus::Match)
                );
            }
        }
    }

    #[test]
    fn keys_are_sorted_by_count_then_name() {
        let mut report = DiffReport::default();
        report.key_counts_x.insert("BUG-2".to_string(), 3);
        report.key_counts_x.insert("BUG-1".to_string(), 3);
        report.key_counts_x.insert("BUG-9".to_string(), 1);
        assert_eq!(
            report.keys_x(),
            vec![("BUG-1".to_string(), 3), ("BUG-2".to_string(), 3), ("BUG-9".to_string(), 1)]
        );
    }
}
