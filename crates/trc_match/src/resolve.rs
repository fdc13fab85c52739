//! [MODULE F] Expectation resolver: given an iteration and an active tag
//! set, pick the one expected-result entry list. Mirrors the scan order of
//! `trc_db_iter_get_exp_result` in the original TE sources.

use trc_core::db::IterNode;
use trc_core::result::ExpectedResultEntry;
use trc_core::tag::TagSet;

/// Outcome of resolving one iteration against one active tag set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution<'a> {
    Matched(&'a [ExpectedResultEntry]),
    Unknown,
}

impl<'a> Resolution<'a> {
    pub fn entries(&self) -> Option<&'a [ExpectedResultEntry]> {
        match self {
            Resolution::Matched(e) => Some(e),
            Resolution::Unknown => None,
        }
    }
}

/// Resolve `iter`'s expected result under `tags`.
///
/// Scan order: the first matching alternative that contains a `Skipped`
/// entry wins outright, even over an earlier-declared matching alternative
/// that does not contain one. Absent any skipped match, the first matching
/// alternative (in declaration order) wins. Absent any match, the
/// iteration's default is returned if present; otherwise the outcome is
/// unknown.
pub fn resolve<'a>(iter: &'a IterNode, tags: &TagSet) -> Resolution<'a> {
    let mut first_match: Option<&'a [ExpectedResultEntry]> = None;
    for alt in &iter.expected.alternatives {
        if !alt.predicate.matches(tags) {
            continue;
        }
        if alt.contains_skipped() {
            return Resolution::Matched(&alt.entries);
        }
        if first_match.is_none() {
            first_match = Some(&alt.entries);
        }
    }
    if let Some(entries) = first_match {
        return Resolution::Matched(entries);
    }
    match iter.expected.default.as_deref() {
        Some(entries) => Resolution::Matched(entries),
        None => Resolution::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trc_core::db::{Database, TestKind};
    use trc_core::result::{ExpectedAlternative, ObservedResult, TestStatus};
    use trc_core::tag::TagExpr;

    fn alt(tags: &str, status: TestStatus, key: Option<&str>) -> ExpectedAlternative {
        ExpectedAlternative {
            predicate: TagExpr::parse(tags).unwrap(),
            entries: vec![ExpectedResultEntry {
                result: ObservedResult::new(status),
                key: key.map(str::to_string),
                notes: None,
            }],
            key: None,
            notes: None,
        }
    }

    #[test]
    fn s1_resolve_picks_matching_alternative_or_default() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![("arg".into(), "1".into())]);
        db.iter_mut(it).expected.push_alternative(alt("linux", TestStatus::Passed, None));
        db.iter_mut(it)
            .expected
            .set_default(vec![ExpectedResultEntry {
                result: ObservedResult::new(TestStatus::Failed),
                key: Some("BUG-7".into()),
                notes: None,
            }])
            .unwrap();

        let mut active = TagSet::new();
        active.insert("linux");
        let r = resolve(db.iter(it), &active);
        assert_eq!(r.entries().unwrap()[0].result.status, TestStatus::Passed);

        let mut bsd = TagSet::new();
        bsd.insert("bsd");
        let r = resolve(db.iter(it), &bsd);
        let entries = r.entries().unwrap();
        assert_eq!(entries[0].result.status, TestStatus::Failed);
        assert_eq!(entries[0].key.as_deref(), Some("BUG-7"));
    }

    #[test]
    fn s2_skipped_alternative_outranks_earlier_match() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);
        db.iter_mut(it).expected.push_alternative(alt("linux", TestStatus::Passed, None));
        db.iter_mut(it).expected.push_alternative(alt("linux & arm", TestStatus::Skipped, None));

        let mut tags = TagSet::new();
        tags.insert("linux");
        tags.insert("arm");
        let r = resolve(db.iter(it), &tags);
        assert_eq!(r.entries().unwrap()[0].result.status, TestStatus::Skipped);
    }

    #[test]
    fn no_match_and_no_default_is_unknown() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);
        db.iter_mut(it).expected.push_alternative(alt("linux", TestStatus::Passed, None));
        let r = resolve(db.iter(it), &TagSet::new());
        assert_eq!(r, Resolution::Unknown);
    }

    #[test]
    fn resolution_is_deterministic_across_calls() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let it = db.create_iter(t, vec![]);
        db.iter_mut(it).expected.push_alternative(alt("linux", TestStatus::Passed, None));
        let mut tags = TagSet::new();
        tags.insert("linux");
        let a = resolve(db.iter(it), &tags);
        let b = resolve(db.iter(it), &tags);
        assert_eq!(a, b);
    }

    fn arb_status() -> impl proptest::strategy::Strategy<Value = TestStatus> {
        use proptest::prelude::*;
        prop_oneof![
            Just(TestStatus::Passed),
            Just(TestStatus::Failed),
            Just(TestStatus::Skipped),
            Just(TestStatus::Faked),
        ]
    }

    proptest::proptest! {
        #[test]
        fn resolution_is_deterministic_for_arbitrary_alternatives(
            tag_names in proptest::collection::vec("[a-c]", 0..3),
            alt_tags in proptest::collection::vec("[a-c]", 0..4),
            alt_statuses in proptest::collection::vec(arb_status(), 0..4),
            has_default in proptest::bool::ANY,
        ) {
            let mut db = Database::new();
            let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
            let it = db.create_iter(t, vec![]);
            for (name, status) in alt_tags.iter().zip(alt_statuses.iter()) {
                db.iter_mut(it).expected.push_alternative(alt(name, *status, None));
            }
            if has_default {
                let _ = db
                    .iter_mut(it)
                    .expected
                    .set_default(vec![ExpectedResultEntry::new(ObservedResult::new(TestStatus::Unspecified))]);
            }

            let mut tags = TagSet::new();
            for name in &tag_names {
                tags.insert(name);
            }

            let a = resolve(db.iter(it), &tags);
            let b = resolve(db.iter(it), &tags);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
