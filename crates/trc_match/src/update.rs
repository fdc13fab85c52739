//! [MODULE H] Update planner: match observed outcomes against expectations
//! across log groups, propose rewrites, and generate argument wildcards.
//!
//! Phase 1 (ingest, replaying §4.E under a fresh user id per group) and
//! phase 4's actual persistence (serializer save/predicate/callback) need
//! `trc_io`/log events and so live in the pipeline crate; this module only
//! covers phases 2 and 3, plus the in-memory half of phase 4 (mutating the
//! `Database`, not writing it).

use std::collections::{BTreeSet, HashMap};

use trc_core::db::{Database, IterId, NodeRef, TestId};
use trc_core::result::{ExpectedAlternative, ExpectedResultEntry, ObservedResult};
use trc_core::tag::TagExpr;

use crate::{MatchError, MatchResult};

/// One iteration's outcome after replaying a log group: the entries it
/// resolved to before ingestion, every observed result, and the subset of
/// those not already covered by the old expectations.
#[derive(Clone, Debug)]
pub struct IngestRecord {
    pub iter: IterId,
    pub old: Vec<ExpectedResultEntry>,
    pub observed: Vec<ObservedResult>,
    pub conflicts: Vec<ObservedResult>,
}

/// How a rule picks the iterations it applies to.
#[derive(Clone, Debug)]
pub enum RuleSelector {
    /// Explicit list of test paths (§3 test path: `/`-joined names).
    Paths(Vec<String>),
    /// Argument-name/value pattern; `None` for a name means "any value"
    /// (wildcard-arg match across iterations sharing the pattern).
    ArgPattern(Vec<(String, Option<String>)>),
}

impl RuleSelector {
    fn matches_iter(&self, db: &Database, iter: IterId, path: &str) -> bool {
        match self {
            RuleSelector::Paths(paths) => paths.iter().any(|p| p == path),
            RuleSelector::ArgPattern(pattern) => {
                let node = db.iter(iter);
                if node.args.len() != pattern.len() {
                    return false;
                }
                pattern.iter().all(|(name, want)| match node.arg_value(name) {
                    Some(actual) => want.as_deref().map_or(true, |w| w == actual),
                    None => false,
                })
            }
        }
    }
}

/// A declarative rewrite loaded from an auxiliary rule file.
#[derive(Clone, Debug)]
pub struct Rule {
    pub id: String,
    pub selector: RuleSelector,
    pub new_results: Vec<ExpectedResultEntry>,
}

/// A proposed new alternative for one iteration, to be inserted ahead of
/// its existing alternatives so it takes resolution priority.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub iter: IterId,
    pub rule_id: Option<String>,
    pub new_alternative: ExpectedAlternative,
}

/// Validate that every explicit path a rule names exists in `db`. Must be
/// called, and must succeed, before any proposal from `rules` is committed.
pub fn validate_rules(db: &Database, rules: &[Rule]) -> MatchResult<()> {
    for rule in rules {
        if let RuleSelector::Paths(paths) = &rule.selector {
            for path in paths {
                if !path_exists(db, path) {
                    return Err(MatchError::UnknownRulePath(path.clone()));
                }
            }
        }
    }
    Ok(())
}

fn path_exists(db: &Database, path: &str) -> bool {
    fn walk(db: &Database, node: NodeRef, target: &str, found: &mut bool) {
        if *found {
            return;
        }
        if let NodeRef::Test(t) = node {
            if db.test_path(t) == target {
                *found = true;
                return;
            }
        }
        for child in db.children_of(Some(node)) {
            walk(db, child, target, found);
            if *found {
                return;
            }
        }
    }
    let mut found = false;
    for root in db.children_of(None) {
        walk(db, root, path, &mut found);
        if found {
            break;
        }
    }
    found
}

fn find_matching_rule<'a>(db: &Database, iter: IterId, path: &str, rules: &'a [Rule]) -> Option<&'a Rule> {
    rules.iter().find(|r| r.selector.matches_iter(db, iter, path))
}

/// Propose a rewrite for one ingested iteration, or `None` if it had no
/// conflicts. Rules are tried in declaration order; the first whose
/// selector matches substitutes its `new_results`. Absent a matching rule,
/// the default proposal is a new alternative holding just the conflicting
/// outcomes, tagged with the group's predicate — the existing alternatives
/// and default are left untouched, so the new one only takes priority
/// where the group's tags apply.
pub fn propose(
    db: &Database,
    record: &IngestRecord,
    group_predicate: &TagExpr,
    rules: Option<&[Rule]>,
) -> MatchResult<Option<Proposal>> {
    if record.conflicts.is_empty() {
        return Ok(None);
    }
    let path = db.test_path(db.iter(record.iter).parent);

    if let Some(rules) = rules {
        if let Some(rule) = find_matching_rule(db, record.iter, &path, rules) {
            return Ok(Some(Proposal {
                iter: record.iter,
                rule_id: Some(rule.id.clone()),
                new_alternative: ExpectedAlternative {
                    predicate: group_predicate.clone(),
                    entries: rule.new_results.clone(),
                    key: None,
                    notes: None,
                },
            }));
        }
    }

    let entries = record
        .conflicts
        .iter()
        .map(|r| ExpectedResultEntry::new(r.clone()))
        .collect();
    Ok(Some(Proposal {
        iter: record.iter,
        rule_id: None,
        new_alternative: ExpectedAlternative {
            predicate: group_predicate.clone(),
            entries,
            key: None,
            notes: None,
        },
    }))
}

/// Apply `p` to `db`: insert its new alternative ahead of the iteration's
/// existing ones.
pub fn apply_proposal(db: &mut Database, p: &Proposal) {
    db.iter_mut(p.iter).expected.alternatives.insert(0, p.new_alternative.clone());
}

/// A minimal set of wildcard iterations covering a test's partitioned
/// proposals, plus the concrete iterations they replace.
///
/// Scope: only the single-varying-argument case is covered — the
/// partition's members must agree on every argument except one. Proposals
/// that vary on more than one argument are left as concrete iterations.
#[derive(Clone, Debug, Default)]
pub struct WildcardPlan {
    pub test: TestId,
    /// `(wildcarded argument tuple, shared alternative, insertion anchor)`.
    pub new_wildcards: Vec<(Vec<(String, String)>, ExpectedAlternative, IterId)>,
    pub remove: Vec<IterId>,
}

fn outcome_key(entries: &[ExpectedResultEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{:?}|{:?}", e.result, e.key))
        .collect::<Vec<_>>()
        .join(";")
}

fn single_varying_arg(db: &Database, group: &[&Proposal]) -> Option<String> {
    let first_args = &db.iter(group[0].iter).args;
    let mut varying: Option<String> = None;
    for (name, _) in first_args {
        let values: BTreeSet<&str> =
            group.iter().map(|p| db.iter(p.iter).arg_value(name).unwrap_or("")).collect();
        if values.len() > 1 {
            if varying.is_some() {
                return None;
            }
            varying = Some(name.clone());
        }
    }
    varying
}

/// Partition `proposals` belonging to `test`'s iterations by shared
/// resulting outcome and, for each partition with more than one member,
/// try to replace it with a single wildcard iteration.
pub fn generate_wildcards(db: &Database, test: TestId, proposals: &[Proposal]) -> WildcardPlan {
    let relevant: Vec<&Proposal> =
        proposals.iter().filter(|p| db.iter(p.iter).parent == test).collect();

    let mut groups: HashMap<String, Vec<&Proposal>> = HashMap::new();
    for p in &relevant {
        groups.entry(outcome_key(&p.new_alternative.entries)).or_default().push(p);
    }

    let mut plan = WildcardPlan { test, new_wildcards: Vec::new(), remove: Vec::new() };
    for group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        let Some(varying) = single_varying_arg(db, &group) else {
            continue;
        };
        let anchor = group[0].iter;
        let mut args = db.iter(anchor).args.clone();
        for (name, value) in args.iter_mut() {
            if *name == varying {
                *value = String::new();
            }
        }
        plan.new_wildcards.push((args, group[0].new_alternative.clone(), anchor));
        plan.remove.extend(group.iter().map(|p| p.iter));
    }
    plan
}

/// Create `plan`'s wildcard iterations (each inserted before its anchor)
/// and remove the concrete iterations it replaces. Returns the new ids.
pub fn apply_wildcard_plan(db: &mut Database, plan: &WildcardPlan) -> Vec<IterId> {
    let mut created = Vec::new();
    for (args, alt, anchor) in &plan.new_wildcards {
        let id = db.insert_iter_before(plan.test, args.clone(), *anchor);
        db.iter_mut(id).expected.alternatives.push(alt.clone());
        created.push(id);
    }
    for iter in &plan.remove {
        db.remove_iter(plan.test, *iter);
    }
    created
}
