//! [MODULE H phases 1 & 4] Update orchestration: replay each log group
//! (phase 1, via [`crate::ingest`]), hand the resulting records to
//! `trc_match::update` for proposal and wildcard generation (phases 2–3),
//! apply them to the database, and commit through the serializer (phase 4).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use trc_core::db::{Database, IterId, NodeRef, TestId, UserId};
use trc_core::matcher::Comparator;
use trc_core::tag::TagSet;
use trc_core::tag::TagExpr;

use trc_io::doc::LoadedDocument;
use trc_io::serializer::{save, SaveView};

use trc_match::update::{
    apply_proposal, apply_wildcard_plan, generate_wildcards, propose, validate_rules, IngestRecord, Proposal, Rule,
    WildcardPlan,
};

use crate::ingest::{ingest_log, IngestOptions, IterIngestData};
use crate::PipelineResult;

/// One `(tag predicate, logs to merge into that predicate's view)` group,
/// the unit of work for phase 1.
pub struct UpdateGroup {
    pub predicate: TagExpr,
    pub logs: Vec<String>,
}

#[derive(Default)]
pub struct UpdatePlanResult {
    pub proposals: Vec<Proposal>,
    pub wildcard_plans: Vec<WildcardPlan>,
}

fn collect_ingest_records(db: &Database, uid: UserId) -> Vec<IngestRecord> {
    let mut out = Vec::new();
    for root in db.roots().to_vec() {
        collect_from_test(db, root, uid, &mut out);
    }
    out
}

fn collect_from_test(db: &Database, test: TestId, uid: UserId, out: &mut Vec<IngestRecord>) {
    for &iter in &db.test(test).iterations.clone() {
        if let Some(data) = db.get_user_data(NodeRef::Iter(iter), uid).and_then(|d| d.downcast_ref::<IterIngestData>()) {
            out.push(IngestRecord {
                iter,
                old: data.old.clone(),
                observed: data.observed.clone(),
                conflicts: data.conflicts.clone(),
            });
        }
        for &child in &db.iter(iter).children.clone() {
            collect_from_test(db, child, uid, out);
        }
    }
}

/// Run phases 1–3: ingest every group, propose rewrites, generate
/// wildcards, and apply all of it to `db` in memory. `rules`, if given,
/// must already have passed [`validate_rules`] — a hard precondition this
/// function itself re-checks so a caller can never commit past it.
///
/// `base_tags` and `ignore_log_tags` are the CLI's `--tag`/`--ignore-log-tags`
/// flags, applied to every group's ingestion the same way `--tag` seeds
/// [`IngestOptions::base_tags`] in `trc-diff`.
pub fn run_update(
    db: &mut Database,
    groups: &[UpdateGroup],
    rules: Option<&[Rule]>,
    no_wilds: bool,
    comparator: Comparator,
    base_tags: TagSet,
    ignore_log_tags: bool,
) -> PipelineResult<UpdatePlanResult> {
    if let Some(rules) = rules {
        validate_rules(db, rules)?;
    }

    let mut proposals = Vec::new();
    for group in groups {
        let uid = db.new_user();
        for log in &group.logs {
            let opts = IngestOptions { comparator, base_tags: base_tags.clone(), ignore_log_tags, ..IngestOptions::default() };
            ingest_log(db, uid, log, opts)?;
        }
        for record in collect_ingest_records(db, uid) {
            if let Some(p) = propose(db, &record, &group.predicate, rules)? {
                proposals.push(p);
            }
        }
        db.free_user(uid);
    }

    for p in &proposals {
        apply_proposal(db, p);
    }

    let mut wildcard_plans = Vec::new();
    if !no_wilds {
        let tests: BTreeSet<TestId> = proposals.iter().map(|p| db.iter(p.iter).parent).collect();
        for test in tests {
            let plan = generate_wildcards(db, test, &proposals);
            if !plan.new_wildcards.is_empty() {
                apply_wildcard_plan(db, &plan);
                wildcard_plans.push(plan);
            }
        }
    }

    Ok(UpdatePlanResult { proposals, wildcard_plans })
}

/// Phase 4's save view: every node is saved (a commit persists the whole
/// now-updated tree), and each iteration a rule produced is annotated with
/// that rule's id.
pub struct CommitView {
    annotations: HashMap<IterId, String>,
}

impl CommitView {
    pub fn from_proposals(proposals: &[Proposal]) -> Self {
        let annotations = proposals.iter().filter_map(|p| p.rule_id.clone().map(|r| (p.iter, r))).collect();
        CommitView { annotations }
    }
}

impl SaveView for CommitView {
    fn annotate(&self, node: NodeRef) -> Option<String> {
        match node {
            NodeRef::Iter(id) => self.annotations.get(&id).cloned(),
            NodeRef::Test(_) => None,
        }
    }
}

/// Phase 4: persist `db` to `path`, annotating new iterations with their
/// originating rule id.
pub fn commit(path: &Path, db: &Database, doc: &LoadedDocument, proposals: &[Proposal]) -> PipelineResult<()> {
    let view = CommitView::from_proposals(proposals);
    save(path, db, doc, &view)?;
    Ok(())
}
