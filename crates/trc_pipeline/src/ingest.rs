//! [MODULE E] Log ingestion state machine.
//!
//! ```text
//! Init → Root → Test → Meta → (Objective | Verdicts | Params) → Meta → Test
//!                   ↘ Logs → Tags → Logs                     ↗
//! Skip (with depth) — re-entrant buffer for irrelevant subtrees
//! ```
//!
//! Driven one [`XmlEvent`] at a time by the caller (`ingest_log` for a whole
//! document). Character accumulation is an explicit buffer cleared on entry
//! to a text-bearing element and consumed on exit, per element kind — never
//! implicit string ownership threaded through the state.

use trc_core::db::{Database, NodeRef, TestId, TestKind, UserId};
use trc_core::matcher::Comparator;
use trc_core::result::{ExpectedResultEntry, ObservedResult, TestStatus, Verdict};
use trc_core::tag::TagSet;
use trc_core::walker::Walker;

use trc_io::xml_events::XmlEvent;

use crate::{PipelineError, PipelineResult};

/// Per-iteration record accumulated under one user id: the expectations it
/// resolved to the first time it was touched, every observed outcome
/// appended in log order, and the subset not covered by those expectations.
#[derive(Clone, Debug, Default)]
pub struct IterIngestData {
    pub old: Vec<ExpectedResultEntry>,
    pub observed: Vec<ObservedResult>,
    pub conflicts: Vec<ObservedResult>,
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub comparator: Comparator,
    pub ignore_log_tags: bool,
    pub update_objective: bool,
    /// Tags known before the log stream starts (e.g. `--tags`/`--tag` on
    /// the CLI), merged with whatever `<msg>` harvests as ingestion proceeds.
    pub base_tags: TagSet,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            comparator: Comparator::Exact,
            ignore_log_tags: false,
            update_objective: false,
            base_tags: TagSet::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Root,
    Test,
    Meta,
    Params,
    Objective,
    Logs,
    Verdict,
    MsgTags,
}

struct TestFrame {
    test_id: Option<TestId>,
    args: Vec<(String, String)>,
    observed: ObservedResult,
    objective: Option<String>,
    committed: bool,
}

/// Drives one log document's worth of events against a database, under a
/// single caller-supplied user id.
pub struct Ingestor {
    uid: UserId,
    opts: IngestOptions,
    walker: Walker,
    mode_stack: Vec<Mode>,
    frames: Vec<TestFrame>,
    active_tags: TagSet,
    skip_depth: u32,
    text: String,
}

fn element_kind(name: &str) -> Option<TestKind> {
    match name {
        "test" => Some(TestKind::Script),
        "session" => Some(TestKind::Session),
        "pkg" => Some(TestKind::Package),
        _ => None,
    }
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn is_tag_msg(attrs: &[(String, String)]) -> bool {
    attr(attrs, "entity") == Some("Dispatcher") && attr(attrs, "user") == Some("TRC tags")
}

fn split_tags(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',').filter(|s| !s.is_empty())
}

impl Ingestor {
    pub fn new(uid: UserId, opts: IngestOptions) -> Self {
        let active_tags = opts.base_tags.clone();
        Ingestor {
            uid,
            opts,
            walker: Walker::new(),
            mode_stack: vec![Mode::Root],
            frames: Vec::new(),
            active_tags,
            skip_depth: 0,
            text: String::new(),
        }
    }

    /// Tags harvested so far (base tags plus everything dispatched via
    /// `<msg>` up to this point in the stream).
    pub fn active_tags(&self) -> &TagSet {
        &self.active_tags
    }

    fn mode(&self) -> Mode {
        *self.mode_stack.last().expect("mode stack never empty")
    }

    pub fn feed(&mut self, db: &mut Database, event: XmlEvent) -> PipelineResult<()> {
        if self.skip_depth > 0 {
            match event {
                XmlEvent::Start { empty: false, .. } => self.skip_depth += 1,
                XmlEvent::End { .. } => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }
        match event {
            XmlEvent::Start { name, attrs, empty } => self.start(db, &name, &attrs, empty),
            XmlEvent::End { name } => self.end(db, &name),
            XmlEvent::Text(text) => {
                if matches!(self.mode(), Mode::Objective | Mode::Verdict | Mode::MsgTags) {
                    self.text.push_str(&text);
                }
                Ok(())
            }
        }
    }

    fn start(&mut self, db: &mut Database, name: &str, attrs: &[(String, String)], empty: bool) -> PipelineResult<()> {
        if name == "msg" && is_tag_msg(attrs) {
            self.text.clear();
            self.mode_stack.push(Mode::MsgTags);
            if empty {
                self.end_msg_tags();
            }
            return Ok(());
        }

        // The outermost `<report>` wrapper carries no state of its own; it's
        // transparent so the elements it contains are still matched at
        // `Mode::Root`, not swallowed by the generic unknown-subtree skip.
        if self.mode() == Mode::Root && name == "report" {
            return Ok(());
        }

        match (self.mode(), name) {
            (Mode::Root | Mode::Test, _) if element_kind(name).is_some() => {
                let kind = element_kind(name).unwrap();
                let test_name = attr(attrs, "name").unwrap_or_default().to_string();
                let status = attr(attrs, "result")
                    .and_then(TestStatus::from_str_opt)
                    .unwrap_or(TestStatus::Unspecified);
                self.walker.step_to_test(db, &test_name, kind, true)?;
                let test_id = match self.walker.position() {
                    trc_core::walker::Position::Test(t) => Some(t),
                    _ => None,
                };
                self.frames.push(TestFrame {
                    test_id,
                    args: Vec::new(),
                    observed: ObservedResult::new(status),
                    objective: None,
                    committed: false,
                });
                self.mode_stack.push(Mode::Test);
                if empty {
                    self.end(db, name)?;
                }
                Ok(())
            }
            (Mode::Test, "meta") => {
                self.mode_stack.push(Mode::Meta);
                if empty {
                    self.end(db, "meta")?;
                }
                Ok(())
            }
            (Mode::Meta, "params") => {
                self.mode_stack.push(Mode::Params);
                if empty {
                    self.end(db, "params")?;
                }
                Ok(())
            }
            (Mode::Params, "arg") => {
                let arg_name = attr(attrs, "name").unwrap_or_default().to_string();
                let arg_value = attr(attrs, "value").unwrap_or_default().to_string();
                self.frames.last_mut().expect("inside a test frame").args.push((arg_name, arg_value));
                if !empty {
                    // Consumed entirely by its attributes; any nested text is ignored.
                    self.skip_depth = 1;
                }
                Ok(())
            }
            (Mode::Meta, "objective") => {
                self.text.clear();
                self.mode_stack.push(Mode::Objective);
                if empty {
                    self.end(db, "objective")?;
                }
                Ok(())
            }
            (Mode::Test, "logs") => {
                self.mode_stack.push(Mode::Logs);
                if empty {
                    self.end(db, "logs")?;
                }
                Ok(())
            }
            (Mode::Logs, "verdict") => {
                self.text.clear();
                self.mode_stack.push(Mode::Verdict);
                if empty {
                    self.end(db, "verdict")?;
                }
                Ok(())
            }
            _ => {
                if !empty {
                    self.skip_depth = 1;
                }
                Ok(())
            }
        }
    }

    fn end_msg_tags(&mut self) {
        if !self.opts.ignore_log_tags {
            let tags: Vec<String> = split_tags(&self.text).map(str::to_string).collect();
            for t in tags {
                self.active_tags.insert(&t);
            }
        }
        self.mode_stack.pop();
        self.text.clear();
    }

    fn end(&mut self, db: &mut Database, name: &str) -> PipelineResult<()> {
        match self.mode() {
            Mode::Root if name == "report" => Ok(()),
            Mode::MsgTags if name == "msg" => {
                self.end_msg_tags();
                Ok(())
            }
            Mode::Verdict if name == "verdict" => {
                let verdict = Verdict(std::mem::take(&mut self.text));
                self.frames.last_mut().expect("inside a test frame").observed.verdicts.push(verdict);
                self.mode_stack.pop();
                Ok(())
            }
            Mode::Logs if name == "logs" => {
                self.mode_stack.pop();
                Ok(())
            }
            Mode::Objective if name == "objective" => {
                self.frames.last_mut().expect("inside a test frame").objective = Some(std::mem::take(&mut self.text));
                self.mode_stack.pop();
                Ok(())
            }
            Mode::Params if name == "params" => {
                self.mode_stack.pop();
                Ok(())
            }
            Mode::Meta if name == "meta" => {
                self.commit_meta(db)?;
                self.mode_stack.pop();
                Ok(())
            }
            Mode::Test if element_kind(name).is_some() => {
                let frame = self.frames.pop().expect("matching test frame");
                if self.opts.update_objective {
                    if let (Some(test_id), Some(objective)) = (frame.test_id, frame.objective) {
                        db.test_mut(test_id).objective = objective;
                    }
                }
                if frame.committed {
                    self.walker.step_back()?; // undo step_to_iter
                }
                self.walker.step_back()?; // undo step_to_test
                self.mode_stack.pop();
                Ok(())
            }
            _ => Err(PipelineError::UnbalancedLog(name.to_string())),
        }
    }

    fn commit_meta(&mut self, db: &mut Database) -> PipelineResult<()> {
        let frame = self.frames.last_mut().expect("inside a test frame");
        let args = frame.args.clone();
        let observed = frame.observed.clone();
        frame.committed = true;

        self.walker.step_to_iter(db, &args, true, true, self.opts.comparator)?;
        let iter_id = match self.walker.position() {
            trc_core::walker::Position::Iter(i) => i,
            _ => return Err(PipelineError::UnbalancedLog("meta".to_string())),
        };

        let old = trc_match::resolve::resolve(db.iter(iter_id), &self.active_tags)
            .entries()
            .map(|e| e.to_vec())
            .unwrap_or_default();
        let is_conflict = !old.iter().any(|e| observed.matches_entry(e));

        let node = NodeRef::Iter(iter_id);
        match db.get_user_data_mut(node, self.uid).and_then(|d| d.downcast_mut::<IterIngestData>()) {
            Some(data) => {
                data.observed.push(observed.clone());
                if is_conflict && !data.conflicts.contains(&observed) {
                    data.conflicts.push(observed);
                }
            }
            None => {
                let mut data = IterIngestData { old, observed: vec![observed.clone()], conflicts: Vec::new() };
                if is_conflict {
                    data.conflicts.push(observed);
                }
                db.set_user_data(node, self.uid, Box::new(data));
            }
        }
        Ok(())
    }
}

/// Replay an entire log document's events against `db` under `uid`.
pub fn ingest_log(db: &mut Database, uid: UserId, xml: &str, opts: IngestOptions) -> PipelineResult<TagSet> {
    let mut ingestor = Ingestor::new(uid, opts);
    for event in trc_io::xml_events::XmlEvents::new(xml) {
        ingestor.feed(db, event?)?;
    }
    Ok(ingestor.active_tags().clone())
}
