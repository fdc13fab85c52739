//! [MODULE C] Walker: a cursor over the expectations database decoupled
//! from any particular log or document format.
//!
//! Two traversal styles share one cursor, both backed by the same position
//! stack:
//!
//! - positional descent (`step_to_test` / `step_to_iter` / `step_back`),
//!   used by log ingestion, which knows the names and arguments it's
//!   looking for but not whether they already exist in the database;
//! - iterator-style traversal (`step`), used by diff and the update
//!   planner, which visits every node exactly once regardless of the
//!   caller's prior knowledge of the tree's shape.
//!
//! A run of descents that never find their target pushes no frames; instead
//! `unknown_depth` counts how many levels deep the walker believes itself to
//! be, so `step_back` still unwinds correctly without ever touching the tree.

use std::any::Any;

use crate::db::{Database, IterId, NodeRef, TestId, TestKind, UserId};
use crate::matcher::Comparator;
use crate::CoreError;

/// Current position of a walker: the virtual root, or a specific node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Position {
    Root,
    Test(TestId),
    Iter(IterId),
}

/// Result of a positional descent: either the target already existed (or
/// was created), or it is unknown and the walker has entered unknown mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Known(Position),
    Unknown,
}

/// One step of the iterator-style traversal driven by `step`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Motion {
    Son,
    Brother,
    Father,
    Root,
}

/// A cursor into a `Database`. Cheap to create; holds no borrow of the
/// database so it can be threaded through callbacks that also need `&mut
/// Database`.
#[derive(Default)]
pub struct Walker {
    stack: Vec<NodeRef>,
    unknown_depth: u32,
    last_motion: Option<Motion>,
}

impl Walker {
    pub fn new() -> Self {
        Walker::default()
    }

    /// Current position. Meaningless (conceptually "nowhere yet") while
    /// `is_unknown()`.
    pub fn position(&self) -> Position {
        match self.stack.last() {
            None => Position::Root,
            Some(NodeRef::Test(t)) => Position::Test(*t),
            Some(NodeRef::Iter(i)) => Position::Iter(*i),
        }
    }

    /// Is the walker positioned somewhere below a not-yet-created node?
    pub fn is_unknown(&self) -> bool {
        self.unknown_depth > 0
    }

    fn current_ref(&self) -> Option<NodeRef> {
        self.stack.last().copied()
    }

    /// Descend to a child test named `name` (creating it if `create` and
    /// absent), from the root or from an iteration. Returns `Unknown`
    /// without touching the tree if the test is absent and `create` is
    /// false, or if the walker is already in unknown mode.
    pub fn step_to_test(
        &mut self,
        db: &mut Database,
        name: &str,
        kind: TestKind,
        create: bool,
    ) -> Result<StepOutcome, CoreError> {
        if self.is_unknown() {
            self.unknown_depth += 1;
            return Ok(StepOutcome::Unknown);
        }
        let parent_iter = match self.current_ref() {
            None => None,
            Some(NodeRef::Iter(i)) => Some(i),
            Some(NodeRef::Test(_)) => return Err(CoreError::WrongPosition("step to a test")),
        };
        match db.find_or_create_test(parent_iter, name, kind, create) {
            Some(id) => {
                self.stack.push(NodeRef::Test(id));
                Ok(StepOutcome::Known(Position::Test(id)))
            }
            None => {
                self.unknown_depth = 1;
                Ok(StepOutcome::Unknown)
            }
        }
    }

    /// Descend to the iteration of the current test matching `args` (or
    /// create one if `create` and no match exists). `no_wildcards` excludes
    /// wildcard iterations from matching (used while replaying logs that
    /// must land on a concrete iteration).
    pub fn step_to_iter(
        &mut self,
        db: &mut Database,
        args: &[(String, String)],
        create: bool,
        no_wildcards: bool,
        cmp: Comparator,
    ) -> Result<StepOutcome, CoreError> {
        if self.is_unknown() {
            self.unknown_depth += 1;
            return Ok(StepOutcome::Unknown);
        }
        let test = match self.current_ref() {
            Some(NodeRef::Test(t)) => t,
            _ => return Err(CoreError::NotOnTest),
        };
        match db.find_iter(test, args, cmp, no_wildcards)? {
            Some(id) => {
                self.stack.push(NodeRef::Iter(id));
                Ok(StepOutcome::Known(Position::Iter(id)))
            }
            None if create => {
                let id = db.create_iter(test, args.to_vec());
                self.stack.push(NodeRef::Iter(id));
                Ok(StepOutcome::Known(Position::Iter(id)))
            }
            None => {
                self.unknown_depth = 1;
                Ok(StepOutcome::Unknown)
            }
        }
    }

    /// Undo the most recent `step_to_test` or `step_to_iter`. In unknown
    /// mode this only decrements the unknown-depth counter; it never
    /// touches the tree. Errors if called at the root with no pending
    /// unknown depth.
    pub fn step_back(&mut self) -> Result<(), CoreError> {
        if self.unknown_depth > 0 {
            self.unknown_depth -= 1;
            return Ok(());
        }
        if self.stack.pop().is_none() {
            return Err(CoreError::WrongPosition("step back"));
        }
        Ok(())
    }

    /// Advance the iterator-style traversal by one motion. Visits every
    /// node in the database exactly once, pre-order, emitting exactly
    /// `sons + 1` events per node (one `Son`/`Brother` arrival plus the
    /// eventual `Father` departure), and returns `Root` once the whole
    /// tree has been covered. Calling `step` again after a `Root` is
    /// idempotent (keeps returning `Root`).
    pub fn step(&mut self, db: &Database) -> Motion {
        match self.last_motion {
            None => match db.roots().first() {
                None => {
                    self.last_motion = Some(Motion::Root);
                    Motion::Root
                }
                Some(&first) => {
                    self.stack.push(NodeRef::Test(first));
                    self.last_motion = Some(Motion::Son);
                    Motion::Son
                }
            },
            Some(Motion::Root) => Motion::Root,
            Some(Motion::Father) => self.sibling_or_up(db),
            Some(Motion::Son) | Some(Motion::Brother) => {
                let cur = *self.stack.last().expect("stack non-empty after son/brother");
                match db.children_of(Some(cur)).first() {
                    Some(&child) => {
                        self.stack.push(child);
                        self.last_motion = Some(Motion::Son);
                        Motion::Son
                    }
                    None => self.sibling_or_up(db),
                }
            }
        }
    }

    fn sibling_or_up(&mut self, db: &Database) -> Motion {
        let cur = match self.stack.pop() {
            Some(c) => c,
            None => {
                self.last_motion = Some(Motion::Root);
                return Motion::Root;
            }
        };
        let parent = self.stack.last().copied();
        let siblings = db.children_of(parent);
        let idx = siblings
            .iter()
            .position(|x| *x == cur)
            .expect("current node must appear among its own siblings");
        if idx + 1 < siblings.len() {
            self.stack.push(siblings[idx + 1]);
            self.last_motion = Some(Motion::Brother);
            return Motion::Brother;
        }
        match parent {
            Some(p) => {
                self.stack.push(p);
                self.last_motion = Some(Motion::Father);
                Motion::Father
            }
            None => {
                self.last_motion = Some(Motion::Root);
                Motion::Root
            }
        }
    }

    pub fn get_user_data<'a>(&self, db: &'a Database, uid: UserId) -> Result<Option<&'a dyn Any>, CoreError> {
        let node = self.current_ref().ok_or(CoreError::AtUnknownPosition)?;
        Ok(db.get_user_data(node, uid))
    }

    pub fn set_user_data(&self, db: &mut Database, uid: UserId, data: Box<dyn Any>) -> Result<(), CoreError> {
        let node = self.current_ref().ok_or(CoreError::AtUnknownPosition)?;
        db.set_user_data(node, uid, data);
        Ok(())
    }

    /// User data on the immediate parent of the current position.
    pub fn get_parent_user_data<'a>(&self, db: &'a Database, uid: UserId) -> Result<Option<&'a dyn Any>, CoreError> {
        let node = self.current_ref().ok_or(CoreError::AtUnknownPosition)?;
        let parent = match node {
            NodeRef::Test(t) => db.test(t).parent.map(NodeRef::Iter),
            NodeRef::Iter(i) => Some(NodeRef::Test(db.iter(i).parent)),
        };
        Ok(parent.and_then(|p| db.get_user_data(p, uid)))
    }

    /// Ensure `uid` is set on the current node and every one of its
    /// ancestors, generating a value with `gen(seed, is_iteration)` for any
    /// node that doesn't already carry one. Used by the diff engine and
    /// update planner to propagate a rolled-up value (e.g. "subtree has any
    /// wildcard descendants") up the path without revisiting nodes.
    pub fn set_prop_user_data<S, G>(&self, db: &mut Database, uid: UserId, seed: &S, gen: G) -> Result<(), CoreError>
    where
        G: Fn(&S, bool) -> Box<dyn Any>,
    {
        let node = self.current_ref().ok_or(CoreError::AtUnknownPosition)?;
        let mut chain = vec![node];
        chain.extend(db.ancestors(node));
        for n in chain {
            if !db.has_user_data(n, uid) {
                let is_iter = matches!(n, NodeRef::Iter(_));
                db.set_user_data(n, uid, gen(seed, is_iter));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TestKind;

    #[test]
    fn step_back_is_inverse_of_known_descent() {
        let mut db = Database::new();
        let mut w = Walker::new();
        assert_eq!(w.position(), Position::Root);
        let outcome = w.step_to_test(&mut db, "suite", TestKind::Package, true).unwrap();
        assert!(matches!(outcome, StepOutcome::Known(Position::Test(_))));
        w.step_back().unwrap();
        assert_eq!(w.position(), Position::Root);
    }

    #[test]
    fn two_successive_step_backs_restore_state_through_an_iteration() {
        let mut db = Database::new();
        let mut w = Walker::new();
        w.step_to_test(&mut db, "suite", TestKind::Package, true).unwrap();
        let before_iter = w.position();
        w.step_to_iter(&mut db, &[], true, false, Comparator::Exact).unwrap();
        w.step_back().unwrap();
        assert_eq!(w.position(), before_iter);
        w.step_back().unwrap();
        assert_eq!(w.position(), Position::Root);
    }

    #[test]
    fn unknown_mode_never_touches_the_tree() {
        let mut db = Database::new();
        let mut w = Walker::new();
        let outcome = w.step_to_test(&mut db, "absent", TestKind::Script, false).unwrap();
        assert_eq!(outcome, StepOutcome::Unknown);
        assert!(w.is_unknown());
        assert!(db.roots().is_empty());
        let nested = w.step_to_test(&mut db, "deeper", TestKind::Script, false).unwrap();
        assert_eq!(nested, StepOutcome::Unknown);
        w.step_back().unwrap();
        assert!(w.is_unknown());
        w.step_back().unwrap();
        assert!(!w.is_unknown());
        assert_eq!(w.position(), Position::Root);
    }

    #[test]
    fn step_to_iter_requires_a_test_position() {
        let mut db = Database::new();
        let mut w = Walker::new();
        let res = w.step_to_iter(&mut db, &[], true, false, Comparator::Exact);
        assert!(res.is_err());
    }

    #[test]
    fn traversal_visits_each_node_once_and_ends_at_root() {
        let mut db = Database::new();
        let a = db.find_or_create_test(None, "a", TestKind::Script, true).unwrap();
        let b = db.find_or_create_test(None, "b", TestKind::Script, true).unwrap();
        let a_iter = db.create_iter(a, vec![]);
        db.find_or_create_test(Some(a_iter), "a_child", TestKind::Script, true)
            .unwrap();
        db.create_iter(b, vec![]);

        let mut w = Walker::new();
        let mut motions = Vec::new();
        loop {
            let m = w.step(&db);
            motions.push(m);
            if m == Motion::Root && motions.len() > 1 {
                break;
            }
        }
        let sons = motions.iter().filter(|m| **m == Motion::Son).count();
        let brothers = motions.iter().filter(|m| **m == Motion::Brother).count();
        // 5 nodes total: a, a's iteration, a_child, b, b's iteration.
        assert_eq!(sons + brothers, 5);
        assert_eq!(*motions.last().unwrap(), Motion::Root);
    }

    #[test]
    fn set_prop_user_data_seeds_current_node_and_every_ancestor() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "suite", TestKind::Package, true).unwrap();
        let it = db.create_iter(t, vec![]);
        let child = db
            .find_or_create_test(Some(it), "script", TestKind::Script, true)
            .unwrap();

        let mut w = Walker::new();
        w.step_to_test(&mut db, "suite", TestKind::Package, false).unwrap();
        w.step_to_iter(&mut db, &[], false, false, Comparator::Exact).unwrap();
        w.step_to_test(&mut db, "script", TestKind::Script, false).unwrap();

        let uid = db.new_user();
        w.set_prop_user_data(&mut db, uid, &7i32, |seed, is_iter| {
            Box::new((*seed, is_iter)) as Box<dyn Any>
        })
        .unwrap();

        assert!(db.has_user_data(NodeRef::Test(child), uid));
        assert!(db.has_user_data(NodeRef::Iter(it), uid));
        assert!(db.has_user_data(NodeRef::Test(t), uid));
    }
}
