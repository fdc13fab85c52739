//! [MODULE C] Expectations database: an arena tree of tests and iterations.
//!
//! The tree is two parallel arenas addressed by stable integer ids
//! (`TestId`, `IterId`) rather than owning pointers, so there are no parent
//! back-references to manage manually.

use std::any::Any;
use std::collections::HashMap;

use crate::matcher::{args_match, has_wildcard, Comparator};
use crate::result::ExpectedResultSet;
use crate::CoreError;

/// Kind of test node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestKind {
    Script,
    Session,
    Package,
}

impl TestKind {
    pub fn parse(s: &str) -> Option<TestKind> {
        match s {
            "script" => Some(TestKind::Script),
            "session" => Some(TestKind::Session),
            "package" => Some(TestKind::Package),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Script => "script",
            TestKind::Session => "session",
            TestKind::Package => "package",
        }
    }
}

/// Stable handle to a test node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TestId(pub u32);

/// Stable handle to an iteration node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IterId(pub u32);

/// Either kind of node, used as a key into the user-data side table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeRef {
    Test(TestId),
    Iter(IterId),
}

/// A parameterised test. Parent linkage is held only by the owning
/// iteration's `children` list and this node's `parent` field — never as
/// an owning pointer.
pub struct TestNode {
    pub name: String,
    pub kind: TestKind,
    pub auxiliary: bool,
    pub objective: String,
    pub notes: Option<String>,
    pub iterations: Vec<IterId>,
    pub parent: Option<IterId>,
    /// Whether this node was loaded from a document or synthesized by the walker.
    pub loaded: bool,
}

/// One `(argument tuple, child test subtree)` under a test.
pub struct IterNode {
    /// Argument bindings in insertion (declaration) order. Uniqueness by
    /// name is an invariant maintained by the walker's create path.
    pub args: Vec<(String, String)>,
    pub notes: Option<String>,
    pub expected: ExpectedResultSet,
    pub children: Vec<TestId>,
    pub parent: TestId,
    pub loaded: bool,
}

impl IterNode {
    pub fn arg_value(&self, name: &str) -> Option<&str> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn is_wildcard(&self) -> bool {
        has_wildcard(&self.args)
    }
}

/// User-id handle issued by the database to a traversal client, for
/// side-table attachments on tree nodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct UserId(pub u32);

/// Owns the root test list, both node arenas, and user-id allocation.
/// Single-writer thread model: concurrent read-only walkers must be
/// externally serialized with any mutating walker.
#[derive(Default)]
pub struct Database {
    tests: Vec<TestNode>,
    iters: Vec<IterNode>,
    roots: Vec<TestId>,
    next_user_id: u32,
    user_data: HashMap<(NodeRef, UserId), Box<dyn Any>>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    pub fn roots(&self) -> &[TestId] {
        &self.roots
    }

    pub fn test(&self, id: TestId) -> &TestNode {
        &self.tests[id.0 as usize]
    }

    pub fn test_mut(&mut self, id: TestId) -> &mut TestNode {
        &mut self.tests[id.0 as usize]
    }

    pub fn iter(&self, id: IterId) -> &IterNode {
        &self.iters[id.0 as usize]
    }

    pub fn iter_mut(&mut self, id: IterId) -> &mut IterNode {
        &mut self.iters[id.0 as usize]
    }

    /// Full `/`-joined path of a test, walking from the root.
    pub fn test_path(&self, mut id: TestId) -> String {
        let mut parts = vec![self.test(id).name.clone()];
        while let Some(parent_iter) = self.test(id).parent {
            id = self.iter(parent_iter).parent;
            parts.push(self.test(id).name.clone());
        }
        parts.reverse();
        parts.join("/")
    }

    fn alloc_test(&mut self, name: String, kind: TestKind, parent: Option<IterId>, loaded: bool) -> TestId {
        let id = TestId(self.tests.len() as u32);
        self.tests.push(TestNode {
            name,
            kind,
            auxiliary: false,
            objective: String::new(),
            notes: None,
            iterations: Vec::new(),
            parent,
            loaded,
        });
        id
    }

    fn alloc_iter(&mut self, args: Vec<(String, String)>, parent: TestId, loaded: bool) -> IterId {
        let id = IterId(self.iters.len() as u32);
        self.iters.push(IterNode {
            args,
            notes: None,
            expected: ExpectedResultSet::new(),
            children: Vec::new(),
            parent,
            loaded,
        });
        id
    }

    /// Find a child test by name under `parent` (`None` for a root-level
    /// search), creating it if `create` is true and absent.
    pub fn find_or_create_test(
        &mut self,
        parent: Option<IterId>,
        name: &str,
        kind: TestKind,
        create: bool,
    ) -> Option<TestId> {
        let siblings: &[TestId] = match parent {
            Some(iter) => &self.iter(iter).children,
            None => &self.roots,
        };
        if let Some(found) = siblings.iter().find(|t| self.test(**t).name == name) {
            return Some(*found);
        }
        if !create {
            return None;
        }
        let id = self.alloc_test(name.to_string(), kind, parent, false);
        match parent {
            Some(iter) => self.iter_mut(iter).children.push(id),
            None => self.roots.push(id),
        }
        Some(id)
    }

    /// Find a child iteration of `test` matching `args` under `cmp`
    /// (§3 iteration matching). Non-wildcard matches win over wildcard
    /// ones; among wildcards, first-declared wins. Ambiguity among
    /// non-wildcard candidates is a fault.
    pub fn find_iter(
        &self,
        test: TestId,
        args: &[(String, String)],
        cmp: Comparator,
        no_wildcards: bool,
    ) -> Result<Option<IterId>, CoreError> {
        let mut exact: Vec<IterId> = Vec::new();
        let mut wildcard: Vec<IterId> = Vec::new();
        for &cand in &self.test(test).iterations {
            let node = self.iter(cand);
            if no_wildcards && node.is_wildcard() {
                continue;
            }
            if args_match(args, &node.args, cmp) {
                if node.is_wildcard() {
                    wildcard.push(cand);
                } else {
                    exact.push(cand);
                }
            }
        }
        if exact.len() > 1 {
            return Err(CoreError::AmbiguousIteration(args.to_vec()));
        }
        if let Some(first) = exact.into_iter().next() {
            return Ok(Some(first));
        }
        Ok(wildcard.into_iter().next())
    }

    /// Create a new iteration under `test` with the given argument bindings.
    pub fn create_iter(&mut self, test: TestId, args: Vec<(String, String)>) -> IterId {
        let id = self.alloc_iter(args, test, false);
        self.test_mut(test).iterations.push(id);
        id
    }

    /// Insert a newly generated wildcard iteration before the first
    /// concrete iteration it would cover (update-planner wildcard rule).
    pub fn insert_iter_before(&mut self, test: TestId, args: Vec<(String, String)>, before: IterId) -> IterId {
        let id = self.alloc_iter(args, test, false);
        let list = &mut self.test_mut(test).iterations;
        let pos = list.iter().position(|x| *x == before).unwrap_or(list.len());
        list.insert(pos, id);
        id
    }

    pub fn remove_iter(&mut self, test: TestId, iter: IterId) {
        self.test_mut(test).iterations.retain(|x| *x != iter);
    }

    pub fn loader_insert_root_test(&mut self, name: String, kind: TestKind) -> TestId {
        let id = self.alloc_test(name, kind, None, true);
        self.roots.push(id);
        id
    }

    pub fn loader_insert_child_test(&mut self, parent: IterId, name: String, kind: TestKind) -> TestId {
        let id = self.alloc_test(name, kind, Some(parent), true);
        self.iter_mut(parent).children.push(id);
        id
    }

    pub fn loader_insert_iter(&mut self, test: TestId, args: Vec<(String, String)>) -> IterId {
        let id = self.alloc_iter(args, test, true);
        self.test_mut(test).iterations.push(id);
        id
    }

    /// Allocate a new user id for a traversal client's side-table attachments.
    pub fn new_user(&mut self) -> UserId {
        let id = UserId(self.next_user_id);
        self.next_user_id += 1;
        id
    }

    /// Free all data associated with `uid` across every node.
    pub fn free_user(&mut self, uid: UserId) {
        self.user_data.retain(|(_, u), _| *u != uid);
    }

    pub fn get_user_data(&self, node: NodeRef, uid: UserId) -> Option<&(dyn Any)> {
        self.user_data.get(&(node, uid)).map(|b| b.as_ref())
    }

    pub fn get_user_data_mut(&mut self, node: NodeRef, uid: UserId) -> Option<&mut (dyn Any)> {
        self.user_data.get_mut(&(node, uid)).map(|b| b.as_mut())
    }

    pub fn set_user_data(&mut self, node: NodeRef, uid: UserId, data: Box<dyn Any>) {
        self.user_data.insert((node, uid), data);
    }

    pub fn has_user_data(&self, node: NodeRef, uid: UserId) -> bool {
        self.user_data.contains_key(&(node, uid))
    }

    /// Direct children of `node` in tree order; `None` means the virtual
    /// root, whose children are the top-level tests.
    pub fn children_of(&self, node: Option<NodeRef>) -> Vec<NodeRef> {
        match node {
            None => self.roots.iter().map(|t| NodeRef::Test(*t)).collect(),
            Some(NodeRef::Test(t)) => self.test(t).iterations.iter().map(|i| NodeRef::Iter(*i)).collect(),
            Some(NodeRef::Iter(i)) => self.iter(i).children.iter().map(|t| NodeRef::Test(*t)).collect(),
        }
    }

    /// Ancestors of `node`, nearest first, not including `node` itself.
    pub fn ancestors(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut cur = node;
        loop {
            let parent = match cur {
                NodeRef::Test(t) => self.test(t).parent.map(NodeRef::Iter),
                NodeRef::Iter(i) => Some(NodeRef::Test(self.iter(i).parent)),
            };
            match parent {
                Some(p) => {
                    out.push(p);
                    cur = p;
                }
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_find_test_roundtrip() {
        let mut db = Database::new();
        let t = db
            .find_or_create_test(None, "my_suite", TestKind::Package, true)
            .unwrap();
        assert_eq!(db.test(t).name, "my_suite");
        let found = db.find_or_create_test(None, "my_suite", TestKind::Package, false);
        assert_eq!(found, Some(t));
        let missing = db.find_or_create_test(None, "absent", TestKind::Script, false);
        assert_eq!(missing, None);
    }

    #[test]
    fn wildcard_loses_to_exact_match() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let wc = db.create_iter(t, vec![("a".into(), "".into())]);
        let exact = db.create_iter(t, vec![("a".into(), "1".into())]);
        let found = db
            .find_iter(t, &[("a".to_string(), "1".to_string())], Comparator::Exact, false)
            .unwrap();
        assert_eq!(found, Some(exact));
        let found2 = db
            .find_iter(t, &[("a".to_string(), "2".to_string())], Comparator::Exact, false)
            .unwrap();
        assert_eq!(found2, Some(wc));
    }

    #[test]
    fn ambiguous_exact_matches_is_an_error() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        db.create_iter(t, vec![("a".into(), "1".into())]);
        db.create_iter(t, vec![("a".into(), "1".into())]);
        let res = db.find_iter(t, &[("a".to_string(), "1".to_string())], Comparator::Exact, false);
        assert!(res.is_err());
    }

    #[test]
    fn test_path_is_slash_joined() {
        let mut db = Database::new();
        let pkg = db.find_or_create_test(None, "pkg", TestKind::Package, true).unwrap();
        let iter = db.create_iter(pkg, vec![]);
        let child = db
            .find_or_create_test(Some(iter), "script", TestKind::Script, true)
            .unwrap();
        assert_eq!(db.test_path(child), "pkg/script");
    }

    #[test]
    fn user_data_is_freed_on_free_user() {
        let mut db = Database::new();
        let t = db.find_or_create_test(None, "t", TestKind::Script, true).unwrap();
        let uid = db.new_user();
        db.set_user_data(NodeRef::Test(t), uid, Box::new(42i32));
        assert!(db.has_user_data(NodeRef::Test(t), uid));
        db.free_user(uid);
        assert!(!db.has_user_data(NodeRef::Test(t), uid));
    }
}
