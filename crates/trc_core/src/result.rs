//! [MODULE B] Result model: test status, verdicts, observed and expected results.
//!
//! Pure value types. The only notable behaviour is structural equality
//! (`ObservedResult::matches_entry`) and the Skipped-priority rule, which
//! lives in `trc_match::resolve` since it needs the iteration's full
//! alternative list, not just one entry.

use std::fmt;

use crate::tag::TagExpr;

/// Status of one test execution. Mirrors `te_test_status` in the original
/// TE sources, with an added `Unspecified` used when a log never reaches
/// a terminal status for an iteration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TestStatus {
    Incomplete,
    Empty,
    Skipped,
    Faked,
    Passed,
    Failed,
    Unspecified,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Incomplete => "INCOMPLETE",
            TestStatus::Empty => "EMPTY",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::Faked => "FAKED",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Unspecified => "UNSPECIFIED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<TestStatus> {
        match s.to_ascii_uppercase().as_str() {
            "INCOMPLETE" => Some(TestStatus::Incomplete),
            "EMPTY" => Some(TestStatus::Empty),
            "SKIPPED" => Some(TestStatus::Skipped),
            "FAKED" => Some(TestStatus::Faked),
            "PASSED" => Some(TestStatus::Passed),
            "FAILED" => Some(TestStatus::Failed),
            "UNSPECIFIED" => Some(TestStatus::Unspecified),
            _ => None,
        }
    }

    /// All statuses, in a stable order, for building the diff counter matrix.
    pub const ALL: [TestStatus; 7] = [
        TestStatus::Incomplete,
        TestStatus::Empty,
        TestStatus::Skipped,
        TestStatus::Faked,
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Unspecified,
    ];
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verdict string emitted by a test during execution. Order among
/// verdicts of one result is significant.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Verdict(pub String);

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(status, ordered verdicts)`. Two observed results are equal iff statuses
/// are equal and verdict sequences are pointwise equal (`te_test_results_equal`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservedResult {
    pub status: TestStatus,
    pub verdicts: Vec<Verdict>,
}

impl ObservedResult {
    pub fn new(status: TestStatus) -> Self {
        ObservedResult { status, verdicts: Vec::new() }
    }

    pub fn with_verdicts(status: TestStatus, verdicts: Vec<Verdict>) -> Self {
        ObservedResult { status, verdicts }
    }

    /// Structural equality against one expected entry's result (ignoring key/notes).
    pub fn matches_entry(&self, entry: &ExpectedResultEntry) -> bool {
        self.status == entry.result.status && self.verdicts == entry.result.verdicts
    }
}

/// An observed result plus optional key (bug/tracker reference, possibly a
/// comma-separated list) and free-text notes.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpectedResultEntry {
    pub result: ObservedResult,
    pub key: Option<String>,
    pub notes: Option<String>,
}

impl ExpectedResultEntry {
    pub fn new(result: ObservedResult) -> Self {
        ExpectedResultEntry { result, key: None, notes: None }
    }

    /// Parse `key` as a comma-separated list of atoms, trimmed, empties dropped.
    pub fn parsed_keys(&self) -> Vec<&str> {
        match &self.key {
            None => Vec::new(),
            Some(k) => k.split(',').map(str::trim).filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.result.status == TestStatus::Skipped
    }
}

/// One `(predicate, expected result entries)` alternative within an
/// iteration's expected-result set.
#[derive(Clone, Debug)]
pub struct ExpectedAlternative {
    pub predicate: TagExpr,
    pub entries: Vec<ExpectedResultEntry>,
    pub key: Option<String>,
    pub notes: Option<String>,
}

impl ExpectedAlternative {
    pub fn contains_skipped(&self) -> bool {
        self.entries.iter().any(ExpectedResultEntry::is_skipped)
    }
}

/// The full expected-result set for one iteration: an ordered sequence of
/// alternatives plus an optional default. At most one default may exist;
/// alternatives are evaluated in insertion (declaration) order.
#[derive(Clone, Debug, Default)]
pub struct ExpectedResultSet {
    pub alternatives: Vec<ExpectedAlternative>,
    pub default: Option<Vec<ExpectedResultEntry>>,
}

impl ExpectedResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_alternative(&mut self, alt: ExpectedAlternative) {
        self.alternatives.push(alt);
    }

    pub fn set_default(&mut self, entries: Vec<ExpectedResultEntry>) -> crate::CoreResult<()> {
        if self.default.is_some() {
            return Err(crate::CoreError::MultipleDefaults);
        }
        self.default = Some(entries);
        Ok(())
    }
}
