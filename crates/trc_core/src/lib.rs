//! trc_core — Tag logic, result model, and the expectations database + walker.
//!
//! This crate is the domain core used by `trc_io`, `trc_match`, `trc_pipeline`,
//! `trc_report` and `trc_cli`. It owns no file I/O.
//!
//! - Tag predicates: parse/evaluate/DNF-normalize boolean expressions over tags (`tag`).
//! - Result model: test status, verdicts, observed/expected results (`result`).
//! - Expectations database: arena tree of tests/iterations + walker (`db`, `walker`).
//! - Iteration argument matching (`matcher`).

pub mod db;
pub mod matcher;
pub mod result;
pub mod tag;
pub mod walker;

use thiserror::Error;

/// Errors shared across the core domain.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("tag expression parse error at position {pos}: {msg}")]
    TagParse { pos: usize, msg: String },

    #[error("ambiguous iteration match for arguments {0:?}")]
    AmbiguousIteration(Vec<(String, String)>),

    #[error("more than one default expected-result entry for one iteration")]
    MultipleDefaults,

    #[error("walker is not positioned on a test")]
    NotOnTest,

    #[error("walker is not positioned on an iteration")]
    NotOnIteration,

    #[error("walker is at an unknown (not-yet-created) position")]
    AtUnknownPosition,

    #[error("walker cannot {0} from its current position")]
    WrongPosition(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;
