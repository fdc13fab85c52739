//! trc_match — expectation resolver (§4.F), diff engine (§4.G) and update
//! planner (§4.H). Pure domain algorithms over `trc_core`'s tree; no I/O.

pub mod diff;
pub mod resolve;
pub mod update;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("update rule references unknown path {0:?}")]
    UnknownRulePath(String),

    #[error("update rule {0:?} matches no iteration")]
    RuleMatchesNothing(String),

    #[error(transparent)]
    Core(#[from] trc_core::CoreError),
}

pub type MatchResult<T> = Result<T, MatchError>;
