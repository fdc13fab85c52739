//! trc_pipeline — log ingestion (§4.E), plus the diff and update
//! orchestration that ties `trc_core`'s walker, `trc_io`'s serializer and
//! `trc_match`'s pure algorithms together.

pub mod diff_run;
pub mod ingest;
pub mod rules;
pub mod update_run;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] trc_io::IoError),

    #[error(transparent)]
    Core(#[from] trc_core::CoreError),

    #[error(transparent)]
    Match(#[from] trc_match::MatchError),

    #[error("unexpected close tag </{0}> in log")]
    UnbalancedLog(String),

    #[error("malformed rule file at line {line}: {msg}")]
    MalformedRules { line: usize, msg: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
