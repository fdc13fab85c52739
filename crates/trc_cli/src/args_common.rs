//! CLI surface shared by all three binaries: `--db`, `--tag`,
//! `--ignore-log-tags`, `--comparison`, flattened into each binary's own
//! `clap::Parser` struct.
//!
//! `CliError` is hand-rolled rather than `thiserror`-derived: this crate's
//! errors are wrappers around other crates' already-descriptive error
//! types, so a manual `Display` that defers to the inner error reads better
//! than a derive macro would.

use std::fmt;
use std::path::PathBuf;

use clap::Args;

use trc_core::matcher::Comparator;
use trc_core::tag::TagSet;

#[derive(Debug, Args)]
pub struct DbArgs {
    /// Path to the trc_db XML file.
    #[arg(long)]
    pub db: PathBuf,

    /// Tag active for resolution. Repeatable.
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Don't harvest tags from a log's dispatcher message while ingesting.
    #[arg(long)]
    pub ignore_log_tags: bool,

    /// Argument-value comparator: exact, casefold, normalised, tokens.
    #[arg(long, default_value = "exact")]
    pub comparison: String,
}

impl DbArgs {
    pub fn comparator(&self) -> Result<Comparator, CliError> {
        Comparator::parse(&self.comparison).ok_or_else(|| CliError::BadComparator(self.comparison.clone()))
    }

    pub fn tag_set(&self) -> TagSet {
        TagSet::from_iter(self.tags.iter().map(String::as_str))
    }
}

#[derive(Debug)]
pub enum CliError {
    BadComparator(String),
    BadSet(String),
    UnknownSetName(String),
    Io(std::io::Error),
    Core(trc_core::CoreError),
    IoCrate(trc_io::IoError),
    Match(trc_match::MatchError),
    Pipeline(trc_pipeline::PipelineError),
    Report(trc_report::ReportError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::BadComparator(s) => write!(f, "unknown --comparison {s:?}"),
            CliError::BadSet(s) => write!(f, "malformed --set argument: {s}"),
            CliError::UnknownSetName(s) => write!(f, "--log/--ignore references unknown set name {s:?}"),
            CliError::Io(e) => write!(f, "{e}"),
            CliError::Core(e) => write!(f, "{e}"),
            CliError::IoCrate(e) => write!(f, "{e}"),
            CliError::Match(e) => write!(f, "{e}"),
            CliError::Pipeline(e) => write!(f, "{e}"),
            CliError::Report(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
impl From<trc_core::CoreError> for CliError {
    fn from(e: trc_core::CoreError) -> Self {
        CliError::Core(e)
    }
}
impl From<trc_io::IoError> for CliError {
    fn from(e: trc_io::IoError) -> Self {
        CliError::IoCrate(e)
    }
}
impl From<trc_match::MatchError> for CliError {
    fn from(e: trc_match::MatchError) -> Self {
        CliError::Match(e)
    }
}
impl From<trc_pipeline::PipelineError> for CliError {
    fn from(e: trc_pipeline::PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}
impl From<trc_report::ReportError> for CliError {
    fn from(e: trc_report::ReportError) -> Self {
        CliError::Report(e)
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparator_rejects_unknown_name() {
        let args = DbArgs { db: PathBuf::from("x"), tags: vec![], ignore_log_tags: false, comparison: "fuzzy".into() };
        assert!(args.comparator().is_err());
    }

    #[test]
    fn tag_set_collects_repeated_tag_flags() {
        let args = DbArgs {
            db: PathBuf::from("x"),
            tags: vec!["linux".into(), "arm".into()],
            ignore_log_tags: false,
            comparison: "exact".into(),
        };
        let tags = args.tag_set();
        assert!(tags.iter().any(|t| t.name == "linux"));
        assert!(tags.iter().any(|t| t.name == "arm"));
    }
}
