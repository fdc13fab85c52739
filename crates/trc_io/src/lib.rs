//! trc_io — document model and loader/serializer for the expectations
//! database (§4.D element vocabulary: `test`, `iter`, `arg`, `objective`,
//! `notes`, `results`, `result`, `verdict`, `globals`, include markers).
//!
//! `xml_events` is a neutral SAX adapter over `quick_xml`; `trc_pipeline`
//! reuses it for log ingestion so the two consumers share one pattern.

pub mod doc;
pub mod loader;
pub mod serializer;
pub mod xml_events;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("xml error at byte {pos}: {msg}")]
    Xml { pos: usize, msg: String },

    #[error("malformed document at {path}: {msg}")]
    Malformed { path: String, msg: String },

    #[error("unknown test kind {0:?}")]
    UnknownTestKind(String),

    #[error("unknown status {0:?}")]
    UnknownStatus(String),

    #[error(transparent)]
    Core(#[from] trc_core::CoreError),

    #[error(transparent)]
    Fs(#[from] std::io::Error),
}

impl From<quick_xml::Error> for IoError {
    fn from(e: quick_xml::Error) -> Self {
        IoError::Xml { pos: 0, msg: e.to_string() }
    }
}

pub type IoResult<T> = Result<T, IoError>;
