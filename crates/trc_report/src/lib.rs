//! trc_report — report model plus JSON/HTML/text rendering over a
//! database's resolved expectation results. Content only: rendering
//! fidelity beyond the information content is out of scope.

pub mod model;
#[cfg(feature = "render_html")]
pub mod render_html;
#[cfg(feature = "render_json")]
pub mod render_json;
pub mod render_txt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("json serialization failed: {0}")]
    Serialize(String),
    #[error("template error: {0}")]
    Template(String),
}

/// Section-visibility modifier flags, mirroring the report tool's CLI
/// flags (`--totals`, `--packages-only`, `--keys-only`, `--suppress-skipped`).
/// When none of `totals_only`/`packages_only`/`keys_only` is set, every
/// section is shown.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportOptions {
    pub totals_only: bool,
    pub packages_only: bool,
    pub keys_only: bool,
    pub suppress_skipped: bool,
}
