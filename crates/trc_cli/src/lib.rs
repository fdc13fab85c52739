//! Shared plumbing for the three `trc_cli` binaries: `trc-report`,
//! `trc-diff`, `trc-update`.

pub mod args_common;
pub mod io_util;
