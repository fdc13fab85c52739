//! `trc-report`: render a database's resolved status report. Defaults to
//! JSON on stdout; `--html`/`--txt`/`--json` write to a file instead.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trc_cli::args_common::{init_logging, CliError, DbArgs};
use trc_cli::io_util::write_atomic;
use trc_report::model::build_model;
use trc_report::render_html::render_html;
use trc_report::render_json::render_json;
use trc_report::render_txt::render_txt;
use trc_report::ReportOptions;

#[derive(Debug, Parser)]
#[command(name = "trc-report", about = "Render a TRC expectations database's resolved status report")]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    /// Write an HTML report to this path.
    #[arg(long)]
    html: Option<PathBuf>,

    /// Write a plain-text report to this path.
    #[arg(long)]
    txt: Option<PathBuf>,

    /// Write a JSON report to this path. Defaults to stdout if no output flag is given.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Only the totals section.
    #[arg(long)]
    totals_only: bool,
    /// Only the per-package breakdown.
    #[arg(long)]
    packages_only: bool,
    /// Only the key occurrence table.
    #[arg(long)]
    keys_only: bool,
    /// Drop SKIPPED rows from the per-iteration detail section.
    #[arg(long)]
    suppress_skipped: bool,
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("trc-report: error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (db, _doc) = trc_io::loader::load_file(&cli.db.db)?;
    let tags = cli.db.tag_set();
    let model = build_model(&db, &tags);
    let opts = ReportOptions {
        totals_only: cli.totals_only,
        packages_only: cli.packages_only,
        keys_only: cli.keys_only,
        suppress_skipped: cli.suppress_skipped,
    };

    let mut wrote_any = false;
    if let Some(path) = &cli.html {
        write_atomic(path, render_html(&model, &opts)?.as_bytes())?;
        wrote_any = true;
    }
    if let Some(path) = &cli.txt {
        write_atomic(path, render_txt(&model, &opts).as_bytes())?;
        wrote_any = true;
    }
    if let Some(path) = &cli.json {
        write_atomic(path, render_json(&model)?.as_bytes())?;
        wrote_any = true;
    }
    if !wrote_any {
        println!("{}", render_json(&model)?);
    }
    Ok(())
}
