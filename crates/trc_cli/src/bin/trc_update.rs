//! `trc-update`: replay logs against a database and commit the resulting
//! expectation rewrites. `--init` starts from an empty database instead of
//! loading `--db`; the default mode loads it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trc_cli::args_common::{init_logging, CliError, DbArgs};
use trc_cli::io_util::write_atomic;
use trc_core::db::Database;
use trc_core::tag::TagExpr;
use trc_io::doc::LoadedDocument;
use trc_pipeline::rules::{parse_rules, to_document};
use trc_pipeline::update_run::{commit, run_update, UpdateGroup};

#[derive(Debug, Parser)]
#[command(name = "trc-update", about = "Replay logs against a TRC expectations database and commit proposed rewrites")]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    /// Start a new, empty database at `--db` instead of loading an existing one.
    #[arg(long, conflicts_with = "update")]
    init: bool,

    /// Load and update an existing database at `--db` (the default mode).
    #[arg(long, conflicts_with = "init")]
    update: bool,

    /// Log file to replay. Repeatable.
    #[arg(long = "log", required = true)]
    logs: Vec<PathBuf>,

    /// Tag predicate the replayed logs are proposed under.
    #[arg(long, default_value = "")]
    tags: String,

    /// Optional rule file in the trc_pipeline rule-file format.
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Write the rule set used for this run back out, for reuse.
    #[arg(long)]
    rules_save: Option<PathBuf>,

    /// Skip wildcard generation after applying proposals.
    #[arg(long)]
    no_wilds: bool,
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("trc-update: error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (mut db, doc) = if cli.init {
        (Database::new(), LoadedDocument::new())
    } else {
        trc_io::loader::load_file(&cli.db.db)?
    };

    let comparator = cli.db.comparator()?;
    let predicate = TagExpr::parse(&cli.tags)?;
    let logs = cli.logs.iter().map(std::fs::read_to_string).collect::<Result<Vec<_>, _>>()?;
    let group = UpdateGroup { predicate, logs };

    let rules = cli
        .rules
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()?
        .map(|src| parse_rules(&src))
        .transpose()?;

    let plan = run_update(
        &mut db,
        &[group],
        rules.as_deref(),
        cli.no_wilds,
        comparator,
        cli.db.tag_set(),
        cli.db.ignore_log_tags,
    )?;
    log::info!("trc-update: {} proposal(s), {} wildcard plan(s)", plan.proposals.len(), plan.wildcard_plans.len());

    commit(&cli.db.db, &db, &doc, &plan.proposals)?;

    if let Some(path) = &cli.rules_save {
        if let Some(rules) = &rules {
            write_atomic(path, to_document(rules).as_bytes())?;
        }
    }
    Ok(())
}
