//! `trc-diff`: compare two tagged (or log-replayed) views of the same
//! database. `run_diff` only ever takes two sides, so `--set` must appear
//! exactly twice; `--log`/`--ignore` attach to a side by name so their
//! order relative to `--set` doesn't matter.
//!
//! `--set NAME,tag1+tag2+...`, `--log NAME=logfile`, `--ignore NAME=KEY`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trc_cli::args_common::{init_logging, CliError, DbArgs};
use trc_cli::io_util::write_atomic;
use trc_core::result::TestStatus;
use trc_core::tag::TagSet;
use trc_match::diff::{DiffReport, MatchStatus};
use trc_pipeline::diff_run::{build_set, run_diff, SetSpec};

#[derive(Debug, Parser)]
#[command(name = "trc-diff", about = "Compare two tagged views of a TRC expectations database")]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    /// One comparison side: `NAME,tag1+tag2`. Must be given exactly twice.
    #[arg(long = "set", required = true)]
    sets: Vec<String>,

    /// Replay a log into a named set's view instead of resolving it against
    /// the database directly: `NAME=logfile`. Repeatable.
    #[arg(long = "log")]
    logs: Vec<String>,

    /// Tolerate a mismatch on a key under a named set: `NAME=KEY`. Repeatable.
    #[arg(long = "ignore")]
    ignore: Vec<String>,

    /// Write the report as JSON to this path instead of printing a text table.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("trc-diff: error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn split_pair(raw: &str, sep: char) -> Result<(String, String), CliError> {
    raw.split_once(sep).map(|(a, b)| (a.to_string(), b.to_string())).ok_or_else(|| CliError::BadSet(raw.to_string()))
}

fn run(cli: Cli) -> Result<(), CliError> {
    if cli.sets.len() != 2 {
        return Err(CliError::BadSet(format!("expected exactly two --set flags, got {}", cli.sets.len())));
    }

    let mut specs: HashMap<String, SetSpec> = HashMap::new();
    let mut order = Vec::new();
    for raw in &cli.sets {
        let (name, tag_list) = split_pair(raw, ',')?;
        let mut tags = TagSet::new();
        for t in tag_list.split('+').filter(|s| !s.is_empty()) {
            tags.insert(t);
        }
        order.push(name.clone());
        specs.insert(name.clone(), SetSpec { name, tags, ignored_keys: Vec::new(), logs: Vec::new() });
    }

    for raw in &cli.logs {
        let (name, path) = split_pair(raw, '=')?;
        let text = std::fs::read_to_string(&path)?;
        specs.get_mut(&name).ok_or_else(|| CliError::UnknownSetName(name.clone()))?.logs.push(text);
    }
    for raw in &cli.ignore {
        let (name, key) = split_pair(raw, '=')?;
        specs.get_mut(&name).ok_or_else(|| CliError::UnknownSetName(name.clone()))?.ignored_keys.push(key);
    }

    let (mut db, _doc) = trc_io::loader::load_file(&cli.db.db)?;
    let comparator = cli.db.comparator()?;

    let x_spec = specs.remove(&order[0]).expect("seeded from cli.sets above");
    let y_spec = specs.remove(&order[1]).expect("seeded from cli.sets above");
    let x = build_set(&mut db, &x_spec, comparator, cli.db.ignore_log_tags)?;
    let y = build_set(&mut db, &y_spec, comparator, cli.db.ignore_log_tags)?;
    let report = run_diff(&db, &x, &y);

    if let Some(path) = &cli.json {
        write_atomic(path, render_report_json(&report).as_bytes())?;
    } else {
        print_report_text(&report);
    }
    Ok(())
}

fn render_report_json(report: &DiffReport) -> String {
    let mut counters = Vec::new();
    for sx in TestStatus::ALL {
        for sy in TestStatus::ALL {
            for m in [MatchStatus::Match, MatchStatus::NoMatch, MatchStatus::NoMatchIgnored] {
                let n = report.get(sx, sy, m);
                if n > 0 {
                    counters.push(serde_json::json!({
                        "x": sx.as_str(),
                        "y": sy.as_str(),
                        "match": format!("{m:?}"),
                        "count": n,
                    }));
                }
            }
        }
    }
    let value = serde_json::json!({
        "counters": counters,
        "keys_x": report.keys_x(),
        "keys_y": report.keys_y(),
        "diagnostics": report.diagnostics,
    });
    serde_json::to_string_pretty(&value).expect("json values never fail to serialize")
}

fn print_report_text(report: &DiffReport) {
    println!("COUNTERS");
    for sx in TestStatus::ALL {
        for sy in TestStatus::ALL {
            for m in [MatchStatus::Match, MatchStatus::NoMatch, MatchStatus::NoMatchIgnored] {
                let n = report.get(sx, sy, m);
                if n > 0 {
                    println!("  {:<11} vs {:<11} {:?}: {}", sx.as_str(), sy.as_str(), m, n);
                }
            }
        }
    }
    println!("KEYS X");
    for (k, c) in report.keys_x() {
        println!("  {c:>6}  {k}");
    }
    println!("KEYS Y");
    for (k, c) in report.keys_y() {
        println!("  {c:>6}  {k}");
    }
    for d in &report.diagnostics {
        println!("! {d}");
    }
}
