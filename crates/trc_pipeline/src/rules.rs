//! Update rule file parsing (§4.H phase 2's "rules, loaded from an
//! auxiliary file"). `trc_match` stays free of any document format, so the
//! textual representation — and its inverse, `to_document` — live here.
//!
//! Line-oriented, not XML: one rule per `rule ID` block, followed by
//! indented `select` and `result` lines.
//!
//! ```text
//! rule R1
//!   select path pkg/script
//!   result FAILED key=BUG-9
//!
//! rule R2
//!   select arg n=1 mode=*
//!   result SKIPPED
//! ```

use trc_core::result::{ExpectedResultEntry, ObservedResult, TestStatus, Verdict};
use trc_match::update::{Rule, RuleSelector};

use crate::{PipelineError, PipelineResult};

pub fn parse_rules(src: &str) -> PipelineResult<Vec<Rule>> {
    let mut rules = Vec::new();
    let mut current: Option<(String, Option<RuleSelector>, Vec<ExpectedResultEntry>)> = None;

    for (idx, raw_line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(id) = raw_line.strip_prefix("rule ") {
            flush(&mut rules, current.take());
            current = Some((id.trim().to_string(), None, Vec::new()));
            continue;
        }
        let (_, selector, results) = current.as_mut().ok_or_else(|| PipelineError::MalformedRules {
            line: line_no,
            msg: "select/result line outside a rule block".to_string(),
        })?;

        if let Some(rest) = trimmed.strip_prefix("select path ") {
            let path = rest.trim().to_string();
            match selector {
                Some(RuleSelector::Paths(paths)) => paths.push(path),
                Some(_) => {
                    return Err(PipelineError::MalformedRules {
                        line: line_no,
                        msg: "rule mixes `select path` and `select arg`".to_string(),
                    })
                }
                None => *selector = Some(RuleSelector::Paths(vec![path])),
            }
        } else if let Some(rest) = trimmed.strip_prefix("select arg ") {
            if selector.is_some() {
                return Err(PipelineError::MalformedRules {
                    line: line_no,
                    msg: "a rule may have only one `select arg` pattern".to_string(),
                });
            }
            *selector = Some(RuleSelector::ArgPattern(parse_arg_pattern(rest)));
        } else if let Some(rest) = trimmed.strip_prefix("result ") {
            results.push(parse_result_line(rest, line_no)?);
        } else {
            return Err(PipelineError::MalformedRules {
                line: line_no,
                msg: format!("unrecognized line: {trimmed:?}"),
            });
        }
    }
    flush(&mut rules, current.take());
    Ok(rules)
}

fn flush(rules: &mut Vec<Rule>, pending: Option<(String, Option<RuleSelector>, Vec<ExpectedResultEntry>)>) {
    if let Some((id, selector, new_results)) = pending {
        rules.push(Rule {
            id,
            selector: selector.unwrap_or(RuleSelector::Paths(Vec::new())),
            new_results,
        });
    }
}

fn parse_arg_pattern(rest: &str) -> Vec<(String, Option<String>)> {
    rest.split_whitespace()
        .filter_map(|tok| tok.split_once('='))
        .map(|(name, value)| (name.to_string(), if value == "*" { None } else { Some(value.to_string()) }))
        .collect()
}

fn parse_result_line(rest: &str, line_no: usize) -> PipelineResult<ExpectedResultEntry> {
    let mut tokens = rest.split_whitespace();
    let status_tok = tokens.next().ok_or_else(|| PipelineError::MalformedRules {
        line: line_no,
        msg: "result line is missing a status".to_string(),
    })?;
    let status = TestStatus::from_str_opt(status_tok).ok_or_else(|| PipelineError::MalformedRules {
        line: line_no,
        msg: format!("unknown status {status_tok:?}"),
    })?;
    let mut key = None;
    let mut verdicts = Vec::new();
    for tok in tokens {
        if let Some(v) = tok.strip_prefix("key=") {
            key = Some(v.to_string());
        } else if let Some(v) = tok.strip_prefix("verdict=") {
            verdicts.push(Verdict(v.to_string()));
        }
    }
    Ok(ExpectedResultEntry { result: ObservedResult::with_verdicts(status, verdicts), key, notes: None })
}

/// Render `rules` back to the textual rule-file format (`--rules-save`).
pub fn to_document(rules: &[Rule]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str("rule ");
        out.push_str(&rule.id);
        out.push('\n');
        match &rule.selector {
            RuleSelector::Paths(paths) => {
                for p in paths {
                    out.push_str("  select path ");
                    out.push_str(p);
                    out.push('\n');
                }
            }
            RuleSelector::ArgPattern(pattern) => {
                out.push_str("  select arg");
                for (name, value) in pattern {
                    out.push(' ');
                    out.push_str(name);
                    out.push('=');
                    out.push_str(value.as_deref().unwrap_or("*"));
                }
                out.push('\n');
            }
        }
        for entry in &rule.new_results {
            out.push_str("  result ");
            out.push_str(entry.result.status.as_str());
            if let Some(key) = &entry.key {
                out.push_str(" key=");
                out.push_str(key);
            }
            for v in &entry.result.verdicts {
                out.push_str(" verdict=");
                out.push_str(&v.0);
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
