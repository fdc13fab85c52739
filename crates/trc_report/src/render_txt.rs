//! Plain-text rendering (`--txt FILE`), same section gating as the HTML
//! renderer but without markup — information content only.

use std::fmt::Write as _;

use crate::model::ReportModel;
use crate::ReportOptions;

pub fn render_txt(model: &ReportModel, opts: &ReportOptions) -> String {
    let mut out = String::new();
    let any_section_selected = opts.totals_only || opts.packages_only || opts.keys_only;
    let show_totals = !any_section_selected || opts.totals_only;
    let show_packages = !any_section_selected || opts.packages_only;
    let show_keys = !any_section_selected || opts.keys_only;
    let show_details = !any_section_selected;

    if show_totals {
        let t = &model.totals;
        let _ = writeln!(out, "TOTALS");
        let _ = writeln!(out, "  incomplete  {}", t.incomplete);
        let _ = writeln!(out, "  empty       {}", t.empty);
        let _ = writeln!(out, "  skipped     {}", t.skipped);
        let _ = writeln!(out, "  faked       {}", t.faked);
        let _ = writeln!(out, "  passed      {}", t.passed);
        let _ = writeln!(out, "  failed      {}", t.failed);
        let _ = writeln!(out, "  unspecified {}", t.unspecified);
        let _ = writeln!(out, "  total       {}", t.total());
        out.push('\n');
    }

    if show_packages {
        let _ = writeln!(out, "PACKAGES");
        for p in &model.packages {
            let _ = writeln!(out, "  {:<40} passed={} failed={} skipped={} total={}",
                p.name, p.totals.passed, p.totals.failed, p.totals.skipped, p.totals.total());
        }
        out.push('\n');
    }

    if show_keys {
        let _ = writeln!(out, "KEYS");
        for (key, count) in &model.keys {
            let _ = writeln!(out, "  {count:>6}  {key}");
        }
        out.push('\n');
    }

    if show_details {
        let _ = writeln!(out, "DETAILS");
        for d in &model.details {
            if opts.suppress_skipped && d.status == trc_core::result::TestStatus::Skipped {
                continue;
            }
            let keys = if d.keys.is_empty() { String::new() } else { format!(" [{}]", d.keys.join(",")) };
            let _ = writeln!(out, "  {:<10} {}{}", d.status.as_str(), d.path, keys);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusTotals;

    #[test]
    fn suppress_skipped_drops_skipped_detail_rows() {
        use crate::model::IterDetail;
        use trc_core::result::TestStatus;

        let model = ReportModel {
            totals: StatusTotals { skipped: 1, passed: 1, ..Default::default() },
            packages: Vec::new(),
            keys: Vec::new(),
            details: vec![
                IterDetail { path: "a/b".into(), status: TestStatus::Skipped, keys: vec![] },
                IterDetail { path: "a/c".into(), status: TestStatus::Passed, keys: vec![] },
            ],
        };
        let opts = ReportOptions { suppress_skipped: true, ..Default::default() };
        let txt = render_txt(&model, &opts);
        assert!(!txt.contains("a/b"));
        assert!(txt.contains("a/c"));
    }
}
