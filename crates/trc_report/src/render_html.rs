//! Offline HTML rendering via an embedded `minijinja` template — no
//! external assets, deterministic output. Section visibility is driven by
//! [`ReportOptions`], mirroring the CLI's per-section modifier flags.

use minijinja::{context, Environment};

use crate::model::ReportModel;
use crate::{ReportError, ReportOptions};

const TEMPLATE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>TRC Report</title></head><body>
<h1>TRC Report</h1>
{% if show_totals %}
<h2>Totals</h2>
<table><tbody>
<tr><td>Incomplete</td><td>{{ totals.incomplete }}</td></tr>
<tr><td>Empty</td><td>{{ totals.empty }}</td></tr>
<tr><td>Skipped</td><td>{{ totals.skipped }}</td></tr>
<tr><td>Faked</td><td>{{ totals.faked }}</td></tr>
<tr><td>Passed</td><td>{{ totals.passed }}</td></tr>
<tr><td>Failed</td><td>{{ totals.failed }}</td></tr>
<tr><td>Unspecified</td><td>{{ totals.unspecified }}</td></tr>
<tr><td><b>Total</b></td><td><b>{{ totals.total }}</b></td></tr>
</tbody></table>
{% endif %}
{% if show_packages %}
<h2>Packages</h2>
<table><thead><tr><th>Package</th><th>Passed</th><th>Failed</th><th>Skipped</th><th>Total</th></tr></thead><tbody>
{% for p in packages %}
<tr><td>{{ p.name }}</td><td>{{ p.totals.passed }}</td><td>{{ p.totals.failed }}</td><td>{{ p.totals.skipped }}</td><td>{{ p.totals.total }}</td></tr>
{% endfor %}
</tbody></table>
{% endif %}
{% if show_keys %}
<h2>Keys</h2>
<table><thead><tr><th>Key</th><th>Count</th></tr></thead><tbody>
{% for row in keys %}
<tr><td>{{ row.key }}</td><td>{{ row.count }}</td></tr>
{% endfor %}
</tbody></table>
{% endif %}
{% if show_details %}
<h2>Details</h2>
<table><thead><tr><th>Path</th><th>Status</th><th>Keys</th></tr></thead><tbody>
{% for row in details %}
<tr><td>{{ row.path }}</td><td>{{ row.status }}</td><td>{{ row.keys }}</td></tr>
{% endfor %}
</tbody></table>
{% endif %}
</body></html>
"#;

#[derive(serde::Serialize)]
struct KeyRow {
    key: String,
    count: u64,
}

#[derive(serde::Serialize)]
struct DetailRow {
    path: String,
    status: String,
    keys: String,
}

pub fn render_html(model: &ReportModel, opts: &ReportOptions) -> Result<String, ReportError> {
    let mut env = Environment::new();
    env.add_template("report.html", TEMPLATE).map_err(|e| ReportError::Template(e.to_string()))?;
    let tmpl = env.get_template("report.html").map_err(|e| ReportError::Template(e.to_string()))?;

    let any_section_selected = opts.totals_only || opts.packages_only || opts.keys_only;
    let show_totals = !any_section_selected || opts.totals_only;
    let show_packages = !any_section_selected || opts.packages_only;
    let show_keys = !any_section_selected || opts.keys_only;
    let show_details = !any_section_selected;

    let keys: Vec<KeyRow> = model.keys.iter().map(|(k, c)| KeyRow { key: k.clone(), count: *c }).collect();
    let details: Vec<DetailRow> = model
        .details
        .iter()
        .filter(|d| !(opts.suppress_skipped && d.status == trc_core::result::TestStatus::Skipped))
        .map(|d| DetailRow { path: d.path.clone(), status: d.status.as_str().to_string(), keys: d.keys.join(",") })
        .collect();

    let ctx = context! {
        show_totals,
        show_packages,
        show_keys,
        show_details,
        totals => &model.totals,
        packages => &model.packages,
        keys => keys,
        details => details,
    };
    tmpl.render(ctx).map_err(|e| ReportError::Template(e.to_string()))
}
