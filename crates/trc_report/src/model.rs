//! Pure report data model, built by walking the resolved expectations
//! tree once. No I/O; callers supply an already-loaded [`Database`].

use std::collections::{BTreeSet, HashMap};

use trc_core::db::Database;
use trc_core::result::TestStatus;
use trc_core::tag::TagSet;
use trc_core::walker::{Motion, Position, Walker};

use trc_match::resolve::{resolve, Resolution};

/// Per-status occurrence counts, named fields rather than a map so JSON
/// and HTML rendering get a stable, predictable field order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct StatusTotals {
    pub incomplete: u64,
    pub empty: u64,
    pub skipped: u64,
    pub faked: u64,
    pub passed: u64,
    pub failed: u64,
    pub unspecified: u64,
}

impl StatusTotals {
    fn incr(&mut self, status: TestStatus) {
        match status {
            TestStatus::Incomplete => self.incomplete += 1,
            TestStatus::Empty => self.empty += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Faked => self.faked += 1,
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Unspecified => self.unspecified += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.incomplete + self.empty + self.skipped + self.faked + self.passed + self.failed + self.unspecified
    }
}

/// Totals for one top-level test (the "package" granularity modifier
/// flags group by).
#[derive(Clone, Debug, serde::Serialize)]
pub struct PackageSection {
    pub name: String,
    pub totals: StatusTotals,
}

/// One resolved iteration, for the detail listing.
#[derive(Clone, Debug, serde::Serialize)]
pub struct IterDetail {
    pub path: String,
    pub status: TestStatus,
    pub keys: Vec<String>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ReportModel {
    pub totals: StatusTotals,
    pub packages: Vec<PackageSection>,
    /// Key counts, sorted descending by occurrence, ties broken by key
    /// string (same bookkeeping rule as the diff engine's key tables).
    pub keys: Vec<(String, u64)>,
    pub details: Vec<IterDetail>,
}

/// Walk every iteration in `db`, resolve it against `tags`, and build the
/// totals/package/key/detail sections in one pass.
pub fn build_model(db: &Database, tags: &TagSet) -> ReportModel {
    let mut totals = StatusTotals::default();
    let mut by_package: HashMap<String, StatusTotals> = HashMap::new();
    let mut key_counts: HashMap<String, u64> = HashMap::new();
    let mut details = Vec::new();

    let mut walker = Walker::new();
    loop {
        let motion = walker.step(db);
        if motion == Motion::Root {
            break;
        }
        if !matches!(motion, Motion::Son | Motion::Brother) {
            continue;
        }
        if let Position::Iter(iter_id) = walker.position() {
            let test_id = db.iter(iter_id).parent;
            let path = db.test_path(test_id);
            let package = path.split('/').next().unwrap_or(&path).to_string();

            let (status, keys) = match resolve(db.iter(iter_id), tags) {
                Resolution::Matched(entries) => {
                    let status = entries.first().map(|e| e.result.status).unwrap_or(TestStatus::Unspecified);
                    let keys: BTreeSet<String> =
                        entries.iter().flat_map(|e| e.parsed_keys().into_iter().map(str::to_string)).collect();
                    (status, keys.into_iter().collect())
                }
                Resolution::Unknown => (TestStatus::Unspecified, Vec::new()),
            };

            totals.incr(status);
            by_package.entry(package).or_default().incr(status);
            for key in &keys {
                *key_counts.entry(key.clone()).or_insert(0) += 1;
            }
            details.push(IterDetail { path, status, keys });
        }
    }

    let mut packages: Vec<PackageSection> =
        by_package.into_iter().map(|(name, totals)| PackageSection { name, totals }).collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    let mut keys: Vec<(String, u64)> = key_counts.into_iter().collect();
    keys.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ReportModel { totals, packages, keys, details }
}
