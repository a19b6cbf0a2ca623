//! Boundary to whatever supplies raw activity records.

use serde_json::Value;
use tracing::info;

use crate::activity::{normalize_runs, Gazetteer};
use crate::aggregate::{build_heatmap, Bins, Heatmap};
use crate::calendar::DateRange;
use crate::error::Result;

/// Supplies raw activity records (Garmin JSON shape) for an inclusive date
/// range.  Authentication and paging are the implementor's business.
pub trait ActivitySource {
    fn activities(&self, range: &DateRange) -> Result<Vec<Value>>;
}

/// Fetch `range` from `source` and build the heatmap for `year`.
pub fn heatmap_from_source<S: ActivitySource + ?Sized>(
    source: &S,
    range: &DateRange,
    year: i32,
    gazetteer: &Gazetteer,
    bins: &Bins,
) -> Result<Heatmap> {
    let records = source.activities(range)?;
    info!(
        "Fetched {} activity record(s) for {} .. {}",
        records.len(),
        range.first(),
        range.last()
    );
    let runs = normalize_runs(&records, gazetteer)?;
    info!("{} run(s) after validation", runs.len());
    build_heatmap(&runs, year, bins)
}
