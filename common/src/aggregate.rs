//! Daily aggregation, gap filling, binning and pivoting into the heatmap
//! grids.
//!
//! Distances are rounded (half to even) to whole kilometres *before* they
//! are binned, and a bin `i` covers the half-open interval
//! `(edges[i], edges[i + 1]]`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::activity::NormalizedActivity;
use crate::calendar::{week_of_year, weekday_index, year_range};
use crate::error::{Result, RunboxError};

/// Kilometre edges used when none are configured.  The `-1` lower edge puts
/// zero-distance days into bucket 0.
pub const DEFAULT_BIN_EDGES: [f64; 6] = [-1.0, 0.0, 3.0, 5.0, 8.0, 100.0];

// ─── bins ────────────────────────────────────────────────────────────────

/// Strictly ascending bin edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    edges: Vec<f64>,
}

impl Bins {
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(RunboxError::Binning(format!(
                "need at least two bin edges, got {edges:?}"
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RunboxError::Binning(format!(
                "bin edges must be finite and strictly ascending: {edges:?}"
            )));
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn num_buckets(&self) -> usize {
        self.edges.len() - 1
    }

    /// Index of the bucket with `edges[i] < value <= edges[i + 1]`.
    pub fn bucket(&self, value: f64) -> Result<usize> {
        self.edges
            .windows(2)
            .position(|w| w[0] < value && value <= w[1])
            .ok_or_else(|| {
                RunboxError::Binning(format!(
                    "{value} km is outside the configured bins {:?}",
                    self.edges
                ))
            })
    }
}

impl Default for Bins {
    fn default() -> Self {
        Self {
            edges: DEFAULT_BIN_EDGES.to_vec(),
        }
    }
}

// ─── daily records ───────────────────────────────────────────────────────

/// One row per calendar day of the target year.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub distance_km: f64,
    pub duration_min: f64,
    pub place: String,
    pub github_weekday: u32,
    pub calendar_week: u32,
    pub distance_bin: usize,
    pub hover_label: String,
}

#[derive(Debug, Default)]
struct DayTotals {
    distance_km: f64,
    duration_min: f64,
    place: String,
}

/// Text shown when hovering over a day cell.
pub fn hover_label(distance_km: f64, date: NaiveDate, place: &str) -> String {
    let km = (distance_km * 1000.0).round_ties_even() / 1000.0;
    // Debug formatting keeps one decimal for whole numbers ("0.0", "12.0").
    let mut label = format!("{km:?} km <br> {date}");
    if !place.is_empty() {
        label.push_str(" in ");
        label.push_str(place);
    }
    label
}

/// Sum the activities per day and fill every date of `year`.
///
/// Activities dated outside `year` are ignored.
pub fn daily_records(
    activities: &[NormalizedActivity],
    year: i32,
    bins: &Bins,
) -> Result<Vec<DailyRecord>> {
    let mut by_date: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for activity in activities {
        let day = by_date.entry(activity.date).or_default();
        day.distance_km += activity.distance_km;
        day.duration_min += activity.duration_min;
        if day.place.is_empty() {
            day.place.clone_from(&activity.place);
        }
    }

    let days = year_range(year)?;
    let outside = by_date.keys().filter(|d| !days.contains(**d)).count();
    if outside > 0 {
        debug!("Ignoring {outside} active day(s) outside {year}");
    }

    days.iter()
        .map(|date| -> Result<DailyRecord> {
            let (distance_km, duration_min, place) = match by_date.get(&date) {
                Some(t) => (t.distance_km, t.duration_min, t.place.clone()),
                None => (0.0, 0.0, String::new()),
            };
            Ok(DailyRecord {
                date,
                distance_km,
                duration_min,
                github_weekday: weekday_index(date),
                calendar_week: week_of_year(date),
                distance_bin: bins.bucket(distance_km.round_ties_even())?,
                hover_label: hover_label(distance_km, date, &place),
                place,
            })
        })
        .collect()
}

// ─── grids ───────────────────────────────────────────────────────────────

/// 7 × `weeks` table indexed by `[github_weekday][calendar_week]`.
///
/// `None` marks a cell with no date behind it (the head of the first week
/// and the tail of the last one); it is never the same as bucket 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    weeks: usize,
    cells: Vec<Option<T>>,
}

impl<T> Grid<T> {
    pub const ROWS: usize = 7;

    fn new(weeks: usize) -> Self {
        Self {
            weeks,
            cells: (0..Self::ROWS * weeks).map(|_| None).collect(),
        }
    }

    pub fn weeks(&self) -> usize {
        self.weeks
    }

    fn index(&self, weekday: u32, week: u32) -> Option<usize> {
        let (row, col) = (weekday as usize, week as usize);
        (row < Self::ROWS && col < self.weeks).then_some(row * self.weeks + col)
    }

    pub fn get(&self, weekday: u32, week: u32) -> Option<&T> {
        self.index(weekday, week).and_then(|i| self.cells[i].as_ref())
    }

    fn set(&mut self, weekday: u32, week: u32, value: T) {
        if let Some(i) = self.index(weekday, week) {
            self.cells[i] = Some(value);
        }
    }

    /// Rows in weekday order, each `weeks` cells long.
    pub fn rows(&self) -> impl Iterator<Item = &[Option<T>]> {
        self.cells.chunks(self.weeks.max(1))
    }

    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

fn pivot(records: &[DailyRecord]) -> (Grid<usize>, Grid<String>) {
    let weeks = records
        .iter()
        .map(|r| r.calendar_week as usize + 1)
        .max()
        .unwrap_or(0);

    let mut buckets = Grid::new(weeks);
    let mut labels = Grid::new(weeks);
    for r in records {
        buckets.set(r.github_weekday, r.calendar_week, r.distance_bin);
        labels.set(r.github_weekday, r.calendar_week, r.hover_label.clone());
    }
    (buckets, labels)
}

// ─── heatmap ─────────────────────────────────────────────────────────────

/// Everything the renderer needs for one year.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub year: i32,
    pub records: Vec<DailyRecord>,
    pub buckets: Grid<usize>,
    pub labels: Grid<String>,
    pub num_buckets: usize,
}

impl Heatmap {
    pub fn total_distance_km(&self) -> f64 {
        self.records.iter().map(|r| r.distance_km).sum()
    }

    pub fn total_duration_min(&self) -> f64 {
        self.records.iter().map(|r| r.duration_min).sum()
    }

    pub fn active_days(&self) -> usize {
        self.records.iter().filter(|r| r.distance_km > 0.0).count()
    }
}

pub fn build_heatmap(activities: &[NormalizedActivity], year: i32, bins: &Bins) -> Result<Heatmap> {
    let records = daily_records(activities, year, bins)?;
    let (buckets, labels) = pivot(&records);
    debug!(
        "Pivoted {} day(s) into a 7x{} grid",
        records.len(),
        buckets.weeks()
    );
    Ok(Heatmap {
        year,
        records,
        buckets,
        labels,
        num_buckets: bins.num_buckets(),
    })
}

/// Bucket grid and hover-label grid for `year`.
pub fn aggregate(
    activities: &[NormalizedActivity],
    year: i32,
    bins: &Bins,
) -> Result<(Grid<usize>, Grid<String>)> {
    let heatmap = build_heatmap(activities, year, bins)?;
    Ok((heatmap.buckets, heatmap.labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(id: i64, date: NaiveDate, km: f64, place: &str) -> NormalizedActivity {
        NormalizedActivity {
            id,
            date,
            distance_km: km,
            duration_min: km * 6.0,
            place: place.to_string(),
        }
    }

    fn record_for(records: &[DailyRecord], date: NaiveDate) -> &DailyRecord {
        records.iter().find(|r| r.date == date).expect("missing day")
    }

    #[test]
    fn test_bins_boundaries() {
        let bins = Bins::new(vec![-1.0, 0.0, 3.0, 5.0, 8.0, 100.0]).unwrap();
        assert_eq!(bins.num_buckets(), 5);
        assert_eq!(bins.bucket(0.0).unwrap(), 0);
        assert_eq!(bins.bucket(3.0).unwrap(), 1);
        assert_eq!(bins.bucket(4.0).unwrap(), 2);
        assert_eq!(bins.bucket(8.0).unwrap(), 3);
        assert_eq!(bins.bucket(100.0).unwrap(), 4);
    }

    #[test]
    fn test_bins_out_of_range() {
        let bins = Bins::default();
        assert!(matches!(bins.bucket(101.0), Err(RunboxError::Binning(_))));
        assert!(bins.bucket(-1.0).is_err());
    }

    #[test]
    fn test_bins_validation() {
        assert!(Bins::new(vec![1.0]).is_err());
        assert!(Bins::new(vec![0.0, 0.0]).is_err());
        assert!(Bins::new(vec![0.0, 5.0, 3.0]).is_err());
        assert!(Bins::new(vec![0.0, f64::INFINITY]).is_err());
        assert!(Bins::new(vec![-1.0, 10.0]).is_ok());
    }

    #[test]
    fn test_hover_label() {
        let date = ymd(2025, 3, 1);
        assert_eq!(hover_label(0.0, date, ""), "0.0 km <br> 2025-03-01");
        assert_eq!(hover_label(3.5, date, ""), "3.5 km <br> 2025-03-01");
        assert_eq!(
            hover_label(12.34567, date, "Berlin"),
            "12.346 km <br> 2025-03-01 in Berlin"
        );
    }

    #[test]
    fn test_gap_filling_empty_year() {
        let records = daily_records(&[], 2025, &Bins::default()).unwrap();
        assert_eq!(records.len(), 365);
        assert!(records.iter().all(|r| r.distance_bin == 0));
        assert!(records.iter().all(|r| r.duration_min == 0.0 && r.place.is_empty()));

        let (buckets, labels) = aggregate(&[], 2025, &Bins::default()).unwrap();
        assert_eq!(buckets.weeks(), 53);
        assert_eq!(buckets.filled(), 365);
        assert_eq!(labels.filled(), 365);
        assert!(buckets.rows().flatten().flatten().all(|b| *b == 0));
        assert!(labels.rows().flatten().flatten().all(|l| l.starts_with("0.0 km <br> 2025-")));
    }

    #[test]
    fn test_missing_cells_are_not_bucket_zero() {
        // 2025 starts on a Wednesday and ends on a Wednesday
        let (buckets, labels) = aggregate(&[], 2025, &Bins::default()).unwrap();
        for weekday in 0..3 {
            assert_eq!(buckets.get(weekday, 0), None);
            assert_eq!(labels.get(weekday, 0), None);
        }
        assert_eq!(buckets.get(3, 0), Some(&0));
        assert_eq!(labels.get(3, 0).map(String::as_str), Some("0.0 km <br> 2025-01-01"));
        assert_eq!(buckets.get(3, 52), Some(&0));
        for weekday in 4..7 {
            assert_eq!(buckets.get(weekday, 52), None);
        }
        assert_eq!(buckets.get(7, 0), None);
        assert_eq!(buckets.get(0, 53), None);
    }

    #[test]
    fn test_grids_share_shape() {
        let runs = vec![run(1, ymd(2025, 7, 27), 6.0, "Berlin")];
        let (buckets, labels) = aggregate(&runs, 2025, &Bins::default()).unwrap();
        assert_eq!(buckets.weeks(), labels.weeks());
        for (b_row, l_row) in buckets.rows().zip(labels.rows()) {
            for (b, l) in b_row.iter().zip(l_row) {
                assert_eq!(b.is_some(), l.is_some());
            }
        }
    }

    #[test]
    fn test_same_day_runs_are_summed() {
        let date = ymd(2025, 3, 1);
        let runs = vec![run(1, date, 2.5, ""), run(2, date, 1.0, "")];
        let records = daily_records(&runs, 2025, &Bins::default()).unwrap();
        let day = record_for(&records, date);
        assert_eq!(day.distance_km, 3.5);
        assert_eq!(day.duration_min, 21.0);
        // 3.5 rounds to 4 and lands in (3, 5]
        assert_eq!(day.distance_bin, 2);
        assert_eq!(day.hover_label, "3.5 km <br> 2025-03-01");
        assert_eq!(day.github_weekday, 6);
        assert_eq!(day.calendar_week, 8);
    }

    #[test]
    fn test_round_half_even_before_binning() {
        let runs = vec![run(1, ymd(2025, 4, 1), 2.5, ""), run(2, ymd(2025, 4, 2), 2.999, "")];
        let records = daily_records(&runs, 2025, &Bins::default()).unwrap();
        // 2.5 -> 2, inside (0, 3]
        assert_eq!(record_for(&records, ymd(2025, 4, 1)).distance_bin, 1);
        // 2.999 -> 3, on the upper edge of (0, 3]
        assert_eq!(record_for(&records, ymd(2025, 4, 2)).distance_bin, 1);
    }

    #[test]
    fn test_bin_edges_on_days() {
        let runs = vec![
            run(1, ymd(2025, 5, 1), 3.0, ""),
            run(2, ymd(2025, 5, 2), 8.0, ""),
        ];
        let records = daily_records(&runs, 2025, &Bins::default()).unwrap();
        assert_eq!(record_for(&records, ymd(2025, 5, 1)).distance_bin, 1);
        assert_eq!(record_for(&records, ymd(2025, 5, 2)).distance_bin, 3);
        assert_eq!(record_for(&records, ymd(2025, 5, 3)).distance_bin, 0);
    }

    #[test]
    fn test_first_non_empty_place() {
        let date = ymd(2025, 9, 21);
        let runs = vec![
            run(1, date, 1.0, ""),
            run(2, date, 1.0, "Berlin"),
            run(3, date, 1.0, "Toulouse"),
        ];
        let records = daily_records(&runs, 2025, &Bins::default()).unwrap();
        let day = record_for(&records, date);
        assert_eq!(day.place, "Berlin");
        assert!(day.hover_label.ends_with(" in Berlin"));
    }

    #[test]
    fn test_activities_outside_year_ignored() {
        let runs = vec![run(1, ymd(2024, 12, 31), 10.0, ""), run(2, ymd(2026, 1, 1), 10.0, "")];
        let heatmap = build_heatmap(&runs, 2025, &Bins::default()).unwrap();
        assert_eq!(heatmap.active_days(), 0);
        assert_eq!(heatmap.total_distance_km(), 0.0);
    }

    #[test]
    fn test_distance_outside_bins_fails() {
        let runs = vec![run(1, ymd(2025, 10, 12), 150.0, "")];
        let err = aggregate(&runs, 2025, &Bins::default()).unwrap_err();
        assert!(matches!(err, RunboxError::Binning(_)));
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let runs = vec![
            run(1, ymd(2025, 1, 1), 5.2, "Sarstedt"),
            run(2, ymd(2025, 6, 30), 12.7, ""),
            run(3, ymd(2025, 6, 30), 0.4, "Wittenberg"),
            run(4, ymd(2025, 12, 31), 42.195, "Berlin"),
        ];
        let first = aggregate(&runs, 2025, &Bins::default()).unwrap();
        let second = aggregate(&runs, 2025, &Bins::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_heatmap_totals() {
        let runs = vec![
            run(1, ymd(2025, 2, 1), 5.0, ""),
            run(2, ymd(2025, 2, 1), 5.0, ""),
            run(3, ymd(2025, 2, 3), 10.0, ""),
        ];
        let heatmap = build_heatmap(&runs, 2025, &Bins::default()).unwrap();
        assert_eq!(heatmap.num_buckets, 5);
        assert_eq!(heatmap.active_days(), 2);
        assert_eq!(heatmap.total_distance_km(), 20.0);
        assert_eq!(heatmap.total_duration_min(), 120.0);
    }

    #[test]
    fn test_leap_year_starting_saturday() {
        let (buckets, _) = aggregate(&[], 2028, &Bins::default()).unwrap();
        assert_eq!(buckets.weeks(), 54);
        assert_eq!(buckets.filled(), 366);
        assert_eq!(buckets.get(0, 53), Some(&0));
    }
}
