//! Activity records as delivered by the data source, and their normalized
//! running-only view.
//!
//! Parsing is schema-driven: a record missing a required field, carrying a
//! field of the wrong type, or reporting a negative duration/distance is
//! rejected with [`RunboxError::Validation`] instead of being patched up.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, RunboxError};

/// Type key of the activities that make it onto the chart.
pub const RUNNING: &str = "running";

/// Place names recognised in activity titles when none are configured.
pub const DEFAULT_PLACES: [&str; 5] = [
    "berlin",
    "cisternino",
    "sarstedt",
    "wittenberg",
    "toulouse",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityType {
    pub type_id: i64,
    pub type_key: String,
}

/// One activity exactly as the data source reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    pub activity_id: i64,
    #[serde(deserialize_with = "local_timestamp")]
    pub start_time_local: NaiveDateTime,
    /// Seconds.
    pub duration: f64,
    /// Meters.
    pub distance: f64,
    pub activity_type: ActivityType,
    /// Missing for some activities in the Garmin response.
    #[serde(default)]
    pub activity_name: Option<String>,
}

impl RawActivity {
    /// Parse and validate one record from the data source.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw = RawActivity::deserialize(value).map_err(|e| {
            let id = value
                .get("activityId")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".into());
            RunboxError::Validation(format!("activity {id}: {e}"))
        })?;

        if raw.duration < 0.0 {
            return Err(RunboxError::Validation(format!(
                "activity {}: negative duration {}",
                raw.activity_id, raw.duration
            )));
        }
        if raw.distance < 0.0 {
            return Err(RunboxError::Validation(format!(
                "activity {}: negative distance {}",
                raw.activity_id, raw.distance
            )));
        }
        Ok(raw)
    }

    pub fn is_running(&self) -> bool {
        self.activity_type.type_key == RUNNING
    }

    pub fn name(&self) -> &str {
        self.activity_name.as_deref().unwrap_or("")
    }
}

/// Accepts `2025-03-01 07:15:00` (Garmin) and `2025-03-01T07:15:00`,
/// both with optional fractional seconds.  No timezone is applied.
pub fn parse_local_timestamp(s: &str) -> std::result::Result<NaiveDateTime, String> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("invalid startTimeLocal '{s}'"))
}

fn local_timestamp<'de, D>(deserializer: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_local_timestamp(&s).map_err(serde::de::Error::custom)
}

// ─── place extraction ────────────────────────────────────────────────────

/// Fixed set of known place names, matched against activity titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gazetteer {
    places: BTreeSet<String>,
}

impl Gazetteer {
    pub fn new<I, S>(places: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            places: places
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Capitalized place found in `name`, or an empty string.
    ///
    /// When several tokens match, the alphabetically smallest one wins.
    pub fn place(&self, name: &str) -> String {
        let lowered = name.to_lowercase().replace(',', "");
        lowered
            .split_whitespace()
            .filter(|token| self.places.contains(*token))
            .min()
            .map(capitalize)
            .unwrap_or_default()
    }
}

impl Default for Gazetteer {
    fn default() -> Self {
        Gazetteer::new(DEFAULT_PLACES)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ─── normalized view ─────────────────────────────────────────────────────

/// A running activity reduced to what the heatmap needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedActivity {
    pub id: i64,
    pub date: NaiveDate,
    pub distance_km: f64,
    pub duration_min: f64,
    pub place: String,
}

impl NormalizedActivity {
    pub fn new(raw: &RawActivity, gazetteer: &Gazetteer) -> Self {
        NormalizedActivity {
            id: raw.activity_id,
            date: raw.start_time_local.date(),
            distance_km: raw.distance / 1000.0,
            duration_min: raw.duration / 60.0,
            place: gazetteer.place(raw.name()),
        }
    }
}

/// Validate every record, keep the runs, and normalize them.
///
/// Fails on the first invalid record; there is no partial-success mode.
pub fn normalize_runs(values: &[Value], gazetteer: &Gazetteer) -> Result<Vec<NormalizedActivity>> {
    let raws = values
        .iter()
        .map(RawActivity::from_value)
        .collect::<Result<Vec<_>>>()?;

    let runs: Vec<NormalizedActivity> = raws
        .iter()
        .filter(|raw| raw.is_running())
        .map(|raw| NormalizedActivity::new(raw, gazetteer))
        .collect();

    debug!("{} record(s) validated, {} run(s) kept", raws.len(), runs.len());
    Ok(runs)
}
