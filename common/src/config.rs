//! Configuration parsing – reads an optional `runbox.toml`.
//!
//! Every key is optional; a missing file means "all defaults".
//!
//! ```toml
//! bins = [-1, 0, 3, 5, 8, 100]
//! hue = 336
//! saturation = 0.7
//! mode = "dark"
//! title = "Running 2025"
//! output = "site/index.html"
//! year = 2025
//! places = ["berlin", "toulouse"]
//! api_url = "https://connectapi.garmin.com"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::info;

use crate::activity::{Gazetteer, DEFAULT_PLACES};
use crate::aggregate::{Bins, DEFAULT_BIN_EDGES};
use crate::calendar::{date_range, year_range, DateRange};
use crate::style::Mode;

pub const DEFAULT_API_URL: &str = "https://connectapi.garmin.com";

/// Chart and data-source settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ascending kilometre bin edges.
    pub bins: Vec<f64>,
    /// Hue of the colour ramp, 0–360.
    pub hue: f64,
    /// Saturation of the colour ramp, 0–1.
    pub saturation: f64,
    pub mode: Mode,
    /// Page title; generated from the year and the current time when unset.
    pub title: Option<String>,
    pub output: PathBuf,
    /// Year to chart; the current year when unset.
    pub year: Option<i32>,
    /// Known place names matched against activity titles.
    pub places: Vec<String>,
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bins: DEFAULT_BIN_EDGES.to_vec(),
            hue: 336.0,
            saturation: 0.7,
            mode: Mode::Light,
            title: None,
            output: PathBuf::from("site/index.html"),
            year: None,
            places: DEFAULT_PLACES.iter().map(|p| p.to_string()).collect(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Config {
    /// Default config path, relative to the working directory.
    pub fn default_path() -> &'static str {
        "runbox.toml"
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=360.0).contains(&self.hue) {
            anyhow::bail!("hue must be within 0–360, got {}", self.hue);
        }
        if !(0.0..=1.0).contains(&self.saturation) {
            anyhow::bail!("saturation must be within 0–1, got {}", self.saturation);
        }
        self.bins()?;
        Ok(())
    }

    pub fn bins(&self) -> crate::Result<Bins> {
        Bins::new(self.bins.clone())
    }

    pub fn gazetteer(&self) -> Gazetteer {
        Gazetteer::new(&self.places)
    }

    pub fn target_year(&self, today: NaiveDate) -> i32 {
        self.year.unwrap_or_else(|| today.year())
    }

    /// Dates to request from the data source: January 1st up to today for
    /// the current year, the whole year otherwise.
    pub fn fetch_range(&self, today: NaiveDate) -> crate::Result<DateRange> {
        let year = self.target_year(today);
        let full = year_range(year)?;
        if full.contains(today) {
            date_range(full.first(), today)
        } else {
            Ok(full)
        }
    }

    pub fn title_for(&self, year: i32, now: NaiveDateTime) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!(
                "Running {year} (last updated on {})",
                now.format("%-d.%-m.%Y at %-I:%M%p")
            ),
        }
    }
}

/// Parse a TOML configuration string.
pub fn parse(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text).context("Invalid configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("In {}", path.display()))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Load `path` if given, else [`Config::default_path`] if it exists, else
/// fall back to the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load(path);
    }
    let default = Path::new(Config::default_path());
    if default.exists() {
        load(default)
    } else {
        info!("No {} found, using built-in defaults", default.display());
        Ok(Config::default())
    }
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_empty_is_default() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bins().unwrap(), Bins::default());
        assert_eq!(config.output, PathBuf::from("site/index.html"));
    }

    #[test]
    fn test_parse_full() {
        let text = r#"
bins = [-1, 0, 5, 10, 50]
hue = 120
saturation = 0.5
mode = "dark"
title = "My runs"
output = "out/chart.html"
year = 2024
places = ["Hannover"]
"#;
        let config = parse(text).unwrap();
        assert_eq!(config.bins().unwrap().num_buckets(), 4);
        assert_eq!(config.mode, Mode::Dark);
        assert_eq!(config.year, Some(2024));
        assert_eq!(config.gazetteer().place("hannover loop"), "Hannover");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse("hue = 400").is_err());
        assert!(parse("saturation = 1.5").is_err());
        assert!(parse("bins = [5, 3]").is_err());
        assert!(parse("colour = \"red\"").is_err());
    }

    #[test]
    fn test_fetch_range() {
        let config = Config::default();
        let today = ymd(2025, 7, 27);
        let range = config.fetch_range(today).unwrap();
        assert_eq!(range.first(), ymd(2025, 1, 1));
        assert_eq!(range.last(), today);

        let past = Config {
            year: Some(2024),
            ..Config::default()
        };
        let range = past.fetch_range(today).unwrap();
        assert_eq!(range.last(), ymd(2024, 12, 31));
        assert_eq!(range.num_days(), 366);
    }

    #[test]
    fn test_default_title() {
        let now = ymd(2025, 7, 27).and_hms_opt(18, 5, 0).unwrap();
        assert_eq!(
            Config::default().title_for(2025, now),
            "Running 2025 (last updated on 27.7.2025 at 6:05PM)"
        );
        let fixed = Config {
            title: Some("Kilometres".into()),
            ..Config::default()
        };
        assert_eq!(fixed.title_for(2025, now), "Kilometres");
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("runbox_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runbox.toml");
        std::fs::write(&path, "hue = 200\n").unwrap();
        let config = load_or_default(Some(&path)).unwrap();
        assert_eq!(config.hue, 200.0);

        assert!(load(&dir.join("missing.toml")).is_err());
    }
}
