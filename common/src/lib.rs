//! Runbox core – turns a year of running activities into the two grids of a
//! contribution-style heatmap.
//!
//! Pipeline: raw JSON records → [`activity::NormalizedActivity`] →
//! [`aggregate::DailyRecord`] → [`aggregate::Grid`].  Every stage is a pure
//! function of its input.

pub mod activity;
pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod error;
pub mod source;
pub mod style;

pub use error::{Result, RunboxError};
