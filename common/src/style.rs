//! Colours and axis labels handed to the renderer.

use serde::Deserialize;

/// Colour theme of the chart.  Only the "no activity" colour and the
/// backgrounds depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Light,
    Dark,
}

/// Y-axis labels for the weekday rows, Sunday first.  Trailing spaces keep
/// the labels clear of the first column.
pub const WEEKDAY_TICKS: [&str; 7] = ["", "Mon  ", "", "Wed  ", "", "Fri  ", ""];

const EMPTY_LIGHT: &str = "#f0f0f0";
const EMPTY_DARK: &str = "#333333";
const MUDDY_WHITE: &str = "#C9D1D9";

/// Convert HSL (all components in 0–1) to a `#rrggbb` string.
///
/// Channels are truncated, not rounded, when scaled to 0–255.
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let (r, g, b) = hls_to_rgb(hue, lightness, saturation);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0) as u8,
        (g * 255.0) as u8,
        (b * 255.0) as u8
    )
}

fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    (
        hue_channel(m1, m2, h + 1.0 / 3.0),
        hue_channel(m1, m2, h),
        hue_channel(m1, m2, h - 1.0 / 3.0),
    )
}

fn hue_channel(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < 1.0 / 6.0 {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < 2.0 / 3.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
    } else {
        m1
    }
}

/// `n` evenly spaced values from `start` to `stop`, both included.
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            values[n - 1] = stop;
            values
        }
    }
}

/// Colour per bucket: the "no activity" colour for bucket 0, then
/// `num_colors - 1` shades of `hue` (0–360) getting darker with distance.
pub fn color_scale(num_colors: usize, mode: Mode, hue: f64, saturation: f64) -> Vec<String> {
    let empty = match mode {
        Mode::Light => EMPTY_LIGHT,
        Mode::Dark => EMPTY_DARK,
    };
    let hue = hue / 360.0;

    let mut colors = Vec::with_capacity(num_colors.max(1));
    colors.push(empty.to_string());
    colors.extend(
        linspace(0.85, 0.15, num_colors.saturating_sub(1))
            .into_iter()
            .map(|lightness| hsl_to_hex(hue, saturation, lightness)),
    );
    colors
}

/// Colour-bar labels: "less" on the first bucket, "more" on the last.
pub fn colorbar_ticks(num_colors: usize) -> Vec<&'static str> {
    let mut ticks = vec![""; num_colors];
    if let Some(first) = ticks.first_mut() {
        *first = "less";
    }
    if let Some(last) = ticks.last_mut() {
        *last = "more";
    }
    ticks
}

/// Background and text colours for a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutColors {
    pub plot_bg: &'static str,
    pub paper_bg: &'static str,
    pub font: Option<&'static str>,
    /// Axis grid colour; plotly's default when `None`.
    pub grid: Option<&'static str>,
}

impl LayoutColors {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Light => LayoutColors {
                plot_bg: "white",
                paper_bg: "white",
                font: None,
                grid: None,
            },
            Mode::Dark => LayoutColors {
                plot_bg: "black",
                paper_bg: "black",
                font: Some(MUDDY_WHITE),
                grid: Some("black"),
            },
        }
    }
}
