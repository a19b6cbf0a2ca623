//! Runbox Chart – fetches this year's runs from Garmin Connect and writes
//! a contribution-style heatmap page.
//!
//! Usage: `runbox-chart [CONFIG]`.  Tokens are read from `$GARTH_HOME`
//! (default `~/.garth`).

mod garmin;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use runbox_common::source::heatmap_from_source;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = runbox_common::config::load_or_default(config_path.as_deref())
        .context("Config load failed")?;

    let now = Local::now().naive_local();
    let today = now.date();
    let year = config.target_year(today);
    let range = config.fetch_range(today)?;
    let bins = config.bins()?;

    info!(
        "Runbox Chart starting (year={year}, range={}..{}, api={})",
        range.first(),
        range.last(),
        config.api_url
    );

    // ── fetch + aggregate ────────────────────────────────────────────
    let client = garmin::GarminClient::connect(&config.api_url, &garmin::token_dir())?;
    let heatmap = heatmap_from_source(&client, &range, year, &config.gazetteer(), &bins)?;

    info!(
        "{year}: {:.1} km, {:.0} min over {} active day(s)",
        heatmap.total_distance_km(),
        heatmap.total_duration_min(),
        heatmap.active_days()
    );

    // ── render ───────────────────────────────────────────────────────
    let title = config.title_for(year, now);
    render::write_html(&heatmap, &config, &title, &config.output)?;

    info!("Successfully created the plot in {}", config.output.display());
    Ok(())
}
