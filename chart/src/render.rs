//! Static HTML output – a plotly.js heatmap embedded in a single page.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;

use runbox_common::aggregate::Heatmap;
use runbox_common::calendar::month_ticks;
use runbox_common::config::Config;
use runbox_common::style::{color_scale, colorbar_ticks, LayoutColors, WEEKDAY_TICKS};

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const WIDTH: u32 = 1000;
const HEIGHT: u32 = 300;

/// Stepwise colour scale so every bucket gets exactly one flat colour.
fn discrete_colorscale(colors: &[String]) -> Value {
    if let [only] = colors {
        return json!([[0.0, only], [1.0, only]]);
    }
    let n = colors.len() as f64;
    let steps: Vec<Value> = colors
        .iter()
        .enumerate()
        .flat_map(|(i, c)| [json!([i as f64 / n, c]), json!([(i + 1) as f64 / n, c])])
        .collect();
    Value::Array(steps)
}

/// Plotly figure (`{"data": [...], "layout": {...}}`) for `heatmap`.
pub fn figure(heatmap: &Heatmap, config: &Config, title: &str) -> Result<Value> {
    let num_colors = heatmap.num_buckets;
    let colors = color_scale(num_colors, config.mode, config.hue, config.saturation);
    let layout_colors = LayoutColors::for_mode(config.mode);
    let ticks = month_ticks(heatmap.year)?;

    let z: Vec<&[Option<usize>]> = heatmap.buckets.rows().collect();
    let text: Vec<&[Option<String>]> = heatmap.labels.rows().collect();
    let weeks: Vec<usize> = (0..heatmap.buckets.weeks()).collect();

    let trace = json!({
        "type": "heatmap",
        "z": z,
        "x": weeks,
        "y": (0..7).collect::<Vec<u32>>(),
        "zmin": 0,
        "zmax": num_colors.saturating_sub(1),
        "colorscale": discrete_colorscale(&colors),
        "xgap": 2,
        "ygap": 2,
        "colorbar": {
            "title": {"text": "km"},
            "tickvals": (0..num_colors).collect::<Vec<usize>>(),
            "ticktext": colorbar_ticks(num_colors),
        },
        "hoverongaps": false,
        "text": text,
        "hovertemplate": " %{text}<br><extra></extra>",
    });

    let mut layout = json!({
        "title": {"text": title},
        "width": WIDTH,
        "height": HEIGHT,
        "plot_bgcolor": layout_colors.plot_bg,
        "paper_bgcolor": layout_colors.paper_bg,
        "xaxis": {
            "tickmode": "array",
            "tickvals": ticks.iter().map(|t| t.week).collect::<Vec<u32>>(),
            "ticktext": ticks.iter().map(|t| t.label).collect::<Vec<&str>>(),
            "showgrid": false,
            "zeroline": false,
        },
        "yaxis": {
            "scaleanchor": "x",
            "autorange": "reversed",
            "tickmode": "array",
            "range": [-0.5, 6.5],
            "tickvals": (0..7).collect::<Vec<u32>>(),
            "ticktext": WEEKDAY_TICKS,
            "showgrid": false,
            "zeroline": false,
        },
    });
    if let Some(font) = layout_colors.font {
        layout["font"] = json!({"color": font});
        layout["xaxis"]["color"] = json!(font);
        layout["yaxis"]["color"] = json!(font);
    }
    if let Some(grid) = layout_colors.grid {
        layout["xaxis"]["gridcolor"] = json!(grid);
        layout["yaxis"]["gridcolor"] = json!(grid);
    }

    Ok(json!({"data": [trace], "layout": layout}))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Self-contained page drawing `figure`.
pub fn html(figure: &Value, title: &str) -> String {
    // A literal "</" would end the script element early.
    let figure_json = figure.to_string().replace("</", "<\\/");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <script src="{PLOTLY_JS}" charset="utf-8"></script>
</head>
<body>
    <div id="heatmap"></div>
    <script>
        const figure = {figure_json};
        Plotly.newPlot("heatmap", figure.data, figure.layout, {{responsive: true}});
    </script>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

/// Render `heatmap` and write the page to `path`, creating parent
/// directories as needed.
pub fn write_html(heatmap: &Heatmap, config: &Config, title: &str, path: &Path) -> Result<()> {
    let page = html(&figure(heatmap, config, title)?, title);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    std::fs::write(path, page).with_context(|| format!("Cannot write {}", path.display()))?;
    info!("Wrote heatmap to {}", path.display());
    Ok(())
}
