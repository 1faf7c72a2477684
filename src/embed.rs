//! Serialize finished charts for embedding in a page.

use crate::chart::{ChartConfig, ChartOptions};
use serde_json::Value as Json;

/// Collect the options of `charts` into one JSON array.
///
/// `render_to` is a comma separated list of element ids, one per chart. A blank
/// entry, or a missing one, keeps the chart's own `chart.renderTo`.
pub fn charts_to_value(charts: &[&dyn ChartConfig], render_to: &str) -> Json {
    let targets: Vec<&str> = render_to.split(',').map(str::trim).collect();
    let array = charts
        .iter()
        .enumerate()
        .map(|(i, chart)| {
            let mut options: ChartOptions = chart.options().clone();
            if let Some(target) = targets.get(i).filter(|t| !t.is_empty()) {
                let chart_section = options
                    .entry("chart")
                    .or_insert_with(|| Json::Object(ChartOptions::new()));
                if !chart_section.is_object() {
                    *chart_section = Json::Object(ChartOptions::new());
                }
                if let Json::Object(section) = chart_section {
                    section.insert("renderTo".to_string(), Json::String(target.to_string()));
                }
            }
            Json::Object(options)
        })
        .collect();
    Json::Array(array)
}

/// [`charts_to_value`] rendered as a JSON string.
pub fn charts_to_json(charts: &[&dyn ChartConfig], render_to: &str) -> serde_json::Result<String> {
    serde_json::to_string(&charts_to_value(charts, render_to))
}
