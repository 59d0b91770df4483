// Text cells for the mounted window of a table view.

use serde::Serialize;

use super::view::{TableRow, TableView};
use crate::charts::resolve_series;
use crate::models::{ChartData, ChartMap, Resource};
use crate::selectors::compute_io_scale;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCells {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: String,
    pub status: String,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub network: String,
    pub disk_io: String,
    /// 0..1 against the visible set's p90, for sparkline colouring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<ChartData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderedRow {
    #[serde(rename_all = "camelCase")]
    GroupHeader { label: String, count: usize },
    Resource(ResourceCells),
    #[serde(rename_all = "camelCase")]
    Detail { id: String, fields: Vec<(String, String)> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTable {
    pub rows: Vec<RenderedRow>,
    pub padding_top: usize,
    pub padding_bottom: usize,
    pub total_rows: usize,
    pub windowed: bool,
}

impl RenderedTable {
    /// One line per row, cells separated by " | ". Used for logs and assertions.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let line = match row {
                RenderedRow::GroupHeader { label, count } => format!("## {} ({})", label, count),
                RenderedRow::Resource(c) => [
                    c.name.as_str(),
                    &c.type_label,
                    &c.status,
                    &c.cpu,
                    &c.memory,
                    &c.disk,
                    &c.network,
                    &c.disk_io,
                ]
                .join(" | "),
                RenderedRow::Detail { fields, .. } => fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

pub fn format_percent(ratio: Option<f64>) -> String {
    match ratio.filter(|r| r.is_finite()) {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "-".to_string(),
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    let mut v = bytes_per_sec;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0} {}", v, UNITS[unit])
    } else {
        format!("{:.1} {}", v, UNITS[unit])
    }
}

/// Render the mounted rows of `view`. Overlays are resolved only for mounted resource rows.
pub fn render_table(view: &mut TableView, charts: Option<&ChartMap>) -> RenderedTable {
    let rows = view.rows();
    let window = view.window();
    let visible = view.visible_resources();

    let all = view.resources();
    let visible_refs: Vec<&Resource> = visible.iter().filter_map(|&i| all.get(i)).collect();
    let scale = compute_io_scale(&visible_refs);

    let rendered = rows[window.start..window.end]
        .iter()
        .filter_map(|row| match row {
            TableRow::GroupHeader { label, count, .. } => Some(RenderedRow::GroupHeader {
                label: label.clone(),
                count: *count,
            }),
            TableRow::Resource { index } => all.get(*index).map(|r| {
                RenderedRow::Resource(ResourceCells {
                    id: r.id.clone(),
                    name: r.label().to_string(),
                    type_label: r.resource_type.as_str().to_string(),
                    status: r.status.as_str().to_string(),
                    cpu: format_percent(r.cpu),
                    memory: format_percent(r.memory),
                    disk: format_percent(r.disk),
                    network: r.network.map_or("-".into(), |n| format_rate(n.total())),
                    disk_io: r.disk_io.map_or("-".into(), |io| format_rate(io.total())),
                    network_intensity: r.network.map(|n| scale.network.intensity(n.total())),
                    disk_io_intensity: r.disk_io.map(|io| scale.disk_io.intensity(io.total())),
                    overlay: charts.and_then(|c| resolve_series(c, r, all)),
                })
            }),
            TableRow::Detail { index } => all.get(*index).map(|r| RenderedRow::Detail {
                id: r.id.clone(),
                fields: detail_fields(r),
            }),
        })
        .collect();

    RenderedTable {
        rows: rendered,
        padding_top: window.padding_top(),
        padding_bottom: window.padding_bottom(),
        total_rows: window.total,
        windowed: window.windowed,
    }
}

fn detail_fields(r: &Resource) -> Vec<(String, String)> {
    let mut fields = vec![("id".to_string(), r.id.clone())];
    if let Some(h) = &r.hostname {
        fields.push(("hostname".into(), h.clone()));
    }
    if let Some(p) = &r.parent_id {
        fields.push(("parent".into(), p.clone()));
    }
    if let Some(p) = &r.platform_id {
        fields.push(("platformId".into(), p.clone()));
    }
    if !r.sources.is_empty() {
        fields.push(("sources".into(), r.sources.join(",")));
    }
    fields.push(("lastSeen".into(), r.last_seen.to_string()));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_scale_through_units() {
        assert_eq!(format_rate(0.0), "0 B/s");
        assert_eq!(format_rate(512.0), "512 B/s");
        assert_eq!(format_rate(1536.0), "1.5 KB/s");
        assert_eq!(format_rate(5.0 * 1024.0 * 1024.0), "5.0 MB/s");
    }

    #[test]
    fn percent_handles_missing() {
        assert_eq!(format_percent(Some(0.425)), "42.5%");
        assert_eq!(format_percent(None), "-");
    }
}
