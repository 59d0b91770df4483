// Time-series models shared by the history store, the chart cache and the table overlay

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metric names as stored in the metrics table and sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    Netin,
    Netout,
    Diskread,
    Diskwrite,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Disk,
        Metric::Netin,
        Metric::Netout,
        Metric::Diskread,
        Metric::Diskwrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
            Metric::Netin => "netin",
            Metric::Netout => "netout",
            Metric::Diskread => "diskread",
            Metric::Diskwrite => "diskwrite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Metric::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Unix millis.
    pub timestamp: i64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl MetricPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            min: None,
            max: None,
        }
    }
}

/// Series per metric for one resource. Each series is ordered by timestamp; empty is valid.
pub type ChartData = BTreeMap<Metric, Vec<MetricPoint>>;

/// Chart data per series key (resource id, name or composite key).
pub type ChartMap = HashMap<String, ChartData>;

/// True when at least one series in the map holds a point.
pub fn chart_data_has_points(data: &ChartData) -> bool {
    data.values().any(|s| !s.is_empty())
}
