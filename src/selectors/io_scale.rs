// Distribution statistics used to colour network / disk I/O sparklines

use crate::models::Resource;
use serde::Serialize;

/// Summary of one I/O dimension across the resources that report it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IoStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p90: f64,
}

impl IoStats {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.retain(|v| v.is_finite());
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);
        Self {
            count: samples.len(),
            min: samples[0],
            max: samples[samples.len() - 1],
            median: percentile(&samples, 0.5),
            p90: percentile(&samples, 0.9),
        }
    }

    /// Map a rate onto 0..1 relative to the 90th percentile (values above it saturate).
    pub fn intensity(&self, value: f64) -> f64 {
        if self.count == 0 || !value.is_finite() || value <= 0.0 {
            return 0.0;
        }
        let scale = if self.p90 > 0.0 { self.p90 } else { self.max };
        if scale <= 0.0 {
            return 0.0;
        }
        (value / scale).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IoScale {
    pub network: IoStats,
    pub disk_io: IoStats,
}

/// Linear interpolation between closest ranks; `sorted` must be ascending and non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Resources without a network / disk I/O reading are left out of that dimension's sample.
pub fn compute_io_scale(resources: &[&Resource]) -> IoScale {
    let network = resources
        .iter()
        .filter_map(|r| r.network.map(|n| n.total()))
        .collect();
    let disk_io = resources
        .iter()
        .filter_map(|r| r.disk_io.map(|d| d.total()))
        .collect();
    IoScale {
        network: IoStats::from_samples(network),
        disk_io: IoStats::from_samples(disk_io),
    }
}
