// Snapshot collection: the local host (sysinfo) plus its running Docker containers (bollard).

mod docker;
mod host;
mod linux;
mod stats;

pub use docker::DockerCollector;
pub use host::HostCollector;

use std::time::Instant;

use crate::models::ResourceSnapshot;

/// Per-second rate of two cumulative counters between successive updates.
#[derive(Debug, Default)]
pub(crate) struct CounterRate {
    prev: Option<(u64, u64, Instant)>,
}

impl CounterRate {
    /// `None` on the first update (no baseline yet).
    pub fn update(&mut self, a: u64, b: u64, now: Instant) -> Option<(f64, f64)> {
        let out = self.prev.and_then(|(pa, pb, at)| {
            let secs = now.saturating_duration_since(at).as_secs_f64();
            (secs > 0.0).then(|| {
                (
                    a.saturating_sub(pa) as f64 / secs,
                    b.saturating_sub(pb) as f64 / secs,
                )
            })
        });
        self.prev = Some((a, b, now));
        out
    }
}

pub struct Collector {
    host: HostCollector,
    docker: Option<DockerCollector>,
}

impl Collector {
    pub fn new(host: HostCollector, docker: Option<DockerCollector>) -> Self {
        Self { host, docker }
    }

    /// Host first, then its containers. A failed host read fails the whole tick.
    pub async fn collect(&self, now_ms: i64) -> anyhow::Result<ResourceSnapshot> {
        let host = self.host.collect(now_ms).await?;
        let containers = match &self.docker {
            Some(d) => d.collect(&host, now_ms).await,
            None => Vec::new(),
        };
        let mut resources = Vec::with_capacity(1 + containers.len());
        resources.push(host);
        resources.extend(containers);
        Ok(ResourceSnapshot {
            timestamp: now_ms,
            resources,
        })
    }
}
