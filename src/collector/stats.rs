// Docker stats API response -> per-container counters and rates.

use bollard::models::ContainerStatsResponse;

use crate::models::{DiskIoRate, NetworkRate};

/// One stats frame reduced to what a container resource needs. Byte counters are cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct ContainerCounters {
    /// 0..1 of the host's CPU capacity.
    pub cpu: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
    pub pids: u64,
}

impl ContainerCounters {
    pub fn memory_ratio(&self) -> Option<f64> {
        (self.memory_limit_bytes > 0)
            .then(|| self.memory_usage_bytes as f64 / self.memory_limit_bytes as f64)
    }

    /// Byte rates since `prev`, `elapsed_secs` apart. Counter resets read as zero.
    pub fn rates_since(&self, prev: &ContainerCounters, elapsed_secs: f64) -> (NetworkRate, DiskIoRate) {
        if elapsed_secs <= 0.0 {
            return (NetworkRate::default(), DiskIoRate::default());
        }
        let rate = |now: u64, before: u64| now.saturating_sub(before) as f64 / elapsed_secs;
        (
            NetworkRate {
                rx: rate(self.network_rx_bytes, prev.network_rx_bytes),
                tx: rate(self.network_tx_bytes, prev.network_tx_bytes),
            },
            DiskIoRate {
                read: rate(self.block_read_bytes, prev.block_read_bytes),
                write: rate(self.block_write_bytes, prev.block_write_bytes),
            },
        )
    }
}

/// `None` when the frame lacks the CPU sections needed for a usage delta.
pub(crate) fn process_statistics(s: &ContainerStatsResponse) -> Option<ContainerCounters> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    // system_cpu_usage already sums every core, so the ratio is against total host capacity.
    let cpu = if system_delta > 0 && cpu_delta > 0 {
        (cpu_delta as f64 / system_delta as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let memory = s.memory_stats.as_ref();
    let memory_usage_bytes = memory.and_then(|m| m.usage).unwrap_or(0);
    let memory_limit_bytes = memory.and_then(|m| m.limit).unwrap_or(0);

    let (network_rx_bytes, network_tx_bytes) = s.networks.as_ref().map_or((0, 0), |n| {
        n.values().fold((0u64, 0u64), |(rx, tx), v| {
            (rx + v.rx_bytes.unwrap_or(0), tx + v.tx_bytes.unwrap_or(0))
        })
    });

    let (block_read_bytes, block_write_bytes) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0, 0), |entries| {
            entries.iter().fold((0u64, 0u64), |(read, write), e| {
                let v = e.value.unwrap_or(0);
                match e.op.as_deref() {
                    Some(op) if op.eq_ignore_ascii_case("read") => (read + v, write),
                    Some(op) if op.eq_ignore_ascii_case("write") => (read, write + v),
                    _ => (read, write),
                }
            })
        });

    let pids = s.pids_stats.as_ref().and_then(|p| p.current).unwrap_or(0);

    Some(ContainerCounters {
        cpu,
        memory_usage_bytes,
        memory_limit_bytes,
        network_rx_bytes,
        network_tx_bytes,
        block_read_bytes,
        block_write_bytes,
        pids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerBlkioStatEntry, ContainerBlkioStats, ContainerCpuStats, ContainerCpuUsage,
        ContainerMemoryStats, ContainerNetworkStats, ContainerPidsStats, ContainerStatsResponse,
    };
    use std::collections::HashMap;

    fn cpu_stats(total_usage: u64, system_cpu_usage: u64) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(2),
            throttling_data: None,
        }
    }

    #[test]
    fn returns_none_without_cpu_sections() {
        let s = ContainerStatsResponse {
            cpu_stats: None,
            precpu_stats: Some(cpu_stats(0, 0)),
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());

        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100, 1000)),
            precpu_stats: None,
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());
    }

    #[test]
    fn computes_cpu_memory_and_counters() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100_000_000, 1_000_000_000)),
            precpu_stats: Some(cpu_stats(50_000_000, 500_000_000)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                limit: Some(512 * 1024 * 1024),
                ..Default::default()
            }),
            networks: Some(HashMap::from([(
                "eth0".to_string(),
                ContainerNetworkStats {
                    rx_bytes: Some(1000),
                    tx_bytes: Some(2000),
                    ..Default::default()
                },
            )])),
            pids_stats: Some(ContainerPidsStats {
                current: Some(5),
                ..Default::default()
            }),
            blkio_stats: Some(ContainerBlkioStats {
                io_service_bytes_recursive: Some(vec![
                    ContainerBlkioStatEntry {
                        op: Some("read".to_string()),
                        value: Some(100),
                        ..Default::default()
                    },
                    ContainerBlkioStatEntry {
                        op: Some("Write".to_string()),
                        value: Some(200),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        assert!((out.cpu - 0.1).abs() < 1e-9);
        assert_eq!(out.memory_ratio(), Some(0.5));
        assert_eq!(out.network_rx_bytes, 1000);
        assert_eq!(out.network_tx_bytes, 2000);
        assert_eq!(out.block_read_bytes, 100);
        assert_eq!(out.block_write_bytes, 200);
        assert_eq!(out.pids, 5);
    }

    #[test]
    fn zero_system_delta_reads_as_idle() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100, 500)),
            precpu_stats: Some(cpu_stats(50, 500)),
            ..Default::default()
        };
        assert_eq!(process_statistics(&s).unwrap().cpu, 0.0);
    }

    #[test]
    fn rates_divide_deltas_by_elapsed() {
        let prev = ContainerCounters {
            network_rx_bytes: 1_000,
            block_write_bytes: 500,
            ..Default::default()
        };
        let now = ContainerCounters {
            network_rx_bytes: 3_000,
            block_write_bytes: 100,
            ..Default::default()
        };
        let (net, io) = now.rates_since(&prev, 2.0);
        assert_eq!(net.rx, 1_000.0);
        assert_eq!(io.write, 0.0);
        assert_eq!(now.memory_ratio(), None);
    }
}
