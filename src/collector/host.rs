// The local machine as a `host` resource, via sysinfo.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use sysinfo::{Disks, Networks, System};
use tracing::instrument;

use super::{CounterRate, linux};
use crate::models::{DiskIoRate, NetworkRate, Resource, ResourceStatus, ResourceType};

/// Static facts read once at startup.
#[derive(Debug, Clone)]
struct HostIdentity {
    hostname: String,
    os_name: String,
    os_version: String,
    kernel_version: String,
    cpu_model: String,
    cpu_cores: usize,
    vendor: Option<String>,
}

struct HostState {
    sys: System,
    disks: Disks,
    networks: Networks,
    network_rate: CounterRate,
    disk_rate: CounterRate,
}

pub struct HostCollector {
    state: Arc<Mutex<HostState>>,
    identity: HostIdentity,
    cluster: Option<String>,
}

impl HostCollector {
    /// `cluster` is the grouping key given to this host and its containers.
    pub fn new(cluster: Option<String>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let hostname = System::host_name().unwrap_or_else(|| "localhost".into());
        let cpu_model = linux::cpu_model()
            .or_else(|| {
                sys.cpus()
                    .first()
                    .map(|c| c.brand().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "Unknown".into());
        let identity = HostIdentity {
            os_name: linux::os_pretty_name()
                .or_else(System::name)
                .unwrap_or_else(|| std::env::consts::OS.into()),
            os_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            cpu_cores: sys.cpus().len(),
            vendor: linux::system_vendor(),
            cpu_model,
            hostname,
        };
        Self {
            state: Arc::new(Mutex::new(HostState {
                sys,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
                network_rate: CounterRate::default(),
                disk_rate: CounterRate::default(),
            })),
            identity,
            cluster,
        }
    }

    pub fn host_id(&self) -> String {
        format!("host:{}", self.identity.hostname)
    }

    #[instrument(skip(self), fields(collector = "host", operation = "collect"))]
    pub async fn collect(&self, now_ms: i64) -> anyhow::Result<Resource> {
        let state = self.state.clone();
        let identity = self.identity.clone();
        let id = self.host_id();
        let cluster = self.cluster.clone();
        tokio::task::spawn_blocking(move || {
            let mut state = state
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            let now = Instant::now();
            let HostState {
                sys,
                disks,
                networks,
                network_rate,
                disk_rate,
            } = &mut *state;

            sys.refresh_cpu_all();
            sys.refresh_memory();
            disks.refresh(true);
            networks.refresh(true);

            let cpu = (f64::from(sys.global_cpu_usage()) / 100.0).clamp(0.0, 1.0);
            let total_mem = sys.total_memory();
            let memory = (total_mem > 0).then(|| {
                total_mem.saturating_sub(sys.available_memory()) as f64 / total_mem as f64
            });

            let (disk_total, disk_avail, read_bytes, written_bytes) = disks.list().iter().fold(
                (0u64, 0u64, 0u64, 0u64),
                |(t, a, r, w), d| {
                    let usage = d.usage();
                    (
                        t + d.total_space(),
                        a + d.available_space(),
                        r + usage.total_read_bytes,
                        w + usage.total_written_bytes,
                    )
                },
            );
            let disk = (disk_total > 0)
                .then(|| disk_total.saturating_sub(disk_avail) as f64 / disk_total as f64);

            let (rx, tx) = networks
                .list()
                .iter()
                .filter(|(name, _)| name.as_str() != "lo")
                .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                    (rx + data.total_received(), tx + data.total_transmitted())
                });

            let network = network_rate
                .update(rx, tx, now)
                .map(|(rx, tx)| NetworkRate { rx, tx });
            let disk_io = disk_rate
                .update(read_bytes, written_bytes, now)
                .map(|(read, write)| DiskIoRate { read, write });

            let mut r = Resource::new(id, ResourceType::Host, identity.hostname.clone());
            r.status = ResourceStatus::Online;
            r.cpu = Some(cpu);
            r.memory = memory;
            r.disk = disk;
            r.network = network;
            r.disk_io = disk_io;
            r.hostname = Some(identity.hostname.clone());
            r.platform_id = Some(identity.hostname.clone());
            r.cluster_id = cluster;
            r.sources = vec!["agent".to_string()];
            r.last_seen = now_ms;
            let pd = &mut r.platform_data;
            pd.insert("osName".into(), identity.os_name.into());
            pd.insert("osVersion".into(), identity.os_version.into());
            pd.insert("kernelVersion".into(), identity.kernel_version.into());
            pd.insert("cpuModel".into(), identity.cpu_model.into());
            pd.insert("cpuCores".into(), identity.cpu_cores.into());
            pd.insert("uptimeSecs".into(), System::uptime().into());
            pd.insert("memoryTotalBytes".into(), total_mem.into());
            if let Some(v) = identity.vendor {
                pd.insert("systemVendor".into(), v.into());
            }
            Ok(r)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}
