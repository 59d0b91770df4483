// Resource snapshot models (one record per monitored entity)

use serde::{Deserialize, Serialize};

use super::chart::Metric;

/// Kind of monitored entity; serializes to camelCase JSON (e.g. "dockerHost").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Node,
    Host,
    DockerHost,
    K8sCluster,
    K8sNode,
    Truenas,
    Vm,
    Container,
    DockerContainer,
    Pod,
    Storage,
    Pbs,
    Pmg,
    #[serde(other)]
    Unknown,
}

impl ResourceType {
    /// Key used by the metrics store and the history API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Node => "node",
            ResourceType::Host => "host",
            ResourceType::DockerHost => "dockerHost",
            ResourceType::K8sCluster => "k8sCluster",
            ResourceType::K8sNode => "k8sNode",
            ResourceType::Truenas => "truenas",
            ResourceType::Vm => "vm",
            ResourceType::Container => "container",
            ResourceType::DockerContainer => "dockerContainer",
            ResourceType::Pod => "pod",
            ResourceType::Storage => "storage",
            ResourceType::Pbs => "pbs",
            ResourceType::Pmg => "pmg",
            ResourceType::Unknown => "unknown",
        }
    }

    /// Parse a history API type string. "docker" is accepted as an alias of dockerContainer.
    pub fn from_api(s: &str) -> Self {
        match s {
            "node" => ResourceType::Node,
            "host" => ResourceType::Host,
            "dockerHost" => ResourceType::DockerHost,
            "k8sCluster" => ResourceType::K8sCluster,
            "k8sNode" => ResourceType::K8sNode,
            "truenas" => ResourceType::Truenas,
            "vm" | "guest" => ResourceType::Vm,
            "container" => ResourceType::Container,
            "docker" | "dockerContainer" => ResourceType::DockerContainer,
            "pod" => ResourceType::Pod,
            "storage" => ResourceType::Storage,
            "pbs" => ResourceType::Pbs,
            "pmg" => ResourceType::Pmg,
            _ => ResourceType::Unknown,
        }
    }

    /// Backup and mail gateways are services; everything else counts as a host row.
    pub fn is_service(&self) -> bool {
        matches!(self, ResourceType::Pbs | ResourceType::Pmg)
    }

    /// Ordering used by the "default" sort key: infrastructure first, workloads after.
    pub fn sort_rank(&self) -> u8 {
        match self {
            ResourceType::Node => 0,
            ResourceType::Host => 1,
            ResourceType::DockerHost => 2,
            ResourceType::K8sCluster => 3,
            ResourceType::K8sNode => 4,
            ResourceType::Truenas => 5,
            ResourceType::Pbs => 6,
            ResourceType::Pmg => 7,
            ResourceType::Storage => 8,
            ResourceType::Vm => 9,
            ResourceType::Container => 10,
            ResourceType::DockerContainer => 11,
            ResourceType::Pod => 12,
            ResourceType::Unknown => 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Online,
    Offline,
    Degraded,
    Paused,
    #[serde(other)]
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Online => "online",
            ResourceStatus::Offline => "offline",
            ResourceStatus::Degraded => "degraded",
            ResourceStatus::Paused => "paused",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

/// Network throughput in bytes/sec.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkRate {
    pub rx: f64,
    pub tx: f64,
}

impl NetworkRate {
    pub fn total(&self) -> f64 {
        self.rx + self.tx
    }
}

/// Block device throughput in bytes/sec.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskIoRate {
    pub read: f64,
    pub write: f64,
}

impl DiskIoRate {
    pub fn total(&self) -> f64 {
        self.read + self.write
    }
}

/// A monitored entity as published in a snapshot. Utilization fields are 0..1 ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub status: ResourceStatus,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub disk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_io: Option<DiskIoRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    /// Host-agent resource reporting for the same machine, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_agent_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub last_seen: i64,
    #[serde(default)]
    pub platform_data: serde_json::Map<String, serde_json::Value>,
}

impl Resource {
    /// Minimal online resource; collectors and tests fill the rest in.
    pub fn new(id: impl Into<String>, resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type,
            name: name.into(),
            display_name: None,
            status: ResourceStatus::Online,
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            disk_io: None,
            cluster_id: None,
            parent_id: None,
            hostname: None,
            platform_id: None,
            linked_agent_id: None,
            sources: Vec::new(),
            last_seen: 0,
            platform_data: serde_json::Map::new(),
        }
    }

    /// Display name when present and non-empty, otherwise the raw name.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.name,
        }
    }

    pub fn is_host_agent(&self) -> bool {
        self.resource_type == ResourceType::Host && self.sources.iter().any(|s| s == "agent")
    }

    /// Current values in chart units: utilization as percent, rates as bytes/sec.
    /// Metrics the resource does not report are left out.
    pub fn metric_values(&self) -> Vec<(Metric, f64)> {
        let mut out = Vec::with_capacity(Metric::ALL.len());
        for (metric, ratio) in [
            (Metric::Cpu, self.cpu),
            (Metric::Memory, self.memory),
            (Metric::Disk, self.disk),
        ] {
            if let Some(r) = ratio.filter(|r| r.is_finite()) {
                out.push((metric, r * 100.0));
            }
        }
        if let Some(n) = &self.network {
            out.push((Metric::Netin, n.rx));
            out.push((Metric::Netout, n.tx));
        }
        if let Some(io) = &self.disk_io {
            out.push((Metric::Diskread, io.read));
            out.push((Metric::Diskwrite, io.write));
        }
        out
    }
}

/// A complete published resource list. Replaced wholesale on every collection tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub timestamp: i64,
    pub resources: Vec<Resource>,
}
