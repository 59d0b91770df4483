// Docker containers via bollard: one long-lived stats stream per running container.

use bollard::Docker;
use bollard::query_parameters::{ListContainersOptions, StatsOptions};
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::stats::{self, ContainerCounters};
use crate::models::{DiskIoRate, NetworkRate, Resource, ResourceStatus, ResourceType};

#[derive(Debug, Clone)]
struct LiveContainer {
    name: String,
    image: Option<String>,
    counters: ContainerCounters,
    network: Option<NetworkRate>,
    disk_io: Option<DiskIoRate>,
}

pub struct DockerCollector {
    docker: Docker,
    live: Arc<RwLock<HashMap<String, LiveContainer>>>,
    streams: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl DockerCollector {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self {
            docker,
            live: Arc::new(RwLock::new(HashMap::new())),
            streams: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Reconcile stats streams with the running set and return one resource per container
    /// that has reported at least one frame. On list failure the last known set is returned.
    pub async fn collect(&self, host: &Resource, now_ms: i64) -> Vec<Resource> {
        let filter = ListContainersOptions {
            all: false,
            filters: Some(HashMap::from([(
                "status".to_string(),
                vec!["running".to_string()],
            )])),
            ..Default::default()
        };

        match self.docker.list_containers(Some(filter)).await {
            Ok(containers) => {
                let running: Vec<(String, String, Option<String>)> = containers
                    .into_iter()
                    .filter_map(|c| {
                        let id = c.id?;
                        let name = c
                            .names
                            .and_then(|n| n.into_iter().next())
                            .map(|n| n.trim_start_matches('/').to_string())
                            .unwrap_or_else(|| id.clone());
                        Some((id, name, c.image))
                    })
                    .collect();
                self.reconcile(running).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "list_containers", "docker list failed");
            }
        }

        let live = self.live.read().await;
        let mut out: Vec<Resource> = live
            .iter()
            .map(|(id, c)| container_resource(id, c, host, now_ms))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    async fn reconcile(&self, running: Vec<(String, String, Option<String>)>) {
        let running_ids: HashSet<&str> = running.iter().map(|(id, _, _)| id.as_str()).collect();
        let mut streams = self.streams.write().await;

        let gone: Vec<String> = streams
            .keys()
            .filter(|id| !running_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &gone {
            if let Some(handle) = streams.remove(id) {
                handle.abort();
            }
        }
        if !gone.is_empty() {
            let mut live = self.live.write().await;
            for id in &gone {
                live.remove(id);
            }
            tracing::debug!(removed = gone.len(), "stopped stats streams for exited containers");
        }

        for (id, name, image) in running {
            if streams.contains_key(&id) {
                continue;
            }
            let handle = self.start_stream(id.clone(), name, image);
            streams.insert(id, handle);
        }
    }

    fn start_stream(&self, id: String, name: String, image: Option<String>) -> JoinHandle<()> {
        let docker = self.docker.clone();
        let live = self.live.clone();
        let streams = self.streams.clone();

        tokio::spawn(async move {
            let options = StatsOptions {
                stream: true,
                ..Default::default()
            };
            let mut stream = docker.stats(&id, Some(options));
            let mut prev: Option<(ContainerCounters, Instant)> = None;

            while let Some(result) = stream.next().await {
                match result {
                    Ok(frame) => {
                        let Some(counters) = stats::process_statistics(&frame) else {
                            continue;
                        };
                        let now = Instant::now();
                        let (network, disk_io) = match prev {
                            Some((p, at)) => {
                                let (n, io) =
                                    counters.rates_since(&p, now.duration_since(at).as_secs_f64());
                                (Some(n), Some(io))
                            }
                            None => (None, None),
                        };
                        prev = Some((counters, now));
                        live.write().await.insert(
                            id.clone(),
                            LiveContainer {
                                name: name.clone(),
                                image: image.clone(),
                                counters,
                                network,
                                disk_io,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, container = %name, "stats stream error");
                        break;
                    }
                }
            }
            tracing::info!(container = %name, "stats stream ended");
            live.write().await.remove(&id);
            streams.write().await.remove(&id);
        })
    }
}

fn container_resource(id: &str, c: &LiveContainer, host: &Resource, now_ms: i64) -> Resource {
    let mut r = Resource::new(id, ResourceType::DockerContainer, c.name.clone());
    r.status = ResourceStatus::Online;
    r.cpu = Some(c.counters.cpu);
    r.memory = c.counters.memory_ratio();
    r.network = c.network;
    r.disk_io = c.disk_io;
    r.parent_id = Some(host.id.clone());
    r.linked_agent_id = Some(host.id.clone());
    r.cluster_id = host.cluster_id.clone();
    r.hostname = host.hostname.clone();
    r.sources = vec!["docker".to_string()];
    r.last_seen = now_ms;
    if let Some(image) = &c.image {
        r.platform_data.insert("image".into(), image.clone().into());
    }
    r.platform_data
        .insert("memoryLimitBytes".into(), c.counters.memory_limit_bytes.into());
    r.platform_data.insert("pids".into(), c.counters.pids.into());
    r
}
