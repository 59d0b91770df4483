// Background collection worker.
// Collection runs in the worker; persistence runs in a dedicated history writer task (channel).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::Instrument;

use crate::collector::Collector;
use crate::history::{MetricSample, MetricsBuffer, MetricsStore, samples_from_snapshot};
use crate::state::ResourceRegistry;

/// Rate limit for the "no receivers" message (avoid logging every tick when no one is on /ws/state)
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Channel capacity for the history writer (backpressure if the writer falls behind).
pub fn writer_channel_capacity(flush_rate: u64) -> usize {
    (flush_rate as usize * 2).max(32)
}

pub struct WorkerDeps {
    pub collector: Arc<Collector>,
    pub registry: Arc<ResourceRegistry>,
    pub buffer: Arc<MetricsBuffer>,
    pub write_tx: mpsc::Sender<Vec<MetricSample>>,
    pub ws_connections: Arc<AtomicUsize>,
    pub samples_saved_total: Arc<AtomicU64>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct WorkerConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

pub struct HistoryWriterConfig {
    /// Collection ticks buffered before a batch insert.
    pub flush_rate: u64,
    pub flush_interval_secs: u64,
}

/// Receives per-tick sample batches and writes them to the store.
/// Flushes when `flush_rate` ticks are pending, every `flush_interval_secs`, and once more
/// when the worker drops its sender.
pub fn spawn_history_writer(
    mut write_rx: mpsc::Receiver<Vec<MetricSample>>,
    store: Arc<MetricsStore>,
    config: HistoryWriterConfig,
    samples_saved_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn(async move {
        let mut pending: Vec<MetricSample> = Vec::new();
        let mut pending_ticks: u64 = 0;
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = write_rx.recv() => {
                    match result {
                        Some(batch) => {
                            pending.extend(batch);
                            pending_ticks += 1;
                            if pending_ticks >= config.flush_rate {
                                pending_ticks = 0;
                                if let Err(e) = flush(&store, &mut pending, &samples_saved_total).await {
                                    tracing::warn!(error = %e, "history writer: write_batch failed");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    pending_ticks = 0;
                    if let Err(e) = flush(&store, &mut pending, &samples_saved_total).await {
                        tracing::warn!(error = %e, "history writer: write_batch failed");
                    }
                }
            }
        }
        if let Err(e) = flush(&store, &mut pending, &samples_saved_total).await {
            tracing::warn!(error = %e, "history writer: final flush failed");
        }
        tracing::debug!("History writer shutting down");
    })
}

/// Failed batches are dropped so one bad write cannot grow the buffer without bound.
async fn flush(
    store: &MetricsStore,
    pending: &mut Vec<MetricSample>,
    samples_saved_total: &AtomicU64,
) -> anyhow::Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(pending);
    store.write_batch(&batch).await?;
    samples_saved_total.fetch_add(batch.len() as u64, Ordering::Relaxed);
    tracing::debug!(
        operation = "write_batch",
        samples_count = batch.len(),
        "Samples saved"
    );
    Ok(())
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        collector,
        registry,
        buffer,
        write_tx,
        ws_connections,
        samples_saved_total,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        sample_interval_ms,
        stats_log_interval_secs,
    } = config;

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(sample_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut snapshots_published: u64 = 0;
        let mut last_no_receivers_log: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now_ms = match crate::history::now_millis() {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
                            continue;
                        }
                    };
                    let snapshot = match collector.collect(now_ms).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "collect", "snapshot collection failed");
                            continue;
                        }
                    };

                    buffer.record_snapshot(&snapshot);
                    let samples = samples_from_snapshot(&snapshot);

                    if registry.publish(snapshot) == 0 {
                        let should_log = last_no_receivers_log
                            .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                        if should_log {
                            tracing::debug!(
                                operation = "publish_snapshot",
                                "No active subscribers; broadcast channel has no receivers"
                            );
                            last_no_receivers_log = Some(Instant::now());
                        }
                    }
                    snapshots_published += 1;

                    if write_tx.send(samples).await.is_err() {
                        tracing::debug!("History writer channel closed");
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        ws_clients = ws_connections.load(Ordering::Relaxed),
                        snapshots_published,
                        samples_saved_total = samples_saved_total.load(Ordering::Relaxed),
                        buffered_resources = buffer.resource_count(),
                        "app stats"
                    );
                }
            }
        }
    }
    .instrument(tracing::debug_span!("worker", sample_interval_ms)))
}
