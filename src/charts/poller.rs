// Background chart refresh: re-fetch the active range on a fixed interval while resources exist.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::cache::{ChartCache, ChartSource};
use crate::models::ResourceSnapshot;

pub struct ChartPoller<S: ChartSource> {
    cache: Arc<ChartCache<S>>,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: ChartSource> ChartPoller<S> {
    pub fn new(cache: Arc<ChartCache<S>>, period: Duration) -> Self {
        Self {
            cache,
            period,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start polling when resources are present; tear the timer down when there are none.
    pub fn sync(&mut self, resource_count: usize) {
        match (resource_count > 0, self.task.is_some()) {
            (true, false) => self.start(),
            (false, true) => {
                tracing::debug!("no resources, stopping chart poll");
                self.stop();
            }
            _ => {}
        }
    }

    fn start(&mut self) {
        let cache = self.cache.clone();
        let period = self.period;
        tracing::debug!(period_secs = period.as_secs(), "starting chart poll");
        self.task = Some(tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                if cache.is_torn_down() {
                    break;
                }
                let ticket = cache.fetch_charts(cache.active_range(), false);
                if ticket.is_coalesced() {
                    tracing::trace!(range = %ticket.range(), "poll joined in-flight chart fetch");
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Stop polling and cancel the cache's in-flight fetch.
    pub fn teardown(&mut self) {
        self.stop();
        self.cache.teardown();
    }
}

impl<S: ChartSource> Drop for ChartPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives a poller from published snapshots until shutdown, then tears it down.
pub fn spawn_supervisor<S: ChartSource>(
    cache: Arc<ChartCache<S>>,
    mut snapshots: broadcast::Receiver<Arc<ResourceSnapshot>>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut poller = ChartPoller::new(cache, period);
        loop {
            tokio::select! {
                result = snapshots.recv() => {
                    match result {
                        Ok(snapshot) => poller.sync(snapshot.resources.len()),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(skipped = n, "chart supervisor lagged behind snapshots");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
        poller.teardown();
        tracing::debug!("chart supervisor shutting down");
    })
}
