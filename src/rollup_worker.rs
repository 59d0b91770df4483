// Background worker: roll raw samples into minute/hourly/daily tiers, then prune each tier.
// Runs every rollup_interval_secs. VACUUM runs on a cron expression or a fixed interval.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::history::MetricsStore;

#[derive(Debug, Clone)]
pub struct RollupWorkerConfig {
    pub rollup_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl From<&DatabaseConfig> for RollupWorkerConfig {
    fn from(db: &DatabaseConfig) -> Self {
        Self {
            rollup_interval_secs: db.rollup_interval_secs,
            vacuum_schedule: db.vacuum_schedule.clone(),
            vacuum_interval_secs: db.vacuum_interval_secs,
        }
    }
}

pub fn spawn(
    store: Arc<MetricsStore>,
    config: RollupWorkerConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, config, shutdown_rx).await;
    })
}

#[instrument(skip(store, shutdown_rx), fields(interval_secs = config.rollup_interval_secs))]
async fn run(
    store: Arc<MetricsStore>,
    config: RollupWorkerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut rollup_interval =
        tokio::time::interval(Duration::from_secs(config.rollup_interval_secs));
    rollup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = rollup_interval.tick() => {
                if let Err(e) = run_one_tick(&store).await {
                    warn!(error = %e, "rollup tick failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                debug!("Rollup worker shutting down");
                break;
            }
        }
    }
    scheduler.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: RollupWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// One pass: roll every tier forward, then drop rows past their retention window.
pub async fn run_one_tick(store: &MetricsStore) -> anyhow::Result<()> {
    let rolled = store.run_rollup().await?;
    let pruned = store.run_retention().await?;
    if rolled > 0 || pruned > 0 {
        info!(rolled_buckets = rolled, pruned_rows = pruned, "rollup pass");
    }
    Ok(())
}
