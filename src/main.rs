use anyhow::Result;
use pulseview::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let registry = Arc::new(state::ResourceRegistry::new(
        app_config.publishing.broadcast_capacity,
    ));
    let store = Arc::new(
        history::MetricsStore::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.retention(),
        )
        .await?,
    );
    store.init().await?;
    let buffer = Arc::new(history::MetricsBuffer::new(
        Duration::from_secs(app_config.collection.buffer_max_age_secs),
        app_config.collection.buffer_max_points,
    ));
    let history_service = Arc::new(history::HistoryService::new(
        Some(store.clone()),
        buffer.clone(),
        registry.clone(),
        Duration::from_secs(app_config.charts.in_memory_threshold_secs),
    ));
    let chart_cache = Arc::new(charts::ChartCache::new(
        history_service.clone(),
        app_config.charts.default_range,
        Duration::from_secs(app_config.charts.cache_ttl_secs),
    ));

    let docker = if app_config.collection.docker_enabled {
        match collector::DockerCollector::connect() {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "Docker unavailable; collecting host metrics only");
                None
            }
        }
    } else {
        None
    };
    let host = collector::HostCollector::new(app_config.collection.cluster.clone());
    tracing::info!(host_id = %host.host_id(), docker = docker.is_some(), "collector ready");
    let collector = Arc::new(collector::Collector::new(host, docker));

    let ws_state_connections = Arc::new(AtomicUsize::new(0));
    let samples_saved_total = Arc::new(AtomicU64::new(0));
    let (worker_shutdown_tx, worker_shutdown_rx) = oneshot::channel();
    let (rollup_shutdown_tx, rollup_shutdown_rx) = oneshot::channel();
    let (charts_shutdown_tx, charts_shutdown_rx) = oneshot::channel();

    let (write_tx, write_rx) = mpsc::channel(worker::writer_channel_capacity(
        app_config.database.flush_rate,
    ));
    let writer_handle = worker::spawn_history_writer(
        write_rx,
        store.clone(),
        worker::HistoryWriterConfig {
            flush_rate: app_config.database.flush_rate,
            flush_interval_secs: app_config.database.flush_interval_secs,
        },
        samples_saved_total.clone(),
    );

    let charts_handle = charts::spawn_supervisor(
        chart_cache.clone(),
        registry.subscribe(),
        Duration::from_secs(app_config.charts.poll_interval_secs),
        charts_shutdown_rx,
    );

    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            collector,
            registry: registry.clone(),
            buffer,
            write_tx,
            ws_connections: ws_state_connections.clone(),
            samples_saved_total,
            shutdown_rx: worker_shutdown_rx,
        },
        worker::WorkerConfig {
            sample_interval_ms: app_config.collection.sample_interval_ms,
            stats_log_interval_secs: app_config.collection.stats_log_interval_secs,
        },
    );

    let rollup_handle = rollup_worker::spawn(
        store,
        rollup_worker::RollupWorkerConfig::from(&app_config.database),
        rollup_shutdown_rx,
    );

    let app = routes::app(
        registry,
        history_service,
        chart_cache.clone(),
        ws_state_connections,
        app_config.clone(),
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Worker first: dropping its sender lets the history writer run its final flush.
    let _ = worker_shutdown_tx.send(());
    let _ = worker_handle.await;
    let _ = writer_handle.await;
    let _ = charts_shutdown_tx.send(());
    let _ = charts_handle.await;
    chart_cache.teardown();
    let _ = rollup_shutdown_tx.send(());
    let _ = rollup_handle.await;

    Ok(())
}
