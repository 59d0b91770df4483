use serde::Deserialize;
use std::time::Duration;

use crate::history::TierRetention;
use crate::models::TimeRange;
use crate::table::WindowConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub collection: CollectionConfig,
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub charts: ChartsConfig,
    #[serde(default)]
    pub table: WindowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    /// Samples buffered by the history writer before a batch insert.
    pub flush_rate: u64,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_raw_retention_hours")]
    pub raw_retention_hours: u32,
    #[serde(default = "default_minute_retention_hours")]
    pub minute_retention_hours: u32,
    #[serde(default = "default_hourly_retention_days")]
    pub hourly_retention_days: u32,
    #[serde(default = "default_daily_retention_days")]
    pub daily_retention_days: u32,
    #[serde(default = "default_rollup_interval_secs")]
    pub rollup_interval_secs: u64,
    /// Cron expression for VACUUM (e.g. "0 0 3 * * *"), local time. Falls back to the interval.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_raw_retention_hours() -> u32 {
    2
}

fn default_minute_retention_hours() -> u32 {
    24
}

fn default_hourly_retention_days() -> u32 {
    7
}

fn default_daily_retention_days() -> u32 {
    90
}

fn default_rollup_interval_secs() -> u64 {
    300
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

impl DatabaseConfig {
    pub fn retention(&self) -> TierRetention {
        const HOUR: u64 = 3600;
        TierRetention {
            raw: Duration::from_secs(u64::from(self.raw_retention_hours) * HOUR),
            minute: Duration::from_secs(u64::from(self.minute_retention_hours) * HOUR),
            hourly: Duration::from_secs(u64::from(self.hourly_retention_days) * 24 * HOUR),
            daily: Duration::from_secs(u64::from(self.daily_retention_days) * 24 * HOUR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (ws clients, samples saved) at INFO level.
    pub stats_log_interval_secs: u64,
    #[serde(default = "default_true")]
    pub docker_enabled: bool,
    /// Grouping key for this host and its containers.
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default = "default_buffer_max_age_secs")]
    pub buffer_max_age_secs: u64,
    #[serde(default = "default_buffer_max_points")]
    pub buffer_max_points: usize,
}

fn default_true() -> bool {
    true
}

fn default_buffer_max_age_secs() -> u64 {
    2 * 3600
}

fn default_buffer_max_points() -> usize {
    1_440
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Snapshots kept in the broadcast channel for /ws/state (slow clients may lag).
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    pub poll_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub default_range: TimeRange,
    /// Ranges up to this span are served from the in-memory buffer first.
    pub in_memory_threshold_secs: u64,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            cache_ttl_secs: 60,
            default_range: TimeRange::OneHour,
            in_memory_threshold_secs: 2 * 3600,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.flush_rate > 0,
            "database.flush_rate must be > 0, got {}",
            self.database.flush_rate
        );
        anyhow::ensure!(
            self.database.flush_interval_secs > 0,
            "database.flush_interval_secs must be > 0, got {}",
            self.database.flush_interval_secs
        );
        for (field, value) in [
            ("database.raw_retention_hours", self.database.raw_retention_hours),
            ("database.minute_retention_hours", self.database.minute_retention_hours),
            ("database.hourly_retention_days", self.database.hourly_retention_days),
            ("database.daily_retention_days", self.database.daily_retention_days),
        ] {
            anyhow::ensure!(value > 0, "{} must be > 0, got {}", field, value);
        }
        anyhow::ensure!(
            self.database.rollup_interval_secs > 0,
            "database.rollup_interval_secs must be > 0, got {}",
            self.database.rollup_interval_secs
        );
        anyhow::ensure!(
            self.database.vacuum_interval_secs > 0,
            "database.vacuum_interval_secs must be > 0, got {}",
            self.database.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.collection.sample_interval_ms > 0,
            "collection.sample_interval_ms must be > 0, got {}",
            self.collection.sample_interval_ms
        );
        anyhow::ensure!(
            self.collection.stats_log_interval_secs > 0,
            "collection.stats_log_interval_secs must be > 0, got {}",
            self.collection.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.collection.buffer_max_points > 0,
            "collection.buffer_max_points must be > 0, got {}",
            self.collection.buffer_max_points
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        anyhow::ensure!(
            self.charts.poll_interval_secs > 0,
            "charts.poll_interval_secs must be > 0, got {}",
            self.charts.poll_interval_secs
        );
        anyhow::ensure!(
            self.table.viewport_rows > 0,
            "table.viewport_rows must be > 0, got {}",
            self.table.viewport_rows
        );
        Ok(())
    }
}
