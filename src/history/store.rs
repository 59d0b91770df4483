// SQLite metrics store. One table, four tiers; rollup copies old rows into coarser buckets
// and retention prunes each tier on its own clock.
// Timestamps are unix seconds on disk and unix millis everywhere else.

use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::instrument;

use crate::models::{ChartData, Metric, MetricPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Raw,
    Minute,
    Hourly,
    Daily,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Raw, Tier::Minute, Tier::Hourly, Tier::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Minute => "minute",
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
        }
    }
}

/// How long each tier is kept. Query tier selection uses the same windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRetention {
    pub raw: Duration,
    pub minute: Duration,
    pub hourly: Duration,
    pub daily: Duration,
}

impl Default for TierRetention {
    fn default() -> Self {
        Self {
            raw: Duration::from_secs(2 * 3600),
            minute: Duration::from_secs(24 * 3600),
            hourly: Duration::from_secs(7 * 24 * 3600),
            daily: Duration::from_secs(90 * 24 * 3600),
        }
    }
}

impl TierRetention {
    fn for_tier(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Raw => self.raw,
            Tier::Minute => self.minute,
            Tier::Hourly => self.hourly,
            Tier::Daily => self.daily,
        }
    }
}

/// One raw observation on its way into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub resource_type: String,
    pub resource_id: String,
    pub metric: Metric,
    pub value: f64,
    /// Unix millis.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub db_path: String,
    pub db_size: u64,
    pub raw_count: i64,
    pub minute_count: i64,
    pub hourly_count: i64,
    pub daily_count: i64,
    pub total_writes: u64,
    /// Unix millis of the last completed pass, if any.
    pub last_rollup: Option<i64>,
    pub last_retention: Option<i64>,
}

pub struct MetricsStore {
    pool: SqlitePool,
    path: String,
    retention: TierRetention,
    total_writes: AtomicU64,
    last_rollup: AtomicI64,
    last_retention: AtomicI64,
}

impl MetricsStore {
    pub async fn connect(
        path: &str,
        max_connections: u32,
        retention: TierRetention,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Self {
            pool,
            path: path.to_string(),
            retention,
            total_writes: AtomicU64::new(0),
            last_rollup: AtomicI64::new(0),
            last_retention: AtomicI64::new(0),
        })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                metric_type TEXT NOT NULL,
                value REAL NOT NULL,
                min_value REAL,
                max_value REAL,
                timestamp INTEGER NOT NULL,
                tier TEXT NOT NULL DEFAULT 'raw'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metrics_lookup ON metrics(resource_type, resource_id, metric_type, tier, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_tier_time ON metrics(tier, timestamp)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metrics_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finest tier whose retention covers `range`.
    pub fn select_tier(&self, range: Duration) -> Tier {
        let r = &self.retention;
        if range <= r.raw {
            Tier::Raw
        } else if range <= r.minute {
            Tier::Minute
        } else if range <= r.hourly {
            Tier::Hourly
        } else {
            Tier::Daily
        }
    }

    /// Tiers to read for `range`, best first. Queries take the first tier with rows.
    pub fn tier_fallbacks(&self, range: Duration) -> &'static [Tier] {
        match self.select_tier(range) {
            Tier::Raw => &[Tier::Raw, Tier::Minute, Tier::Hourly],
            Tier::Minute => &[Tier::Minute, Tier::Raw, Tier::Hourly],
            Tier::Hourly => &[Tier::Hourly, Tier::Minute, Tier::Raw],
            Tier::Daily => &[Tier::Daily, Tier::Hourly, Tier::Minute, Tier::Raw],
        }
    }

    #[instrument(skip(self, samples), fields(repo = "metrics", operation = "write_batch", samples_count = samples.len()))]
    pub async fn write_batch(&self, samples: &[MetricSample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            sqlx::query(
                "INSERT INTO metrics (resource_type, resource_id, metric_type, value, timestamp, tier) VALUES ($1, $2, $3, $4, $5, 'raw')",
            )
            .bind(&s.resource_type)
            .bind(&s.resource_id)
            .bind(s.metric.as_str())
            .bind(s.value)
            .bind(s.timestamp / 1000)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.total_writes
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Points for one metric in `[start_ms, end_ms]`, from the first tier in the
    /// fallback chain that has any.
    #[instrument(skip(self), fields(repo = "metrics", operation = "query"))]
    pub async fn query(
        &self,
        resource_type: &str,
        resource_id: &str,
        metric: Metric,
        start_ms: i64,
        end_ms: i64,
    ) -> anyhow::Result<Vec<MetricPoint>> {
        let mut out = Vec::new();
        for &tier in self.tier_fallbacks(span(start_ms, end_ms)) {
            out = self
                .query_tier(tier, resource_type, resource_id, metric, start_ms, end_ms)
                .await?;
            if !out.is_empty() {
                break;
            }
        }
        Ok(out)
    }

    async fn query_tier(
        &self,
        tier: Tier,
        resource_type: &str,
        resource_id: &str,
        metric: Metric,
        start_ms: i64,
        end_ms: i64,
    ) -> anyhow::Result<Vec<MetricPoint>> {
        let rows = sqlx::query(
            "SELECT timestamp, value, COALESCE(min_value, value) AS min_value, COALESCE(max_value, value) AS max_value
             FROM metrics
             WHERE resource_type = $1 AND resource_id = $2 AND metric_type = $3 AND tier = $4
               AND timestamp >= $5 AND timestamp <= $6
             ORDER BY timestamp ASC",
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(metric.as_str())
        .bind(tier.as_str())
        .bind(start_ms / 1000)
        .bind(end_ms / 1000)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_point(&row)?);
        }
        Ok(out)
    }

    /// Every metric for a resource in `[start_ms, end_ms]`. Unknown metric names are skipped.
    #[instrument(skip(self), fields(repo = "metrics", operation = "query_all"))]
    pub async fn query_all(
        &self,
        resource_type: &str,
        resource_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> anyhow::Result<ChartData> {
        let mut out = ChartData::new();
        for &tier in self.tier_fallbacks(span(start_ms, end_ms)) {
            out = self
                .query_all_tier(tier, resource_type, resource_id, start_ms, end_ms)
                .await?;
            if !out.is_empty() {
                break;
            }
        }
        Ok(out)
    }

    async fn query_all_tier(
        &self,
        tier: Tier,
        resource_type: &str,
        resource_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> anyhow::Result<ChartData> {
        let rows = sqlx::query(
            "SELECT metric_type, timestamp, value, COALESCE(min_value, value) AS min_value, COALESCE(max_value, value) AS max_value
             FROM metrics
             WHERE resource_type = $1 AND resource_id = $2 AND tier = $3
               AND timestamp >= $4 AND timestamp <= $5
             ORDER BY metric_type, timestamp ASC",
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(tier.as_str())
        .bind(start_ms / 1000)
        .bind(end_ms / 1000)
        .fetch_all(&self.pool)
        .await?;

        let mut out = ChartData::new();
        for row in rows {
            let name: String = row.try_get("metric_type")?;
            let Some(metric) = Metric::parse(&name) else {
                tracing::debug!(metric_type = %name, "skipping unknown metric type");
                continue;
            };
            out.entry(metric).or_default().push(parse_point(&row)?);
        }
        Ok(out)
    }

    pub async fn run_rollup(&self) -> anyhow::Result<u64> {
        self.run_rollup_at(now_secs()?).await
    }

    /// raw -> minute after 5 min, minute -> hourly after 1 h, hourly -> daily after 24 h.
    /// Source rows stay until retention drops them. Returns the number of buckets written.
    #[instrument(skip(self), fields(repo = "metrics", operation = "run_rollup"))]
    pub async fn run_rollup_at(&self, now_secs: i64) -> anyhow::Result<u64> {
        let mut written = 0;
        written += self
            .rollup_tier(Tier::Raw, Tier::Minute, 60, 5 * 60, now_secs)
            .await?;
        written += self
            .rollup_tier(Tier::Minute, Tier::Hourly, 3600, 3600, now_secs)
            .await?;
        written += self
            .rollup_tier(Tier::Hourly, Tier::Daily, 86_400, 86_400, now_secs)
            .await?;
        self.last_rollup.store(now_secs * 1000, Ordering::Relaxed);
        Ok(written)
    }

    async fn rollup_tier(
        &self,
        from: Tier,
        to: Tier,
        bucket_secs: i64,
        min_age_secs: i64,
        now_secs: i64,
    ) -> anyhow::Result<u64> {
        // Whole buckets only, so a bucket is never split across two passes.
        let cutoff = ((now_secs - min_age_secs) / bucket_secs) * bucket_secs;
        let key = format!("rollup:{}:{}", from.as_str(), to.as_str());

        let start = match self.meta_int(&key).await? {
            Some(v) => v,
            None => {
                // No checkpoint yet: resume after the newest bucket already in `to`.
                let max: Option<i64> =
                    sqlx::query_scalar("SELECT MAX(timestamp) FROM metrics WHERE tier = $1")
                        .bind(to.as_str())
                        .fetch_one(&self.pool)
                        .await?;
                let start = max.map_or(0, |ts| (ts / bucket_secs + 1) * bucket_secs);
                set_meta_int(&self.pool, &key, start).await?;
                start
            }
        };
        if cutoff <= start {
            return Ok(0);
        }

        let candidates = sqlx::query(
            "SELECT DISTINCT resource_type, resource_id, metric_type FROM metrics
             WHERE tier = $1 AND timestamp >= $2 AND timestamp < $3",
        )
        .bind(from.as_str())
        .bind(start)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for row in candidates {
            let resource_type: String = row.try_get("resource_type")?;
            let resource_id: String = row.try_get("resource_id")?;
            let metric_type: String = row.try_get("metric_type")?;

            let r = sqlx::query(
                r#"
                INSERT INTO metrics (resource_type, resource_id, metric_type, value, min_value, max_value, timestamp, tier)
                SELECT resource_type, resource_id, metric_type,
                       AVG(value), MIN(COALESCE(min_value, value)), MAX(COALESCE(max_value, value)),
                       (timestamp / $1) * $1 AS bucket_ts, $2
                FROM metrics
                WHERE resource_type = $3 AND resource_id = $4 AND metric_type = $5
                  AND tier = $6 AND timestamp >= $7 AND timestamp < $8
                GROUP BY resource_type, resource_id, metric_type, bucket_ts
                "#,
            )
            .bind(bucket_secs)
            .bind(to.as_str())
            .bind(&resource_type)
            .bind(&resource_id)
            .bind(&metric_type)
            .bind(from.as_str())
            .bind(start)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
            written += r.rows_affected();
        }
        set_meta_int(&mut *tx, &key, cutoff).await?;
        tx.commit().await?;

        if written > 0 {
            tracing::debug!(
                from = from.as_str(),
                to = to.as_str(),
                buckets = written,
                "metrics rolled up"
            );
        }
        Ok(written)
    }

    async fn meta_int(&self, key: &str) -> anyhow::Result<Option<i64>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM metrics_meta WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        value
            .map(|v| v.parse::<i64>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("metrics_meta {key}: {e}"))
    }

    pub async fn run_retention(&self) -> anyhow::Result<u64> {
        self.run_retention_at(now_secs()?).await
    }

    /// Drop rows older than their tier's retention. Returns rows deleted.
    #[instrument(skip(self), fields(repo = "metrics", operation = "run_retention"))]
    pub async fn run_retention_at(&self, now_secs: i64) -> anyhow::Result<u64> {
        let mut deleted = 0;
        for tier in Tier::ALL {
            let cutoff = now_secs - self.retention.for_tier(tier).as_secs() as i64;
            let r = sqlx::query("DELETE FROM metrics WHERE tier = $1 AND timestamp < $2")
                .bind(tier.as_str())
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            deleted += r.rows_affected();
        }
        self.last_retention.store(now_secs * 1000, Ordering::Relaxed);
        Ok(deleted)
    }

    #[instrument(skip(self), fields(repo = "metrics", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "metrics", operation = "stats"))]
    pub async fn stats(&self) -> anyhow::Result<StoreStats> {
        let mut stats = StoreStats {
            db_path: self.path.clone(),
            db_size: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
            total_writes: self.total_writes.load(Ordering::Relaxed),
            last_rollup: non_zero(self.last_rollup.load(Ordering::Relaxed)),
            last_retention: non_zero(self.last_retention.load(Ordering::Relaxed)),
            ..Default::default()
        };

        let rows = sqlx::query("SELECT tier, COUNT(*) AS n FROM metrics GROUP BY tier")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let tier: String = row.try_get("tier")?;
            let n: i64 = row.try_get("n")?;
            match tier.as_str() {
                "raw" => stats.raw_count = n,
                "minute" => stats.minute_count = n,
                "hourly" => stats.hourly_count = n,
                "daily" => stats.daily_count = n,
                _ => {}
            }
        }
        Ok(stats)
    }
}

async fn set_meta_int<'e, E>(executor: E, key: &str, value: i64) -> anyhow::Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO metrics_meta (key, value) VALUES ($1, $2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

fn parse_point(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<MetricPoint> {
    let ts: i64 = row.try_get("timestamp")?;
    Ok(MetricPoint {
        timestamp: ts * 1000,
        value: row.try_get("value")?,
        min: row.try_get("min_value")?,
        max: row.try_get("max_value")?,
    })
}

fn span(start_ms: i64, end_ms: i64) -> Duration {
    Duration::from_millis(end_ms.saturating_sub(start_ms).max(0) as u64)
}

fn non_zero(v: i64) -> Option<i64> {
    (v != 0).then_some(v)
}

pub(crate) fn now_secs() -> anyhow::Result<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64)
}

pub(crate) fn now_millis() -> anyhow::Result<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis() as i64)
}
