use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, Sqlite};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::defs::{
    ForesightCategory, Item, ItemQuery, LogEvent, LogLevel, LogSink, NewReport, NewSource, RecordStore, Report,
    SignalStrength, Source,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS feeds (
        id BLOB PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        category TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_fetched_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id BLOB PRIMARY KEY,
        feed_id BLOB NOT NULL REFERENCES feeds (id),
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        content TEXT NOT NULL,
        image_url TEXT,
        published_at TEXT,
        category TEXT,
        industry TEXT,
        reasoning TEXT NOT NULL,
        signal_strength TEXT NOT NULL DEFAULT 'pending',
        is_featured INTEGER NOT NULL DEFAULT 0,
        admin_notes TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_created ON items (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_items_feed_id ON items (feed_id)",
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id BLOB PRIMARY KEY,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        window_start TEXT NOT NULL,
        window_end TEXT NOT NULL,
        is_published INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS system_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        event_type TEXT NOT NULL,
        message TEXT NOT NULL,
        details TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed record store and event sink.
///
/// The `UNIQUE(url)` constraint on `items` is what keeps concurrent fetches
/// from inserting the same entry twice; inserts that hit it are counted as
/// not new.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Connected record store at {}", database_url);
        Ok(store)
    }

    /// A private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Record store schema ready");
        Ok(())
    }

    pub async fn add_source(&self, source: NewSource) -> anyhow::Result<Source> {
        let created = Source {
            id: Uuid::new_v4(),
            url: source.url,
            name: source.name,
            category: source.category.filter(|c| !c.trim().is_empty()),
            is_active: true,
            last_fetched_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, name, category, is_active, created_at)
            VALUES ($1, $2, $3, $4, 1, $5)
            "#,
        )
        .bind(created.id)
        .bind(&created.url)
        .bind(&created.name)
        .bind(created.category.as_deref())
        .bind(created.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to add source {}", created.url))?;

        info!("Added new source: {} with ID: {}", created.url, created.id);
        Ok(created)
    }

    pub async fn set_source_active(&self, source_id: Uuid, active: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE feeds SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Curation action: the only way an item's strength or notes change after ingest.
    pub async fn set_signal_strength(
        &self,
        item_id: Uuid,
        strength: SignalStrength,
        admin_notes: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE items SET signal_strength = $1, admin_notes = COALESCE($2, admin_notes) WHERE id = $3",
        )
        .bind(strength.as_str())
        .bind(admin_notes)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_items(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_report(&self, report_id: Uuid) -> anyhow::Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = $1")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    pub async fn list_reports(&self) -> anyhow::Result<Vec<Report>> {
        let rows = sqlx::query("SELECT * FROM reports ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }

    /// Most recent events first.
    pub async fn recent_events(&self, limit: usize) -> anyhow::Result<Vec<LogEvent>> {
        let rows = sqlx::query("SELECT * FROM system_logs ORDER BY id DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let level: String = row.try_get("level")?;
            let details: Option<String> = row.try_get("details")?;
            events.push(LogEvent {
                level: LogLevel::from_str(&level)?,
                category: row.try_get("event_type")?,
                message: row.try_get("message")?,
                detail: details.and_then(|d| serde_json::from_str(&d).ok()),
                timestamp: row.try_get("timestamp")?,
            });
        }
        Ok(events)
    }

    async fn try_record(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        detail: Option<&serde_json::Value>,
    ) -> anyhow::Result<()> {
        let details = detail.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO system_logs (timestamp, level, event_type, message, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Utc::now())
        .bind(level.as_str())
        .bind(category)
        .bind(message)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_item<'e, E>(executor: E, item: &Item) -> anyhow::Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO items (id, feed_id, url, title, summary, content, image_url, published_at,
                           category, industry, reasoning, signal_strength, is_featured, admin_notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (url) DO NOTHING
        "#,
    )
    .bind(item.id)
    .bind(item.source_id)
    .bind(&item.url)
    .bind(&item.title)
    .bind(&item.summary)
    .bind(&item.content)
    .bind(item.image_url.as_deref())
    .bind(item.published_at)
    .bind(item.category.as_str())
    .bind(&item.industry)
    .bind(&item.reasoning)
    .bind(item.signal_strength.as_str())
    .bind(item.is_featured)
    .bind(item.admin_notes.as_deref())
    .bind(item.created_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn source_from_row(row: &SqliteRow) -> anyhow::Result<Source> {
    Ok(Source {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        is_active: row.try_get("is_active")?,
        last_fetched_at: row.try_get("last_fetched_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> anyhow::Result<Item> {
    let category: Option<String> = row.try_get("category")?;
    let strength: String = row.try_get("signal_strength")?;
    let industry: Option<String> = row.try_get("industry")?;

    Ok(Item {
        id: row.try_get("id")?,
        source_id: row.try_get("feed_id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        image_url: row.try_get("image_url")?,
        published_at: row.try_get("published_at")?,
        category: category
            .and_then(|c| ForesightCategory::from_str(&c).ok())
            .unwrap_or(ForesightCategory::Uncategorized),
        industry: industry.unwrap_or_default(),
        reasoning: row.try_get("reasoning")?,
        signal_strength: SignalStrength::from_str(&strength).unwrap_or(SignalStrength::Pending),
        is_featured: row.try_get("is_featured")?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn report_from_row(row: &SqliteRow) -> anyhow::Result<Report> {
    Ok(Report {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        window_start: row.try_get("window_start")?,
        window_end: row.try_get("window_end")?,
        is_published: row.try_get("is_published")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_source_by(&self, url: &str) -> anyhow::Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM feeds WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn list_active_sources(&self) -> anyhow::Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM feeds WHERE is_active = 1 ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn find_item_by(&self, url: &str) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn insert_items(&self, items: &[Item]) -> anyhow::Result<usize> {
        let mut stored = 0;
        for item in items {
            if insert_item(&self.pool, item).await? {
                stored += 1;
            }
        }
        debug!("Stored {} new items out of {} total items", stored, items.len());
        Ok(stored)
    }

    async fn update_source_last_fetched(&self, source_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE feeds SET last_fetched_at = $1 WHERE id = $2")
            .bind(at)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn commit_fetch(&self, source_id: Uuid, at: DateTime<Utc>, items: &[Item]) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE feeds SET last_fetched_at = $1 WHERE id = $2")
            .bind(at)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let mut stored = 0;
        for item in items {
            if insert_item(&mut *tx, item).await? {
                stored += 1;
            } else {
                debug!("Item already stored by a concurrent fetch: {}", item.url);
            }
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<Report> {
        let created = Report {
            id: Uuid::new_v4(),
            title: report.title,
            body: report.body,
            window_start: report.window_start,
            window_end: report.window_end,
            is_published: report.is_published,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO reports (id, title, body, window_start, window_end, is_published, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(created.id)
        .bind(&created.title)
        .bind(&created.body)
        .bind(created.window_start)
        .bind(created.window_end)
        .bind(created.is_published)
        .bind(created.created_at)
        .execute(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update_report(&self, report: &Report) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE reports SET title = $1, body = $2, is_published = $3 WHERE id = $4")
            .bind(&report.title)
            .bind(&report.body)
            .bind(report.is_published)
            .bind(report.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("report {} not found", report.id);
        }
        Ok(())
    }

    async fn query_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<Item>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM items WHERE 1 = 1");

        if let Some(since) = query.created_since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(industry) = &query.industry {
            builder.push(" AND industry = ").push_bind(industry.clone());
        }
        if !query.signal_strengths.is_empty() {
            builder.push(" AND signal_strength IN (");
            let mut separated = builder.separated(", ");
            for strength in &query.signal_strengths {
                separated.push_bind(strength.as_str());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY created_at, rowid");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn distinct_categories(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ForesightCategory>> {
        let values: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM items WHERE created_at >= $1 AND category IS NOT NULL ORDER BY category",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut categories = Vec::new();
        for value in values {
            match ForesightCategory::from_str(&value) {
                Ok(category) => categories.push(category),
                Err(_) => warn!("Ignoring unknown stored category: {}", value),
            }
        }
        Ok(categories)
    }

    async fn distinct_industries(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let values: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT industry FROM items
            WHERE created_at >= $1 AND industry IS NOT NULL AND industry != ''
            ORDER BY industry
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl LogSink for SqliteRecordStore {
    async fn record(&self, level: LogLevel, category: &str, message: &str, detail: Option<serde_json::Value>) {
        if let Err(e) = self.try_record(level, category, message, detail.as_ref()).await {
            error!(target: "log_sink", "FAILED TO LOG EVENT: {e} ({category}: {message})");
        }
    }
}
