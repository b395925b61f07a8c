use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six foresight dimensions, plus the bucket for items none of them fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForesightCategory {
    Social,
    Technological,
    Economic,
    Environmental,
    Political,
    Values,
    Uncategorized,
}

impl ForesightCategory {
    /// The classifiable categories, in heuristic priority order.
    pub const ALL: [ForesightCategory; 6] = [
        ForesightCategory::Social,
        ForesightCategory::Technological,
        ForesightCategory::Economic,
        ForesightCategory::Environmental,
        ForesightCategory::Political,
        ForesightCategory::Values,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForesightCategory::Social => "Social",
            ForesightCategory::Technological => "Technological",
            ForesightCategory::Economic => "Economic",
            ForesightCategory::Environmental => "Environmental",
            ForesightCategory::Political => "Political",
            ForesightCategory::Values => "Values",
            ForesightCategory::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for ForesightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownValue(pub String);

impl FromStr for ForesightCategory {
    type Err = UnknownValue;

    /// Case-insensitive; surrounding whitespace and quotes are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_matches(|c: char| c == '"' || c == '\'').to_lowercase();
        ForesightCategory::ALL
            .iter()
            .chain(std::iter::once(&ForesightCategory::Uncategorized))
            .find(|c| c.as_str().to_lowercase() == wanted)
            .copied()
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

/// Curator-assigned relevance of an item. Newly ingested items are `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStrength {
    Strong,
    Medium,
    Low,
    NotSignal,
    Pending,
}

impl SignalStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::Strong => "strong",
            SignalStrength::Medium => "medium",
            SignalStrength::Low => "low",
            SignalStrength::NotSignal => "not_signal",
            SignalStrength::Pending => "pending",
        }
    }

    /// Strengths selected by a "minimum signal" filter.
    /// Anything other than `Medium` or `Low` selects only `Strong`.
    pub fn at_least(min: SignalStrength) -> Vec<SignalStrength> {
        match min {
            SignalStrength::Low => vec![SignalStrength::Strong, SignalStrength::Medium, SignalStrength::Low],
            SignalStrength::Medium => vec![SignalStrength::Strong, SignalStrength::Medium],
            _ => vec![SignalStrength::Strong],
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStrength {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strong" => Ok(SignalStrength::Strong),
            "medium" => Ok(SignalStrength::Medium),
            "low" => Ok(SignalStrength::Low),
            "not_signal" | "not-signal" => Ok(SignalStrength::NotSignal),
            "pending" => Ok(SignalStrength::Pending),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

/// A configured external feed to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub category: Option<String>,
    pub is_active: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub url: String,
    pub name: String,
    pub category: Option<String>,
}

/// A single ingested entry. `url` is the dedup key and is unique across all items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub source_id: Uuid,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category: ForesightCategory,
    pub industry: String,
    pub reasoning: String,
    pub signal_strength: SignalStrength,
    pub is_featured: bool,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub body: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub is_published: bool,
}

/// Filters for `RecordStore::query_items`. Empty fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub created_since: Option<DateTime<Utc>>,
    pub category: Option<ForesightCategory>,
    pub industry: Option<String>,
    pub signal_strengths: Vec<SignalStrength>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Record access used by the pipeline. Each call is its own unit of work.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_source_by(&self, url: &str) -> anyhow::Result<Option<Source>>;

    async fn list_active_sources(&self) -> anyhow::Result<Vec<Source>>;

    async fn find_item_by(&self, url: &str) -> anyhow::Result<Option<Item>>;

    /// Inserts items whose url is not yet stored; returns how many were inserted.
    async fn insert_items(&self, items: &[Item]) -> anyhow::Result<usize>;

    async fn update_source_last_fetched(&self, source_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Updates the source's fetch time and inserts the staged items as one unit.
    async fn commit_fetch(&self, source_id: Uuid, at: DateTime<Utc>, items: &[Item]) -> anyhow::Result<usize>;

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<Report>;

    async fn update_report(&self, report: &Report) -> anyhow::Result<()>;

    async fn query_items(&self, query: &ItemQuery) -> anyhow::Result<Vec<Item>>;

    async fn distinct_categories(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ForesightCategory>>;

    async fn distinct_industries(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<String>>;

    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Append-only event sink. Implementations must swallow their own failures.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, level: LogLevel, category: &str, message: &str, detail: Option<serde_json::Value>);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LanguageModelError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("language model failure: {0}")]
    Failed(String),
}

impl LanguageModelError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LanguageModelError::RateLimited(_))
    }
}

#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    fn model_name(&self) -> String;

    async fn generate(&self, prompt: &str) -> Result<String, LanguageModelError>;
}
