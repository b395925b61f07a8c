use chrono::{DateTime, Utc};
use interfaces::{ForesightCategory, LanguageModelError};
use serde::{Deserialize, Serialize};

pub use interfaces::{Item, LogLevel, Report, SignalStrength, Source};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            // Some servers block requests without a browser-like User-Agent.
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub entries: Vec<ParsedEntry>,
    /// Structural problems met while parsing. Non-empty with usable entries
    /// means the feed is degraded but still ingestible.
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub media_content: Vec<String>,
    pub media_thumbnails: Vec<String>,
    pub links: Vec<EntryLink>,
}

#[derive(Debug, Clone, Default)]
pub struct EntryLink {
    pub href: String,
    pub media_type: Option<String>,
}

/// Output of the classifier. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ForesightCategory,
    pub industry: String,
    pub reasoning: String,
}

/// The cohort a summary is narrowed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cohort {
    Category(ForesightCategory),
    Industry(String),
}

impl Cohort {
    pub fn label(&self) -> String {
        match self {
            Cohort::Category(category) => category.to_string(),
            Cohort::Industry(industry) => industry.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    LanguageModel(#[from] LanguageModelError),

    #[error("Source not found: {url}")]
    SourceNotFound { url: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
