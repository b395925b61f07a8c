pub mod classifier;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod ingest;
pub mod llm_adapter;
pub mod parser;
pub mod reports;
pub mod retry;
pub mod scheduler;
pub mod summarizer;
pub mod traits;
pub mod types;

pub use classifier::{heuristic_classification, Classifier};
pub use config::{FeedSchedule, PipelineConfig};
pub use events::EventLog;
pub use fetcher::Fetcher;
pub use ingest::{week_start, FeedIngester};
pub use llm_adapter::{build_client, GeminiClient};
pub use parser::FeedParser;
pub use reports::{PendingReport, ReportGenerator};
pub use retry::{call_with_retry, RetryPolicy};
pub use scheduler::{next_weekly_run, Scheduler};
pub use summarizer::{Narrative, Summarizer};
pub use traits::FeedClient;
pub use types::*;
