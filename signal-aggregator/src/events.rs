use std::sync::Arc;

use async_trait::async_trait;
use interfaces::{LogLevel, LogSink};
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub const FEED: &str = "FEED";
pub const AI: &str = "AI";
pub const SYSTEM: &str = "SYSTEM";

/// Records pipeline events to a `LogSink`, mirroring each one to `tracing`.
#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn LogSink>,
}

impl EventLog {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// An event log that only emits `tracing` events.
    pub fn tracing_only() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub async fn record(&self, level: LogLevel, category: &str, message: &str, detail: Option<Value>) {
        let detail_text = detail.as_ref().map(Value::to_string).unwrap_or_default();
        match level {
            LogLevel::Debug => debug!(target: "events", category, detail = %detail_text, "{message}"),
            LogLevel::Info => info!(target: "events", category, detail = %detail_text, "{message}"),
            LogLevel::Warning => warn!(target: "events", category, detail = %detail_text, "{message}"),
            LogLevel::Error => error!(target: "events", category, detail = %detail_text, "{message}"),
        }
        self.sink.record(level, category, message, detail).await;
    }

    pub async fn debug(&self, category: &str, message: &str, detail: Option<Value>) {
        self.record(LogLevel::Debug, category, message, detail).await;
    }

    pub async fn info(&self, category: &str, message: &str, detail: Option<Value>) {
        self.record(LogLevel::Info, category, message, detail).await;
    }

    pub async fn warning(&self, category: &str, message: &str, detail: Option<Value>) {
        self.record(LogLevel::Warning, category, message, detail).await;
    }

    pub async fn error(&self, category: &str, message: &str, detail: Option<Value>) {
        self.record(LogLevel::Error, category, message, detail).await;
    }
}

struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn record(&self, _level: LogLevel, _category: &str, _message: &str, _detail: Option<Value>) {}
}
