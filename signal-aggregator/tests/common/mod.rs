#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interfaces::{ForesightCategory, Item, LanguageModelClient, NewSource, SignalStrength, Source, SqliteRecordStore};
use signal_aggregator::{Classifier, EventLog, FeedClient, FeedIngester, PipelineError, RetryPolicy, Summarizer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Serves fixed feed documents by url. Unknown urls fail like a 404.
#[derive(Default)]
pub struct StaticFeedClient {
    documents: Mutex<HashMap<String, String>>,
}

impl StaticFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, document: String) {
        self.documents.lock().unwrap().insert(url.to_string(), document);
    }
}

#[async_trait]
impl FeedClient for StaticFeedClient {
    async fn retrieve(&self, url: &str) -> signal_aggregator::Result<String> {
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::General("HTTP 404: Not Found".to_string()))
    }
}

pub struct RssEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

impl RssEntry {
    pub fn new(title: &str, link: &str, description: &str, published: Option<DateTime<Utc>>) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            description: description.to_string(),
            published,
        }
    }
}

pub fn rss_document(title: &str, entries: &[RssEntry]) -> String {
    let items: String = entries
        .iter()
        .map(|entry| {
            let date = entry
                .published
                .map(|d| format!("<pubDate>{}</pubDate>", d.to_rfc2822()))
                .unwrap_or_default();
            format!(
                "<item><title>{}</title><link>{}</link><description>{}</description>{}</item>",
                entry.title, entry.link, entry.description, date
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>{}</title><link>https://example.com</link><description>test</description>{}</channel></rss>"#,
        title, items
    )
}

pub async fn setup_store() -> Arc<SqliteRecordStore> {
    Arc::new(SqliteRecordStore::in_memory().await.unwrap())
}

pub async fn add_source(store: &SqliteRecordStore, url: &str, name: &str, category: Option<&str>) -> Source {
    store
        .add_source(NewSource {
            url: url.to_string(),
            name: name.to_string(),
            category: category.map(str::to_string),
        })
        .await
        .unwrap()
}

pub fn no_wait() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO).with_jitter(Duration::ZERO)
}

pub fn ingester(
    store: Arc<SqliteRecordStore>,
    client: Arc<StaticFeedClient>,
    model: Option<Arc<dyn LanguageModelClient>>,
) -> FeedIngester {
    let classifier = Classifier::new(model).with_retry_policy(no_wait());
    FeedIngester::new(store.clone(), client, classifier, EventLog::new(store))
}

pub fn summarizer(store: &Arc<SqliteRecordStore>, model: Option<Arc<dyn LanguageModelClient>>) -> Summarizer {
    Summarizer::new(model, EventLog::new(store.clone()))
        .with_retry_policies(no_wait(), no_wait())
        .with_pacing(Duration::ZERO)
}

pub fn curated_item(
    source_id: Uuid,
    title: &str,
    category: ForesightCategory,
    industry: &str,
    strength: SignalStrength,
    created_at: DateTime<Utc>,
) -> Item {
    Item {
        id: Uuid::new_v4(),
        source_id,
        url: format!("https://example.com/items/{}", Uuid::new_v4()),
        title: title.to_string(),
        summary: format!("Summary of {}", title),
        content: String::new(),
        image_url: None,
        published_at: Some(created_at),
        category,
        industry: industry.to_string(),
        reasoning: "curated".to_string(),
        signal_strength: strength,
        is_featured: false,
        admin_notes: None,
        created_at,
    }
}
