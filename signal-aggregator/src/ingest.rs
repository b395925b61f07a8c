use crate::classifier::Classifier;
use crate::events::{EventLog, FEED};
use crate::parser::FeedParser;
use crate::traits::FeedClient;
use crate::types::{Item, PipelineError, Result, SignalStrength, Source};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use futures::stream::{self, StreamExt};
use interfaces::RecordStore;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Monday 00:00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_since_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// Polls sources, filters and classifies new entries, and persists them.
#[derive(Clone)]
pub struct FeedIngester {
    store: Arc<dyn RecordStore>,
    client: Arc<dyn FeedClient>,
    parser: FeedParser,
    classifier: Classifier,
    events: EventLog,
    max_concurrent: usize,
}

impl FeedIngester {
    pub fn new(
        store: Arc<dyn RecordStore>,
        client: Arc<dyn FeedClient>,
        classifier: Classifier,
        events: EventLog,
    ) -> Self {
        Self {
            store,
            client,
            parser: FeedParser::new(),
            classifier,
            events,
            max_concurrent: 1,
        }
    }

    /// Number of sources fetched at once by `fetch_all`. 1 fetches sequentially.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetches one source and returns how many new items were persisted.
    ///
    /// Never fails: errors are recorded as an ERROR event and yield 0.
    pub async fn fetch_and_ingest(&self, source: &Source) -> usize {
        match self.ingest(source).await {
            Ok(count) => count,
            Err(e) => {
                self.events
                    .error(
                        FEED,
                        &format!("Error fetching feed {}: {}", source.name, e),
                        Some(json!({
                            "feed_id": source.id,
                            "url": source.url,
                            "error_details": e.to_string(),
                        })),
                    )
                    .await;
                0
            }
        }
    }

    /// Fetches the registered source with the given url.
    pub async fn fetch_url(&self, url: &str) -> Result<usize> {
        let source = self
            .store
            .find_source_by(url)
            .await?
            .ok_or_else(|| PipelineError::SourceNotFound { url: url.to_string() })?;
        Ok(self.fetch_and_ingest(&source).await)
    }

    /// Fetches every active source and returns the total number of new items.
    pub async fn fetch_all(&self) -> Result<usize> {
        let sources = self.store.list_active_sources().await?;
        info!("Fetching {} active sources ({} at a time)", sources.len(), self.max_concurrent);

        let total = stream::iter(sources.into_iter().map(|source| {
            let ingester = self.clone();
            async move { ingester.fetch_and_ingest(&source).await }
        }))
        .buffer_unordered(self.max_concurrent)
        .collect::<Vec<usize>>()
        .await
        .into_iter()
        .sum::<usize>();

        info!("Feed update complete. New items: {}", total);
        Ok(total)
    }

    async fn ingest(&self, source: &Source) -> Result<usize> {
        let horizon = week_start(Utc::now());

        self.events
            .info(FEED, &format!("Fetching feed: {}", source.name), Some(json!({ "url": source.url })))
            .await;

        let content = self.client.retrieve(&source.url).await?;
        let parsed = self.parser.parse_feed(&content);

        if !parsed.issues.is_empty() {
            self.events
                .warning(
                    FEED,
                    &format!("Potential issue parsing feed: {}", source.name),
                    Some(json!({ "issues": parsed.issues })),
                )
                .await;
            if parsed.entries.is_empty() {
                return Ok(0);
            }
        }

        let mut staged = Vec::new();
        for entry in &parsed.entries {
            if self.store.find_item_by(&entry.url).await?.is_some() {
                self.events
                    .debug(
                        FEED,
                        &format!("Skipping existing article: {}", entry.title),
                        Some(json!({ "feed_id": source.id, "url": entry.url })),
                    )
                    .await;
                continue;
            }

            let published_at = entry.timestamp();
            if let Some(published) = published_at.filter(|p| *p < horizon) {
                self.events
                    .debug(
                        FEED,
                        &format!("Skipping old article: {}", entry.title),
                        Some(json!({ "feed_id": source.id, "published_at": published })),
                    )
                    .await;
                continue;
            }

            let summary = entry.summary.clone().unwrap_or_default();
            let classification = self
                .classifier
                .classify(
                    &entry.title,
                    &summary,
                    source.category.as_deref().unwrap_or_default(),
                    &entry.url,
                )
                .await;

            let industry = source
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(classification.industry);

            let item = Item {
                id: Uuid::new_v4(),
                source_id: source.id,
                url: entry.url.clone(),
                title: entry.title.clone(),
                summary,
                content: entry.body(),
                image_url: entry.image_url(),
                published_at,
                category: classification.category,
                industry,
                reasoning: classification.reasoning,
                signal_strength: SignalStrength::Pending,
                is_featured: false,
                admin_notes: None,
                created_at: Utc::now(),
            };

            self.events
                .info(
                    FEED,
                    &format!("New article found: {}", item.title),
                    Some(json!({ "feed_id": source.id })),
                )
                .await;
            staged.push(item);
        }

        let added = self.store.commit_fetch(source.id, Utc::now(), &staged).await?;
        if added > 0 {
            self.events
                .info(FEED, &format!("Fetched {} new articles from {}", added, source.name), None)
                .await;
        }

        Ok(added)
    }
}
