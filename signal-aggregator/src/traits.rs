use crate::types::Result;
use async_trait::async_trait;

/// Retrieves the raw document of a feed. The seam between ingestion and the network.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn retrieve(&self, url: &str) -> Result<String>;
}
