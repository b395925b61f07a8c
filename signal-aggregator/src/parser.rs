use crate::types::{EntryLink, ParsedEntry, ParsedFeed};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// Stateless RSS/Atom parser. Never fails: problems are reported in `ParsedFeed::issues`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> ParsedFeed {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = match parser::parse(content.as_bytes()) {
            Ok(feed) => feed,
            Err(e) => {
                return ParsedFeed {
                    issues: vec![format!("Failed to parse feed: {}", e)],
                    ..Default::default()
                };
            }
        };

        let mut issues = Vec::new();
        let mut seen_urls = HashSet::new();
        let mut entries = Vec::new();

        for (index, entry) in feed.entries.into_iter().enumerate() {
            let Some(parsed) = Self::parse_entry(entry) else {
                issues.push(format!("Entry {} has no link and was skipped", index + 1));
                continue;
            };

            if !seen_urls.insert(parsed.url.clone()) {
                debug!("Skipping duplicate entry within document: {}", parsed.url);
                continue;
            }
            entries.push(parsed);
        }

        info!("Parsed feed with {} entries ({} issues)", entries.len(), issues.len());

        ParsedFeed { entries, issues }
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let url = entry
            .links
            .iter()
            .map(|link| link.href.trim())
            .find(|href| !href.is_empty())?
            .to_string();

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = entry.summary.map(|s| s.content);
        let content = entry.content.and_then(|c| c.body);

        let description = entry
            .media
            .iter()
            .find_map(|media| media.description.as_ref().map(|d| d.content.clone()));

        let media_content = entry
            .media
            .iter()
            .flat_map(|media| media.content.iter())
            .filter_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .collect();

        let media_thumbnails = entry
            .media
            .iter()
            .flat_map(|media| media.thumbnails.iter())
            .map(|thumbnail| thumbnail.image.uri.clone())
            .filter(|uri| !uri.is_empty())
            .collect();

        let links = entry
            .links
            .into_iter()
            .map(|link| EntryLink {
                href: link.href,
                media_type: link.media_type,
            })
            .collect();

        Some(ParsedEntry {
            url,
            title,
            summary,
            content,
            description,
            published_at: entry.published,
            updated_at: entry.updated,
            media_content,
            media_thumbnails,
            links,
        })
    }
}

impl ParsedEntry {
    /// Publication time, preferring the published date over the updated date.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.published_at.or(self.updated_at)
    }

    /// Body text: structured content, then summary, then description.
    pub fn body(&self) -> String {
        [&self.content, &self.summary, &self.description]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .cloned()
            .unwrap_or_default()
    }

    /// First illustrative image: media content, media thumbnail, then an `image/*` link.
    pub fn image_url(&self) -> Option<String> {
        self.media_content
            .first()
            .or_else(|| self.media_thumbnails.first())
            .cloned()
            .or_else(|| {
                self.links
                    .iter()
                    .find(|link| {
                        link.media_type
                            .as_deref()
                            .is_some_and(|t| t.starts_with("image/"))
                    })
                    .map(|link| link.href.clone())
            })
    }
}
