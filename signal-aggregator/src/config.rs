use crate::types::FetchConfig;
use interfaces::RecordStore;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://signals.db";

/// Store settings keys that override the environment.
pub mod keys {
    pub const API_KEY: &str = "gemini_api_key";
    pub const MODEL: &str = "gemini_model";
    pub const FEED_SCHEDULE: &str = "feed_schedule";
    pub const CLASSIFICATION_PROMPT: &str = "steepv_prompt";
    pub const SUMMARY_PROMPT: &str = "trend_prompt";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSchedule {
    #[default]
    Hourly,
    Daily,
    Weekly,
}

impl FeedSchedule {
    pub fn period(self) -> Duration {
        match self {
            FeedSchedule::Hourly => Duration::from_secs(60 * 60),
            FeedSchedule::Daily => Duration::from_secs(24 * 60 * 60),
            FeedSchedule::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Lenient parse: anything unrecognised schedules hourly.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("Unknown feed schedule '{}', using hourly", value);
            FeedSchedule::Hourly
        })
    }
}

impl FromStr for FeedSchedule {
    type Err = interfaces::UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(FeedSchedule::Hourly),
            "daily" => Ok(FeedSchedule::Daily),
            "weekly" => Ok(FeedSchedule::Weekly),
            _ => Err(interfaces::UnknownValue(s.to_string())),
        }
    }
}

impl fmt::Display for FeedSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedSchedule::Hourly => "hourly",
            FeedSchedule::Daily => "daily",
            FeedSchedule::Weekly => "weekly",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub schedule: FeedSchedule,
    pub classification_prompt: Option<String>,
    pub summary_prompt: Option<String>,
    pub fetch: FetchConfig,
    pub max_concurrent_fetches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            schedule: FeedSchedule::Hourly,
            classification_prompt: None,
            summary_prompt: None,
            fetch: FetchConfig::default(),
            max_concurrent_fetches: 1,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl PipelineConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup("DATABASE_URL")) {
            config.database_url = url;
        }
        config.api_key = non_empty(lookup("LLM_API_KEY"));
        if let Some(model) = non_empty(lookup("LLM_MODEL")) {
            config.model = model;
        }
        if let Some(schedule) = non_empty(lookup("FEED_SCHEDULE")) {
            config.schedule = FeedSchedule::parse_or_default(&schedule);
        }
        config.classification_prompt = non_empty(lookup("CLASSIFICATION_PROMPT"));
        config.summary_prompt = non_empty(lookup("SUMMARY_PROMPT"));
        if let Some(limit) = non_empty(lookup("MAX_CONCURRENT_FETCHES")) {
            match limit.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_concurrent_fetches = n,
                _ => warn!("Ignoring invalid MAX_CONCURRENT_FETCHES '{}'", limit),
            }
        }

        config
    }

    /// Overlays the store's key/value settings, which take priority over the environment.
    pub async fn with_settings(mut self, store: &dyn RecordStore) -> anyhow::Result<Self> {
        if let Some(key) = non_empty(store.get_setting(keys::API_KEY).await?) {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty(store.get_setting(keys::MODEL).await?) {
            self.model = model;
        }
        if let Some(schedule) = non_empty(store.get_setting(keys::FEED_SCHEDULE).await?) {
            self.schedule = FeedSchedule::parse_or_default(&schedule);
        }
        if let Some(prompt) = non_empty(store.get_setting(keys::CLASSIFICATION_PROMPT).await?) {
            self.classification_prompt = Some(prompt);
        }
        if let Some(prompt) = non_empty(store.get_setting(keys::SUMMARY_PROMPT).await?) {
            self.summary_prompt = Some(prompt);
        }

        debug!(
            model = %self.model,
            schedule = %self.schedule,
            has_api_key = self.api_key.is_some(),
            "Resolved pipeline configuration"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("LLM_API_KEY", "secret"),
            ("FEED_SCHEDULE", "Daily"),
            ("MAX_CONCURRENT_FETCHES", "4"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.schedule, FeedSchedule::Daily);
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn empty_api_key_is_absent() {
        let config = PipelineConfig::from_lookup(|k| (k == "LLM_API_KEY").then(|| "  ".to_string()));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn unknown_schedule_means_hourly() {
        assert_eq!(FeedSchedule::parse_or_default("fortnightly"), FeedSchedule::Hourly);
        assert_eq!(FeedSchedule::Weekly.period(), Duration::from_secs(604_800));
    }
}
