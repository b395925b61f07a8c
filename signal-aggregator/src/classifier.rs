use crate::retry::{call_with_retry, RetryPolicy};
use crate::types::Classification;
use interfaces::{ForesightCategory, LanguageModelClient};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const FALLBACK_REASONING: &str = "heuristic fallback";
pub const DEFAULT_INDUSTRY: &str = "General";

const DEFAULT_PROMPT: &str = r#"You are an expert futures-signal classifier using the STEEPV framework.
Classify the following news item into exactly one category, choosing from:
Social, Technological, Economic, Environmental, Political or Values.

Return your answer as exactly three separate JSON objects, one below the other, with no additional text and no backticks.

Format:
{
"category": "[a single category]"
}
{
"reason": "[a brief explanation of why it belongs to that category]"
}
{
"industry": "[the specific industry concerned]"
}

News: {title} - {summary}
Industry: {industry}
Link: {link}
"#;

// Checked in order; the first table with any keyword present as a substring wins.
const CATEGORY_KEYWORDS: &[(ForesightCategory, &[&str])] = &[
    (
        ForesightCategory::Social,
        &["society", "people", "culture", "demographic", "education", "health"],
    ),
    (
        ForesightCategory::Technological,
        &["ai", "software", "hardware", "digital", "tech", "cyber", "data"],
    ),
    (
        ForesightCategory::Economic,
        &["money", "market", "finance", "trade", "economy", "business", "investment"],
    ),
    (
        ForesightCategory::Environmental,
        &["climate", "carbon", "nature", "green", "energy", "sustainability"],
    ),
    (
        ForesightCategory::Political,
        &["law", "government", "policy", "regulation", "vote", "election"],
    ),
    (ForesightCategory::Values, &["ethics", "moral", "belief", "religion", "trust"]),
];

const INDUSTRY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Technology", &["tech", "software", "saas"]),
    ("Finance", &["bank", "crypto", "stock"]),
    ("Healthcare", &["health", "med", "pharma"]),
    ("Energy", &["oil", "gas", "solar", "wind"]),
    ("Retail", &["shop", "commerce", "store"]),
];

static UNIT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*?\}").expect("structured unit pattern is valid"));

/// Deterministic keyword classification over the lower-cased title and summary.
pub fn heuristic_classification(title: &str, summary: &str) -> Classification {
    let text = format!("{} {}", title, summary).to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    let category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| matches(keywords))
        .map(|(category, _)| *category)
        .unwrap_or(ForesightCategory::Uncategorized);

    let industry = INDUSTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| matches(keywords))
        .map(|(industry, _)| *industry)
        .unwrap_or(DEFAULT_INDUSTRY);

    Classification {
        category,
        industry: industry.to_string(),
        reasoning: FALLBACK_REASONING.to_string(),
    }
}

/// Fields recovered from a model response. Any of them may be missing.
#[derive(Debug, Default, PartialEq)]
struct ExtractedFields {
    category: Option<ForesightCategory>,
    reasoning: Option<String>,
    industry: Option<String>,
}

impl ExtractedFields {
    fn is_empty(&self) -> bool {
        self.category.is_none() && self.reasoning.is_none() && self.industry.is_none()
    }

    fn complete_with(self, fallback: Classification) -> Classification {
        Classification {
            category: self.category.unwrap_or(fallback.category),
            industry: self.industry.unwrap_or(fallback.industry),
            reasoning: self.reasoning.unwrap_or(fallback.reasoning),
        }
    }
}

fn text_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Scans free text for `{...}` units and keeps the first occurrence of each field.
fn scan_units(response: &str) -> ExtractedFields {
    let cleaned = response.replace("```json", "").replace("```", "");
    let mut fields = ExtractedFields::default();

    for unit in UNIT_PATTERN.find_iter(&cleaned) {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(unit.as_str()) else {
            continue;
        };

        if fields.category.is_none() {
            fields.category = text_field(&object, "category").and_then(|c| c.parse().ok());
        }
        if fields.reasoning.is_none() {
            fields.reasoning = text_field(&object, "reason");
        }
        if fields.industry.is_none() {
            fields.industry = text_field(&object, "industry");
        }
    }

    fields
}

fn render_prompt(template: &str, title: &str, summary: &str, industry: &str, link: &str) -> String {
    template
        .replace("{title}", title)
        .replace("{summary}", summary)
        .replace("{industry}", industry)
        .replace("{link}", link)
}

/// Language-model classification with a keyword fallback. Never fails.
#[derive(Clone)]
pub struct Classifier {
    client: Option<Arc<dyn LanguageModelClient>>,
    prompt_template: Option<String>,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(client: Option<Arc<dyn LanguageModelClient>>) -> Self {
        Self {
            client,
            prompt_template: None,
            retry: RetryPolicy::standard(),
        }
    }

    /// A classifier with no provider, always using the keyword fallback.
    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn classify(&self, title: &str, summary: &str, industry_hint: &str, link: &str) -> Classification {
        let fallback = heuristic_classification(title, summary);

        let Some(client) = &self.client else {
            debug!("No language model configured, using heuristic for '{}'", title);
            return fallback;
        };

        let template = self.prompt_template.as_deref().unwrap_or(DEFAULT_PROMPT);
        let prompt = render_prompt(template, title, summary, industry_hint, link);

        let response = match call_with_retry(|| client.generate(&prompt), self.retry).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Classification failed for '{}', using heuristic: {}", title, e);
                return fallback;
            }
        };

        let fields = scan_units(&response);
        if fields.is_empty() {
            warn!("No usable fields in classification response for '{}'", title);
            return fallback;
        }

        fields.complete_with(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_tables_follow_priority_order() {
        // "digital" is Technological but "health" hits the Social table first.
        let c = heuristic_classification("Digital health records", "");
        assert_eq!(c.category, ForesightCategory::Social);
        assert_eq!(c.industry, "Healthcare");
        assert_eq!(c.reasoning, FALLBACK_REASONING);
    }

    #[test]
    fn no_keywords_means_uncategorized_and_general() {
        let c = heuristic_classification("Quiet week", "Nothing of note happened");
        assert_eq!(c.category, ForesightCategory::Uncategorized);
        assert_eq!(c.industry, DEFAULT_INDUSTRY);
    }

    #[test]
    fn heuristic_is_case_insensitive() {
        let c = heuristic_classification("CLIMATE Summit", "");
        assert_eq!(c.category, ForesightCategory::Environmental);
    }

    #[test]
    fn scans_three_separate_units() {
        let response = "```json\n{\"category\": \"Political\"}\n{\"reason\": \"New rules\"}\n{\"industry\": \"Banking\"}\n```";
        let fields = scan_units(response);
        assert_eq!(fields.category, Some(ForesightCategory::Political));
        assert_eq!(fields.reasoning.as_deref(), Some("New rules"));
        assert_eq!(fields.industry.as_deref(), Some("Banking"));
    }

    #[test]
    fn first_occurrence_wins_and_noise_is_ignored() {
        let response = r#"Sure! {"industry": "Mining", "category": "economic"} then {oops} and {"category": "Values", "reason": "x"}"#;
        let fields = scan_units(response);
        assert_eq!(fields.category, Some(ForesightCategory::Economic));
        assert_eq!(fields.industry.as_deref(), Some("Mining"));
        assert_eq!(fields.reasoning.as_deref(), Some("x"));
    }

    #[test]
    fn unknown_category_counts_as_missing() {
        let fields = scan_units(r#"{"category": "Spiritual"}"#);
        assert!(fields.is_empty());
    }

    #[test]
    fn template_placeholders_are_filled() {
        let prompt = render_prompt("{title}|{summary}|{industry}|{link}", "T", "S", "I", "L");
        assert_eq!(prompt, "T|S|I|L");
        assert!(DEFAULT_PROMPT.contains("{title}") && DEFAULT_PROMPT.contains("{link}"));
    }
}
