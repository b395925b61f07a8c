use crate::events::{EventLog, AI};
use crate::retry::{call_with_retry, RetryPolicy};
use crate::types::{Cohort, Item};
use interfaces::LanguageModelClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const BATCH_SIZE: usize = 10;
pub const NOT_CONFIGURED: &str = "Language model API key not configured.";
pub const NO_BATCHES: &str = "Failed to generate summary: No batches processed successfully.";

const BATCH_PROMPT: &str = "Analyze these news signals and extract the key emerging trends, themes, and signals.
Focus on STEEPV categories and Industry impacts.
Provide a concise summary of the key points found in this batch.

News Signals:
";

const SYNTHESIS_PROMPT: &str = "Act as a Foresight Analyst. You have analyzed several batches of news signals and extracted the following key trends and themes.
Synthesize these findings into a cohesive Weekly Trend Report.

Group the insights by STEEPV category and Industry where relevant.

Create a narrative summary that explains:
1. What is happening (The Signal)
2. Why it matters (The Impact)
3. How industries are reacting

Format the output as a professional weekly report.

Key Trends & Themes from Batches:
{articles}";

/// Outcome of a summarization run. Every variant has a report body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Narrative {
    Synthesized(String),
    NotConfigured,
    NoBatches,
    Failed(String),
}

impl Narrative {
    pub fn is_synthesized(&self) -> bool {
        matches!(self, Narrative::Synthesized(_))
    }

    pub fn body(&self) -> String {
        match self {
            Narrative::Synthesized(text) => text.clone(),
            Narrative::NotConfigured => NOT_CONFIGURED.to_string(),
            Narrative::NoBatches => NO_BATCHES.to_string(),
            Narrative::Failed(error) => format!("Error generating summary: {}", error),
        }
    }
}

fn render_batch(batch: &[Item]) -> String {
    let lines: Vec<String> = batch
        .iter()
        .map(|item| {
            format!(
                "- {}: {} (Category: {}, Industry: {})",
                item.title, item.summary, item.category, item.industry
            )
        })
        .collect();
    format!("{}{}", BATCH_PROMPT, lines.join("\n\n"))
}

fn focus_line(cohort: &Cohort) -> String {
    match cohort {
        Cohort::Category(category) => {
            format!("\n\nFocus specifically on trends within the '{}' STEEPV category.", category)
        }
        Cohort::Industry(industry) => {
            format!("\n\nFocus specifically on impacts to the '{}' industry.", industry)
        }
    }
}

/// Map-reduce summarization: one call per batch of items, then one synthesis call.
#[derive(Clone)]
pub struct Summarizer {
    client: Option<Arc<dyn LanguageModelClient>>,
    events: EventLog,
    prompt_template: Option<String>,
    batch_retry: RetryPolicy,
    synthesis_retry: RetryPolicy,
    pacing: Duration,
}

impl Summarizer {
    pub fn new(client: Option<Arc<dyn LanguageModelClient>>, events: EventLog) -> Self {
        Self {
            client,
            events,
            prompt_template: None,
            batch_retry: RetryPolicy::standard(),
            synthesis_retry: RetryPolicy::synthesis(),
            pacing: Duration::from_secs(2),
        }
    }

    /// Custom synthesis template; `{articles}` receives the batch summaries.
    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn with_retry_policies(mut self, batch: RetryPolicy, synthesis: RetryPolicy) -> Self {
        self.batch_retry = batch;
        self.synthesis_retry = synthesis;
        self
    }

    /// Delay between successful batch calls.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn summarize(&self, items: &[Item], cohort: Option<&Cohort>) -> Narrative {
        let Some(client) = &self.client else {
            return Narrative::NotConfigured;
        };

        let batches: Vec<&[Item]> = items.chunks(BATCH_SIZE).collect();
        let cohort_label = cohort.map(Cohort::label);

        self.events
            .info(
                AI,
                &format!("Generating trend summary for {} articles", items.len()),
                Some(json!({ "cohort": cohort_label, "batches": batches.len() })),
            )
            .await;

        let mut batch_summaries = Vec::with_capacity(batches.len());
        for (index, batch) in batches.iter().enumerate() {
            debug!("Processing batch {}/{}", index + 1, batches.len());
            let prompt = render_batch(batch);

            match call_with_retry(|| client.generate(&prompt), self.batch_retry).await {
                Ok(text) => {
                    batch_summaries.push(text);
                    if index + 1 < batches.len() && !self.pacing.is_zero() {
                        tokio::time::sleep(self.pacing).await;
                    }
                }
                Err(e) => {
                    self.events
                        .error(
                            AI,
                            &format!("Error processing batch {} for trend summary", index + 1),
                            Some(json!({ "batch": index + 1, "error": e.to_string() })),
                        )
                        .await;
                }
            }
        }

        if batch_summaries.is_empty() {
            self.events.error(AI, NO_BATCHES, None).await;
            return Narrative::NoBatches;
        }

        let aggregated = batch_summaries.join("\n\n");
        let template = self.prompt_template.as_deref().unwrap_or(SYNTHESIS_PROMPT);
        let mut prompt = template.replace("{articles}", &aggregated);
        if let Some(cohort) = cohort {
            prompt.push_str(&focus_line(cohort));
        }

        match call_with_retry(|| client.generate(&prompt), self.synthesis_retry).await {
            Ok(text) => {
                info!("Synthesized summary from {} of {} batches", batch_summaries.len(), batches.len());
                self.events.info(AI, "Trend summary generated successfully", None).await;
                Narrative::Synthesized(text)
            }
            Err(e) => {
                self.events
                    .error(
                        AI,
                        "Error generating final trend summary",
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await;
                Narrative::Failed(e.to_string())
            }
        }
    }
}
