use crate::events::{EventLog, AI, SYSTEM};
use crate::summarizer::Summarizer;
use crate::types::{Cohort, PipelineError, Report, Result, SignalStrength};
use chrono::{Duration, Utc};
use interfaces::{ItemQuery, NewReport, RecordStore};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Items a cohort needs within the report window before it gets a report.
pub const MIN_COHORT_ITEMS: usize = 5;
pub const DISCOVERY_DAYS: i64 = 30;
pub const REPORT_DAYS: i64 = 7;

pub const GENERATING_SUFFIX: &str = " (Generating...)";
pub const IN_PROGRESS_BODY: &str = "Report generation in progress...";
pub const NO_ITEMS_BODY: &str = "No curated items found for this period.";

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn cohort_title(cohort: &Cohort) -> String {
    match cohort {
        Cohort::Category(category) => format!("Weekly {} Trends - {}", category, today()),
        Cohort::Industry(industry) => format!("Weekly {} Outlook - {}", industry, today()),
    }
}

/// A placeholder report plus the task that fills it in.
pub struct PendingReport {
    pub report: Report,
    pub handle: JoinHandle<Report>,
}

#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<dyn RecordStore>,
    summarizer: Summarizer,
    events: EventLog,
}

impl ReportGenerator {
    pub fn new(store: Arc<dyn RecordStore>, summarizer: Summarizer, events: EventLog) -> Self {
        Self {
            store,
            summarizer,
            events,
        }
    }

    /// Writes one published report per category and industry with enough
    /// medium or strong items in the last week.
    pub async fn run_weekly_reports(&self) -> Result<Vec<Report>> {
        info!("Running weekly report generation");
        let now = Utc::now();
        let discovery_since = now - Duration::days(DISCOVERY_DAYS);
        let window_start = now - Duration::days(REPORT_DAYS);

        let mut cohorts: Vec<Cohort> = self
            .store
            .distinct_categories(discovery_since)
            .await?
            .into_iter()
            .map(Cohort::Category)
            .collect();
        cohorts.extend(
            self.store
                .distinct_industries(discovery_since)
                .await?
                .into_iter()
                .map(Cohort::Industry),
        );

        let mut reports = Vec::new();
        for cohort in cohorts {
            let query = ItemQuery {
                created_since: Some(window_start),
                category: match &cohort {
                    Cohort::Category(category) => Some(*category),
                    Cohort::Industry(_) => None,
                },
                industry: match &cohort {
                    Cohort::Industry(industry) => Some(industry.clone()),
                    Cohort::Category(_) => None,
                },
                signal_strengths: SignalStrength::at_least(SignalStrength::Medium),
            };

            match self.cohort_report(&cohort, &query, window_start).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => {
                    error!("Weekly report for {} failed: {}", cohort.label(), e);
                    self.events
                        .error(
                            SYSTEM,
                            &format!("Error generating weekly report for {}", cohort.label()),
                            Some(json!({ "error": e.to_string() })),
                        )
                        .await;
                }
            }
        }

        info!("Weekly report generation complete: {} reports", reports.len());
        Ok(reports)
    }

    async fn cohort_report(
        &self,
        cohort: &Cohort,
        query: &ItemQuery,
        window_start: chrono::DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let items = self.store.query_items(query).await?;
        if items.len() < MIN_COHORT_ITEMS {
            return Ok(None);
        }

        info!("Generating report for {} ({} items)", cohort.label(), items.len());
        let narrative = self.summarizer.summarize(&items, Some(cohort)).await;
        if !narrative.is_synthesized() {
            warn!("Report for {} was not synthesized: {}", cohort.label(), narrative.body());
        }

        let report = self
            .store
            .insert_report(NewReport {
                title: cohort_title(cohort),
                body: narrative.body(),
                window_start,
                window_end: Utc::now(),
                is_published: true,
            })
            .await?;
        Ok(Some(report))
    }

    /// Inserts a placeholder report and fills it in on a background task.
    ///
    /// The placeholder is returned at once; callers re-read the report or await
    /// the handle to see the final body.
    pub async fn generate_report(&self, days: i64, min_signal: SignalStrength) -> Result<PendingReport> {
        if days <= 0 {
            return Err(PipelineError::Config(format!("report window must be positive, got {} days", days)));
        }

        let now = Utc::now();
        let report = self
            .store
            .insert_report(NewReport {
                title: format!("Weekly Trend Report - {}{}", today(), GENERATING_SUFFIX),
                body: IN_PROGRESS_BODY.to_string(),
                window_start: now - Duration::days(days),
                window_end: now,
                is_published: false,
            })
            .await?;

        let generator = self.clone();
        let placeholder = report.clone();
        let handle = tokio::spawn(async move { generator.complete_report(placeholder, min_signal).await });

        Ok(PendingReport { report, handle })
    }

    async fn complete_report(&self, mut report: Report, min_signal: SignalStrength) -> Report {
        let query = ItemQuery {
            created_since: Some(report.window_start),
            signal_strengths: SignalStrength::at_least(min_signal),
            ..Default::default()
        };

        match self.store.query_items(&query).await {
            Ok(items) if items.is_empty() => {
                report.body = NO_ITEMS_BODY.to_string();
            }
            Ok(items) => {
                report.body = self.summarizer.summarize(&items, None).await.body();
                report.title = format!("Weekly Trend Report - {}", today());
            }
            Err(e) => {
                error!("Error generating report {}: {}", report.id, e);
                report.body = format!("Error generating report: {}", e);
            }
        }

        if let Err(e) = self.store.update_report(&report).await {
            error!("Failed to save report {}: {}", report.id, e);
            self.events
                .error(
                    AI,
                    "Failed to save generated report",
                    Some(json!({ "report_id": report.id, "error": e.to_string() })),
                )
                .await;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::ForesightCategory;

    #[test]
    fn cohort_titles_name_the_cohort() {
        let category = cohort_title(&Cohort::Category(ForesightCategory::Environmental));
        assert!(category.starts_with("Weekly Environmental Trends - "));

        let industry = cohort_title(&Cohort::Industry("Energy".to_string()));
        assert!(industry.starts_with("Weekly Energy Outlook - "));
        assert!(industry.ends_with(&today()));
    }
}
