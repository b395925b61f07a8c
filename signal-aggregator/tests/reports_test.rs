mod common;

use chrono::{Duration, Utc};
use common::*;
use interfaces::{
    ForesightCategory, LanguageModelClient, LanguageModelError, RecordStore, SignalStrength, SqliteRecordStore,
};
use signal_aggregator::llm_adapter::{FailingMock, MockLanguageModel};
use signal_aggregator::reports::{GENERATING_SUFFIX, IN_PROGRESS_BODY, NO_ITEMS_BODY};
use signal_aggregator::summarizer::{NOT_CONFIGURED, NO_BATCHES};
use signal_aggregator::{EventLog, PipelineError, ReportGenerator};
use std::sync::Arc;

const INDUSTRIES: [&str; 6] = ["Agriculture", "Mining", "Transport", "Insurance", "Media", "Tourism"];

fn generator(store: &Arc<SqliteRecordStore>, model: Option<Arc<dyn LanguageModelClient>>) -> ReportGenerator {
    ReportGenerator::new(store.clone(), summarizer(store, model), EventLog::new(store.clone()))
}

fn mock() -> Option<Arc<dyn LanguageModelClient>> {
    Some(Arc::new(MockLanguageModel::new("narrative")))
}

/// Inserts `count` items of one category, each with a different industry.
async fn seed_category(
    store: &SqliteRecordStore,
    category: ForesightCategory,
    strengths: &[SignalStrength],
    age: Duration,
) {
    let source = add_source(store, &format!("https://{}.example.com/rss", uuid::Uuid::new_v4()), "Seed", None).await;
    let items: Vec<_> = strengths
        .iter()
        .zip(INDUSTRIES.iter())
        .map(|(strength, industry)| {
            curated_item(source.id, "Seeded", category, industry, *strength, Utc::now() - age)
        })
        .collect();
    store.insert_items(&items).await.unwrap();
}

#[tokio::test]
async fn cohort_below_threshold_gets_no_report() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Environmental, &[SignalStrength::Medium; 4], Duration::hours(1)).await;

    let reports = generator(&store, mock()).run_weekly_reports().await.unwrap();
    assert!(reports.is_empty());
    assert!(store.list_reports().await.unwrap().is_empty());
}

#[tokio::test]
async fn cohort_at_threshold_gets_a_published_report() {
    init_tracing();
    let store = setup_store().await;
    let strengths = [
        SignalStrength::Medium,
        SignalStrength::Strong,
        SignalStrength::Medium,
        SignalStrength::Strong,
        SignalStrength::Medium,
    ];
    seed_category(&store, ForesightCategory::Environmental, &strengths, Duration::hours(1)).await;

    let reports = generator(&store, mock()).run_weekly_reports().await.unwrap();
    assert_eq!(reports.len(), 1);

    let report = &reports[0];
    assert!(report.title.starts_with("Weekly Environmental Trends - "));
    assert_eq!(report.body, "narrative");
    assert!(report.is_published);
    assert!(report.window_end - report.window_start >= Duration::days(7));
    assert_eq!(store.list_reports().await.unwrap().len(), 1);
}

#[tokio::test]
async fn pending_and_low_items_do_not_count() {
    init_tracing();
    let store = setup_store().await;
    let strengths = [
        SignalStrength::Medium,
        SignalStrength::Strong,
        SignalStrength::Medium,
        SignalStrength::Low,
        SignalStrength::Pending,
        SignalStrength::Strong,
    ];
    seed_category(&store, ForesightCategory::Social, &strengths, Duration::hours(1)).await;

    let reports = generator(&store, mock()).run_weekly_reports().await.unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn items_older_than_a_week_do_not_count() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Economic, &[SignalStrength::Strong; 6], Duration::days(10)).await;

    let reports = generator(&store, mock()).run_weekly_reports().await.unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn industry_cohorts_get_outlook_reports() {
    init_tracing();
    let store = setup_store().await;
    let source = add_source(&store, "https://energy.example.com/rss", "Energy", None).await;
    let items: Vec<_> = [
        ForesightCategory::Social,
        ForesightCategory::Technological,
        ForesightCategory::Economic,
        ForesightCategory::Political,
        ForesightCategory::Values,
    ]
    .into_iter()
    .map(|category| curated_item(source.id, "Grid", category, "Energy", SignalStrength::Strong, Utc::now()))
    .collect();
    store.insert_items(&items).await.unwrap();

    let reports = generator(&store, mock()).run_weekly_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].title.starts_with("Weekly Energy Outlook - "));
}

#[tokio::test]
async fn unconfigured_provider_still_publishes_the_cohort_report() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Values, &[SignalStrength::Strong; 5], Duration::hours(1)).await;

    let reports = generator(&store, None).run_weekly_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].body, NOT_CONFIGURED);
    assert!(reports[0].is_published);
}

#[tokio::test]
async fn failed_synthesis_still_publishes_the_cohort_report() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Environmental, &[SignalStrength::Strong; 5], Duration::hours(1)).await;

    let failing: Arc<dyn LanguageModelClient> =
        Arc::new(FailingMock::new(LanguageModelError::Failed("down".to_string())));
    let reports = generator(&store, Some(failing)).run_weekly_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].title.starts_with("Weekly Environmental Trends - "));
    assert_eq!(reports[0].body, NO_BATCHES);
    assert!(reports[0].is_published);

    let stored = store.get_report(reports[0].id).await.unwrap().unwrap();
    assert!(stored.is_published);
}

#[tokio::test]
async fn on_demand_report_starts_as_a_placeholder_and_is_completed() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Political, &[SignalStrength::Medium; 3], Duration::hours(2)).await;

    let pending = generator(&store, mock())
        .generate_report(7, SignalStrength::Medium)
        .await
        .unwrap();
    assert!(pending.report.title.ends_with(GENERATING_SUFFIX));
    assert_eq!(pending.report.body, IN_PROGRESS_BODY);
    assert!(!pending.report.is_published);
    assert_eq!(pending.report.window_end - pending.report.window_start, Duration::days(7));

    let finished = pending.handle.await.unwrap();
    assert_eq!(finished.id, pending.report.id);
    assert_eq!(finished.body, "narrative");
    assert!(!finished.title.contains("Generating"));

    let stored = store.get_report(finished.id).await.unwrap().unwrap();
    assert_eq!(stored.body, "narrative");
    assert_eq!(stored.title, finished.title);
}

#[tokio::test]
async fn on_demand_report_with_no_curated_items() {
    init_tracing();
    let store = setup_store().await;
    seed_category(&store, ForesightCategory::Political, &[SignalStrength::Medium; 3], Duration::hours(2)).await;

    let pending = generator(&store, mock())
        .generate_report(7, SignalStrength::Strong)
        .await
        .unwrap();
    let finished = pending.handle.await.unwrap();
    assert_eq!(finished.body, NO_ITEMS_BODY);

    let stored = store.get_report(finished.id).await.unwrap().unwrap();
    assert_eq!(stored.body, NO_ITEMS_BODY);
}

#[tokio::test]
async fn on_demand_report_rejects_an_empty_window() {
    init_tracing();
    let store = setup_store().await;
    let result = generator(&store, mock()).generate_report(0, SignalStrength::Medium).await;
    assert!(matches!(result, Err(PipelineError::Config(_))));
    assert!(store.list_reports().await.unwrap().is_empty());
}
