use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interfaces::{NewSource, SignalStrength, SqliteRecordStore};
use signal_aggregator::events::SYSTEM;
use signal_aggregator::{
    build_client, Classifier, EventLog, FeedIngester, Fetcher, PipelineConfig, ReportGenerator, Scheduler,
    Summarizer,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "signal-aggregator", about = "Foresight feed ingestion and trend reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the feed and weekly report schedules until Ctrl-C
    Run,
    /// Fetch one source, or every active source, once
    Fetch {
        #[arg(long)]
        url: Option<String>,
    },
    /// Register a feed source
    AddSource {
        url: String,
        #[arg(long)]
        name: String,
        /// Industry label applied to every item from this source
        #[arg(long)]
        category: Option<String>,
    },
    /// Generate an on-demand report and wait for it
    Report {
        #[arg(long, default_value_t = 7)]
        days: i64,
        /// strong, medium or low
        #[arg(long, default_value = "medium")]
        min_signal: String,
    },
    /// Run the weekly cohort reports once
    Weekly,
}

struct Pipeline {
    events: EventLog,
    ingester: FeedIngester,
    reports: ReportGenerator,
    config: PipelineConfig,
}

async fn build_pipeline(store: Arc<SqliteRecordStore>, config: PipelineConfig) -> Result<Pipeline> {
    let config = config.with_settings(store.as_ref()).await?;
    let client = build_client(&config);
    if client.is_none() {
        info!("No language model API key configured; using heuristic classification");
    }

    let events = EventLog::new(store.clone());
    let classifier = Classifier::new(client.clone()).with_prompt_template(config.classification_prompt.clone());
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let ingester = FeedIngester::new(store.clone(), fetcher, classifier, events.clone())
        .with_max_concurrent(config.max_concurrent_fetches);
    let summarizer = Summarizer::new(client, events.clone()).with_prompt_template(config.summary_prompt.clone());
    let reports = ReportGenerator::new(store, summarizer, events.clone());

    Ok(Pipeline {
        events,
        ingester,
        reports,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    let store = Arc::new(
        SqliteRecordStore::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?,
    );

    match cli.command {
        Command::AddSource { url, name, category } => {
            Url::parse(&url).with_context(|| format!("Invalid feed url: {}", url))?;
            let source = store.add_source(NewSource { url, name, category }).await?;
            println!("Added source {} ({})", source.name, source.id);
        }
        Command::Fetch { url } => {
            let pipeline = build_pipeline(store, config).await?;
            let count = match url {
                Some(url) => pipeline.ingester.fetch_url(&url).await?,
                None => pipeline.ingester.fetch_all().await?,
            };
            println!("New items: {}", count);
        }
        Command::Report { days, min_signal } => {
            let min_signal: SignalStrength = min_signal
                .parse()
                .with_context(|| format!("Unknown signal strength: {}", min_signal))?;
            let pipeline = build_pipeline(store, config).await?;
            let pending = pipeline.reports.generate_report(days, min_signal).await?;
            info!("Report {} queued", pending.report.id);

            let report = pending.handle.await?;
            println!("{}\n\n{}", report.title, report.body);
        }
        Command::Weekly => {
            let pipeline = build_pipeline(store, config).await?;
            let reports = pipeline.reports.run_weekly_reports().await?;
            for report in &reports {
                println!("{}", report.title);
            }
            println!("Weekly reports written: {}", reports.len());
        }
        Command::Run => {
            let pipeline = build_pipeline(store, config).await?;
            let scheduler = Scheduler::new(pipeline.ingester, pipeline.reports, pipeline.config.schedule);
            scheduler.start()?;
            pipeline
                .events
                .info(SYSTEM, &format!("Scheduler started ({})", pipeline.config.schedule), None)
                .await;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            scheduler.stop().await;
            pipeline.events.info(SYSTEM, "Scheduler stopped", None).await;
        }
    }

    Ok(())
}
