use crate::config::FeedSchedule;
use crate::ingest::FeedIngester;
use crate::reports::ReportGenerator;
use crate::types::{PipelineError, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

const WEEKLY_REPORT_HOUR: i64 = 9;

/// The first Monday 09:00 in `now`'s timezone strictly after `now`.
///
/// When 09:00 falls in a DST gap the run moves one hour later; when it is
/// ambiguous the earlier instant is used.
pub fn next_weekly_run<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let local = now.naive_local();
    let run_time = NaiveTime::MIN + ChronoDuration::hours(WEEKLY_REPORT_HOUR);

    let days_until_monday = (7 - local.weekday().num_days_from_monday()) % 7;
    let mut date = local.date() + ChronoDuration::days(i64::from(days_until_monday));

    loop {
        let naive = date.and_time(run_time);
        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + ChronoDuration::hours(1))).earliest());

        if let Some(candidate) = candidate {
            if candidate > *now {
                return candidate;
            }
        }
        date += ChronoDuration::days(7);
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Runs the feed job on the configured interval and the weekly report job
/// every Monday at 09:00 local time.
pub struct Scheduler {
    ingester: FeedIngester,
    reports: ReportGenerator,
    schedule: FeedSchedule,
    feed_period: Duration,
    running: Mutex<Option<Running>>,
}

/// Runs one job to completion on its own task so a panic cannot end the loop.
async fn run_guarded<T, F>(name: &'static str, job: F)
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: std::fmt::Debug + Send + 'static,
{
    info!("Running scheduled job: {}", name);
    match tokio::spawn(job).await {
        Ok(Ok(outcome)) => info!("Scheduled job {} complete: {:?}", name, outcome),
        Ok(Err(e)) => error!("Scheduled job {} failed: {}", name, e),
        Err(e) => error!("Scheduled job {} aborted: {}", name, PipelineError::from(e)),
    }
}

impl Scheduler {
    pub fn new(ingester: FeedIngester, reports: ReportGenerator, schedule: FeedSchedule) -> Self {
        Self {
            ingester,
            reports,
            schedule,
            feed_period: schedule.period(),
            running: Mutex::new(None),
        }
    }

    /// Overrides the feed job interval derived from the schedule.
    pub fn with_feed_period(mut self, period: Duration) -> Self {
        self.feed_period = period;
        self
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state().is_some()
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.state();
        if state.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let (shutdown, _) = watch::channel(false);
        let period = self.feed_period;
        info!("Starting scheduler: feeds {} ({:?}), weekly reports Monday 09:00", self.schedule, period);

        let feed_job = {
            let ingester = self.ingester.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let ingester = ingester.clone();
                            run_guarded("update_feeds", async move { ingester.fetch_all().await }).await;
                        }
                        _ = stop.changed() => break,
                    }
                }
            })
        };

        let report_job = {
            let reports = self.reports.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    let now = Local::now();
                    let next = next_weekly_run(&now);
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    info!("Next weekly report run at {}", next);

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            let reports = reports.clone();
                            run_guarded("weekly_reports", async move {
                                reports.run_weekly_reports().await.map(|r| r.len())
                            })
                            .await;
                        }
                        _ = stop.changed() => break,
                    }
                }
            })
        };

        *state = Some(Running {
            shutdown,
            handles: vec![feed_job, report_job],
        });
        Ok(())
    }

    /// Signals both jobs to stop and waits for them. An in-flight job finishes first.
    pub async fn stop(&self) {
        let running = self.state().take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                error!("Scheduler job ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}
