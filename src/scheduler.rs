//! Daily batch schedule
//!
//! [`run_daily`] sleeps until the configured local time, runs one batch, and
//! repeats until its cancellation token fires. A failed run is logged (the
//! orchestrator already reported it) and the next day's run happens as usual.

use crate::orchestrator::BatchOrchestrator;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Next occurrence of `run_at` strictly after `now`, in the time zone of `now`
///
/// Local times skipped by a daylight-saving jump resolve to the first valid
/// instant after the gap; ambiguous times resolve to their earliest instant.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, run_at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    let today_run = resolve_local(&tz, today.and_time(run_at));
    if today_run > *now {
        return today_run;
    }
    let tomorrow = today.succ_opt().unwrap_or(today);
    resolve_local(&tz, tomorrow.and_time(run_at))
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = local;
    // DST gaps last at most a few hours
    for _ in 0..MINUTES_PER_DAY {
        if let Some(instant) = tz.from_local_datetime(&candidate).earliest() {
            return instant;
        }
        candidate += ChronoDuration::minutes(1);
    }
    tz.from_utc_datetime(&local)
}

/// Run a batch every day at `run_at` (local time) until `cancel` fires
pub async fn run_daily(orchestrator: BatchOrchestrator, run_at: NaiveTime, cancel: CancellationToken) {
    info!(run_at = %run_at, "daily schedule started");

    loop {
        let now = Local::now();
        let next = next_run_after(&now, run_at);
        let delay = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "waiting for next batch run");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        match orchestrator.run().await {
            Ok(report) => info!(
                refreshed = report.refreshed_count(),
                attempted = report.items.len(),
                "scheduled batch run complete"
            ),
            Err(e) => error!(error = %e, "scheduled batch run failed"),
        }
    }

    info!("daily schedule stopped");
}
