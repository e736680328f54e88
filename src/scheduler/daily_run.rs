//! Daily reconciliation scheduler
//!
//! Runs every active account once a day at the configured Moscow time. The
//! marketplaces close their reporting day on Moscow time, so the run is pinned
//! to it regardless of the host timezone.

use crate::services::orchestrator;
use crate::state::AppState;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Europe::Moscow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Scheduler that runs all accounts at a fixed Moscow time
pub struct DailyRunScheduler {
    state: Arc<AppState>,
    run_at: NaiveTime,
}

impl DailyRunScheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        let schedule = &state.config.schedule;
        let run_at = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, 0)
            .unwrap_or(NaiveTime::MIN);
        Self { state, run_at }
    }

    /// Duration from `now` until the next `target` on the Moscow clock
    pub fn duration_until(now: DateTime<Utc>, target: NaiveTime) -> Duration {
        let now_time = now.with_timezone(&Moscow).time();

        let duration_secs = if now_time < target {
            // Target is later today
            (target - now_time).num_seconds() as u64
        } else {
            // Target is tomorrow
            let until_midnight = (24 * 3600) - now_time.num_seconds_from_midnight() as u64;
            let from_midnight = target.num_seconds_from_midnight() as u64;
            until_midnight + from_midnight
        };

        Duration::from_secs(duration_secs.max(1))
    }

    /// Wait for the next run time and run, until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(run_at = %self.run_at, "Daily run scheduler started (Europe/Moscow)");

        loop {
            let duration = Self::duration_until(Utc::now(), self.run_at);
            info!(
                "Next run in {} hours {} minutes",
                duration.as_secs() / 3600,
                (duration.as_secs() % 3600) / 60
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(duration) => {}
            }

            match orchestrator::run_all(&self.state, &cancel).await {
                Ok(reports) => {
                    let failed = reports.iter().filter(|r| !r.errors.is_empty()).count();
                    info!(accounts = reports.len(), with_errors = failed, "Daily run completed");
                }
                Err(e) if e.is_account_fatal() => warn!(error = %e, "Daily run skipped"),
                Err(e) => error!(error = %e, "Daily run failed"),
            }
        }

        info!("Daily run scheduler stopped");
    }
}
