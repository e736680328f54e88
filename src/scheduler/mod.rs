//! Scheduler module
//!
//! Handles scheduled tasks:
//! - Daily reconciliation and aggregation of all accounts (Moscow time)

mod daily_run;

pub use daily_run::DailyRunScheduler;
