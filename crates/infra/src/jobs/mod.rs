//! Recurring background work.
//!
//! ## Design
//!
//! - Tasks run on a fixed schedule (hourly, daily) rather than from a queue
//! - One loop thread, graceful shutdown, runtime stats
//! - No retries: a failed run logs and waits for the next interval
//!
//! ## Components
//!
//! - `Scheduler`: registers and runs the recurring tasks
//! - `contract_jobs`: status refresh, lapse invoicing, invoice status sync

pub mod contract_jobs;
pub mod scheduler;

pub use contract_jobs::{
    invoice_lapsed_contracts, refresh_contract_statuses, sync_contract_invoice_status,
    REFRESH_WINDOW_DAYS,
};
pub use scheduler::{RunSummary, Schedule, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};
