//! Interval scheduler for recurring maintenance tasks.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

/// How often a task recurs. `Every` is mainly for tests and dev, where
/// waiting an hour is not an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Hourly,
    Daily,
    Every(Duration),
}

impl Schedule {
    fn interval(&self) -> Duration {
        match self {
            Schedule::Hourly => Duration::from_secs(60 * 60),
            Schedule::Daily => Duration::from_secs(24 * 60 * 60),
            Schedule::Every(d) => *d,
        }
    }
}

type TaskFn = Box<dyn FnMut() -> Result<(), String> + Send>;

struct ScheduledTask {
    name: String,
    schedule: Schedule,
    task: TaskFn,
    last_run: Option<Instant>,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the loop checks for due tasks
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            name: "scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub uptime_secs: u64,
}

/// Outcome of one pass over the registered tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Background task scheduler.
///
/// Tasks are registered with a schedule and run on a single loop thread,
/// each when its interval has elapsed since its previous run. Every task
/// also runs once on the first pass, so a freshly started process catches
/// up immediately. There are no retries: a failed run is logged and the
/// task waits for its next interval.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recurring task.
    pub fn register<F>(&mut self, name: impl Into<String>, schedule: Schedule, task: F)
    where
        F: FnMut() -> Result<(), String> + Send + 'static,
    {
        self.tasks.push(ScheduledTask {
            name: name.into(),
            schedule,
            task: Box::new(task),
            last_run: None,
        });
    }

    /// Run every task whose interval has elapsed (synchronous; also used
    /// directly by tests).
    pub fn run_due(&mut self) -> RunSummary {
        let now = Instant::now();
        let mut summary = RunSummary::default();

        for task in &mut self.tasks {
            let due = match task.last_run {
                None => true,
                Some(last) => now.duration_since(last) >= task.schedule.interval(),
            };
            if !due {
                continue;
            }

            summary.started += 1;
            task.last_run = Some(now);
            debug!(task = %task.name, "running scheduled task");

            match (task.task)() {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(task = %task.name, error = %err, "scheduled task failed");
                }
            }
        }

        summary
    }

    /// Spawn the scheduler loop in a background thread.
    pub fn spawn(self, config: SchedulerConfig) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || scheduler_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn scheduler thread");

        SchedulerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn scheduler_loop(
    mut scheduler: Scheduler,
    config: SchedulerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(scheduler = %config.name, tasks = scheduler.tasks.len(), "scheduler started");
    let start_time = Instant::now();

    loop {
        // Check for shutdown
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let summary = scheduler.run_due();

        if let Ok(mut s) = stats.lock() {
            s.runs_started += summary.started as u64;
            s.runs_succeeded += summary.succeeded as u64;
            s.runs_failed += summary.failed as u64;
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        thread::sleep(config.poll_interval);
    }

    info!(scheduler = %config.name, "scheduler stopped");
}
