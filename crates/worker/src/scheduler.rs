//! Background scheduler
//!
//! Each registered loop runs in its own tokio task on its own cadence. A loop
//! checks the shared running flag before and after every task run, so a stop
//! request lands between iterations; sleeps are cut short by a cancellation
//! token. Every task invocation runs in a nested task, so an error or panic
//! is logged and counted without touching sibling loops.
//!
//! `stop()` waits up to the grace period for loops to exit and aborts the
//! rest, so it always returns in bounded time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;

/// A unit of background work
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<(), SchedulerError>;
}

/// When a loop fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Run, then sleep `interval`, repeat
    Every(Duration),
    /// Poll every `poll`; run once when the UTC hour equals `hour`
    DailyAt { hour: u32, poll: Duration },
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Per-task counters
#[derive(Debug, Default)]
struct TaskCounters {
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Plain-value copy of one task's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStats {
    pub name: &'static str,
    pub runs: u64,
    pub failures: u64,
}

struct TaskEntry {
    task: Arc<dyn ScheduledTask>,
    counters: Arc<TaskCounters>,
}

impl Clone for TaskEntry {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            counters: Arc::clone(&self.counters),
        }
    }
}

struct LoopDef {
    name: &'static str,
    cadence: Cadence,
    tasks: Vec<TaskEntry>,
}

/// How a stop went
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Loops that exited within the grace period
    pub exited: usize,
    /// Loops force-terminated after the grace period
    pub aborted: Vec<&'static str>,
}

pub struct Scheduler {
    loops: Vec<LoopDef>,
    stop_grace: Duration,
    state: Mutex<SchedulerState>,
    running: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(stop_grace: Duration) -> Self {
        Self {
            loops: Vec::new(),
            stop_grace,
            state: Mutex::new(SchedulerState::Stopped),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a loop running `task` every `interval`
    pub fn every(
        self,
        name: &'static str,
        interval: Duration,
        task: Arc<dyn ScheduledTask>,
    ) -> Self {
        self.add_loop(name, Cadence::Every(interval), vec![task])
    }

    /// Register a loop running `tasks` in order once a day at `hour` UTC
    pub fn daily(
        self,
        name: &'static str,
        hour: u32,
        poll: Duration,
        tasks: Vec<Arc<dyn ScheduledTask>>,
    ) -> Self {
        self.add_loop(name, Cadence::DailyAt { hour, poll }, tasks)
    }

    fn add_loop(
        mut self,
        name: &'static str,
        cadence: Cadence,
        tasks: Vec<Arc<dyn ScheduledTask>>,
    ) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|task| TaskEntry {
                task,
                counters: Arc::new(TaskCounters::default()),
            })
            .collect();
        self.loops.push(LoopDef {
            name,
            cadence,
            tasks,
        });
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Counters for every registered task
    pub fn stats(&self) -> Vec<TaskStats> {
        self.loops
            .iter()
            .flat_map(|l| l.tasks.iter())
            .map(|entry| TaskStats {
                name: entry.task.name(),
                runs: entry.counters.runs.load(Ordering::Relaxed),
                failures: entry.counters.failures.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Spawn every loop; a no-op unless stopped
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Stopped {
                debug!(state = ?*state, "scheduler already started");
                return;
            }
            *state = SchedulerState::Starting;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        self.running.store(true, Ordering::SeqCst);

        let mut handles = self.handles.lock();
        for def in &self.loops {
            let ctx = LoopContext {
                name: def.name,
                tasks: def.tasks.clone(),
                running: Arc::clone(&self.running),
                cancel: cancel.clone(),
            };
            let handle = match def.cadence {
                Cadence::Every(interval) => tokio::spawn(run_interval_loop(ctx, interval)),
                Cadence::DailyAt { hour, poll } => tokio::spawn(run_daily_loop(ctx, hour, poll)),
            };
            handles.push((def.name, handle));
        }
        drop(handles);

        *self.state.lock() = SchedulerState::Running;
        info!(loops = self.loops.len(), "scheduler started");
    }

    /// Signal every loop, wait up to the grace period, abort stragglers
    pub async fn stop(&self) -> StopReport {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Running {
                return StopReport::default();
            }
            *state = SchedulerState::Stopping;
        }

        self.running.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + self.stop_grace;
        let mut report = StopReport::default();

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.exited += 1,
                Ok(Err(e)) => {
                    warn!(loop_name = name, error = %e, "scheduler loop ended abnormally");
                    report.exited += 1;
                }
                Err(_) => {
                    handle.abort();
                    warn!(
                        loop_name = name,
                        grace = ?self.stop_grace,
                        "scheduler loop aborted after grace period"
                    );
                    report.aborted.push(name);
                }
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        info!(exited = report.exited, aborted = report.aborted.len(), "scheduler stopped");
        report
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();
        for (_, handle) in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

struct LoopContext {
    name: &'static str,
    tasks: Vec<TaskEntry>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl LoopContext {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep unless cancelled; false means the loop should exit
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn run_tasks(&self) {
        for entry in &self.tasks {
            if !self.is_running() {
                return;
            }
            run_isolated(self.name, entry).await;
        }
    }
}

async fn run_interval_loop(ctx: LoopContext, interval: Duration) {
    debug!(loop_name = ctx.name, interval = ?interval, "scheduler loop started");
    while ctx.is_running() {
        ctx.run_tasks().await;
        if !ctx.is_running() || !ctx.pause(interval).await {
            break;
        }
    }
    debug!(loop_name = ctx.name, "scheduler loop exited");
}

async fn run_daily_loop(ctx: LoopContext, hour: u32, poll: Duration) {
    debug!(loop_name = ctx.name, hour, "daily loop started");
    let mut gate = DailyGate::new(hour);
    while ctx.is_running() {
        if gate.should_fire(Utc::now()) {
            info!(loop_name = ctx.name, hour, "running daily tasks");
            ctx.run_tasks().await;
        }
        if !ctx.is_running() || !ctx.pause(poll).await {
            break;
        }
    }
    debug!(loop_name = ctx.name, "daily loop exited");
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one task in its own tokio task; errors and panics stop here
async fn run_isolated(loop_name: &'static str, entry: &TaskEntry) {
    let task = Arc::clone(&entry.task);
    let name = task.name();
    entry.counters.runs.fetch_add(1, Ordering::Relaxed);

    let handle = tokio::spawn(async move { task.run().await });
    // an aborted loop must take its in-flight task down with it
    let _guard = AbortOnDrop(handle.abort_handle());

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            entry.counters.failures.fetch_add(1, Ordering::Relaxed);
            error!(loop_name, task = name, error = %e, "scheduled task failed");
        }
        Err(e) if e.is_panic() => {
            entry.counters.failures.fetch_add(1, Ordering::Relaxed);
            error!(loop_name, task = name, "scheduled task panicked");
        }
        Err(_) => {
            debug!(loop_name, task = name, "scheduled task cancelled");
        }
    }
}

/// Fires at most once per UTC day, during the configured hour
#[derive(Debug, Clone)]
pub struct DailyGate {
    hour: u32,
    last_fired: Option<NaiveDate>,
}

impl DailyGate {
    pub fn new(hour: u32) -> Self {
        Self {
            hour,
            last_fired: None,
        }
    }

    /// True the first time `now` falls in the hour on a given day
    pub fn should_fire(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if now.hour() != self.hour || self.last_fired == Some(today) {
            return false;
        }
        self.last_fired = Some(today);
        true
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
