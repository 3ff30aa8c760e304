//! Scheduler subsystem. Runs periodic jobs (queue dispatch, reminder planning)
//! on fixed intervals or cron expressions, with retry on failure.

use async_trait::async_trait;
use std::{
	fmt::Debug,
	str::FromStr,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use chrono::{DateTime, Utc};
use croner::Cron;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Cron schedule wrapper using the croner crate
#[derive(Debug, Clone)]
pub struct CronSchedule {
	/// The original cron expression string
	expr: Box<str>,
	cron: Cron,
}

impl CronSchedule {
	/// Parse a cron expression (5 fields: minute hour day month weekday), evaluated in UTC
	pub fn parse(expr: &str) -> ClResult<Self> {
		let cron = Cron::from_str(expr)
			.map_err(|e| Error::ValidationError(format!("invalid cron expression: {}", e)))?;
		Ok(Self { expr: expr.into(), cron })
	}

	/// Calculate the next execution time after the given timestamp
	pub fn next_execution(&self, after: Timestamp) -> ClResult<Timestamp> {
		let dt = after.to_datetime().unwrap_or_else(Utc::now);
		self.next_after(&dt).map(Timestamp::from)
	}

	fn next_after(&self, dt: &DateTime<Utc>) -> ClResult<DateTime<Utc>> {
		self.cron.find_next_occurrence(dt, false).map_err(|e| {
			error!("Failed to find next cron occurrence for '{}': {}", self.expr, e);
			Error::ValidationError(format!("cron next_execution failed: {}", e))
		})
	}

	pub fn to_cron_string(&self) -> String {
		self.expr.to_string()
	}
}

impl PartialEq for CronSchedule {
	fn eq(&self, other: &Self) -> bool {
		self.expr == other.expr
	}
}

impl Eq for CronSchedule {}

/// When a periodic task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
	Every(Duration),
	Cron(CronSchedule),
}

impl Schedule {
	/// Time to wait from now until the next run
	fn delay_from_now(&self) -> ClResult<Duration> {
		match self {
			Schedule::Every(interval) => Ok(*interval),
			Schedule::Cron(cron) => {
				let now = Utc::now();
				let next = cron.next_after(&now)?;
				Ok((next - now).to_std().unwrap_or_default())
			}
		}
	}
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	wait_min_max: (u64, u64),
	times: u16,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { wait_min_max: (60, 3600), times: 10 }
	}
}

impl RetryPolicy {
	/// Create a new RetryPolicy with custom min/max backoff (seconds) and number of retries
	pub fn new(wait_min_max: (u64, u64), times: u16) -> Self {
		Self { wait_min_max, times }
	}

	/// Calculate exponential backoff in seconds: min * (2^attempt), capped at max
	pub fn calculate_backoff(&self, attempt_count: u16) -> u64 {
		let (min, max) = self.wait_min_max;
		let factor = 1u64.checked_shl(u32::from(attempt_count)).unwrap_or(u64::MAX);
		min.saturating_mul(factor).min(max)
	}

	/// Check if we should continue retrying
	pub fn should_retry(&self, attempt_count: u16) -> bool {
		attempt_count < self.times
	}
}

#[async_trait]
pub trait Task<S: Clone>: Send + Sync + Debug {
	fn kind_of(&self) -> &'static str;
	async fn run(&self, state: &S) -> ClResult<()>;
}

struct TaskEntry<S: Clone> {
	task: Arc<dyn Task<S>>,
	schedule: Schedule,
	retry: Option<RetryPolicy>,
	run_immediately: bool,
}

// TaskSchedulerBuilder - Fluent API for task registration
//**********************************************************
pub struct TaskSchedulerBuilder<'a, S: Clone> {
	scheduler: &'a Scheduler<S>,
	task: Arc<dyn Task<S>>,
	schedule: Option<Schedule>,
	retry: Option<RetryPolicy>,
	run_immediately: bool,
}

impl<S: Clone + Send + Sync + 'static> TaskSchedulerBuilder<'_, S> {
	/// Run on a fixed interval
	pub fn every(mut self, interval: Duration) -> Self {
		self.schedule = Some(Schedule::Every(interval));
		self
	}

	/// Run on a cron schedule (UTC)
	pub fn cron(mut self, expr: &str) -> ClResult<Self> {
		self.schedule = Some(Schedule::Cron(CronSchedule::parse(expr)?));
		Ok(self)
	}

	/// Run once a day at the given UTC time
	pub fn daily_at(self, hour: u8, minute: u8) -> ClResult<Self> {
		if hour > 23 || minute > 59 {
			return Err(Error::ValidationError(format!("invalid time {}:{}", hour, minute)));
		}
		self.cron(&format!("{} {} * * *", minute, hour))
	}

	/// Also run right after start instead of waiting for the first tick
	pub fn immediately(mut self) -> Self {
		self.run_immediately = true;
		self
	}

	/// Retry a failed run with backoff before waiting for the next tick
	pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);
		self
	}

	pub fn register(self) -> ClResult<()> {
		let Some(schedule) = self.schedule else {
			return Err(Error::Internal(format!("task {} has no schedule", self.task.kind_of())));
		};
		self.scheduler.add_entry(TaskEntry {
			task: self.task,
			schedule,
			retry: self.retry,
			run_immediately: self.run_immediately,
		})
	}
}

// Scheduler
//***********
pub struct Scheduler<S: Clone> {
	entries: Mutex<Vec<TaskEntry<S>>>,
	cancel: CancellationToken,
	started: AtomicBool,
	runs: Arc<AtomicU64>,
}

impl<S: Clone + Send + Sync + 'static> Scheduler<S> {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			entries: Mutex::new(Vec::new()),
			cancel: CancellationToken::new(),
			started: AtomicBool::new(false),
			runs: Arc::new(AtomicU64::new(0)),
		})
	}

	pub fn task(&self, task: Arc<dyn Task<S>>) -> TaskSchedulerBuilder<'_, S> {
		TaskSchedulerBuilder {
			scheduler: self,
			task,
			schedule: None,
			retry: None,
			run_immediately: false,
		}
	}

	fn add_entry(&self, entry: TaskEntry<S>) -> ClResult<()> {
		if self.started.load(Ordering::SeqCst) {
			return Err(Error::Internal("scheduler already started".into()));
		}
		info!("Registered periodic task {} ({:?})", entry.task.kind_of(), entry.schedule);
		self.entries.lock().push(entry);
		Ok(())
	}

	/// Spawn one loop per registered task
	pub fn start(&self, state: S) {
		if self.started.swap(true, Ordering::SeqCst) {
			warn!("Scheduler already started");
			return;
		}
		let entries = std::mem::take(&mut *self.entries.lock());
		info!("Starting scheduler with {} periodic tasks", entries.len());

		for entry in entries {
			let state = state.clone();
			let cancel = self.cancel.clone();
			let runs = self.runs.clone();
			tokio::spawn(async move {
				run_loop(entry, state, cancel, runs).await;
			});
		}
	}

	/// Stop all task loops after their current run
	pub fn shutdown(&self) {
		info!("Stopping scheduler");
		self.cancel.cancel();
	}

	/// Number of completed task runs (successful or not)
	pub fn run_count(&self) -> u64 {
		self.runs.load(Ordering::Relaxed)
	}
}

async fn run_loop<S: Clone + Send + Sync + 'static>(
	entry: TaskEntry<S>,
	state: S,
	cancel: CancellationToken,
	runs: Arc<AtomicU64>,
) {
	let kind = entry.task.kind_of();
	let mut first = true;

	loop {
		let delay = if first && entry.run_immediately {
			Duration::ZERO
		} else {
			match entry.schedule.delay_from_now() {
				Ok(delay) => delay,
				Err(e) => {
					error!("Task {} cannot be rescheduled, stopping: {}", kind, e);
					return;
				}
			}
		};
		first = false;

		tokio::select! {
			() = cancel.cancelled() => {
				debug!("Task {} loop cancelled", kind);
				return;
			}
			() = tokio::time::sleep(delay) => {}
		}

		let mut attempt: u16 = 0;
		loop {
			let res = entry.task.run(&state).await;
			runs.fetch_add(1, Ordering::Relaxed);
			let Err(err) = res else {
				debug!("Task {} completed", kind);
				break;
			};

			let Some(policy) = entry.retry.as_ref().filter(|p| p.should_retry(attempt)) else {
				warn!("Task {} failed: {}", kind, err);
				break;
			};
			let backoff = policy.calculate_backoff(attempt);
			attempt += 1;
			warn!("Task {} failed (attempt {}), retrying in {}s: {}", kind, attempt, backoff, err);

			tokio::select! {
				() = cancel.cancelled() => return,
				() = tokio::time::sleep(Duration::from_secs(backoff)) => {}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicU32;

	type State = Arc<AtomicU32>;

	#[derive(Debug)]
	struct CountingTask;

	#[async_trait]
	impl Task<State> for CountingTask {
		fn kind_of(&self) -> &'static str {
			"test.count"
		}

		async fn run(&self, state: &State) -> ClResult<()> {
			state.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[derive(Debug)]
	struct FlakyTask {
		fail_count: u32,
	}

	#[async_trait]
	impl Task<State> for FlakyTask {
		fn kind_of(&self) -> &'static str {
			"test.flaky"
		}

		async fn run(&self, state: &State) -> ClResult<()> {
			let attempt = state.fetch_add(1, Ordering::SeqCst) + 1;
			if attempt <= self.fail_count {
				return Err(Error::ServiceUnavailable(format!("attempt {} failed", attempt)));
			}
			Ok(())
		}
	}

	#[test]
	fn test_backoff() {
		let policy = RetryPolicy::new((60, 3600), 5);
		assert_eq!(policy.calculate_backoff(0), 60);
		assert_eq!(policy.calculate_backoff(1), 120);
		assert_eq!(policy.calculate_backoff(3), 480);
		assert_eq!(policy.calculate_backoff(10), 3600);
		assert_eq!(policy.calculate_backoff(200), 3600);
		assert!(policy.should_retry(4));
		assert!(!policy.should_retry(5));
	}

	#[test]
	fn test_cron_next_execution() {
		let cron = CronSchedule::parse("30 0 * * *").unwrap();
		// 2025-01-06T03:30:00Z -> next 00:30 UTC is the following day
		let next = cron.next_execution(Timestamp(1_736_134_200)).unwrap();
		assert_eq!(next.to_iso_string(), "2025-01-07T00:30:00.000Z");
		assert!(CronSchedule::parse("not a cron").is_err());
	}

	#[tokio::test]
	async fn test_builder_requires_schedule() {
		let scheduler = Scheduler::<State>::new();
		assert!(scheduler.task(Arc::new(CountingTask)).register().is_err());
		assert!(scheduler.task(Arc::new(CountingTask)).daily_at(24, 0).is_err());
	}

	#[tokio::test]
	async fn test_interval_task_runs_until_shutdown() {
		let _ = tracing_subscriber::fmt().try_init();

		let state: State = Arc::new(AtomicU32::new(0));
		let scheduler = Scheduler::new();
		scheduler
			.task(Arc::new(CountingTask))
			.every(Duration::from_millis(20))
			.immediately()
			.register()
			.unwrap();
		scheduler.start(state.clone());

		tokio::time::sleep(Duration::from_millis(150)).await;
		scheduler.shutdown();
		let seen = state.load(Ordering::SeqCst);
		assert!(seen >= 2, "expected several runs, got {}", seen);

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert_eq!(state.load(Ordering::SeqCst), seen, "task ran after shutdown");
	}

	#[tokio::test]
	async fn test_failed_run_is_retried() {
		let state: State = Arc::new(AtomicU32::new(0));
		let scheduler = Scheduler::new();
		scheduler
			.task(Arc::new(FlakyTask { fail_count: 2 }))
			.every(Duration::from_secs(3600))
			.immediately()
			.with_retry(RetryPolicy::new((0, 0), 3))
			.register()
			.unwrap();
		scheduler.start(state.clone());

		tokio::time::sleep(Duration::from_millis(100)).await;
		scheduler.shutdown();
		assert_eq!(state.load(Ordering::SeqCst), 3);
		assert_eq!(scheduler.run_count(), 3);
	}

	#[tokio::test]
	async fn test_register_after_start_fails() {
		let scheduler = Scheduler::<State>::new();
		scheduler.start(Arc::new(AtomicU32::new(0)));
		let res = scheduler.task(Arc::new(CountingTask)).every(Duration::from_secs(1)).register();
		assert!(res.is_err());
		scheduler.shutdown();
	}
}

// vim: ts=4
