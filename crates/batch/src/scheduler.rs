//! Cron-driven scheduler: one timer task per armed job, runs dispatched to the
//! broker, bounded history per job.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    dashmap::DashMap,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use cadence_metrics::{batch as batch_metrics, counter, gauge, histogram, labels};

use cadence_config::SchedulerConfig;

use crate::{
    Error, Result,
    broker::{BrokerClient, SqlTaskStatus, TaskState, validate_plan},
    clock::{Clock, SystemClock},
    history::RunHistory,
    schedule::Schedule,
    types::{JobSnapshot, JobSpec, Run, RunOutcome, SchedulerStatus, SqlQuery},
};

/// Detail recorded on a run skipped because the previous one is still going.
pub const SKIP_PREVIOUS_RUN_ACTIVE: &str = "previous run active";

/// Scheduling surface used by supervisors.
#[async_trait]
pub trait IngestionScheduler: Send + Sync {
    /// Arm `job_id` to fire on `schedule`. Fails with
    /// [`Error::RegistrationCollision`] if the id is already armed.
    async fn start_scheduled_ingestion(
        &self,
        job_id: &str,
        schedule: &Schedule,
        spec: &JobSpec,
    ) -> Result<()>;

    /// Disarm `job_id`. A run already in flight is left to finish. Unknown ids
    /// are ignored.
    async fn stop_scheduled_ingestion(&self, job_id: &str);

    /// Disarm `job_id` and forget it, history included.
    async fn remove_scheduled_ingestion(&self, job_id: &str);

    /// Current view of `job_id`, or `None` if it was never started or has
    /// been removed.
    async fn scheduler_snapshot(&self, job_id: &str) -> Option<JobSnapshot>;

    /// The scheduler's notion of "now", used to timestamp status reports.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct JobState {
    spec: JobSpec,
    schedule: Schedule,
    /// Bumped on every arm and disarm; a timer holding an older value exits.
    generation: u64,
    /// `Some` exactly while the job is armed.
    next_fire_time: Option<DateTime<Utc>>,
    next_run_id: u64,
    history: RunHistory,
    timer: Option<JoinHandle<()>>,
}

impl JobState {
    fn allocate_run_id(&mut self) -> u64 {
        self.next_run_id += 1;
        self.next_run_id
    }

    /// Returns whether the job was armed.
    fn disarm(&mut self) -> bool {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.next_fire_time.take().is_some()
    }
}

struct JobEntry {
    job_id: String,
    state: Mutex<JobState>,
}

impl JobEntry {
    fn new(job_id: &str, spec: &JobSpec, schedule: &Schedule, history_limit: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: Mutex::new(JobState {
                spec: spec.clone(),
                schedule: schedule.clone(),
                generation: 0,
                next_fire_time: None,
                next_run_id: 0,
                history: RunHistory::new(history_limit),
                timer: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Next fire time if the timer of `generation` is still the live one.
    fn armed_fire_time(&self, generation: u64) -> Option<DateTime<Utc>> {
        let state = self.lock();
        if state.generation == generation {
            state.next_fire_time
        } else {
            None
        }
    }
}

struct Inner {
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    jobs: DashMap<String, Arc<JobEntry>>,
}

/// In-process [`IngestionScheduler`].
///
/// Each armed job owns a timer task that sleeps until the next fire time and
/// then dispatches a run. At most one run per job is in flight; a fire that
/// lands while the previous run is still going is recorded as skipped. Fire
/// times missed while a timer was late are coalesced into the next future one.
///
/// Cheap to clone; clones share all jobs.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerClient>, config: &SchedulerConfig) -> Self {
        Self::with_clock(broker, Arc::new(SystemClock), config.history_limit)
    }

    #[must_use]
    pub fn with_clock(
        broker: Arc<dyn BrokerClient>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                clock,
                history_limit,
                jobs: DashMap::new(),
            }),
        }
    }

    pub fn start(&self, job_id: &str, schedule: &Schedule, spec: &JobSpec) -> Result<()> {
        let now = self.inner.clock.now();
        let first = schedule
            .next_fire_time(now)
            .ok_or_else(|| Error::schedule_parse(schedule.expr(), "no future fire time"))?;

        // The map slot stays locked while arming so a concurrent remove cannot
        // orphan the entry.
        let slot = self
            .inner
            .jobs
            .entry(job_id.to_string())
            .or_insert_with(|| {
                Arc::new(JobEntry::new(
                    job_id,
                    spec,
                    schedule,
                    self.inner.history_limit,
                ))
            });
        let entry = Arc::clone(slot.value());
        let mut state = entry.lock();
        if state.next_fire_time.is_some() {
            return Err(Error::registration_collision(job_id));
        }

        state.spec = spec.clone();
        state.schedule = schedule.clone();
        state.generation += 1;
        state.next_fire_time = Some(first);
        let timer = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            Arc::clone(&entry),
            state.generation,
        ));
        if let Some(stale) = state.timer.replace(timer) {
            stale.abort();
        }

        #[cfg(feature = "metrics")]
        gauge!(batch_metrics::JOBS_SCHEDULED).increment(1.0);

        info!(job_id, schedule = %schedule, next_fire_time = %first, "batch job scheduled");
        Ok(())
    }

    pub fn stop(&self, job_id: &str) {
        let Some(entry) = self.entry(job_id) else {
            debug!(job_id, "stop requested for unknown batch job");
            return;
        };
        if entry.lock().disarm() {
            #[cfg(feature = "metrics")]
            gauge!(batch_metrics::JOBS_SCHEDULED).decrement(1.0);
            info!(job_id, "batch job stopped");
        }
    }

    pub fn remove(&self, job_id: &str) {
        let Some((_, entry)) = self.inner.jobs.remove(job_id) else {
            return;
        };
        if entry.lock().disarm() {
            #[cfg(feature = "metrics")]
            gauge!(batch_metrics::JOBS_SCHEDULED).decrement(1.0);
        }
        info!(job_id, "batch job removed");
    }

    #[must_use]
    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        let entry = self.entry(job_id)?;
        let state = entry.lock();
        Some(JobSnapshot {
            job_id: entry.job_id.clone(),
            status: if state.next_fire_time.is_some() {
                SchedulerStatus::Scheduled
            } else {
                SchedulerStatus::Stopped
            },
            active_run: state.history.active().cloned(),
            history: state.history.completed().cloned().collect(),
            next_fire_time: state.next_fire_time,
        })
    }

    /// Ids of every known job, armed or not.
    #[must_use]
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.jobs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Disarm every job. In-flight runs are left to finish.
    pub fn shutdown(&self) {
        for job_id in self.job_ids() {
            self.stop(&job_id);
        }
    }

    fn entry(&self, job_id: &str) -> Option<Arc<JobEntry>> {
        self.inner.jobs.get(job_id).map(|e| Arc::clone(e.value()))
    }
}

#[async_trait]
impl IngestionScheduler for BatchScheduler {
    async fn start_scheduled_ingestion(
        &self,
        job_id: &str,
        schedule: &Schedule,
        spec: &JobSpec,
    ) -> Result<()> {
        self.start(job_id, schedule, spec)
    }

    async fn stop_scheduled_ingestion(&self, job_id: &str) {
        self.stop(job_id);
    }

    async fn remove_scheduled_ingestion(&self, job_id: &str) {
        self.remove(job_id);
    }

    async fn scheduler_snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.snapshot(job_id)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}

async fn run_timer(inner: Weak<Inner>, entry: Arc<JobEntry>, generation: u64) {
    loop {
        let Some(due) = entry.armed_fire_time(generation) else {
            return;
        };
        let wait = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            (due - inner.clock.now()).to_std().unwrap_or_default()
        };
        tokio::time::sleep(wait).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !inner.fire(&entry, generation, due) {
            return;
        }
    }
}

impl Inner {
    /// Handle one fire of `entry`. Returns whether the timer should keep going.
    fn fire(self: &Arc<Self>, entry: &Arc<JobEntry>, generation: u64, due: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        let mut state = entry.lock();
        if state.generation != generation || state.next_fire_time != Some(due) {
            return false;
        }

        state.next_fire_time = state.schedule.next_fire_time(now.max(due));
        let run_id = state.allocate_run_id();

        #[cfg(feature = "metrics")]
        counter!(
            batch_metrics::FIRES_TOTAL,
            labels::JOB_ID => entry.job_id.clone()
        )
        .increment(1);

        let active_run_id = state.history.active().map(|run| run.run_id);
        if let Some(active_run_id) = active_run_id {
            warn!(
                job_id = %entry.job_id,
                run_id,
                active_run_id,
                "previous run still active, skipping fire"
            );
            state
                .history
                .record(Run::skipped(run_id, due, now, SKIP_PREVIOUS_RUN_ACTIVE));
            #[cfg(feature = "metrics")]
            counter!(
                batch_metrics::RUNS_SKIPPED_TOTAL,
                labels::JOB_ID => entry.job_id.clone()
            )
            .increment(1);
        } else {
            state.history.begin(Run::started(run_id, due, now));
            debug!(job_id = %entry.job_id, run_id, scheduled = %due, "batch run started");
            let query = state.spec.query().clone();
            tokio::spawn(Arc::clone(self).execute_run(Arc::clone(entry), run_id, query));
        }

        if state.next_fire_time.is_none() {
            #[cfg(feature = "metrics")]
            gauge!(batch_metrics::JOBS_SCHEDULED).decrement(1.0);
            info!(job_id = %entry.job_id, "schedule exhausted, batch job stopped");
            return false;
        }
        true
    }

    async fn execute_run(self: Arc<Self>, entry: Arc<JobEntry>, run_id: u64, query: SqlQuery) {
        let started = self.clock.now();
        let job_id = entry.job_id.clone();

        // Run the broker calls in their own task so a panic still finalizes
        // the run.
        let inner = Arc::clone(&self);
        let submission = tokio::spawn(async move { inner.submit(&job_id, &query).await });
        let result = submission
            .await
            .unwrap_or_else(|e| Err(Error::message(format!("run task aborted: {e}"))));

        let ended = self.clock.now();
        let (outcome, remote_task_id, error_detail) = match result {
            Ok(status) => {
                info!(job_id = %entry.job_id, run_id, task_id = %status.task_id, "batch run submitted");
                #[cfg(feature = "metrics")]
                counter!(
                    batch_metrics::RUNS_SUCCEEDED_TOTAL,
                    labels::JOB_ID => entry.job_id.clone()
                )
                .increment(1);
                (RunOutcome::Success, Some(status.task_id), None)
            },
            Err(e) => {
                warn!(job_id = %entry.job_id, run_id, error = %e, "batch run failed");
                #[cfg(feature = "metrics")]
                counter!(
                    batch_metrics::RUNS_FAILED_TOTAL,
                    labels::JOB_ID => entry.job_id.clone()
                )
                .increment(1);
                (
                    RunOutcome::Failure,
                    e.remote_task_id().map(str::to_string),
                    Some(e.to_string()),
                )
            },
        };

        let elapsed_ms = (ended - started).num_milliseconds();
        debug!(job_id = %entry.job_id, run_id, elapsed_ms, outcome = ?outcome, "batch run finished");
        #[cfg(feature = "metrics")]
        histogram!(batch_metrics::RUN_DURATION_SECONDS).record(elapsed_ms as f64 / 1000.0);

        entry
            .lock()
            .history
            .finish(run_id, ended, outcome, remote_task_id, error_detail);
    }

    /// Explain, validate and submit one statement.
    async fn submit(&self, job_id: &str, query: &SqlQuery) -> Result<SqlTaskStatus> {
        let plan = self.broker.explain_plan_for(query).await?;
        let target = validate_plan(&plan)?;
        debug!(job_id, target, "statement plan validated");

        let status = self.broker.submit_task(query).await?;
        if status.state == TaskState::Failed {
            let detail = status
                .error_detail()
                .unwrap_or_else(|| "task reported FAILED".to_string());
            return Err(Error::task_failed(status.task_id, detail));
        }
        Ok(status)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{broker::StatementAttributes, clock::MonotonicClock},
    };

    struct AcceptingBroker;

    #[async_trait]
    impl BrokerClient for AcceptingBroker {
        async fn submit_task(&self, _query: &SqlQuery) -> Result<SqlTaskStatus> {
            Ok(SqlTaskStatus {
                task_id: "task".into(),
                state: TaskState::Running,
                error: None,
            })
        }

        async fn explain_plan_for(&self, _query: &SqlQuery) -> Result<Vec<StatementAttributes>> {
            Ok(vec![StatementAttributes::new("INSERT", Some("t"))])
        }
    }

    fn scheduler() -> BatchScheduler {
        let clock = MonotonicClock::anchored_at("2024-01-01T00:00:30Z".parse().unwrap());
        BatchScheduler::with_clock(Arc::new(AcceptingBroker), Arc::new(clock), 10)
    }

    fn spec(id: &str, cron: &str) -> JobSpec {
        JobSpec::new(Some(id.into()), SqlQuery::new("INSERT INTO t SELECT 1"), cron, false).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_arms_the_job() {
        let scheduler = scheduler();
        let job = spec("j", "*/5 * * * *");
        scheduler.start("j", job.schedule(), &job).unwrap();

        let snapshot = scheduler.snapshot("j").unwrap();
        assert_eq!(snapshot.status, SchedulerStatus::Scheduled);
        assert_eq!(
            snapshot.next_fire_time,
            Some("2024-01-01T00:05:00Z".parse().unwrap())
        );
        assert!(snapshot.history.is_empty());
        assert!(snapshot.active_run.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_collides() {
        let scheduler = scheduler();
        let job = spec("j", "* * * * *");
        scheduler.start("j", job.schedule(), &job).unwrap();

        let err = scheduler.start("j", job.schedule(), &job).unwrap_err();
        assert!(matches!(err, Error::RegistrationCollision { ref job_id } if job_id == "j"));
        assert_eq!(scheduler.job_ids(), vec!["j".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_the_job_known() {
        let scheduler = scheduler();
        let job = spec("j", "* * * * *");
        scheduler.start("j", job.schedule(), &job).unwrap();
        scheduler.stop("j");

        let snapshot = scheduler.snapshot("j").unwrap();
        assert_eq!(snapshot.status, SchedulerStatus::Stopped);
        assert!(snapshot.next_fire_time.is_none());

        // Re-arming after a stop is not a collision.
        scheduler.start("j", job.schedule(), &job).unwrap();
        assert_eq!(
            scheduler.snapshot("j").unwrap().status,
            SchedulerStatus::Scheduled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remove_forgets_the_job() {
        let scheduler = scheduler();
        let job = spec("j", "* * * * *");
        scheduler.start("j", job.schedule(), &job).unwrap();
        scheduler.remove("j");
        assert!(scheduler.snapshot("j").is_none());
        assert!(scheduler.job_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_ignored() {
        let scheduler = scheduler();
        scheduler.stop("missing");
        scheduler.remove("missing");
        assert!(scheduler.snapshot("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disarms_everything() {
        let scheduler = scheduler();
        for id in ["a", "b"] {
            let job = spec(id, "* * * * *");
            scheduler.start(id, job.schedule(), &job).unwrap();
        }
        scheduler.shutdown();
        for id in ["a", "b"] {
            assert_eq!(
                scheduler.snapshot(id).unwrap().status,
                SchedulerStatus::Stopped
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trait_surface_delegates() {
        let scheduler: Arc<dyn IngestionScheduler> = Arc::new(scheduler());
        let job = spec("j", "* * * * *");
        scheduler
            .start_scheduled_ingestion("j", job.schedule(), &job)
            .await
            .unwrap();
        assert!(scheduler.scheduler_snapshot("j").await.is_some());
        let now: DateTime<Utc> = "2024-01-01T00:00:30Z".parse().unwrap();
        assert_eq!(scheduler.now(), now);
        scheduler.remove_scheduled_ingestion("j").await;
        assert!(scheduler.scheduler_snapshot("j").await.is_none());
    }
}
