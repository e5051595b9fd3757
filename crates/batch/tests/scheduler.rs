#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Scheduler behaviour under paused tokio time.

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    cadence_batch::{
        BatchScheduler, BrokerClient, Clock, Error, JobSnapshot, JobSpec, MonotonicClock, Result,
        RunOutcome, SKIP_PREVIOUS_RUN_ACTIVE, SchedulerStatus, SqlQuery, SqlTaskStatus,
        StatementAttributes, TaskState,
    },
    chrono::{DateTime, TimeDelta, Utc},
    serde_json::json,
};

/// Broker fake: explain returns `plan`, submission sleeps `delay` then answers
/// with `state`, failing the first `failures` submissions at the transport.
struct ScriptedBroker {
    plan: Vec<StatementAttributes>,
    delay: Duration,
    failures: AtomicUsize,
    state: TaskState,
    submissions: AtomicUsize,
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self {
            plan: vec![StatementAttributes::new("REPLACE", Some("foo"))],
            delay: Duration::ZERO,
            failures: AtomicUsize::new(0),
            state: TaskState::Running,
            submissions: AtomicUsize::new(0),
        }
    }
}

impl ScriptedBroker {
    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn submit_task(&self, _query: &SqlQuery) -> Result<SqlTaskStatus> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::submission(
                "task submission request failed",
                "connection refused",
            ));
        }
        Ok(SqlTaskStatus {
            task_id: format!("task-{n}"),
            state: self.state,
            error: (self.state == TaskState::Failed)
                .then(|| json!({ "errorMessage": "segment allocation failed" })),
        })
    }

    async fn explain_plan_for(&self, _query: &SqlQuery) -> Result<Vec<StatementAttributes>> {
        Ok(self.plan.clone())
    }
}

/// Tokio-driven clock whose wall time can be jumped forward, as after a host
/// suspend.
struct JumpingClock {
    base: MonotonicClock,
    offset: Mutex<TimeDelta>,
}

impl JumpingClock {
    fn jump(&self, by: TimeDelta) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for JumpingClock {
    fn now(&self) -> DateTime<Utc> {
        self.base.now() + *self.offset.lock().unwrap()
    }
}

fn t0() -> DateTime<Utc> {
    "2024-01-01T00:00:30Z".parse().unwrap()
}

fn at(hms: &str) -> DateTime<Utc> {
    format!("2024-01-01T{hms}Z").parse().unwrap()
}

fn scheduler(broker: &Arc<ScriptedBroker>, history_limit: usize) -> BatchScheduler {
    BatchScheduler::with_clock(
        broker.clone(),
        Arc::new(MonotonicClock::anchored_at(t0())),
        history_limit,
    )
}

fn every_minute(id: &str) -> JobSpec {
    JobSpec::new(
        Some(id.into()),
        SqlQuery::new("REPLACE INTO foo OVERWRITE ALL SELECT * FROM bar PARTITIONED BY ALL"),
        "* * * * *",
        false,
    )
    .unwrap()
}

fn start(scheduler: &BatchScheduler, job: &JobSpec) {
    scheduler.start(job.id(), job.schedule(), job).unwrap();
}

/// Advance paused time by `secs` from now.
async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn outcomes(snapshot: &JobSnapshot) -> Vec<RunOutcome> {
    snapshot
        .history
        .iter()
        .map(|run| run.outcome.unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn three_minute_ticks_succeed() {
    let broker = Arc::new(ScriptedBroker::default());
    let scheduler = scheduler(&broker, 100);
    let job = every_minute("ticks");
    start(&scheduler, &job);

    advance(181).await;

    let snapshot = scheduler.snapshot("ticks").unwrap();
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Success; 3]);
    let fire_times: Vec<_> = snapshot
        .history
        .iter()
        .map(|run| run.scheduled_fire_time)
        .collect();
    assert_eq!(fire_times, vec![at("00:01:00"), at("00:02:00"), at("00:03:00")]);
    for pair in fire_times.windows(2) {
        assert_eq!(pair[1] - pair[0], TimeDelta::seconds(60));
    }
    let tasks: Vec<_> = snapshot
        .history
        .iter()
        .map(|run| run.remote_task_id.clone().unwrap())
        .collect();
    assert_eq!(tasks, vec!["task-1", "task-2", "task-3"]);
    assert_eq!(snapshot.status, SchedulerStatus::Scheduled);
    assert_eq!(snapshot.next_fire_time, Some(at("00:04:00")));
    assert!(snapshot.active_run.is_none());
    assert_eq!(broker.submissions(), 3);
}

#[tokio::test(start_paused = true)]
async fn failure_is_recorded_and_scheduling_continues() {
    let broker = Arc::new(ScriptedBroker {
        failures: AtomicUsize::new(1),
        ..Default::default()
    });
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("flaky"));

    advance(121).await;

    let snapshot = scheduler.snapshot("flaky").unwrap();
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Failure, RunOutcome::Success]);
    let failed = &snapshot.history[0];
    assert!(
        failed
            .error_detail
            .as_deref()
            .unwrap()
            .contains("connection refused")
    );
    assert!(failed.remote_task_id.is_none());
    assert!(failed.ended_at.is_some());
    assert!(snapshot.history[1].error_detail.is_none());
    assert_eq!(snapshot.next_fire_time, Some(at("00:03:00")));
}

#[tokio::test(start_paused = true)]
async fn overlapping_fire_is_skipped() {
    let broker = Arc::new(ScriptedBroker {
        delay: Duration::from_secs(90),
        ..Default::default()
    });
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("slow"));

    // 00:01 starts run 1 (ends 00:02:30), 00:02 overlaps, 00:03 starts run 3.
    advance(181).await;

    let snapshot = scheduler.snapshot("slow").unwrap();
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Skipped, RunOutcome::Success]);

    let skipped = &snapshot.history[0];
    assert_eq!(skipped.run_id, 2);
    assert_eq!(skipped.scheduled_fire_time, at("00:02:00"));
    assert_eq!(skipped.error_detail.as_deref(), Some(SKIP_PREVIOUS_RUN_ACTIVE));

    let finished = &snapshot.history[1];
    assert_eq!(finished.run_id, 1);
    let ended = finished.ended_at.unwrap();
    assert!(ended >= at("00:02:30") && ended < at("00:02:31"), "{ended}");

    let active = snapshot.active_run.unwrap();
    assert_eq!(active.run_id, 3);
    assert!(active.is_active());
    assert_eq!(broker.submissions(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_submissions_but_lets_the_run_finish() {
    let broker = Arc::new(ScriptedBroker {
        delay: Duration::from_secs(30),
        ..Default::default()
    });
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("halt"));

    // Run 1 is in flight at 00:01:10.
    advance(40).await;
    assert!(scheduler.snapshot("halt").unwrap().active_run.is_some());
    scheduler.stop("halt");

    advance(600).await;

    let snapshot = scheduler.snapshot("halt").unwrap();
    assert_eq!(broker.submissions(), 1);
    assert_eq!(snapshot.status, SchedulerStatus::Stopped);
    assert!(snapshot.next_fire_time.is_none());
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Success]);
    assert!(snapshot.active_run.is_none());
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_keeps_history() {
    let broker = Arc::new(ScriptedBroker::default());
    let scheduler = scheduler(&broker, 100);
    let job = every_minute("again");
    start(&scheduler, &job);
    advance(61).await;
    scheduler.stop("again");
    advance(300).await;

    start(&scheduler, &job);
    let snapshot = scheduler.snapshot("again").unwrap();
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.next_fire_time, Some(at("00:07:00")));

    advance(60).await;
    let snapshot = scheduler.snapshot("again").unwrap();
    let ids: Vec<_> = snapshot.history.iter().map(|run| run.run_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn remove_discards_history() {
    let broker = Arc::new(ScriptedBroker::default());
    let scheduler = scheduler(&broker, 100);
    let job = every_minute("gone");
    start(&scheduler, &job);
    advance(61).await;

    scheduler.remove("gone");
    assert!(scheduler.snapshot("gone").is_none());

    start(&scheduler, &job);
    assert!(scheduler.snapshot("gone").unwrap().history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded() {
    let broker = Arc::new(ScriptedBroker::default());
    let scheduler = scheduler(&broker, 2);
    start(&scheduler, &every_minute("bounded"));

    advance(241).await;

    let snapshot = scheduler.snapshot("bounded").unwrap();
    let ids: Vec<_> = snapshot.history.iter().map(|run| run.run_id).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(broker.submissions(), 4);
}

#[tokio::test(start_paused = true)]
async fn invalid_plan_skips_submission() {
    let broker = Arc::new(ScriptedBroker {
        plan: vec![StatementAttributes::new("SELECT", None)],
        ..Default::default()
    });
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("select"));

    advance(61).await;

    let snapshot = scheduler.snapshot("select").unwrap();
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Failure]);
    let detail = snapshot.history[0].error_detail.clone().unwrap();
    assert!(detail.contains("plan validation failed"), "{detail}");
    assert_eq!(broker.submissions(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_task_state_is_a_failure() {
    let broker = Arc::new(ScriptedBroker {
        state: TaskState::Failed,
        ..Default::default()
    });
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("rejected"));

    advance(61).await;

    let snapshot = scheduler.snapshot("rejected").unwrap();
    let run = &snapshot.history[0];
    assert_eq!(run.outcome, Some(RunOutcome::Failure));
    assert_eq!(run.remote_task_id.as_deref(), Some("task-1"));
    assert!(
        run.error_detail
            .as_deref()
            .unwrap()
            .contains("segment allocation failed")
    );
}

#[tokio::test(start_paused = true)]
async fn jobs_fire_independently() {
    let broker = Arc::new(ScriptedBroker::default());
    let scheduler = scheduler(&broker, 100);
    start(&scheduler, &every_minute("a"));
    let hourly = JobSpec::new(
        Some("b".into()),
        SqlQuery::new("INSERT INTO t SELECT 1"),
        "0 * * * *",
        false,
    )
    .unwrap();
    start(&scheduler, &hourly);

    advance(181).await;

    assert_eq!(scheduler.snapshot("a").unwrap().history.len(), 3);
    let b = scheduler.snapshot("b").unwrap();
    assert!(b.history.is_empty());
    assert_eq!(b.next_fire_time, Some(at("01:00:00")));
    assert_eq!(scheduler.job_ids(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn missed_fires_are_coalesced_after_a_clock_jump() {
    let broker = Arc::new(ScriptedBroker::default());
    let clock = Arc::new(JumpingClock {
        base: MonotonicClock::anchored_at(t0()),
        offset: Mutex::new(TimeDelta::zero()),
    });
    let scheduler = BatchScheduler::with_clock(broker.clone(), clock.clone(), 100);
    start(&scheduler, &every_minute("paused"));

    advance(61).await;
    assert_eq!(scheduler.snapshot("paused").unwrap().history.len(), 1);

    // Ten minutes pass on the wall clock while the timer sleeps.
    clock.jump(TimeDelta::seconds(600));
    advance(60).await;

    let snapshot = scheduler.snapshot("paused").unwrap();
    let fire_times: Vec<_> = snapshot
        .history
        .iter()
        .map(|run| run.scheduled_fire_time)
        .collect();
    assert_eq!(fire_times, vec![at("00:01:00"), at("00:02:00")]);
    assert!(snapshot.history[1].started_at >= at("00:12:00"));
    assert_eq!(outcomes(&snapshot), vec![RunOutcome::Success; 2]);
    assert_eq!(snapshot.next_fire_time, Some(at("00:13:00")));
    assert_eq!(broker.submissions(), 2);
}
