//! Core data types for scheduled batch ingestion.

use std::sync::Arc;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::{
    Result, scheduler::IngestionScheduler, schedule::Schedule, supervisor::BatchSupervisor,
};

/// Prefix of generated job ids.
pub const JOB_ID_PREFIX: &str = "scheduled_batch";

/// SQL statement submitted to the broker on every fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SqlQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl SqlQuery {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Map::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// The `EXPLAIN PLAN FOR` form used to validate the statement. Context is
    /// not forwarded.
    #[must_use]
    pub fn explain(&self) -> Self {
        Self::new(format!("EXPLAIN PLAN FOR {}", self.query))
    }
}

/// Immutable description of one recurring batch job.
///
/// There are no setters: a change is expressed by building a replacement spec
/// (see [`JobSpec::suspended`]) and a new supervisor for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(default = "generate_job_id")]
    id: String,
    spec: SqlQuery,
    schedule: Schedule,
    #[serde(default)]
    suspended: bool,
}

fn generate_job_id() -> String {
    format!("{JOB_ID_PREFIX}__{}", uuid::Uuid::new_v4())
}

impl JobSpec {
    /// Build a spec, parsing `cron`. A missing id is generated.
    pub fn new(
        id: Option<String>,
        spec: SqlQuery,
        cron: &str,
        suspended: bool,
    ) -> Result<Self> {
        Ok(Self {
            id: id.unwrap_or_else(generate_job_id),
            spec,
            schedule: Schedule::parse(cron)?,
            suspended,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn query(&self) -> &SqlQuery {
        &self.spec
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Replacement spec with the same id, statement and schedule, suspended.
    #[must_use]
    pub fn suspended(&self) -> Self {
        Self {
            suspended: true,
            ..self.clone()
        }
    }

    /// Replacement spec with the same id, statement and schedule, running.
    #[must_use]
    pub fn resumed(&self) -> Self {
        Self {
            suspended: false,
            ..self.clone()
        }
    }

    /// Build the supervisor for this spec. No scheduler calls are made.
    #[must_use]
    pub fn create_supervisor(&self, scheduler: Arc<dyn IngestionScheduler>) -> BatchSupervisor {
        BatchSupervisor::new(self.clone(), scheduler)
    }
}

/// Supervisor state. Changes only by replacing the job spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    Running,
    Suspended,
}

impl SupervisorState {
    #[must_use]
    pub fn for_spec(spec: &JobSpec) -> Self {
        if spec.is_suspended() {
            Self::Suspended
        } else {
            Self::Running
        }
    }
}

/// Whether the scheduler currently has a timer armed for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerStatus {
    Scheduled,
    Stopped,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Success,
    Failure,
    Skipped,
}

/// One attempt at executing a job's statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: u64,
    pub scheduled_fire_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Run {
    /// A run that has started and not finished.
    #[must_use]
    pub fn started(run_id: u64, scheduled_fire_time: DateTime<Utc>, at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            scheduled_fire_time,
            started_at: at,
            ended_at: None,
            outcome: None,
            remote_task_id: None,
            error_detail: None,
        }
    }

    /// A run that was never attempted.
    #[must_use]
    pub fn skipped(
        run_id: u64,
        scheduled_fire_time: DateTime<Utc>,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ended_at: Some(at),
            outcome: Some(RunOutcome::Skipped),
            error_detail: Some(reason.into()),
            ..Self::started(run_id, scheduled_fire_time, at)
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Scheduler-side view of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: SchedulerStatus,
    pub active_run: Option<Run>,
    pub history: Vec<Run>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// Supervisor state joined with the scheduler's view of the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSnapshot {
    pub state: SupervisorState,
    pub scheduler_status: SchedulerStatus,
    pub active_run: Option<Run>,
    pub history: Vec<Run>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

impl SupervisorSnapshot {
    /// Combine the supervisor state with whatever the scheduler knows. A job
    /// the scheduler has never seen reports as stopped with no runs.
    #[must_use]
    pub fn new(state: SupervisorState, job: Option<JobSnapshot>) -> Self {
        match job {
            Some(job) => Self {
                state,
                scheduler_status: job.status,
                active_run: job.active_run,
                history: job.history,
                next_fire_time: job.next_fire_time,
            },
            None => Self {
                state,
                scheduler_status: SchedulerStatus::Stopped,
                active_run: None,
                history: Vec::new(),
                next_fire_time: None,
            },
        }
    }
}

/// Point-in-time status report for one supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorReport {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub snapshot: SupervisorSnapshot,
}
