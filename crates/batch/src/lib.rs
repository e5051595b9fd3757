//! Cron-scheduled batch ingestion.
//!
//! A [`JobSpec`] describes one recurring SQL statement. Its
//! [`BatchSupervisor`] registers it with an [`IngestionScheduler`]; the
//! in-process [`BatchScheduler`] fires on the cron schedule, validates the
//! statement through the broker's explain endpoint, submits it, and keeps a
//! bounded history of runs per job.

pub mod broker;
pub mod broker_http;
pub mod clock;
pub mod error;
pub mod history;
pub mod schedule;
pub mod scheduler;
pub mod supervisor;
pub mod types;

pub use {
    broker::{BrokerClient, SqlTaskStatus, StatementAttributes, TaskState, validate_plan},
    broker_http::HttpBrokerClient,
    clock::{Clock, MonotonicClock, SystemClock},
    error::{Context, Error, Result},
    history::{DEFAULT_HISTORY_LIMIT, RunHistory},
    schedule::Schedule,
    scheduler::{BatchScheduler, IngestionScheduler, SKIP_PREVIOUS_RUN_ACTIVE},
    supervisor::BatchSupervisor,
    types::{
        JobSnapshot, JobSpec, Run, RunOutcome, SchedulerStatus, SqlQuery, SupervisorReport,
        SupervisorSnapshot, SupervisorState,
    },
};
