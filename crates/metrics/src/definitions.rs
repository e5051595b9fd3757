//! Metric name and label definitions.
//!
//! Centralizing these definitions keeps names consistent between the code
//! that records them and the dashboards that read them.

/// Scheduled batch ingestion metrics
pub mod batch {
    /// Number of jobs with an armed timer
    pub const JOBS_SCHEDULED: &str = "cadence_batch_jobs_scheduled";
    /// Total timer fires, skipped or not
    pub const FIRES_TOTAL: &str = "cadence_batch_fires_total";
    /// Fires skipped because the previous run was still active
    pub const RUNS_SKIPPED_TOTAL: &str = "cadence_batch_runs_skipped_total";
    /// Runs whose statement the broker accepted
    pub const RUNS_SUCCEEDED_TOTAL: &str = "cadence_batch_runs_succeeded_total";
    /// Runs that failed validation, submission or on the broker
    pub const RUNS_FAILED_TOTAL: &str = "cadence_batch_runs_failed_total";
    /// Time from run start to outcome, in seconds
    pub const RUN_DURATION_SECONDS: &str = "cadence_batch_run_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const JOB_ID: &str = "job_id";
}

/// Standard histogram buckets
pub mod buckets {
    /// Run duration buckets (in seconds)
    /// Covers 10ms to 5 minutes; explain plus submit is two broker round trips
    pub const RUN_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];
}
