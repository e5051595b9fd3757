//! RUNNING/SUSPENDED control wrapper around one scheduled batch job.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    Error,
    scheduler::IngestionScheduler,
    types::{JobSpec, SupervisorReport, SupervisorSnapshot, SupervisorState},
};

/// Supervises one [`JobSpec`].
///
/// The state is fixed at construction; suspending or resuming a job means
/// building a new supervisor from [`JobSpec::suspended`] or
/// [`JobSpec::resumed`]. No error escapes `start`, `stop` or `status`.
pub struct BatchSupervisor {
    spec: JobSpec,
    state: SupervisorState,
    scheduler: Arc<dyn IngestionScheduler>,
    /// Serializes start/stop so lifecycle calls on one supervisor never
    /// interleave.
    lifecycle: Mutex<()>,
    terminated: AtomicBool,
}

impl BatchSupervisor {
    /// Construction only; the scheduler is not called.
    #[must_use]
    pub fn new(spec: JobSpec, scheduler: Arc<dyn IngestionScheduler>) -> Self {
        Self {
            state: SupervisorState::for_spec(&spec),
            spec,
            scheduler,
            lifecycle: Mutex::new(()),
            terminated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.spec.id()
    }

    #[must_use]
    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Register with the scheduler when RUNNING. When SUSPENDED, make sure
    /// nothing is registered under this id, which also disarms a previous
    /// RUNNING supervisor for the same job.
    pub async fn start(&self) {
        let _guard = self.lifecycle.lock().await;
        let job_id = self.id();
        if self.is_terminated() {
            warn!(job_id, "start ignored, supervisor was terminated");
            return;
        }

        match self.state {
            SupervisorState::Running => {
                match self
                    .scheduler
                    .start_scheduled_ingestion(job_id, self.spec.schedule(), &self.spec)
                    .await
                {
                    Ok(()) => info!(job_id, "batch supervisor started"),
                    Err(Error::RegistrationCollision { .. }) => {
                        debug!(job_id, "batch job already scheduled");
                    },
                    Err(e) => warn!(job_id, error = %e, "failed to schedule batch job"),
                }
            },
            SupervisorState::Suspended => {
                info!(job_id, "batch supervisor suspended, not scheduling");
                self.scheduler.stop_scheduled_ingestion(job_id).await;
            },
        }
    }

    /// Deregister from the scheduler. An in-flight run is left to finish.
    /// With `terminate`, the job's history is dropped as well and later
    /// `start` calls are ignored.
    pub async fn stop(&self, terminate: bool) {
        let _guard = self.lifecycle.lock().await;
        let job_id = self.id();
        self.scheduler.stop_scheduled_ingestion(job_id).await;
        if terminate {
            self.scheduler.remove_scheduled_ingestion(job_id).await;
            self.terminated.store(true, Ordering::Release);
        }
        info!(job_id, terminate, "batch supervisor stopped");
    }

    /// Fresh status report; always queries the scheduler.
    pub async fn status(&self) -> SupervisorReport {
        let job = self.scheduler.scheduler_snapshot(self.id()).await;
        SupervisorReport {
            id: self.id().to_string(),
            generated_at: self.scheduler.now(),
            snapshot: SupervisorSnapshot::new(self.state, job),
        }
    }
}
