use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid schedule '{expr}': {reason}")]
    ScheduleParse { expr: String, reason: String },

    #[error("job already scheduled: {job_id}")]
    RegistrationCollision { job_id: String },

    #[error("plan validation failed: {detail}")]
    PlanValidation { detail: String },

    #[error("{context}: {detail}")]
    Submission { context: String, detail: String },

    #[error("task {task_id} failed: {detail}")]
    TaskFailed { task_id: String, detail: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn schedule_parse(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScheduleParse {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn registration_collision(job_id: impl Into<String>) -> Self {
        Self::RegistrationCollision {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn plan_validation(detail: impl Into<String>) -> Self {
        Self::PlanValidation {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn submission(context: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Submission {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub fn task_failed(task_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            detail: detail.into(),
        }
    }

    /// Remote task id attached to the error, if the broker accepted the task.
    #[must_use]
    pub fn remote_task_id(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

impl cadence_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cadence_common::impl_context!();
