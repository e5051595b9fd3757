//! Bounded run history for one job.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::types::{Run, RunOutcome};

/// Default number of completed runs retained per job.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// The active run (at most one) plus the most recent completed runs, oldest
/// first. Once `limit` completed runs are held, recording another evicts the
/// oldest.
#[derive(Debug, Clone)]
pub struct RunHistory {
    limit: usize,
    completed: VecDeque<Run>,
    active: Option<Run>,
}

impl RunHistory {
    /// A zero `limit` is treated as 1.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            completed: VecDeque::with_capacity(limit.min(DEFAULT_HISTORY_LIMIT)),
            active: None,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn active(&self) -> Option<&Run> {
        self.active.as_ref()
    }

    /// Mark `run` active. Returns `false`, leaving the current one in place,
    /// if another run is already active.
    pub fn begin(&mut self, run: Run) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(run);
        true
    }

    /// Finalize the active run if its id is `run_id` and move it into the
    /// completed log. Returns the finalized run.
    pub fn finish(
        &mut self,
        run_id: u64,
        ended_at: DateTime<Utc>,
        outcome: RunOutcome,
        remote_task_id: Option<String>,
        error_detail: Option<String>,
    ) -> Option<&Run> {
        if self.active.as_ref().is_none_or(|run| run.run_id != run_id) {
            return None;
        }
        let mut run = self.active.take()?;
        run.ended_at = Some(ended_at);
        run.outcome = Some(outcome);
        run.remote_task_id = remote_task_id.or(run.remote_task_id);
        run.error_detail = error_detail;
        self.record(run);
        self.completed.back()
    }

    /// Append a completed run, evicting the oldest entries past the limit.
    pub fn record(&mut self, run: Run) {
        self.completed.push_back(run);
        while self.completed.len() > self.limit {
            self.completed.pop_front();
        }
    }

    /// Completed runs, oldest first.
    pub fn completed(&self) -> impl Iterator<Item = &Run> {
        self.completed.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
