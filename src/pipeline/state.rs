use serde::{Deserialize, Serialize};

use super::job::JobStatus;
use crate::error::{Result, SimError};
use crate::outcome::Outcome;

/// Runtime state of one job within the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
}

/// A requested change to a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// pending -> running
    Start,
    /// running -> passed | failed
    Resolve(Outcome),
}

/// Drives a [`JobState`] through `pending -> running -> {passed, failed}`.
pub struct Lifecycle;

impl Lifecycle {
    /// Apply `transition` at virtual time `at_ms`, returning the new status.
    ///
    /// - `Start` is only legal from `Pending`.
    /// - `Resolve` is only legal from `Running`.
    /// - Terminal states accept nothing; the only way back to `Pending` is
    ///   [`Lifecycle::reset`].
    pub fn apply(
        job_id: &str,
        state: &mut JobState,
        transition: Transition,
        at_ms: u64,
    ) -> Result<JobStatus> {
        let next = match (state.status, transition) {
            (JobStatus::Pending, Transition::Start) => JobStatus::Running,
            (JobStatus::Running, Transition::Resolve(outcome)) => outcome.status(),
            (from, transition) => {
                return Err(SimError::IllegalTransition {
                    job_id: job_id.to_string(),
                    from,
                    to: Self::target(transition),
                });
            }
        };

        match transition {
            Transition::Start => state.started_at_ms = Some(at_ms),
            Transition::Resolve(_) => state.finished_at_ms = Some(at_ms),
        }
        state.status = next;
        Ok(next)
    }

    pub fn reset(state: &mut JobState) {
        *state = JobState::default();
    }

    fn target(transition: Transition) -> JobStatus {
        match transition {
            Transition::Start => JobStatus::Running,
            Transition::Resolve(outcome) => outcome.status(),
        }
    }
}
