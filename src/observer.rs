//! Read-only consumers of the status feed.
//!
//! [`StatusBoard`] folds [`StatusEvent`]s into per-job status and aggregate
//! counts, the way a view layer would. [`RunReport`] summarizes a finished
//! run for export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;
use uuid::Uuid;

use crate::outcome::OutcomeSource;
use crate::pipeline::{JobStatus, Pipeline};
use crate::simulator::{PipelineSimulator, RunId, StatusEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub passed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.passed + self.failed
    }
}

/// Observer-side view of every job's status.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    run_id: RunId,
    jobs: Vec<(String, JobStatus)>,
}

impl StatusBoard {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            run_id: 0,
            jobs: pipeline
                .jobs()
                .map(|(_, job)| (job.id.clone(), JobStatus::Pending))
                .collect(),
        }
    }

    /// Fold one event into the board. An event from a newer run clears the board first;
    /// events from older runs are ignored.
    pub fn apply(&mut self, event: &StatusEvent) {
        if event.run_id < self.run_id {
            return;
        }
        if event.run_id > self.run_id {
            self.run_id = event.run_id;
            self.jobs.iter_mut().for_each(|(_, s)| *s = JobStatus::Pending);
        }
        if let Some((_, status)) = self.jobs.iter_mut().find(|(id, _)| *id == event.job_id) {
            *status = event.status;
        }
    }

    pub fn status(&self, job_id: &str) -> JobStatus {
        self.jobs
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for (_, status) in &self.jobs {
            match status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Passed => counts.passed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|(_, s)| s.is_terminal())
    }
}

/// Hand every queued event to `f` without waiting.
///
/// Events a slow receiver lost to the channel are skipped rather than ending
/// the drain; the number skipped is returned.
pub fn drain_events(
    rx: &mut broadcast::Receiver<StatusEvent>,
    mut f: impl FnMut(StatusEvent),
) -> u64 {
    let mut lagged = 0;
    loop {
        match rx.try_recv() {
            Ok(event) => f(event),
            Err(TryRecvError::Lagged(n)) => {
                warn!(skipped = n, "status feed lagged");
                lagged += n;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    lagged
}

/// Per-job line of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub name: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub status: JobStatus,
    pub started_ms: Option<u64>,
    pub finished_ms: Option<u64>,
}

/// Structured summary of one simulated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub report_id: Uuid,
    pub pipeline: String,
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
    pub started_ms: Option<u64>,
    pub finished_ms: Option<u64>,
    pub passed: usize,
    pub failed: usize,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// Build a report from the simulator's most recent run.
    pub fn from_simulator<O: OutcomeSource>(sim: &PipelineSimulator<O>) -> Self {
        Self::from_events(sim.pipeline(), sim.run_id(), sim.history())
    }

    pub fn from_events(pipeline: &Pipeline, run_id: RunId, events: &[StatusEvent]) -> Self {
        let events: Vec<_> = events.iter().filter(|e| e.run_id == run_id).collect();

        let jobs: Vec<JobReport> = pipeline
            .jobs()
            .map(|(stage, job)| {
                let mine = events.iter().filter(|e| e.job_id == job.id);
                let mut report = JobReport {
                    job_id: job.id.clone(),
                    name: job.name.clone(),
                    stage: pipeline.stages[stage].name.clone(),
                    device: job.device.clone(),
                    status: JobStatus::Pending,
                    started_ms: None,
                    finished_ms: None,
                };
                for e in mine {
                    report.status = e.status;
                    if e.status == JobStatus::Running {
                        report.started_ms = Some(e.at_ms);
                    } else if e.status.is_terminal() {
                        report.finished_ms = Some(e.at_ms);
                    }
                }
                report
            })
            .collect();

        Self {
            report_id: Uuid::new_v4(),
            pipeline: pipeline.name.clone(),
            run_id,
            recorded_at: Utc::now(),
            started_ms: jobs.iter().filter_map(|j| j.started_ms).min(),
            finished_ms: jobs.iter().filter_map(|j| j.finished_ms).max(),
            passed: jobs.iter().filter(|j| j.status == JobStatus::Passed).count(),
            failed: jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
            jobs,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        Some(self.finished_ms? - self.started_ms?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{Outcome, ScriptedOutcome};
    use crate::pipeline::{Job, Pacing, Preset, Stage};

    fn event(run_id: RunId, job_id: &str, status: JobStatus, at_ms: u64) -> StatusEvent {
        StatusEvent {
            run_id,
            job_id: job_id.into(),
            status,
            at_ms,
        }
    }

    fn two_job_pipeline() -> Pipeline {
        Pipeline::with_pacing(
            "p",
            vec![Stage::parallel(
                "test",
                vec![
                    Job::new("a", "a", 10).can_fail(true),
                    Job::new("b", "b", 20).can_fail(true).on_device("Pixel 8"),
                ],
            )],
            Pacing::tight(),
        )
        .unwrap()
    }

    #[test]
    fn board_counts_follow_events() {
        let mut board = StatusBoard::new(&two_job_pipeline());
        assert_eq!(board.counts().pending, 2);

        board.apply(&event(1, "a", JobStatus::Running, 0));
        board.apply(&event(1, "b", JobStatus::Running, 0));
        board.apply(&event(1, "a", JobStatus::Failed, 10));

        let counts = board.counts();
        assert_eq!(counts.running, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);
        assert!(!board.is_complete());
        assert_eq!(board.status("a"), JobStatus::Failed);
        assert_eq!(board.status("unknown"), JobStatus::Pending);
    }

    #[test]
    fn board_resets_on_new_run_and_ignores_stale() {
        let mut board = StatusBoard::new(&two_job_pipeline());
        board.apply(&event(1, "a", JobStatus::Running, 0));
        board.apply(&event(2, "b", JobStatus::Running, 100));
        assert_eq!(board.status("a"), JobStatus::Pending);
        assert_eq!(board.status("b"), JobStatus::Running);

        board.apply(&event(1, "a", JobStatus::Passed, 10));
        assert_eq!(board.status("a"), JobStatus::Pending);
    }

    #[test]
    fn board_matches_simulator_through_subscription() {
        let mut sim = PipelineSimulator::seeded(Preset::Gitlab.pipeline().unwrap(), 3);
        let mut board = StatusBoard::new(sim.pipeline());
        let mut rx = sim.subscribe();

        sim.run();
        sim.run_until_idle();
        assert_eq!(drain_events(&mut rx, |e| board.apply(&e)), 0);

        assert!(board.is_complete());
        for (id, status) in sim.snapshot() {
            assert_eq!(board.status(&id), status);
        }
        let counts = board.counts();
        assert_eq!(counts.passed + counts.failed, sim.pipeline().job_count());
    }

    #[test]
    fn report_summarizes_run() {
        let mut sim = PipelineSimulator::with_outcomes(
            two_job_pipeline(),
            ScriptedOutcome::new([Outcome::Fail, Outcome::Pass]),
        );
        sim.run();
        sim.run_until_idle();

        let report = RunReport::from_simulator(&sim);
        assert_eq!(report.pipeline, "p");
        assert_eq!(report.run_id, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.passed, 1);
        assert_eq!(report.started_ms, Some(0));
        assert_eq!(report.finished_ms, Some(20));
        assert_eq!(report.duration_ms(), Some(20));

        let a = &report.jobs[0];
        assert_eq!(a.status, JobStatus::Failed);
        assert_eq!(a.finished_ms, Some(10));
        assert_eq!(report.jobs[1].device.as_deref(), Some("Pixel 8"));
        assert_eq!(report.jobs[1].stage, "test");
    }

    #[test]
    fn report_before_any_run_is_all_pending() {
        let sim = PipelineSimulator::seeded(two_job_pipeline(), 1);
        let report = RunReport::from_simulator(&sim);
        assert_eq!(report.run_id, 0);
        assert!(report.jobs.iter().all(|j| j.status == JobStatus::Pending));
        assert_eq!(report.duration_ms(), None);
    }

    #[test]
    fn report_serializes_to_json() {
        let mut sim = PipelineSimulator::seeded(two_job_pipeline(), 1);
        sim.run();
        sim.run_until_idle();
        let report = RunReport::from_simulator(&sim);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pipeline"], "p");
        assert_eq!(json["jobs"].as_array().unwrap().len(), 2);
        assert!(json["jobs"][0].get("device").is_none());
    }

    #[test]
    fn drain_skips_past_lost_events() {
        let (tx, mut rx) = broadcast::channel(2);
        for at in 0..5 {
            tx.send(event(1, "a", JobStatus::Running, at)).unwrap();
        }

        let mut seen = Vec::new();
        let lagged = drain_events(&mut rx, |e| seen.push(e.at_ms));
        assert_eq!(lagged, 3);
        assert_eq!(seen, vec![3, 4]);
    }
}
