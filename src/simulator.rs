use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::outcome::{Outcome, OutcomeSource, RandomOutcome};
use crate::pipeline::{ExecutionMode, Job, JobState, JobStatus, Lifecycle, Pipeline, Transition};
use crate::schedule::Schedule;

/// Monotonic run counter. `0` means no run has started yet.
pub type RunId = u64;

const EVENT_CAPACITY: usize = 1024;

/// A single status change published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub run_id: RunId,
    pub job_id: String,
    pub status: JobStatus,
    /// Virtual time of the transition in milliseconds.
    pub at_ms: u64,
}

/// Result of asking the simulator to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    Started(RunId),
    /// A run is already in progress; the request was ignored.
    AlreadyRunning(RunId),
    /// The run would end past the largest representable virtual time; nothing
    /// was scheduled. Carries the id of the last run that did start.
    Rejected(RunId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Finish,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    run_id: RunId,
    job: usize,
    step: Step,
}

impl Scheduled {
    fn new(run_id: RunId, job: usize, step: Step) -> Self {
        Self { run_id, job, step }
    }
}

/// Sequences a [`Pipeline`] on a virtual clock and publishes job status changes.
///
/// The simulator is the single writer of job status. Nothing happens until the
/// clock is driven with [`advance_by`](Self::advance_by),
/// [`advance_to`](Self::advance_to) or [`run_until_idle`](Self::run_until_idle);
/// [`crate::driver`] maps that onto wall-clock time.
pub struct PipelineSimulator<O = RandomOutcome> {
    pipeline: Pipeline,
    // (stage index, job index within stage) for each job, in pipeline order.
    slots: Vec<(usize, usize)>,
    index: HashMap<String, usize>,
    states: Vec<JobState>,
    schedule: Schedule<Scheduled>,
    outcomes: O,
    run_id: RunId,
    running: bool,
    remaining: usize,
    history: Vec<StatusEvent>,
    events: broadcast::Sender<StatusEvent>,
}

impl PipelineSimulator<RandomOutcome> {
    /// Simulator with outcomes drawn from an OS-seeded RNG.
    pub fn new(pipeline: Pipeline) -> Self {
        Self::with_outcomes(pipeline, RandomOutcome::from_entropy())
    }

    /// Simulator whose outcome sequence is fully determined by `seed`.
    pub fn seeded(pipeline: Pipeline, seed: u64) -> Self {
        Self::with_outcomes(pipeline, RandomOutcome::seeded(seed))
    }
}

impl<O: OutcomeSource> PipelineSimulator<O> {
    pub fn with_outcomes(pipeline: Pipeline, outcomes: O) -> Self {
        let slots: Vec<_> = pipeline
            .stages
            .iter()
            .enumerate()
            .flat_map(|(s, stage)| (0..stage.jobs.len()).map(move |j| (s, j)))
            .collect();
        let index = pipeline
            .jobs()
            .enumerate()
            .map(|(i, (_, job))| (job.id.clone(), i))
            .collect();
        // A whole run publishes two events per job; a receiver that keeps up
        // with runs never lags.
        let (events, _) = broadcast::channel(EVENT_CAPACITY.max(2 * slots.len()));

        Self {
            states: vec![JobState::default(); slots.len()],
            slots,
            index,
            pipeline,
            schedule: Schedule::new(),
            outcomes,
            run_id: 0,
            running: false,
            remaining: 0,
            history: Vec::new(),
            events,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.schedule.now()
    }

    /// Time of the next pending transition, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.schedule.next_deadline()
    }

    /// Status of `job_id`; unknown ids report `Pending`.
    pub fn get_status(&self, job_id: &str) -> JobStatus {
        self.index
            .get(job_id)
            .map(|&i| self.states[i].status)
            .unwrap_or_default()
    }

    pub fn job_state(&self, job_id: &str) -> Option<JobState> {
        self.index.get(job_id).map(|&i| self.states[i])
    }

    /// Every job's status, in pipeline order.
    pub fn snapshot(&self) -> Vec<(String, JobStatus)> {
        self.slots
            .iter()
            .zip(&self.states)
            .map(|(&(s, j), state)| (self.pipeline.stages[s].jobs[j].id.clone(), state.status))
            .collect()
    }

    /// Transitions of the current (or most recent) run, in emission order.
    pub fn history(&self) -> &[StatusEvent] {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Put every job back to `Pending` and cancel any scheduled transitions.
    pub fn reset(&mut self) {
        if self.running {
            info!(run_id = self.run_id, "cancelling run");
        }
        self.schedule.clear();
        self.states.iter_mut().for_each(Lifecycle::reset);
        self.history.clear();
        self.running = false;
        self.remaining = 0;
    }

    /// Schedule one pass over the pipeline starting at the current virtual time.
    ///
    /// Returns immediately; transitions fire as the clock is advanced.
    pub fn run(&mut self) -> RunStart {
        if self.running {
            warn!(run_id = self.run_id, "run already in progress, ignoring");
            return RunStart::AlreadyRunning(self.run_id);
        }

        let now = self.schedule.now();
        let Some(end_ms) = self
            .pipeline
            .timeline_ms()
            .and_then(|length| now.checked_add(length))
        else {
            warn!(now, pipeline = %self.pipeline.name, "run would overflow the virtual clock, ignoring");
            return RunStart::Rejected(self.run_id);
        };

        self.reset();
        self.run_id += 1;
        self.running = true;
        self.remaining = self.slots.len();

        let run_id = self.run_id;
        let pacing = self.pipeline.pacing;
        let mut cursor = now;
        let mut job = 0;
        for (i, stage) in self.pipeline.stages.iter().enumerate() {
            if i > 0 {
                cursor = cursor.saturating_add(pacing.stage_gap_ms);
            }
            match stage.mode {
                ExecutionMode::Sequential => {
                    for (n, j) in stage.jobs.iter().enumerate() {
                        if n > 0 {
                            cursor = cursor.saturating_add(pacing.job_gap_ms);
                        }
                        self.schedule
                            .push(cursor, Scheduled::new(run_id, job, Step::Start));
                        cursor = cursor.saturating_add(j.duration_ms);
                        job += 1;
                    }
                }
                ExecutionMode::Parallel => {
                    for _ in &stage.jobs {
                        self.schedule
                            .push(cursor, Scheduled::new(run_id, job, Step::Start));
                        job += 1;
                    }
                    cursor = cursor.saturating_add(stage.longest_ms());
                }
            }
        }

        info!(
            run_id = self.run_id,
            pipeline = %self.pipeline.name,
            jobs = self.slots.len(),
            expected_end_ms = end_ms,
            "run started"
        );
        RunStart::Started(self.run_id)
    }

    pub fn advance_by(&mut self, ms: u64) {
        self.advance_to(self.schedule.now().saturating_add(ms));
    }

    /// Fire every transition due at or before `at_ms`, then move the clock there.
    pub fn advance_to(&mut self, at_ms: u64) {
        while let Some((at, scheduled)) = self.schedule.pop_due(at_ms) {
            self.dispatch(at, scheduled);
        }
        self.schedule.advance_to(at_ms);
    }

    /// Drive the clock until the current run is complete. Returns the final virtual time.
    pub fn run_until_idle(&mut self) -> u64 {
        while self.running {
            match self.schedule.next_deadline() {
                Some(deadline) => self.advance_to(deadline),
                None => break,
            }
        }
        self.schedule.now()
    }

    fn job_at(&self, job: usize) -> &Job {
        let (s, j) = self.slots[job];
        &self.pipeline.stages[s].jobs[j]
    }

    fn dispatch(&mut self, at_ms: u64, scheduled: Scheduled) {
        if !self.running || scheduled.run_id != self.run_id {
            debug!(run_id = scheduled.run_id, "dropping stale event");
            return;
        }

        let (duration_ms, can_fail) = {
            let job = self.job_at(scheduled.job);
            (job.duration_ms, job.can_fail)
        };

        match scheduled.step {
            Step::Start => {
                if self.apply(scheduled.job, Transition::Start, at_ms) {
                    let finish = Scheduled::new(scheduled.run_id, scheduled.job, Step::Finish);
                    self.schedule.push(at_ms.saturating_add(duration_ms), finish);
                }
            }
            Step::Finish => {
                let outcome = if can_fail {
                    let job_id = self.job_at(scheduled.job).id.clone();
                    self.outcomes.resolve(&job_id)
                } else {
                    Outcome::Pass
                };
                if self.apply(scheduled.job, Transition::Resolve(outcome), at_ms) {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.running = false;
                        info!(run_id = self.run_id, at_ms, "run finished");
                    }
                }
            }
        }
    }

    fn apply(&mut self, job: usize, transition: Transition, at_ms: u64) -> bool {
        let job_id = self.job_at(job).id.clone();
        match Lifecycle::apply(&job_id, &mut self.states[job], transition, at_ms) {
            Ok(status) => {
                debug!(run_id = self.run_id, job = %job_id, %status, at_ms, "status changed");
                let event = StatusEvent {
                    run_id: self.run_id,
                    job_id,
                    status,
                    at_ms,
                };
                self.history.push(event.clone());
                // No receivers is fine; observers are optional.
                let _ = self.events.send(event);
                true
            }
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }
}
