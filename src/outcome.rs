//! Terminal outcome resolution for fallible jobs.
//!
//! The simulator asks an [`OutcomeSource`] only for jobs that are allowed to
//! fail; everything else passes unconditionally.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::pipeline::JobStatus;

/// Probability that a fallible job fails.
pub const DEFAULT_FAILURE_PROBABILITY: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn status(self) -> JobStatus {
        match self {
            Outcome::Pass => JobStatus::Passed,
            Outcome::Fail => JobStatus::Failed,
        }
    }
}

/// Decides the outcome of a fallible job.
pub trait OutcomeSource {
    fn resolve(&mut self, job_id: &str) -> Outcome;
}

/// Bernoulli outcomes drawn from a seedable RNG.
#[derive(Debug, Clone)]
pub struct RandomOutcome {
    rng: StdRng,
    failure_probability: f64,
}

impl RandomOutcome {
    pub fn new(rng: StdRng, failure_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&failure_probability) {
            return Err(SimError::Config(format!(
                "failure probability must be within [0, 1], got {failure_probability}"
            )));
        }
        Ok(Self {
            rng,
            failure_probability,
        })
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            failure_probability: DEFAULT_FAILURE_PROBABILITY,
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            failure_probability: DEFAULT_FAILURE_PROBABILITY,
        }
    }

    pub fn failure_probability(&self) -> f64 {
        self.failure_probability
    }
}

impl OutcomeSource for RandomOutcome {
    fn resolve(&mut self, _job_id: &str) -> Outcome {
        if self.rng.random_bool(self.failure_probability) {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    }
}

/// Replays a fixed list of outcomes, then passes once exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOutcome {
    queue: VecDeque<Outcome>,
}

impl ScriptedOutcome {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            queue: outcomes.into_iter().collect(),
        }
    }
}

impl OutcomeSource for ScriptedOutcome {
    fn resolve(&mut self, _job_id: &str) -> Outcome {
        self.queue.pop_front().unwrap_or(Outcome::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(Outcome::Pass.status(), JobStatus::Passed);
        assert_eq!(Outcome::Fail.status(), JobStatus::Failed);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RandomOutcome::seeded(7);
        let mut b = RandomOutcome::seeded(7);
        let xs: Vec<_> = (0..64).map(|_| a.resolve("job")).collect();
        let ys: Vec<_> = (0..64).map(|_| b.resolve("job")).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn failure_rate_converges() {
        let mut source = RandomOutcome::seeded(42);
        let runs = 10_000;
        let failures = (0..runs)
            .filter(|_| source.resolve("job") == Outcome::Fail)
            .count();
        let rate = failures as f64 / runs as f64;
        assert!((rate - 0.15).abs() < 0.02, "rate was {rate}");
    }

    #[test]
    fn extreme_probabilities() {
        let mut never = RandomOutcome::new(StdRng::seed_from_u64(1), 0.0).unwrap();
        let mut always = RandomOutcome::new(StdRng::seed_from_u64(1), 1.0).unwrap();
        for _ in 0..100 {
            assert_eq!(never.resolve("j"), Outcome::Pass);
            assert_eq!(always.resolve("j"), Outcome::Fail);
        }
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(RandomOutcome::new(StdRng::seed_from_u64(1), 1.5).is_err());
        assert!(RandomOutcome::new(StdRng::seed_from_u64(1), -0.1).is_err());
    }

    #[test]
    fn scripted_replays_then_passes() {
        let mut s = ScriptedOutcome::new([Outcome::Fail, Outcome::Pass, Outcome::Fail]);
        assert_eq!(s.resolve("a"), Outcome::Fail);
        assert_eq!(s.resolve("b"), Outcome::Pass);
        assert_eq!(s.resolve("c"), Outcome::Fail);
        assert_eq!(s.resolve("d"), Outcome::Pass);
    }
}
