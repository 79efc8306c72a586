//! Real-time driving of a [`PipelineSimulator`] on tokio timers.
//!
//! The simulator only knows virtual time. [`drive`] sleeps until each
//! scheduled transition is due (scaled by `speed`) and advances the clock to it,
//! so observers see transitions at the pace a browser timer chain would.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::config::SimConfig;
use crate::outcome::OutcomeSource;
use crate::simulator::{PipelineSimulator, RunStart};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveOptions {
    /// Virtual milliseconds per wall-clock millisecond.
    pub speed: f64,
    /// Wait before calling `run()`, like a page that starts once it is in view.
    pub autostart_delay: Duration,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            autostart_delay: Duration::from_millis(500),
        }
    }
}

impl DriveOptions {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            speed: config.speed,
            autostart_delay: Duration::from_millis(config.autostart_delay_ms),
        }
    }

    fn wall_time(&self, virtual_ms: u64) -> Duration {
        Duration::from_secs_f64(virtual_ms as f64 / self.speed / 1000.0)
    }
}

/// Start a run and play it out in real time.
///
/// `on_tick` is called once right after the run is scheduled and again after
/// every clock step. If the run does not start (one is already in progress, or
/// it would overflow the clock) nothing is driven and `on_tick` is never called.
pub async fn drive<O, F>(
    sim: &mut PipelineSimulator<O>,
    options: &DriveOptions,
    mut on_tick: F,
) -> RunStart
where
    O: OutcomeSource,
    F: FnMut(&PipelineSimulator<O>),
{
    if !options.autostart_delay.is_zero() {
        sleep(options.autostart_delay).await;
    }

    let start = sim.run();
    if !matches!(start, RunStart::Started(_)) {
        return start;
    }
    on_tick(&*sim);

    while sim.is_running() {
        let Some(deadline) = sim.next_deadline() else {
            break;
        };
        let wait_ms = deadline.saturating_sub(sim.now());
        if wait_ms > 0 {
            debug!(wait_ms, deadline, "sleeping until next transition");
            sleep(options.wall_time(wait_ms)).await;
        }
        sim.advance_to(deadline);
        on_tick(&*sim);
    }

    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Job, JobStatus, Pacing, Pipeline, Stage};
    use std::time::Instant;

    fn quick_pipeline() -> Pipeline {
        Pipeline::with_pacing(
            "quick",
            vec![
                Stage::sequential("build", vec![Job::new("a", "a", 20), Job::new("b", "b", 20)]),
                Stage::parallel(
                    "test",
                    vec![
                        Job::new("c", "c", 30).can_fail(true),
                        Job::new("d", "d", 10).can_fail(true),
                    ],
                ),
            ],
            Pacing::tight(),
        )
        .unwrap()
    }

    fn fast() -> DriveOptions {
        DriveOptions {
            speed: 10.0,
            autostart_delay: Duration::ZERO,
        }
    }

    #[test]
    fn wall_time_scales_with_speed() {
        let options = DriveOptions {
            speed: 2.0,
            ..DriveOptions::default()
        };
        assert_eq!(options.wall_time(1000), Duration::from_millis(500));
    }

    #[test]
    fn options_follow_config() {
        let config = SimConfig {
            speed: 4.0,
            autostart_delay_ms: 0,
            ..SimConfig::default()
        };
        let options = DriveOptions::from_config(&config);
        assert_eq!(options.speed, 4.0);
        assert!(options.autostart_delay.is_zero());
    }

    #[tokio::test]
    async fn drives_run_to_completion() {
        let mut sim = PipelineSimulator::seeded(quick_pipeline(), 8);
        let mut ticks = 0;
        let start = drive(&mut sim, &fast(), |_| ticks += 1).await;

        assert_eq!(start, RunStart::Started(1));
        assert!(!sim.is_running());
        assert!(ticks > 1);
        for (_, status) in sim.snapshot() {
            assert!(status.is_terminal());
        }
        assert_eq!(sim.get_status("a"), JobStatus::Passed);
        // a(20) + gap + b(20) + gap + slowest parallel job(30)
        assert_eq!(sim.now(), 72);
    }

    #[tokio::test]
    async fn observer_sees_running_before_terminal() {
        let mut sim = PipelineSimulator::seeded(quick_pipeline(), 8);
        let mut seen = Vec::new();
        drive(&mut sim, &fast(), |s| seen.push(s.get_status("c"))).await;

        let running = seen.iter().position(|s| *s == JobStatus::Running).unwrap();
        let done = seen.iter().position(|s| s.is_terminal()).unwrap();
        assert!(running < done);
    }

    #[tokio::test]
    async fn takes_roughly_scaled_wall_time() {
        let mut sim = PipelineSimulator::seeded(quick_pipeline(), 8);
        let began = Instant::now();
        drive(&mut sim, &fast(), |_| {}).await;
        // 72 virtual ms at 10x speed.
        assert!(began.elapsed() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn does_not_restart_an_active_run() {
        let mut sim = PipelineSimulator::seeded(quick_pipeline(), 8);
        sim.run();
        sim.advance_by(5);

        let start = drive(&mut sim, &fast(), |_| {}).await;
        assert_eq!(start, RunStart::AlreadyRunning(1));
        assert!(sim.is_running());
        assert_eq!(sim.get_status("a"), JobStatus::Running);
    }

    #[tokio::test]
    async fn rejected_run_is_not_driven() {
        let mut sim = PipelineSimulator::seeded(quick_pipeline(), 8);
        sim.advance_by(u64::MAX - 10);
        let mut ticks = 0;

        let start = drive(&mut sim, &fast(), |_| ticks += 1).await;
        assert_eq!(start, RunStart::Rejected(0));
        assert_eq!(ticks, 0);
        assert!(!sim.is_running());
    }
}
