mod cli;
mod ui;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use pipesim::config::SimConfig;
use pipesim::driver::{self, DriveOptions};
use pipesim::observer::{RunReport, StatusBoard, drain_events};
use pipesim::outcome::RandomOutcome;
use pipesim::pipeline::{JobStatus, Pipeline, Preset};
use pipesim::simulator::{PipelineSimulator, RunStart};
use ui::PipelineProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = SimConfig::load().context("failed to load pipesim.toml")?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    let pipeline = load_pipeline(&cli, &config)?;

    match cli.command {
        Command::Run { speed, delay } => {
            let mut options = DriveOptions::from_config(&config);
            if let Some(speed) = speed {
                anyhow::ensure!(speed > 0.0, "--speed must be positive");
                options.speed = speed;
            }
            if let Some(delay) = delay {
                options.autostart_delay = Duration::from_millis(delay);
            }
            run(pipeline, &config, &options).await
        }
        Command::Simulate { json } => simulate(pipeline, &config, json),
        Command::Stats { runs } => stats(pipeline, &config, runs),
        Command::Show => {
            for line in ui::render_pipeline(&pipeline) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pipesim=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load_pipeline(cli: &Cli, config: &SimConfig) -> Result<Pipeline> {
    if let Some(path) = &cli.file {
        return Pipeline::load(path)
            .with_context(|| format!("failed to load pipeline from {}", path.display()));
    }
    let preset = match cli.preset {
        Some(arg) => Preset::from(arg),
        None => config.preset.parse()?,
    };
    Ok(preset.pipeline()?)
}

fn simulator(pipeline: Pipeline, config: &SimConfig) -> Result<PipelineSimulator> {
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let outcomes = RandomOutcome::new(rng, config.failure_probability)?;
    Ok(PipelineSimulator::with_outcomes(pipeline, outcomes))
}

fn start(sim: &mut PipelineSimulator) -> Result<()> {
    match sim.run() {
        RunStart::Started(_) => Ok(()),
        other => anyhow::bail!("pipeline '{}' did not start: {other:?}", sim.pipeline().name),
    }
}

async fn run(pipeline: Pipeline, config: &SimConfig, options: &DriveOptions) -> Result<()> {
    let mut sim = simulator(pipeline, config)?;
    let mut progress = PipelineProgress::start(sim.pipeline());
    let mut events = sim.subscribe();

    let start = driver::drive(&mut sim, options, |_| {
        drain_events(&mut events, |event| progress.update(&event));
    })
    .await;

    progress.complete();
    anyhow::ensure!(
        matches!(start, RunStart::Started(_)),
        "pipeline '{}' could not be started",
        sim.pipeline().name
    );
    Ok(())
}

fn simulate(pipeline: Pipeline, config: &SimConfig, json: bool) -> Result<()> {
    let mut sim = simulator(pipeline, config)?;
    start(&mut sim)?;
    sim.run_until_idle();

    let report = RunReport::from_simulator(&sim);
    if json {
        ui::print_report(&report);
        return Ok(());
    }

    for line in ui::render_timeline(sim.history()) {
        println!("{line}");
    }
    let mut board = StatusBoard::new(sim.pipeline());
    sim.history().iter().for_each(|e| board.apply(e));
    println!();
    println!("{}", ui::summary_line(&board.counts()));
    if let Some(ms) = report.duration_ms() {
        println!("Finished in {:.1}s of simulated time", ms as f64 / 1000.0);
    }
    Ok(())
}

fn stats(pipeline: Pipeline, config: &SimConfig, runs: u32) -> Result<()> {
    anyhow::ensure!(runs > 0, "--runs must be at least 1");
    let mut sim = simulator(pipeline, config)?;
    let mut failures: HashMap<String, u32> = HashMap::new();
    let mut failed_runs = 0u32;

    for _ in 0..runs {
        start(&mut sim)?;
        sim.run_until_idle();
        let mut any_failed = false;
        for (id, status) in sim.snapshot() {
            if status == JobStatus::Failed {
                *failures.entry(id).or_default() += 1;
                any_failed = true;
            }
        }
        if any_failed {
            failed_runs += 1;
        }
    }

    println!("{runs} runs of '{}'", sim.pipeline().name);
    for (_, job) in sim.pipeline().jobs() {
        let failed = failures.get(&job.id).copied().unwrap_or(0);
        let rate = f64::from(failed) / f64::from(runs) * 100.0;
        let note = if job.can_fail { "" } else { " (cannot fail)" };
        println!("  {:<20} {:>6.2}% failed{note}", job.id, rate);
    }
    println!(
        "  {:<20} {:>6.2}% of runs had a failure",
        "pipeline",
        f64::from(failed_runs) / f64::from(runs) * 100.0
    );
    Ok(())
}
