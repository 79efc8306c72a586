//! Built-in pipeline definitions.

use std::fmt;
use std::str::FromStr;

use super::definition::{Pacing, Pipeline, Stage};
use super::job::Job;
use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// build (sequential) -> device tests (parallel) -> report.
    Mobile,
    /// build, test and deploy, every stage parallel and every job fallible.
    Gitlab,
}

impl Preset {
    pub fn pipeline(self) -> Result<Pipeline> {
        match self {
            Preset::Mobile => mobile(),
            Preset::Gitlab => gitlab(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Mobile => write!(f, "mobile"),
            Preset::Gitlab => write!(f, "gitlab"),
        }
    }
}

impl FromStr for Preset {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mobile" => Ok(Preset::Mobile),
            "gitlab" => Ok(Preset::Gitlab),
            other => Err(SimError::UnknownPreset(other.to_string())),
        }
    }
}

fn mobile() -> Result<Pipeline> {
    Pipeline::new(
        "mobile",
        vec![
            Stage::sequential(
                "build",
                vec![
                    Job::new("compile-app", "compile app", 1000).labeled("build"),
                    Job::new("update-test-units", "update test units", 1200).labeled("build"),
                    Job::new("build-test-image", "build test image", 1100).labeled("build"),
                ],
            ),
            Stage::parallel(
                "test",
                vec![
                    Job::new("test-device-1", "test device 1", 2500)
                        .can_fail(true)
                        .on_device("iPhone 15 Pro")
                        .labeled("test"),
                    Job::new("test-device-2", "test device 2", 3000)
                        .can_fail(true)
                        .on_device("iPhone 14")
                        .labeled("test"),
                    Job::new("test-device-3", "test device 3", 2800)
                        .can_fail(true)
                        .on_device("Pixel 8 Pro")
                        .labeled("test"),
                ],
            ),
            Stage::sequential(
                "report",
                vec![Job::new("report-results", "report test results", 1500).labeled("report")],
            ),
        ],
    )
}

fn gitlab() -> Result<Pipeline> {
    Pipeline::with_pacing(
        "gitlab",
        vec![
            Stage::parallel(
                "build",
                vec![
                    Job::new("compile-app", "compile-app", 2000).can_fail(true),
                    Job::new("build-ios", "build:iOS", 2500)
                        .can_fail(true)
                        .on_device("iPhone 15"),
                    Job::new("build-android", "build:Android", 2500)
                        .can_fail(true)
                        .on_device("Pixel 8"),
                ],
            ),
            Stage::parallel(
                "test",
                vec![
                    Job::new("unit-tests", "unit-tests", 1500).can_fail(true),
                    Job::new("e2e-ios", "e2e:iOS", 3000)
                        .can_fail(true)
                        .on_device("iPhone 15"),
                    Job::new("e2e-android", "e2e:Android", 3000)
                        .can_fail(true)
                        .on_device("Pixel 8"),
                    Job::new("integration", "integration", 2000).can_fail(true),
                ],
            ),
            Stage::parallel(
                "deploy",
                vec![
                    Job::new("deploy-tf", "TestFlight", 2000).can_fail(true),
                    Job::new("deploy-ps", "PlayStore", 2000).can_fail(true),
                ],
            ),
        ],
        Pacing {
            stage_gap_ms: 500,
            ..Pacing::default()
        },
    )
}
