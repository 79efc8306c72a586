use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::job::Job;
use crate::error::{Result, SimError};

/// How the jobs inside a stage are scheduled relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One job at a time; each finishes before the next starts.
    #[default]
    Sequential,
    /// All jobs start together; the stage ends with the slowest one.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// A named phase of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub jobs: Vec<Job>,
}

impl Stage {
    pub fn sequential(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        Self {
            name: name.into(),
            mode: ExecutionMode::Sequential,
            jobs,
        }
    }

    pub fn parallel(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        Self {
            name: name.into(),
            mode: ExecutionMode::Parallel,
            jobs,
        }
    }

    /// Duration of the slowest job in the stage.
    pub fn longest_ms(&self) -> u64 {
        self.jobs.iter().map(|j| j.duration_ms).max().unwrap_or(0)
    }
}

/// Idle time the scheduler leaves between jobs and stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Gap between a sequential job finishing and the next one starting.
    #[serde(default = "default_job_gap_ms")]
    pub job_gap_ms: u64,
    /// Gap between the end of a stage and the start of the next.
    #[serde(default = "default_stage_gap_ms")]
    pub stage_gap_ms: u64,
}

fn default_job_gap_ms() -> u64 {
    200
}

fn default_stage_gap_ms() -> u64 {
    300
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            job_gap_ms: default_job_gap_ms(),
            stage_gap_ms: default_stage_gap_ms(),
        }
    }
}

impl Pacing {
    /// The smallest pacing that still keeps sequential transitions strictly ordered in time.
    pub fn tight() -> Self {
        Self {
            job_gap_ms: 1,
            stage_gap_ms: 1,
        }
    }
}

/// An ordered, validated list of stages.
///
/// Construct with [`Pipeline::new`] or one of the loaders; all of them
/// validate, so a `Pipeline` value is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub pacing: Pacing,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self> {
        Self::with_pacing(name, stages, Pacing::default())
    }

    pub fn with_pacing(name: impl Into<String>, stages: Vec<Stage>, pacing: Pacing) -> Result<Self> {
        let pipeline = Self {
            name: name.into(),
            pacing,
            stages,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let pipeline: Pipeline = toml::from_str(s)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let pipeline: Pipeline = serde_json::from_str(s)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Load a definition from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(SimError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// All jobs in pipeline order, paired with the index of their stage.
    pub fn jobs(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, stage)| stage.jobs.iter().map(move |job| (i, job)))
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs().map(|(_, job)| job).find(|job| job.id == id)
    }

    /// Virtual time from the first job starting to the last job finishing,
    /// or `None` if it does not fit in a `u64`.
    pub fn timeline_ms(&self) -> Option<u64> {
        let mut total: u64 = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                total = total.checked_add(self.pacing.stage_gap_ms)?;
            }
            total = match stage.mode {
                ExecutionMode::Sequential => {
                    let mut t = total;
                    for (n, job) in stage.jobs.iter().enumerate() {
                        if n > 0 {
                            t = t.checked_add(self.pacing.job_gap_ms)?;
                        }
                        t = t.checked_add(job.duration_ms)?;
                    }
                    t
                }
                ExecutionMode::Parallel => total.checked_add(stage.longest_ms())?,
            };
        }
        Some(total)
    }

    fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(SimError::InvalidPipeline(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }
        if self.pacing.job_gap_ms == 0 || self.pacing.stage_gap_ms == 0 {
            return Err(SimError::InvalidPipeline(
                "pacing gaps must be at least 1ms".into(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.jobs.is_empty() {
                return Err(SimError::InvalidPipeline(format!(
                    "stage '{}' has no jobs",
                    stage.name
                )));
            }
            for job in &stage.jobs {
                if job.id.trim().is_empty() {
                    return Err(SimError::InvalidPipeline(format!(
                        "stage '{}' contains a job with an empty id",
                        stage.name
                    )));
                }
                if job.duration_ms == 0 {
                    return Err(SimError::InvalidPipeline(format!(
                        "job '{}' must have a positive duration",
                        job.id
                    )));
                }
                if !seen.insert(job.id.as_str()) {
                    return Err(SimError::InvalidPipeline(format!(
                        "duplicate job id '{}'",
                        job.id
                    )));
                }
            }
        }

        if self.timeline_ms().is_none() {
            return Err(SimError::InvalidPipeline(format!(
                "pipeline '{}' is too long to schedule",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_stage() -> Stage {
        Stage::sequential(
            "build",
            vec![
                Job::new("compile", "compile", 100),
                Job::new("package", "package", 200),
            ],
        )
    }

    #[test]
    fn valid_pipeline_builds() {
        let p = Pipeline::new("demo", vec![build_stage()]).unwrap();
        assert_eq!(p.job_count(), 2);
        assert_eq!(p.pacing, Pacing::default());
        assert_eq!(p.job("package").unwrap().duration_ms, 200);
        assert!(p.job("missing").is_none());
    }

    #[test]
    fn rejects_empty_pipeline() {
        let err = Pipeline::new("empty", vec![]).unwrap_err();
        assert!(matches!(err, SimError::InvalidPipeline(_)));
    }

    #[test]
    fn rejects_empty_stage() {
        let err = Pipeline::new("p", vec![Stage::parallel("test", vec![])]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid pipeline: stage 'test' has no jobs");
    }

    #[test]
    fn rejects_duplicate_ids_across_stages() {
        let stages = vec![
            build_stage(),
            Stage::parallel("test", vec![Job::new("compile", "again", 10)]),
        ];
        let err = Pipeline::new("p", stages).unwrap_err();
        assert_eq!(err.to_string(), "Invalid pipeline: duplicate job id 'compile'");
    }

    #[test]
    fn rejects_zero_duration() {
        let stages = vec![Stage::sequential("s", vec![Job::new("a", "a", 0)])];
        assert!(Pipeline::new("p", stages).is_err());
    }

    #[test]
    fn rejects_zero_pacing() {
        let pacing = Pacing {
            job_gap_ms: 0,
            stage_gap_ms: 300,
        };
        assert!(Pipeline::with_pacing("p", vec![build_stage()], pacing).is_err());
    }

    #[test]
    fn timeline_covers_jobs_and_gaps() {
        let stages = vec![
            build_stage(),
            Stage::parallel("test", vec![Job::new("unit", "unit", 10), Job::new("e2e", "e2e", 40)]),
        ];
        let p = Pipeline::with_pacing("p", stages, Pacing::tight()).unwrap();
        // 100 + 1 + 200, stage gap 1, slowest parallel job 40
        assert_eq!(p.timeline_ms(), Some(342));
    }

    #[test]
    fn rejects_timeline_that_overflows() {
        let half = u64::MAX / 2 + 1;
        let json = format!(
            r#"{{"name":"huge","stages":[{{"name":"s","jobs":[
                {{"id":"a","name":"a","duration_ms":{half}}},
                {{"id":"b","name":"b","duration_ms":{half}}}]}}]}}"#
        );
        let err = Pipeline::from_json_str(&json).unwrap_err();
        assert_eq!(err.to_string(), "Invalid pipeline: pipeline 'huge' is too long to schedule");
    }

    #[test]
    fn rejects_overflowing_stage_gaps() {
        let stages = vec![
            Stage::parallel("a", vec![Job::new("a", "a", u64::MAX - 1)]),
            Stage::parallel("b", vec![Job::new("b", "b", 1)]),
        ];
        let pacing = Pacing {
            job_gap_ms: 1,
            stage_gap_ms: 10,
        };
        assert!(Pipeline::with_pacing("p", stages, pacing).is_err());
    }

    #[test]
    fn longest_job_in_stage() {
        assert_eq!(build_stage().longest_ms(), 200);
    }

    #[test]
    fn jobs_iterate_in_pipeline_order() {
        let stages = vec![
            build_stage(),
            Stage::parallel("test", vec![Job::new("unit", "unit", 10)]),
        ];
        let p = Pipeline::new("p", stages).unwrap();
        let ids: Vec<_> = p.jobs().map(|(stage, job)| (stage, job.id.as_str())).collect();
        assert_eq!(ids, vec![(0, "compile"), (0, "package"), (1, "unit")]);
    }

    #[test]
    fn parses_toml_definition() {
        let toml_str = r#"
            name = "from-toml"

            [pacing]
            stage_gap_ms = 500

            [[stages]]
            name = "test"
            mode = "parallel"

            [[stages.jobs]]
            id = "e2e-ios"
            name = "e2e:iOS"
            duration_ms = 3000
            can_fail = true
            device = "iPhone 15"
        "#;
        let p = Pipeline::from_toml_str(toml_str).unwrap();
        assert_eq!(p.name, "from-toml");
        assert_eq!(p.pacing.stage_gap_ms, 500);
        assert_eq!(p.pacing.job_gap_ms, 200);
        assert_eq!(p.stages[0].mode, ExecutionMode::Parallel);
        assert!(p.stages[0].jobs[0].can_fail);
    }

    #[test]
    fn toml_definition_is_validated() {
        let toml_str = r#"
            name = "bad"
            stages = []
        "#;
        assert!(matches!(
            Pipeline::from_toml_str(toml_str),
            Err(SimError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"name":"j","stages":[{{"name":"s","jobs":[{{"id":"a","name":"a","duration_ms":5}}]}}]}}"#
        )
        .unwrap();
        let p = Pipeline::load(file.path()).unwrap();
        assert_eq!(p.name, "j");
        assert_eq!(p.stages[0].mode, ExecutionMode::Sequential);
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            Pipeline::load(file.path()),
            Err(SimError::UnsupportedFormat(_))
        ));
    }
}
