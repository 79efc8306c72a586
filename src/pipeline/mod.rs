mod definition;
mod job;
mod presets;
mod state;

pub use definition::{ExecutionMode, Pacing, Pipeline, Stage};
pub use job::{Job, JobStatus};
pub use presets::Preset;
pub use state::{JobState, Lifecycle, Transition};
