//! Simulated CI/CD pipeline engine.
//!
//! A [`Pipeline`](pipeline::Pipeline) of stages and jobs is played out by a
//! [`PipelineSimulator`](simulator::PipelineSimulator) on a virtual clock.
//! Jobs move `pending -> running -> passed | failed`, fallible jobs fail with
//! a configurable probability, and every transition is published to
//! subscribers as a [`StatusEvent`](simulator::StatusEvent).

pub mod config;
pub mod driver;
pub mod error;
pub mod observer;
pub mod outcome;
pub mod pipeline;
pub mod schedule;
pub mod simulator;

pub use error::{Result, SimError};
pub use simulator::{PipelineSimulator, RunStart, StatusEvent};
