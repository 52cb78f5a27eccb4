//! Orchestration events
//!
//! The grading core never prints. It describes what happens as [`Event`]s
//! and leaves rendering to a [`Reporter`].

use serde::Serialize;

use crate::error::GraderError;
use crate::models::{RunSummary, TestResult};

/// Running totals shown while tests execute
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub requested: usize,
    pub completed: usize,
    pub failures: usize,
    pub errors: usize,
}

#[derive(Debug)]
pub enum Event<'a> {
    /// A standalone line for the user
    Notice(&'a str),
    Building { project: &'a str },
    BuildFailed { project: &'a str, error: &'a GraderError },
    /// About to run the next test
    Progress(Progress),
    TestFinished(&'a TestResult),
    TestErrored { group: &'a str, error: &'a GraderError },
    /// Sent once at the end of every run, however it ended
    Finished(&'a RunSummary),
}

/// Receives events as they happen
pub trait Reporter {
    fn report(&mut self, event: Event<'_>);
}
