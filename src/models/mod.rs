//! Data models for grading
//!
//! This module contains the data structures shared by the executor,
//! discovery and orchestration layers.

mod result;
mod spec;

pub use result::{GroupTally, Outcome, RunEnd, RunSummary, ScoreTable, TestResult};
pub use spec::{Category, Encoding, LimitOverrides, Limits, TestSpec};
