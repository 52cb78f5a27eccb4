//! Test result models
//!
//! Defines run outcomes, per-test results and the score table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::Category;

/// How the subject process finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Exited (or closed its output) before the deadline and within the cap
    Completed,
    /// Killed by the deadline
    TimedOut,
    /// Killed after writing more than the output cap
    OutputLimitExceeded,
}

impl Outcome {
    /// Failure summary forced by the outcome, if any
    pub fn summary(&self) -> Option<&'static str> {
        match self {
            Outcome::Completed => None,
            Outcome::TimedOut => Some("timed out"),
            Outcome::OutputLimitExceeded => Some("exceeded output limit"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::OutputLimitExceeded => write!(f, "exceeded output limit"),
        }
    }
}

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub group: String,
    pub category: Category,
    pub args: Vec<String>,
    pub outcome: Outcome,
    pub exit_code: i32,
    pub success: bool,
    pub credit: f64,
    pub summary: Option<String>,
    pub comments: Vec<String>,
    pub output: String,
    pub input_file: Option<PathBuf>,
    /// Input text shown in failure listings
    pub input: Option<String>,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn status(&self) -> TestStatus {
        if self.success {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status().symbol(),
            self.group,
            self.duration_ms
        )?;
        if let Some(summary) = &self.summary {
            write!(f, " - {summary}")?;
        }
        Ok(())
    }
}

/// Accumulated totals for one group
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTally {
    pub group: String,
    pub points: f64,
    pub score: f64,
    pub failures: usize,
}

/// Per-category, per-group point/score/failure totals for one run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScoreTable {
    categories: BTreeMap<Category, Vec<GroupTally>>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn tally(&mut self, category: Category, group: &str) -> &mut GroupTally {
        let groups = self.categories.entry(category).or_default();
        let index = match groups.iter().position(|g| g.group == group) {
            Some(index) => index,
            None => {
                groups.push(GroupTally {
                    group: group.to_string(),
                    ..Default::default()
                });
                groups.len() - 1
            }
        };
        &mut groups[index]
    }

    /// Count a test's weight toward its group, whatever the outcome
    pub fn add_points(&mut self, category: Category, group: &str, weight: f64) {
        self.tally(category, group).points += weight;
    }

    pub fn add_score(&mut self, category: Category, group: &str, credit: f64) {
        self.tally(category, group).score += credit;
    }

    pub fn add_failure(&mut self, category: Category, group: &str) {
        self.tally(category, group).failures += 1;
    }

    pub fn categories(&self) -> impl Iterator<Item = (Category, &[GroupTally])> {
        self.categories.iter().map(|(c, g)| (*c, g.as_slice()))
    }

    #[cfg(test)]
    pub fn group(&self, category: Category, group: &str) -> Option<&GroupTally> {
        self.categories
            .get(&category)
            .and_then(|groups| groups.iter().find(|g| g.group == group))
    }

    /// Sum of (points, score) for a category
    pub fn category_totals(&self, category: Category) -> (f64, f64) {
        self.categories
            .get(&category)
            .map(|groups| {
                groups
                    .iter()
                    .fold((0.0, 0.0), |(p, s), g| (p + g.points, s + g.score))
            })
            .unwrap_or((0.0, 0.0))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    /// Every runnable test was attempted
    Completed,
    /// No test matched the requests
    NothingRequested,
    /// Build directories were prepared and nothing else
    InitOnly,
    /// Stopped at the first build error or failed test
    Aborted,
}

/// Outcome of one orchestration run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub assignment: String,
    pub requested: usize,
    pub completed: usize,
    pub failures: usize,
    pub errors: usize,
    pub end: RunEnd,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub scores: ScoreTable,
}
