//! Output formatters for grading results
//!
//! Provides the failure listing and the table, JSON and CSV summaries.

use serde::Serialize;

use crate::error::GraderError;
use crate::models::{Category, GroupTally, RunEnd, RunSummary, ScoreTable, TestResult};

/// Summary format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }

    /// Whether stdout carries machine-readable output only
    pub fn is_structured(&self) -> bool {
        !matches!(self, OutputFormat::Table)
    }
}

/// What a failure listing includes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detail {
    pub show_successes: bool,
    pub show_comments: bool,
    pub show_input: bool,
    pub show_output: bool,
}

impl Detail {
    /// Detail for a verbosity level (0 is the default)
    pub fn from_verbosity(level: i32) -> Self {
        Self {
            show_successes: level > 1,
            show_comments: level >= 0,
            show_input: level >= 1,
            show_output: level >= 1,
        }
    }
}

impl Default for Detail {
    fn default() -> Self {
        Self::from_verbosity(0)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    category: &'a str,
    group: &'a str,
    points: f64,
    failed: usize,
    score: f64,
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    detail: Detail,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            detail: Detail::default(),
        }
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Listing of one test, or `None` when a success is not shown
    pub fn format_result(&self, result: &TestResult) -> Option<String> {
        let summary = match &result.summary {
            Some(summary) => summary.as_str(),
            None if self.detail.show_successes => "correct",
            None => return None,
        };

        let mut output = String::new();
        output.push_str(&format!("\n{}: {}\n", result.group, summary));
        output.push_str(&format!("   arguments {:?}\n", result.args));

        if self.detail.show_comments {
            output.push('\n');
            for line in &result.comments {
                output.push_str(&format!("   {line}\n"));
            }
        }

        if self.detail.show_input {
            if let Some(input) = &result.input {
                output.push_str(&format!("\ninput\n-----\n{input}\n-----\n"));
            }
        }

        if self.detail.show_output {
            output.push_str("\noutput\n---\n");
            output.push_str(&result.output);
            output.push_str("---\n");
        }

        Some(output)
    }

    /// Error block for a failed build or test
    pub fn format_error(&self, context: &str, error: &GraderError) -> String {
        format!("\n{}\n", error.report(context))
    }

    /// Format the end-of-run summary.
    ///
    /// Structured formats always yield a document; the table is only
    /// printed for a run that reached its report phase.
    pub fn format_summary(&self, summary: &RunSummary) -> Option<String> {
        match self.format {
            OutputFormat::Table if summary.end != RunEnd::Completed => None,
            OutputFormat::Table => Some(self.format_summary_table(summary)),
            OutputFormat::Json => serde_json::to_string(summary).ok(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).ok(),
            OutputFormat::Csv => self.format_summary_csv(summary).ok(),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\nTests performed: {} of {}\n",
            summary.completed, summary.requested
        ));
        output.push_str(&format!("Tests failed:    {}\n", summary.failures));
        if summary.errors > 0 {
            output.push_str(&format!("Errors:          {}\n", summary.errors));
        }

        for (category, groups) in summary.scores.categories() {
            output.push_str(&self.format_category(&summary.scores, category, groups));
        }

        output
    }

    fn format_category(
        &self,
        scores: &ScoreTable,
        category: Category,
        groups: &[GroupTally],
    ) -> String {
        let width = groups
            .iter()
            .map(|g| g.group.chars().count())
            .max()
            .unwrap_or(0)
            .max(5);

        let mut output = String::new();
        output.push_str(&format!("\n{}\n-----\n", category.name()));
        output.push_str(&format!("  {:width$} Points Failed Score\n", ""));

        for tally in groups {
            let failed = if tally.failures > 0 {
                tally.failures.to_string()
            } else {
                String::new()
            };
            output.push_str(&format!(
                "  {:width$} {:6.1} {:>6} {:5.1}\n",
                tally.group, tally.points, failed, tally.score
            ));
        }

        if groups.len() > 1 {
            let (points, score) = scores.category_totals(category);
            output.push_str(&format!("  {:width$} ------        -----\n", ""));
            output.push_str(&format!("  {:width$} {points:6.1}        {score:5.1}\n", ""));
        }

        output
    }

    fn format_summary_csv(&self, summary: &RunSummary) -> csv::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (category, groups) in summary.scores.categories() {
            for tally in groups {
                writer.serialize(CsvRow {
                    category: category.name(),
                    group: &tally.group,
                    points: tally.points,
                    failed: tally.failures,
                    score: tally.score,
                })?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
