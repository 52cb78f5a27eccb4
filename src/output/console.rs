//! Terminal reporter
//!
//! Renders orchestration events. In bar mode a one-line status is kept on
//! stderr and cleared before anything is written to stdout.

use std::io::{self, Write};

use super::formatter::ResultFormatter;
use crate::orchestrator::{Event, Progress, Reporter};

const BAR_WIDTH: usize = 80;

pub struct ConsoleReporter<O: Write = io::Stdout, E: Write = io::Stderr> {
    formatter: ResultFormatter,
    out: O,
    status: E,
    show_bar: bool,
    bar_visible: bool,
}

impl ConsoleReporter {
    pub fn new(formatter: ResultFormatter, show_bar: bool) -> Self {
        Self::with_writers(formatter, show_bar, io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> ConsoleReporter<O, E> {
    pub fn with_writers(formatter: ResultFormatter, show_bar: bool, out: O, status: E) -> Self {
        Self {
            formatter,
            out,
            status,
            show_bar,
            bar_visible: false,
        }
    }

    #[cfg(test)]
    pub fn into_writers(self) -> (O, E) {
        (self.out, self.status)
    }

    /// Title line printed before grading
    pub fn banner(&mut self, name: &str, release: &str) {
        if !self.formatter.format().is_structured() {
            self.print(&format!("{name} Auto-grader, Release {release}\n"));
        }
    }

    /// Standalone message, preceded by a blank line
    pub fn message(&mut self, message: &str) {
        self.print(&format!("\n{message}\n"));
    }

    pub fn clear_bar(&mut self) {
        if self.bar_visible {
            // Terminal writes are best effort
            let _ = write!(self.status, "\r{:BAR_WIDTH$}\r", "");
            let _ = self.status.flush();
            self.bar_visible = false;
        }
    }

    fn set_status(&mut self, message: &str) {
        if self.show_bar {
            let _ = write!(self.status, "\r{message:BAR_WIDTH$}");
            let _ = self.status.flush();
            self.bar_visible = true;
        } else {
            self.print(&format!("{message}\n"));
        }
    }

    fn refresh(&mut self, progress: Progress) {
        if !self.show_bar {
            return;
        }
        let mut message = format!(
            "Completed {} of {}. Failures {}.",
            progress.completed, progress.requested, progress.failures
        );
        if progress.errors > 0 {
            message.push_str(&format!(" Errors {}.", progress.errors));
        }
        self.set_status(&message);
    }

    /// Write a block to stdout, or to stderr when stdout is reserved for a
    /// structured summary
    fn print(&mut self, text: &str) {
        self.clear_bar();
        let result = if self.formatter.format().is_structured() {
            self.status.write_all(text.as_bytes())
        } else {
            self.out.write_all(text.as_bytes())
        };
        if let Err(e) = result {
            tracing::debug!("console write failed: {e}");
        }
    }
}

impl<O: Write, E: Write> Reporter for ConsoleReporter<O, E> {
    fn report(&mut self, event: Event<'_>) {
        match event {
            Event::Notice(message) => self.message(message),
            Event::Building { project } => self.set_status(&format!("Building {project}.")),
            Event::BuildFailed { project, error } => {
                let block = self.formatter.format_error(project, error);
                self.print(&block);
            }
            Event::Progress(progress) => self.refresh(progress),
            Event::TestFinished(result) => {
                if let Some(block) = self.formatter.format_result(result) {
                    self.print(&block);
                }
            }
            Event::TestErrored { group, error } => {
                let block = self.formatter.format_error(group, error);
                self.print(&block);
            }
            Event::Finished(summary) => {
                self.clear_bar();
                if let Some(text) = self.formatter.format_summary(summary) {
                    let _ = writeln!(self.out, "{}", text.trim_end_matches('\n'));
                    let _ = self.out.flush();
                }
            }
        }
    }
}
