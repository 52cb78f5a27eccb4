//! Output module
//!
//! Renders grading events and summaries for the terminal.

mod console;
mod formatter;

pub use console::ConsoleReporter;
pub use formatter::{Detail, OutputFormat, ResultFormatter};
