//! Grader error taxonomy
//!
//! Grading failures (wrong output, timeouts, crashes) are not errors: they
//! are ordinary [`TestResult`](crate::models::TestResult)s. The variants
//! here are the conditions that stop a test, a build, or the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the grading core
#[derive(Error, Debug)]
pub enum GraderError {
    /// Invalid assignment definition or directory layout. Fatal to the run.
    #[error("{0}")]
    Configuration(String),

    /// An external collaborator (build, archive extraction) exited nonzero.
    #[error("error running {program:?} (return code {code})")]
    ExternalCommand {
        program: String,
        args: Vec<String>,
        code: i32,
        output: Option<String>,
    },

    /// The build reported success but left no executable behind.
    #[error("executable not created: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// A single test's fixture could not be read or its subject not started.
    #[error("{context}: {source}")]
    TestIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Programming error inside the grader itself.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type GraderResult<T> = std::result::Result<T, GraderError>;

impl GraderError {
    pub fn config(message: impl Into<String>) -> Self {
        GraderError::Configuration(message.into())
    }

    pub fn test_io(context: impl Into<String>, source: std::io::Error) -> Self {
        GraderError::TestIo {
            context: context.into(),
            source,
        }
    }

    /// Whether the error should be hidden behind a generic message
    pub fn is_internal(&self) -> bool {
        matches!(self, GraderError::Internal(_))
    }

    /// Render the error for the user, prefixed with where it happened
    pub fn report(&self, ctx: &str) -> String {
        match self {
            GraderError::ExternalCommand {
                args, output, ..
            } => {
                let mut out = format!("{ctx}: {self}");
                if !args.is_empty() {
                    out.push_str(&format!("\n  arguments {args:?}"));
                }
                if let Some(output) = output {
                    if !output.is_empty() {
                        out.push('\n');
                        out.push_str(output.trim_end());
                    }
                }
                out
            }
            _ => format!("{ctx}: {self}"),
        }
    }
}
