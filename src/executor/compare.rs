//! Output comparison
//!
//! Two policies are supported: the first output line against a literal
//! string, and the whole output against a reference file, line by line.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GraderError, GraderResult};
use crate::models::{Encoding, Limits};

/// Result of checking one test's output
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Verdict {
    pub correct: bool,
    pub comments: Vec<String>,
}

/// How a test's output is judged
#[derive(Clone, Debug, PartialEq)]
pub enum Verifier {
    /// First output line, trailing whitespace removed, must equal `expected`
    FirstLine { expected: String },
    /// Whole output must match the file line by line
    ReferenceFile { path: PathBuf },
}

impl Verifier {
    pub fn first_line(expected: impl Into<String>) -> Self {
        Verifier::FirstLine {
            expected: expected.into(),
        }
    }

    pub fn reference_file(path: impl Into<PathBuf>) -> Self {
        Verifier::ReferenceFile { path: path.into() }
    }

    #[cfg(test)]
    pub fn reference_path(&self) -> Option<&Path> {
        match self {
            Verifier::FirstLine { .. } => None,
            Verifier::ReferenceFile { path } => Some(path),
        }
    }

    /// Judge decoded `output` under `limits`
    pub fn verify(&self, output: &str, limits: &Limits) -> GraderResult<Verdict> {
        match self {
            Verifier::FirstLine { expected } => {
                let comments = OutputComparator::first_line(expected, output);
                Ok(Verdict {
                    correct: comments.is_empty(),
                    comments,
                })
            }
            Verifier::ReferenceFile { path } => {
                let reference = read_reference(path, limits.encoding)?;
                let diff = OutputComparator::lines(&reference, output, limits.error_limit);

                let mut comments = Vec::with_capacity(diff.len() + 1);
                comments.push(format!("reference file: {:?}", path.display().to_string()));
                let correct = diff.is_empty();
                comments.extend(diff);

                Ok(Verdict { correct, comments })
            }
        }
    }
}

fn read_reference(path: &Path, encoding: Encoding) -> GraderResult<String> {
    debug!("Opening reference file {:?}", path);
    let bytes = fs::read(path).map_err(|e| {
        GraderError::test_io(
            format!("Unable to open reference file {:?}", path.display().to_string()),
            e,
        )
    })?;
    Ok(encoding.decode(&bytes))
}

/// Line comparison algorithms
pub struct OutputComparator;

impl OutputComparator {
    /// Compare the first line of `output` with `expected`.
    ///
    /// Returns no comments on a match.
    pub fn first_line(expected: &str, output: &str) -> Vec<String> {
        let received = output.split('\n').next().unwrap_or_default().trim_end();
        if received == expected {
            Vec::new()
        } else {
            vec![format!("expected: {expected}"), format!("received: {received}")]
        }
    }

    /// Positional line diff of `output` against `reference`.
    ///
    /// At most `error_limit` mismatches are listed (0 lists all). Returns no
    /// comments when the texts agree after trailing whitespace is removed.
    pub fn lines(reference: &str, output: &str, error_limit: usize) -> Vec<String> {
        let expected: Vec<&str> = reference.trim_end().split('\n').collect();
        let received: Vec<&str> = output.trim_end().split('\n').collect();
        debug!(
            "out {} lines; ref {} lines",
            received.len(),
            expected.len()
        );

        let mismatches: Vec<(usize, &str, &str)> = expected
            .iter()
            .zip(&received)
            .enumerate()
            .filter(|(_, (e, r))| e != r)
            .map(|(i, (e, r))| (i + 1, *e, *r))
            .collect();

        let hidden = if error_limit > 0 && mismatches.len() > error_limit {
            mismatches.len() - error_limit
        } else {
            0
        };

        let mut comments = Vec::new();
        for (line, e, r) in mismatches.iter().take(mismatches.len() - hidden) {
            comments.push(format!("line {}", thousands(*line)));
            comments.push(format!("  expected: {e:?}"));
            comments.push(format!("  received: {r:?}"));
        }

        if hidden > 0 {
            comments.push(format!("{} additional errors", thousands(hidden)));
        }

        if received.len() > expected.len() {
            comments.push(format!(
                "{} extra lines in output",
                thousands(received.len() - expected.len())
            ));
        } else if received.len() < expected.len() {
            comments.push(format!("line {}", thousands(received.len() + 1)));
            comments.push(format!("  expected: {:?}", expected[received.len()]));
            comments.push("  received end of file".to_string());
        }

        comments
    }
}

/// Render `n` with comma thousands separators
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
