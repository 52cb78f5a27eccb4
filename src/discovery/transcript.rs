//! Transcript fixtures
//!
//! A single file holds alternating lines: an argument for the program, then
//! the first line it must print.

use std::fs;

use tracing::{debug, warn};

use super::{GatherContext, TestGroup};
use crate::error::{GraderError, GraderResult};
use crate::executor::{TestCase, Verifier};

/// Tests read from `<prefix><id><suffix>`
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptScheme {
    pub prefix: String,
    pub suffix: String,
}

impl Default for TranscriptScheme {
    fn default() -> Self {
        Self {
            prefix: "tests".to_string(),
            suffix: ".txt".to_string(),
        }
    }
}

impl TranscriptScheme {
    pub fn file_name(&self, id: &str) -> String {
        format!("{}{}{}", self.prefix, id, self.suffix)
    }

    pub(super) fn discover(
        &self,
        group: &TestGroup,
        ctx: &GatherContext,
    ) -> GraderResult<Vec<TestCase>> {
        let path = ctx.fixture_dir.join(self.file_name(group.id()));
        if !path.exists() {
            warn!("Test file not found: {:?}", path);
            return Ok(Vec::new());
        }

        debug!("Opening tests file: {:?}", path);
        let bytes = fs::read(&path).map_err(|e| {
            GraderError::config(format!(
                "unable to read test file {:?}: {e}",
                path.display().to_string()
            ))
        })?;
        let text = group.limits(ctx).encoding.decode(&bytes);
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();

        // A trailing unpaired line is ignored
        lines
            .chunks_exact(2)
            .map(|pair| {
                group.case(
                    ctx,
                    vec![ctx.program(), pair[0].to_string()],
                    Verifier::first_line(pair[1]),
                )
            })
            .collect()
    }
}
