//! Staged training/data fixtures
//!
//! Each reference file is paired with a training file and a data file that
//! are placed next to the program as `train` and `data` before it runs.

use tracing::warn;

use super::{matching_names, with_id, GatherContext, TestGroup};
use crate::error::GraderResult;
use crate::executor::{StagedFile, TestCase, Verifier};

const TRAIN_NAME: &str = "train";
const DATA_NAME: &str = "data";

#[derive(Clone, Debug, PartialEq)]
pub struct StagedScheme {
    pub train_prefix: String,
    pub data_prefix: String,
    pub ref_prefix: String,
    pub suffix: String,
}

impl Default for StagedScheme {
    fn default() -> Self {
        Self {
            train_prefix: "train.".to_string(),
            data_prefix: "data.".to_string(),
            ref_prefix: "ref.".to_string(),
            suffix: ".txt".to_string(),
        }
    }
}

impl StagedScheme {
    pub(super) fn discover(
        &self,
        group: &TestGroup,
        ctx: &GatherContext,
    ) -> GraderResult<Vec<TestCase>> {
        let train_prefix = with_id(&self.train_prefix, group.id());
        let data_prefix = with_id(&self.data_prefix, group.id());
        let ref_prefix = with_id(&self.ref_prefix, group.id());

        let mut cases = Vec::new();
        for ref_name in matching_names(&ctx.fixture_dir, &ref_prefix, &self.suffix)? {
            let stem = &ref_name[ref_prefix.len()..];

            let data_name = format!("{data_prefix}{stem}");
            let data = ctx.fixture_dir.join(&data_name);
            if !data.exists() {
                warn!("Missing data file {:?}", data_name);
                continue;
            }

            let train_name = format!("{train_prefix}{stem}");
            let train = ctx.fixture_dir.join(&train_name);
            if !train.exists() {
                warn!("Missing training file {:?}", train_name);
                continue;
            }

            let args = vec![ctx.program(), TRAIN_NAME.to_string(), DATA_NAME.to_string()];
            let reference = ctx.fixture_dir.join(&ref_name);
            let case = group.case(ctx, args, Verifier::reference_file(reference))?;
            cases.push(case.with_staged(vec![
                StagedFile::new(train, TRAIN_NAME, "training file"),
                StagedFile::new(data, DATA_NAME, "data file"),
            ]));
        }
        Ok(cases)
    }
}
