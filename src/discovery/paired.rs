//! Paired input/reference fixtures

use tracing::warn;

use super::{matching_names, path_arg, with_id, GatherContext, TestGroup};
use crate::error::GraderResult;
use crate::executor::{InputDelivery, TestCase, Verifier};

/// Reference files `<ref_prefix><n><suffix>` matched with input files
/// `<arg_prefix><n><suffix>`. Both prefixes gain `<id>.` for a group with an
/// id.
#[derive(Clone, Debug, PartialEq)]
pub struct PairedScheme {
    pub arg_prefix: String,
    pub ref_prefix: String,
    pub suffix: String,
    /// Pipe the input file to stdin instead of naming it on the command line
    pub stdin: bool,
}

impl Default for PairedScheme {
    fn default() -> Self {
        Self {
            arg_prefix: "test.".to_string(),
            ref_prefix: "ref.".to_string(),
            suffix: ".txt".to_string(),
            stdin: false,
        }
    }
}

impl PairedScheme {
    pub fn with_stdin(mut self) -> Self {
        self.stdin = true;
        self
    }

    pub(super) fn discover(
        &self,
        group: &TestGroup,
        ctx: &GatherContext,
    ) -> GraderResult<Vec<TestCase>> {
        let arg_prefix = with_id(&self.arg_prefix, group.id());
        let ref_prefix = with_id(&self.ref_prefix, group.id());

        let mut cases = Vec::new();
        for ref_name in matching_names(&ctx.fixture_dir, &ref_prefix, &self.suffix)? {
            let arg_name = format!("{arg_prefix}{}", &ref_name[ref_prefix.len()..]);
            let input = ctx.fixture_dir.join(&arg_name);
            if !input.exists() {
                warn!("Unmatched reference file: {:?}", ref_name);
                continue;
            }

            let reference = ctx.fixture_dir.join(&ref_name);
            let (args, delivery) = if self.stdin {
                (vec![ctx.program()], InputDelivery::StdinFile(input))
            } else {
                (
                    vec![ctx.program(), path_arg(&input)],
                    InputDelivery::ArgumentFile(input),
                )
            };

            let case = group.case(ctx, args, Verifier::reference_file(reference))?;
            cases.push(case.with_input(delivery));
        }
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Discovery;
    use crate::models::{Category, Limits};
    use std::fs;
    use std::path::Path;

    fn context(fixtures: &Path) -> GatherContext {
        GatherContext {
            project: "pal".into(),
            prog: "pal".into(),
            build_dir: "/build/pal".into(),
            fixture_dir: fixtures.to_path_buf(),
            limits: Limits::default(),
        }
    }

    fn group(id: &str, scheme: PairedScheme) -> TestGroup {
        TestGroup::new(id, 1.0, Category::Regular, Discovery::Paired(scheme)).unwrap()
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "x\n").unwrap();
        }
    }

    #[test]
    fn test_unmatched_reference_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["ref.1.txt", "ref.2.txt", "test.1.txt"]);

        let cases = group("", PairedScheme::default())
            .discover(&context(dir.path()))
            .unwrap();

        assert_eq!(cases.len(), 1);
        let input = dir.path().join("test.1.txt");
        assert_eq!(cases[0].spec().args(), ["./pal".to_string(), path_arg(&input)]);
        assert_eq!(cases[0].input(), &InputDelivery::ArgumentFile(input));
        assert_eq!(
            cases[0].verifier().reference_path(),
            Some(dir.path().join("ref.1.txt").as_path())
        );
    }

    #[test]
    fn test_order_is_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "ref.10.txt",
                "test.10.txt",
                "ref.2.txt",
                "test.2.txt",
                "ref.1.txt",
                "test.1.txt",
                "notes.txt",
            ],
        );

        let cases = group("", PairedScheme::default())
            .discover(&context(dir.path()))
            .unwrap();
        let refs: Vec<_> = cases
            .iter()
            .map(|c| {
                c.verifier()
                    .reference_path()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(refs, vec!["ref.1.txt", "ref.10.txt", "ref.2.txt"]);
    }

    #[test]
    fn test_group_id_extends_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["ref.1.txt", "test.1.txt", "ref.x.1.txt", "test.x.1.txt"]);

        let cases = group("x", PairedScheme::default())
            .discover(&context(dir.path()))
            .unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].group(), "pal:x");
    }

    #[test]
    fn test_stdin_variant() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["ref.1.txt", "test.1.txt"]);

        let cases = group("", PairedScheme::default().with_stdin())
            .discover(&context(dir.path()))
            .unwrap();
        assert_eq!(cases[0].spec().args(), ["./pal"]);
        assert_eq!(
            cases[0].input(),
            &InputDelivery::StdinFile(dir.path().join("test.1.txt"))
        );
    }
}
