//! Test discovery
//!
//! Each [`TestGroup`] names a fixture convention ([`Discovery`]) that turns
//! the files of a fixture directory into [`TestCase`]s.

mod paired;
mod staged;
mod transcript;

pub use paired::PairedScheme;
pub use staged::StagedScheme;
pub use transcript::TranscriptScheme;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GraderError, GraderResult};
use crate::executor::{TestCase, Verifier};
use crate::models::{Category, LimitOverrides, Limits, TestSpec};

/// Fixture naming convention of a group
#[derive(Clone, Debug, PartialEq)]
pub enum Discovery {
    /// One file of alternating argument / expected-line pairs
    Transcript(TranscriptScheme),
    /// `test.<n>` input files matched with `ref.<n>` reference files
    Paired(PairedScheme),
    /// `train.<n>` and `data.<n>` staged next to the program
    Staged(StagedScheme),
}

impl Discovery {
    /// Same convention with default file names
    pub fn with_default_names(&self) -> Self {
        match self {
            Discovery::Transcript(_) => Discovery::Transcript(TranscriptScheme::default()),
            Discovery::Paired(scheme) => Discovery::Paired(PairedScheme {
                stdin: scheme.stdin,
                ..PairedScheme::default()
            }),
            Discovery::Staged(_) => Discovery::Staged(StagedScheme::default()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Discovery::Transcript(_) => "transcript",
            Discovery::Paired(scheme) if scheme.stdin => "paired_stdin",
            Discovery::Paired(_) => "paired",
            Discovery::Staged(_) => "staged",
        }
    }
}

/// Where and for whom a group gathers its tests
#[derive(Clone, Debug)]
pub struct GatherContext {
    pub project: String,
    pub prog: String,
    pub build_dir: PathBuf,
    /// Directory holding this group's fixtures
    pub fixture_dir: PathBuf,
    pub limits: Limits,
}

impl GatherContext {
    /// Command path of the subject, relative to the build directory
    pub fn program(&self) -> String {
        format!("./{}", self.prog)
    }
}

/// A named bundle of tests sharing discovery rules, weight and category
#[derive(Clone, Debug)]
pub struct TestGroup {
    id: String,
    name: String,
    weight: f64,
    category: Category,
    discovery: Discovery,
    limits: LimitOverrides,
}

impl TestGroup {
    /// Create a group; the weight must be finite and not negative
    pub fn new(
        id: impl Into<String>,
        weight: f64,
        category: Category,
        discovery: Discovery,
    ) -> GraderResult<Self> {
        let id = id.into();
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraderError::config(format!(
                "invalid weight {weight} for test group {id:?}"
            )));
        }
        Ok(Self {
            name: id.clone(),
            id,
            weight,
            category,
            discovery,
            limits: LimitOverrides::default(),
        })
    }

    /// Display name; an empty name keeps the id
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    pub fn with_limits(mut self, limits: LimitOverrides) -> Self {
        self.limits = limits;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Report label: `project:name`, or just `project` for an unnamed group
    pub fn label(&self, project: &str) -> String {
        if self.name.is_empty() {
            project.to_string()
        } else {
            format!("{project}:{}", self.name)
        }
    }

    /// Enumerate this group's tests under `ctx`
    pub fn discover(&self, ctx: &GatherContext) -> GraderResult<Vec<TestCase>> {
        let found = match &self.discovery {
            Discovery::Transcript(scheme) => scheme.discover(self, ctx)?,
            Discovery::Paired(scheme) => scheme.discover(self, ctx)?,
            Discovery::Staged(scheme) => scheme.discover(self, ctx)?,
        };
        debug!(
            "{} {} tests in group {}",
            found.len(),
            self.discovery.kind(),
            self.label(&ctx.project)
        );
        Ok(found)
    }

    fn limits(&self, ctx: &GatherContext) -> Limits {
        self.limits.apply(&ctx.limits)
    }

    /// Build a test case for `args` with this group's settings
    fn case(
        &self,
        ctx: &GatherContext,
        args: Vec<String>,
        verifier: Verifier,
    ) -> GraderResult<TestCase> {
        let spec = TestSpec::new(args, &ctx.build_dir, self.limits(ctx))?;
        Ok(TestCase::new(
            spec,
            self.label(&ctx.project),
            self.category,
            self.weight,
            verifier,
        ))
    }
}

/// `prefix` extended with `<id>.` when the group has an id
fn with_id(prefix: &str, id: &str) -> String {
    if id.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}{id}.")
    }
}

/// Names in `dir` starting with `prefix` and ending with `suffix`, sorted
fn matching_names(dir: &Path, prefix: &str, suffix: &str) -> GraderResult<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        GraderError::config(format!("unable to list {:?}: {e}", dir.display().to_string()))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            GraderError::config(format!("unable to list {:?}: {e}", dir.display().to_string()))
        })?;
        if let Some(name) = entry.file_name().to_str() {
            let fits = name.len() >= prefix.len() + suffix.len();
            if fits && name.starts_with(prefix) && name.ends_with(suffix) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
