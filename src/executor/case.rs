//! Test case lifecycle
//!
//! A [`TestCase`] is created by discovery. Preparing it stages fixture files
//! and loads its input, producing a [`PreparedTest`]; running that consumes
//! it and yields the [`TestResult`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::compare::Verifier;
use super::process::ProcessRunner;
use crate::error::{GraderError, GraderResult};
use crate::models::{Category, TestResult, TestSpec};
use crate::utils::timer::Timer;

const SANITIZERS: [&str; 5] = [
    "AddressSanitizer",
    "LeakSanitizer",
    "MemorySanitizer",
    "ThreadSanitizer",
    "UndefinedBehaviorSanitizer",
];

/// How a test's input reaches the subject
#[derive(Clone, Debug, Default, PartialEq)]
pub enum InputDelivery {
    #[default]
    None,
    /// Path passed on the command line; the subject opens it
    ArgumentFile(PathBuf),
    /// File contents written to the subject's stdin
    StdinFile(PathBuf),
}

impl InputDelivery {
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputDelivery::None => None,
            InputDelivery::ArgumentFile(path) | InputDelivery::StdinFile(path) => Some(path),
        }
    }
}

/// A fixture copied into the working directory before the run
#[derive(Clone, Debug, PartialEq)]
pub struct StagedFile {
    pub source: PathBuf,
    /// Name inside the working directory
    pub name: String,
    /// Comment label, e.g. `training file`
    pub label: String,
}

impl StagedFile {
    pub fn new(source: impl Into<PathBuf>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            label: label.into(),
        }
    }
}

/// Whether staging still attempts hard links
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StagingMode {
    #[default]
    Link,
    Copy,
}

/// Place `source` at `target`, linking while `mode` allows it.
///
/// Returns the mode to use for the next file: once a link fails every later
/// file is copied.
pub fn stage_file(source: &Path, target: &Path, mode: StagingMode) -> GraderResult<StagingMode> {
    let staging_error =
        |e| GraderError::test_io(format!("Unable to stage {:?}", source.display().to_string()), e);

    remove_existing(target).map_err(staging_error)?;

    if mode == StagingMode::Link {
        debug!("Linking {:?} to {:?}", source, target);
        match fs::hard_link(source, target) {
            Ok(()) => return Ok(StagingMode::Link),
            Err(e) => info!("Hard link failed, copying from now on: {e}"),
        }
    }

    debug!("Copying {:?} to {:?}", source, target);
    fs::copy(source, target).map_err(staging_error)?;
    Ok(StagingMode::Copy)
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// One discovered test, not yet prepared
#[derive(Clone, Debug)]
pub struct TestCase {
    spec: TestSpec,
    group: String,
    category: Category,
    weight: f64,
    input: InputDelivery,
    verifier: Verifier,
    staged: Vec<StagedFile>,
}

impl TestCase {
    pub fn new(
        spec: TestSpec,
        group: impl Into<String>,
        category: Category,
        weight: f64,
        verifier: Verifier,
    ) -> Self {
        Self {
            spec,
            group: group.into(),
            category,
            weight,
            input: InputDelivery::None,
            verifier,
            staged: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: InputDelivery) -> Self {
        self.input = input;
        self
    }

    pub fn with_staged(mut self, staged: Vec<StagedFile>) -> Self {
        self.staged = staged;
        self
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[cfg(test)]
    pub fn input(&self) -> &InputDelivery {
        &self.input
    }

    #[cfg(test)]
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    #[cfg(test)]
    pub fn staged(&self) -> &[StagedFile] {
        &self.staged
    }

    /// Stage fixtures and load input.
    ///
    /// `mode` is updated after every staged file, so a switch to copying
    /// outlives a later staging or input error.
    pub fn prepare(&self, mode: &mut StagingMode) -> GraderResult<PreparedTest<'_>> {
        debug!("Preparing {}: {:?}", self.group, self.spec.args());
        let mut comments = Vec::new();

        for file in &self.staged {
            let target = self.spec.dir().join(&file.name);
            *mode = stage_file(&file.source, &target, *mode)?;
            comments.push(format!(
                "{:<15}{:?}",
                format!("{}:", file.label),
                file.source.display().to_string()
            ));
        }

        let mut stdin = None;
        let mut input_text = None;
        match &self.input {
            InputDelivery::None => {}
            InputDelivery::ArgumentFile(path) => {
                let bytes = read_input(path, "Unable to open input file")?;
                input_text = Some(self.spec.encoding().decode(&bytes).trim_end().to_string());
            }
            InputDelivery::StdinFile(path) => {
                let bytes = read_input(path, "Unable to send input file")?;
                comments.push(format!("input file: {:?}", path.display().to_string()));
                input_text = Some(self.spec.encoding().decode(&bytes).trim_end().to_string());
                stdin = Some(bytes);
            }
        }

        Ok(PreparedTest {
            case: self,
            stdin,
            input_text,
            comments,
        })
    }
}

fn read_input(path: &Path, context: &str) -> GraderResult<Vec<u8>> {
    debug!("Opening input file {:?}", path);
    fs::read(path)
        .map_err(|e| GraderError::test_io(format!("{context} {:?}", path.display().to_string()), e))
}

/// A test whose fixtures are in place, ready to run once
#[derive(Debug)]
pub struct PreparedTest<'a> {
    case: &'a TestCase,
    stdin: Option<Vec<u8>>,
    input_text: Option<String>,
    comments: Vec<String>,
}

impl PreparedTest<'_> {
    /// Run the subject and classify the outcome
    pub async fn run(self) -> GraderResult<TestResult> {
        let case = self.case;
        let spec = &case.spec;
        let timer = Timer::start(&case.group);

        let runner = ProcessRunner::for_spec(spec);
        let raw = runner
            .run(spec.args(), spec.dir(), self.stdin)
            .await
            .map_err(|e| {
                GraderError::test_io(format!("Unable to run {:?}", spec.args()[0]), e)
            })?;

        let output = spec.encoding().decode(&raw.output);
        let mut comments = self.comments;

        let summary = if let Some(summary) = raw.outcome.summary() {
            Some(summary.to_string())
        } else if raw.exit_code == spec.expected_code() {
            let verdict = case.verifier.verify(&output, spec.limits())?;
            comments.extend(verdict.comments);
            (!verdict.correct).then(|| "incorrect output".to_string())
        } else {
            let mut summary = format!("unexpected return code: {}", raw.exit_code);
            if let Some(crash) = raw.pid.and_then(|pid| scan_sanitizer(pid, &output)) {
                if let Some(sanitizer) = crash.sanitizer {
                    summary = format!("terminated by {sanitizer}");
                }
                if let Some(line) = crash.summary {
                    comments = vec![line];
                }
            }
            Some(summary)
        };

        let success = summary.is_none();
        let duration = timer.stop();
        debug!(group = %case.group, success, "test complete");

        Ok(TestResult {
            group: case.group.clone(),
            category: case.category,
            args: spec.args().to_vec(),
            outcome: raw.outcome,
            exit_code: raw.exit_code,
            success,
            credit: if success { case.weight } else { 0.0 },
            summary,
            comments,
            output,
            input_file: case.input.path().map(Path::to_path_buf),
            input: self.input_text,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

#[derive(Debug, PartialEq)]
struct SanitizerCrash {
    sanitizer: Option<&'static str>,
    summary: Option<String>,
}

/// Look for a sanitizer report written by process `pid`
fn scan_sanitizer(pid: u32, output: &str) -> Option<SanitizerCrash> {
    let marker = format!("=={pid}==");
    debug!("Checking for {:?}", marker);

    let mut lines = output.split('\n');
    let header = lines.by_ref().find(|line| line.starts_with(&marker))?;
    let sanitizer = SANITIZERS.into_iter().find(|name| header.contains(name));
    let summary = lines
        .find(|line| line.starts_with("SUMMARY:"))
        .map(|line| line.trim_end().to_string());

    Some(SanitizerCrash { sanitizer, summary })
}
