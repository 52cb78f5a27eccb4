//! Grading orchestration
//!
//! Drives one run over an [`Assignment`]: gather, prepare the build
//! directories, build, run every test in order, then total the scores.

mod event;

pub use event::{Event, Progress, Reporter};

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{GraderError, GraderResult};
use crate::executor::{StagingMode, TestCase};
use crate::models::{RunEnd, RunSummary, ScoreTable, TestResult};
use crate::project::{Assignment, Gathered};

/// Source, build and data roots of a run
#[derive(Clone, Debug, PartialEq)]
pub struct Roots {
    pub src: PathBuf,
    pub build: PathBuf,
    pub data: PathBuf,
}

impl Roots {
    /// The source root must exist; a missing project directory below it
    /// only skips that project
    pub fn check_source(&self) -> GraderResult<()> {
        if self.src.is_dir() {
            Ok(())
        } else {
            Err(GraderError::config(format!(
                "invalid src directory: {:?}",
                self.src.display().to_string()
            )))
        }
    }
}

/// Options controlling a run
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Stop at the first build error or failed test
    pub fail_fast: bool,
    /// Prepare build directories, then stop
    pub init_only: bool,
    /// Clean before building
    pub clean: bool,
    /// `project` or `project:group` names; empty selects everything
    pub requests: HashSet<String>,
}

/// Runs an assignment's tests and accumulates its scores
#[derive(Debug)]
pub struct Orchestrator {
    title: String,
    options: RunOptions,
    staging: StagingMode,
}

impl Orchestrator {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            options: RunOptions::default(),
            staging: StagingMode::Link,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind `roots` and discover the requested tests; returns their count
    pub fn gather(
        &self,
        assignment: &mut Assignment,
        roots: &Roots,
        reporter: &mut dyn Reporter,
    ) -> GraderResult<usize> {
        debug!("gather phase");
        roots.check_source()?;
        assignment.set_context(&roots.src, &roots.build, &roots.data);

        let mut total = 0;
        for project in assignment.projects_mut() {
            let gathered = project.gather(&self.options.requests)?;
            if gathered == Gathered::NoSource {
                reporter.report(Event::Notice(&format!(
                    "No source found for {}",
                    project.name()
                )));
            }
            total += gathered.count();
        }

        info!("Total tests: {}", total);
        Ok(total)
    }

    /// Perform a full run
    pub async fn run(
        &mut self,
        assignment: &mut Assignment,
        roots: &Roots,
        reporter: &mut dyn Reporter,
    ) -> GraderResult<RunSummary> {
        let started_at = Utc::now();
        let mut progress = Progress {
            requested: self.gather(assignment, roots, reporter)?,
            ..Progress::default()
        };
        let mut scores = ScoreTable::new();

        if progress.requested < 1 {
            reporter.report(Event::Notice("No tests requested."));
            let summary = self.summary(progress, scores, started_at, RunEnd::NothingRequested);
            return Ok(finish(summary, reporter));
        }

        debug!("build_dir prep phase");
        for project in assignment.projects() {
            project.prepare_build_dir()?;
        }

        if self.options.init_only {
            let summary = self.summary(progress, scores, started_at, RunEnd::InitOnly);
            return Ok(finish(summary, reporter));
        }

        debug!("build phase");
        progress.errors += self.build(assignment, reporter).await?;

        if self.options.fail_fast && progress.errors > 0 {
            reporter.report(Event::Notice("grader: abort."));
            let summary = self.summary(progress, scores, started_at, RunEnd::Aborted);
            return Ok(finish(summary, reporter));
        }

        debug!("test phase");
        for case in assignment.tests() {
            scores.add_points(case.category(), case.group(), case.weight());
            reporter.report(Event::Progress(progress));

            let (success, credit) = match self.run_test(case).await {
                Ok(result) => {
                    progress.completed += 1;
                    debug!("{result}");
                    reporter.report(Event::TestFinished(&result));
                    (result.success, result.credit)
                }
                Err(error) if error.is_internal() => return Err(error),
                Err(error) => {
                    progress.errors += 1;
                    warn!("{}: {}", case.group(), error);
                    reporter.report(Event::TestErrored {
                        group: case.group(),
                        error: &error,
                    });
                    (false, 0.0)
                }
            };

            if !success {
                progress.failures += 1;
                scores.add_failure(case.category(), case.group());
                if self.options.fail_fast {
                    reporter.report(Event::Notice(&format!(
                        "grader: aborting. Completed {} of {}.",
                        progress.completed, progress.requested
                    )));
                    let summary = self.summary(progress, scores, started_at, RunEnd::Aborted);
                    return Ok(finish(summary, reporter));
                }
            }

            scores.add_score(case.category(), case.group(), credit);
        }

        debug!("report phase");
        let summary = self.summary(progress, scores, started_at, RunEnd::Completed);
        Ok(finish(summary, reporter))
    }

    /// Build every project that has tests; returns the number of failures
    async fn build(
        &self,
        assignment: &mut Assignment,
        reporter: &mut dyn Reporter,
    ) -> GraderResult<usize> {
        let mut errors = 0;
        for project in assignment.projects_mut() {
            if project.gathered().is_empty() {
                continue;
            }
            reporter.report(Event::Building {
                project: project.name(),
            });

            match project.build(self.options.clean).await {
                Ok(()) => {}
                Err(error) if error.is_internal() => return Err(error),
                Err(error) => {
                    errors += 1;
                    warn!("Build of {} failed: {}", project.name(), error);
                    reporter.report(Event::BuildFailed {
                        project: project.name(),
                        error: &error,
                    });
                }
            }
        }
        Ok(errors)
    }

    async fn run_test(&mut self, case: &TestCase) -> GraderResult<TestResult> {
        case.prepare(&mut self.staging)?.run().await
    }

    fn summary(
        &self,
        progress: Progress,
        scores: ScoreTable,
        started_at: DateTime<Utc>,
        end: RunEnd,
    ) -> RunSummary {
        RunSummary {
            assignment: self.title.clone(),
            requested: progress.requested,
            completed: progress.completed,
            failures: progress.failures,
            errors: progress.errors,
            end,
            started_at,
            finished_at: Utc::now(),
            scores,
        }
    }
}

/// Hand the summary to the reporter; every run ends with exactly one
fn finish(summary: RunSummary, reporter: &mut dyn Reporter) -> RunSummary {
    info!(
        "Run {:?}: completed {} of {} tests, {} failed, {} errors",
        summary.end, summary.completed, summary.requested, summary.failures, summary.errors
    );
    reporter.report(Event::Finished(&summary));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Discovery, PairedScheme, TestGroup, TranscriptScheme};
    use crate::executor::{StagedFile, Verifier};
    use crate::models::{Category, Limits, TestSpec};
    use crate::project::{BuildCommand, MultiProject, Project};
    use std::fs;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl Reporter for Recorder {
        fn report(&mut self, event: Event<'_>) {
            let line = match event {
                Event::Notice(message) => message.to_string(),
                Event::BuildFailed { project, .. } => format!("build failed: {project}"),
                Event::TestErrored { group, .. } => format!("error: {group}"),
                Event::TestFinished(result) => format!("{}: {}", result.group, result.success),
                Event::Finished(_) => "finished".to_string(),
                Event::Building { .. } | Event::Progress(_) => return,
            };
            self.lines.push(line);
        }
    }

    /// Source, data and build roots with a transcript fixture
    fn layout(transcript: &str) -> (tempfile::TempDir, Roots) {
        let root = tempfile::tempdir().unwrap();
        let roots = Roots {
            src: root.path().join("src"),
            build: root.path().join("build"),
            data: root.path().join("data"),
        };
        fs::create_dir_all(&roots.src).unwrap();
        fs::create_dir_all(&roots.data).unwrap();
        fs::write(roots.data.join("tests.txt"), transcript).unwrap();
        (root, roots)
    }

    /// A build that writes a subject printing `line`
    fn builder(line: &str) -> BuildCommand {
        let script = format!("printf '#!/bin/sh\\necho {line}\\n' > roman && chmod +x roman");
        BuildCommand::new("/bin/sh", vec!["-c".to_string(), script])
    }

    fn roman(build: BuildCommand) -> Assignment {
        let group = TestGroup::new(
            "",
            1.0,
            Category::Regular,
            Discovery::Transcript(TranscriptScheme::default()),
        )
        .unwrap();
        let project = Project::new("roman", vec![group])
            .unwrap()
            .with_build_command(build);
        Assignment::Single(project)
    }

    #[tokio::test]
    async fn test_full_run_scores_groups() {
        let (_root, roots) = layout("14\nXIV\n9\nIX\n");
        let mut assignment = roman(builder("XIV"));
        let mut recorder = Recorder::default();

        let summary = Orchestrator::new("PA1")
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.assignment, "PA1");
        assert_eq!(summary.requested, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.end, RunEnd::Completed);

        let tally = summary.scores.group(Category::Regular, "roman").unwrap();
        assert_eq!(tally.points, 2.0);
        assert_eq!(tally.score, 1.0);
        assert_eq!(tally.failures, 1);

        assert_eq!(recorder.lines, vec!["roman: true", "roman: false", "finished"]);
        assert!(roots.build.join("Makefile").exists());
    }

    #[tokio::test]
    async fn test_failed_build_runs_nothing() {
        let (_root, roots) = layout("14\nXIV\n");
        let failing = BuildCommand::new("/bin/sh", vec!["-c".into(), "exit 2".into()]);
        let mut assignment = roman(failing);
        let mut recorder = Recorder::default();

        let summary = Orchestrator::new("PA1")
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.requested, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.errors, 1);
        assert!(summary.scores.is_empty());
        assert_eq!(recorder.lines, vec!["build failed: roman", "finished"]);
    }

    #[tokio::test]
    async fn test_fail_fast_after_build_error() {
        let (_root, roots) = layout("14\nXIV\n");
        let failing = BuildCommand::new("/bin/sh", vec!["-c".into(), "exit 2".into()]);
        let mut assignment = roman(failing);
        let mut recorder = Recorder::default();

        let options = RunOptions {
            fail_fast: true,
            ..RunOptions::default()
        };
        let summary = Orchestrator::new("PA1")
            .with_options(options)
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.end, RunEnd::Aborted);
        assert_eq!(
            recorder.lines,
            vec!["build failed: roman", "grader: abort.", "finished"]
        );
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let (_root, roots) = layout("9\nIX\n14\nXIV\n");
        let mut assignment = roman(builder("XIV"));
        let mut recorder = Recorder::default();

        let options = RunOptions {
            fail_fast: true,
            ..RunOptions::default()
        };
        let summary = Orchestrator::new("PA1")
            .with_options(options)
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.end, RunEnd::Aborted);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(
            recorder.lines,
            vec![
                "roman: false",
                "grader: aborting. Completed 1 of 2.",
                "finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_requested() {
        let (_root, roots) = layout("14\nXIV\n");
        let mut assignment = roman(builder("XIV"));
        let mut recorder = Recorder::default();

        let options = RunOptions {
            requests: HashSet::from(["pal".to_string()]),
            ..RunOptions::default()
        };
        let summary = Orchestrator::new("PA1")
            .with_options(options)
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.requested, 0);
        assert_eq!(summary.end, RunEnd::NothingRequested);
        assert_eq!(recorder.lines, vec!["No tests requested.", "finished"]);
        assert!(!roots.build.exists());
    }

    #[tokio::test]
    async fn test_init_only_prepares_build_dir() {
        let (_root, roots) = layout("14\nXIV\n");
        let mut assignment = roman(builder("XIV"));

        let options = RunOptions {
            init_only: true,
            ..RunOptions::default()
        };
        let mut recorder = Recorder::default();
        let summary = Orchestrator::new("PA1")
            .with_options(options)
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.completed, 0);
        assert_eq!(summary.end, RunEnd::InitOnly);
        assert_eq!(recorder.lines, vec!["finished"]);
        assert!(roots.build.join("Makefile").exists());
        assert!(!roots.build.join("roman").exists());
    }

    #[tokio::test]
    async fn test_missing_fixture_counts_as_error() {
        let (_root, roots) = layout("");
        fs::write(roots.data.join("ref.1.txt"), "x\n").unwrap();
        fs::write(roots.data.join("test.1.txt"), "x\n").unwrap();
        fs::write(roots.data.join("ref.2.txt"), "x\n").unwrap();
        fs::write(roots.data.join("test.2.txt"), "x\n").unwrap();

        let group = TestGroup::new(
            "",
            2.0,
            Category::Regular,
            Discovery::Paired(PairedScheme::default().with_stdin()),
        )
        .unwrap();
        // The build removes one reference after discovery
        let script = "printf '#!/bin/sh\\ncat\\n' > cat && chmod +x cat && rm ../data/ref.1.txt";
        let project = Project::new("cat", vec![group])
            .unwrap()
            .with_build_command(BuildCommand::new("/bin/sh", vec!["-c".into(), script.into()]));
        let mut assignment = Assignment::Single(project);
        let mut recorder = Recorder::default();

        let summary = Orchestrator::new("PA0")
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap();

        assert_eq!(summary.requested, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures, 1);
        let tally = summary.scores.group(Category::Regular, "cat").unwrap();
        assert_eq!(tally.points, 4.0);
        assert_eq!(tally.score, 2.0);
        assert_eq!(recorder.lines, vec!["error: cat", "cat: true", "finished"]);
    }

    #[tokio::test]
    async fn test_missing_source_root_is_fatal() {
        let (root, mut roots) = layout("14\nXIV\n");
        roots.src = root.path().join("absent");
        let mut assignment = roman(builder("XIV"));
        let mut recorder = Recorder::default();

        let err = Orchestrator::new("PA1")
            .run(&mut assignment, &roots, &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, GraderError::Configuration(_)));
        assert!(err.to_string().starts_with("invalid src directory: "));
        assert!(recorder.lines.is_empty());
        assert!(!roots.build.exists());
    }

    #[test]
    fn test_gather_reports_missing_project_source() {
        let (_root, roots) = layout("");
        fs::create_dir_all(roots.src.join("roman")).unwrap();
        fs::create_dir_all(roots.data.join("roman")).unwrap();
        fs::write(roots.data.join("roman/tests.txt"), "14\nXIV\n").unwrap();

        let transcript = || {
            TestGroup::new(
                "",
                1.0,
                Category::Regular,
                Discovery::Transcript(TranscriptScheme::default()),
            )
            .unwrap()
        };
        let projects = vec![
            Project::new("roman", vec![transcript()]).unwrap(),
            Project::new("pal", vec![transcript()]).unwrap(),
        ];
        let mut assignment = Assignment::Multi(MultiProject::new(projects).unwrap());
        let mut recorder = Recorder::default();

        let count = Orchestrator::new("PA1")
            .gather(&mut assignment, &roots, &mut recorder)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(recorder.lines, vec!["No source found for pal"]);
    }

    #[tokio::test]
    async fn test_copy_mode_is_kept_after_staging_error() {
        let (_root, roots) = layout("");
        let case = TestCase::new(
            TestSpec::new(vec!["./sum".into()], &roots.build, Limits::default()).unwrap(),
            "sum",
            Category::Regular,
            1.0,
            Verifier::first_line("0"),
        )
        .with_staged(vec![
            StagedFile::new("/proc/version", "train", "training file"),
            StagedFile::new(roots.data.join("absent.txt"), "data", "data file"),
        ]);
        fs::create_dir_all(&roots.build).unwrap();

        let mut orchestrator = Orchestrator::new("PA1");
        let err = orchestrator.run_test(&case).await.unwrap_err();

        assert!(matches!(err, GraderError::TestIo { .. }));
        assert_eq!(orchestrator.staging, StagingMode::Copy);
    }
}
