//! autograder - build and grade programming assignments
//!
//! Builds each submitted program with its Makefile, runs it against the
//! fixture files of the assignment under time and output limits, compares
//! the output and totals weighted scores per category.
//!
//! ## Usage
//!
//! ```bash
//! # Grade every project of the assignment in ./autograder.yaml
//! autograder
//!
//! # Grade one project, then one group of another, stopping at the first failure
//! autograder -1 roman pal:x
//!
//! # Grade a submitted archive with full listings
//! autograder -v --archive submission.tar
//!
//! # Machine-readable summary
//! autograder --format json --no-bar
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::TempDir;
use tracing::{debug, info, warn};

mod cli;
mod config;
mod discovery;
mod error;
mod executor;
mod models;
mod orchestrator;
mod output;
mod project;
mod utils;

use cli::Args;
use config::{AssignmentFile, EnvConfig};
use error::GraderError;
use orchestrator::{Orchestrator, Roots, RunOptions};
use output::{ConsoleReporter, Detail, OutputFormat, ResultFormatter};
use project::{run_command, Assignment};

#[tokio::main]
async fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("{info}");
        eprintln!("grader: internal error");
    }));

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

/// Configuration and I/O errors are shown to the user, anything else only
/// reaches the log
fn report_failure(err: &anyhow::Error) {
    match err.downcast_ref::<GraderError>() {
        Some(e) if e.is_internal() => {
            tracing::error!("{err:?}");
            eprintln!("grader: internal error");
        }
        Some(e) => eprintln!("{}", e.report("grader")),
        None => eprintln!("grader: {err:#}"),
    }
}

async fn run(args: Args) -> Result<()> {
    if args.env_help {
        println!("{}", config::env_help());
        return Ok(());
    }

    if let Some(path) = &args.write_example {
        AssignmentFile::example().save(path)?;
        println!("Example assignment written to {}", path.display());
        return Ok(());
    }

    let env = EnvConfig::load();
    let log_file = args.log_file.clone().or_else(|| env.log_file.clone());
    let log_level = args.log_level().or(env.log_level).unwrap_or_default();
    utils::logger::init_logger(log_level, log_file.as_deref())?;
    if env.has_any() {
        debug!("Environment overrides: {:?}", env);
    }

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.clone())
        .or_else(AssignmentFile::find)
        .ok_or_else(|| GraderError::config("no assignment file found (use --config)"))?;
    info!("Loading assignment from {}", config_path.display());

    let mut file = AssignmentFile::load(&config_path)?;
    file.limits = env.apply_limits(&file.limits);
    file.limits.validate()?;

    let format_name = args.format.clone().unwrap_or_else(|| env.format_or("table"));
    let format = OutputFormat::from_str(&format_name)
        .ok_or_else(|| GraderError::config(format!("unknown output format {format_name:?}")))?;
    let show_bar =
        !(args.no_bar || env.no_bar.unwrap_or(false)) && std::io::stderr().is_terminal();

    let formatter =
        ResultFormatter::new(format).with_detail(Detail::from_verbosity(args.verbosity()));
    let mut reporter = ConsoleReporter::new(formatter, show_bar);
    reporter.banner(&file.name, &file.release);

    // Held until grading is done; the archive contents are removed on drop
    let workspace = match &args.archive {
        Some(archive) => Some(unpack_archive(archive, &file, &mut reporter).await?),
        None => None,
    };

    let data = env
        .data_dir
        .clone()
        .unwrap_or_else(|| file.data_root(Some(&config_path)));
    let roots = match &workspace {
        Some(dir) => Roots {
            src: dir.path().join(&file.src_subdir),
            build: dir.path().join(&file.build_subdir),
            data,
        },
        None => Roots {
            src: args.src.clone().unwrap_or_else(|| PathBuf::from(&file.src_subdir)),
            build: args
                .build
                .clone()
                .unwrap_or_else(|| PathBuf::from(&file.build_subdir)),
            data,
        },
    };
    let roots = absolute_roots(roots)?;
    debug!("Roots: {:?}", roots);
    roots.check_source()?;

    if args.fresh && roots.build.exists() {
        info!("Removing {}", roots.build.display());
        std::fs::remove_dir_all(&roots.build)
            .with_context(|| format!("Failed to remove {}", roots.build.display()))?;
    }

    let mut assignment = file.assignment()?;
    let mut orchestrator = Orchestrator::new(&file.name).with_options(RunOptions {
        fail_fast: args.stop,
        init_only: args.init,
        clean: args.clean,
        requests: args.program.iter().cloned().collect(),
    });

    if args.list {
        orchestrator.gather(&mut assignment, &roots, &mut reporter)?;
        list_tests(&assignment);
        return Ok(());
    }

    // Personal tests and failed tests never change the exit status
    orchestrator
        .run(&mut assignment, &roots, &mut reporter)
        .await?;

    Ok(())
}

/// Extract `archive` into a temporary directory laid out like a working
/// directory
async fn unpack_archive(
    archive: &Path,
    file: &AssignmentFile,
    reporter: &mut ConsoleReporter,
) -> Result<TempDir> {
    let archive = std::fs::canonicalize(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let dir = tempfile::Builder::new()
        .prefix("autograder.")
        .tempdir()
        .context("Failed to create temporary directory")?;
    info!("Extracting {} into {}", archive.display(), dir.path().display());

    let tar_args = vec!["-xf".to_string(), archive.to_string_lossy().into_owned()];
    run_command("tar", &tar_args, dir.path()).await?;

    if !dir.path().join(&file.src_subdir).is_dir() {
        return Err(GraderError::config(format!(
            "archive does not contain directory {:?}",
            file.src_subdir
        ))
        .into());
    }

    let build = dir.path().join(&file.build_subdir);
    if build.exists() {
        warn!("Archive contains {:?}", file.build_subdir);
        reporter.message(&format!(
            "Archive contains {:?}; removing it.",
            file.build_subdir
        ));
        std::fs::remove_dir_all(&build)
            .with_context(|| format!("Failed to remove {}", build.display()))?;
    }

    Ok(dir)
}

fn absolute_roots(roots: Roots) -> Result<Roots> {
    let absolute = |path: PathBuf| {
        std::path::absolute(&path).with_context(|| format!("Invalid path {}", path.display()))
    };
    Ok(Roots {
        src: absolute(roots.src)?,
        build: absolute(roots.build)?,
        data: absolute(roots.data)?,
    })
}

fn list_tests(assignment: &Assignment) {
    for project in assignment.projects() {
        for case in project.gathered() {
            println!("{:<16} {}", case.group(), case.spec().args().join(" "));
        }
    }
}
