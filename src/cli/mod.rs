//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::utils::logger::LogLevel;

/// Build and test student programs against fixture files
#[derive(Parser, Debug)]
#[command(name = "autograder")]
#[command(version)]
#[command(about = "Build and grade programming assignments")]
#[command(long_about = None)]
pub struct Args {
    /// Projects or project:group pairs to test (default: all)
    #[arg(value_name = "PROGRAM")]
    pub program: Vec<String>,

    /// Stop after the first failure
    #[arg(short = '1', long)]
    pub stop: bool,

    /// Print more information (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print less information (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Create the build directory and stop
    #[arg(short, long)]
    pub init: bool,

    /// Delete the build directory before building
    #[arg(short, long)]
    pub fresh: bool,

    /// Run the clean target before building
    #[arg(long)]
    pub clean: bool,

    /// Source directory
    #[arg(short, long, value_name = "DIR")]
    pub src: Option<PathBuf>,

    /// Build directory
    #[arg(short, long, value_name = "DIR")]
    pub build: Option<PathBuf>,

    /// Grade the contents of a tar archive
    #[arg(short, long, value_name = "TAR")]
    pub archive: Option<PathBuf>,

    /// Print debugging log records
    #[arg(short, long)]
    pub debug: bool,

    /// Assignment file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Summary format (table, json, json-pretty, csv)
    #[arg(long)]
    pub format: Option<String>,

    /// Print status lines instead of a progress bar
    #[arg(long)]
    pub no_bar: bool,

    /// Append log records to a file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// List the tests that would run and exit
    #[arg(short, long)]
    pub list: bool,

    /// Write an example assignment file and exit
    #[arg(long, value_name = "FILE")]
    pub write_example: Option<PathBuf>,

    /// Describe the environment variables and exit
    #[arg(long)]
    pub env_help: bool,
}

impl Args {
    /// Listing detail: 0 by default, raised by -v and --stop, lowered by -q
    pub fn verbosity(&self) -> i32 {
        i32::from(self.verbose) - i32::from(self.quiet) + i32::from(self.stop)
    }

    /// Level forced by `--debug`, if any
    pub fn log_level(&self) -> Option<LogLevel> {
        self.debug.then_some(LogLevel::Debug)
    }
}
