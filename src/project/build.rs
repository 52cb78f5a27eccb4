//! Build and helper command invocation

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{GraderError, GraderResult};

/// External command that builds a project in its build directory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Arguments of the cleaning run, made before a clean build
    pub clean_args: Vec<String>,
}

impl Default for BuildCommand {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            args: Vec::new(),
            clean_args: vec!["clean".to_string()],
        }
    }
}

impl BuildCommand {
    #[cfg(test)]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            clean_args: Vec::new(),
        }
    }

    pub async fn clean(&self, dir: &Path) -> GraderResult<String> {
        run_command(&self.program, &self.clean_args, dir).await
    }

    pub async fn build(&self, dir: &Path) -> GraderResult<String> {
        run_command(&self.program, &self.args, dir).await
    }
}

/// Run a command to completion in `dir` without a time limit.
///
/// Returns stdout followed by stderr. A nonzero exit, or a failure to start,
/// is an [`GraderError::ExternalCommand`] carrying that output.
pub async fn run_command(program: &str, args: &[String], dir: &Path) -> GraderResult<String> {
    debug!("Running {} {:?} in {:?}", program, args, dir);

    let output = match Command::new(program).args(args).current_dir(dir).output().await {
        Ok(output) => output,
        Err(e) => {
            return Err(GraderError::ExternalCommand {
                program: program.to_string(),
                args: args.to_vec(),
                code: -1,
                output: Some(e.to_string()),
            })
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if !text.is_empty() {
        debug!("Response\n{}", text);
    }

    if !output.status.success() {
        return Err(GraderError::ExternalCommand {
            program: program.to_string(),
            args: args.to_vec(),
            code: output.status.code().unwrap_or(-1),
            output: Some(text),
        });
    }
    Ok(text)
}
