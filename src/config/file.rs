//! Assignment file management
//!
//! Handles finding, loading, and validating assignment files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{GroupConfig, ProjectConfig, SchemeKind};
use crate::error::{GraderError, GraderResult};
use crate::models::{Category, Limits};
use crate::project::{Assignment, BuildCommand, MultiProject};

/// Assignment file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./autograder.yaml",
    "./autograder.yml",
    "./autograder.json",
    "./.autograder/config.yaml",
    "~/.config/autograder/config.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1"];

/// Full assignment file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentFile {
    /// Version of the file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Assignment name shown in the banner
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_release")]
    pub release: String,

    /// Source subdirectory of the working directory
    #[serde(default = "default_src_subdir")]
    pub src_subdir: String,

    /// Build subdirectory of the working directory
    #[serde(default = "default_build_subdir")]
    pub build_subdir: String,

    /// Fixture directory, relative to the assignment file
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Limits shared by every project
    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub build: BuildCommand,

    /// Lay projects out in subdirectories even when there is only one
    #[serde(default)]
    pub multi: bool,

    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_name() -> String {
    "Assignment".to_string()
}

fn default_release() -> String {
    "1".to_string()
}

fn default_src_subdir() -> String {
    "src".to_string()
}

fn default_build_subdir() -> String {
    "build".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for AssignmentFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: default_name(),
            release: default_release(),
            src_subdir: default_src_subdir(),
            build_subdir: default_build_subdir(),
            data_dir: default_data_dir(),
            limits: Limits::default(),
            build: BuildCommand::default(),
            multi: false,
            projects: Vec::new(),
        }
    }
}

impl AssignmentFile {
    /// Find assignment file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load assignment from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read assignment file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML assignment: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON assignment: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid assignment file: {}", path.display()))?;
        Ok(config)
    }

    /// Save assignment to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize assignment")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize assignment")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write assignment file: {}", path.display()))?;

        Ok(())
    }

    /// Validate the assignment
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported assignment file version: {}", self.version);
        }

        if self.projects.is_empty() {
            anyhow::bail!("No projects defined");
        }

        self.limits.validate()?;

        let mut names = HashSet::new();
        for project in &self.projects {
            if !names.insert(project.name.as_str()) {
                anyhow::bail!("Duplicate project name '{}'", project.name);
            }

            let mut ids = HashSet::new();
            for group in &project.groups {
                if !ids.insert(group.id.as_str()) {
                    anyhow::bail!(
                        "Duplicate group id '{}' in project '{}'",
                        group.id,
                        project.name
                    );
                }
                if !group.weight.is_finite() || group.weight < 0.0 {
                    anyhow::bail!(
                        "Invalid weight {} for group '{}' in project '{}'",
                        group.weight,
                        group.id,
                        project.name
                    );
                }
                group.limits.apply(&self.limits).validate().with_context(|| {
                    format!(
                        "Invalid limits for group '{}' in project '{}'",
                        group.id, project.name
                    )
                })?;
            }
        }

        Ok(())
    }

    /// Build the projects this file describes
    pub fn assignment(&self) -> GraderResult<Assignment> {
        let projects = self
            .projects
            .iter()
            .map(|p| p.to_project(&self.limits, &self.build))
            .collect::<GraderResult<Vec<_>>>()?;

        if self.multi || projects.len() != 1 {
            return Ok(Assignment::Multi(MultiProject::new(projects)?));
        }
        let mut projects = projects;
        projects
            .pop()
            .map(Assignment::Single)
            .ok_or_else(|| GraderError::config("no projects given"))
    }

    /// Fixture root, resolved against the directory of the assignment file
    pub fn data_root(&self, config_path: Option<&Path>) -> PathBuf {
        let data = expand_path(&self.data_dir);
        if data.is_absolute() {
            return data;
        }
        match config_path.and_then(Path::parent) {
            Some(parent) => parent.join(data),
            None => data,
        }
    }

    /// Generate example assignment
    pub fn example() -> Self {
        let mut roman = ProjectConfig::new(
            "roman",
            vec![
                GroupConfig::new("", SchemeKind::Transcript),
                GroupConfig::new("x", SchemeKind::Transcript)
                    .with_category(Category::ExtraCredit)
                    .with_weight(0.5),
            ],
        );
        roman.prog = Some("roman".to_string());

        let pal = ProjectConfig::new(
            "pal",
            vec![GroupConfig::new("", SchemeKind::Paired).with_weight(2.0)],
        );

        Self {
            name: "PA1".to_string(),
            projects: vec![roman, pal],
            ..Self::default()
        }
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
