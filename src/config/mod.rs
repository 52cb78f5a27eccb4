//! Configuration module
//!
//! Assignment files describe the projects to grade and their test groups.
//! They are loaded from YAML or JSON and turned into [`Project`]s.

mod env;
mod file;

pub use env::{env_help, EnvConfig};
pub use file::AssignmentFile;

use serde::{Deserialize, Serialize};

use crate::discovery::{Discovery, PairedScheme, StagedScheme, TestGroup, TranscriptScheme};
use crate::error::{GraderError, GraderResult};
use crate::models::{Category, LimitOverrides, Limits};
use crate::project::{BuildCommand, Project};

/// Fixture convention named in a group entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    #[default]
    Transcript,
    Paired,
    PairedStdin,
    Staged,
}

/// One test group of a project
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group id, also part of the fixture file names
    #[serde(default)]
    pub id: String,

    /// Display name (defaults to the id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Points per passing test
    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub scheme: SchemeKind,

    /// Transcript file prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Per-group limit overrides
    #[serde(default)]
    pub limits: LimitOverrides,
}

fn default_weight() -> f64 {
    1.0
}

impl GroupConfig {
    pub fn new(id: impl Into<String>, scheme: SchemeKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            weight: default_weight(),
            category: Category::Regular,
            scheme,
            prefix: None,
            arg_prefix: None,
            ref_prefix: None,
            train_prefix: None,
            data_prefix: None,
            suffix: None,
            limits: LimitOverrides::default(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Discovery convention with configured names over the defaults
    pub fn discovery(&self) -> Discovery {
        match self.scheme {
            SchemeKind::Transcript => {
                let mut scheme = TranscriptScheme::default();
                override_with(&mut scheme.prefix, &self.prefix);
                override_with(&mut scheme.suffix, &self.suffix);
                Discovery::Transcript(scheme)
            }
            SchemeKind::Paired | SchemeKind::PairedStdin => {
                let mut scheme = PairedScheme::default();
                override_with(&mut scheme.arg_prefix, &self.arg_prefix);
                override_with(&mut scheme.ref_prefix, &self.ref_prefix);
                override_with(&mut scheme.suffix, &self.suffix);
                if self.scheme == SchemeKind::PairedStdin {
                    scheme = scheme.with_stdin();
                }
                Discovery::Paired(scheme)
            }
            SchemeKind::Staged => {
                let mut scheme = StagedScheme::default();
                override_with(&mut scheme.train_prefix, &self.train_prefix);
                override_with(&mut scheme.data_prefix, &self.data_prefix);
                override_with(&mut scheme.ref_prefix, &self.ref_prefix);
                override_with(&mut scheme.suffix, &self.suffix);
                Discovery::Staged(scheme)
            }
        }
    }

    /// Runtime group; its overrides must leave `base` valid
    pub fn to_group(&self, base: &Limits) -> GraderResult<TestGroup> {
        self.limits.apply(base).validate().map_err(|e| {
            GraderError::config(format!("limits of test group {:?}: {e}", self.id))
        })?;

        let mut group = TestGroup::new(&self.id, self.weight, self.category, self.discovery())?
            .with_limits(self.limits.clone());
        if let Some(name) = &self.name {
            group = group.with_name(name);
        }
        Ok(group)
    }
}

fn override_with(field: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *field = value.clone();
    }
}

/// One project of an assignment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Executable name (defaults to the project name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prog: Option<String>,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, groups: Vec<GroupConfig>) -> Self {
        Self {
            name: name.into(),
            prog: None,
            groups,
        }
    }

    pub fn to_project(&self, limits: &Limits, build: &BuildCommand) -> GraderResult<Project> {
        if self.name.trim().is_empty() {
            return Err(GraderError::config("project name must not be empty"));
        }

        let groups = self
            .groups
            .iter()
            .map(|group| group.to_group(limits))
            .collect::<GraderResult<Vec<_>>>()?;

        let mut project = Project::new(&self.name, groups)?
            .with_limits(limits.clone())
            .with_build_command(build.clone());
        if let Some(prog) = &self.prog {
            project = project.with_prog(prog);
        }
        Ok(project)
    }
}
