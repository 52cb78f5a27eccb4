//! Several projects graded as one assignment

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use super::{Project, ProjectDirs};
use crate::error::{GraderError, GraderResult};

#[derive(Clone, Debug)]
pub struct MultiProject {
    projects: Vec<Project>,
}

impl MultiProject {
    /// Project names must be unique
    pub fn new(projects: Vec<Project>) -> GraderResult<Self> {
        if projects.is_empty() {
            return Err(GraderError::config("no projects given"));
        }

        let mut seen = HashSet::new();
        let duplicates: BTreeSet<&str> = projects
            .iter()
            .map(Project::name)
            .filter(|name| !seen.insert(*name))
            .collect();
        if !duplicates.is_empty() {
            return Err(GraderError::config(format!(
                "Duplicate project names {duplicates:?}"
            )));
        }

        Ok(Self { projects })
    }

    /// Give each project `<root>/<name>` for every root
    pub fn set_context(&mut self, src: &Path, build: &Path, data: &Path) {
        for project in &mut self.projects {
            let name = project.name().to_string();
            project.set_context(ProjectDirs::new(
                src.join(&name),
                build.join(&name),
                data.join(&name),
            ));
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut [Project] {
        &mut self.projects
    }
}
