//! Projects under grading
//!
//! A [`Project`] owns one subject program, its test groups and its build.
//! A [`MultiProject`] grades several projects of one assignment side by
//! side, each in its own subdirectory of the source, build and data roots.

mod build;
mod multi;

pub use build::{run_command, BuildCommand};
pub use multi::MultiProject;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::discovery::{GatherContext, TestGroup};
use crate::error::{GraderError, GraderResult};
use crate::executor::TestCase;
use crate::models::{Category, Limits};

/// Directory roots of one project
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectDirs {
    pub src: PathBuf,
    pub build: PathBuf,
    pub data: PathBuf,
    /// Personal fixtures; `<src>/tests` unless given
    pub user: PathBuf,
}

impl ProjectDirs {
    pub fn new(
        src: impl Into<PathBuf>,
        build: impl Into<PathBuf>,
        data: impl Into<PathBuf>,
    ) -> Self {
        let src = src.into();
        Self {
            user: src.join("tests"),
            src,
            build: build.into(),
            data: data.into(),
        }
    }
}

/// Result of gathering a project's tests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gathered {
    /// The source directory does not exist
    NoSource,
    Found(usize),
}

impl Gathered {
    pub fn count(&self) -> usize {
        match self {
            Gathered::NoSource => 0,
            Gathered::Found(count) => *count,
        }
    }
}

/// One subject program with its test groups
#[derive(Clone, Debug)]
pub struct Project {
    name: String,
    prog: String,
    groups: Vec<TestGroup>,
    personal: Vec<TestGroup>,
    limits: Limits,
    build_command: BuildCommand,
    dirs: Option<ProjectDirs>,
    tests: Vec<TestCase>,
    ready: bool,
}

impl Project {
    /// Create a project from its groups.
    ///
    /// Group ids must be unique and at least one group must be graded. When
    /// no personal group is given, one is synthesized with the convention of
    /// the first graded group.
    pub fn new(name: impl Into<String>, groups: Vec<TestGroup>) -> GraderResult<Self> {
        let name = name.into();

        let mut seen = HashSet::new();
        let duplicates: BTreeSet<&str> = groups
            .iter()
            .map(TestGroup::id)
            .filter(|id| !seen.insert(*id))
            .collect();
        if !duplicates.is_empty() {
            return Err(GraderError::config(format!(
                "Duplicate test group ids for {name}: {duplicates:?}"
            )));
        }

        let (personal, groups): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|g| !g.category().is_graded());

        let Some(first) = groups.first() else {
            return Err(GraderError::config(format!(
                "Must provide at least one graded test group for {name}"
            )));
        };

        let personal = if personal.is_empty() {
            vec![TestGroup::new(
                "",
                1.0,
                Category::Personal,
                first.discovery().with_default_names(),
            )?
            .with_name("0")]
        } else {
            personal
        };

        Ok(Self {
            prog: name.clone(),
            name,
            groups,
            personal,
            limits: Limits::default(),
            build_command: BuildCommand::default(),
            dirs: None,
            tests: Vec::new(),
            ready: false,
        })
    }

    /// Executable name, when it differs from the project name
    pub fn with_prog(mut self, prog: impl Into<String>) -> Self {
        self.prog = prog.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_build_command(mut self, command: BuildCommand) -> Self {
        self.build_command = command;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn prog(&self) -> &str {
        &self.prog
    }

    #[cfg(test)]
    pub fn groups(&self) -> &[TestGroup] {
        &self.groups
    }

    #[cfg(test)]
    pub fn personal_groups(&self) -> &[TestGroup] {
        &self.personal
    }

    #[cfg(test)]
    pub fn dirs(&self) -> Option<&ProjectDirs> {
        self.dirs.as_ref()
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_context(&mut self, dirs: ProjectDirs) {
        self.dirs = Some(dirs);
    }

    fn context(&self, action: &str) -> GraderResult<&ProjectDirs> {
        self.dirs.as_ref().ok_or_else(|| {
            GraderError::Internal(format!("attempt to {action} {} without context", self.name))
        })
    }

    /// Discover the requested tests.
    ///
    /// An empty request set, or one naming the project, selects every group;
    /// otherwise groups are selected as `project:group`.
    pub fn gather(&mut self, requests: &HashSet<String>) -> GraderResult<Gathered> {
        let dirs = self.context("gather tests for")?.clone();
        info!("Gathering tests for {:?}", self.name);

        if !dirs.src.is_dir() {
            info!("Source dir not found: {:?}", dirs.src);
            self.tests.clear();
            return Ok(Gathered::NoSource);
        }
        if !dirs.data.is_dir() {
            return Err(GraderError::config(format!(
                "Data directory not found: {:?}",
                dirs.data.display().to_string()
            )));
        }

        let everything = requests.is_empty() || requests.contains(&self.name);
        let wanted = |group: &TestGroup| {
            everything || requests.contains(&format!("{}:{}", self.name, group.name()))
        };

        let mut tests = Vec::new();
        let graded = self.context_for(&dirs.data);
        for group in self.groups.iter().filter(|&g| wanted(g)) {
            tests.extend(group.discover(&graded)?);
        }

        if dirs.user.is_dir() {
            let personal = self.context_for(&dirs.user);
            for group in self.personal.iter().filter(|&g| wanted(g)) {
                tests.extend(group.discover(&personal)?);
            }
        }

        info!("Total tests for {}: {}", self.name, tests.len());
        self.tests = tests;
        Ok(Gathered::Found(self.tests.len()))
    }

    fn context_for(&self, fixture_dir: &Path) -> GatherContext {
        GatherContext {
            project: self.name.clone(),
            prog: self.prog.clone(),
            build_dir: self
                .dirs
                .as_ref()
                .map(|d| d.build.clone())
                .unwrap_or_default(),
            fixture_dir: fixture_dir.to_path_buf(),
            limits: self.limits.clone(),
        }
    }

    /// Create the build directory and its Makefile stub
    pub fn prepare_build_dir(&self) -> GraderResult<()> {
        if self.tests.is_empty() {
            return Ok(());
        }
        let dirs = self.context("prepare the build directory of")?;

        fs::create_dir_all(&dirs.build).map_err(|e| {
            GraderError::config(format!(
                "unable to create build directory {:?}: {e}",
                dirs.build.display().to_string()
            ))
        })?;

        let makefile = dirs.build.join("Makefile");
        if makefile.exists() {
            return Ok(());
        }
        info!("Creating Makefile: {:?}", makefile);

        let src_path = relative_path(&dirs.src, &dirs.build);
        let src_path = src_path.to_string_lossy();
        if src_path.contains(char::is_whitespace) {
            return Err(GraderError::config(format!(
                "space in path from SRC_DIR to BUILD_DIR {src_path:?}"
            )));
        }

        fs::write(&makefile, makefile_stub(&src_path)).map_err(|e| {
            GraderError::config(format!(
                "unable to write {:?}: {e}",
                makefile.display().to_string()
            ))
        })
    }

    /// Run the build command; the project is ready only if the executable
    /// exists afterwards. Does nothing when no tests were gathered.
    pub async fn build(&mut self, clean: bool) -> GraderResult<()> {
        if self.tests.is_empty() {
            return Ok(());
        }
        let build_dir = self.context("build")?.build.clone();
        self.ready = false;

        if clean {
            self.build_command.clean(&build_dir).await?;
        }
        self.build_command.build(&build_dir).await?;

        let executable = build_dir.join(&self.prog);
        if !executable.exists() {
            return Err(GraderError::MissingArtifact(PathBuf::from(&self.prog)));
        }

        debug!("Built {:?}", executable);
        self.ready = true;
        Ok(())
    }

    /// Tests to run: the gathered tests once the build succeeded
    pub fn tests(&self) -> &[TestCase] {
        if self.ready {
            &self.tests
        } else {
            &[]
        }
    }

    /// Every gathered test, built or not
    pub fn gathered(&self) -> &[TestCase] {
        &self.tests
    }
}

fn makefile_stub(src_path: &str) -> String {
    format!(
        "SRCPATH={src_path}\n\nvpath %.c $(SRCPATH)\nvpath %.h $(SRCPATH)\n\ninclude $(SRCPATH)/Makefile\n"
    )
}

/// Path of `target` as seen from directory `base`
fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut path = PathBuf::new();
    for _ in common..base.len() {
        path.push("..");
    }
    for component in &target[common..] {
        path.push(component);
    }
    if path.as_os_str().is_empty() {
        path.push(".");
    }
    path
}

/// What is being graded: one project, or several side by side
#[derive(Clone, Debug)]
pub enum Assignment {
    Single(Project),
    Multi(MultiProject),
}

impl Assignment {
    /// Bind directory roots; members of a multi-project get subdirectories
    pub fn set_context(&mut self, src: &Path, build: &Path, data: &Path) {
        match self {
            Assignment::Single(project) => project.set_context(ProjectDirs::new(src, build, data)),
            Assignment::Multi(multi) => multi.set_context(src, build, data),
        }
    }

    pub fn projects(&self) -> &[Project] {
        match self {
            Assignment::Single(project) => std::slice::from_ref(project),
            Assignment::Multi(multi) => multi.projects(),
        }
    }

    pub fn projects_mut(&mut self) -> &mut [Project] {
        match self {
            Assignment::Single(project) => std::slice::from_mut(project),
            Assignment::Multi(multi) => multi.projects_mut(),
        }
    }

    /// Tests of every project that built successfully, in project order
    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.projects().iter().flat_map(|p| p.tests())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Discovery, PairedScheme, TranscriptScheme};

    fn transcript(id: &str, category: Category) -> TestGroup {
        TestGroup::new(id, 1.0, category, Discovery::Transcript(TranscriptScheme::default()))
            .unwrap()
    }

    fn write_script(path: &Path, body: &str) {
        fs::write(path, body).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn test_duplicate_group_ids_rejected() {
        let err = Project::new(
            "roman",
            vec![transcript("1", Category::Regular), transcript("1", Category::ExtraCredit)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate test group ids for roman"));
    }

    #[test]
    fn test_requires_graded_group() {
        assert!(Project::new("roman", vec![transcript("", Category::Personal)]).is_err());
        assert!(Project::new("roman", Vec::new()).is_err());
    }

    #[test]
    fn test_personal_group_synthesized() {
        let paired = TestGroup::new(
            "2",
            3.0,
            Category::Regular,
            Discovery::Paired(PairedScheme::default().with_stdin()),
        )
        .unwrap();
        let project = Project::new("pal", vec![paired]).unwrap();

        let personal = &project.personal_groups()[0];
        assert_eq!(personal.category(), Category::Personal);
        assert_eq!(personal.id(), "");
        assert_eq!(personal.name(), "0");
        assert_eq!(personal.label("pal"), "pal:0");
        assert_eq!(personal.discovery().kind(), "paired_stdin");
        assert_eq!(project.prog(), "pal");
    }

    #[test]
    fn test_gather_without_context_is_internal() {
        let mut project = Project::new("roman", vec![transcript("", Category::Regular)]).unwrap();
        let err = project.gather(&HashSet::new()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_gather_filters_and_reads_user_dir() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        let data = root.path().join("data");
        fs::create_dir_all(src.join("tests")).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("tests.txt"), "1\nI\n2\nII\n").unwrap();
        fs::write(data.join("testsx.txt"), "10\nX\n").unwrap();
        fs::write(src.join("tests/tests.txt"), "3\nIII\n").unwrap();

        let mut project = Project::new(
            "roman",
            vec![
                transcript("", Category::Regular),
                transcript("x", Category::ExtraCredit),
            ],
        )
        .unwrap();
        project.set_context(ProjectDirs::new(&src, root.path().join("build"), &data));

        assert_eq!(project.gather(&HashSet::new()).unwrap(), Gathered::Found(4));
        let groups: Vec<_> = project.gathered().iter().map(|t| t.group().to_string()).collect();
        assert_eq!(groups, vec!["roman", "roman", "roman:x", "roman:0"]);

        let requests = HashSet::from(["roman:0".to_string()]);
        assert_eq!(project.gather(&requests).unwrap(), Gathered::Found(1));

        let requests = HashSet::from(["roman:x".to_string()]);
        assert_eq!(project.gather(&requests).unwrap(), Gathered::Found(1));

        let requests = HashSet::from(["roman".to_string()]);
        assert_eq!(project.gather(&requests).unwrap(), Gathered::Found(4));

        let requests = HashSet::from(["pal".to_string()]);
        assert_eq!(project.gather(&requests).unwrap(), Gathered::Found(0));
    }

    #[test]
    fn test_gather_missing_dirs() {
        let root = tempfile::tempdir().unwrap();
        let mut project = Project::new("roman", vec![transcript("", Category::Regular)]).unwrap();

        project.set_context(ProjectDirs::new(
            root.path().join("absent"),
            root.path().join("build"),
            root.path().join("data"),
        ));
        assert_eq!(project.gather(&HashSet::new()).unwrap(), Gathered::NoSource);

        project.set_context(ProjectDirs::new(
            root.path(),
            root.path().join("build"),
            root.path().join("data"),
        ));
        let err = project.gather(&HashSet::new()).unwrap_err();
        assert!(matches!(err, GraderError::Configuration(_)));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/a/src"), Path::new("/a/build")),
            PathBuf::from("../src")
        );
        assert_eq!(
            relative_path(Path::new("/a/src/roman"), Path::new("/a/build/roman")),
            PathBuf::from("../../src/roman")
        );
        assert_eq!(relative_path(Path::new("/a"), Path::new("/a")), PathBuf::from("."));
    }

    #[test]
    fn test_prepare_build_dir_writes_makefile() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        let data = root.path().join("data");
        let build = root.path().join("build");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("tests.txt"), "1\nI\n").unwrap();

        let mut project = Project::new("roman", vec![transcript("", Category::Regular)]).unwrap();
        project.set_context(ProjectDirs::new(&src, &build, &data));
        project.gather(&HashSet::new()).unwrap();
        project.prepare_build_dir().unwrap();

        let makefile = fs::read_to_string(build.join("Makefile")).unwrap();
        assert!(makefile.starts_with("SRCPATH=../src\n"));
        assert!(makefile.contains("vpath %.c $(SRCPATH)"));
        assert!(makefile.ends_with("include $(SRCPATH)/Makefile\n"));
    }

    #[test]
    fn test_prepare_build_dir_rejects_whitespace() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("my src");
        let data = root.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("tests.txt"), "1\nI\n").unwrap();

        let mut project = Project::new("roman", vec![transcript("", Category::Regular)]).unwrap();
        project.set_context(ProjectDirs::new(&src, root.path().join("build"), &data));
        project.gather(&HashSet::new()).unwrap();

        let err = project.prepare_build_dir().unwrap_err();
        assert!(err.to_string().starts_with("space in path"));
    }

    #[tokio::test]
    async fn test_build_requires_executable() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        let data = root.path().join("data");
        let build = root.path().join("build");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&build).unwrap();
        fs::write(data.join("tests.txt"), "1\nI\n").unwrap();

        let builder = build.join("build.sh");
        write_script(&builder, "#!/bin/sh\nexit 0\n");

        let mut project = Project::new("roman", vec![transcript("", Category::Regular)])
            .unwrap()
            .with_build_command(BuildCommand::new(builder.to_string_lossy(), Vec::new()));
        project.set_context(ProjectDirs::new(&src, &build, &data));
        project.gather(&HashSet::new()).unwrap();

        let err = project.build(false).await.unwrap_err();
        assert!(matches!(err, GraderError::MissingArtifact(_)));
        assert!(!project.is_ready());
        assert!(project.tests().is_empty());

        write_script(&build.join("roman"), "#!/bin/sh\necho I\n");
        project.build(false).await.unwrap();
        assert!(project.is_ready());
        assert_eq!(project.tests().len(), 1);
    }
}
