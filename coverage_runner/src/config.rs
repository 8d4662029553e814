//! Run configuration and runtime flag resolution.
//!
//! Flags left unset inherit a value from a [`RuntimeSnapshot`], which is
//! captured once per invocation and then passed around as plain data.

use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::{RunnerError, RunnerResult};
use crate::html::DEFAULT_GENHTML;
use crate::summary::SortSpec;

/// Files the project root needs so the subprocess resolves the exact
/// dependency set.
pub const DEPENDENCY_FILES: [&str; 2] = ["Project.toml", "Manifest.toml"];

pub const DEFAULT_ENTRY_FILE: &str = "test/runtests.jl";
pub const DEFAULT_PROJECT: &str = "test";
pub const DEFAULT_COVDIR: &str = "coverage";
pub const DEFAULT_RUNTIME: &str = "julia";
pub const SOURCE_DIR: &str = "src";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CoverageMode {
    /// No coverage tracking
    #[value(alias = "off")]
    None,
    /// Track code of the package under test
    #[default]
    User,
    /// Track all code, including dependencies
    All,
}

impl CoverageMode {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::User => "user",
            Self::All => "all",
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    Yes,
    No,
}

impl Toggle {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DepWarn {
    Yes,
    No,
    Error,
}

impl DepWarn {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckBounds {
    Yes,
    No,
    Auto,
}

impl CheckBounds {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrackAllocation {
    None,
    User,
    All,
}

impl TrackAllocation {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::User => "user",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threads {
    Auto,
    Count(NonZeroUsize),
}

impl FromStr for Threads {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Threads::Auto);
        }
        // JULIA_NUM_THREADS may carry a second threadpool size ("4,1").
        let first = s.split(',').next().unwrap_or(s).trim();
        first
            .parse::<NonZeroUsize>()
            .map(Threads::Count)
            .map_err(|_| format!("invalid thread count '{}'. Use a positive number or 'auto'", s))
    }
}

impl fmt::Display for Threads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Count(n) => write!(f, "{}", n),
        }
    }
}

/// Runtime flags for the subprocess. `None` inherits from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFlags {
    pub color: Option<Toggle>,
    pub compiled_modules: Option<Toggle>,
    pub startup_file: Option<Toggle>,
    pub depwarn: Option<DepWarn>,
    pub inline: Option<Toggle>,
    pub check_bounds: Option<CheckBounds>,
    pub track_allocation: Option<TrackAllocation>,
    pub threads: Option<Threads>,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            color: None,
            compiled_modules: None,
            startup_file: None,
            depwarn: None,
            inline: None,
            check_bounds: Some(CheckBounds::Yes),
            track_allocation: None,
            threads: None,
        }
    }
}

/// Settings of the invoking process, captured once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub color: Toggle,
    pub compiled_modules: Toggle,
    pub startup_file: Toggle,
    pub depwarn: DepWarn,
    pub inline: Toggle,
    pub check_bounds: CheckBounds,
    pub track_allocation: TrackAllocation,
    pub threads: Threads,
}

impl Default for RuntimeSnapshot {
    fn default() -> Self {
        Self {
            color: Toggle::No,
            compiled_modules: Toggle::Yes,
            startup_file: Toggle::Yes,
            depwarn: DepWarn::No,
            inline: Toggle::Yes,
            check_bounds: CheckBounds::Auto,
            track_allocation: TrackAllocation::None,
            threads: Threads::Count(NonZeroUsize::MIN),
        }
    }
}

impl RuntimeSnapshot {
    pub fn capture() -> Self {
        Self::from_env(|key| env::var(key).ok(), std::io::stdout().is_terminal())
    }

    pub fn from_env<F>(lookup: F, stdout_is_terminal: bool) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let no_color = lookup("NO_COLOR").is_some_and(|v| !v.is_empty());
        let threads = lookup("JULIA_NUM_THREADS")
            .and_then(|v| v.parse::<Threads>().ok())
            .unwrap_or(Threads::Count(NonZeroUsize::MIN));
        Self {
            color: Toggle::from(stdout_is_terminal && !no_color),
            threads,
            ..Self::default()
        }
    }
}

/// Flags with every inherited value filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlags {
    pub color: Toggle,
    pub compiled_modules: Toggle,
    pub startup_file: Toggle,
    pub depwarn: DepWarn,
    pub inline: Toggle,
    pub check_bounds: CheckBounds,
    pub track_allocation: TrackAllocation,
    pub threads: Threads,
}

impl RuntimeFlags {
    pub fn resolve(&self, snapshot: &RuntimeSnapshot) -> ResolvedFlags {
        ResolvedFlags {
            color: self.color.unwrap_or(snapshot.color),
            compiled_modules: self.compiled_modules.unwrap_or(snapshot.compiled_modules),
            startup_file: self.startup_file.unwrap_or(snapshot.startup_file),
            depwarn: self.depwarn.unwrap_or(snapshot.depwarn),
            inline: self.inline.unwrap_or(snapshot.inline),
            check_bounds: self.check_bounds.unwrap_or(snapshot.check_bounds),
            track_allocation: self.track_allocation.unwrap_or(snapshot.track_allocation),
            threads: self.threads.unwrap_or(snapshot.threads),
        }
    }
}

impl ResolvedFlags {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("--color={}", self.color.as_flag()),
            format!("--compiled-modules={}", self.compiled_modules.as_flag()),
            format!("--startup-file={}", self.startup_file.as_flag()),
            format!("--depwarn={}", self.depwarn.as_flag()),
            format!("--inline={}", self.inline.as_flag()),
            format!("--check-bounds={}", self.check_bounds.as_flag()),
            format!("--track-allocation={}", self.track_allocation.as_flag()),
            format!("--threads={}", self.threads),
        ]
    }
}

/// Everything needed for one test invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Entry file, relative to `root`.
    pub file: PathBuf,
    pub root: PathBuf,
    /// Environment holding the dependency files, relative to `root`.
    pub project: PathBuf,
    pub coverage: CoverageMode,
    pub flags: RuntimeFlags,
    pub runtime: PathBuf,
    /// Arguments placed before every flag, e.g. a juliaup channel `+1.10`.
    pub runtime_args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// `None` shows the summary exactly when coverage is enabled.
    pub show_summary: Option<bool>,
    pub sort: SortSpec,
    pub html: bool,
    /// HTML output directory, relative to `root`.
    pub covdir: PathBuf,
    pub genhtml: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_ENTRY_FILE),
            root: PathBuf::from("."),
            project: PathBuf::from(DEFAULT_PROJECT),
            coverage: CoverageMode::default(),
            flags: RuntimeFlags::default(),
            runtime: PathBuf::from(DEFAULT_RUNTIME),
            runtime_args: Vec::new(),
            env: Vec::new(),
            show_summary: None,
            sort: SortSpec::default(),
            html: false,
            covdir: PathBuf::from(DEFAULT_COVDIR),
            genhtml: PathBuf::from(DEFAULT_GENHTML),
        }
    }
}

impl RunConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join(&self.project)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn covdir_path(&self) -> PathBuf {
        self.root.join(&self.covdir)
    }

    /// Never true with coverage off, whatever `show_summary` says.
    pub fn should_show_summary(&self) -> bool {
        self.coverage.is_enabled() && self.show_summary.unwrap_or(true)
    }

    pub fn should_generate_html(&self) -> bool {
        self.coverage.is_enabled() && self.html
    }

    /// Copy of the config with `root` made absolute, so paths stay valid once
    /// the subprocess runs inside it.
    pub fn absolutized(&self) -> RunnerResult<Self> {
        let root = self.root.canonicalize().map_err(|err| {
            RunnerError::invalid_argument(format!(
                "root directory {} is not accessible: {}",
                self.root.display(),
                err
            ))
        })?;
        Ok(Self {
            root,
            ..self.clone()
        })
    }

    /// Fail unless the project root holds every dependency file.
    pub fn check_project(&self) -> RunnerResult<()> {
        let project = self.project_dir();
        check_dependency_files(&project)
    }
}

pub fn check_dependency_files(project: &Path) -> RunnerResult<()> {
    for file in DEPENDENCY_FILES {
        if !project.join(file).is_file() {
            return Err(RunnerError::MissingDependencyFile {
                project: project.to_path_buf(),
                file,
            });
        }
    }
    Ok(())
}

/// Parse a `KEY=VALUE` pair for the subprocess environment.
pub fn parse_env_pair(pair: &str) -> Result<(String, String), String> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", pair)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn threads__parse_variants__then_count_or_auto() {
        assert_eq!("auto".parse::<Threads>().unwrap(), Threads::Auto);
        assert_eq!("4".parse::<Threads>().unwrap().to_string(), "4");
        assert_eq!("4,1".parse::<Threads>().unwrap().to_string(), "4");
        assert!("0".parse::<Threads>().is_err());
        assert!("many".parse::<Threads>().is_err());
    }

    #[test]
    fn snapshot__terminal_without_no_color__then_color_yes() {
        let snapshot = RuntimeSnapshot::from_env(lookup_in(&[]), true);
        assert_eq!(snapshot.color, Toggle::Yes);
        assert_eq!(snapshot.threads.to_string(), "1");
    }

    #[test]
    fn snapshot__no_color_set__then_color_no() {
        let snapshot = RuntimeSnapshot::from_env(lookup_in(&[("NO_COLOR", "1")]), true);
        assert_eq!(snapshot.color, Toggle::No);
    }

    #[test]
    fn snapshot__julia_num_threads__then_inherited() {
        let snapshot = RuntimeSnapshot::from_env(lookup_in(&[("JULIA_NUM_THREADS", "8")]), false);
        assert_eq!(snapshot.threads.to_string(), "8");
        assert_eq!(snapshot.color, Toggle::No);
    }

    #[test]
    fn flags__resolve__then_explicit_values_win() {
        let flags = RuntimeFlags {
            depwarn: Some(DepWarn::Error),
            threads: Some(Threads::Auto),
            ..RuntimeFlags::default()
        };
        let snapshot = RuntimeSnapshot {
            inline: Toggle::No,
            ..RuntimeSnapshot::default()
        };
        let resolved = flags.resolve(&snapshot);
        assert_eq!(resolved.depwarn, DepWarn::Error);
        assert_eq!(resolved.threads, Threads::Auto);
        assert_eq!(resolved.inline, Toggle::No);
        assert_eq!(resolved.check_bounds, CheckBounds::Yes);
    }

    #[test]
    fn resolved_flags__to_args__then_every_flag_present() {
        let args = RuntimeFlags::default().resolve(&RuntimeSnapshot::default()).to_args();
        assert_eq!(
            args,
            vec![
                "--color=no",
                "--compiled-modules=yes",
                "--startup-file=yes",
                "--depwarn=no",
                "--inline=yes",
                "--check-bounds=yes",
                "--track-allocation=none",
                "--threads=1",
            ]
        );
    }

    #[test]
    fn run_config__coverage_off__then_summary_never_shown() {
        for show in [None, Some(true), Some(false)] {
            let config = RunConfig {
                coverage: CoverageMode::None,
                show_summary: show,
                html: true,
                ..RunConfig::default()
            };
            assert!(!config.should_show_summary());
            assert!(!config.should_generate_html());
        }
    }

    #[test]
    fn run_config__coverage_user__then_summary_by_default() {
        let config = RunConfig::default();
        assert!(config.should_show_summary());
        let suppressed = RunConfig {
            show_summary: Some(false),
            ..RunConfig::default()
        };
        assert!(!suppressed.should_show_summary());
    }

    #[test]
    fn check_project__missing_manifest__then_configuration_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("test")).unwrap();
        fs::write(dir.path().join("test/Project.toml"), "").unwrap();

        let err = RunConfig::with_root(dir.path()).check_project().unwrap_err();
        match err {
            RunnerError::MissingDependencyFile { file, .. } => assert_eq!(file, "Manifest.toml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn check_project__both_files__then_ok() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("test")).unwrap();
        fs::write(dir.path().join("test/Project.toml"), "").unwrap();
        fs::write(dir.path().join("test/Manifest.toml"), "").unwrap();

        assert!(RunConfig::with_root(dir.path()).check_project().is_ok());
    }

    #[test]
    fn absolutized__missing_root__then_invalid_argument() {
        let dir = tempdir().unwrap();
        let err = RunConfig::with_root(dir.path().join("nope")).absolutized().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn parse_env_pair__variants__then_split_on_first_equals() {
        assert_eq!(
            parse_env_pair("JULIA_DEBUG=Foo=1").unwrap(),
            ("JULIA_DEBUG".to_string(), "Foo=1".to_string())
        );
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("nothing").is_err());
    }
}
