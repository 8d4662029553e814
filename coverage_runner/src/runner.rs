//! Running a test suite in a subprocess.
//!
//! The subprocess inherits stdin, stdout and stderr so test output shows up
//! live; only its exit status is captured. Coverage reporting happens after
//! it exits and never changes the test outcome.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use tracing::{info, warn};

use crate::aggregate::{self, Aggregation};
use crate::config::{RunConfig, RuntimeSnapshot};
use crate::error::{ParseError, ReportError, RunnerError, RunnerResult};
use crate::html;
use crate::locator;
use crate::summary::{self, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    /// Exit code of the subprocess, `None` if it was killed by a signal.
    Failed(Option<i32>),
}

impl From<ExitStatus> for TestStatus {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Self::Passed
        } else {
            Self::Failed(status.code())
        }
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub status: TestStatus,
    pub coverage_requested: bool,
    /// Outcome of HTML generation, `None` if it was not requested.
    pub html: Option<Result<PathBuf, ReportError>>,
    /// Artifacts left out of the summary and report because they failed to
    /// parse.
    pub parse_failures: Vec<ParseError>,
}

impl RunResult {
    pub fn exit_code(&self) -> u8 {
        match self.status {
            TestStatus::Passed => 0,
            TestStatus::Failed(Some(code)) => match u8::try_from(code) {
                Ok(0) | Err(_) => 1,
                Ok(code) => code,
            },
            TestStatus::Failed(None) => 1,
        }
    }
}

/// Quote `text` as a Julia string literal.
fn julia_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Arguments for the runtime, in order: leading runtime arguments, project,
/// coverage mode, runtime flags, and the `include` of the entry file.
pub fn command_args(config: &RunConfig, snapshot: &RuntimeSnapshot) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.runtime_args.iter().map(OsString::from).collect();

    let mut project = OsString::from("--project=");
    project.push(config.project_dir());
    args.push(project);
    args.push(format!("--code-coverage={}", config.coverage.as_flag()).into());
    args.extend(config.flags.resolve(snapshot).to_args().into_iter().map(OsString::from));
    args.push("--eval".into());
    args.push(format!("include({})", julia_string(&config.file.to_string_lossy())).into());
    args
}

pub fn build_command(config: &RunConfig, snapshot: &RuntimeSnapshot) -> Command {
    let mut cmd = Command::new(&config.runtime);
    cmd.args(command_args(config, snapshot))
        .current_dir(&config.root)
        .envs(config.env.iter().map(|(k, v)| (k, v)));
    cmd
}

/// Validate `config`, run the suite and wait for it. No reporting.
///
/// The config must already be absolutized.
pub fn run_tests(config: &RunConfig, snapshot: &RuntimeSnapshot) -> RunnerResult<TestStatus> {
    config.check_project()?;

    let mut cmd = build_command(config, snapshot);
    info!(
        runtime = %config.runtime.display(),
        root = %config.root.display(),
        project = %config.project_dir().display(),
        file = %config.file.display(),
        coverage = config.coverage.as_flag(),
        "Running test suite",
    );

    let status = cmd.status().map_err(|source| RunnerError::Launch {
        program: config.runtime.clone(),
        source,
    })?;

    let status = TestStatus::from(status);
    match status {
        TestStatus::Passed => info!("Test suite passed"),
        TestStatus::Failed(code) => warn!(exit_code = ?code, "Test suite failed"),
    }
    Ok(status)
}

/// Run the suite, then print the coverage summary to stdout.
pub fn run(config: &RunConfig) -> RunnerResult<RunResult> {
    let snapshot = RuntimeSnapshot::capture();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with(config, &snapshot, &mut out)
}

pub fn run_with<W: Write>(
    config: &RunConfig,
    snapshot: &RuntimeSnapshot,
    out: &mut W,
) -> RunnerResult<RunResult> {
    let config = config.absolutized()?;
    let status = run_tests(&config, snapshot)?;

    let mut result = RunResult {
        status,
        coverage_requested: config.coverage.is_enabled(),
        html: None,
        parse_failures: Vec::new(),
    };
    if config.should_show_summary() || config.should_generate_html() {
        let aggregation = aggregate::aggregate(locator::scan(config.source_dir()));
        result.html = report_coverage(&config, &aggregation, out);
        result.parse_failures = aggregation.failures;
    }
    Ok(result)
}

/// Print the summary and render the HTML report from one aggregation.
fn report_coverage<W: Write>(
    config: &RunConfig,
    aggregation: &Aggregation,
    out: &mut W,
) -> Option<Result<PathBuf, ReportError>> {
    if config.should_show_summary() {
        if let Err(err) = summary::write_summary(out, &aggregation.report, config.sort, OutputFormat::Text) {
            warn!(error = %err, "failed to write coverage summary");
        }
    }

    if !config.should_generate_html() {
        return None;
    }
    let outcome = html::generate_html_for(&aggregation.report, &config.covdir_path(), &config.genhtml);
    if let Err(err) = &outcome {
        warn!(error = %err, "HTML coverage report was not generated");
    }
    Some(outcome)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::config::{CoverageMode, Threads, Toggle};

    fn args_of(config: &RunConfig) -> Vec<String> {
        command_args(config, &RuntimeSnapshot::default())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn julia_string__special_characters__then_escaped() {
        assert_eq!(julia_string("test/runtests.jl"), "\"test/runtests.jl\"");
        assert_eq!(julia_string("a\"b$c\\d"), "\"a\\\"b\\$c\\\\d\"");
    }

    #[test]
    fn command_args__defaults__then_project_coverage_flags_and_include() {
        let config = RunConfig::with_root("/pkg");
        let args = args_of(&config);

        assert_eq!(args[0], "--project=/pkg/test");
        assert_eq!(args[1], "--code-coverage=user");
        assert!(args.contains(&"--check-bounds=yes".to_string()));
        assert!(args.contains(&"--threads=1".to_string()));
        assert_eq!(args[args.len() - 2], "--eval");
        assert_eq!(args[args.len() - 1], "include(\"test/runtests.jl\")");
    }

    #[test]
    fn command_args__runtime_args_and_overrides__then_forwarded() {
        let mut config = RunConfig::with_root("/pkg");
        config.runtime_args = vec!["+1.10".to_string()];
        config.coverage = CoverageMode::All;
        config.flags.color = Some(Toggle::Yes);
        config.flags.threads = Some(Threads::Auto);
        let args = args_of(&config);

        assert_eq!(args[0], "+1.10");
        assert!(args.contains(&"--code-coverage=all".to_string()));
        assert!(args.contains(&"--color=yes".to_string()));
        assert!(args.contains(&"--threads=auto".to_string()));
    }

    #[test]
    fn command_args__inherited_flags__then_taken_from_snapshot() {
        let config = RunConfig::with_root("/pkg");
        let snapshot = RuntimeSnapshot {
            color: Toggle::Yes,
            threads: "6".parse().unwrap(),
            ..RuntimeSnapshot::default()
        };
        let args: Vec<String> = command_args(&config, &snapshot)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--color=yes".to_string()));
        assert!(args.contains(&"--threads=6".to_string()));
    }

    #[test]
    fn run_result__exit_codes__then_mapped() {
        let result = |status| RunResult {
            status,
            coverage_requested: true,
            html: None,
            parse_failures: Vec::new(),
        };
        assert_eq!(result(TestStatus::Passed).exit_code(), 0);
        assert_eq!(result(TestStatus::Failed(Some(3))).exit_code(), 3);
        assert_eq!(result(TestStatus::Failed(Some(256))).exit_code(), 1);
        assert_eq!(result(TestStatus::Failed(None)).exit_code(), 1);
    }
}
