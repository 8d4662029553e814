use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clean;
use crate::config::{
    self, CheckBounds, CoverageMode, DepWarn, RunConfig, RuntimeFlags, Threads, Toggle,
    TrackAllocation,
};
use crate::error::RunnerError;
use crate::html;
use crate::runner;
use crate::summary::{self, OutputFormat, SortSpec};

#[derive(Parser, Debug)]
#[command(
    name = "covrun",
    author,
    version,
    about = "Run a package test suite in a subprocess and summarize its line coverage",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the test suite with coverage tracking
    Test(TestArgs),

    /// Print a coverage summary from existing artifacts
    Show {
        /// Directory to scan for coverage artifacts
        #[arg(default_value = config::SOURCE_DIR)]
        path: PathBuf,

        #[command(flatten)]
        sort: SortArgs,

        /// Output format (text or json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate an HTML report from existing artifacts
    Html {
        /// Package root; artifacts are read from its src directory
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Output directory, relative to the root
        #[arg(long, default_value = config::DEFAULT_COVDIR)]
        covdir: PathBuf,

        /// Report generator executable
        #[arg(long, env = "COVRUN_GENHTML", default_value = html::DEFAULT_GENHTML)]
        genhtml: PathBuf,
    },

    /// Delete coverage artifacts
    Clean {
        /// Directory to clean
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SortArgs {
    /// Column to sort by (file, total, hit, missed, coverage)
    #[arg(long, value_name = "KEY")]
    pub sort_by: Option<String>,

    /// Sort ascending instead of descending
    #[arg(long, requires = "sort_by")]
    pub ascending: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Entry file of the test suite, relative to the root
    #[arg(default_value = config::DEFAULT_ENTRY_FILE)]
    pub file: PathBuf,

    /// Package root the suite runs in
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Environment with Project.toml and Manifest.toml, relative to the root
    #[arg(long, default_value = config::DEFAULT_PROJECT)]
    pub project: PathBuf,

    /// Coverage tracking mode
    #[arg(long, value_enum, default_value_t = CoverageMode::User)]
    pub coverage: CoverageMode,

    /// Show the coverage summary (default when coverage is enabled)
    #[arg(long, overrides_with = "no_summary")]
    pub summary: bool,

    /// Suppress the coverage summary
    #[arg(long)]
    pub no_summary: bool,

    #[command(flatten)]
    pub sort: SortArgs,

    /// Generate an HTML report after the run
    #[arg(long)]
    pub html: bool,

    /// HTML output directory, relative to the root
    #[arg(long, default_value = config::DEFAULT_COVDIR)]
    pub covdir: PathBuf,

    /// Report generator executable
    #[arg(long, env = "COVRUN_GENHTML", default_value = html::DEFAULT_GENHTML)]
    pub genhtml: PathBuf,

    /// Runtime executable
    #[arg(long, env = "COVRUN_RUNTIME", default_value = config::DEFAULT_RUNTIME)]
    pub runtime: PathBuf,

    /// Argument placed before all runtime flags (repeatable)
    #[arg(long = "runtime-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,

    /// Extra environment variable for the subprocess (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = config::parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Colored output [default: inherit]
    #[arg(long, value_enum)]
    pub color: Option<Toggle>,

    /// Use the compiled-modules cache [default: inherit]
    #[arg(long, value_enum)]
    pub compiled_modules: Option<Toggle>,

    /// Load the startup file [default: inherit]
    #[arg(long, value_enum)]
    pub startup_file: Option<Toggle>,

    /// Deprecation warnings [default: inherit]
    #[arg(long, value_enum)]
    pub depwarn: Option<DepWarn>,

    /// Inlining [default: inherit]
    #[arg(long, value_enum)]
    pub inline: Option<Toggle>,

    /// Bounds checking
    #[arg(long, value_enum, default_value_t = CheckBounds::Yes)]
    pub check_bounds: CheckBounds,

    /// Allocation tracking [default: inherit]
    #[arg(long, value_enum)]
    pub track_allocation: Option<TrackAllocation>,

    /// Number of threads, or "auto" [default: inherit]
    #[arg(long)]
    pub threads: Option<Threads>,
}

impl TryFrom<TestArgs> for RunConfig {
    type Error = RunnerError;

    fn try_from(value: TestArgs) -> Result<Self, Self::Error> {
        let sort = SortSpec::parse(value.sort.sort_by.as_deref(), value.sort.ascending)?;
        let show_summary = if value.no_summary {
            Some(false)
        } else if value.summary {
            Some(true)
        } else {
            None
        };
        Ok(Self {
            file: value.file,
            root: value.root,
            project: value.project,
            coverage: value.coverage,
            flags: RuntimeFlags {
                color: value.color,
                compiled_modules: value.compiled_modules,
                startup_file: value.startup_file,
                depwarn: value.depwarn,
                inline: value.inline,
                check_bounds: Some(value.check_bounds),
                track_allocation: value.track_allocation,
                threads: value.threads,
            },
            runtime: value.runtime,
            runtime_args: value.runtime_args,
            env: value.env,
            show_summary,
            sort,
            html: value.html,
            covdir: value.covdir,
            genhtml: value.genhtml,
        })
    }
}

/// Logs go to stderr so summaries on stdout stay machine-readable.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Test(args) => run_test(args),
        Commands::Show { path, sort, format } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            summary::show_coverage(
                &mut out,
                &path,
                sort.sort_by.as_deref(),
                sort.ascending,
                format,
            )
            .map(|_| ExitCode::SUCCESS)
            .or_else(exit_for)
        }
        Commands::Html {
            root,
            covdir,
            genhtml,
        } => {
            let source_dir = root.join(config::SOURCE_DIR);
            match html::generate_html(&source_dir, &root.join(covdir), &genhtml) {
                Ok(index) => {
                    info!(index = %index.display(), "Open the report in a browser");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    warn!(error = %err, "HTML coverage report was not generated");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Clean { path } => clean::clean_artifacts(&path)
            .map(|_| ExitCode::SUCCESS)
            .or_else(exit_for),
    }
}

fn run_test(args: TestArgs) -> Result<ExitCode> {
    let config = match RunConfig::try_from(args) {
        Ok(config) => config,
        Err(err) => return exit_for(err),
    };
    match runner::run(&config) {
        Ok(result) => Ok(ExitCode::from(result.exit_code())),
        Err(err) => exit_for(err),
    }
}

/// Report a library error and turn it into the matching exit code.
fn exit_for(err: RunnerError) -> Result<ExitCode> {
    if matches!(err, RunnerError::Io { .. }) {
        return Err(err.into());
    }
    if err.is_configuration() {
        error!("configuration error: {err}");
    } else {
        error!("{err}");
    }
    Ok(ExitCode::from(err.exit_code()))
}
