//! Coverage-instrumented test runner.
//!
//! Runs a Julia package's test suite in a subprocess with `--code-coverage`,
//! then turns the `.cov` artifacts the runtime leaves next to each source
//! file into a per-file summary and, optionally, an HTML report rendered by
//! `genhtml`.
//!
//! The pipeline flows one way:
//!
//! - [`runner`] spawns the suite and waits for it
//! - [`locator`] pairs artifacts with their source files
//! - [`parser`] classifies every artifact line
//! - [`aggregate`] merges runs into per-file totals
//! - [`summary`] prints the table, [`html`] hands the data to `genhtml`

pub mod aggregate;
pub mod app;
pub mod clean;
pub mod config;
pub mod error;
pub mod html;
pub mod locator;
pub mod parser;
pub mod runner;
pub mod summary;

pub use aggregate::{CoverageReport, FileCoverage};
pub use config::{CoverageMode, RunConfig, RuntimeFlags, RuntimeSnapshot};
pub use error::{ParseError, ReportError, RunnerError, RunnerResult};
pub use parser::LineRecord;
pub use runner::{RunResult, TestStatus};
