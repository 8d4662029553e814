//! HTML report generation through an external `genhtml`.
//!
//! The merged artifacts are written as an lcov tracefile inside the output
//! directory and handed to the report tool. Rendering is entirely the tool's
//! business.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use crate::aggregate::{self, CoverageReport};
use crate::error::ReportError;
use crate::locator;

pub const DEFAULT_GENHTML: &str = "genhtml";
pub const TRACEFILE_NAME: &str = "lcov.info";
const REPORT_TITLE: &str = "Coverage Report";

/// Render `report` in lcov tracefile format. Only tracked lines get a `DA`
/// record.
pub fn format_tracefile(report: &CoverageReport) -> String {
    let mut out = String::new();
    for file in report.files() {
        let _ = writeln!(out, "SF:{}", file.source.display());
        for (idx, record) in file.lines().iter().enumerate() {
            if let Some(count) = record.count() {
                let _ = writeln!(out, "DA:{},{}", idx + 1, count);
            }
        }
        let stats = file.stats();
        let _ = writeln!(out, "LH:{}", stats.hit);
        let _ = writeln!(out, "LF:{}", stats.total);
        out.push_str("end_of_record\n");
    }
    out
}

pub fn write_tracefile(report: &CoverageReport, path: &Path) -> Result<(), ReportError> {
    fs::write(path, format_tracefile(report)).map_err(|err| ReportError::io(path, err))
}

/// Locate the report tool, by path or through `PATH`.
pub fn resolve_tool(tool: &Path) -> Result<PathBuf, ReportError> {
    which::which(tool).map_err(|err| ReportError::unavailable(tool, err))
}

/// Generate an HTML report in `out_dir` for the artifacts below `source_dir`.
///
/// Returns the path of the report's `index.html`.
pub fn generate_html(source_dir: &Path, out_dir: &Path, tool: &Path) -> Result<PathBuf, ReportError> {
    let report = aggregate::aggregate(locator::scan(source_dir)).report;
    generate_html_for(&report, out_dir, tool)
}

pub fn generate_html_for(
    report: &CoverageReport,
    out_dir: &Path,
    tool: &Path,
) -> Result<PathBuf, ReportError> {
    let tool = resolve_tool(tool)?;

    fs::create_dir_all(out_dir).map_err(|err| ReportError::io(out_dir, err))?;
    let tracefile = out_dir.join(TRACEFILE_NAME);
    write_tracefile(report, &tracefile)?;

    info!(
        tool = %tool.display(),
        out_dir = %out_dir.display(),
        files = report.len(),
        "Generating HTML coverage report",
    );

    let status = Command::new(&tool)
        .arg("--output-directory")
        .arg(out_dir)
        .arg("--title")
        .arg(REPORT_TITLE)
        .arg(&tracefile)
        .stdin(Stdio::null())
        .status()
        .map_err(|err| ReportError::unavailable(&tool, err))?;

    if !status.success() {
        return Err(ReportError::ToolFailed { tool, status });
    }

    let index = out_dir.join("index.html");
    info!(index = %index.display(), "HTML coverage report written");
    Ok(index)
}
