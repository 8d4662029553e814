//! Tabular coverage summary.
//!
//! Renders a [`CoverageReport`] as a text table or as JSON.

use std::cmp::Ordering;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::aggregate::{self, CoverageReport, FileCoverage};
use crate::error::{RunnerError, RunnerResult};
use crate::locator;

/// Column the summary is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    File,
    Total,
    Hit,
    Missed,
    Coverage,
}

impl FromStr for SortKey {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "path" => Ok(SortKey::File),
            "total" => Ok(SortKey::Total),
            "hit" => Ok(SortKey::Hit),
            "missed" => Ok(SortKey::Missed),
            "coverage" | "coverage%" => Ok(SortKey::Coverage),
            _ => Err(RunnerError::invalid_argument(format!(
                "unknown sort key '{}'. Use file, total, hit, missed or coverage",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// How rows are ordered. Without a key, rows are ascending by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub key: Option<SortKey>,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn by(key: SortKey) -> Self {
        Self {
            key: Some(key),
            order: SortOrder::Descending,
        }
    }

    pub fn ascending(mut self) -> Self {
        self.order = SortOrder::Ascending;
        self
    }

    /// Parse an optional key name as given on the command line.
    pub fn parse(key: Option<&str>, ascending: bool) -> RunnerResult<Self> {
        let key = key.map(SortKey::from_str).transpose()?;
        let order = if ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        Ok(Self { key, order })
    }

    fn compare(&self, a: &FileCoverage, b: &FileCoverage) -> Ordering {
        let Some(key) = self.key else {
            return a.path.cmp(&b.path);
        };
        let primary = match key {
            SortKey::File => a.path.cmp(&b.path),
            SortKey::Total => a.stats().total.cmp(&b.stats().total),
            SortKey::Hit => a.stats().hit.cmp(&b.stats().hit),
            SortKey::Missed => a.stats().missed.cmp(&b.stats().missed),
            SortKey::Coverage => compare_percent(a.percent(), b.percent()),
        };
        let primary = match self.order {
            SortOrder::Ascending => primary,
            SortOrder::Descending => primary.reverse(),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    }
}

// Undefined coverage sorts below every percentage.
fn compare_percent(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format '{}'. Use 'text' or 'json'", s)),
        }
    }
}

pub fn sorted_rows<'a>(report: &'a CoverageReport, spec: SortSpec) -> Vec<&'a FileCoverage> {
    let mut rows: Vec<&FileCoverage> = report.files().iter().collect();
    rows.sort_by(|a, b| spec.compare(a, b));
    rows
}

/// One decimal place, `N/A` when undefined. Anything short of full coverage
/// prints at most `99.9`.
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p < 100.0 => format!("{:.1}", p.min(99.9)),
        Some(p) => format!("{:.1}", p),
        None => "N/A".to_string(),
    }
}

pub fn format_summary(report: &CoverageReport, spec: SortSpec, format: OutputFormat) -> String {
    let rows = sorted_rows(report, spec);
    match format {
        OutputFormat::Text => format_summary_text(&rows),
        OutputFormat::Json => format_summary_json(&rows),
    }
}

fn format_summary_text(rows: &[&FileCoverage]) -> String {
    if rows.is_empty() {
        return "No coverage data found.\n".to_string();
    }

    let width = rows
        .iter()
        .map(|f| f.path.chars().count())
        .max()
        .unwrap_or(0)
        .max("File".len());

    let mut output = String::new();
    output.push_str(&format!(
        "{:<width$}  {:>7} {:>7} {:>7} {:>9}\n",
        "File", "Total", "Hit", "Missed", "Coverage%"
    ));
    output.push_str(&format!("{}\n", "-".repeat(width + 35)));
    for file in rows {
        let stats = file.stats();
        output.push_str(&format!(
            "{:<width$}  {:>7} {:>7} {:>7} {:>9}\n",
            file.path,
            stats.total,
            stats.hit,
            stats.missed,
            format_percent(stats.percent())
        ));
    }
    output
}

fn format_summary_json(rows: &[&FileCoverage]) -> String {
    #[derive(Serialize)]
    struct JsonSummary<'a> {
        files: Vec<JsonFile<'a>>,
    }

    #[derive(Serialize)]
    struct JsonFile<'a> {
        file: &'a str,
        total: usize,
        hit: usize,
        missed: usize,
        coverage: Option<f64>,
    }

    let summary = JsonSummary {
        files: rows
            .iter()
            .map(|f| {
                let stats = f.stats();
                JsonFile {
                    file: &f.path,
                    total: stats.total,
                    hit: stats.hit,
                    missed: stats.missed,
                    coverage: stats.percent(),
                }
            })
            .collect(),
    };

    serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string()) + "\n"
}

pub fn write_summary<W: Write>(
    out: &mut W,
    report: &CoverageReport,
    spec: SortSpec,
    format: OutputFormat,
) -> io::Result<()> {
    out.write_all(format_summary(report, spec, format).as_bytes())
}

/// Scan `path` for artifacts and print their summary.
///
/// The sort key is validated before anything is scanned or written. Artifacts
/// that fail to parse are logged and left out of the table.
pub fn show_coverage<W: Write>(
    out: &mut W,
    path: &Path,
    sort_by: Option<&str>,
    ascending: bool,
    format: OutputFormat,
) -> RunnerResult<CoverageReport> {
    let spec = SortSpec::parse(sort_by, ascending)?;
    let aggregation = aggregate::aggregate(locator::scan(path));
    write_summary(out, &aggregation.report, spec, format)
        .map_err(|err| RunnerError::io("<stdout>", err))?;
    Ok(aggregation.report)
}
