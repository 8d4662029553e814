//! Merging per-line records into per-file coverage.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::error::ParseError;
use crate::locator::CoverageArtifact;
use crate::parser::{self, LineRecord};

/// Union of two observations of the same source line.
///
/// A line is hit if any run hit it and missed only if some run tracked it and
/// no run hit it. Hit counts add up.
pub fn merge_line(a: LineRecord, b: LineRecord) -> LineRecord {
    use crate::parser::LineRecord::*;
    match (a, b) {
        (Hit(x), Hit(y)) => Hit(x.saturating_add(y)),
        (Hit(x), _) | (_, Hit(x)) => Hit(x),
        (Missed, _) | (_, Missed) => Missed,
        (NotTracked, NotTracked) => NotTracked,
    }
}

/// Merge `incoming` into `merged` line by line, growing `merged` if the
/// incoming run saw more lines.
pub fn merge_records(merged: &mut Vec<LineRecord>, incoming: &[LineRecord]) {
    if merged.len() < incoming.len() {
        merged.resize(incoming.len(), LineRecord::NotTracked);
    }
    for (slot, record) in merged.iter_mut().zip(incoming) {
        *slot = merge_line(*slot, *record);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageStats {
    pub total: usize,
    pub hit: usize,
    pub missed: usize,
}

impl CoverageStats {
    pub fn from_records(records: &[LineRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            match record {
                LineRecord::Hit(_) => stats.hit += 1,
                LineRecord::Missed => stats.missed += 1,
                LineRecord::NotTracked => continue,
            }
            stats.total += 1;
        }
        stats
    }

    /// Percentage of tracked lines that were hit; `None` when nothing is
    /// tracked.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.hit as f64 / self.total as f64 * 100.0)
        }
    }
}

/// Coverage of one source file. Totals are derived from the merged line
/// records and only change through [`FileCoverage::merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileCoverage {
    /// Normalized path relative to the scanned directory.
    pub path: String,
    pub source: PathBuf,
    stats: CoverageStats,
    lines: Vec<LineRecord>,
}

impl FileCoverage {
    pub fn new(path: impl Into<String>, source: impl Into<PathBuf>, lines: Vec<LineRecord>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            stats: CoverageStats::from_records(&lines),
            lines,
        }
    }

    /// Fold another run of the same file into this one.
    pub fn merge(&mut self, records: &[LineRecord]) {
        merge_records(&mut self.lines, records);
        self.stats = CoverageStats::from_records(&self.lines);
    }

    pub fn stats(&self) -> CoverageStats {
        self.stats
    }

    pub fn percent(&self) -> Option<f64> {
        self.stats.percent()
    }

    pub fn lines(&self) -> &[LineRecord] {
        &self.lines
    }
}

/// Per-file coverage in discovery order, one entry per path.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    files: Vec<FileCoverage>,
    index: HashMap<String, usize>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one run of `path`. A path seen before is merged into its existing
    /// entry; a new path is appended.
    pub fn insert(&mut self, path: &str, source: impl Into<PathBuf>, records: Vec<LineRecord>) {
        match self.index.get(path) {
            Some(&slot) => self.files[slot].merge(&records),
            None => {
                self.index.insert(path.to_string(), self.files.len());
                self.files.push(FileCoverage::new(path, source, records));
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.index.get(path).map(|&slot| &self.files[slot])
    }

    pub fn files(&self) -> &[FileCoverage] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Report built from a scan plus the artifacts that failed to parse.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub report: CoverageReport,
    pub failures: Vec<ParseError>,
}

pub fn aggregate<I>(artifacts: I) -> Aggregation
where
    I: IntoIterator<Item = CoverageArtifact>,
{
    let mut aggregation = Aggregation::default();
    for artifact in artifacts {
        match parser::parse_artifact(&artifact.artifact) {
            Ok(records) => aggregation
                .report
                .insert(&artifact.key, artifact.source, records),
            Err(err) => {
                warn!(error = %err, "skipping unparseable coverage artifact");
                aggregation.failures.push(err);
            }
        }
    }
    aggregation
}
