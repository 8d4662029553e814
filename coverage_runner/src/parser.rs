//! Parsing of `.cov` artifacts.
//!
//! Every artifact line mirrors one source line and starts with a
//! right-aligned count field:
//!
//! ```text
//!         - function solve(x)
//!         3     y = x + 1
//!         0     error("unreachable")
//! ```
//!
//! `-` marks a line the runtime does not track.

use std::fs;
use std::path::Path;

use crate::error::ParseError;

pub const NOT_TRACKED_MARKER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRecord {
    NotTracked,
    Hit(u64),
    Missed,
}

impl LineRecord {
    pub fn from_count(count: u64) -> Self {
        if count == 0 {
            Self::Missed
        } else {
            Self::Hit(count)
        }
    }

    pub fn is_tracked(self) -> bool {
        !matches!(self, Self::NotTracked)
    }

    /// Execution count, `None` for untracked lines.
    pub fn count(self) -> Option<u64> {
        match self {
            Self::NotTracked => None,
            Self::Hit(n) => Some(n),
            Self::Missed => Some(0),
        }
    }
}

/// Classify one artifact line. `Err` carries the offending count field.
pub fn parse_line(line: &str) -> Result<LineRecord, String> {
    let Some(field) = line.split_whitespace().next() else {
        return Ok(LineRecord::NotTracked);
    };
    if field == NOT_TRACKED_MARKER {
        return Ok(LineRecord::NotTracked);
    }
    field
        .parse::<u64>()
        .map(LineRecord::from_count)
        .map_err(|_| field.to_string())
}

pub fn parse_str(path: &Path, content: &str) -> Result<Vec<LineRecord>, ParseError> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            parse_line(line).map_err(|field| ParseError::Count {
                path: path.to_path_buf(),
                line: idx + 1,
                field,
            })
        })
        .collect()
}

/// Read and parse one artifact. The source text copied into each line may be
/// in any encoding; only the count fields need to be ASCII.
pub fn parse_artifact(path: &Path) -> Result<Vec<LineRecord>, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(path, &String::from_utf8_lossy(&bytes))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_line__marker__then_not_tracked() {
        assert_eq!(parse_line("        - end"), Ok(LineRecord::NotTracked));
    }

    #[test]
    fn parse_line__zero__then_missed() {
        assert_eq!(parse_line("        0     error(\"x\")"), Ok(LineRecord::Missed));
    }

    #[test]
    fn parse_line__positive__then_hit_with_count() {
        assert_eq!(parse_line("       12     y = x + 1"), Ok(LineRecord::Hit(12)));
    }

    #[test]
    fn parse_line__blank__then_not_tracked() {
        assert_eq!(parse_line(""), Ok(LineRecord::NotTracked));
        assert_eq!(parse_line("   "), Ok(LineRecord::NotTracked));
    }

    #[test]
    fn parse_line__garbage_field__then_error_with_field() {
        assert_eq!(parse_line("      abc x"), Err("abc".to_string()));
        assert_eq!(parse_line("       -3 x"), Err("-3".to_string()));
    }

    #[test]
    fn parse_str__mixed_artifact__then_records_in_file_order() {
        let content = "        - function f(x)\n        2     x + 1\n        0     x - 1\n        - end\n";
        let records = parse_str(Path::new("f.jl.cov"), content).unwrap();
        assert_eq!(
            records,
            vec![
                LineRecord::NotTracked,
                LineRecord::Hit(2),
                LineRecord::Missed,
                LineRecord::NotTracked,
            ]
        );
    }

    #[test]
    fn parse_str__malformed_line__then_reports_line_number() {
        let content = "        1 a\n      ??? b\n";
        let err = parse_str(Path::new("g.jl.cov"), content).unwrap_err();
        match err {
            ParseError::Count { path, line, field } => {
                assert_eq!(path, PathBuf::from("g.jl.cov"));
                assert_eq!(line, 2);
                assert_eq!(field, "???");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_artifact__missing_file__then_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_artifact(&dir.path().join("absent.jl.cov")).unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
    }

    #[test]
    fn parse_artifact__latin1_source_text__then_counts_still_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.jl.cov");
        fs::write(&path, b"        - # caf\xe9\n        1 x = 1\n        0 y = \xff\n").unwrap();

        let records = parse_artifact(&path).unwrap();
        assert_eq!(records, vec![LineRecord::NotTracked, LineRecord::Hit(1), LineRecord::Missed]);
    }
}
