//! Trace comparator
//!
//! Offline diff of two activation traces, typically a simulator dump against
//! what the hardware emulator printed for the same layer. Both sides are
//! `<index> <value>` lines; the emulator writes `<index>: <value>`, so a
//! colon after the index is accepted.
//!
//! Lines are paired by position after each side's header is skipped. Bad
//! lines never abort the comparison: they are reported as [`ParseWarning`]s
//! and the pair is skipped.

use crate::error::{Result, SimError};
use std::fmt;
use std::fs;
use std::path::Path;

/// Which trace a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceSide {
    /// Reference trace
    Expected,
    /// Trace under test
    Actual,
}

impl fmt::Display for TraceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expected => "expected",
            Self::Actual => "actual",
        })
    }
}

/// One parsed trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Flat node index
    pub index: usize,
    /// Node value
    pub value: i64,
}

/// Parse `<index> <value>` or `<index>: <value>`
///
/// # Errors
///
/// Returns a description of what is wrong with the line.
pub fn parse_line(line: &str) -> std::result::Result<TraceEntry, String> {
    let mut fields = line.split_whitespace();
    let (Some(index), Some(value)) = (fields.next(), fields.next()) else {
        return Err("expected `<index> <value>`".to_string());
    };
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected trailing field `{extra}`"));
    }
    let index = index.strip_suffix(':').unwrap_or(index);
    let index = index
        .parse::<usize>()
        .map_err(|e| format!("bad index `{index}`: {e}"))?;
    let value = value
        .parse::<i64>()
        .map_err(|e| format!("bad value `{value}`: {e}"))?;
    Ok(TraceEntry { index, value })
}

/// A line that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Trace the line came from
    pub side: TraceSide,
    /// 1-based line number in that trace
    pub line: usize,
    /// Raw line content
    pub content: String,
    /// What was wrong
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {}: {} ({:?})",
            self.side, self.line, self.reason, self.content
        )
    }
}

/// A value that differs between the traces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Node index (from the expected side)
    pub index: usize,
    /// Expected value
    pub expected: i64,
    /// Actual value
    pub actual: i64,
    /// `actual − expected`
    pub delta: i64,
}

/// Outcome of a comparison
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonReport {
    /// Differing values in trace order
    pub mismatches: Vec<Mismatch>,
    /// Number of pairs compared
    pub compared: usize,
    /// Lines that were skipped or misaligned
    pub warnings: Vec<ParseWarning>,
    /// Lines present on only one side
    pub unmatched: usize,
}

impl ComparisonReport {
    /// First differing value, if any
    pub fn first_divergence(&self) -> Option<&Mismatch> {
        self.mismatches.first()
    }

    /// True if no value differs
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Configurable line-by-line comparator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceComparator {
    /// Leading lines to skip on the expected side
    pub expected_header: usize,
    /// Leading lines to skip on the actual side
    pub actual_header: usize,
    /// After the header, also skip actual lines until the first with index 0
    pub sync_on_zero: bool,
}

impl TraceComparator {
    /// Comparator with no headers and no sync
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `lines` header lines on the expected side
    #[must_use]
    pub fn with_expected_header(mut self, lines: usize) -> Self {
        self.expected_header = lines;
        self
    }

    /// Skip `lines` header lines on the actual side
    #[must_use]
    pub fn with_actual_header(mut self, lines: usize) -> Self {
        self.actual_header = lines;
        self
    }

    /// Enable sync-on-zero for the actual side
    #[must_use]
    pub fn with_sync_on_zero(mut self, sync: bool) -> Self {
        self.sync_on_zero = sync;
        self
    }

    /// Compare two trace texts
    pub fn compare(&self, expected: &str, actual: &str) -> ComparisonReport {
        let mut report = ComparisonReport::default();

        let expected_lines = body(expected, self.expected_header);
        let mut actual_lines = body(actual, self.actual_header);
        if self.sync_on_zero {
            let start = actual_lines
                .iter()
                .position(|(_, l)| matches!(parse_line(l), Ok(TraceEntry { index: 0, .. })));
            if let Some(start) = start {
                actual_lines.drain(..start);
            } else {
                report.warnings.push(ParseWarning {
                    side: TraceSide::Actual,
                    line: self.actual_header + 1,
                    content: String::new(),
                    reason: "no line with index 0 to sync on".to_string(),
                });
                actual_lines.clear();
            }
        }

        for (&(e_no, e_line), &(a_no, a_line)) in expected_lines.iter().zip(&actual_lines) {
            let e = parse_line(e_line).map_err(|reason| ParseWarning {
                side: TraceSide::Expected,
                line: e_no,
                content: e_line.to_string(),
                reason,
            });
            let a = parse_line(a_line).map_err(|reason| ParseWarning {
                side: TraceSide::Actual,
                line: a_no,
                content: a_line.to_string(),
                reason,
            });
            let (e, a) = match (e, a) {
                (Ok(e), Ok(a)) => (e, a),
                (e, a) => {
                    report.warnings.extend(e.err());
                    report.warnings.extend(a.err());
                    continue;
                }
            };
            if e.index != a.index {
                report.warnings.push(ParseWarning {
                    side: TraceSide::Actual,
                    line: a_no,
                    content: a_line.to_string(),
                    reason: format!("index {} does not line up with expected index {}", a.index, e.index),
                });
            }
            report.compared += 1;
            if e.value != a.value {
                report.mismatches.push(Mismatch {
                    index: e.index,
                    expected: e.value,
                    actual: a.value,
                    delta: a.value.saturating_sub(e.value),
                });
            }
        }
        report.unmatched = expected_lines.len().abs_diff(actual_lines.len());

        for warning in &report.warnings {
            tracing::warn!("{warning}");
        }
        tracing::debug!(
            "Compared {} values: {} mismatches, {} unmatched",
            report.compared,
            report.mismatches.len(),
            report.unmatched
        );
        report
    }

    /// Compare two trace files
    ///
    /// # Errors
    ///
    /// Returns error if either file cannot be read.
    pub fn compare_files<P: AsRef<Path>, Q: AsRef<Path>>(&self, expected: P, actual: Q) -> Result<ComparisonReport> {
        let expected = read_trace(expected.as_ref())?;
        let actual = read_trace(actual.as_ref())?;
        Ok(self.compare(&expected, &actual))
    }
}

/// Numbered lines after `header`, without trailing blank lines
fn body(text: &str, header: usize) -> Vec<(usize, &str)> {
    let mut lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .skip(header)
        .map(|(i, l)| (i + 1, l))
        .collect();
    while lines.last().is_some_and(|(_, l)| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

fn read_trace(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(SimError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_forms() {
        assert_eq!(parse_line("3 17"), Ok(TraceEntry { index: 3, value: 17 }));
        assert_eq!(parse_line("3: -17"), Ok(TraceEntry { index: 3, value: -17 }));
        assert_eq!(parse_line("  12\t255  "), Ok(TraceEntry { index: 12, value: 255 }));
        assert!(parse_line("3").is_err());
        assert!(parse_line("").is_err());
        assert!(parse_line("x 1").is_err());
        assert!(parse_line("1 y").is_err());
        assert!(parse_line("1 2 3").is_err());
    }

    #[test]
    fn test_body_skips_header_and_trailing_blanks() {
        let lines = body("h1\nh2\n0 1\n1 2\n\n", 2);
        assert_eq!(lines, vec![(3, "0 1"), (4, "1 2")]);
    }

    #[test]
    fn test_empty_traces() {
        let report = TraceComparator::new().compare("", "");
        assert!(report.is_clean());
        assert_eq!(report.compared, 0);
        assert_eq!(report.unmatched, 0);
    }
}
