//! Reverse-chronological ordering of raw log lines
//!
//! The correlator needs the latest record first. Sorting is done in process
//! on the whitespace-separated timestamp column, with the same ordering as
//! `sort -k<N>,<N> -r`: key descending, whole line descending for equal keys.

use crate::log_parser::lossy_lines;
use crate::log_record::LogFormat;
use std::cmp::Ordering;
use std::io::{self, BufRead};

/// Read every line of `reader` and return them latest-first
///
/// Lines that lack the timestamp column get an empty key and sort last.
/// Invalid UTF-8 is replaced, not fatal; any read failure aborts the sort.
pub fn sort_reverse_chronological<R: BufRead>(reader: R, format: LogFormat) -> io::Result<Vec<String>> {
    let mut lines = lossy_lines(reader).collect::<io::Result<Vec<String>>>()?;
    let column = format.timestamp_column();
    lines.sort_by(|a, b| compare_desc(a, b, column));
    tracing::debug!("Sorted {} log lines on column {}", lines.len(), column);
    Ok(lines)
}

/// Whitespace-separated field `column` (1-based), or `""` when absent
pub fn sort_key(line: &str, column: usize) -> &str {
    line.split_whitespace()
        .nth(column.saturating_sub(1))
        .unwrap_or("")
}

fn compare_desc(a: &str, b: &str, column: usize) -> Ordering {
    sort_key(b, column)
        .cmp(sort_key(a, column))
        .then_with(|| b.cmp(a))
}
