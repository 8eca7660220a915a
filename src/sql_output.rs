//! SQL-script-like output format
//!
//! Each event becomes a commented header followed by the victim's and the
//! culprit's statements, so the report can be read or replayed as a script.

use crate::chain::LockInvalidationChain;
use crate::error::{AnalyzerError, Result};
use crate::log_record::LogRecord;
use crate::report::{by_victim_time, generated_at_now, Renderer};
use std::fmt::{self, Write};

const RULE_WIDTH: usize = 120;
const SEPARATOR_WIDTH: usize = 123;

/// SQL-script-like report
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    generated_at: String,
}

impl SqlRenderer {
    pub fn new() -> Self {
        Self::with_generated_at(generated_at_now())
    }

    /// Renderer with a fixed generation timestamp
    pub fn with_generated_at(generated_at: impl Into<String>) -> Self {
        Self {
            generated_at: generated_at.into(),
        }
    }

    fn write_report(&self, out: &mut String, chains: &[LockInvalidationChain]) -> fmt::Result {
        if chains.is_empty() {
            return writeln!(out, "-- No transaction lock invalidation events found");
        }

        let rule = "=".repeat(RULE_WIDTH);
        writeln!(out, "-- {rule}")?;
        writeln!(out, "-- YDB Transaction Lock Invalidation (TLI) Analysis Report")?;
        writeln!(out, "-- {rule}")?;
        writeln!(out, "-- Generated at: {}", self.generated_at)?;
        writeln!(out, "-- Total invalidation events: {}", chains.len())?;
        writeln!(out, "-- {rule}\n")?;

        for (i, chain) in by_victim_time(chains).into_iter().enumerate() {
            write_event(out, chain, i + 1)?;
        }
        Ok(())
    }
}

impl Default for SqlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SqlRenderer {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn render(&self, chains: &[LockInvalidationChain]) -> Result<String> {
        let mut out = String::new();
        self.write_report(&mut out, chains)
            .map_err(|e| AnalyzerError::Render {
                format: self.name(),
                message: e.to_string(),
            })?;
        Ok(out)
    }
}

fn write_event(out: &mut String, chain: &LockInvalidationChain, event_id: usize) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "-- {rule}")?;
    writeln!(out, "-- TLI EVENT #{event_id}")?;
    writeln!(out, "-- Timestamp: {}", chain.victim_entry.timestamp)?;
    if let Some(table) = &chain.table_name {
        writeln!(out, "-- Table: {table}")?;
    }
    writeln!(out, "-- Victim raw log: {}", chain.victim_entry.raw_line.trim())?;
    if let Some(culprit) = &chain.culprit_entry {
        writeln!(out, "-- Culprit raw log: {}", culprit.raw_line.trim())?;
    }
    writeln!(out, "-- {rule}\n")?;

    write_section_header(out, "VICTIM TRANSACTION")?;
    writeln!(out, "-- Session ID: {}", chain.victim_session_id)?;
    if let Some(tx) = &chain.victim_tx_id {
        writeln!(out, "-- Transaction ID: {tx}")?;
    }
    if let (Some(first), Some(last)) = (chain.victim_queries.first(), chain.victim_queries.last()) {
        writeln!(out, "-- Transaction Start: {}", or_unknown(&first.timestamp))?;
        writeln!(out, "-- Transaction End: {}", or_unknown(&last.timestamp))?;
    }
    writeln!(out)?;
    for query in &chain.victim_queries {
        write_statement(out, query)?;
    }
    writeln!(out)?;

    write_section_header(out, "CULPRIT TRANSACTION")?;
    writeln!(
        out,
        "-- Session ID: {}",
        chain.culprit_session_id.as_deref().unwrap_or("None")
    )?;
    if let Some(tx) = &chain.culprit_tx_id {
        writeln!(out, "-- Transaction ID: {tx}")?;
    }
    writeln!(out)?;
    for query in &chain.culprit_queries {
        write_statement(out, query)?;
    }
    writeln!(out)?;

    writeln!(out)
}

fn write_section_header(out: &mut String, title: &str) -> fmt::Result {
    let rule = "-".repeat(RULE_WIDTH);
    writeln!(out, "-- {rule}")?;
    writeln!(out, "-- {title}")?;
    writeln!(out, "-- {rule}")
}

fn write_statement(out: &mut String, query: &LogRecord) -> fmt::Result {
    let separator = format!(
        "-- {} --- {} {}",
        or_unknown(&query.timestamp),
        query.trace_id.as_deref().unwrap_or("None"),
        "-".repeat(RULE_WIDTH)
    );
    writeln!(out, "{}", truncate_chars(&separator, SEPARATOR_WIDTH))?;

    match &query.query_text {
        Some(text) => {
            let statement = dedent(text);
            let statement = statement.trim();
            if statement.ends_with(';') {
                writeln!(out, "{statement}")?;
            } else {
                writeln!(out, "{statement};")?;
            }
        }
        None => writeln!(out, "-- {}", query.query_action.as_deref().unwrap_or("None"))?,
    }
    writeln!(out)
}

fn or_unknown(timestamp: &str) -> &str {
    if timestamp.is_empty() {
        "unknown"
    } else {
        timestamp
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Remove the whitespace prefix common to every non-blank line
pub fn dedent(text: &str) -> String {
    let prefix = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start().len()])
        .reduce(|common, indent| {
            let shared = common
                .char_indices()
                .zip(indent.chars())
                .take_while(|((_, a), b)| a == b)
                .last()
                .map_or(0, |((idx, c), _)| idx + c.len_utf8());
            &common[..shared]
        })
        .unwrap_or("");

    text.lines()
        .map(|line| line.strip_prefix(prefix).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    fn render(chains: &[LockInvalidationChain]) -> String {
        SqlRenderer::with_generated_at("2025-10-22T10:00:00.000000")
            .render(chains)
            .unwrap()
    }

    #[test]
    fn test_single_event_sections() {
        let out = render(&[fixtures::chain(
            "2025-10-22T07:54:51.433950Z",
            "SELECT * FROM tt1",
            "UPDATE tt1 SET col=1",
        )]);

        assert!(out.contains("YDB Transaction Lock Invalidation (TLI) Analysis Report"));
        assert!(out.contains("-- Generated at: 2025-10-22T10:00:00.000000"));
        assert!(out.contains("-- Total invalidation events: 1"));
        assert!(out.contains("-- TLI EVENT #1"));
        assert!(out.contains("-- Table: /Root/database/test_schema/tt1"));
        assert!(out.contains("-- Victim raw log: victim raw line\n"));
        assert!(out.contains("-- Culprit raw log: culprit raw line\n"));
        assert!(out.contains("VICTIM TRANSACTION"));
        assert!(out.contains("CULPRIT TRANSACTION"));
        assert!(out.contains("victim_trace_id"));
        assert!(out.contains("culprit_trace_id"));
        assert!(out.contains("\nSELECT * FROM tt1;\n"));
        assert!(out.contains("\nUPDATE tt1 SET col=1;\n"));
        assert!(out.contains("-- Transaction Start: 2025-10-22T07:54:51.100000Z"));
    }

    #[test]
    fn test_two_events_numbered() {
        let out = render(&[
            fixtures::chain("2025-10-22T07:54:52.000000Z", "SELECT 2", "UPDATE 2"),
            fixtures::chain("2025-10-22T07:54:51.000000Z", "SELECT 1", "UPDATE 1"),
        ]);
        assert!(out.contains("-- Total invalidation events: 2"));
        let first = out.find("-- TLI EVENT #1").unwrap();
        let second = out.find("-- TLI EVENT #2").unwrap();
        assert!(first < second);
        assert!(out[first..second].contains("2025-10-22T07:54:51.000000Z"));
    }

    #[test]
    fn test_empty_chain_set() {
        assert_eq!(render(&[]), "-- No transaction lock invalidation events found\n");
    }

    #[test]
    fn test_separator_truncated() {
        let out = render(&[fixtures::chain("2025-10-22T07:54:51.000000Z", "SELECT 1", "UPDATE 1")]);
        let separator = out
            .lines()
            .find(|l| l.starts_with("-- 2025-10-22T07:54:51.100000Z --- victim_trace_id"))
            .unwrap();
        assert_eq!(separator.chars().count(), SEPARATOR_WIDTH);
    }

    #[test]
    fn test_statement_without_text_shows_action() {
        let mut chain = fixtures::chain("2025-10-22T07:54:51.000000Z", "SELECT 1", "UPDATE 1");
        chain.victim_queries.push(fixtures::query(
            "2025-10-22T07:54:51.200000Z",
            "victim_trace_id",
            None,
            "QUERY_ACTION_COMMIT_TX",
        ));
        let out = render(&[chain]);
        assert!(out.contains("\n-- QUERY_ACTION_COMMIT_TX\n"));
    }

    #[test]
    fn test_existing_semicolon_not_doubled() {
        let out = render(&[fixtures::chain("2025-10-22T07:54:51.000000Z", "SELECT 1;", "UPDATE 1")]);
        assert!(out.contains("\nSELECT 1;\n"));
        assert!(!out.contains("SELECT 1;;"));
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    SELECT *\n      FROM t\n    WHERE x"), "SELECT *\n  FROM t\nWHERE x");
        assert_eq!(dedent("SELECT 1\n    FROM t"), "SELECT 1\n    FROM t");
        assert_eq!(dedent("\n    SELECT 1\n\n    FROM t\n"), "\nSELECT 1\n\nFROM t");
    }
}
