//! Log line parser
//!
//! Parsing runs in two stages. The transport envelope (date, host,
//! `process[pid]:`) depends on the [`LogFormat`]; the payload grammar is
//! shared by both dialects:
//!
//! ```text
//! 2025-10-22T07:54:51.433950Z :DATA_INTEGRITY DEBUG: Component: SessionActor,SessionId: ...,TraceId: ...
//! ^ timestamp                  ^ category     ^ level  ^ labelled fields, any subset, any order
//! ```
//!
//! A line without the `:<CATEGORY> <LEVEL>:` marker is rejected. Rejections
//! are not errors; [`RecordStream`] counts them in [`ParseStats`].

use crate::log_record::{LogFormat, LogRecord};
use regex::Regex;
use std::io::{self, BufRead};

/// Labelled single-value fields, all extracted independently
#[derive(Debug)]
struct FieldPatterns {
    session_id: Regex,
    trace_id: Regex,
    phy_tx_id: Regex,
    tx_id: Regex,
    status: Regex,
    key: Regex,
    component: Regex,
    query_action: Regex,
    query_type: Regex,
}

/// Parser for one input dialect
#[derive(Debug)]
pub struct LogParser {
    format: LogFormat,
    envelope: Regex,
    marker: Regex,
    timestamp: Regex,
    fields: FieldPatterns,
    lock_id: Regex,
    break_locks: Regex,
    issues_open: Regex,
    issues_token: Regex,
    query_text_quoted: Regex,
    query_text_token: Regex,
    begin_tx: Regex,
}

fn labelled(label: &str, value: &str) -> Regex {
    // Patterns are literals; a failure here is a programming error caught by tests
    Regex::new(&format!(r"\b{label}:\s*({value})")).expect("valid field pattern")
}

impl LogParser {
    /// Create a parser for the given dialect
    pub fn new(format: LogFormat) -> Self {
        let token = r"[^,\s]+";
        Self {
            format,
            envelope: Regex::new(r"^\w+\s+\d+\s+\d+:\d+:\d+\s+(\S+)\s+([^\[]+)\[(\d+)\]:\s*(.+)$")
                .expect("valid envelope pattern"),
            marker: Regex::new(r":(\w+)\s+(\w+):").expect("valid marker pattern"),
            timestamp: Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z")
                .expect("valid timestamp pattern"),
            fields: FieldPatterns {
                session_id: labelled("SessionId", token),
                trace_id: labelled("TraceId", token),
                phy_tx_id: labelled("PhyTxId", r"\d+"),
                tx_id: labelled("TxId", token),
                status: labelled("Status", token),
                key: labelled("Key", token),
                component: labelled("Component", token),
                query_action: labelled("QueryAction", token),
                query_type: labelled("QueryType", token),
            },
            lock_id: labelled("LockId", r"\d+"),
            break_locks: labelled("BreakLocks", r"\[[^\]]*\]"),
            issues_open: labelled("Issues", r"\{"),
            issues_token: labelled("Issues", r"[^,\s{]+"),
            query_text_quoted: labelled("QueryText", r#""(?:[^"\\]|\\.)*""#),
            query_text_token: labelled("QueryText", r#"[^,\s"]+"#),
            begin_tx: Regex::new(r"\bBeginTx:\s*true\b").expect("valid flag pattern"),
        }
    }

    /// Dialect this parser was built for
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Parse one line, or `None` if it does not match the grammar
    pub fn parse_line(&self, line: &str) -> Option<LogRecord> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let (node, process, payload) = match self.format {
            LogFormat::Systemd => {
                let caps = self.envelope.captures(line)?;
                let process = format!("{}[{}]", caps[2].trim(), &caps[3]);
                (
                    Some(caps[1].to_string()),
                    Some(process),
                    caps.get(4).map_or("", |m| m.as_str()),
                )
            }
            LogFormat::Raw => (None, None, line),
        };

        let marker = self.marker.captures(payload)?;
        let fields = &self.fields;

        Some(LogRecord {
            timestamp: self
                .timestamp
                .find(payload)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            node,
            process,
            category: Some(marker[1].to_string()),
            level: Some(marker[2].to_string()),
            component: capture(&fields.component, payload),
            session_id: capture(&fields.session_id, payload),
            trace_id: capture(&fields.trace_id, payload),
            phy_tx_id: capture(&fields.phy_tx_id, payload),
            tx_id: capture(&fields.tx_id, payload),
            lock_ids: self.lock_ids(payload),
            break_locks: self.break_locks(payload),
            status: capture(&fields.status, payload),
            issues: self.issues(payload),
            query_text: self.query_text(payload),
            query_action: capture(&fields.query_action, payload),
            query_type: capture(&fields.query_type, payload),
            key: capture(&fields.key, payload),
            begin_tx: self.begin_tx.is_match(payload),
            raw_line: line.to_string(),
        })
    }

    /// Wrap a line source into a record stream that counts rejections
    pub fn parse_stream<I>(&self, lines: I) -> RecordStream<'_, I>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        RecordStream {
            parser: self,
            lines,
            stats: ParseStats::default(),
        }
    }

    fn lock_ids(&self, payload: &str) -> Option<Vec<String>> {
        let ids: Vec<String> = self
            .lock_id
            .captures_iter(payload)
            .map(|caps| caps[1].to_string())
            .collect();
        non_empty(ids)
    }

    fn break_locks(&self, payload: &str) -> Option<Vec<String>> {
        let caps = self.break_locks.captures(payload)?;
        let list = caps[1].trim_start_matches('[').trim_end_matches(']');
        non_empty(list.split_whitespace().map(str::to_string).collect())
    }

    fn issues(&self, payload: &str) -> Option<String> {
        if let Some(open) = self.issues_open.captures(payload).and_then(|caps| caps.get(1)) {
            if let Some(body) = braced_body(&payload[open.end()..]) {
                return normalize(body);
            }
        }
        capture(&self.issues_token, payload)
    }

    fn query_text(&self, payload: &str) -> Option<String> {
        if let Some(caps) = self.query_text_quoted.captures(payload) {
            let quoted = &caps[1];
            let text = unescape(&quoted[1..quoted.len() - 1]);
            return (!text.trim().is_empty()).then_some(text);
        }
        capture(&self.query_text_token, payload)
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new(LogFormat::default())
    }
}

fn capture(pattern: &Regex, payload: &str) -> Option<String> {
    pattern
        .captures(payload)
        .and_then(|caps| normalize(&caps[1]))
}

/// Text up to the `}` closing an already opened block
///
/// Braces inside double-quoted strings do not count. `None` when the block
/// is never closed.
fn braced_body(rest: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Some(&rest[..i]),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Trim, mapping the empty string to unset
fn normalize(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

/// Undo the log writer's escaping: `\n`, `\"` and `\\`
///
/// Any other backslash sequence is kept verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Inverse of [`unescape`], used to build synthetic log lines
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Lines of `reader` with invalid UTF-8 replaced by U+FFFD
///
/// A damaged byte sequence only spoils its own line; read failures are still
/// passed through.
pub fn lossy_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.split(b'\n').map(|line| {
        let mut bytes = line?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Ok(match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Replacing invalid UTF-8 in log line");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        })
    })
}

/// Counters for one parsed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: u64,
    pub records: u64,
    pub rejected: u64,
}

/// Iterator of parsed records over a line source
///
/// Rejected lines are skipped and counted; read errors are passed through.
pub struct RecordStream<'p, I> {
    parser: &'p LogParser,
    lines: I,
    stats: ParseStats,
}

impl<I> RecordStream<'_, I> {
    /// Counters accumulated so far
    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}

impl<I> Iterator for RecordStream<'_, I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.stats.lines_read += 1;
            match self.parser.parse_line(&line) {
                Some(record) => {
                    self.stats.records += 1;
                    return Some(Ok(record));
                }
                None => {
                    self.stats.rejected += 1;
                    tracing::trace!("Skipping unparsable line {}", self.stats.lines_read);
                }
            }
        }
    }
}
