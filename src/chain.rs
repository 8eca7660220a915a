//! Lock invalidation chain: the victim -> culprit record produced by the correlator

use crate::log_record::{LogRecord, ACTION_COMMIT_TX};
use sha2::{Digest, Sha256};
use std::fmt;

/// Everything recovered from the log about one lock invalidation
///
/// Created when the victim's invalidation record is seen and filled in
/// field by field as the reverse scan reaches older, explaining records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInvalidationChain {
    pub victim_session_id: String,
    pub victim_trace_id: String,
    pub victim_tx_id: Option<String>,
    /// The record that reported the invalidation
    pub victim_entry: LogRecord,
    /// Table path from the invalidation message
    pub table_name: Option<String>,
    /// Lock the culprit broke
    pub lock_id: Option<String>,
    /// The victim's own physical transaction, used to skip self-notifications
    pub victim_phy_tx_id: Option<String>,
    pub culprit_phy_tx_id: Option<String>,
    pub culprit_trace_id: Option<String>,
    pub culprit_session_id: Option<String>,
    pub culprit_tx_id: Option<String>,
    /// Representative culprit record
    pub culprit_entry: Option<LogRecord>,
    /// Victim transaction queries, ascending by timestamp
    pub victim_queries: Vec<LogRecord>,
    /// Culprit transaction queries, ascending by timestamp
    pub culprit_queries: Vec<LogRecord>,
    /// Raw lines that contributed to this chain, in scan order (collected on request)
    pub log_details: Option<Vec<String>>,
}

impl LockInvalidationChain {
    /// Start a chain from an invalidation record
    pub fn new(
        victim_session_id: impl Into<String>,
        victim_trace_id: impl Into<String>,
        victim_entry: LogRecord,
        table_name: Option<String>,
        collect_details: bool,
    ) -> Self {
        let victim_tx_id = victim_entry
            .tx()
            .filter(|tx| *tx != "Unknown")
            .map(str::to_string);
        let log_details = collect_details.then(|| vec![victim_entry.raw_line.clone()]);
        Self {
            victim_session_id: victim_session_id.into(),
            victim_trace_id: victim_trace_id.into(),
            victim_tx_id,
            victim_entry,
            table_name,
            lock_id: None,
            victim_phy_tx_id: None,
            culprit_phy_tx_id: None,
            culprit_trace_id: None,
            culprit_session_id: None,
            culprit_tx_id: None,
            culprit_entry: None,
            victim_queries: Vec::new(),
            culprit_queries: Vec::new(),
            log_details,
        }
    }

    /// Remember a contributing raw line (no-op unless details are collected)
    pub fn add_detail(&mut self, raw_line: &str) {
        if let Some(details) = self.log_details.as_mut() {
            if !details.iter().any(|line| line == raw_line) {
                details.push(raw_line.to_string());
            }
        }
    }

    /// Whether the victim's last known query committed
    pub fn is_victim_committed(&self) -> bool {
        self.victim_queries
            .last()
            .and_then(|q| q.query_action.as_deref())
            == Some(ACTION_COMMIT_TX)
    }

    /// Names of required fields that are still unset
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let checks: [(&'static str, bool); 13] = [
            ("victim_session_id", !self.victim_session_id.is_empty()),
            ("victim_trace_id", !self.victim_trace_id.is_empty()),
            ("lock_id", self.lock_id.is_some()),
            ("culprit_phy_tx_id", self.culprit_phy_tx_id.is_some()),
            ("culprit_trace_id", self.culprit_trace_id.is_some()),
            ("culprit_session_id", self.culprit_session_id.is_some()),
            ("victim_entry", !self.victim_entry.raw_line.is_empty()),
            ("culprit_entry", self.culprit_entry.is_some()),
            ("table_name", self.table_name.is_some()),
            ("victim_tx_id", self.victim_tx_id.is_some()),
            ("culprit_tx_id", self.culprit_tx_id.is_some()),
            ("victim_queries", !self.victim_queries.is_empty()),
            ("culprit_queries", !self.culprit_queries.is_empty()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, present)| (!present).then_some(name))
            .collect()
    }

    /// Whether every required field was resolved
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Content hash of the victim's query sequence
    pub fn victim_hash(&self) -> String {
        query_sequence_hash(&self.victim_queries)
    }

    /// Content hash of the culprit's query sequence
    pub fn culprit_hash(&self) -> String {
        query_sequence_hash(&self.culprit_queries)
    }
}

/// Collapse runs of whitespace into single spaces
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 over the normalized query texts (or actions, for text-less
/// queries), rendered as the first 16 hex digits
///
/// Two transactions that ran the same statements hash equal regardless of
/// ids, timestamps and formatting whitespace.
pub fn query_sequence_hash(queries: &[LogRecord]) -> String {
    let mut hasher = Sha256::new();
    for query in queries {
        let text = match (&query.query_text, &query.query_action) {
            (Some(text), _) => single_line(text),
            (None, Some(action)) => action.clone(),
            (None, None) => String::new(),
        };
        hasher.update(text.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Outcome of a write-once field assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Slot was empty and now holds the value
    Assigned,
    /// Slot already held an equal value
    Unchanged,
    /// Slot held a different value, which was kept
    Rejected,
}

/// How loudly a rejected assignment is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictLevel {
    Warn,
    Debug,
}

/// First write wins: fill `slot` if empty, otherwise keep the existing value
///
/// `chain` and `field` only label the log line emitted on a conflict.
pub fn assign_once<T>(
    slot: &mut Option<T>,
    value: T,
    chain: &str,
    field: &str,
    level: ConflictLevel,
) -> Assignment
where
    T: PartialEq + fmt::Display,
{
    match slot {
        None => {
            tracing::debug!("{} - Found {} {}", chain, field, value);
            *slot = Some(value);
            Assignment::Assigned
        }
        Some(existing) if *existing == value => Assignment::Unchanged,
        Some(existing) => {
            match level {
                ConflictLevel::Warn => tracing::warn!(
                    "{} - Chain already has {} {}, ignoring new value {}",
                    chain,
                    field,
                    existing,
                    value
                ),
                ConflictLevel::Debug => tracing::debug!(
                    "{} - Chain already has {} {}, ignoring different value {}",
                    chain,
                    field,
                    existing,
                    value
                ),
            }
            Assignment::Rejected
        }
    }
}
