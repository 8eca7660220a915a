//! Single-pass backward correlation of lock invalidation chains
//!
//! The input must be in strict reverse-chronological order (latest record
//! first). Effects precede their causes in that order, so a victim's
//! invalidation record is always seen before the records that explain it,
//! and every chain can be resolved in one forward pass over the reversed log:
//!
//! ```text
//! scan order ─────────────────────────────────────────────────────────────▶
//!
//! [1] victim response        TraceId=V SessionId=S Status=ABORTED "Transaction locks invalidated"
//!      │ create chain keyed by V
//! [2] victim executer        TraceId=V PhyTxId=P1 Status=LOCKS_BROKEN LockId=L
//!      │ lock_id=L, victim_phy_tx_id=P1
//! [3] datashard              PhyTxId=P2 BreakLocks=[L]
//!      │ culprit_phy_tx_id=P2 (skipped when P2 == P1)
//! [4] culprit executer       PhyTxId=P2 TraceId=C
//!      │ culprit_trace_id=C
//! [5] culprit session actor  TraceId=C SessionId=S2 TxId=T2
//!        culprit_session_id=S2, culprit_tx_id=T2
//! ```
//!
//! Only bounded lookup tables are kept, never a full event graph. Violating the
//! ordering precondition is not detected; it silently degrades resolution.

use crate::chain::{assign_once, Assignment, ConflictLevel, LockInvalidationChain};
use crate::log_record::{LogRecord, STATUS_LOCKS_BROKEN};
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Facts gathered from every record sharing one trace id
///
/// Each value is the one seen earliest in forward time. The scan runs
/// backwards, so later observations overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceAggregate {
    pub query_text: Option<String>,
    pub tx_id: Option<String>,
    pub session_id: Option<String>,
    /// Lock ids, taken only from `LOCKS_BROKEN` records
    pub lock_ids: Option<Vec<String>>,
}

/// Reverse-scan correlator
///
/// Owns every index table for exactly one input sequence. Feed records with
/// [`observe`](Self::observe), then call [`finish`](Self::finish).
#[derive(Debug)]
pub struct ChainCorrelator {
    collect_details: bool,
    table_pattern: Regex,

    /// Chains in creation order
    chains: Vec<LockInvalidationChain>,
    /// victim trace id -> chain
    chains_by_trace: HashMap<String, usize>,
    /// lock id -> chain; lock ids are unique within a run
    chains_by_lock_id: HashMap<String, usize>,
    /// One physical transaction can break locks of several victims
    chains_by_culprit_phy_tx: HashMap<String, Vec<usize>>,
    chains_by_culprit_trace: HashMap<String, Vec<usize>>,

    queries_by_tx: HashMap<String, Vec<LogRecord>>,
    /// Transaction active in each session at the current scan position
    session_current_tx: HashMap<String, String>,
    entries_by_trace: HashMap<String, LogRecord>,
    trace_aggregates: HashMap<String, TraceAggregate>,

    records_seen: u64,
    dropped_queries: u64,
}

impl ChainCorrelator {
    /// Create a correlator; `collect_details` keeps every contributing raw line
    pub fn new(collect_details: bool) -> Self {
        Self {
            collect_details,
            table_pattern: Regex::new(r"Table:\s*`([^`]+)`").expect("valid table pattern"),
            chains: Vec::new(),
            chains_by_trace: HashMap::new(),
            chains_by_lock_id: HashMap::new(),
            chains_by_culprit_phy_tx: HashMap::new(),
            chains_by_culprit_trace: HashMap::new(),
            queries_by_tx: HashMap::new(),
            session_current_tx: HashMap::new(),
            entries_by_trace: HashMap::new(),
            trace_aggregates: HashMap::new(),
            records_seen: 0,
            dropped_queries: 0,
        }
    }

    /// Run a whole reverse-ordered sequence and return every chain found
    pub fn correlate<I>(records: I, collect_details: bool) -> Vec<LockInvalidationChain>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut correlator = Self::new(collect_details);
        for record in records {
            correlator.observe(record);
        }
        correlator.finish()
    }

    /// Process the next record of the reverse-ordered sequence
    pub fn observe(&mut self, record: LogRecord) {
        self.records_seen += 1;

        self.collect_query(&record);
        self.track_session_tx(&record);
        self.cache_trace(&record);

        if record.is_lock_invalidation() {
            self.create_chain(&record);
        }
        self.resolve_lock_id(&record);
        self.resolve_culprit_phy_tx(&record);
        self.resolve_culprit_trace(&record);
        self.resolve_culprit_session(&record);
    }

    /// Number of chains created so far
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Records observed so far
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Queries that could not be attributed to any transaction
    pub fn dropped_queries(&self) -> u64 {
        self.dropped_queries
    }

    /// Aggregated facts for a trace id
    pub fn trace_aggregate(&self, trace_id: &str) -> Option<&TraceAggregate> {
        self.trace_aggregates.get(trace_id)
    }

    /// Cached representative record for a trace id
    pub fn representative(&self, trace_id: &str) -> Option<&LogRecord> {
        self.entries_by_trace.get(trace_id)
    }

    /// Finalize: backfill culprit records, attach query lists, audit completeness
    pub fn finish(mut self) -> Vec<LockInvalidationChain> {
        for chain in &mut self.chains {
            if chain.culprit_entry.is_none() {
                chain.culprit_entry = chain
                    .culprit_trace_id
                    .as_ref()
                    .and_then(|trace| self.entries_by_trace.get(trace))
                    .cloned();
            }
            if let Some(tx) = &chain.victim_tx_id {
                chain.victim_queries = sorted_queries(&self.queries_by_tx, tx);
            }
            if let Some(tx) = &chain.culprit_tx_id {
                chain.culprit_queries = sorted_queries(&self.queries_by_tx, tx);
            }
        }

        let mut incomplete = 0usize;
        for chain in &self.chains {
            let missing = chain.missing_fields();
            if !missing.is_empty() {
                incomplete += 1;
                tracing::warn!(
                    "{} - Incomplete chain. Missing fields: {}",
                    chain.victim_trace_id,
                    missing.join(", ")
                );
            }
        }
        tracing::info!(
            "Chain analysis complete: found {} TLI chains, {} incomplete ({} records, {} unattributed queries)",
            self.chains.len(),
            incomplete,
            self.records_seen,
            self.dropped_queries
        );

        self.chains
    }

    fn collect_query(&mut self, record: &LogRecord) {
        if record.query_action.is_none() {
            return;
        }
        if let Some(tx) = record.tx() {
            self.queries_by_tx
                .entry(tx.to_string())
                .or_default()
                .push(record.clone());
        } else if let Some(session) = record.session_id.as_deref() {
            // Reverse scan: the session's active entry is the transaction that
            // was current at this point in forward time
            match self.session_current_tx.get(session) {
                Some(tx) => self
                    .queries_by_tx
                    .entry(tx.clone())
                    .or_default()
                    .push(record.clone()),
                None => {
                    self.dropped_queries += 1;
                    tracing::warn!(
                        "Query has no TxId and unable to infer TxId from SessionId {}",
                        session
                    );
                }
            }
        } else {
            self.dropped_queries += 1;
            tracing::warn!("Query entry has QueryAction but no TxId and no SessionId");
        }
    }

    fn track_session_tx(&mut self, record: &LogRecord) {
        let Some(session) = record.session_id.as_deref() else {
            return;
        };
        if let Some(tx) = record.tx() {
            self.session_current_tx
                .insert(session.to_string(), tx.to_string());
        } else if record.begin_tx {
            // Crossing the start of the transaction: anything older belongs elsewhere
            self.session_current_tx.remove(session);
        }
    }

    fn cache_trace(&mut self, record: &LogRecord) {
        let Some(trace) = record.trace() else {
            return;
        };

        match self.entries_by_trace.entry(trace.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
            Entry::Occupied(mut slot) => {
                let cached = slot.get();
                if record.session_id.is_some() && cached.session_id.is_none() {
                    slot.insert(record.clone());
                } else if record.query_text.is_some() && cached.query_text.is_none() {
                    slot.insert(record.clone());
                }
            }
        }

        let aggregate = self.trace_aggregates.entry(trace.to_string()).or_default();
        if record.query_text.is_some() {
            aggregate.query_text = record.query_text.clone();
        }
        if let Some(tx) = record.tx() {
            aggregate.tx_id = Some(tx.to_string());
        }
        if record.session_id.is_some() {
            aggregate.session_id = record.session_id.clone();
        }
        if record.has_status(STATUS_LOCKS_BROKEN) && record.lock_ids.is_some() {
            aggregate.lock_ids = record.lock_ids.clone();
        }
    }

    fn create_chain(&mut self, record: &LogRecord) {
        let (Some(trace), Some(session)) = (record.trace(), record.session_id.as_deref()) else {
            tracing::warn!(
                "Lock invalidation record without TraceId or SessionId, skipping: {}",
                record.raw_line
            );
            return;
        };
        if self.chains_by_trace.contains_key(trace) {
            tracing::warn!(
                "{} - Chain already exists, ignoring repeated invalidation record",
                trace
            );
            return;
        }

        let table_name = record
            .issues
            .as_deref()
            .and_then(|issues| self.table_pattern.captures(issues))
            .map(|caps| caps[1].to_string());
        tracing::debug!(
            "{} - Created new TLI chain for table {}",
            trace,
            table_name.as_deref().unwrap_or("<unknown>")
        );

        let chain = LockInvalidationChain::new(
            session,
            trace,
            record.clone(),
            table_name,
            self.collect_details,
        );
        self.chains_by_trace
            .insert(trace.to_string(), self.chains.len());
        self.chains.push(chain);
    }

    fn resolve_lock_id(&mut self, record: &LogRecord) {
        if !record.has_status(STATUS_LOCKS_BROKEN) {
            return;
        }
        let Some(&idx) = record.trace().and_then(|t| self.chains_by_trace.get(t)) else {
            return;
        };
        let chain = &mut self.chains[idx];

        if let Some(phy_tx) = &record.phy_tx_id {
            chain.add_detail(&record.raw_line);
            assign_once(
                &mut chain.victim_phy_tx_id,
                phy_tx.clone(),
                &chain.victim_trace_id,
                "victim PhyTxId",
                ConflictLevel::Warn,
            );
        }

        let Some(lock_ids) = &record.lock_ids else {
            return;
        };
        let Some(lock_id) = lock_ids.first().cloned() else {
            return;
        };
        chain.add_detail(&record.raw_line);
        let assigned = assign_once(
            &mut chain.lock_id,
            lock_id.clone(),
            &chain.victim_trace_id,
            "LockId",
            ConflictLevel::Warn,
        );
        if assigned == Assignment::Assigned {
            if lock_ids.len() > 1 {
                tracing::warn!(
                    "{} - There are several LockId in LOCKS_BROKEN record, using the first one ({}). This case is not handled.",
                    chain.victim_trace_id,
                    lock_id
                );
            }
            if let Some(previous) = self.chains_by_lock_id.insert(lock_id.clone(), idx) {
                tracing::warn!(
                    "{} - LockId {} was already owned by chain {}",
                    self.chains[idx].victim_trace_id,
                    lock_id,
                    self.chains[previous].victim_trace_id
                );
            }
        }
    }

    fn resolve_culprit_phy_tx(&mut self, record: &LogRecord) {
        let Some(break_locks) = &record.break_locks else {
            return;
        };
        let Some(phy_tx) = record.phy_tx_id.as_deref() else {
            tracing::warn!("Expected PhyTxId in BreakLocks entry, but not found");
            return;
        };

        for lock_id in break_locks {
            // Most broken locks belong to transactions that never failed
            let Some(&idx) = self.chains_by_lock_id.get(lock_id) else {
                continue;
            };
            let chain = &mut self.chains[idx];
            chain.add_detail(&record.raw_line);

            // A victim also reports its own broken lock; that is not the culprit
            if chain.victim_phy_tx_id.as_deref() == Some(phy_tx) {
                tracing::debug!(
                    "{} - Skipping lock break reported by the victim itself",
                    chain.victim_trace_id
                );
                continue;
            }

            let assigned = assign_once(
                &mut chain.culprit_phy_tx_id,
                phy_tx.to_string(),
                &chain.victim_trace_id,
                "culprit PhyTxId",
                ConflictLevel::Warn,
            );
            if assigned == Assignment::Assigned {
                self.chains_by_culprit_phy_tx
                    .entry(phy_tx.to_string())
                    .or_default()
                    .push(idx);
            }
        }
    }

    fn resolve_culprit_trace(&mut self, record: &LogRecord) {
        let (Some(phy_tx), Some(trace)) = (record.phy_tx_id.as_deref(), record.trace()) else {
            return;
        };
        let Some(waiting) = self.chains_by_culprit_phy_tx.get(phy_tx) else {
            return;
        };

        for &idx in waiting {
            let chain = &mut self.chains[idx];
            chain.add_detail(&record.raw_line);
            let assigned = assign_once(
                &mut chain.culprit_trace_id,
                trace.to_string(),
                &chain.victim_trace_id,
                "culprit TraceId",
                ConflictLevel::Warn,
            );
            if assigned == Assignment::Assigned {
                self.chains_by_culprit_trace
                    .entry(trace.to_string())
                    .or_default()
                    .push(idx);
            }
        }
    }

    fn resolve_culprit_session(&mut self, record: &LogRecord) {
        let Some(trace) = record.trace() else {
            return;
        };
        let Some(waiting) = self.chains_by_culprit_trace.get(trace) else {
            return;
        };
        let tx = record.tx();
        if record.session_id.is_none() && tx.is_none() {
            return;
        }

        for &idx in waiting {
            let chain = &mut self.chains[idx];
            chain.add_detail(&record.raw_line);

            if let Some(session) = &record.session_id {
                assign_once(
                    &mut chain.culprit_session_id,
                    session.clone(),
                    &chain.victim_trace_id,
                    "culprit SessionId",
                    ConflictLevel::Warn,
                );
            }

            let Some(tx) = tx else {
                continue;
            };
            // The TxId field sometimes carries the physical transaction id
            if chain.culprit_phy_tx_id.as_deref() == Some(tx) {
                tracing::debug!(
                    "{} - Value {} is not a real TxId. Skipping",
                    chain.victim_trace_id,
                    tx
                );
                continue;
            }
            assign_once(
                &mut chain.culprit_tx_id,
                tx.to_string(),
                &chain.victim_trace_id,
                "culprit TxId",
                ConflictLevel::Debug,
            );
        }
    }
}

/// Queries of one transaction, ascending by timestamp (stable for ties)
fn sorted_queries(queries_by_tx: &HashMap<String, Vec<LogRecord>>, tx: &str) -> Vec<LogRecord> {
    let mut queries = queries_by_tx.get(tx).cloned().unwrap_or_default();
    queries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    queries
}
