//! YAML output format for lock invalidation reports

use crate::chain::LockInvalidationChain;
use crate::error::{AnalyzerError, Result};
use crate::log_record::LogRecord;
use crate::report::{by_victim_time, generated_at_now, Renderer};
use serde::{Deserialize, Serialize};

/// Report metadata block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlMetadata {
    pub generated_at: String,
    pub total_invalidation_events: usize,
}

/// One query of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlQuery {
    /// Statement text, verbatim (multi-line text stays multi-line)
    pub query_text: Option<String>,
    pub query_action: Option<String>,
    pub trace_id: String,
    pub timestamp: String,
    pub query_type: String,
}

/// Victim side of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlVictim {
    pub session_id: String,
    pub trace_id: String,
    pub node: Option<String>,
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_queries: Vec<YamlQuery>,
}

/// Culprit side of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlCulprit {
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub phy_tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_queries: Vec<YamlQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlLockDetails {
    pub lock_id: Option<String>,
}

/// Raw log lines backing an event
///
/// Either every collected detail line (newest first) or just the victim and
/// culprit representative lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YamlRawEntries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_log_lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_log_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit_log_line: Option<String>,
}

/// A single lock invalidation event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlEvent {
    pub event_id: usize,
    pub timestamp: String,
    pub table: Option<String>,
    pub victim: YamlVictim,
    pub culprit: YamlCulprit,
    pub lock_details: YamlLockDetails,
    pub victim_committed: bool,
    pub raw_entries: YamlRawEntries,
}

/// Root YAML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlReport {
    pub analysis_metadata: YamlMetadata,
    pub lock_invalidation_events: Vec<YamlEvent>,
}

impl YamlReport {
    /// Build the document; events are numbered by victim timestamp
    pub fn from_chains(chains: &[LockInvalidationChain], generated_at: String) -> Self {
        let lock_invalidation_events = by_victim_time(chains)
            .into_iter()
            .enumerate()
            .map(|(i, chain)| YamlEvent::from_chain(chain, i + 1))
            .collect();
        Self {
            analysis_metadata: YamlMetadata {
                generated_at,
                total_invalidation_events: chains.len(),
            },
            lock_invalidation_events,
        }
    }
}

impl YamlEvent {
    fn from_chain(chain: &LockInvalidationChain, event_id: usize) -> Self {
        let culprit_entry = chain.culprit_entry.as_ref();
        let raw_entries = match &chain.log_details {
            Some(details) if !details.is_empty() => YamlRawEntries {
                detailed_log_lines: Some(details.iter().rev().map(|l| l.trim().to_string()).collect()),
                ..Default::default()
            },
            _ => YamlRawEntries {
                detailed_log_lines: None,
                victim_log_line: Some(chain.victim_entry.raw_line.trim().to_string()),
                culprit_log_line: culprit_entry.map(|e| e.raw_line.trim().to_string()),
            },
        };

        Self {
            event_id,
            timestamp: chain.victim_entry.timestamp.clone(),
            table: chain.table_name.clone(),
            victim: YamlVictim {
                session_id: chain.victim_session_id.clone(),
                trace_id: chain.victim_trace_id.clone(),
                node: chain.victim_entry.node.clone(),
                process: chain.victim_entry.process.clone(),
                tx_id: chain.victim_tx_id.clone(),
                all_queries: chain.victim_queries.iter().map(YamlQuery::from).collect(),
            },
            culprit: YamlCulprit {
                session_id: chain.culprit_session_id.clone(),
                trace_id: chain.culprit_trace_id.clone(),
                phy_tx_id: chain.culprit_phy_tx_id.clone(),
                tx_id: chain.culprit_tx_id.clone(),
                node: culprit_entry.and_then(|e| e.node.clone()),
                process: culprit_entry.and_then(|e| e.process.clone()),
                all_queries: chain.culprit_queries.iter().map(YamlQuery::from).collect(),
            },
            lock_details: YamlLockDetails {
                lock_id: chain.lock_id.clone(),
            },
            victim_committed: chain.is_victim_committed(),
            raw_entries,
        }
    }
}

impl From<&LogRecord> for YamlQuery {
    fn from(record: &LogRecord) -> Self {
        Self {
            query_text: record.query_text.clone(),
            query_action: record.query_action.clone(),
            trace_id: record.trace_id.clone().unwrap_or_default(),
            timestamp: record.timestamp.clone(),
            query_type: record.query_type.clone().unwrap_or_default(),
        }
    }
}

/// Structured YAML report
#[derive(Debug, Clone)]
pub struct YamlRenderer {
    generated_at: String,
}

impl YamlRenderer {
    pub fn new() -> Self {
        Self::with_generated_at(generated_at_now())
    }

    /// Renderer with a fixed generation timestamp
    pub fn with_generated_at(generated_at: impl Into<String>) -> Self {
        Self {
            generated_at: generated_at.into(),
        }
    }
}

impl Default for YamlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for YamlRenderer {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn render(&self, chains: &[LockInvalidationChain]) -> Result<String> {
        let report = YamlReport::from_chains(chains, self.generated_at.clone());
        serde_yaml::to_string(&report).map_err(|e| AnalyzerError::Render {
            format: self.name(),
            message: e.to_string(),
        })
    }
}
