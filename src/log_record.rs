//! Typed representation of one database log line

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Status tag of the response that reports invalidated locks
pub const STATUS_ABORTED: &str = "ABORTED";

/// Status tag emitted when a transaction discovers its locks are broken
pub const STATUS_LOCKS_BROKEN: &str = "LOCKS_BROKEN";

/// Diagnostic text that marks a lock invalidation
pub const INVALIDATION_MARKER: &str = "Transaction locks invalidated";

/// Query action that commits a transaction
pub const ACTION_COMMIT_TX: &str = "QUERY_ACTION_COMMIT_TX";

/// Placeholder the database writes into id fields that carry no value
pub const EMPTY_SENTINEL: &str = "Empty";

/// Input dialect: how the transport envelope wraps each payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// journalctl output: `<mon> <day> <time> <host> <process>[<pid>]: <payload>`
    #[default]
    Systemd,
    /// Direct ydbd log files: the payload is the whole line
    Raw,
}

impl LogFormat {
    /// 1-based whitespace column that holds the payload timestamp
    pub fn timestamp_column(self) -> usize {
        match self {
            LogFormat::Systemd => 6,
            LogFormat::Raw => 1,
        }
    }
}

/// One parsed log line
///
/// `timestamp` and `raw_line` are always present (the timestamp is empty when
/// the payload has none). Every other field is `None` when the line does not
/// carry it or carries an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    /// Origin host (systemd dialect only)
    pub node: Option<String>,
    /// Process name with PID, e.g. `ydbd[889]` (systemd dialect only)
    pub process: Option<String>,
    /// Category from the `:<CATEGORY> <LEVEL>:` marker
    pub category: Option<String>,
    pub level: Option<String>,
    pub component: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub phy_tx_id: Option<String>,
    pub tx_id: Option<String>,
    /// Every `LockId:` occurrence, in line order
    pub lock_ids: Option<Vec<String>>,
    /// Ids listed under `BreakLocks: [...]`
    pub break_locks: Option<Vec<String>>,
    pub status: Option<String>,
    pub issues: Option<String>,
    pub query_text: Option<String>,
    pub query_action: Option<String>,
    pub query_type: Option<String>,
    pub key: Option<String>,
    /// `BeginTx: true` was present
    pub begin_tx: bool,
    pub raw_line: String,
}

impl LogRecord {
    /// Whether the status field equals `status`
    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }

    /// Trace id, treating the `Empty` placeholder as absent
    pub fn trace(&self) -> Option<&str> {
        meaningful(self.trace_id.as_deref())
    }

    /// Logical transaction id, treating the `Empty` placeholder as absent
    pub fn tx(&self) -> Option<&str> {
        meaningful(self.tx_id.as_deref())
    }

    /// Whether this record reports a transaction lock invalidation
    pub fn is_lock_invalidation(&self) -> bool {
        self.has_status(STATUS_ABORTED)
            && self
                .issues
                .as_deref()
                .is_some_and(|issues| issues.contains(INVALIDATION_MARKER))
    }
}

fn meaningful(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != EMPTY_SENTINEL)
}
