// Integration test utilities
//
// Builders for synthetic journalctl lines in the database's diagnostic format

#![allow(dead_code)]

use std::path::PathBuf;

/// Path of a file under tests/fixtures
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Wrap a payload in the journalctl envelope
pub fn systemd_line(host: &str, pid: u32, ts: &str, payload: &str) -> String {
    format!("окт 22 10:54:51 {host} ydbd[{pid}]: {ts} :DATA_INTEGRITY DEBUG: {payload}")
}

/// Fields of one synthetic payload, rendered in `Label: value` form
#[derive(Debug, Default, Clone)]
pub struct Payload {
    fields: Vec<(&'static str, String)>,
}

impl Payload {
    pub fn new(component: &str) -> Self {
        Self::default().field("Component", component)
    }

    pub fn field(mut self, label: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((label, value.into()));
        self
    }

    /// `QueryText` with the log writer's escaping applied
    pub fn query_text(self, text: &str) -> Self {
        let escaped = tli_analyzer::log_parser::escape(text);
        self.field("QueryText", format!("\"{escaped}\""))
    }

    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Seven forward-ordered lines describing one complete invalidation
///
/// Timestamps are offset by `second` so several scenarios can share a log.
pub fn invalidation_scenario(n: u32, second: u32) -> Vec<String> {
    let ts = |frac: &str| format!("2025-10-22T07:54:{second:02}.{frac}Z");
    let victim_trace = format!("victimtrace{n:04}");
    let culprit_trace = format!("culprittrace{n:04}");
    let victim_session = format!("ydb://session/3?node_id=50005&id=victim{n}");
    let culprit_session = format!("ydb://session/3?node_id=50003&id=culprit{n}");
    let victim_tx = format!("victimtx{n:04}");
    let culprit_tx = format!("culprittx{n:04}");
    let lock = format!("{}", 562949953000000u64 + n as u64);
    let victim_phy = format!("{}", 562949954000000u64 + n as u64);
    let culprit_phy = format!("{}", 844424930000000u64 + n as u64);

    vec![
        systemd_line(
            "node-2",
            901,
            &ts("050000"),
            &Payload::new("SessionActor")
                .field("SessionId", culprit_session.clone())
                .field("TraceId", culprit_trace.clone())
                .field("TxId", culprit_tx)
                .field("QueryAction", "QUERY_ACTION_EXECUTE")
                .query_text("UPSERT INTO tt1 (id, v) VALUES (1, 2);")
                .render(),
        ),
        systemd_line(
            "node-2",
            901,
            &ts("396819"),
            &Payload::new("Executer")
                .field("TraceId", culprit_trace)
                .field("PhyTxId", culprit_phy.clone())
                .render(),
        ),
        systemd_line(
            "node-1",
            844,
            &ts("399202"),
            &Payload::new("DataShard")
                .field("PhyTxId", culprit_phy)
                .field("BreakLocks", format!("[{lock} ]"))
                .render(),
        ),
        systemd_line(
            "node-3",
            889,
            &ts("400000"),
            &Payload::new("SessionActor")
                .field("SessionId", victim_session.clone())
                .field("TraceId", victim_trace.clone())
                .field("TxId", victim_tx.clone())
                .field("QueryAction", "QUERY_ACTION_EXECUTE")
                .query_text("SELECT * FROM tt1 WHERE id = 1;")
                .render(),
        ),
        systemd_line(
            "node-3",
            889,
            &ts("425247"),
            &Payload::new("Executer")
                .field("TraceId", victim_trace.clone())
                .field("PhyTxId", victim_phy)
                .field("Status", "LOCKS_BROKEN")
                .field("LockId", lock)
                .render(),
        ),
        systemd_line(
            "node-3",
            889,
            &ts("433950"),
            &format!(
                "{},Issues: {{ message: \"Transaction locks invalidated. Table: `/Root/db/tt1`\" issue_code: 2001 severity: 1 }}",
                Payload::new("SessionActor")
                    .field("SessionId", victim_session)
                    .field("TraceId", victim_trace)
                    .field("TxId", victim_tx)
                    .field("Status", "ABORTED")
                    .render()
            ),
        ),
        systemd_line("node-3", 889, &ts("500000"), "Component: SessionActor,Type: Noise"),
    ]
}
