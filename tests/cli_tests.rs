//! Integration tests for the tli-analyzer binary

mod utils;

use predicates::prelude::*;
use std::fs;
use utils::{fixture, invalidation_scenario};

#[test]
fn test_yaml_report_from_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file").arg(fixture("tli_sample.log"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("analysis_metadata:"))
        .stdout(predicate::str::contains("total_invalidation_events: 1"))
        .stdout(predicate::str::contains("562949953837886"))
        .stdout(predicate::str::contains("844424930570467"))
        .stdout(predicate::str::contains("table: /Root/database/test_schema_ca7eb8ed/tt1"));
}

#[test]
fn test_yaml_report_parses() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file").arg(fixture("tli_sample.log"));

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let report: tli_analyzer::yaml_output::YamlReport =
        serde_yaml::from_slice(&output.stdout).unwrap();

    let event = &report.lock_invalidation_events[0];
    assert_eq!(event.victim.trace_id, "01k85ekrmy9tcyvnx2qvwdkcts");
    assert_eq!(event.culprit.trace_id.as_deref(), Some("01k85ekrm1bx847jes53b6k9qb"));
    assert_eq!(event.culprit.tx_id.as_deref(), Some("01k85ekrcx6jzp8hm1w0sbpf3n"));
    assert_eq!(event.victim.node.as_deref(), Some("ydb-static-node-3"));
    assert_eq!(event.victim.process.as_deref(), Some("ydbd[889]"));

    let culprit_actions: Vec<_> = event
        .culprit
        .all_queries
        .iter()
        .map(|q| q.query_action.as_deref().unwrap_or(""))
        .collect();
    assert_eq!(culprit_actions, ["QUERY_ACTION_BEGIN_TX", "QUERY_ACTION_EXECUTE"]);
    assert_eq!(
        event.culprit.all_queries[1].query_text.as_deref(),
        Some("UPSERT INTO tt1 (id, v)\n    VALUES (1, \"two\");")
    );
}

#[test]
fn test_sql_report() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file")
        .arg(fixture("tli_sample.log"))
        .arg("--output-format")
        .arg("sql");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("-- TLI EVENT #1"))
        .stdout(predicate::str::contains("-- VICTIM TRANSACTION"))
        .stdout(predicate::str::contains("-- CULPRIT TRANSACTION"))
        .stdout(predicate::str::contains("SELECT * FROM tt1 WHERE id = 1;"))
        .stdout(predicate::str::contains("UPSERT INTO tt1 (id, v)\n    VALUES (1, \"two\");"))
        .stdout(predicate::str::contains("-- QUERY_ACTION_BEGIN_TX"));
}

#[test]
fn test_summary_report_from_stdin() {
    let mut log = Vec::new();
    for n in 0..3 {
        log.extend(invalidation_scenario(n, 10 + n));
    }

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("-o").arg("summary").write_stdin(log.join("\n"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Total invalidation events: 3"))
        .stdout(predicate::str::contains("Found 1 unique victim+culprit combinations:"))
        .stdout(predicate::str::contains("#1 TLI Count: 3"))
        .stdout(predicate::str::contains("  1. SELECT * FROM tt1 WHERE id = 1;"))
        .stdout(predicate::str::contains("  Table: /Root/db/tt1"));
}

#[test]
fn test_raw_log_format() {
    let raw: String = fs::read_to_string(fixture("tli_sample.log"))
        .unwrap()
        .lines()
        .filter_map(|l| l.split_once("]: ").map(|(_, payload)| payload.to_string()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-format").arg("raw").write_stdin(raw);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("total_invalidation_events: 1"))
        .stdout(predicate::str::contains("culprit_log_line"));
}

#[test]
fn test_no_sort_on_forward_ordered_input_loses_culprit() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file")
        .arg(fixture("tli_sample.log"))
        .arg("--no-sort");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("total_invalidation_events: 1"))
        .stdout(predicate::str::contains("lock_id: null"));
}

#[test]
fn test_collect_details() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file")
        .arg(fixture("tli_sample.log"))
        .arg("--collect-details");

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let report: tli_analyzer::yaml_output::YamlReport =
        serde_yaml::from_slice(&output.stdout).unwrap();

    let raw = &report.lock_invalidation_events[0].raw_entries;
    assert!(raw.victim_log_line.is_none());
    let details = raw.detailed_log_lines.as_ref().unwrap();
    // Oldest contributing line first, the invalidation itself last
    assert!(details[0].contains("QUERY_ACTION_BEGIN_TX"));
    assert!(details.iter().any(|l| l.contains("BreakLocks: [562949953837886 ]")));
    assert!(details.last().unwrap().contains("Transaction locks invalidated"));
}

#[test]
fn test_no_invalidations_prints_nothing() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file").arg(fixture("no_invalidations.log"));

    cmd.assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn test_missing_log_file_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file").arg("/nonexistent/ydb.log");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Log file not found: /nonexistent/ydb.log"));
}

#[test]
fn test_invalid_output_format_rejected() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--output-format").arg("json").write_stdin("");

    cmd.assert().failure();
}

#[test]
fn test_output_dir_writes_all_reports() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--log-file")
        .arg(fixture("tli_sample.log"))
        .arg("--output-dir")
        .arg(&out);

    cmd.assert().success().stdout(predicate::str::is_empty());

    let yaml = fs::read_to_string(out.join("tli_report.yaml")).unwrap();
    assert!(yaml.contains("total_invalidation_events: 1"));
    let sql = fs::read_to_string(out.join("tli_report.sql")).unwrap();
    assert!(sql.contains("-- TLI EVENT #1"));
    let summary = fs::read_to_string(out.join("tli_summary.txt")).unwrap();
    assert!(summary.contains("#1 TLI Count: 1"));
}

#[test]
fn test_config_file_applies() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("tli.toml");
    fs::write(&config, "sort = false\ncollect_details = true\n").unwrap();

    // sort = false from the file leaves forward input unresolved
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--config")
        .arg(&config)
        .arg("--log-file")
        .arg(fixture("tli_sample.log"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("lock_id: null"))
        .stdout(predicate::str::contains("detailed_log_lines:"));
}

#[test]
fn test_unreadable_config_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.arg("--config")
        .arg("/nonexistent/tli.toml")
        .arg("--log-file")
        .arg(fixture("tli_sample.log"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tli-analyzer");
    cmd.env_remove("RUST_LOG")
        .arg("-v")
        .arg("--log-file")
        .arg(fixture("tli_sample.log"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Chain analysis complete: found 1 TLI chains, 0 incomplete"));
}
