#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use ulid::Ulid;

fn nhlf_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nhlf"))
}

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!("nhlf-contract-{}.sqlite3", Ulid::new()))
}

fn nhlf_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(nhlf_binary_path());
    command.arg("--db").arg(db_path).args(["--provider", "mock"]);
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run nhlf command {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn help_lists_command_groups() {
    let output = match Command::new(nhlf_binary_path()).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in ["projections", "results", "history", "patterns"] {
        assert!(stdout.contains(required), "help is missing {required}");
    }
}

#[test]
fn generate_then_show_uses_stored_projections() {
    let db = temp_db();
    assert_success(&nhlf_output(&db, &["projections", "generate", "--json"]));

    let output = nhlf_output(
        &db,
        &["projections", "show", "--sort", "pts", "--game", "CBJ@COL", "--json"],
    );
    assert_success(&output);
    let payload = stdout_json(&output);

    assert_eq!(payload["games"].as_array().map(Vec::len), Some(3));
    assert_eq!(
        payload["game_options"],
        serde_json::json!(["CGY@PIT", "CBJ@COL", "NJD@TOR"])
    );
    let players: Vec<&str> = payload["players"]
        .as_array()
        .map(|items| items.iter().filter_map(|item| item["player"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(players, ["N. MacKinnon", "J. Gaudreau"]);
}

#[test]
fn generate_accepts_explicit_slate_date() {
    let db = temp_db();
    let output = nhlf_output(&db, &["projections", "generate", "--date", "2026-02-27", "--json"]);
    assert_success(&output);
    assert_eq!(stdout_json(&output)["games"].as_array().map(Vec::len), Some(3));

    let rejected = nhlf_output(&db, &["projections", "generate", "--date", "02/27/2026"]);
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("YYYY-MM-DD"));
}

#[test]
fn hide_under_risk_drops_flagged_players() {
    let db = temp_db();
    assert_success(&nhlf_output(&db, &["projections", "generate"]));
    let output = nhlf_output(&db, &["projections", "show", "--hide-under-risk", "--json"]);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["players"].as_array().map(Vec::len), Some(3));
}

#[test]
fn reconcile_appends_history_and_list_reports_metrics() {
    let db = temp_db();
    assert_success(&nhlf_output(&db, &["projections", "generate"]));
    let reconcile = nhlf_output(&db, &["results", "reconcile", "--date", "2026-02-27", "--json"]);
    assert_success(&reconcile);
    let report = stdout_json(&reconcile);
    assert_eq!(report["accuracy"]["overall_hit_rate"], serde_json::json!(0.72));

    let output = nhlf_output(&db, &["history", "list", "--json"]);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["metrics"]["total"], serde_json::json!(4));
    assert_eq!(payload["metrics"]["hits"], serde_json::json!(3));
    assert_eq!(payload["hit_rate"], serde_json::json!("75%"));
    assert_eq!(payload["rows"][0]["type"], serde_json::json!("game"));
    assert_eq!(payload["rows"][0]["projected"], serde_json::json!("Total: 5.3"));

    let searched = nhlf_output(&db, &["history", "list", "--search", "crosby", "--json"]);
    assert_success(&searched);
    assert_eq!(
        stdout_json(&searched)["rows"].as_array().map(Vec::len),
        Some(1)
    );
}

#[test]
fn invalid_date_fails_and_leaves_history_empty() {
    let db = temp_db();
    let output = nhlf_output(&db, &["results", "reconcile", "--date", "tomorrow"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid reconciliation date"));

    let listed = nhlf_output(&db, &["history", "list", "--json"]);
    assert_success(&listed);
    assert_eq!(stdout_json(&listed)["hit_rate"], serde_json::json!("--"));
}

#[test]
fn clear_removes_history() {
    let db = temp_db();
    assert_success(&nhlf_output(&db, &["results", "reconcile", "--date", "2026-02-27"]));
    assert_success(&nhlf_output(&db, &["history", "clear"]));

    let listed = nhlf_output(&db, &["history", "list", "--json"]);
    assert_success(&listed);
    assert_eq!(stdout_json(&listed)["metrics"]["total"], serde_json::json!(0));
}

#[test]
fn sample_flag_fills_empty_history_without_writing() {
    let db = temp_db();
    let output = nhlf_output(&db, &["--sample", "history", "list", "--json"]);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["metrics"]["total"], serde_json::json!(6));
    assert_eq!(payload["hit_rate"], serde_json::json!("67%"));

    let live = nhlf_output(&db, &["history", "list", "--json"]);
    assert_success(&live);
    assert_eq!(stdout_json(&live)["metrics"]["total"], serde_json::json!(0));
}

#[test]
fn patterns_are_ranked_by_hit_rate() {
    let db = temp_db();
    let output = nhlf_output(&db, &["patterns", "analyze", "--json"]);
    assert_success(&output);
    let payload = stdout_json(&output);
    let ids: Vec<&str> = payload["patterns"]
        .as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, ["P2", "P1", "P3"]);
}
