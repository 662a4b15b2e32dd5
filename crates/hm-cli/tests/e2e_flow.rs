//! End-to-end tests driving the `hm` binary.
//!
//! Tests the full pipeline: config → read visits → compute → report

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn hm_binary() -> String {
    env!("CARGO_BIN_EXE_hm").to_string()
}

/// Runs `hm` with an isolated home so no user config is picked up.
fn hm(home: &Path, args: &[&str]) -> Output {
    Command::new(hm_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run hm")
}

fn write_visits(dir: &Path, lines: &[&str]) -> String {
    let path = dir.join("visits.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path.to_string_lossy().into_owned()
}

fn sample_visits(dir: &Path) -> String {
    write_visits(
        dir,
        &[
            r#"{"id":"a","entry":"2024-01-01T07:44:00","exit":"2024-01-01T08:50:00","category":"ART"}"#,
            r#"{"id":"b","entry":"2024-01-02T09:00:00","exit":"2024-01-02T12:30:00","category":"IVT"}"#,
            r#"{"id":"c","entry":"2023-12-31T22:00:00","exit":"2024-01-01T02:00:00","category":"IVT"}"#,
            r#"{"id":"d","entry":"2024-01-03T10:00:00","exit":"2024-01-03T09:00:00","category":"ART"}"#,
            r#"{"id":"e","entry":"2024-01-07T20:00:00","category":"ART"}"#,
        ],
    )
}

#[test]
fn test_run_json_output() {
    let temp = TempDir::new().unwrap();
    let visits = sample_visits(temp.path());

    let output = hm(
        temp.path(),
        &[
            "run",
            "--visits",
            &visits,
            "--start",
            "2024-01-01T00:00:00",
            "--end",
            "2024-01-08T00:00:00",
            "--json",
        ],
    );
    assert!(
        output.status.success(),
        "hm run should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["report"]["inner"], 2);
    assert_eq!(value["report"]["left"], 1);
    // Bad interval and missing exit under the default reject policy.
    assert_eq!(value["report"]["rejected"].as_array().unwrap().len(), 2);
    assert_eq!(value["report"]["rejected"][0]["kind"], "exit_before_entry");
    assert_eq!(value["violations"].as_array().unwrap().len(), 0);

    // ART, IVT and Total, 168 hourly bins each.
    let flows = value["flows"].as_array().unwrap();
    assert_eq!(flows.len(), 3 * 168);
    assert_eq!(flows[7]["category"], "ART");
    assert_eq!(flows[7]["arrivals"], 1.0);

    let summary = value["summary"].as_array().unwrap();
    assert_eq!(summary.len(), 3 * 3 * 168);
}

#[test]
fn test_run_open_policy_keeps_censored_visit() {
    let temp = TempDir::new().unwrap();
    let visits = sample_visits(temp.path());

    let output = hm(
        temp.path(),
        &[
            "run",
            "--visits",
            &visits,
            "--start",
            "2024-01-01T00:00:00",
            "--end",
            "2024-01-08T00:00:00",
            "--censored",
            "open",
            "--no-categories",
            "--json",
        ],
    );
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["report"]["right"], 1);
    assert_eq!(value["report"]["rejected"].as_array().unwrap().len(), 1);
    assert_eq!(value["flows"].as_array().unwrap().len(), 168);
}

#[test]
fn test_run_human_output() {
    let temp = TempDir::new().unwrap();
    let visits = sample_visits(temp.path());

    let output = hm(
        temp.path(),
        &[
            "run",
            "--visits",
            &visits,
            "--start",
            "2024-01-01T00:00:00",
            "--end",
            "2024-01-08T00:00:00",
        ],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OCCUPANCY ANALYSIS"));
    assert!(stdout.contains("Rejected:  2"));
    assert!(stdout.contains("All balance checks passed."));
    assert!(stdout.contains("PEAK MEAN OCCUPANCY"));
}

#[test]
fn test_malformed_line_fails_with_line_number() {
    let temp = TempDir::new().unwrap();
    let visits = write_visits(
        temp.path(),
        &[
            r#"{"id":"a","entry":"2024-01-01T07:44:00","exit":"2024-01-01T08:50:00"}"#,
            r#"{"id":"b","entry":"yesterday"}"#,
        ],
    );

    let output = hm(
        temp.path(),
        &[
            "run",
            "--visits",
            &visits,
            "--start",
            "2024-01-01T00:00:00",
            "--end",
            "2024-01-08T00:00:00",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid visit on line 2"), "stderr: {stderr}");
}

#[test]
fn test_config_file_bin_size_is_validated() {
    let temp = TempDir::new().unwrap();
    let visits = sample_visits(temp.path());
    let config = temp.path().join("hm.toml");
    std::fs::write(
        &config,
        "start = \"2024-01-01T00:00:00\"\nend = \"2024-01-08T00:00:00\"\nbin_size_minutes = 13\n",
    )
    .unwrap();

    let output = hm(
        temp.path(),
        &["--config", &config.to_string_lossy(), "run", "--visits", &visits],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not divide 1440"), "stderr: {stderr}");

    // A command-line bin size overrides the file.
    let output = hm(
        temp.path(),
        &[
            "--config",
            &config.to_string_lossy(),
            "run",
            "--visits",
            &visits,
            "--bin-size",
            "30",
            "--json",
        ],
    );
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["window"]["bin_size_minutes"], 30);
}

#[test]
fn test_config_command_reads_environment() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(hm_binary())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .env("HM_BIN_SIZE_MINUTES", "15")
        .env("HM_EDGE_BINS", "whole")
        .arg("config")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["bin_size_minutes"], 15);
    assert_eq!(value["edge_bins"], "whole");
    assert_eq!(value["use_categories"], true);
}

#[test]
fn test_missing_window_is_reported() {
    let temp = TempDir::new().unwrap();
    let visits = sample_visits(temp.path());
    let output = hm(temp.path(), &["run", "--visits", &visits]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("analysis start is required"), "stderr: {stderr}");
}
