//! CLI integration: simulate, replay, and params round-trips through the
//! compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn bartrack() -> Command {
    Command::cargo_bin("bartrack").expect("binary built")
}

/// Minimal level stationary data frame (accel z word = 2048 → exactly 1 g).
fn level_frame() -> Vec<u8> {
    let mut frame = vec![0x55, 0x61];
    for word in [0i16, 0, 2048, 0, 0, 0, 0, 0, 0] {
        frame.extend_from_slice(&word.to_le_bytes());
    }
    frame
}

fn write_frame_log(path: &std::path::Path, n: u64) {
    let frame = level_frame();
    let mut bytes = Vec::new();
    for k in 0..n {
        bytes.extend_from_slice(&(k * 50).to_le_bytes());
        bytes.push(frame.len() as u8);
        bytes.extend_from_slice(&frame);
    }
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn simulate_counts_the_requested_reps() {
    let dir = tempfile::tempdir().unwrap();
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "--json",
            "simulate",
            "--reps",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"counted_reps\":2"))
        .stdout(predicate::str::contains("\"type\":\"rep\"").count(2));
}

#[test]
fn simulate_rejects_out_of_range_depth() {
    let dir = tempfile::tempdir().unwrap();
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "simulate",
            "--depth-cm",
            "500",
        ])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn replay_summarizes_a_recorded_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("frames.bin");
    write_frame_log(&log, 30);
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "--json",
            "replay",
            "--input",
            log.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"records\":30"))
        .stdout(predicate::str::contains("\"type\":\"state\""));
}

#[test]
fn replay_missing_input_fails_with_help() {
    let dir = tempfile::tempdir().unwrap();
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "replay",
            "--input",
            "does-not-exist.bin",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("frame log"));
}

#[test]
fn show_params_prints_defaults_as_toml() {
    let dir = tempfile::tempdir().unwrap();
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "show-params",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[zupt]"))
        .stdout(predicate::str::contains("accel_thresh = 0.5"));
}

#[test]
fn show_params_reads_the_user_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lifter.toml"),
        "[workout]\nrest_timer_s = 45\n",
    )
    .unwrap();
    bartrack()
        .args([
            "--params-dir",
            dir.path().to_str().unwrap(),
            "--user",
            "lifter",
            "--json",
            "show-params",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rest_timer_s\": 45"));
}
