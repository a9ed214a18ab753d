use std::process::{Command, Output};

fn run_demo(extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cell_counter_demo"))
        .args([
            "--seconds", "100", "--fps", "30", "--width", "96", "--height", "96", "--seed", "5",
            "--rate-interval", "10",
        ])
        .args(extra)
        .output()
        .expect("failed to start cell_counter_demo")
}

fn summary_value(stdout: &str, label: &str) -> u64 {
    stdout
        .lines()
        .find(|line| line.starts_with(label))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or_else(|| panic!("no '{}' line in:\n{}", label, stdout))
}

#[test]
fn demo_run_is_deterministic() {
    let first = run_demo(&[]);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let second = run_demo(&[]);
    assert_eq!(first.stdout, second.stdout);

    let stdout = String::from_utf8_lossy(&first.stdout);
    assert_eq!(summary_value(&stdout, "frames processed"), 3000);
    let passed = summary_value(&stdout, "cells passed");
    let detected = summary_value(&stdout, "cells detected");
    assert!(detected > 0);
    assert!(detected >= passed);
    assert!(stdout.lines().filter(|l| l.starts_with("rate @")).count() >= 9);
}

#[test]
fn demo_rejects_invalid_threshold() {
    let output = run_demo(&["--threshold=-1"]);
    assert!(!output.status.success());
}

#[test]
fn demo_snapshot_follows_image_feature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last.png");
    let output = run_demo(&["--snapshot", path.to_str().unwrap()]);
    if cfg!(feature = "ingest-image") {
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(path.is_file());
    } else {
        assert!(!output.status.success());
        assert!(!path.exists());
    }
}
