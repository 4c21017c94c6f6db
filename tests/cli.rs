//! End-to-end runs of the binary against the CSV fixtures.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample")
}

fn metrics(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mentorship-metrics").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn")
        .args(["--source", "csv", "--data-dir"])
        .arg(fixtures());
    cmd
}

#[test]
fn completion_writes_json_and_chart() {
    let workdir = TempDir::new().unwrap();

    metrics(&workdir)
        .arg("completion")
        .assert()
        .success()
        .stdout(predicate::str::contains("# Course Completion Analysis"))
        .stdout(predicate::str::contains("5 completed (55.6%)"))
        .stdout(predicate::str::contains("Report saved to completion_report.json."));

    let raw = fs::read_to_string(workdir.path().join("completion_report.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["metrics"]["total_enrollments"], 9);
    assert_eq!(json["metrics"]["time_to_completion"]["status"], "measured");
    assert!(json["run_id"].is_string());

    let svg = fs::read_to_string(workdir.path().join("course_completion_analysis.svg")).unwrap();
    assert!(svg.contains("Completion rate by category"));
}

#[test]
fn performance_respects_custom_paths_and_no_chart() {
    let workdir = TempDir::new().unwrap();
    let out = workdir.path().join("perf.json");

    metrics(&workdir)
        .args(["performance", "--no-chart", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("### Grade Distribution"))
        .stdout(predicate::str::contains("Chart saved").not());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["metrics"]["status"], "graded");
    assert_eq!(json["metrics"]["graded_submissions"], 7);
    assert!(!workdir.path().join("student_performance_analysis.svg").exists());
}

#[test]
fn mentors_skip_unapproved_mentors() {
    let workdir = TempDir::new().unwrap();

    metrics(&workdir)
        .arg("mentors")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dana Whitfield"))
        .stdout(predicate::str::contains("Lena Okafor").not());

    let raw = fs::read_to_string(workdir.path().join("mentor_effectiveness_report.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["metrics"]["total_mentors"], 2);
}

#[test]
fn report_combines_every_section() {
    let workdir = TempDir::new().unwrap();
    let chart = workdir.path().join("combined.svg");

    metrics(&workdir)
        .args(["report", "--chart"])
        .arg(&chart)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Platform Overview"))
        .stdout(predicate::str::contains("## Growth Trends (last 12 months)"));

    let raw = fs::read_to_string(workdir.path().join("platform_report.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for section in ["overview", "completion", "performance", "effectiveness", "trends"] {
        assert!(json.get(section).is_some(), "missing {section}");
    }
    assert_eq!(json["overview"]["users"]["total"], 9);
    assert!(fs::read_to_string(&chart).unwrap().contains("Monthly registrations"));
}

#[test]
fn config_file_changes_outlier_bounds() {
    let workdir = TempDir::new().unwrap();
    let config = workdir.path().join("metrics.toml");
    fs::write(&config, "[outliers]\nmin_days = 0\nmax_days = 10\n").unwrap();

    metrics(&workdir)
        .args(["completion", "--no-chart", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No plausible durations"));
}

#[test]
fn empty_directory_fails_without_artifacts() {
    let workdir = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("mentorship-metrics").unwrap();
    cmd.current_dir(workdir.path())
        .env("RUST_LOG", "error")
        .args(["completion", "--source", "csv", "--data-dir"])
        .arg(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no enrollments found"));

    assert!(!workdir.path().join("completion_report.json").exists());
    assert!(!workdir.path().join("course_completion_analysis.svg").exists());
}

#[test]
fn unwritable_chart_leaves_no_json_behind() {
    let workdir = TempDir::new().unwrap();
    let chart = workdir.path().join("no-such-dir").join("chart.svg");

    metrics(&workdir)
        .args(["completion", "--chart"])
        .arg(&chart)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Report saved").not());

    assert!(!workdir.path().join("completion_report.json").exists());
}

#[test]
fn missing_directory_is_reported() {
    let workdir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("mentorship-metrics").unwrap();
    cmd.current_dir(workdir.path())
        .args(["trends", "--source", "csv", "--data-dir", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn postgres_source_requires_database_url() {
    let workdir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("mentorship-metrics").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("DATABASE_URL")
        .arg("trends")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL must be set"));
}
