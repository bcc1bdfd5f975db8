use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mcov_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mcov");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/mcov.sqlite"

[geo]
center_lat = 37.7749
center_lon = -122.4194
max_distance_miles = 500.0
sample_precision = 8
cell_precision = 6

[retention]
sample_max_age_days = 180
repeater_max_age_days = 30
look_back_days = 3

[server]
bind = "127.0.0.1:7431"
"#,
        root.display()
    );

    let config_path = config_dir.join("mcov.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mcov(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mcov_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mcov binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mcov(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_mcov(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_mcov(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_submit_and_get_coverage() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    // A loss, then a hit via rpt1, at the same San Francisco cell
    let (stdout, stderr, success) = run_mcov(
        &config_path,
        &["submit", "--lat=37.7749", "--lon=-122.4194", "--time=1000"],
    );
    assert!(success, "submit failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sample key: 9q8yyk8y"));
    assert!(stdout.contains("cell key: 9q8yyk"));
    assert!(stdout.contains("merged: 1 new, 0 duplicate"));

    let (stdout, _, success) = run_mcov(
        &config_path,
        &[
            "submit",
            "--lat=37.7749",
            "--lon=-122.4194",
            "--path=Rpt1",
            "--time=2000",
        ],
    );
    assert!(success);
    assert!(stdout.contains("merged: 1 new, 0 duplicate"));

    let (stdout, stderr, success) = run_mcov(&config_path, &["coverage", "get", "9q8yyk"]);
    assert!(success, "coverage get failed: {}{}", stdout, stderr);
    assert!(stdout.contains("heard: 1"));
    assert!(stdout.contains("lost: 1"));
    assert!(stdout.contains("lastHeard: 2000"));
    assert!(stdout.contains("hitRepeaters: rpt1"));
    assert!(stdout.contains("history: 2 entries"));
}

#[test]
fn test_submit_duplicate_time_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    let args = &[
        "submit",
        "--lat=37.7749",
        "--lon=-122.4194",
        "--path=rpt1",
        "--time=1500",
    ];
    let (stdout, _, success) = run_mcov(&config_path, args);
    assert!(success);
    assert!(stdout.contains("merged: 1 new, 0 duplicate"));

    let (stdout, _, success) = run_mcov(&config_path, args);
    assert!(success);
    assert!(stdout.contains("merged: 0 new, 1 duplicate"));

    let (stdout, _, _) = run_mcov(&config_path, &["coverage", "get", "9q8yyk"]);
    assert!(stdout.contains("heard: 1"));
    assert!(stdout.contains("lost: 0"));
    assert!(stdout.contains("history: 1 entries"));
}

#[test]
fn test_samples_listing_with_prefix() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    run_mcov(
        &config_path,
        &["submit", "--lat=37.7749", "--lon=-122.4194", "--time=1000"],
    );
    run_mcov(
        &config_path,
        &["submit", "--lat=37.8044", "--lon=-122.2712", "--time=2000"],
    );

    let (stdout, _, success) = run_mcov(&config_path, &["samples"]);
    assert!(success);
    assert!(stdout.contains("samples: 2"));

    let (stdout, _, success) = run_mcov(&config_path, &["samples", "--prefix", "9q8yyk"]);
    assert!(success);
    assert!(stdout.contains("samples: 1"));
    assert!(stdout.contains("9q8yyk8y"));
}

#[test]
fn test_purge_deletes_inclusive_time_window() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    // Four distinct cells around the bay, times straddling the window
    let coords = [
        ("37.7749", "-122.4194", "999"),
        ("37.8044", "-122.2712", "1000"),
        ("37.6879", "-122.4702", "2000"),
        ("37.9101", "-122.0652", "2001"),
    ];
    for (lat, lon, time) in coords {
        let lat = format!("--lat={}", lat);
        let lon = format!("--lon={}", lon);
        let time = format!("--time={}", time);
        let (_, stderr, success) = run_mcov(&config_path, &["submit", &lat, &lon, &time]);
        assert!(success, "submit failed: {}", stderr);
    }

    let (stdout, _, success) = run_mcov(&config_path, &["purge", "--start=1000", "--end=2000"]);
    assert!(success);
    assert!(stdout.contains("purged 2 samples"));

    let (stdout, _, _) = run_mcov(&config_path, &["samples"]);
    assert!(stdout.contains("samples: 2"));
}

#[test]
fn test_repair_single_cell_and_all() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    run_mcov(
        &config_path,
        &[
            "submit",
            "--lat=37.7749",
            "--lon=-122.4194",
            "--path=rpt1",
            "--time=1000",
        ],
    );
    run_mcov(
        &config_path,
        &["submit", "--lat=37.7749", "--lon=-122.4194", "--time=2000"],
    );

    let (stdout, stderr, success) = run_mcov(&config_path, &["repair", "9q8yyk"]);
    assert!(success, "repair failed: {}{}", stdout, stderr);
    assert!(stdout.contains("repaired 9q8yyk"));
    assert!(stdout.contains("heard: 1"));
    assert!(stdout.contains("lost: 1"));

    let (stdout, _, success) = run_mcov(&config_path, &["repair", "--all"]);
    assert!(success);
    assert!(stdout.contains("repaired: 1"));
    assert!(stdout.contains("failed: 0"));
}

#[test]
fn test_repeater_elevation_preserved_on_omission() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    let (_, stderr, success) = run_mcov(
        &config_path,
        &[
            "repeater", "set", "--id=r1", "--lat=1.0", "--lon=2.0", "--name=Site A",
            "--elev=100", "--time=1000",
        ],
    );
    assert!(success, "repeater set failed: {}", stderr);

    let (stdout, _, success) = run_mcov(
        &config_path,
        &[
            "repeater", "set", "--id=r1", "--lat=1.0", "--lon=2.0", "--name=Site A2",
            "--time=2000",
        ],
    );
    assert!(success);
    assert!(stdout.contains("name=Site A2"));
    assert!(stdout.contains("elev=100"));
    assert!(stdout.contains("time=2000"));

    let (stdout, _, success) = run_mcov(&config_path, &["repeater", "get", "r1"]);
    assert!(success);
    assert!(stdout.contains("elev=100"));
}

#[test]
fn test_repeater_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    run_mcov(
        &config_path,
        &[
            "repeater", "set", "--id=r1", "--lat=1.0", "--lon=2.0", "--name=Site",
            "--time=1000",
        ],
    );
    let (stdout, _, success) = run_mcov(
        &config_path,
        &["repeater", "delete", "--id=r1", "--lat=1.0", "--lon=2.0"],
    );
    assert!(success);
    assert!(stdout.contains("deleted repeater r1"));

    // Second delete finds nothing
    let (_, _, success) = run_mcov(
        &config_path,
        &["repeater", "delete", "--id=r1", "--lat=1.0", "--lon=2.0"],
    );
    assert!(!success);
}

#[test]
fn test_recent_includes_sampled_cells() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    run_mcov(
        &config_path,
        &["submit", "--lat=37.7749", "--lon=-122.4194", "--time=1000"],
    );

    // Raw samples count as recent even with an ancient observation time
    let (stdout, _, success) = run_mcov(&config_path, &["recent"]);
    assert!(success);
    assert!(stdout.contains("9q8yyk"));
}

#[test]
fn test_submit_rejects_invalid_location() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    let (_, stderr, success) = run_mcov(
        &config_path,
        &["submit", "--lat=91.0", "--lon=0.0", "--time=1000"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid"));
}

#[test]
fn test_submit_rejects_far_location() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    // Null Island is far beyond the 500 mile limit around San Francisco
    let (_, stderr, success) = run_mcov(
        &config_path,
        &["submit", "--lat=0.0", "--lon=0.0", "--time=1000"],
    );
    assert!(!success);
    assert!(stderr.contains("max distance"));

    let (stdout, _, _) = run_mcov(&config_path, &["samples"]);
    assert!(stdout.contains("samples: 0"));
}

#[test]
fn test_coverage_get_absent_cell_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    let (_, stderr, success) = run_mcov(&config_path, &["coverage", "get", "zzzzzz"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_evict_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_mcov(&config_path, &["init"]);

    run_mcov(
        &config_path,
        &["submit", "--lat=37.7749", "--lon=-122.4194", "--time=1000"],
    );

    // An observation from 1970 is long past any retention window
    let (stdout, stderr, success) = run_mcov(&config_path, &["evict"]);
    assert!(success, "evict failed: {}", stderr);
    assert!(stdout.contains("samples archived: 1"));
    assert!(stdout.contains("samples deleted: 1"));
    assert!(stdout.contains("repeaters deleted: 0"));

    let (stdout, _, _) = run_mcov(&config_path, &["samples"]);
    assert!(stdout.contains("samples: 0"));
}
