use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tsn_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tsn");
    path
}

const FEED: &str = r#"[
    {"source_id": "v1", "platform": "youtube",
     "publish_time": "2026-08-01T12:00:00Z", "title": "Alpha video",
     "channel": "alpha", "category": "tech", "views": 90000, "likes": 1200},
    {"source_id": "v2", "platform": "youtube",
     "publish_time": "2026-08-02T12:00:00Z", "title": "Beta video",
     "channel": "beta", "category": "music", "views": 40000, "likes": 300},
    {"source_id": "v3", "platform": "youtube",
     "publish_time": "2026-08-03T12:00:00Z", "title": "Gamma video",
     "channel": "gamma", "category": "news", "views": 500}
]"#;

fn setup_test_env(provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("feed.json"), FEED).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/trendsnap.sqlite"

[feed]
path = "{root}/feed.json"

[assets]
dir = "{root}/data/assets"
url_prefix = "https://assets.example.com"
min_bytes = 16

[pipeline]
top_n = 3
concurrency = 2
max_retries = 1
backoff_ms = 0
deadline_secs = 30

[image]
provider = "{provider}"
"#,
        root = root.display(),
        provider = provider
    );

    let config_path = root.join("trendsnap.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tsn(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = tsn_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tsn binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

fn asset_files(config_path: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let assets_dir = config_path.parent().unwrap().join("data/assets");
    let mut files: Vec<(PathBuf, Vec<u8>)> = fs::read_dir(&assets_dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            let bytes = fs::read(&path).unwrap();
            (path, bytes)
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env("stub");

    let (stdout, stderr, code) = run_tsn(&config_path, &["init"]);
    assert_eq!(code, Some(0), "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(config_path.parent().unwrap().join("data/trendsnap.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("stub");

    let (_, _, code1) = run_tsn(&config_path, &["init"]);
    assert_eq!(code1, Some(0), "First init failed");

    let (_, _, code2) = run_tsn(&config_path, &["init"]);
    assert_eq!(code2, Some(0), "Second init failed (not idempotent)");
}

#[test]
fn test_run_with_stub_provider_succeeds() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    let (stdout, stderr, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );

    assert_eq!(code, Some(0), "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 3 items"));
    assert!(stdout.contains("assets: 3 ready, 0 pending, 0 failed, 0 n/a"));
    assert!(stdout.contains("ok"));
    assert_eq!(asset_files(&config_path).len(), 3);
}

#[test]
fn test_second_day_preserves_assets_and_data_version() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    let (first_out, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );
    assert_eq!(code, Some(0), "first run failed: {}", first_out);
    assert!(first_out.contains("(changed)"));

    let before = asset_files(&config_path);
    assert_eq!(before.len(), 3);

    let (second_out, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-29", "--run-id", "run-b"],
    );
    assert_eq!(code, Some(0), "second run failed: {}", second_out);
    // Identical content: same data_version as the previous run.
    assert!(second_out.contains("(unchanged)"));

    // Assets are byte-for-byte untouched.
    let after = asset_files(&config_path);
    assert_eq!(before, after);
}

#[test]
fn test_content_change_rotates_data_version() {
    let (tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );
    let (first_json, _, _) = run_tsn(&config_path, &["latest"]);
    let first: serde_json::Value = serde_json::from_str(&first_json).unwrap();

    // Change one descriptive field in one item.
    let changed_feed = FEED.replace("Gamma video", "Gamma video (updated)");
    fs::write(tmp.path().join("feed.json"), changed_feed).unwrap();

    let (stdout, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-29", "--run-id", "run-b"],
    );
    assert_eq!(code, Some(0));
    assert!(stdout.contains("(changed)"));

    let (second_json, _, _) = run_tsn(&config_path, &["latest"]);
    let second: serde_json::Value = serde_json::from_str(&second_json).unwrap();
    assert_ne!(first["data_version"], second["data_version"]);
}

#[test]
fn test_latest_prints_ordered_contract() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );

    let (stdout, stderr, code) = run_tsn(&config_path, &["latest"]);
    assert_eq!(code, Some(0), "latest failed: {}", stderr);

    let output: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(output["run_id"], "run-a");
    assert_eq!(output["snapshot_date"], "2026-08-28");

    let items = output["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    let ranks: Vec<i64> = items.iter().map(|i| i["rank"].as_i64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    // Highest engagement ranks first.
    assert_eq!(items[0]["source_id"], "v1");
    for item in items {
        assert_eq!(item["image_status"], "ready");
        assert!(item["image_url"].as_str().unwrap().starts_with("https://assets.example.com/"));
    }
}

#[test]
fn test_latest_without_runs_fails() {
    let (_tmp, config_path) = setup_test_env("stub");
    run_tsn(&config_path, &["init"]);

    let (_, stderr, code) = run_tsn(&config_path, &["latest"]);
    assert_ne!(code, Some(0));
    assert!(stderr.contains("no runs recorded"));
}

#[test]
fn test_disabled_provider_reports_partial_success() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_tsn(&config_path, &["init"]);
    let (stdout, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );

    // Completed with pending assets: distinct exit code, snapshot written.
    assert_eq!(code, Some(3), "expected partial-success exit: {}", stdout);
    assert!(stdout.contains("assets: 0 ready, 3 pending, 0 failed, 0 n/a"));
    assert!(stdout.contains("partial"));

    let (latest, _, code) = run_tsn(&config_path, &["latest"]);
    assert_eq!(code, Some(0));
    let output: serde_json::Value = serde_json::from_str(&latest).unwrap();
    assert_eq!(output["items"].as_array().unwrap().len(), 3);
}

#[test]
fn test_top_n_gates_asset_generation() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    let (stdout, _, code) = run_tsn(
        &config_path,
        &[
            "run",
            "--date",
            "2026-08-28",
            "--run-id",
            "run-a",
            "--top-n",
            "1",
        ],
    );

    assert_eq!(code, Some(0));
    assert!(stdout.contains("assets: 1 ready, 0 pending, 0 failed, 2 n/a"));
    assert_eq!(asset_files(&config_path).len(), 1);
}

#[test]
fn test_malformed_item_is_excluded_not_fatal() {
    let (tmp, config_path) = setup_test_env("stub");

    let feed_with_bad_item = r#"[
        {"source_id": "good", "platform": "youtube",
         "publish_time": "2026-08-01T12:00:00Z", "title": "Fine", "views": 100},
        {"source_id": "bad", "platform": "youtube",
         "publish_time": "yesterday-ish", "title": "Broken", "views": 100}
    ]"#;
    fs::write(tmp.path().join("feed.json"), feed_with_bad_item).unwrap();

    run_tsn(&config_path, &["init"]);
    let (stdout, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--run-id", "run-a"],
    );

    assert_eq!(code, Some(0), "run failed: {}", stdout);
    assert!(stdout.contains("excluded: 1"));
    assert!(stdout.contains("ranked: 1"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env("stub");

    let (stdout, _, code) = run_tsn(
        &config_path,
        &["run", "--date", "2026-08-28", "--dry-run"],
    );

    assert_eq!(code, Some(0));
    assert!(stdout.contains("(dry-run)"));
    assert!(!tmp.path().join("data/trendsnap.sqlite").exists());
    assert!(!tmp.path().join("data/assets").exists());
}

#[test]
fn test_prune_is_age_gated() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    // One old run, one recent run.
    run_tsn(
        &config_path,
        &["run", "--date", "2020-01-01", "--run-id", "run-old"],
    );
    run_tsn(
        &config_path,
        &["run", "--date", "2099-01-01", "--run-id", "run-new"],
    );

    let (stdout, _, code) = run_tsn(&config_path, &["prune", "--retention-days", "365"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("pruned 3 snapshot rows"), "got: {}", stdout);

    // The recent run's output survives.
    let (latest, _, code) = run_tsn(&config_path, &["latest"]);
    assert_eq!(code, Some(0));
    let output: serde_json::Value = serde_json::from_str(&latest).unwrap();
    assert_eq!(output["run_id"], "run-new");
}

#[test]
fn test_rerun_same_run_id_is_idempotent() {
    let (_tmp, config_path) = setup_test_env("stub");

    run_tsn(&config_path, &["init"]);
    let args = ["run", "--date", "2026-08-28", "--run-id", "run-a"];
    let (_, _, code1) = run_tsn(&config_path, &args);
    let (_, _, code2) = run_tsn(&config_path, &args);
    assert_eq!(code1, Some(0));
    assert_eq!(code2, Some(0));

    let (latest, _, _) = run_tsn(&config_path, &["latest"]);
    let output: serde_json::Value = serde_json::from_str(&latest).unwrap();
    assert_eq!(output["run_id"], "run-a");
    assert_eq!(output["items"].as_array().unwrap().len(), 3);
}
