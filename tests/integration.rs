use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const OVERRIDE_VARS: &[&str] = &[
    "API_BASE_URL",
    "DEEPFAKE_API_ENDPOINT",
    "AUDIO_API_ENDPOINT",
    "IMAGE_API_ENDPOINT",
    "MISINFORMATION_API_ENDPOINT",
    "MISINFORMATION_API_URL",
    "WEB_SERVER_PORT",
];

fn verity_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("verity");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let media_dir = root.join("media");
    fs::create_dir_all(&media_dir).unwrap();
    fs::write(media_dir.join("suspect.png"), b"\x89PNG\r\n\x1a\nfake image bytes").unwrap();
    fs::write(media_dir.join("clip.mp4"), b"\x00\x00\x00\x18ftypmp42").unwrap();
    fs::write(media_dir.join("voice.wav"), b"RIFF....WAVEfmt ").unwrap();
    fs::write(
        media_dir.join("claim.txt"),
        "Scientists confirm that drinking seawater cures every known disease.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/verity.sqlite"

[server]
bind = "127.0.0.1:0"

[upstream]
mode = "simulated"

[uploads]
dir = "{root}/uploads"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("verity.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_verity(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = verity_binary();
    let mut cmd = Command::new(&binary);
    for var in OVERRIDE_VARS {
        cmd.env_remove(var);
    }
    let output = cmd
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run verity binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Count printed by `verity stats` for a row label.
fn stat_count(stdout: &str, label: &str) -> Option<usize> {
    stdout.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next()? == label {
            parts.next()?.parse().ok()
        } else {
            None
        }
    })
}

fn media(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("media")
        .join(name)
        .display()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_verity(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("verity.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_verity(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_verity(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_history() {
    let (_tmp, config_path) = setup_test_env();

    run_verity(&config_path, &["init"]);
    let (stdout, stderr, success) = run_verity(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert_eq!(stat_count(&stdout, "total"), Some(0));
    assert_eq!(stat_count(&stdout, "deepfake"), Some(0));
}

#[test]
fn test_analyze_records_history() {
    let (_tmp, config_path) = setup_test_env();

    let image = media(&config_path, "suspect.png");
    let (stdout, stderr, success) = run_verity(&config_path, &["analyze", "image", &image]);
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fake probability"));
    assert!(stdout.contains("Saved to image history (1 record)."));

    let clip = media(&config_path, "clip.mp4");
    let (_, stderr, success) = run_verity(&config_path, &["analyze", "deepfake", &clip]);
    assert!(success, "deepfake analyze failed: {}", stderr);

    let (stdout, _, success) = run_verity(&config_path, &["history", "image"]);
    assert!(success);
    assert!(stdout.contains("image history (1 of 10"));
    assert!(stdout.contains("suspect.png") || stdout.contains("Image analysis"));

    let (stdout, _, _) = run_verity(&config_path, &["stats"]);
    assert_eq!(stat_count(&stdout, "image"), Some(1));
    assert_eq!(stat_count(&stdout, "deepfake"), Some(1));
    assert_eq!(stat_count(&stdout, "total"), Some(2));
}

#[test]
fn test_analyze_misinfo_text() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_verity(
        &config_path,
        &["analyze", "misinfo", "--text", "The moon is made of cheese"],
    );
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("Likely Misinformation") || stdout.contains("Likely Authentic"),
        "unexpected verdict: {}",
        stdout
    );

    let (stdout, _, _) = run_verity(&config_path, &["history", "misinfo"]);
    assert!(stdout.contains("\"The moon is made of cheese...\""));
}

#[test]
fn test_analyze_misinfo_from_file() {
    let (_tmp, config_path) = setup_test_env();

    let claim = media(&config_path, "claim.txt");
    let (_, stderr, success) = run_verity(&config_path, &["analyze", "misinfo", &claim]);
    assert!(success, "analyze failed: {}", stderr);

    let (stdout, _, _) = run_verity(&config_path, &["history", "misinfo"]);
    // Only the first 60 characters are kept.
    assert!(stdout.contains("\"Scientists confirm that drinking seawater cures every known ...\""));
}

#[test]
fn test_analyze_without_text_fails_before_network() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_verity(&config_path, &["analyze", "misinfo", "--text", "  "]);
    assert!(!success);
    assert!(stderr.contains("No text provided"), "stderr: {}", stderr);

    let (stdout, _, _) = run_verity(&config_path, &["stats"]);
    assert_eq!(stat_count(&stdout, "total"), Some(0));
}

#[test]
fn test_analyze_unknown_category_fails() {
    let (_tmp, config_path) = setup_test_env();

    let image = media(&config_path, "suspect.png");
    let (_, stderr, success) = run_verity(&config_path, &["analyze", "podcast", &image]);
    assert!(!success);
    assert!(stderr.contains("Unknown category"));
}

#[test]
fn test_analyze_missing_file_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_verity(&config_path, &["analyze", "audio", "/nonexistent/voice.wav"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read file"));
}

#[test]
fn test_history_clear() {
    let (_tmp, config_path) = setup_test_env();

    let voice = media(&config_path, "voice.wav");
    run_verity(&config_path, &["analyze", "audio", &voice]);
    run_verity(&config_path, &["analyze", "audio", &voice]);

    let (stdout, _, _) = run_verity(&config_path, &["history", "audio"]);
    assert!(stdout.contains("audio history (2 of 10"));

    let (stdout, _, success) = run_verity(&config_path, &["history", "audio", "--clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared audio history."));

    let (stdout, _, _) = run_verity(&config_path, &["history", "audio"]);
    assert!(stdout.contains("No audio analyses yet."));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (stdout, stderr, success) = run_verity(&missing, &["history", "podcast"]);
    assert!(!success, "stdout={}", stdout);
    // Config loading succeeded; the failure is the category.
    assert!(stderr.contains("Unknown category"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[upstream]\nmode = \"psychic\"\n").unwrap();

    let (_, stderr, success) = run_verity(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown upstream mode"));
}
