//! CLI contract tests.

use std::path::Path;

use assert_cmd::Command;

fn leadbox(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("leadbox").expect("binary should build");
    cmd.arg("--config")
        .arg(db.with_extension("toml"))
        .arg("--db")
        .arg(db);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("command should run");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("leadbox").expect("binary should build");
    let out = stdout_of(cmd.arg("--help"));
    for sub in ["init", "status", "threads", "messages", "planning", "unread"] {
        assert!(out.contains(sub), "help should mention `{sub}`");
    }
}

#[test]
fn init_creates_database() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");

    let out = stdout_of(leadbox(&db).arg("init"));
    assert!(out.contains("initialised"));
    assert!(db.exists(), "database file should exist after init");
}

#[test]
fn status_on_fresh_database_is_zero() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");

    let out = stdout_of(leadbox(&db).arg("status"));
    let stats: serde_json::Value = serde_json::from_str(&out).expect("status prints json");
    assert_eq!(stats["threads"], 0);
    assert_eq!(stats["messages"], 0);
}

#[test]
fn threads_on_fresh_database_is_empty() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");

    let out = stdout_of(leadbox(&db).args(["threads", "--vendor", "V1", "--group-by", "counterpart"]));
    let items: serde_json::Value = serde_json::from_str(&out).expect("threads prints json");
    assert_eq!(items, serde_json::json!([]));
}

#[test]
fn unknown_scope_is_rejected() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");

    leadbox(&db)
        .args(["threads", "--vendor", "V1", "--scope", "deleted"])
        .assert()
        .failure();
}

fn log_lines(dir: &Path) -> Vec<serde_json::Value> {
    let mut lines = Vec::new();
    for entry in std::fs::read_dir(dir).expect("log dir should exist") {
        let path = entry.expect("readable entry").path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("leadbox"), "unexpected file {name}");
        let text = std::fs::read_to_string(&path).expect("readable log file");
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            lines.push(serde_json::from_str(line).expect("log lines are json"));
        }
    }
    lines
}

#[test]
fn log_dir_flag_writes_json_lines_and_keeps_stdout_clean() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");
    let logs = tmp.path().join("logs");

    let out = stdout_of(
        leadbox(&db)
            .env_remove("RUST_LOG")
            .arg("--log-dir")
            .arg(&logs)
            .arg("status"),
    );
    let stats: serde_json::Value = serde_json::from_str(&out).expect("stdout is only json");
    assert_eq!(stats["threads"], 0);

    let lines = log_lines(&logs);
    assert!(
        lines
            .iter()
            .any(|l| l["fields"]["message"] == "inbox database ready"),
        "expected the database open event in {lines:?}"
    );
}

#[test]
fn logging_dir_from_config_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("inbox.db");
    let logs = tmp.path().join("cfg-logs");
    std::fs::write(
        db.with_extension("toml"),
        format!(
            "[logging]\ndir = {:?}\nrotation = \"never\"\n",
            logs.display().to_string()
        ),
    )
    .expect("should write config");

    stdout_of(leadbox(&db).env_remove("RUST_LOG").arg("init"));

    assert!(logs.join("leadbox.log").exists(), "non-rotating file should be leadbox.log");
    assert!(!log_lines(&logs).is_empty());
}
