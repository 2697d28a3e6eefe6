//! Coverage for config parsing and path resolution.

use std::path::{Path, PathBuf};

use leadbox::config::{
    config_dir, load_config, Config, DatabaseConfig, LogRotation, NotificationConfig,
};

#[test]
fn default_database_values() {
    let db = DatabaseConfig::default();
    assert_eq!(db.path, PathBuf::from("leadbox.db"));
    assert_eq!(db.max_connections, 5);
}

#[test]
fn default_notification_links() {
    let notifications = NotificationConfig::default();
    assert!(notifications.enabled);
    assert_eq!(notifications.vendor_link_base, "/vendor/messages/");
    assert_eq!(notifications.buyer_link_base, "/account/messages/");
}

#[test]
fn config_dir_resolves() {
    let dir = config_dir();
    assert!(dir.is_ok());
    let path = match dir {
        Ok(path) => path,
        Err(err) => panic!("config dir should resolve: {err}"),
    };
    assert!(path.ends_with(".leadbox"));
}

#[test]
fn parse_partial_config_keeps_other_defaults() {
    let toml_str = r#"
[database]
path = "/var/lib/leadbox/inbox.db"

[inbox]
max_page_size = 100

[notifications]
enabled = false
"#;
    let parsed = toml::from_str::<Config>(toml_str);
    let config = match parsed {
        Ok(config) => config,
        Err(err) => panic!("partial config should parse: {err}"),
    };

    assert_eq!(config.database.path, PathBuf::from("/var/lib/leadbox/inbox.db"));
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.inbox.max_page_size, 100);
    assert_eq!(config.inbox.default_page_size, 50);
    assert_eq!(config.inbox.planning_window_days, 90);
    assert!(!config.notifications.enabled);
    assert_eq!(config.notifications.buyer_link_base, "/account/messages/");
}

#[test]
fn unknown_type_is_a_parse_error() {
    let toml_str = r#"
[inbox]
planning_window_days = "ninety"
"#;
    assert!(toml::from_str::<Config>(toml_str).is_err());
}

#[test]
fn load_config_reads_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[inbox]\nupcoming_window_days = 14\n").expect("write config");

    let config = load_config(&path).expect("config should load");
    assert_eq!(config.inbox.upcoming_window_days, 14);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = Config::load_or_default(Path::new("/nonexistent/leadbox/config.toml"))
        .expect("defaults expected");
    assert_eq!(config.inbox.default_page_size, 50);
}

#[test]
fn load_config_reports_missing_file() {
    let err = load_config(Path::new("/nonexistent/leadbox/config.toml"))
        .expect_err("missing file should fail");
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn logging_section_parses_dir_and_rotation() {
    let config: Config = toml::from_str(
        r#"
[logging]
dir = "/var/log/leadbox"
rotation = "hourly"
"#,
    )
    .expect("logging section should parse");
    assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/leadbox")));
    assert_eq!(config.logging.rotation, LogRotation::Hourly);
    assert_eq!(config.logging.level, "info");

    let defaults = Config::default();
    assert!(defaults.logging.dir.is_none());
    assert_eq!(defaults.logging.rotation, LogRotation::Daily);
}

#[test]
fn unknown_rotation_is_rejected() {
    let parsed = toml::from_str::<Config>("[logging]\nrotation = \"weekly\"\n");
    assert!(parsed.is_err());
}
