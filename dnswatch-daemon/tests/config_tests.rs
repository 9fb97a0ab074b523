//! Configuration loading tests from the daemon's point of view.
//!
//! Covers the full precedence chain: defaults, file, environment, CLI.

use std::env;
use std::path::Path;

use clap::Parser;
use serial_test::serial;

use dnswatch_core::config::DnswatchConfig;
use dnswatch_daemon::cli::DaemonCli;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"
log_format = "pretty"
pid_file = ""

[api]
host = "https://scoring.example.net"
api_key = "k-123"
timeout_secs = 10

[network]
interface = "eth0"
protocols = ["TCP", "udp", "udp"]
port = 5353

[capture]
sources = ["replay", "live"]
feed_bind = "127.0.0.1:5300"
replay_files = ["/tmp/a.jsonl", "  "]
channel_capacity = 128

[scope]
file = ""

[queries]
buffer_size = 1024
flush_interval_secs = 15
send_timeout_secs = 5
shutdown_grace_secs = 3

[queries.failed]
file = ""

[events]
file = "stdout"
poll_interval_secs = 60
cursor_file = ""

[metrics]
enabled = false
"#;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("dnswatch.toml");
    std::fs::write(&path, content).expect("should write config");
    path
}

fn cli(args: &[&str]) -> DaemonCli {
    let mut argv = vec!["dnswatch-daemon"];
    argv.extend_from_slice(args);
    DaemonCli::parse_from(argv)
}

#[tokio::test]
#[serial]
async fn full_config_loads_and_normalizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), FULL_CONFIG);

    let config = cli(&["--config", path.to_str().unwrap()])
        .load_config()
        .await
        .expect("full config should load");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.api.api_key, "k-123");
    assert_eq!(config.network.protocols, vec!["tcp", "udp"]);
    assert_eq!(config.capture.sources, vec!["live", "replay"]);
    assert_eq!(config.capture.replay_files, vec!["/tmp/a.jsonl"]);
    assert_eq!(config.queries.buffer_size, 1024);
    assert_eq!(config.events.poll_interval_secs, 60);
}

#[tokio::test]
#[serial]
async fn missing_sections_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "[network]\ninterface = \"eth0\"\n[general]\npid_file = \"\"\n",
    );

    let config = cli(&["--config", path.to_str().unwrap()])
        .load_config()
        .await
        .expect("partial config should load");
    let defaults = DnswatchConfig::default();

    assert_eq!(config.queries.buffer_size, defaults.queries.buffer_size);
    assert_eq!(config.queries.flush_interval_secs, 30);
    assert_eq!(config.events.file, "stderr");
    assert_eq!(config.api.host, "https://api.alphasoc.net");
    assert_eq!(config.network.protocols, vec!["udp"]);
}

#[tokio::test]
#[serial]
async fn cli_overrides_beat_environment_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), FULL_CONFIG);

    // SAFETY: serialized test, variables are removed below
    unsafe {
        env::set_var("DNSWATCH_GENERAL_LOG_LEVEL", "warn");
        env::set_var("DNSWATCH_QUERIES_BUFFER_SIZE", "4096");
    }

    let result = cli(&[
        "--config",
        path.to_str().unwrap(),
        "--log-level",
        "trace",
        "--log-format",
        "json",
    ])
    .load_config()
    .await;

    // SAFETY: cleanup of the variables set above
    unsafe {
        env::remove_var("DNSWATCH_GENERAL_LOG_LEVEL");
        env::remove_var("DNSWATCH_QUERIES_BUFFER_SIZE");
    }

    let config = result.expect("config should load");
    assert_eq!(config.general.log_level, "trace", "CLI wins over env");
    assert_eq!(config.general.log_format, "json", "CLI wins over file");
    assert_eq!(config.queries.buffer_size, 4096, "env wins over file");
}

#[tokio::test]
#[serial]
async fn cli_override_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), FULL_CONFIG);

    let err = cli(&["--config", path.to_str().unwrap(), "--log-format", "xml"])
        .load_config()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("general.log_format"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn unparsable_env_value_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), FULL_CONFIG);

    // SAFETY: serialized test, variable is removed below
    unsafe {
        env::set_var("DNSWATCH_QUERIES_BUFFER_SIZE", "lots");
    }
    let result = cli(&["--config", path.to_str().unwrap()]).load_config().await;
    // SAFETY: cleanup
    unsafe {
        env::remove_var("DNSWATCH_QUERIES_BUFFER_SIZE");
    }

    assert_eq!(result.expect("config should load").queries.buffer_size, 1024);
}

#[tokio::test]
#[serial]
async fn missing_file_names_the_path() {
    let err = cli(&["--config", "/nonexistent/dnswatch.toml"])
        .load_config()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("/nonexistent/dnswatch.toml"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn malformed_toml_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[queries\nbuffer_size = 1");

    let err = cli(&["--config", path.to_str().unwrap()])
        .load_config()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("parse"), "got: {err}");
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cases: [(&str, fn(&mut DnswatchConfig)); 6] = [
        ("queries.buffer_size", |c| c.queries.buffer_size = 63),
        ("queries.flush_interval_secs", |c| {
            c.queries.flush_interval_secs = 4;
        }),
        ("events.poll_interval_secs", |c| {
            c.events.poll_interval_secs = 1;
        }),
        ("network.protocols", |c| {
            c.network.protocols = vec!["icmp".to_owned()];
        }),
        ("network.interface", |c| c.network.interface = String::new()),
        ("api.host", |c| c.api.host = "ftp://scoring".to_owned()),
    ];

    for (field, mutate) in cases {
        let mut config = DnswatchConfig::default();
        config.network.interface = "eth0".to_owned();
        mutate(&mut config);
        let err = config.validate().expect_err(field);
        assert!(err.to_string().contains(field), "{field}: got {err}");
    }
}

#[test]
fn config_round_trips_through_toml() {
    let config = DnswatchConfig::parse(FULL_CONFIG).expect("should parse");
    let serialized = toml::to_string(&config).expect("should serialize");
    let reparsed = DnswatchConfig::parse(&serialized).expect("should reparse");

    assert_eq!(reparsed.api.host, config.api.host);
    assert_eq!(reparsed.capture.feed_bind, config.capture.feed_bind);
    assert_eq!(reparsed.queries.shutdown_grace_secs, 3);
}
