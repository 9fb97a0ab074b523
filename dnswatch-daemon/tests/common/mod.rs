//! Shared helpers for daemon integration tests.

use std::path::{Path, PathBuf};

use dnswatch_core::config::DnswatchConfig;

/// Builder for test-friendly `DnswatchConfig` values.
///
/// Starts from a replay-only setup with no PID file, no event polling and
/// the smallest allowed buffer, so tests never touch system paths.
#[allow(dead_code)]
pub struct TestConfigBuilder {
    config: DnswatchConfig,
}

#[allow(dead_code)]
impl TestConfigBuilder {
    pub fn new(api_host: &str) -> Self {
        let mut config = DnswatchConfig::default();
        config.general.pid_file = String::new();
        config.api.host = api_host.to_owned();
        config.api.api_key = "test-key".to_owned();
        config.api.timeout_secs = 5;
        config.capture.sources = vec!["replay".to_owned()];
        config.queries.buffer_size = 64;
        config.queries.flush_interval_secs = 5;
        config.queries.send_timeout_secs = 2;
        config.queries.shutdown_grace_secs = 5;
        config.events.file = String::new();
        Self { config }
    }

    pub fn replay(mut self, file: &Path) -> Self {
        self.config.capture.replay_files = vec![file.display().to_string()];
        self
    }

    pub fn live(mut self, interface: &str) -> Self {
        self.config.capture.sources = vec!["live".to_owned()];
        self.config.capture.feed_bind = "127.0.0.1:0".to_owned();
        self.config.network.interface = interface.to_owned();
        self
    }

    pub fn scope_file(mut self, file: &Path) -> Self {
        self.config.scope.file = file.display().to_string();
        self
    }

    pub fn pid_file(mut self, file: &Path) -> Self {
        self.config.general.pid_file = file.display().to_string();
        self
    }

    pub fn failed_file(mut self, file: &Path) -> Self {
        self.config.queries.failed.file = file.display().to_string();
        self
    }

    pub fn events(mut self, target: &Path, poll_interval_secs: u64) -> Self {
        self.config.events.file = target.display().to_string();
        self.config.events.poll_interval_secs = poll_interval_secs;
        self
    }

    pub fn build(self) -> DnswatchConfig {
        self.config
    }
}

/// One replay record as the capture sources expect it.
#[allow(dead_code)]
pub fn record(ip: &str, fqdn: &str) -> String {
    format!(
        r#"{{"timestamp":"2017-01-01T00:00:00Z","source_ip":"{ip}","record_type":"A","fqdn":"{fqdn}","protocol":"udp","port":53}}"#
    )
}

/// Write replay records to `capture.jsonl` inside `dir`.
#[allow(dead_code)]
pub fn write_capture(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("capture.jsonl");
    std::fs::write(&path, lines.join("\n")).expect("should write capture file");
    path
}
