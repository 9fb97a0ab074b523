//! CLI argument definitions for dnswatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use dnswatch_core::config::DnswatchConfig;

/// dnswatch network agent.
///
/// Captures DNS queries on the local network, forwards the in-scope ones
/// to the scoring service and writes the scored events it sends back.
#[derive(Parser, Debug)]
#[command(name = "dnswatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to dnswatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/dnswatch/dnswatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and scope files, then exit without starting.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Load the configuration file with environment and CLI overrides.
    ///
    /// Order: defaults, file, `DNSWATCH_*` environment, command line.
    /// The result is normalized and validated.
    pub async fn load_config(&self) -> anyhow::Result<DnswatchConfig> {
        let mut config = DnswatchConfig::from_file(&self.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", self.config.display(), e))?;
        config.apply_env_overrides();
        self.apply_overrides(&mut config);
        config.normalize();
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(config)
    }

    /// Apply the command-line overrides on top of a loaded configuration.
    ///
    /// Called before validation so overridden values are checked too.
    pub fn apply_overrides(&self, config: &mut DnswatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}
