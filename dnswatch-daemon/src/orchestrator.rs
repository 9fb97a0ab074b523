//! Module orchestration -- assembly, lifecycle management and shutdown.
//!
//! The [`Orchestrator`] is the central coordinator of `dnswatch-daemon`.
//! It takes a validated configuration, builds the query pipeline module,
//! starts it and runs the main loop until one of the following happens:
//!
//! - `SIGTERM` / `SIGINT` is received
//! - every capture source was finite and has finished (replay-only setups)
//! - a capture source failed unrecoverably (e.g. the interface disappeared)
//!
//! In all three cases modules are stopped gracefully, which performs the
//! final bounded flush and persists anything still unsent. A capture
//! failure is then reported as an error so the process exits non-zero.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use dnswatch_core::config::DnswatchConfig;
use dnswatch_core::metrics as m;
use dnswatch_core::pipeline::HealthStatus;
use dnswatch_query_pipeline::CaptureExit;

use crate::health::{self, DaemonHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{ModuleRegistry, query_pipeline};

/// Interval between periodic health checks.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Why the main loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// An OS signal was received.
    Signal(&'static str),
    /// All capture sources were finite and have finished.
    CaptureCompleted,
    /// A capture source failed and cannot continue.
    CaptureFailed {
        /// Name of the failed source.
        source_name: String,
        /// Failure reason.
        reason: String,
    },
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: DnswatchConfig,
    /// Registered modules (start order).
    modules: ModuleRegistry,
    /// Capture completion/failure reports from the query pipeline.
    capture_exit_rx: mpsc::Receiver<CaptureExit>,
    /// Shutdown broadcast for background tasks.
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// Environment overrides are applied and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, parsed or
    /// validated, or if the query pipeline fails to initialize.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = DnswatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: DnswatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Recorder goes first so module construction can already emit metrics
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let mut modules = ModuleRegistry::new();
        let (handle, capture_exit_rx) = query_pipeline::init(&config).await?;
        modules.register(handle);

        tracing::info!(modules = modules.count(), "orchestrator initialized");

        if config.metrics.enabled {
            record_build_info();
        }

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config,
            modules,
            capture_exit_rx,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all modules and run until a shutdown signal or capture exit.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start all modules and run until `shutdown` resolves or the capture
    /// sources report an exit.
    ///
    /// `shutdown` resolves to the name of the signal that triggered it.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| Path::new(&self.config.general.pid_file).to_path_buf());

        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        tracing::info!(modules = self.modules.enabled_count(), "starting modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            if let Some(path) = &pid_file {
                remove_pid_file(path);
            }
            return Err(e);
        }

        let uptime_task = self.config.metrics.enabled.then(|| {
            spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe())
        });

        let cause = match self.main_loop(shutdown).await {
            Ok(cause) => cause,
            Err(e) => {
                tracing::error!(error = %e, "main loop failed, shutting down");
                ShutdownCause::Signal("error")
            }
        };
        tracing::info!(cause = ?cause, "shutting down");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stop_result = self.modules.stop_all().await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }

        stop_result?;

        match cause {
            ShutdownCause::CaptureFailed {
                source_name,
                reason,
            } => Err(anyhow::anyhow!(
                "capture source '{}' failed: {}",
                source_name,
                reason
            )),
            ShutdownCause::Signal(_) | ShutdownCause::CaptureCompleted => {
                tracing::info!(
                    uptime_secs = self.start_time.elapsed().as_secs(),
                    "dnswatch-daemon stopped"
                );
                Ok(())
            }
        }
    }

    /// Wait for the first shutdown cause, logging health periodically.
    async fn main_loop<F>(&mut self, shutdown: F) -> Result<ShutdownCause>
    where
        F: Future<Output = Result<&'static str>>,
    {
        tokio::pin!(shutdown);

        let mut health_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + HEALTH_CHECK_INTERVAL,
            HEALTH_CHECK_INTERVAL,
        );
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_status = HealthStatus::Healthy;
        let mut exit_open = true;

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal, "shutdown signal received");
                    return Ok(ShutdownCause::Signal(signal));
                }
                exit = self.capture_exit_rx.recv(), if exit_open => match exit {
                    Some(CaptureExit::Completed) => {
                        tracing::info!("all capture sources finished");
                        return Ok(ShutdownCause::CaptureCompleted);
                    }
                    Some(CaptureExit::Failed { source_name, reason }) => {
                        tracing::error!(
                            source = %source_name,
                            reason = %reason,
                            "capture source failed"
                        );
                        return Ok(ShutdownCause::CaptureFailed { source_name, reason });
                    }
                    None => {
                        tracing::debug!("capture exit channel closed");
                        exit_open = false;
                    }
                },
                _ = health_tick.tick() => {
                    let report = self.health().await;
                    if report.status != last_status {
                        health::log_report(&report);
                        last_status = report.status;
                    }
                }
            }
        }
    }

    /// Current aggregated health report.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health().await;
        let uptime_secs = self.start_time.elapsed().as_secs();

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }

    /// The validated configuration.
    pub fn config(&self) -> &DnswatchConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to `path`.
///
/// The file is created with `create_new`, so two daemons cannot both
/// claim it. A leftover file whose process no longer exists is treated
/// as stale and replaced.
///
/// # Errors
///
/// Returns an error if another live instance owns the file or the file
/// cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o755)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();

    let open = || OpenOptions::new().write(true).create_new(true).open(path);
    let mut file = match open() {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_default();
            let existing = existing.trim();
            match existing.parse::<u32>() {
                Ok(other) if other != pid && !process_alive(other) => {
                    tracing::warn!(
                        path = %path.display(),
                        stale_pid = other,
                        "removing stale PID file"
                    );
                    fs::remove_file(path)?;
                    open()?
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "PID file {} already exists with PID: {}. Is another instance running?",
                        path.display(),
                        if existing.is_empty() { "unknown" } else { existing }
                    ));
                }
            }
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    writeln!(file, "{pid}")?;
    file.sync_all()?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on shutdown. Failures are logged, not returned.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        ),
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Record the build info gauge. Called once at startup.
fn record_build_info() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Periodically update the uptime gauge until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
