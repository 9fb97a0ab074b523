//! Query pipeline module initialization.
//!
//! Derives a `PipelineConfig` from `DnswatchConfig`, loads the monitoring
//! scope, builds the HTTP scoring client and wraps the resulting
//! `QueryPipeline` in a `ModuleHandle`.
//!
//! # Wiring
//!
//! ```text
//! capture sources --> QueryPipeline --HTTP--> scoring service
//!                          |
//!                          +--CaptureExit--> orchestrator
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use dnswatch_core::config::DnswatchConfig;
use dnswatch_query_pipeline::{CaptureExit, PipelineConfig, QueryPipelineBuilder, ScopeLoader};

use super::ModuleHandle;
use crate::client::HttpScoringClient;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "query-pipeline";

/// Initialize the query pipeline module.
///
/// # Returns
///
/// * The module handle, ready to start
/// * The receiver on which the pipeline reports capture completion or failure
///
/// # Errors
///
/// Fails if the scope file cannot be loaded or parsed, the derived pipeline
/// configuration is invalid, or the HTTP client cannot be created.
pub async fn init(config: &DnswatchConfig) -> Result<(ModuleHandle, mpsc::Receiver<CaptureExit>)> {
    tracing::info!("initializing query pipeline");

    let scope = ScopeLoader::from_config(&config.scope)
        .await
        .context("failed to load monitoring scope")?;
    tracing::info!(groups = scope.len(), "monitoring scope loaded");

    let client = HttpScoringClient::from_config(&config.api)
        .map_err(|e| anyhow::anyhow!("failed to create scoring client: {}", e))?;
    if !client.has_key() {
        tracing::warn!("api.api_key is not set; batches will be kept in the failed-query store");
    }

    let pipeline_config = PipelineConfig::from_core(config);
    let (exit_tx, exit_rx) = mpsc::channel(4);

    let (pipeline, _) = QueryPipelineBuilder::new(Arc::new(client))
        .config(pipeline_config)
        .scope(scope)
        .capture_exit_sender(exit_tx)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build query pipeline: {}", e))?;

    let handle = ModuleHandle::new(MODULE_NAME, true, Box::new(pipeline));
    Ok((handle, exit_rx))
}
