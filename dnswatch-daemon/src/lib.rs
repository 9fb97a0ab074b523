//! dnswatch daemon library.
//!
//! Exposes the daemon's modules for integration testing.
//! In production `dnswatch-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod client;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;

pub use client::HttpScoringClient;
pub use orchestrator::{Orchestrator, ShutdownCause};
