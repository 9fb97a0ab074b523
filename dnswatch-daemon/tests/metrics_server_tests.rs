//! Metrics endpoint installation tests.
//!
//! The recorder is process-global, so only one test installs it
//! successfully; the rest fail before installation.

use serial_test::serial;

use dnswatch_core::config::MetricsConfig;
use dnswatch_daemon::metrics_server;

fn metrics_config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[tokio::test]
#[serial]
async fn installs_recorder_and_serves_scrape_endpoint() {
    let config = metrics_config("127.0.0.1", 19_153, "/metrics");
    metrics_server::install_metrics_recorder(&config).expect("recorder should install");

    metrics::counter!(dnswatch_core::metrics::QUERIES_ACCEPTED_TOTAL).increment(3);

    // The listener is spawned in the background
    let mut body = String::new();
    for _ in 0..50 {
        if let Ok(response) = reqwest::get("http://127.0.0.1:19153/metrics").await {
            body = response.text().await.unwrap_or_default();
            if body.contains("dnswatch_queries_accepted_total") {
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(
        body.contains("dnswatch_queries_accepted_total 3"),
        "scrape output: {body}"
    );

    // A second install in the same process fails
    let again = metrics_config("127.0.0.1", 19_154, "/metrics");
    assert!(metrics_server::install_metrics_recorder(&again).is_err());
}

#[test]
#[serial]
fn rejects_invalid_address() {
    let config = metrics_config("999.999.999.999", 9100, "/metrics");
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("invalid metrics listen address"));
}

#[test]
#[serial]
fn rejects_unsupported_endpoint() {
    let config = metrics_config("127.0.0.1", 19_155, "/custom");
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("/custom"));
}
