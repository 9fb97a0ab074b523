//! Health aggregation tests.

use dnswatch_core::pipeline::HealthStatus;
use dnswatch_daemon::health::{DaemonHealth, ModuleHealth, aggregate_status};

fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
    ModuleHealth {
        name: name.to_owned(),
        enabled,
        status,
    }
}

#[test]
fn all_healthy_is_healthy() {
    let modules = vec![
        module("query-pipeline", true, HealthStatus::Healthy),
        module("other", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}

#[test]
fn no_modules_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn degraded_reason_names_the_module() {
    let modules = vec![
        module("query-pipeline", true, HealthStatus::Degraded("1 failed batch pending".to_owned())),
        module("other", true, HealthStatus::Healthy),
    ];

    match aggregate_status(&modules) {
        HealthStatus::Degraded(reason) => {
            assert_eq!(reason, "query-pipeline: 1 failed batch pending");
        }
        other => panic!("expected Degraded, got {other:?}"),
    }
}

#[test]
fn unhealthy_wins_and_keeps_every_reason() {
    let modules = vec![
        module("a", true, HealthStatus::Degraded("buffer 95% full".to_owned())),
        module("b", true, HealthStatus::Unhealthy("not running".to_owned())),
    ];

    match aggregate_status(&modules) {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.starts_with("b: not running"), "got: {reason}");
            assert!(reason.contains("a: buffer 95% full"), "got: {reason}");
        }
        other => panic!("expected Unhealthy, got {other:?}"),
    }
}

#[test]
fn disabled_modules_are_ignored() {
    let modules = vec![
        module("query-pipeline", true, HealthStatus::Healthy),
        module("off", false, HealthStatus::Unhealthy("not running".to_owned())),
    ];
    assert!(aggregate_status(&modules).is_healthy());
}

#[test]
fn report_serializes_to_json() {
    let report = DaemonHealth {
        status: HealthStatus::Healthy,
        uptime_secs: 42,
        modules: vec![module("query-pipeline", true, HealthStatus::Healthy)],
    };

    let json = serde_json::to_value(&report).expect("should serialize");
    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["modules"][0]["name"], "query-pipeline");
}
