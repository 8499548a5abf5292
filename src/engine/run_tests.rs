//! End-to-end scheduler tests against the scripted in-memory provider.

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::catalog::ParamValue;
use crate::provider::{ConfigSnapshot, ResourceType};
use crate::report::Evidence;
use crate::testing::{audit_event, StaticProvider};

fn no_delay() -> RetryPolicy {
    RetryPolicy::new(Duration::ZERO, Duration::ZERO)
}

/// Two standards citing the same bucket check under different ids and
/// severities.
fn bucket_catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "s3": [
                {
                    "control_id": "S3-PUB-X",
                    "title": "Block public access",
                    "severity": "MEDIUM",
                    "interrogation": {
                        "archetype": "public_exposure",
                        "operation": "block_public_access",
                        "parameters": { "resource_type": "bucket" }
                    },
                    "standards": {
                        "standard_x": { "external_control_id": "X-2.1", "severity": "MEDIUM" }
                    }
                },
                {
                    "control_id": "S3-PUB-Y",
                    "title": "Buckets must not be public",
                    "severity": "CRITICAL",
                    "interrogation": {
                        "archetype": "public_exposure",
                        "operation": "block_public_access",
                        "parameters": { "resource_type": "bucket" }
                    },
                    "standards": {
                        "standard_y": { "external_control_id": "Y-9", "severity": "CRITICAL" }
                    }
                }
            ]
        }"#,
    )
    .unwrap()
}

fn trail_catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "cloudtrail": [{
                "control_id": "CT-001",
                "title": "Trail enabled",
                "severity": "HIGH",
                "interrogation": {
                    "archetype": "audit_logging",
                    "operation": "trail_enabled"
                },
                "standards": {
                    "cis_v3_0": { "external_control_id": "3.1", "severity": "HIGH" }
                }
            }]
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_merged_controls_evaluate_once_at_reconciled_severity() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "prod-data")
            .with_snapshot(
                "prod-data",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(false)),
            ),
    );

    let engine = Engine::new(bucket_catalog(), provider.clone())
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    // Two catalog entries, one canonical control, one bucket.
    assert_eq!(report.summary.controls_evaluated, 1);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Failed);
    assert_eq!(provider.call_counts().get_current_state, 1);

    assert_eq!(report.violations.len(), 1);
    let violation = &report.violations[0];
    assert_eq!(violation.severity, Severity::Critical);
    assert_eq!(violation.standards.len(), 2);
    assert!(violation.standards.iter().any(|s| s.standard == "standard_x"));
    assert!(violation.standards.iter().any(|s| s.standard == "standard_y"));
}

#[tokio::test]
async fn test_coverage_gaps_excluded_from_evaluation() {
    let catalog = Catalog::from_json(
        r#"{
            "s3": [
                {
                    "control_id": "GOOD",
                    "title": "Block public access",
                    "severity": "HIGH",
                    "interrogation": {
                        "archetype": "public_exposure",
                        "operation": "block_public_access",
                        "parameters": { "resource_type": "bucket" }
                    },
                    "standards": {
                        "cis_v3_0": { "external_control_id": "2.1.4", "severity": "HIGH" }
                    }
                },
                {
                    "control_id": "LEGACY",
                    "title": "Unmapped legacy check",
                    "severity": "LOW",
                    "interrogation": {
                        "archetype": "LegacyPolicyInterrogator",
                        "operation": "whatever"
                    },
                    "standards": {
                        "vendor": { "external_control_id": "L-1", "severity": "LOW" }
                    }
                }
            ]
        }"#,
    )
    .unwrap();

    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot(
                "b1",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            ),
    );

    let engine = Engine::new(catalog, provider)
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.coverage.gaps.len(), 1);
    assert_eq!(report.coverage.gaps[0].control_id, "LEGACY");
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].canonical_control_id, "GOOD");
    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Passed);
}

#[tokio::test]
async fn test_permission_denied_records_skip() {
    let provider = Arc::new(StaticProvider::new().with_denied_type(ResourceType::Bucket));

    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Skipped);
    assert!(report.outcomes[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("permission denied"));
    assert!(report.violations.is_empty());
}

#[tokio::test]
async fn test_transient_faults_retried_to_success() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot(
                "b1",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            )
            .with_repeated_state_fault("b1", ProviderError::Throttled, 2),
    );

    let engine = Engine::new(bucket_catalog(), provider.clone())
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Passed);
    assert_eq!(provider.call_counts().get_current_state, 3);
}

#[tokio::test]
async fn test_retry_exhaustion_records_errored() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot("b1", ConfigSnapshot::new())
            .with_repeated_state_fault("b1", ProviderError::Timeout, 10),
    );

    let engine = Engine::new(bucket_catalog(), provider.clone())
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_retry_limit(3),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Errored);
    assert_eq!(provider.call_counts().get_current_state, 3);
    assert!(report.violations.is_empty());
}

#[tokio::test]
async fn test_historical_fault_keeps_failed_status() {
    // Current state already violates; losing the historical search must not
    // downgrade the unit below FAILED.
    let provider = Arc::new(
        StaticProvider::new()
            .with_account()
            .with_snapshot(
                "account",
                ConfigSnapshot::new().with_field("trail_enabled", ParamValue::Bool(false)),
            )
            .with_search_fault(ProviderError::PermissionDenied("cloudtrail:LookupEvents".into())),
    );

    let engine = Engine::new(trail_catalog(), provider)
        .with_config(RunConfig::default())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Failed);
    assert!(report.outcomes[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("historical search failed"));
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped, 0);
}

#[tokio::test]
async fn test_historical_fault_on_clean_unit_records_skip() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_account()
            .with_snapshot(
                "account",
                ConfigSnapshot::new().with_field("trail_enabled", ParamValue::Bool(true)),
            )
            .with_search_fault(ProviderError::PermissionDenied("cloudtrail:LookupEvents".into())),
    );

    let engine = Engine::new(trail_catalog(), provider)
        .with_config(RunConfig::default())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Skipped);
    assert!(report.violations.is_empty());
}

#[tokio::test]
async fn test_faulty_resource_does_not_affect_siblings() {
    // One bucket's state reads always fault; the other evaluates normally.
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "broken")
            .with_resource(ResourceType::Bucket, "healthy")
            .with_snapshot(
                "healthy",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            )
            .with_repeated_state_fault("broken", ProviderError::Throttled, 20),
    );

    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_retry_limit(3),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes.len(), 2);
    let by_resource = |id: &str| {
        report
            .outcomes
            .iter()
            .find(|o| o.resource.ends_with(id))
            .unwrap()
    };
    assert_eq!(by_resource("broken").status, WorkUnitStatus::Errored);
    assert_eq!(by_resource("healthy").status, WorkUnitStatus::Passed);
    assert!(report.violations.is_empty());
}

#[tokio::test]
async fn test_work_unit_budget_exceeded_records_errored() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot(
                "b1",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            )
            .with_state_delay(Duration::from_millis(200)),
    );

    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_work_unit_timeout(Duration::from_millis(20)),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Errored);
    assert!(report.outcomes[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("budget"));
}

#[tokio::test]
async fn test_historical_event_produces_violation() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_account()
            .with_snapshot(
                "account",
                ConfigSnapshot::new().with_field("trail_enabled", ParamValue::Bool(true)),
            )
            .with_event(audit_event("StopLogging", "mallory")),
    );

    let engine = Engine::new(trail_catalog(), provider)
        .with_config(RunConfig::default())
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    // Current state is compliant but the audit trail shows tampering.
    assert_eq!(report.outcomes[0].status, WorkUnitStatus::Failed);
    assert_eq!(report.violations.len(), 1);
    match &report.violations[0].evidence {
        Evidence::HistoricalEvent { action, actor, .. } => {
            assert_eq!(action, "StopLogging");
            assert_eq!(actor, "mallory");
        }
        other => panic!("expected historical evidence, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancellation_before_dispatch_stops_run() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot("b1", ConfigSnapshot::new()),
    );

    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());

    let (handle, signal) = cancellation();
    handle.cancel();
    let report = engine.run_with_cancellation(signal).await;

    assert!(report.outcomes.is_empty());
    assert_eq!(report.summary.controls_evaluated, 0);
    // Coverage analysis still ran.
    assert_eq!(report.coverage.total_controls, 2);
}

#[tokio::test]
async fn test_repeated_runs_agree() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_resource(ResourceType::Bucket, "b2")
            .with_snapshot(
                "b1",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            )
            .with_snapshot(
                "b2",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(false)),
            ),
    );

    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(RunConfig::default().without_historical())
        .with_retry_policy(no_delay());

    let first = engine.run().await;
    let second = engine.run().await;
    assert_eq!(first.outcomes, second.outcomes);
    assert_eq!(first.violations, second.violations);
}

#[tokio::test]
async fn test_control_id_filter_matches_any_member() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_resource(ResourceType::Bucket, "b1")
            .with_snapshot(
                "b1",
                ConfigSnapshot::new().with_field("block_public_access", ParamValue::Bool(true)),
            ),
    );

    // S3-PUB-Y merged into the canonical control represented by another id;
    // filtering on the member id still selects the group.
    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_filter(RunFilter::for_control("S3-PUB-Y")),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;
    assert_eq!(report.outcomes.len(), 1);

    let provider = Arc::new(StaticProvider::new());
    let engine = Engine::new(bucket_catalog(), provider)
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_filter(RunFilter::for_control("NO-SUCH-ID")),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_service_filter_limits_scope() {
    let provider = Arc::new(
        StaticProvider::new()
            .with_account()
            .with_snapshot(
                "account",
                ConfigSnapshot::new().with_field("trail_enabled", ParamValue::Bool(true)),
            ),
    );

    let engine = Engine::new(trail_catalog(), provider)
        .with_config(
            RunConfig::default()
                .without_historical()
                .with_filter(RunFilter::for_service("s3")),
        )
        .with_retry_policy(no_delay());
    let report = engine.run().await;

    // The only control lives under "cloudtrail", so an s3-scoped run
    // dispatches nothing.
    assert!(report.outcomes.is_empty());
    assert_eq!(report.summary.controls_evaluated, 0);
}
