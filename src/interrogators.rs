//! Check Implementations
//!
//! The bounded imperative side of the interrogation contract: for every
//! registered operation, a pass/fail predicate over a [`ConfigSnapshot`] and,
//! where the control has a historical dimension, the [`EventPredicate`] used
//! to search the audit trail.
//!
//! These functions are only reachable through a resolved [`CheckHandle`], so
//! every invocation has already passed parameter validation. A snapshot
//! missing the field a check needs counts as non-compliant: absence of an
//! affirmative setting is how providers report unconfigured protections.

use std::collections::BTreeMap;

use crate::catalog::ParamValue;
use crate::provider::{ConfigSnapshot, EventPredicate, ResourceType};
use crate::registry::{
    AuditOp, CheckHandle, CheckKind, EncryptionOp, ExposureOp, IdentityOp, MonitoringOp,
    NetworkOp, ServiceOp,
};

/// Outcome of a current-state check against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateFinding {
    Compliant,
    /// Non-compliant, with the snapshot fields that prove it.
    Violation {
        evidence: BTreeMap<String, ParamValue>,
    },
}

impl StateFinding {
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }
}

fn violation(evidence: BTreeMap<String, ParamValue>) -> StateFinding {
    StateFinding::Violation { evidence }
}

/// Evidence map for a single snapshot field, or a marker when it is absent.
fn field_evidence(snapshot: &ConfigSnapshot, key: &str) -> BTreeMap<String, ParamValue> {
    let mut evidence = BTreeMap::new();
    match snapshot.get(key) {
        Some(value) => {
            evidence.insert(key.to_string(), value.clone());
        }
        None => {
            evidence.insert(
                key.to_string(),
                ParamValue::Str("<not configured>".to_string()),
            );
        }
    }
    evidence
}

/// Check that a boolean snapshot field holds the expected value; a missing
/// field is treated as non-compliant.
fn require_bool(snapshot: &ConfigSnapshot, key: &str, expected: bool) -> StateFinding {
    match snapshot.bool_field(key) {
        Some(actual) if actual == expected => StateFinding::Compliant,
        _ => violation(field_evidence(snapshot, key)),
    }
}

/// Check that an integer snapshot field is at least `min`.
fn require_min(snapshot: &ConfigSnapshot, key: &str, min: i64) -> StateFinding {
    match snapshot.int_field(key) {
        Some(actual) if actual >= min => StateFinding::Compliant,
        _ => violation(field_evidence(snapshot, key)),
    }
}

/// Check that an integer snapshot field is at most `max`.
fn require_max(snapshot: &ConfigSnapshot, key: &str, max: i64) -> StateFinding {
    match snapshot.int_field(key) {
        Some(actual) if actual <= max => StateFinding::Compliant,
        _ => violation(field_evidence(snapshot, key)),
    }
}

/// Evaluate the current-state predicate for a resolved check.
pub fn evaluate_state(handle: &CheckHandle, snapshot: &ConfigSnapshot) -> StateFinding {
    match handle.kind {
        CheckKind::IdentityPolicy(op) => match op {
            IdentityOp::PasswordLength => {
                let min = handle.int("min_length").unwrap_or(0);
                require_min(snapshot, "min_password_length", min)
            }
            IdentityOp::PasswordReuse => {
                let remembered = handle.int("remembered").unwrap_or(0);
                require_min(snapshot, "password_reuse_prevention", remembered)
            }
            IdentityOp::MfaEnabled => require_bool(snapshot, "mfa_enabled", true),
            IdentityOp::AccessKeyRotation => {
                let max_age = handle.int("max_age_days").unwrap_or(i64::MAX);
                require_max(snapshot, "oldest_access_key_age_days", max_age)
            }
            IdentityOp::RootAccountUsage => require_bool(snapshot, "root_used_recently", false),
        },
        CheckKind::PublicExposure(op) => match op {
            ExposureOp::BlockPublicAccess => require_bool(snapshot, "block_public_access", true),
            ExposureOp::PubliclyAccessible => {
                require_bool(snapshot, "publicly_accessible", false)
            }
            ExposureOp::PublicSharing => require_bool(snapshot, "shared_publicly", false),
        },
        CheckKind::NetworkBoundary(op) => match op {
            NetworkOp::IngressRules => {
                let forbidden = handle.int_list("ports").unwrap_or(&[]);
                check_port_overlap(snapshot, "open_ports", forbidden)
            }
            NetworkOp::EgressRules => match handle.int_list("ports") {
                Some(forbidden) => check_port_overlap(snapshot, "open_egress_ports", forbidden),
                None => require_bool(snapshot, "unrestricted_egress", false),
            },
            NetworkOp::DefaultDeny => require_bool(snapshot, "default_denies_all", true),
        },
        CheckKind::Encryption(op) => match op {
            EncryptionOp::AtRest => {
                let finding = require_bool(snapshot, "encrypted_at_rest", true);
                if finding.is_violation() || handle.bool("kms_only") != Some(true) {
                    return finding;
                }
                require_bool(snapshot, "kms_managed", true)
            }
            EncryptionOp::InTransit => require_bool(snapshot, "tls_required", true),
            EncryptionOp::KeyRotation => {
                let max_age = handle.int("max_age_days").unwrap_or(i64::MAX);
                require_max(snapshot, "key_age_days", max_age)
            }
        },
        CheckKind::AuditLogging(op) => match op {
            AuditOp::TrailEnabled => {
                let finding = require_bool(snapshot, "trail_enabled", true);
                if finding.is_violation() || handle.bool("multi_region") != Some(true) {
                    return finding;
                }
                require_bool(snapshot, "multi_region_trail", true)
            }
            AuditOp::LogFileValidation => require_bool(snapshot, "log_file_validation", true),
            AuditOp::LogRetention => {
                let min_days = handle.int("min_days").unwrap_or(0);
                require_min(snapshot, "retention_days", min_days)
            }
        },
        CheckKind::ServiceConfig(op) => match op {
            ServiceOp::SettingEquals => {
                let setting = handle.str("setting").unwrap_or_default();
                let expected = handle.str("expected").unwrap_or_default();
                match snapshot.get(setting).and_then(ParamValue::as_str) {
                    Some(actual) if actual == expected => StateFinding::Compliant,
                    _ => violation(field_evidence(snapshot, setting)),
                }
            }
            ServiceOp::VersioningEnabled => require_bool(snapshot, "versioning_enabled", true),
            ServiceOp::InstanceMetadataV2 => require_bool(snapshot, "imdsv2_required", true),
        },
        CheckKind::Monitoring(op) => match op {
            MonitoringOp::AlarmExists => {
                let metric = handle.str("metric").unwrap_or_default();
                check_list_contains(snapshot, "alarms", metric)
            }
            MonitoringOp::MetricFilterExists => {
                let pattern = handle.str("pattern").unwrap_or_default();
                check_list_contains(snapshot, "metric_filters", pattern)
            }
        },
    }
}

fn check_port_overlap(snapshot: &ConfigSnapshot, key: &str, forbidden: &[i64]) -> StateFinding {
    let open = snapshot
        .get(key)
        .and_then(ParamValue::as_int_list)
        .unwrap_or(&[]);
    let exposed: Vec<i64> = open.iter().copied().filter(|p| forbidden.contains(p)).collect();
    if exposed.is_empty() {
        StateFinding::Compliant
    } else {
        let mut evidence = BTreeMap::new();
        evidence.insert(key.to_string(), ParamValue::IntList(exposed));
        StateFinding::Violation { evidence }
    }
}

fn check_list_contains(snapshot: &ConfigSnapshot, key: &str, needle: &str) -> StateFinding {
    let present = snapshot
        .get(key)
        .and_then(ParamValue::as_str_list)
        .map(|list| list.iter().any(|s| s == needle))
        .unwrap_or(false);
    if present {
        StateFinding::Compliant
    } else {
        violation(field_evidence(snapshot, key))
    }
}

/// The resource kind a check targets. Taken from the `resource_type`
/// parameter when the operation declares one, otherwise the archetype's
/// natural scope.
pub fn target_resource_type(handle: &CheckHandle) -> ResourceType {
    if let Some(rt) = handle.str("resource_type").and_then(ResourceType::parse) {
        return rt;
    }
    match handle.kind {
        CheckKind::NetworkBoundary(_) => ResourceType::SecurityGroup,
        CheckKind::Encryption(EncryptionOp::KeyRotation) => ResourceType::Key,
        CheckKind::ServiceConfig(ServiceOp::InstanceMetadataV2) => ResourceType::Instance,
        _ => ResourceType::Account,
    }
}

/// Audit-trail actions whose occurrence violates the control, if the check
/// has a historical dimension.
pub fn event_predicate(handle: &CheckHandle) -> Option<EventPredicate> {
    let actions: &[&str] = match handle.kind {
        CheckKind::IdentityPolicy(IdentityOp::PasswordLength)
        | CheckKind::IdentityPolicy(IdentityOp::PasswordReuse) => {
            &["UpdateAccountPasswordPolicy", "DeleteAccountPasswordPolicy"]
        }
        CheckKind::IdentityPolicy(IdentityOp::MfaEnabled) => {
            &["DeactivateMFADevice", "DeleteVirtualMFADevice"]
        }
        CheckKind::IdentityPolicy(IdentityOp::RootAccountUsage) => &["ConsoleLogin"],
        CheckKind::PublicExposure(ExposureOp::BlockPublicAccess) => {
            &["DeletePublicAccessBlock", "PutPublicAccessBlock"]
        }
        CheckKind::PublicExposure(ExposureOp::PubliclyAccessible) => &["ModifyDBInstance"],
        CheckKind::PublicExposure(ExposureOp::PublicSharing) => {
            &["ModifySnapshotAttribute", "ModifyImageAttribute"]
        }
        CheckKind::NetworkBoundary(NetworkOp::IngressRules) => {
            &["AuthorizeSecurityGroupIngress"]
        }
        CheckKind::NetworkBoundary(NetworkOp::EgressRules) => &["AuthorizeSecurityGroupEgress"],
        CheckKind::Encryption(EncryptionOp::AtRest) => &["DeleteBucketEncryption"],
        CheckKind::Encryption(EncryptionOp::KeyRotation) => &["DisableKeyRotation"],
        CheckKind::AuditLogging(AuditOp::TrailEnabled) => &["StopLogging", "DeleteTrail"],
        CheckKind::AuditLogging(AuditOp::LogFileValidation) => &["UpdateTrail"],
        CheckKind::AuditLogging(AuditOp::LogRetention) => &["DeleteRetentionPolicy"],
        CheckKind::Monitoring(MonitoringOp::AlarmExists) => &["DeleteAlarms"],
        CheckKind::Monitoring(MonitoringOp::MetricFilterExists) => &["DeleteMetricFilter"],
        // No meaningful audit-trail signal for these.
        CheckKind::IdentityPolicy(IdentityOp::AccessKeyRotation)
        | CheckKind::NetworkBoundary(NetworkOp::DefaultDeny)
        | CheckKind::Encryption(EncryptionOp::InTransit)
        | CheckKind::ServiceConfig(_) => return None,
    };

    Some(EventPredicate {
        actions: actions.iter().map(|s| s.to_string()).collect(),
        resource_type: target_resource_type(handle),
    })
}
