//! Provider Collaborator Interface
//!
//! The engine never talks to a cloud API directly. It consumes a
//! [`CloudProvider`] capability: inventory listing, current-state reads, and
//! historical audit-event search. Implementations own the wire protocol;
//! the core only sees typed handles, snapshots, and events.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ParamValue;

/// Kind of resource a check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// The account itself, for account-scoped checks (password policy,
    /// trail configuration, alarms).
    Account,
    Bucket,
    Snapshot,
    DbInstance,
    SecurityGroup,
    NetworkAcl,
    Volume,
    LogGroup,
    LoadBalancer,
    Ami,
    Key,
    Instance,
}

impl ResourceType {
    /// Parse a catalog `resource_type` parameter value.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "account" => Some(Self::Account),
            "bucket" => Some(Self::Bucket),
            "snapshot" => Some(Self::Snapshot),
            "db_instance" => Some(Self::DbInstance),
            "security_group" => Some(Self::SecurityGroup),
            "network_acl" => Some(Self::NetworkAcl),
            "volume" => Some(Self::Volume),
            "log_group" => Some(Self::LogGroup),
            "load_balancer" => Some(Self::LoadBalancer),
            "ami" => Some(Self::Ami),
            "key" => Some(Self::Key),
            "instance" => Some(Self::Instance),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Bucket => "bucket",
            Self::Snapshot => "snapshot",
            Self::DbInstance => "db_instance",
            Self::SecurityGroup => "security_group",
            Self::NetworkAcl => "network_acl",
            Self::Volume => "volume",
            Self::LogGroup => "log_group",
            Self::LoadBalancer => "load_balancer",
            Self::Ami => "ami",
            Self::Key => "key",
            Self::Instance => "instance",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque handle to one in-scope resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub resource_type: ResourceType,
    /// Provider-assigned identifier (ARN, name, or id).
    pub id: String,
}

impl ResourceHandle {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }

    /// The account-scoped pseudo-resource.
    pub fn account() -> Self {
        Self::new(ResourceType::Account, "account")
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// Point-in-time view of one resource's configuration, as a flat field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub fields: BTreeMap<String, ParamValue>,
    pub captured_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            captured_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.fields.get(key)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(ParamValue::as_bool)
    }

    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(ParamValue::as_int)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// One audit-trail event returned by historical search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// API action recorded (e.g., "AuthorizeSecurityGroupIngress").
    pub action: String,
    /// Who performed it: user, role, or service name.
    pub actor: String,
    /// Account the actor belongs to.
    pub account: String,
    /// Resource affected, if recorded.
    pub resource: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub source_ip: Option<String>,
}

/// What to look for in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPredicate {
    /// Actions that constitute a violation of the control.
    pub actions: Vec<String>,
    /// Resource kind the actions apply to.
    pub resource_type: ResourceType,
}

impl EventPredicate {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.actions.iter().any(|a| a == &event.action)
    }
}

/// Faults raised by a provider collaborator.
///
/// The split between dispatch errors and transient errors drives the
/// scheduler's SKIPPED/ERRORED distinction: permission and capability
/// problems are recorded as skips, transient faults are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource type '{0}' not supported by this provider")]
    UnsupportedResource(ResourceType),

    #[error("request throttled by provider")]
    Throttled,

    #[error("transient network fault: {0}")]
    Network(String),

    #[error("provider call timed out")]
    Timeout,
}

impl ProviderError {
    /// Whether the scheduler should retry this fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled | Self::Network(_) | Self::Timeout)
    }
}

/// Capability consumed by the evaluation scheduler.
///
/// Every method may block on network I/O; the scheduler bounds concurrency
/// and applies its own timeout and retry policy around these calls.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Enumerate in-scope resources of one kind.
    async fn list_resources(
        &self,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceHandle>, ProviderError>;

    /// Read the live configuration of one resource.
    async fn get_current_state(
        &self,
        resource: &ResourceHandle,
    ) -> Result<ConfigSnapshot, ProviderError>;

    /// Search the audit trail for matching events within the lookback window.
    async fn search_historical_events(
        &self,
        predicate: &EventPredicate,
        lookback: Duration,
    ) -> Result<Vec<AuditEvent>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_round_trip() {
        for name in ["bucket", "security_group", "db_instance", "account"] {
            let rt = ResourceType::parse(name).unwrap();
            assert_eq!(rt.name(), name);
        }
        assert_eq!(ResourceType::parse("lambda"), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Throttled.is_transient());
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(!ProviderError::PermissionDenied("s3:GetBucketPolicy".into()).is_transient());
        assert!(!ProviderError::UnsupportedResource(ResourceType::Ami).is_transient());
    }

    #[test]
    fn test_event_predicate_matches_action() {
        let predicate = EventPredicate {
            actions: vec!["DeletePublicAccessBlock".to_string()],
            resource_type: ResourceType::Bucket,
        };
        let event = AuditEvent {
            action: "DeletePublicAccessBlock".to_string(),
            actor: "alice".to_string(),
            account: "123456789012".to_string(),
            resource: Some("bucket-a".to_string()),
            occurred_at: Utc::now(),
            source_ip: None,
        };
        assert!(predicate.matches(&event));

        let other = AuditEvent {
            action: "PutBucketPolicy".to_string(),
            ..event
        };
        assert!(!predicate.matches(&other));
    }

    #[test]
    fn test_snapshot_field_accessors() {
        let snapshot = ConfigSnapshot::new()
            .with_field("encrypted_at_rest", ParamValue::Bool(true))
            .with_field("retention_days", ParamValue::Int(365));
        assert_eq!(snapshot.bool_field("encrypted_at_rest"), Some(true));
        assert_eq!(snapshot.int_field("retention_days"), Some(365));
        assert_eq!(snapshot.bool_field("missing"), None);
    }
}
