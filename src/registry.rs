//! Interrogator Registry
//!
//! The closed set of check archetypes and the operations each one supports.
//!
//! The catalog names archetypes and operations as open strings; this module
//! closes them. [`InterrogatorRegistry::resolve`] either maps an
//! [`Interrogation`] onto a typed [`CheckHandle`] or fails with the specific
//! reason — unknown archetype, unknown operation, or a parameter that does
//! not satisfy the operation's schema. Unknown archetype/operation pairs are
//! rejected even when the parameters are well-formed; that property is what
//! lets the coverage validator prove completeness against the catalog.
//!
//! Registration is static: exactly seven archetypes, each with a fixed
//! operation table, loaded once at process lifetime.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Interrogation, ParamMap, ParamValue};

/// One of the seven check families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Identity and credential policy (password rules, MFA, key rotation).
    IdentityPolicy,
    /// Resources exposed to the public internet.
    PublicExposure,
    /// Network perimeter rules (security groups, ACLs).
    NetworkBoundary,
    /// Encryption at rest or in transit.
    Encryption,
    /// Audit trail and log configuration.
    AuditLogging,
    /// Service-specific configuration settings.
    ServiceConfig,
    /// Monitoring and alerting configuration.
    Monitoring,
}

impl Archetype {
    pub const ALL: [Archetype; 7] = [
        Self::IdentityPolicy,
        Self::PublicExposure,
        Self::NetworkBoundary,
        Self::Encryption,
        Self::AuditLogging,
        Self::ServiceConfig,
        Self::Monitoring,
    ];

    /// Parse a catalog archetype string.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "identity_policy" => Some(Self::IdentityPolicy),
            "public_exposure" => Some(Self::PublicExposure),
            "network_boundary" => Some(Self::NetworkBoundary),
            "encryption" => Some(Self::Encryption),
            "audit_logging" => Some(Self::AuditLogging),
            "service_config" => Some(Self::ServiceConfig),
            "monitoring" => Some(Self::Monitoring),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IdentityPolicy => "identity_policy",
            Self::PublicExposure => "public_exposure",
            Self::NetworkBoundary => "network_boundary",
            Self::Encryption => "encryption",
            Self::AuditLogging => "audit_logging",
            Self::ServiceConfig => "service_config",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity/credential policy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityOp {
    PasswordLength,
    PasswordReuse,
    MfaEnabled,
    AccessKeyRotation,
    RootAccountUsage,
}

/// Public-exposure operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureOp {
    BlockPublicAccess,
    PubliclyAccessible,
    PublicSharing,
}

/// Network-boundary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOp {
    IngressRules,
    EgressRules,
    DefaultDeny,
}

/// Encryption operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionOp {
    AtRest,
    InTransit,
    KeyRotation,
}

/// Audit-trail operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOp {
    TrailEnabled,
    LogFileValidation,
    LogRetention,
}

/// Service-specific configuration operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOp {
    SettingEquals,
    VersioningEnabled,
    InstanceMetadataV2,
}

/// Monitoring/alerting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringOp {
    AlarmExists,
    MetricFilterExists,
}

/// A fully-resolved check selection: archetype plus its operation, as a
/// tagged variant rather than string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    IdentityPolicy(IdentityOp),
    PublicExposure(ExposureOp),
    NetworkBoundary(NetworkOp),
    Encryption(EncryptionOp),
    AuditLogging(AuditOp),
    ServiceConfig(ServiceOp),
    Monitoring(MonitoringOp),
}

impl CheckKind {
    pub fn archetype(&self) -> Archetype {
        match self {
            Self::IdentityPolicy(_) => Archetype::IdentityPolicy,
            Self::PublicExposure(_) => Archetype::PublicExposure,
            Self::NetworkBoundary(_) => Archetype::NetworkBoundary,
            Self::Encryption(_) => Archetype::Encryption,
            Self::AuditLogging(_) => Archetype::AuditLogging,
            Self::ServiceConfig(_) => Archetype::ServiceConfig,
            Self::Monitoring(_) => Archetype::Monitoring,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::IdentityPolicy(op) => match op {
                IdentityOp::PasswordLength => "password_length",
                IdentityOp::PasswordReuse => "password_reuse",
                IdentityOp::MfaEnabled => "mfa_enabled",
                IdentityOp::AccessKeyRotation => "access_key_rotation",
                IdentityOp::RootAccountUsage => "root_account_usage",
            },
            Self::PublicExposure(op) => match op {
                ExposureOp::BlockPublicAccess => "block_public_access",
                ExposureOp::PubliclyAccessible => "publicly_accessible",
                ExposureOp::PublicSharing => "public_sharing",
            },
            Self::NetworkBoundary(op) => match op {
                NetworkOp::IngressRules => "ingress_rules",
                NetworkOp::EgressRules => "egress_rules",
                NetworkOp::DefaultDeny => "default_deny",
            },
            Self::Encryption(op) => match op {
                EncryptionOp::AtRest => "at_rest",
                EncryptionOp::InTransit => "in_transit",
                EncryptionOp::KeyRotation => "key_rotation",
            },
            Self::AuditLogging(op) => match op {
                AuditOp::TrailEnabled => "trail_enabled",
                AuditOp::LogFileValidation => "log_file_validation",
                AuditOp::LogRetention => "log_retention",
            },
            Self::ServiceConfig(op) => match op {
                ServiceOp::SettingEquals => "setting_equals",
                ServiceOp::VersioningEnabled => "versioning_enabled",
                ServiceOp::InstanceMetadataV2 => "instance_metadata_v2",
            },
            Self::Monitoring(op) => match op {
                MonitoringOp::AlarmExists => "alarm_exists",
                MonitoringOp::MetricFilterExists => "metric_filter_exists",
            },
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.archetype(), self.operation())
    }
}

fn parse_operation(archetype: Archetype, name: &str) -> Option<CheckKind> {
    let kind = match (archetype, name) {
        (Archetype::IdentityPolicy, "password_length") => {
            CheckKind::IdentityPolicy(IdentityOp::PasswordLength)
        }
        (Archetype::IdentityPolicy, "password_reuse") => {
            CheckKind::IdentityPolicy(IdentityOp::PasswordReuse)
        }
        (Archetype::IdentityPolicy, "mfa_enabled") => {
            CheckKind::IdentityPolicy(IdentityOp::MfaEnabled)
        }
        (Archetype::IdentityPolicy, "access_key_rotation") => {
            CheckKind::IdentityPolicy(IdentityOp::AccessKeyRotation)
        }
        (Archetype::IdentityPolicy, "root_account_usage") => {
            CheckKind::IdentityPolicy(IdentityOp::RootAccountUsage)
        }
        (Archetype::PublicExposure, "block_public_access") => {
            CheckKind::PublicExposure(ExposureOp::BlockPublicAccess)
        }
        (Archetype::PublicExposure, "publicly_accessible") => {
            CheckKind::PublicExposure(ExposureOp::PubliclyAccessible)
        }
        (Archetype::PublicExposure, "public_sharing") => {
            CheckKind::PublicExposure(ExposureOp::PublicSharing)
        }
        (Archetype::NetworkBoundary, "ingress_rules") => {
            CheckKind::NetworkBoundary(NetworkOp::IngressRules)
        }
        (Archetype::NetworkBoundary, "egress_rules") => {
            CheckKind::NetworkBoundary(NetworkOp::EgressRules)
        }
        (Archetype::NetworkBoundary, "default_deny") => {
            CheckKind::NetworkBoundary(NetworkOp::DefaultDeny)
        }
        (Archetype::Encryption, "at_rest") => CheckKind::Encryption(EncryptionOp::AtRest),
        (Archetype::Encryption, "in_transit") => CheckKind::Encryption(EncryptionOp::InTransit),
        (Archetype::Encryption, "key_rotation") => {
            CheckKind::Encryption(EncryptionOp::KeyRotation)
        }
        (Archetype::AuditLogging, "trail_enabled") => {
            CheckKind::AuditLogging(AuditOp::TrailEnabled)
        }
        (Archetype::AuditLogging, "log_file_validation") => {
            CheckKind::AuditLogging(AuditOp::LogFileValidation)
        }
        (Archetype::AuditLogging, "log_retention") => {
            CheckKind::AuditLogging(AuditOp::LogRetention)
        }
        (Archetype::ServiceConfig, "setting_equals") => {
            CheckKind::ServiceConfig(ServiceOp::SettingEquals)
        }
        (Archetype::ServiceConfig, "versioning_enabled") => {
            CheckKind::ServiceConfig(ServiceOp::VersioningEnabled)
        }
        (Archetype::ServiceConfig, "instance_metadata_v2") => {
            CheckKind::ServiceConfig(ServiceOp::InstanceMetadataV2)
        }
        (Archetype::Monitoring, "alarm_exists") => {
            CheckKind::Monitoring(MonitoringOp::AlarmExists)
        }
        (Archetype::Monitoring, "metric_filter_exists") => {
            CheckKind::Monitoring(MonitoringOp::MetricFilterExists)
        }
        _ => return None,
    };
    Some(kind)
}

/// All registered (archetype, operation) pairs, in deterministic order.
pub const ALL_CHECK_KINDS: &[CheckKind] = &[
    CheckKind::IdentityPolicy(IdentityOp::PasswordLength),
    CheckKind::IdentityPolicy(IdentityOp::PasswordReuse),
    CheckKind::IdentityPolicy(IdentityOp::MfaEnabled),
    CheckKind::IdentityPolicy(IdentityOp::AccessKeyRotation),
    CheckKind::IdentityPolicy(IdentityOp::RootAccountUsage),
    CheckKind::PublicExposure(ExposureOp::BlockPublicAccess),
    CheckKind::PublicExposure(ExposureOp::PubliclyAccessible),
    CheckKind::PublicExposure(ExposureOp::PublicSharing),
    CheckKind::NetworkBoundary(NetworkOp::IngressRules),
    CheckKind::NetworkBoundary(NetworkOp::EgressRules),
    CheckKind::NetworkBoundary(NetworkOp::DefaultDeny),
    CheckKind::Encryption(EncryptionOp::AtRest),
    CheckKind::Encryption(EncryptionOp::InTransit),
    CheckKind::Encryption(EncryptionOp::KeyRotation),
    CheckKind::AuditLogging(AuditOp::TrailEnabled),
    CheckKind::AuditLogging(AuditOp::LogFileValidation),
    CheckKind::AuditLogging(AuditOp::LogRetention),
    CheckKind::ServiceConfig(ServiceOp::SettingEquals),
    CheckKind::ServiceConfig(ServiceOp::VersioningEnabled),
    CheckKind::ServiceConfig(ServiceOp::InstanceMetadataV2),
    CheckKind::Monitoring(MonitoringOp::AlarmExists),
    CheckKind::Monitoring(MonitoringOp::MetricFilterExists),
];

/// Parameter value type accepted by a schema slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Str,
    IntList,
    StrList,
}

impl ParamType {
    fn matches(&self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (Self::Bool, ParamValue::Bool(_))
                | (Self::Int, ParamValue::Int(_))
                | (Self::Str, ParamValue::Str(_))
                | (Self::IntList, ParamValue::IntList(_))
                | (Self::StrList, ParamValue::StrList(_))
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Str => "string",
            Self::IntList => "int list",
            Self::StrList => "string list",
        }
    }
}

/// Schema for one named parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub ty: ParamType,
    /// For string parameters, the closed set of accepted values.
    pub allowed: Option<&'static [&'static str]>,
}

const fn param(key: &'static str, ty: ParamType) -> ParamSpec {
    ParamSpec {
        key,
        ty,
        allowed: None,
    }
}

const fn param_enum(key: &'static str, allowed: &'static [&'static str]) -> ParamSpec {
    ParamSpec {
        key,
        ty: ParamType::Str,
        allowed: Some(allowed),
    }
}

/// Schema for one operation: required and optional parameters.
#[derive(Debug, Clone, Copy)]
pub struct OperationSchema {
    pub required: &'static [ParamSpec],
    pub optional: &'static [ParamSpec],
}

const NO_PARAMS: OperationSchema = OperationSchema {
    required: &[],
    optional: &[],
};

const EXPOSABLE_RESOURCES: &[&str] = &["bucket", "snapshot", "db_instance"];
const ACCESSIBLE_RESOURCES: &[&str] = &["db_instance", "snapshot"];
const SHAREABLE_RESOURCES: &[&str] = &["ami", "snapshot"];
const BOUNDARY_RESOURCES: &[&str] = &["security_group", "network_acl"];
const ENCRYPTABLE_RESOURCES: &[&str] = &["bucket", "volume", "db_instance", "log_group"];
const TRANSIT_RESOURCES: &[&str] = &["bucket", "db_instance", "load_balancer"];
const VERSIONABLE_RESOURCES: &[&str] = &["bucket"];
const MFA_SCOPES: &[&str] = &["root", "all_users"];

// Parameter tables live in module-level consts so the schema slices are
// 'static.
const MIN_LENGTH_PARAM: &[ParamSpec] = &[param("min_length", ParamType::Int)];
const REMEMBERED_PARAM: &[ParamSpec] = &[param("remembered", ParamType::Int)];
const MFA_SCOPE_PARAM: &[ParamSpec] = &[param_enum("scope", MFA_SCOPES)];
const MAX_AGE_PARAM: &[ParamSpec] = &[param("max_age_days", ParamType::Int)];
const EXPOSABLE_TARGET: &[ParamSpec] = &[param_enum("resource_type", EXPOSABLE_RESOURCES)];
const ACCESSIBLE_TARGET: &[ParamSpec] = &[param_enum("resource_type", ACCESSIBLE_RESOURCES)];
const SHAREABLE_TARGET: &[ParamSpec] = &[param_enum("resource_type", SHAREABLE_RESOURCES)];
const BOUNDARY_TARGET: &[ParamSpec] = &[param_enum("resource_type", BOUNDARY_RESOURCES)];
const ENCRYPTABLE_TARGET: &[ParamSpec] = &[param_enum("resource_type", ENCRYPTABLE_RESOURCES)];
const TRANSIT_TARGET: &[ParamSpec] = &[param_enum("resource_type", TRANSIT_RESOURCES)];
const VERSIONABLE_TARGET: &[ParamSpec] = &[param_enum("resource_type", VERSIONABLE_RESOURCES)];
const PORTS_PARAM: &[ParamSpec] = &[param("ports", ParamType::IntList)];
const CIDR_PARAM: &[ParamSpec] = &[param("cidr", ParamType::Str)];
const KMS_ONLY_PARAM: &[ParamSpec] = &[param("kms_only", ParamType::Bool)];
const MULTI_REGION_PARAM: &[ParamSpec] = &[param("multi_region", ParamType::Bool)];
const MIN_DAYS_PARAM: &[ParamSpec] = &[param("min_days", ParamType::Int)];
const SETTING_PARAMS: &[ParamSpec] = &[
    param("setting", ParamType::Str),
    param("expected", ParamType::Str),
];
const METRIC_PARAM: &[ParamSpec] = &[param("metric", ParamType::Str)];
const PATTERN_PARAM: &[ParamSpec] = &[param("pattern", ParamType::Str)];

/// Parameter schema for a resolved operation.
pub fn schema_for(kind: CheckKind) -> OperationSchema {
    match kind {
        CheckKind::IdentityPolicy(IdentityOp::PasswordLength) => OperationSchema {
            required: MIN_LENGTH_PARAM,
            optional: &[],
        },
        CheckKind::IdentityPolicy(IdentityOp::PasswordReuse) => OperationSchema {
            required: REMEMBERED_PARAM,
            optional: &[],
        },
        CheckKind::IdentityPolicy(IdentityOp::MfaEnabled) => OperationSchema {
            required: &[],
            optional: MFA_SCOPE_PARAM,
        },
        CheckKind::IdentityPolicy(IdentityOp::AccessKeyRotation) => OperationSchema {
            required: MAX_AGE_PARAM,
            optional: &[],
        },
        CheckKind::IdentityPolicy(IdentityOp::RootAccountUsage) => NO_PARAMS,
        CheckKind::PublicExposure(ExposureOp::BlockPublicAccess) => OperationSchema {
            required: EXPOSABLE_TARGET,
            optional: &[],
        },
        CheckKind::PublicExposure(ExposureOp::PubliclyAccessible) => OperationSchema {
            required: ACCESSIBLE_TARGET,
            optional: &[],
        },
        CheckKind::PublicExposure(ExposureOp::PublicSharing) => OperationSchema {
            required: SHAREABLE_TARGET,
            optional: &[],
        },
        CheckKind::NetworkBoundary(NetworkOp::IngressRules) => OperationSchema {
            required: PORTS_PARAM,
            optional: CIDR_PARAM,
        },
        CheckKind::NetworkBoundary(NetworkOp::EgressRules) => OperationSchema {
            required: &[],
            optional: PORTS_PARAM,
        },
        CheckKind::NetworkBoundary(NetworkOp::DefaultDeny) => OperationSchema {
            required: BOUNDARY_TARGET,
            optional: &[],
        },
        CheckKind::Encryption(EncryptionOp::AtRest) => OperationSchema {
            required: ENCRYPTABLE_TARGET,
            optional: KMS_ONLY_PARAM,
        },
        CheckKind::Encryption(EncryptionOp::InTransit) => OperationSchema {
            required: TRANSIT_TARGET,
            optional: &[],
        },
        CheckKind::Encryption(EncryptionOp::KeyRotation) => OperationSchema {
            required: MAX_AGE_PARAM,
            optional: &[],
        },
        CheckKind::AuditLogging(AuditOp::TrailEnabled) => OperationSchema {
            required: &[],
            optional: MULTI_REGION_PARAM,
        },
        CheckKind::AuditLogging(AuditOp::LogFileValidation) => NO_PARAMS,
        CheckKind::AuditLogging(AuditOp::LogRetention) => OperationSchema {
            required: MIN_DAYS_PARAM,
            optional: &[],
        },
        CheckKind::ServiceConfig(ServiceOp::SettingEquals) => OperationSchema {
            required: SETTING_PARAMS,
            optional: &[],
        },
        CheckKind::ServiceConfig(ServiceOp::VersioningEnabled) => OperationSchema {
            required: VERSIONABLE_TARGET,
            optional: &[],
        },
        CheckKind::ServiceConfig(ServiceOp::InstanceMetadataV2) => NO_PARAMS,
        CheckKind::Monitoring(MonitoringOp::AlarmExists) => OperationSchema {
            required: METRIC_PARAM,
            optional: &[],
        },
        CheckKind::Monitoring(MonitoringOp::MetricFilterExists) => OperationSchema {
            required: PATTERN_PARAM,
            optional: &[],
        },
    }
}

/// A single parameter schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamProblem {
    pub key: String,
    pub detail: String,
}

impl fmt::Display for ParamProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter '{}': {}", self.key, self.detail)
    }
}

/// Why an interrogation could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolveError {
    #[error("unknown archetype '{name}'")]
    UnknownArchetype { name: String },

    #[error("unknown operation '{name}' for archetype '{archetype}'")]
    UnknownOperation { archetype: Archetype, name: String },

    #[error("invalid parameters: {}", format_problems(.problems))]
    InvalidParameters { problems: Vec<ParamProblem> },
}

fn format_problems(problems: &[ParamProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A resolved, validated check invocation. The only path into execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckHandle {
    pub kind: CheckKind,
    pub params: ParamMap,
}

impl CheckHandle {
    pub fn int(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(ParamValue::as_int)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(ParamValue::as_bool)
    }

    pub fn int_list(&self, key: &str) -> Option<&[i64]> {
        self.params.get(key).and_then(ParamValue::as_int_list)
    }
}

/// The static registry of check archetypes.
///
/// Stateless; all signatures are compile-time tables. Constructed once and
/// shared by reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterrogatorRegistry;

impl InterrogatorRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Resolve an interrogation to a validated check handle.
    ///
    /// Every parameter problem is collected before failing, so a coverage
    /// report can name them all at once.
    pub fn resolve(&self, interrogation: &Interrogation) -> Result<CheckHandle, ResolveError> {
        let archetype = Archetype::parse(&interrogation.archetype).ok_or_else(|| {
            ResolveError::UnknownArchetype {
                name: interrogation.archetype.clone(),
            }
        })?;

        let kind = parse_operation(archetype, &interrogation.operation).ok_or_else(|| {
            ResolveError::UnknownOperation {
                archetype,
                name: interrogation.operation.clone(),
            }
        })?;

        let schema = schema_for(kind);
        let mut problems = Vec::new();

        for spec in schema.required {
            match interrogation.parameters.get(spec.key) {
                None => problems.push(ParamProblem {
                    key: spec.key.to_string(),
                    detail: format!("required, expected {}", spec.ty.name()),
                }),
                Some(value) => check_value(spec, value, &mut problems),
            }
        }
        for spec in schema.optional {
            if let Some(value) = interrogation.parameters.get(spec.key) {
                check_value(spec, value, &mut problems);
            }
        }

        let known = |key: &str| {
            schema.required.iter().chain(schema.optional).any(|s| s.key == key)
        };
        for key in interrogation.parameters.keys() {
            if !known(key) {
                problems.push(ParamProblem {
                    key: key.clone(),
                    detail: "not accepted by this operation".to_string(),
                });
            }
        }

        if !problems.is_empty() {
            return Err(ResolveError::InvalidParameters { problems });
        }

        Ok(CheckHandle {
            kind,
            params: interrogation.parameters.clone(),
        })
    }

    /// All registered (archetype, operation) pairs.
    pub fn registered_operations(&self) -> &'static [CheckKind] {
        ALL_CHECK_KINDS
    }
}

fn check_value(spec: &ParamSpec, value: &ParamValue, problems: &mut Vec<ParamProblem>) {
    if !spec.ty.matches(value) {
        problems.push(ParamProblem {
            key: spec.key.to_string(),
            detail: format!("expected {}, got {}", spec.ty.name(), value.type_name()),
        });
        return;
    }
    if let (Some(allowed), Some(s)) = (spec.allowed, value.as_str()) {
        if !allowed.contains(&s) {
            problems.push(ParamProblem {
                key: spec.key.to_string(),
                detail: format!("'{}' not in allowed set [{}]", s, allowed.join(", ")),
            });
        }
    }
}
