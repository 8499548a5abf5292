//! Control Catalog Model
//!
//! Typed representation of a control catalog: one [`ControlDefinition`] per
//! compliance requirement, each carrying the cross-standard mappings that
//! express the same requirement under different frameworks.
//!
//! A catalog document is a JSON mapping from service name to a list of
//! control records:
//!
//! ```json
//! {
//!   "s3": [
//!     {
//!       "control_id": "S3-001",
//!       "title": "Block public access at the account level",
//!       "description": "...",
//!       "severity": "HIGH",
//!       "interrogation": {
//!         "archetype": "public_exposure",
//!         "operation": "block_public_access",
//!         "parameters": { "resource_type": "bucket" }
//!       },
//!       "standards": {
//!         "cis_v3_0": { "external_control_id": "2.1.4", "severity": "HIGH" }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Multiple documents are merged by concatenation; `control_id` collisions
//! across documents are a load-time fatal error, reported in batch so a single
//! load surfaces every offending control.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Baseline severity assigned to a control.
///
/// Ordering is `Critical > High > Medium > Low`, which is what the severity
/// reconciler's max-reduction relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A normalized interrogation parameter value.
///
/// Lists are sorted and deduplicated by [`ParamValue::normalize`], so two
/// controls declaring the same port set in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Str(String),
    IntList(Vec<i64>),
    StrList(Vec<String>),
}

impl ParamValue {
    /// Sort and deduplicate list values in place.
    pub fn normalize(&mut self) {
        match self {
            Self::IntList(v) => {
                v.sort_unstable();
                v.dedup();
            }
            Self::StrList(v) => {
                v.sort();
                v.dedup();
            }
            _ => {}
        }
    }

    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::IntList(_) => "int list",
            Self::StrList(_) => "string list",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            Self::StrList(v) => Some(v),
            _ => None,
        }
    }
}

/// Map of named interrogation parameters, keyed deterministically.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// What to check: an archetype/operation pair plus named parameters.
///
/// Archetype and operation stay open strings at the catalog boundary. The
/// interrogator registry is the only component that closes them into typed
/// variants; an unknown name is a coverage gap, never a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrogation {
    pub archetype: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: ParamMap,
}

impl Interrogation {
    /// Normalize all parameter values for order-independent comparison.
    pub fn normalize(&mut self) {
        for value in self.parameters.values_mut() {
            value.normalize();
        }
    }

    /// Canonical text form of this interrogation, used as a grouping key by
    /// the identity resolver. Stable for a given archetype/operation and
    /// normalized parameter set.
    pub fn canonical_key(&self) -> String {
        let params = serde_json::to_string(&self.parameters).unwrap_or_default();
        format!("{}/{}?{}", self.archetype, self.operation, params)
    }
}

/// How one standard expresses a control: its own numbering and severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardMapping {
    /// Identifier under that standard (e.g., "2.1.4" for a CIS benchmark).
    pub external_control_id: String,

    /// Severity the standard assigns, possibly different from the baseline.
    pub severity: Severity,
}

/// One row in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDefinition {
    /// Stable opaque identifier, unique within the catalog.
    pub control_id: String,

    /// Human-readable title. Not used in control logic.
    pub title: String,

    /// Longer description. Not used in control logic.
    #[serde(default)]
    pub description: String,

    /// Baseline severity.
    pub severity: Severity,

    /// Service this control belongs to. Filled from the catalog document key
    /// at load time.
    #[serde(default)]
    pub service: String,

    /// What to check.
    pub interrogation: Interrogation,

    /// Every standard that also expresses this check. Must be non-empty.
    #[serde(default)]
    pub standards: BTreeMap<String, StandardMapping>,
}

/// A single problem found while loading a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogIssue {
    /// The same `control_id` appears more than once across merged documents.
    DuplicateControlId { control_id: String, services: Vec<String> },

    /// A control declares no standards mappings.
    MissingStandards { control_id: String },

    /// A control has an empty `control_id`.
    EmptyControlId { service: String },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateControlId {
                control_id,
                services,
            } => write!(
                f,
                "duplicate control_id '{}' (services: {})",
                control_id,
                services.join(", ")
            ),
            Self::MissingStandards { control_id } => {
                write!(f, "control '{}' declares no standards mappings", control_id)
            }
            Self::EmptyControlId { service } => {
                write!(f, "control with empty control_id in service '{}'", service)
            }
        }
    }
}

/// Errors that abort a catalog load.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A document failed JSON deserialization.
    #[error("failed to parse catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A document could not be read from disk.
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged catalog violates its invariants. Every issue is listed,
    /// not just the first one found.
    #[error("catalog rejected with {} issue(s): {}", .0.len(), format_issues(.0))]
    Invalid(Vec<CatalogIssue>),
}

fn format_issues(issues: &[CatalogIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The merged, validated control catalog.
///
/// Immutable after construction; the single source of truth for control
/// intent. Iteration order is deterministic (sorted by `control_id`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    controls: BTreeMap<String, ControlDefinition>,
}

/// One catalog document: service name to control list.
type CatalogDocument = BTreeMap<String, Vec<ControlDefinition>>;

impl Catalog {
    /// Parse and validate a single JSON catalog document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_documents(vec![serde_json::from_str::<CatalogDocument>(json)?])
    }

    /// Load and merge catalog documents from files.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CatalogError> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            documents.push(serde_json::from_str::<CatalogDocument>(&content)?);
        }
        Self::from_documents(documents)
    }

    /// Merge parsed documents into one catalog, reporting every invariant
    /// violation in batch.
    fn from_documents(documents: Vec<CatalogDocument>) -> Result<Self, CatalogError> {
        let mut controls: BTreeMap<String, ControlDefinition> = BTreeMap::new();
        let mut issues = Vec::new();

        for document in documents {
            for (service, service_controls) in document {
                for mut control in service_controls {
                    control.service = service.clone();
                    control.interrogation.normalize();

                    if control.control_id.is_empty() {
                        issues.push(CatalogIssue::EmptyControlId {
                            service: service.clone(),
                        });
                        continue;
                    }
                    if control.standards.is_empty() {
                        issues.push(CatalogIssue::MissingStandards {
                            control_id: control.control_id.clone(),
                        });
                    }

                    if let Some(existing) = controls.get(&control.control_id) {
                        issues.push(CatalogIssue::DuplicateControlId {
                            control_id: control.control_id.clone(),
                            services: vec![existing.service.clone(), service.clone()],
                        });
                        continue;
                    }
                    controls.insert(control.control_id.clone(), control);
                }
            }
        }

        if !issues.is_empty() {
            return Err(CatalogError::Invalid(issues));
        }

        info!(controls = controls.len(), "catalog loaded");
        Ok(Self { controls })
    }

    /// Look up a control by id.
    pub fn get(&self, control_id: &str) -> Option<&ControlDefinition> {
        self.controls.get(control_id)
    }

    /// Iterate all controls in `control_id` order.
    pub fn controls(&self) -> impl Iterator<Item = &ControlDefinition> {
        self.controls.values()
    }

    /// Controls expressed under a given standard.
    pub fn controls_for_standard<'a>(
        &'a self,
        standard: &'a str,
    ) -> impl Iterator<Item = &'a ControlDefinition> {
        self.controls
            .values()
            .filter(move |c| c.standards.contains_key(standard))
    }

    /// Services represented in the catalog, deduplicated.
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> =
            self.controls.values().map(|c| c.service.as_str()).collect();
        services.sort_unstable();
        services.dedup();
        services
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}
