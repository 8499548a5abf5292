//! Coverage Validation
//!
//! Static analysis of the catalog against the interrogator registry: every
//! control must resolve to a registered check with schema-valid parameters.
//! Validation always runs to completion so a single pass surfaces every gap,
//! and it also reports registered operations no control references — a signal
//! for dead or over-engineered checks.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::Catalog;
use crate::registry::{InterrogatorRegistry, ResolveError};

/// Why a control could not be mapped to an implemented check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapReason {
    UnknownArchetype { archetype: String },
    UnknownOperation { archetype: String, operation: String },
    InvalidParameters { problems: Vec<String> },
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArchetype { archetype } => {
                write!(f, "unknown archetype '{}'", archetype)
            }
            Self::UnknownOperation {
                archetype,
                operation,
            } => write!(
                f,
                "unknown operation '{}' for archetype '{}'",
                operation, archetype
            ),
            Self::InvalidParameters { problems } => {
                write!(f, "invalid parameters: {}", problems.join("; "))
            }
        }
    }
}

impl From<&ResolveError> for GapReason {
    fn from(err: &ResolveError) -> Self {
        match err {
            ResolveError::UnknownArchetype { name } => Self::UnknownArchetype {
                archetype: name.clone(),
            },
            ResolveError::UnknownOperation { archetype, name } => Self::UnknownOperation {
                archetype: archetype.to_string(),
                operation: name.clone(),
            },
            ResolveError::InvalidParameters { problems } => Self::InvalidParameters {
                problems: problems.iter().map(|p| p.to_string()).collect(),
            },
        }
    }
}

/// One control that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub control_id: String,
    pub service: String,
    pub reason: GapReason,
}

impl CoverageGap {
    /// Actionable remediation hint derived from the specific gap reason.
    pub fn remediation(&self) -> String {
        match &self.reason {
            GapReason::UnknownArchetype { archetype } => format!(
                "control '{}' names archetype '{}'; map it to one of the registered \
                 archetypes or retire the control",
                self.control_id, archetype
            ),
            GapReason::UnknownOperation {
                archetype,
                operation,
            } => format!(
                "control '{}' needs operation '{}' under '{}'; add the operation to the \
                 registry or remap the control to an existing one",
                self.control_id, operation, archetype
            ),
            GapReason::InvalidParameters { .. } => format!(
                "control '{}' has parameters that fail the operation schema; fix the \
                 catalog entry to match the declared parameter types",
                self.control_id
            ),
        }
    }
}

/// A registered operation no control references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedInterrogator {
    pub archetype: String,
    pub operation: String,
}

/// Result of validating a catalog against the registry.
///
/// Produced fresh on every catalog load; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    pub gaps: Vec<CoverageGap>,
    pub unused: Vec<UnusedInterrogator>,
    pub total_controls: usize,
    pub valid_controls: usize,
    /// Referencing-control count per "archetype.operation".
    pub usage: BTreeMap<String, usize>,
}

impl CoverageReport {
    /// True when every control resolved.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn coverage_percentage(&self) -> f64 {
        if self.total_controls == 0 {
            return 100.0;
        }
        self.valid_controls as f64 / self.total_controls as f64 * 100.0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Coverage Report")?;
        writeln!(f, "===============")?;
        writeln!(
            f,
            "Controls: {}/{} mapped ({:.1}%)",
            self.valid_controls,
            self.total_controls,
            self.coverage_percentage()
        )?;

        if !self.gaps.is_empty() {
            writeln!(f, "\nGaps:")?;
            for gap in &self.gaps {
                writeln!(f, "  ✗ {} [{}]: {}", gap.control_id, gap.service, gap.reason)?;
            }
        }

        if !self.unused.is_empty() {
            writeln!(f, "\nUnused operations:")?;
            for unused in &self.unused {
                writeln!(f, "  ⚠ {}.{}", unused.archetype, unused.operation)?;
            }
        }

        Ok(())
    }
}

/// Validate every control in the catalog against the registry.
///
/// Never fails fast: each control gets its own gap entry with the specific
/// reason, and the unused-operation list is computed from the full pass.
pub fn validate(catalog: &Catalog, registry: &InterrogatorRegistry) -> CoverageReport {
    let mut report = CoverageReport {
        total_controls: catalog.len(),
        ..CoverageReport::default()
    };

    for control in catalog.controls() {
        match registry.resolve(&control.interrogation) {
            Ok(handle) => {
                report.valid_controls += 1;
                *report.usage.entry(handle.kind.to_string()).or_insert(0) += 1;
            }
            Err(err) => {
                let gap = CoverageGap {
                    control_id: control.control_id.clone(),
                    service: control.service.clone(),
                    reason: GapReason::from(&err),
                };
                warn!(
                    control_id = %gap.control_id,
                    reason = %gap.reason,
                    "control excluded from evaluation"
                );
                report.gaps.push(gap);
            }
        }
    }

    for kind in registry.registered_operations() {
        if !report.usage.contains_key(&kind.to_string()) {
            report.unused.push(UnusedInterrogator {
                archetype: kind.archetype().to_string(),
                operation: kind.operation().to_string(),
            });
        }
    }

    report
}
