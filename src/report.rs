//! Evaluation Output
//!
//! [`Violation`] records, per-work-unit outcomes, and the [`RunReport`] the
//! scheduler hands to the reporting layer. Violations are immutable once
//! emitted and self-contained: each carries the canonical control id, the
//! effective severity, the resource, the evidence, and every standard the
//! violation satisfies, so downstream consumers never need to re-join
//! against the catalog.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ParamValue, Severity};
use crate::coverage::CoverageReport;

/// How a standard cites a violated control.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StandardCitation {
    pub standard: String,
    pub external_control_id: String,
}

/// What proves the violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Snapshot fields captured from live configuration.
    CurrentState {
        fields: BTreeMap<String, ParamValue>,
    },
    /// A historical audit-trail event.
    HistoricalEvent {
        action: String,
        actor: String,
        occurred_at: DateTime<Utc>,
        source_ip: Option<String>,
    },
}

/// A recorded failure of one canonical control against one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub canonical_control_id: String,
    pub severity: Severity,
    pub resource: String,
    pub evidence: Evidence,
    /// Every `(standard, external id)` pair this violation satisfies.
    pub standards: Vec<StandardCitation>,
}

/// Terminal state of one work unit (canonical control × resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkUnitStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl fmt::Display for WorkUnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Errored => write!(f, "ERRORED"),
        }
    }
}

/// Outcome of one work unit, with the reason for skips and errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOutcome {
    pub canonical_control_id: String,
    pub service: String,
    pub resource: String,
    pub status: WorkUnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-service rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub work_units: usize,
    pub failed: usize,
    pub violations: usize,
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Canonical controls the scheduler attempted.
    pub controls_evaluated: usize,
    pub work_units: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub violations: usize,
    pub by_service: BTreeMap<String, ServiceSummary>,
}

impl RunSummary {
    /// Build counters from the raw outcome and violation lists.
    pub fn from_results(
        controls_evaluated: usize,
        outcomes: &[WorkOutcome],
        violations: &[Violation],
    ) -> Self {
        let mut summary = Self {
            controls_evaluated,
            work_units: outcomes.len(),
            violations: violations.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome.status {
                WorkUnitStatus::Passed => summary.passed += 1,
                WorkUnitStatus::Failed => summary.failed += 1,
                WorkUnitStatus::Skipped => summary.skipped += 1,
                WorkUnitStatus::Errored => summary.errored += 1,
            }
            let service = summary.by_service.entry(outcome.service.clone()).or_default();
            service.work_units += 1;
            if outcome.status == WorkUnitStatus::Failed {
                service.failed += 1;
            }
        }

        for violation in violations {
            for outcome in outcomes {
                if outcome.canonical_control_id == violation.canonical_control_id
                    && outcome.resource == violation.resource
                {
                    summary
                        .by_service
                        .entry(outcome.service.clone())
                        .or_default()
                        .violations += 1;
                    break;
                }
            }
        }

        summary
    }
}

/// Everything one evaluation run produces.
///
/// A completed run always carries the coverage report and the full summary,
/// even when some controls could not be evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Violations in emission order.
    pub violations: Vec<Violation>,
    pub outcomes: Vec<WorkOutcome>,
    pub coverage: CoverageReport,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn write_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Evaluation Run")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Controls: {} evaluated, {} work units",
            self.summary.controls_evaluated, self.summary.work_units
        )?;
        writeln!(
            f,
            "Results: {} passed, {} failed, {} skipped, {} errored",
            self.summary.passed, self.summary.failed, self.summary.skipped, self.summary.errored
        )?;
        writeln!(f, "Violations: {}", self.summary.violations)?;
        if !self.coverage.is_complete() {
            writeln!(f, "Coverage gaps: {}", self.coverage.gaps.len())?;
        }
        Ok(())
    }
}
