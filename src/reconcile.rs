//! Severity Reconciliation
//!
//! A canonical control cited by multiple standards may carry a different
//! severity under each. Compliance posture is driven by worst-case risk, not
//! by whichever standard happens to be queried, so the effective severity is
//! the maximum over every baseline and every standard override.

use crate::catalog::Severity;
use crate::identity::CanonicalTechnicalControl;

/// Effective severity of a canonical control: the maximum of every member's
/// baseline severity and every standard-specific override.
///
/// Pure and total. A well-formed canonical control has at least one member,
/// so the reduction always has a value; an (impossible) empty control
/// defaults to `Low` rather than panicking.
pub fn effective_severity(control: &CanonicalTechnicalControl) -> Severity {
    control
        .members
        .iter()
        .map(|m| m.baseline_severity)
        .chain(control.standards.iter().map(|s| s.severity))
        .max()
        .unwrap_or(Severity::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Interrogation, ParamMap};
    use crate::identity::{CanonicalMember, StandardRef};

    fn canonical(
        baselines: &[Severity],
        standards: &[(&str, Severity)],
    ) -> CanonicalTechnicalControl {
        CanonicalTechnicalControl {
            canonical_id: "TEST".to_string(),
            service: "s3".to_string(),
            members: baselines
                .iter()
                .enumerate()
                .map(|(i, s)| CanonicalMember {
                    control_id: format!("C{i}"),
                    baseline_severity: *s,
                })
                .collect(),
            check: Interrogation {
                archetype: "public_exposure".to_string(),
                operation: "block_public_access".to_string(),
                parameters: ParamMap::new(),
            },
            standards: standards
                .iter()
                .map(|(name, severity)| StandardRef {
                    standard: name.to_string(),
                    external_control_id: "1".to_string(),
                    severity: *severity,
                })
                .collect(),
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_max_over_baseline_and_overrides() {
        let control = canonical(
            &[Severity::Medium],
            &[("standard_x", Severity::Medium), ("standard_y", Severity::Critical)],
        );
        assert_eq!(effective_severity(&control), Severity::Critical);
    }

    #[test]
    fn test_baseline_alone_wins_when_higher() {
        let control = canonical(&[Severity::High], &[("standard_x", Severity::Low)]);
        assert_eq!(effective_severity(&control), Severity::High);
    }

    #[test]
    fn test_monotonic_under_added_mapping() {
        let before = canonical(&[Severity::Medium], &[("standard_x", Severity::Medium)]);
        let after = canonical(
            &[Severity::Medium],
            &[("standard_x", Severity::Medium), ("standard_z", Severity::High)],
        );
        assert!(effective_severity(&after) >= effective_severity(&before));
    }

    #[test]
    fn test_order_independent() {
        let forward = canonical(
            &[Severity::Low, Severity::High],
            &[("a", Severity::Medium), ("b", Severity::Critical)],
        );
        let reversed = canonical(
            &[Severity::High, Severity::Low],
            &[("b", Severity::Critical), ("a", Severity::Medium)],
        );
        assert_eq!(effective_severity(&forward), effective_severity(&reversed));
    }
}
