//! Duplicate/Identity Resolution
//!
//! Controls contributed by different standards frequently test the same
//! underlying condition under different numbering. This module groups them
//! into [`CanonicalTechnicalControl`]s: one canonical identity per real
//! check, carrying the union of every standard that expresses it.
//!
//! The merge rule is an explicit equality on (archetype, operation,
//! normalized parameters) — never text similarity. A control checking
//! "port 22 blocked" and one checking a high-risk port list including 22 do
//! NOT merge: the check surface differs. Controls with no match form
//! singleton groups.
//!
//! Resolution is a pure function of the catalog: deterministic and
//! order-independent, so re-running on an unchanged catalog produces
//! identical groupings. That stability is what makes run-over-run
//! comparisons meaningful.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ControlDefinition, Interrogation, Severity};

/// One member of a canonical group, with the baseline severity it was
/// authored under. Severity reconciliation happens elsewhere; this module
/// only records the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMember {
    pub control_id: String,
    pub baseline_severity: Severity,
}

/// How one standard cites a canonical control.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StandardRef {
    pub standard: String,
    pub external_control_id: String,
    pub severity: Severity,
}

/// The deduplicated identity of one real technical check.
///
/// Derived data, computed once per catalog version; never hand-edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTechnicalControl {
    /// Stable identifier: the representative member's `control_id`.
    pub canonical_id: String,

    /// Service of the representative member.
    pub service: String,

    /// All merged members, sorted by `control_id`.
    pub members: Vec<CanonicalMember>,

    /// The representative check invocation shared by every member.
    pub check: Interrogation,

    /// Union of all standards entries contributed by members, sorted.
    pub standards: Vec<StandardRef>,

    /// Advisory observations for human review (e.g., merged members that
    /// disagree on baseline severity). Never affects grouping.
    pub notes: Vec<String>,
}

impl CanonicalTechnicalControl {
    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.control_id.as_str()).collect()
    }

    /// Whether any member or standard matches the given control id.
    pub fn cites_control(&self, control_id: &str) -> bool {
        self.members.iter().any(|m| m.control_id == control_id)
    }
}

/// Group catalog controls into canonical technical controls.
///
/// Grouping key is the canonical text of each control's normalized
/// interrogation; the output is sorted by `canonical_id`.
pub fn resolve_identities(catalog: &Catalog) -> Vec<CanonicalTechnicalControl> {
    let mut groups: BTreeMap<String, Vec<&ControlDefinition>> = BTreeMap::new();
    for control in catalog.controls() {
        groups
            .entry(control.interrogation.canonical_key())
            .or_default()
            .push(control);
    }

    let mut canonical: Vec<CanonicalTechnicalControl> = groups
        .into_values()
        .map(|mut members| {
            members.sort_by(|a, b| a.control_id.cmp(&b.control_id));
            build_canonical(members)
        })
        .collect();

    canonical.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
    canonical
}

/// Pick the representative: the member carrying the most standards entries,
/// ties broken by lowest `control_id`.
fn representative<'a>(members: &[&'a ControlDefinition]) -> &'a ControlDefinition {
    members
        .iter()
        .max_by(|a, b| {
            a.standards
                .len()
                .cmp(&b.standards.len())
                // id ordering reversed so max_by lands on the lowest id
                .then_with(|| b.control_id.cmp(&a.control_id))
        })
        .expect("canonical groups are never empty")
}

fn build_canonical(members: Vec<&ControlDefinition>) -> CanonicalTechnicalControl {
    let repr = representative(&members);

    let mut standards: Vec<StandardRef> = members
        .iter()
        .flat_map(|m| {
            m.standards.iter().map(|(name, mapping)| StandardRef {
                standard: name.clone(),
                external_control_id: mapping.external_control_id.clone(),
                severity: mapping.severity,
            })
        })
        .collect();
    standards.sort();
    standards.dedup();

    let mut notes = Vec::new();
    let baseline_severities: Vec<Severity> = {
        let mut s: Vec<Severity> = members.iter().map(|m| m.severity).collect();
        s.sort_unstable();
        s.dedup();
        s
    };
    if baseline_severities.len() > 1 {
        notes.push(format!(
            "merged members disagree on baseline severity ({})",
            baseline_severities
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    CanonicalTechnicalControl {
        canonical_id: repr.control_id.clone(),
        service: repr.service.clone(),
        members: members
            .iter()
            .map(|m| CanonicalMember {
                control_id: m.control_id.clone(),
                baseline_severity: m.severity,
            })
            .collect(),
        check: repr.interrogation.clone(),
        standards,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn two_standard_catalog() -> Catalog {
        Catalog::from_json(
            r#"{
                "s3": [
                    {
                        "control_id": "A",
                        "title": "Block public access (standard X)",
                        "severity": "MEDIUM",
                        "interrogation": {
                            "archetype": "public_exposure",
                            "operation": "block_public_access",
                            "parameters": { "resource_type": "bucket" }
                        },
                        "standards": {
                            "standard_x": { "external_control_id": "X-1", "severity": "MEDIUM" }
                        }
                    },
                    {
                        "control_id": "B",
                        "title": "S3 buckets must block public access (standard Y)",
                        "severity": "CRITICAL",
                        "interrogation": {
                            "archetype": "public_exposure",
                            "operation": "block_public_access",
                            "parameters": { "resource_type": "bucket" }
                        },
                        "standards": {
                            "standard_y": { "external_control_id": "Y-9", "severity": "CRITICAL" }
                        }
                    },
                    {
                        "control_id": "C",
                        "title": "Snapshots must not be shared",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "public_exposure",
                            "operation": "public_sharing",
                            "parameters": { "resource_type": "snapshot" }
                        },
                        "standards": {
                            "standard_x": { "external_control_id": "X-7", "severity": "HIGH" }
                        }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_identical_interrogations_merge() {
        let canonical = resolve_identities(&two_standard_catalog());
        assert_eq!(canonical.len(), 2);

        let merged = canonical.iter().find(|c| c.cites_control("A")).unwrap();
        assert_eq!(merged.member_ids(), vec!["A", "B"]);
        assert_eq!(merged.standards.len(), 2);
        assert!(merged.standards.iter().any(|s| s.standard == "standard_x"));
        assert!(merged.standards.iter().any(|s| s.standard == "standard_y"));
    }

    #[test]
    fn test_singleton_group_for_unmatched_control() {
        let canonical = resolve_identities(&two_standard_catalog());
        let singleton = canonical.iter().find(|c| c.cites_control("C")).unwrap();
        assert_eq!(singleton.member_ids(), vec!["C"]);
        assert_eq!(singleton.canonical_id, "C");
    }

    #[test]
    fn test_differing_parameters_do_not_merge() {
        let catalog = Catalog::from_json(
            r#"{
                "ec2": [
                    {
                        "control_id": "SSH-ONLY",
                        "title": "Port 22 blocked",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "network_boundary",
                            "operation": "ingress_rules",
                            "parameters": { "ports": [22] }
                        },
                        "standards": {
                            "cis_v3_0": { "external_control_id": "5.2", "severity": "HIGH" }
                        }
                    },
                    {
                        "control_id": "HIGH-RISK",
                        "title": "High-risk ports blocked",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "network_boundary",
                            "operation": "ingress_rules",
                            "parameters": { "ports": [22, 3389] }
                        },
                        "standards": {
                            "vendor": { "external_control_id": "V-2", "severity": "HIGH" }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        let canonical = resolve_identities(&catalog);
        assert_eq!(canonical.len(), 2, "subset parameter lists must not merge");
    }

    #[test]
    fn test_parameter_order_does_not_prevent_merge() {
        let catalog = Catalog::from_json(
            r#"{
                "ec2": [
                    {
                        "control_id": "P1",
                        "title": "Admin ports",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "network_boundary",
                            "operation": "ingress_rules",
                            "parameters": { "ports": [3389, 22] }
                        },
                        "standards": {
                            "cis_v3_0": { "external_control_id": "5.2", "severity": "HIGH" }
                        }
                    },
                    {
                        "control_id": "P2",
                        "title": "Remote admin ports",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "network_boundary",
                            "operation": "ingress_rules",
                            "parameters": { "ports": [22, 3389] }
                        },
                        "standards": {
                            "vendor": { "external_control_id": "V-5", "severity": "HIGH" }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        let canonical = resolve_identities(&catalog);
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].member_ids(), vec!["P1", "P2"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let catalog = two_standard_catalog();
        let first = resolve_identities(&catalog);
        let second = resolve_identities(&catalog);
        assert_eq!(first, second);
    }

    #[test]
    fn test_representative_prefers_most_standards() {
        let catalog = Catalog::from_json(
            r#"{
                "iam": [
                    {
                        "control_id": "ZZZ",
                        "title": "MFA on root, twice cited",
                        "severity": "CRITICAL",
                        "interrogation": {
                            "archetype": "identity_policy",
                            "operation": "mfa_enabled",
                            "parameters": { "scope": "root" }
                        },
                        "standards": {
                            "cis_v3_0": { "external_control_id": "1.5", "severity": "CRITICAL" },
                            "vendor": { "external_control_id": "V-1", "severity": "HIGH" }
                        }
                    },
                    {
                        "control_id": "AAA",
                        "title": "MFA on root",
                        "severity": "HIGH",
                        "interrogation": {
                            "archetype": "identity_policy",
                            "operation": "mfa_enabled",
                            "parameters": { "scope": "root" }
                        },
                        "standards": {
                            "org_guardrails": { "external_control_id": "G-3", "severity": "HIGH" }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        let canonical = resolve_identities(&catalog);
        assert_eq!(canonical.len(), 1);
        // ZZZ carries two standards, AAA one; representative is ZZZ even
        // though AAA sorts first.
        assert_eq!(canonical[0].canonical_id, "ZZZ");
        assert_eq!(canonical[0].standards.len(), 3);
    }

    #[test]
    fn test_severity_disagreement_noted_not_decided() {
        let canonical = resolve_identities(&two_standard_catalog());
        let merged = canonical.iter().find(|c| c.cites_control("A")).unwrap();
        assert_eq!(merged.notes.len(), 1);
        assert!(merged.notes[0].contains("disagree on baseline severity"));
        // Both baselines survive untouched for the reconciler.
        let severities: Vec<Severity> =
            merged.members.iter().map(|m| m.baseline_severity).collect();
        assert_eq!(severities, vec![Severity::Medium, Severity::Critical]);
    }
}
