//! Backward and forward compatibility checks over a whole snapshot
//!
//! Every old schema is checked against all current overloads sharing its
//! base name, in declaration order; the first compatible candidate wins.
//! Failures are aggregated rather than short-circuiting, so a run reports
//! the complete set of broken operators.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::allowlist::Allowlist;
use crate::compatibility::{backward_compatibility, forward_compatibility, CompatibilityResult};
use crate::registry::CurrentSchemas;
use crate::schema::Schema;
use crate::upgrader::VersionMap;

/// Which relation a report was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Backward,
    Forward,
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Backward => "backward",
            CheckKind::Forward => "forward",
        }
    }
}

/// What happened to one old schema
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Matched an active allowlist entry
    Allowlisted,
    /// Exact historical shape with a registered upgrader
    UpgraderExempt,
    /// A current overload is compatible
    Compatible { matched: Schema },
    /// No current overload is compatible
    Broken {
        candidates: Vec<Schema>,
        /// Non-empty failure reasons, one per failing candidate
        reasons: Vec<String>,
    },
}

/// Outcome for one old schema
#[derive(Debug, Clone, Serialize)]
pub struct SchemaOutcome {
    pub schema: Schema,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of checking a whole snapshot with one relation
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub kind: CheckKind,
    pub outcomes: Vec<SchemaOutcome>,
}

impl CheckReport {
    /// True when no old schema is broken
    pub fn is_compatible(&self) -> bool {
        self.broken().next().is_none()
    }

    /// Broken outcomes, in snapshot order
    pub fn broken(&self) -> impl Iterator<Item = &SchemaOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Broken { .. }))
    }

    /// Rendered signatures of the broken schemas
    pub fn broken_ops(&self) -> Vec<String> {
        self.broken().map(|o| o.schema.to_string()).collect()
    }

    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Checks old schemas against the current snapshot
///
/// All tables are read-only; each old schema is checked independently.
pub struct CompatChecker<'a> {
    current: &'a CurrentSchemas,
    allowlist: &'a Allowlist,
    version_map: &'a VersionMap,
}

impl<'a> CompatChecker<'a> {
    pub fn new(
        current: &'a CurrentSchemas,
        allowlist: &'a Allowlist,
        version_map: &'a VersionMap,
    ) -> Self {
        Self {
            current,
            allowlist,
            version_map,
        }
    }

    /// Backward-compatibility check; allowlist and upgraders both exempt
    pub fn check_bc(&self, existing: &[Schema]) -> CheckReport {
        let outcomes = existing
            .iter()
            .map(|old| SchemaOutcome {
                schema: old.clone(),
                outcome: self.check_bc_one(old),
            })
            .collect();
        let report = CheckReport {
            kind: CheckKind::Backward,
            outcomes,
        };
        if report.is_compatible() {
            info!("found backward compatible schemas for all existing schemas");
        }
        report
    }

    /// Forward-compatibility check; only the allowlist exempts
    pub fn check_fc(&self, existing: &[Schema]) -> CheckReport {
        let outcomes = existing
            .iter()
            .map(|old| SchemaOutcome {
                schema: old.clone(),
                outcome: self.check_fc_one(old),
            })
            .collect();
        let report = CheckReport {
            kind: CheckKind::Forward,
            outcomes,
        };
        if report.is_compatible() {
            info!("found forward compatible schemas for all existing schemas");
        } else {
            warn!(
                broken = report.broken().count(),
                "potentially forward incompatible changes to the operator library"
            );
        }
        report
    }

    fn check_bc_one(&self, old: &Schema) -> Outcome {
        if self.allowlist.is_allowed(old) {
            info!(schema = %old, "found on allowlist, skipping");
            return Outcome::Allowlisted;
        }
        if self.version_map.has_valid_upgrader(old) {
            info!(schema = %old, "has valid upgrader, skipping");
            return Outcome::UpgraderExempt;
        }
        info!(schema = %old, "processing existing schema");
        let outcome = self.match_candidates(old, backward_compatibility);
        if let Outcome::Broken { candidates, .. } = &outcome {
            error!(
                schema = %old,
                candidates = candidates.len(),
                "no backward compatible schema found"
            );
        }
        outcome
    }

    fn check_fc_one(&self, old: &Schema) -> Outcome {
        if self.allowlist.is_allowed(old) {
            info!(schema = %old, "found on allowlist, skipping");
            return Outcome::Allowlisted;
        }
        info!(schema = %old, "processing existing schema");
        let outcome = self.match_candidates(old, forward_compatibility);
        if let Outcome::Broken { candidates, .. } = &outcome {
            warn!(
                schema = %old,
                candidates = candidates.len(),
                "no forward compatible schema found"
            );
        }
        outcome
    }

    fn match_candidates(
        &self,
        old: &Schema,
        relation: fn(&Schema, &Schema) -> CompatibilityResult,
    ) -> Outcome {
        let candidates = self.current.candidates(&old.name);
        let mut reasons = Vec::new();
        for candidate in candidates {
            let result = relation(candidate, old);
            if result.is_compatible {
                return Outcome::Compatible {
                    matched: candidate.clone(),
                };
            }
            if !result.summary.is_empty() {
                reasons.push(result.summary);
            }
        }
        Outcome::Broken {
            candidates: candidates.to_vec(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::AllowlistRule;
    use chrono::NaiveDate;

    fn schemas(lines: &[&str]) -> Vec<Schema> {
        lines.iter().map(|l| Schema::parse(l).unwrap()).collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_any_candidate_may_match() {
        let current = CurrentSchemas::from_schemas(schemas(&[
            "foo.a(Tensor x) -> Tensor",
            "foo(Tensor x, int y=0) -> Tensor",
        ]))
        .unwrap();
        let allowlist = Allowlist::default();
        let version_map = VersionMap::default();
        let checker = CompatChecker::new(&current, &allowlist, &version_map);

        let report = checker.check_bc(&schemas(&["foo(Tensor x) -> Tensor"]));
        assert!(report.is_compatible());
        match &report.outcomes[0].outcome {
            Outcome::Compatible { matched } => {
                assert_eq!(matched.to_string(), "foo(Tensor x, int y=0) -> Tensor")
            }
            other => panic!("Expected Compatible, got {:?}", other),
        }
    }

    #[test]
    fn test_failures_are_aggregated() {
        let current = CurrentSchemas::from_schemas(schemas(&["foo(Tensor a) -> Tensor"])).unwrap();
        let allowlist = Allowlist::default();
        let version_map = VersionMap::default();
        let checker = CompatChecker::new(&current, &allowlist, &version_map);

        let report = checker.check_bc(&schemas(&[
            "foo(Tensor a, int b) -> Tensor",
            "foo(Tensor a) -> Tensor",
            "gone(Tensor a) -> Tensor",
        ]));
        assert!(!report.is_compatible());
        assert_eq!(
            report.broken_ops(),
            vec!["foo(Tensor a, int b) -> Tensor", "gone(Tensor a) -> Tensor"]
        );
    }

    #[test]
    fn test_forward_reasons_are_collected_per_candidate() {
        let current = CurrentSchemas::from_schemas(schemas(&[
            "foo(Tensor a, Scalar b) -> Tensor",
            "foo.x(Tensor a) -> Tensor",
        ]))
        .unwrap();
        let allowlist = Allowlist::default();
        let version_map = VersionMap::default();
        let checker = CompatChecker::new(&current, &allowlist, &version_map);

        let report = checker.check_fc(&schemas(&["foo(Tensor a, int b) -> Tensor"]));
        match &report.outcomes[0].outcome {
            Outcome::Broken { candidates, reasons } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("changed type"));
            }
            other => panic!("Expected Broken, got {:?}", other),
        }
    }

    #[test]
    fn test_upgraders_exempt_backward_only() {
        let current = CurrentSchemas::default();
        let allowlist = Allowlist::default();
        let version_map = VersionMap::from_json(
            r#"{"baz.overload1": [{"old_schema": "baz(Tensor x) -> Tensor"}]}"#,
        )
        .unwrap();
        let checker = CompatChecker::new(&current, &allowlist, &version_map);
        let existing = schemas(&["baz(Tensor x) -> Tensor"]);

        let bc = checker.check_bc(&existing);
        assert!(matches!(bc.outcomes[0].outcome, Outcome::UpgraderExempt));
        assert!(bc.is_compatible());

        let fc = checker.check_fc(&existing);
        assert!(!fc.is_compatible());
        assert_eq!(fc.broken_ops(), vec!["baz(Tensor x) -> Tensor"]);
    }

    #[test]
    fn test_allowlist_exempts_both_checks() {
        let current = CurrentSchemas::default();
        let allowlist =
            Allowlist::compile(&[AllowlistRule::new("bar::.*", "9999-01-01")], today()).unwrap();
        let version_map = VersionMap::default();
        let checker = CompatChecker::new(&current, &allowlist, &version_map);
        let existing = schemas(&["bar::baz(Tensor x) -> Tensor"]);

        let bc = checker.check_bc(&existing);
        let fc = checker.check_fc(&existing);
        assert!(matches!(bc.outcomes[0].outcome, Outcome::Allowlisted));
        assert!(matches!(fc.outcomes[0].outcome, Outcome::Allowlisted));
        assert!(bc.is_compatible() && fc.is_compatible());
    }
}
