//! End-to-end compatibility scenarios
//!
//! Drives the public API the way the CLI does: snapshot text in, verdict out.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use schema_compat::checker::Outcome;
use schema_compat::config::ReportConfig;
use schema_compat::report::Reporter;
use schema_compat::{
    driver, Allowlist, AllowlistRule, CompatChecker, CurrentSchemas, DontParseList, DontParseRule,
    Schema, SchemaError, Verdict, VersionMap,
};

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn schema(text: &str) -> Schema {
    Schema::parse(text).unwrap()
}

fn current(lines: &[&str]) -> CurrentSchemas {
    CurrentSchemas::from_schemas(lines.iter().map(|l| schema(l))).unwrap()
}

fn run_plain(snapshot: &str, current: &CurrentSchemas) -> driver::RunOutcome {
    driver::run(
        snapshot,
        &DontParseList::default(),
        current,
        &Allowlist::default(),
        &VersionMap::default(),
    )
    .unwrap()
}

// =============================================================================
// Basic Scenarios
// =============================================================================

#[test]
fn test_appended_optional_argument_passes_both() {
    let current = current(&["foo(Tensor a, int b, int c=0) -> Tensor"]);
    let outcome = run_plain("foo(Tensor a, int b) -> Tensor\n", &current);

    assert!(outcome.backward.is_compatible());
    assert!(outcome.forward.is_compatible());
    assert_eq!(outcome.verdict, Verdict::Success);
    assert_eq!(outcome.verdict.exit_code(), 0);
}

#[test]
fn test_removed_required_argument_fails() {
    let current = current(&["foo(Tensor a) -> Tensor"]);
    let outcome = run_plain("foo(Tensor a, int b) -> Tensor\n", &current);

    assert_eq!(outcome.verdict, Verdict::Failure);
    assert_ne!(outcome.verdict.exit_code(), 0);
    assert_eq!(outcome.backward.broken_ops(), vec!["foo(Tensor a, int b) -> Tensor"]);
}

#[test]
fn test_allowlisted_schema_without_candidates() {
    let allowlist =
        Allowlist::compile(&[AllowlistRule::new("bar::.*", "9999-01-01")], date("2024-01-01"))
            .unwrap();
    let current = current(&["foo(Tensor a) -> Tensor"]);
    let outcome = driver::run(
        "bar::baz(Tensor x) -> Tensor\n",
        &DontParseList::default(),
        &current,
        &allowlist,
        &VersionMap::default(),
    )
    .unwrap();

    assert!(matches!(outcome.backward.outcomes[0].outcome, Outcome::Allowlisted));
    assert!(matches!(outcome.forward.outcomes[0].outcome, Outcome::Allowlisted));
    assert_eq!(outcome.verdict, Verdict::Success);
}

#[test]
fn test_dont_parse_line_never_reaches_checks() {
    let dont_parse = DontParseList::compile(
        &[DontParseRule::new("experimental_op", "2099-01-01")],
        date("2024-01-01"),
    )
    .unwrap();
    let current = current(&["foo(Tensor a) -> Tensor"]);
    let snapshot =
        "foo(Tensor a) -> Tensor\nexperimental_op(Tensor a, Layout<strided> b) -> Tensor\n";
    let outcome = driver::run(
        snapshot,
        &dont_parse,
        &current,
        &Allowlist::default(),
        &VersionMap::default(),
    )
    .unwrap();

    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.backward.outcomes.len(), 1);
    assert_eq!(outcome.forward.outcomes.len(), 1);
    assert_eq!(outcome.verdict, Verdict::Success);

    // Without the entry the same line aborts the run
    let err = driver::run(
        snapshot,
        &DontParseList::default(),
        &current,
        &Allowlist::default(),
        &VersionMap::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::Parse { line: 2, .. }));
}

#[test]
fn test_upgrader_exempts_backward_only() {
    let version_map = VersionMap::from_json(
        r#"{"baz.overload1": [{"old_schema": "baz(Tensor x) -> Tensor"}]}"#,
    )
    .unwrap();
    let current = current(&["qux(Tensor x) -> Tensor"]);
    let outcome = driver::run(
        "baz(Tensor x) -> Tensor\n",
        &DontParseList::default(),
        &current,
        &Allowlist::default(),
        &version_map,
    )
    .unwrap();

    assert!(matches!(outcome.backward.outcomes[0].outcome, Outcome::UpgraderExempt));
    assert!(outcome.backward.broken_ops().is_empty());
    // Upgraders say nothing about forward compatibility
    assert_eq!(outcome.forward.broken_ops(), vec!["baz(Tensor x) -> Tensor"]);
    assert_eq!(outcome.verdict, Verdict::Success);
}

// =============================================================================
// Relation Properties
// =============================================================================

#[test]
fn test_every_schema_is_compatible_with_itself() {
    let lines = [
        "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
        "aten::add_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)",
        "aten::max.dim_max(Tensor self, int dim, bool keepdim=False, *, Tensor(a!) max, Tensor(b!) max_values) -> (Tensor(a!) values, Tensor(b!) indices)",
        "aten::conv2d(Tensor input, Tensor weight, Tensor? bias=None, int[2] stride=1, SymInt[2] padding=0) -> Tensor",
        "aten::split.Tensor(Tensor(a -> *) self, SymInt split_size, int dim=0) -> Tensor(a)[]",
        "prim::TupleUnpack(Any tup) -> ...",
        "aten::format(str self, ...) -> str",
        "aten::_nested_tensor(Dict(str, Tensor) d, float eps=1e-05, Future(int)? f=None) -> ((str, Tensor)[])",
    ];
    for line in lines {
        let s = schema(line);
        assert!(s.is_backward_compatible_with(&s), "BC reflexivity failed for {}", line);
        let (fc, reason) = s.check_forward_compatible_with(&s);
        assert!(fc, "FC reflexivity failed for {}: {}", line, reason);
    }
}

#[test]
fn test_weakened_return_breaks_backward_compatibility() {
    let old = schema("foo(Tensor a) -> Tensor");

    // Old callers rely on a non-null Tensor
    assert!(!schema("foo(Tensor a) -> Tensor?").is_backward_compatible_with(&old));
    assert!(!schema("foo(Tensor a) -> str").is_backward_compatible_with(&old));
    assert!(!schema("foo(Tensor a) -> (Tensor, Tensor)").is_backward_compatible_with(&old));

    // Returning a subtype of what was promised is fine
    let optional = schema("foo(Tensor a) -> Tensor?");
    assert!(old.is_backward_compatible_with(&optional));
}

#[test]
fn test_new_overload_does_not_disturb_existing() {
    let current = current(&["foo(Tensor a) -> Tensor", "foo.int(int a) -> int"]);
    let outcome = run_plain("foo(Tensor a) -> Tensor\n", &current);

    assert_eq!(outcome.verdict, Verdict::Success);
    match &outcome.backward.outcomes[0].outcome {
        Outcome::Compatible { matched } => assert_eq!(matched.overload_name, ""),
        other => panic!("Expected Compatible, got {:?}", other),
    }
}

#[test]
fn test_allowlist_applies_to_both_checks() {
    let allowlist =
        Allowlist::compile(&[AllowlistRule::new("foo", "9999-01-01")], date("2024-01-01")).unwrap();
    let current = current(&["foo(Tensor a) -> Tensor"]);
    let version_map = VersionMap::default();
    let checker = CompatChecker::new(&current, &allowlist, &version_map);
    let old = [schema("foo(Tensor a, int b) -> Tensor")];

    assert!(checker.check_bc(&old).is_compatible());
    assert!(checker.check_fc(&old).is_compatible());
}

#[test]
fn test_expired_allowlist_entry_is_ignored() {
    let rules = [AllowlistRule::new("foo", "2022-01-31")];
    let current = current(&["foo(Tensor a) -> Tensor"]);
    let old = [schema("foo(Tensor a, int b) -> Tensor")];

    let active = Allowlist::compile(&rules, date("2022-01-31")).unwrap();
    assert!(CompatChecker::new(&current, &active, &VersionMap::default())
        .check_bc(&old)
        .is_compatible());

    let expired = Allowlist::compile(&rules, date("2022-02-01")).unwrap();
    assert!(!CompatChecker::new(&current, &expired, &VersionMap::default())
        .check_bc(&old)
        .is_compatible());
}

#[test]
fn test_upgrader_requires_exact_old_schema() {
    let version_map = VersionMap::from_json(
        r#"{"baz.overload1": [{"old_schema": "baz(Tensor x) -> Tensor"}]}"#,
    )
    .unwrap();
    let current = current(&["qux(Tensor x) -> Tensor"]);
    let allowlist = Allowlist::default();
    let checker = CompatChecker::new(&current, &allowlist, &version_map);

    let report = checker.check_bc(&[schema("baz(Tensor x, int y) -> Tensor")]);
    assert!(!report.is_compatible());
}

// =============================================================================
// Fixture Runs
// =============================================================================

fn fixture_run(today: &str) -> (driver::RunOutcome, CurrentSchemas) {
    let fixtures = fixtures_path();
    let today = date(today);
    let current = CurrentSchemas::load(&[
        fixtures.join("current_schemas.txt"),
        fixtures.join("custom_class_schemas.txt"),
    ])
    .unwrap();
    let version_map = VersionMap::load(fixtures.join("version_map.json")).unwrap();
    let outcome = driver::run(
        include_str!("fixtures/existing_schemas.txt"),
        &DontParseList::builtin(today).unwrap(),
        &current,
        &Allowlist::builtin(today).unwrap(),
        &version_map,
    )
    .unwrap();
    (outcome, current)
}

#[test]
fn test_fixture_snapshot_is_compatible() {
    let (outcome, _) = fixture_run("2024-01-01");

    assert_eq!(outcome.skipped.len(), 1);
    assert!(outcome.skipped[0].starts_with("_TorchScriptTesting::"));
    assert_eq!(outcome.backward.outcomes.len(), 7);
    assert!(outcome.backward.is_compatible());
    assert!(outcome.forward.is_compatible());
    assert_eq!(outcome.verdict, Verdict::Success);
    assert_eq!(outcome.backward.count(|o| matches!(o, Outcome::UpgraderExempt)), 1);
    // prim::Concat is permanently allowlisted
    assert_eq!(outcome.backward.count(|o| matches!(o, Outcome::Allowlisted)), 1);
}

#[test]
fn test_fixture_gelu_allowlisted_until_expiry() {
    let (outcome, _) = fixture_run("2022-02-15");
    let gelu = outcome
        .backward
        .outcomes
        .iter()
        .find(|o| o.schema.name == "aten::gelu")
        .unwrap();
    assert!(matches!(gelu.outcome, Outcome::Allowlisted));
}

#[test]
fn test_fixture_report_text() {
    let (outcome, current) = fixture_run("2024-01-01");
    let config = ReportConfig::default();
    let text = Reporter::new(&config, &current).render_text(&outcome);

    assert!(text.contains("Existing schemas snapshot sha256:"));
    assert!(text.contains("Not parsing schema line: _TorchScriptTesting::"));
    assert!(text.contains("Found backward compatible schemas for all existing schemas"));
    assert!(text.contains("Result: OK"));
}

#[test]
fn test_snapshot_from_disk_with_broken_op() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1, bool fast) -> Tensor"
    )
    .unwrap();
    let snapshot = std::fs::read_to_string(file.path()).unwrap();

    let (_, current) = fixture_run("2024-01-01");
    let outcome = driver::run(
        &snapshot,
        &DontParseList::default(),
        &current,
        &Allowlist::default(),
        &VersionMap::default(),
    )
    .unwrap();

    assert_eq!(outcome.verdict, Verdict::Failure);
    match &outcome.backward.outcomes[0].outcome {
        Outcome::Broken { candidates, reasons } => {
            assert_eq!(candidates.len(), 3);
            assert!(!reasons.is_empty());
        }
        other => panic!("Expected Broken, got {:?}", other),
    }
}
