//! Human-readable and JSON reports of a run

use std::fmt::Write;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use similar::{ChangeTag, TextDiff};

use crate::checker::{CheckKind, CheckReport, Outcome};
use crate::config::ReportConfig;
use crate::driver::{RunOutcome, Verdict};
use crate::registry::CurrentSchemas;
use crate::schema::Schema;

const MAX_SUGGESTIONS: usize = 3;

/// Renders run outcomes
pub struct Reporter<'a> {
    config: &'a ReportConfig,
    current: &'a CurrentSchemas,
}

impl<'a> Reporter<'a> {
    pub fn new(config: &'a ReportConfig, current: &'a CurrentSchemas) -> Self {
        Self { config, current }
    }

    /// Full text report: skipped lines, FC warnings, BC verdict
    pub fn render_text(&self, outcome: &RunOutcome) -> String {
        let mut out = String::new();
        if let Some(checksum) = &outcome.snapshot_checksum {
            writeln!(out, "Existing schemas snapshot sha256:{}", checksum.short()).ok();
        }
        for line in &outcome.skipped {
            writeln!(out, "Not parsing schema line: {}", line).ok();
        }
        out.push('\n');
        out.push_str(&self.render_check(&outcome.forward));
        out.push('\n');
        out.push_str(&self.render_check(&outcome.backward));

        match outcome.verdict {
            Verdict::Success => writeln!(out, "\nResult: OK").ok(),
            Verdict::Failure => {
                writeln!(out, "\nResult: FAILED (backward incompatible changes)").ok()
            }
        };
        out
    }

    /// Summary and itemized broken schemas of one check
    pub fn render_check(&self, report: &CheckReport) -> String {
        let kind = report.kind.label();
        let mut out = String::new();
        writeln!(
            out,
            "{} compatibility: {} checked, {} allowlisted, {} upgrader-exempt, {} compatible, {} broken",
            capitalize(kind),
            report.outcomes.len(),
            report.count(|o| matches!(o, Outcome::Allowlisted)),
            report.count(|o| matches!(o, Outcome::UpgraderExempt)),
            report.count(|o| matches!(o, Outcome::Compatible { .. })),
            report.count(|o| matches!(o, Outcome::Broken { .. })),
        )
        .ok();

        if self.config.trace_schemas {
            for item in &report.outcomes {
                writeln!(out, "  {}", trace_line(kind, &item.schema, &item.outcome)).ok();
            }
        }

        if report.is_compatible() {
            writeln!(out, "Found {} compatible schemas for all existing schemas", kind).ok();
            return out;
        }

        for broken in report.broken() {
            let Outcome::Broken { candidates, reasons } = &broken.outcome else {
                continue;
            };
            let old = broken.schema.to_string();
            writeln!(
                out,
                "\nCan NOT find {} compatible schemas after changes for schema {} from the following candidates:\n[",
                kind, old
            )
            .ok();
            for candidate in candidates {
                let candidate = candidate.to_string();
                writeln!(out, "\t{}", candidate).ok();
                if self.config.show_candidate_diffs {
                    writeln!(out, "\t  diff: {}", word_diff(&old, &candidate)).ok();
                }
            }
            writeln!(out, "]").ok();
            if !reasons.is_empty() {
                writeln!(out, "Reasons:").ok();
                for reason in reasons {
                    writeln!(out, "\t{}", reason).ok();
                }
            }
            if candidates.is_empty() && self.config.suggest_similar_names {
                let suggestions = self.similar_names(&broken.schema.name);
                if !suggestions.is_empty() {
                    writeln!(out, "Similarly named operators: {}", suggestions.join(", ")).ok();
                }
            }
        }

        let heading = match report.kind {
            CheckKind::Backward => {
                "The change introduces backward incompatible changes to the operator library."
            }
            CheckKind::Forward => {
                "WARNING: the change introduces potentially forward incompatible changes to the operator library."
            }
        };
        writeln!(
            out,
            "\n{}\n\nBroken ops: [\n\t{}\n]",
            heading,
            report.broken_ops().join("\n\t")
        )
        .ok();
        out
    }

    /// JSON document of the whole run
    pub fn render_json(&self, outcome: &RunOutcome) -> serde_json::Result<String> {
        serde_json::to_string_pretty(outcome)
    }

    /// Current operator names closest to `name`, best first
    pub fn similar_names(&self, name: &str) -> Vec<String> {
        let matcher = SkimMatcherV2::default();
        // Match on the unqualified name so the namespace does not dominate the score
        let needle = name.rsplit("::").next().unwrap_or(name);
        let mut scored: Vec<(i64, &str)> = self
            .current
            .names()
            .filter(|candidate| *candidate != name)
            .filter_map(|candidate| {
                let short = candidate.rsplit("::").next().unwrap_or(candidate);
                matcher.fuzzy_match(short, needle).map(|score| (score, candidate))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, candidate)| candidate.to_string())
            .collect()
    }
}

fn trace_line(kind: &str, schema: &Schema, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Allowlisted => format!("{} found on allowlist, skipping", schema),
        Outcome::UpgraderExempt => format!("{} has valid upgrader, skipping", schema),
        Outcome::Compatible { matched } => format!("{} matched by {}", schema, matched),
        Outcome::Broken { .. } => format!("{} has no {} compatible schema", schema, kind),
    }
}

/// Word-level diff of two rendered schemas: `[-removed-]{+added+}`
pub fn word_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_words(old, new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => out.push_str(change.value()),
            ChangeTag::Delete => out.push_str(&format!("[-{}-]", change.value())),
            ChangeTag::Insert => out.push_str(&format!("{{+{}+}}", change.value())),
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
