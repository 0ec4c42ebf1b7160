//! End-to-end run: load the old snapshot, run FC, run BC, decide
//!
//! ```text
//! Start -> LoadOldSchemas -> RunFC -> RunBC -> Report -> {Success | Failure}
//! ```
//!
//! Loading is fail-fast: a line that is neither parseable nor covered by an
//! active don't-parse entry aborts the run before any checking. FC results
//! are advisory; only BC decides the verdict.

use serde::Serialize;
use tracing::{info, warn};

use crate::allowlist::{Allowlist, DontParseList};
use crate::checker::{CheckReport, CompatChecker};
use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::registry::CurrentSchemas;
use crate::schema::Schema;
use crate::upgrader::VersionMap;

/// Old schemas read from a snapshot
#[derive(Debug, Clone, Default)]
pub struct ExistingSchemas {
    pub schemas: Vec<Schema>,
    /// Raw lines skipped by the don't-parse list
    pub skipped: Vec<String>,
    /// Fingerprint of the snapshot text
    pub checksum: Option<Checksum>,
}

/// Parse a snapshot: one rendered schema per line
///
/// Trailing blank lines are ignored; a blank line followed by more content
/// is a parse error like any other malformed line.
pub fn load_existing_schemas(text: &str, dont_parse: &DontParseList) -> Result<ExistingSchemas> {
    let mut existing = ExistingSchemas {
        checksum: Some(Checksum::from_str(text)),
        ..ExistingSchemas::default()
    };
    for (lineno, line) in text.trim_end().lines().enumerate() {
        let line = line.trim();
        if dont_parse.should_skip(line) {
            info!(line, "not parsing schema line");
            existing.skipped.push(line.to_string());
            continue;
        }
        let schema = Schema::parse(line).map_err(|source| SchemaError::Parse {
            line: lineno + 1,
            source,
        })?;
        existing.schemas.push(schema);
    }
    info!(
        schemas = existing.schemas.len(),
        skipped = existing.skipped.len(),
        "loaded existing schemas"
    );
    Ok(existing)
}

/// Overall decision of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::Failure => 1,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub forward: CheckReport,
    pub backward: CheckReport,
    pub skipped: Vec<String>,
    pub snapshot_checksum: Option<Checksum>,
    pub verdict: Verdict,
}

/// Run FC then BC over an already-loaded snapshot
pub fn run_checks(
    existing: &ExistingSchemas,
    current: &CurrentSchemas,
    allowlist: &Allowlist,
    version_map: &VersionMap,
) -> RunOutcome {
    let checker = CompatChecker::new(current, allowlist, version_map);

    let forward = checker.check_fc(&existing.schemas);
    if !forward.is_compatible() {
        warn!(broken_ops = ?forward.broken_ops(), "forward compatibility check failed");
    }

    let backward = checker.check_bc(&existing.schemas);
    let verdict = if backward.is_compatible() {
        Verdict::Success
    } else {
        Verdict::Failure
    };

    RunOutcome {
        forward,
        backward,
        skipped: existing.skipped.clone(),
        snapshot_checksum: existing.checksum.clone(),
        verdict,
    }
}

/// Load the snapshot text and run both checks
pub fn run(
    snapshot: &str,
    dont_parse: &DontParseList,
    current: &CurrentSchemas,
    allowlist: &Allowlist,
    version_map: &VersionMap,
) -> Result<RunOutcome> {
    let existing = load_existing_schemas(snapshot, dont_parse)?;
    Ok(run_checks(&existing, current, allowlist, version_map))
}
