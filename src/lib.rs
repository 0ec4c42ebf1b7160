//! Operator Schema Compatibility Checker
//!
//! Decides whether every previously published operator schema is still
//! invocable against the operators a build registers now.
//!
//! ## Features
//!
//! - **Backward compatibility (BC)**: old callers still work; failures are fatal
//! - **Forward compatibility (FC)**: stricter, advisory check with reasons
//! - **Time-bounded allowlist**: regex exemptions that expire on a fixed date
//! - **Upgrader exemptions**: old shapes with a registered migration are skipped for BC
//! - **Don't-parse list**: snapshot lines with not-yet-understood syntax are skipped
//!
//! ## Pipeline
//!
//! ```text
//! schemas.txt ──parse──▶ old schemas ──┬─▶ FC check ──▶ warning
//!                                      └─▶ BC check ──▶ exit status
//! current build ──▶ CurrentSchemas ────┘
//! version map ──▶ VersionMap (BC only)
//! ```

pub mod allowlist;
pub mod checker;
pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod driver;
pub mod error;
pub mod registry;
pub mod report;
pub mod schema;
pub mod upgrader;

pub use allowlist::{Allowlist, AllowlistRule, DontParseList, DontParseRule};
pub use checker::{CheckKind, CheckReport, CompatChecker, Outcome};
pub use checksum::Checksum;
pub use compatibility::{ChangeType, CompatibilityResult, SchemaChange};
pub use config::CompatConfig;
pub use driver::{load_existing_schemas, run, run_checks, RunOutcome, Verdict};
pub use error::{ParseError, Result, SchemaError};
pub use registry::CurrentSchemas;
pub use schema::{AliasInfo, Argument, DefaultValue, Schema, TypeKind};
pub use upgrader::VersionMap;
