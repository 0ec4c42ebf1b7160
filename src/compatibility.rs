//! Schema compatibility checking
//!
//! Decides whether a current schema can stand in for an old one.
//!
//! * **Backward compatibility**: every call that was legal against the old
//!   schema is still legal against the new one, and its results are still
//!   assignable to what old callers expect.
//! * **Forward compatibility**: a stricter, reason-producing variant for
//!   callers written against the old contract.
//!
//! Both relations walk the schemas positionally. Out arguments (keyword-only
//! arguments that are written to) are aligned from the first out argument of
//! each schema, so new defaulted arguments may be inserted before them.

use serde::{Deserialize, Serialize};

use crate::schema::{Argument, Schema};

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Whether the schemas are compatible
    pub is_compatible: bool,
    /// Incompatibilities found, in argument order
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

impl CompatibilityResult {
    /// Build a result from the incompatibilities found; none means compatible
    pub fn from_changes(changes: Vec<SchemaChange>) -> Self {
        let summary = changes
            .iter()
            .map(|c| c.description.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            is_compatible: changes.is_empty(),
            changes,
            summary,
        }
    }
}

/// A detected incompatibility between an old and a new schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Type of change
    pub change_type: ChangeType,
    /// Path to the changed element (e.g. "arguments[1]", "returns[0]")
    pub path: String,
    /// Old value (if applicable)
    pub old_value: Option<String>,
    /// New value (if applicable)
    pub new_value: Option<String>,
    /// Human-readable description
    pub description: String,
}

impl SchemaChange {
    fn new(
        change_type: ChangeType,
        path: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            change_type,
            path: path.into(),
            old_value,
            new_value,
            description: description.into(),
        }
    }
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Base name or overload name differ
    OverloadMismatch,
    /// Vararg / varret flags differ
    VariadicChanged,
    /// Number of return values differs
    ReturnCountChanged,
    /// Number of out arguments differs
    OutArgumentCountChanged,
    /// An existing argument is gone
    ArgumentRemoved,
    /// The argument at a position has a different name
    ArgumentRenamed,
    /// Argument or return type is not assignable
    TypeChanged,
    /// Fixed list length changed
    FixedLengthChanged,
    /// Mutability / aliasing annotation changed
    AliasChanged,
    /// A positional argument became keyword-only
    BecameKeywordOnly,
    /// Default value changed or removed
    DefaultChanged,
    /// A default was added to an argument that had none
    DefaultAdded,
    /// A new argument has no default value
    MissingDefault,
    /// A new argument defaults to a container value
    ContainerDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

impl Schema {
    /// Whether `self` (current) can replace `old` for every existing caller
    pub fn is_backward_compatible_with(&self, old: &Schema) -> bool {
        backward_compatibility(self, old).is_compatible
    }

    /// Forward compatibility of `self` (current) with `old`, with a reason on failure
    pub fn check_forward_compatible_with(&self, old: &Schema) -> (bool, String) {
        let result = forward_compatibility(self, old);
        (result.is_compatible, result.summary)
    }
}

/// Full backward-compatibility check of `new` against `old`
pub fn backward_compatibility(new: &Schema, old: &Schema) -> CompatibilityResult {
    let mut changes = Vec::new();
    if !check_header(new, old, &mut changes) {
        return CompatibilityResult::from_changes(changes);
    }
    compare_returns(new, old, &mut changes);

    let old_out = old.first_out_argument();
    let new_out = new.first_out_argument();

    for (i, old_arg) in old.arguments[..old_out].iter().enumerate() {
        match new.arguments.get(i) {
            Some(new_arg) => {
                compare_argument(new_arg, old_arg, Direction::Backward, &arg_path(i), &mut changes)
            }
            None => changes.push(removed(old_arg, i)),
        }
    }

    for (i, new_arg) in new.arguments.iter().enumerate().take(new_out).skip(old_out) {
        if new_arg.default.is_none() {
            changes.push(missing_default(new_arg, i));
        }
    }

    compare_out_arguments(new, old, old_out, new_out, Direction::Backward, &mut changes);
    CompatibilityResult::from_changes(changes)
}

/// Full forward-compatibility check of `new` against `old`
pub fn forward_compatibility(new: &Schema, old: &Schema) -> CompatibilityResult {
    let mut changes = Vec::new();
    if !check_header(new, old, &mut changes) {
        return CompatibilityResult::from_changes(changes);
    }

    let old_out = old.first_out_argument();
    let new_out = new.first_out_argument();

    let old_out_count = old.arguments.len() - old_out;
    let new_out_count = new.arguments.len() - new_out;
    if old_out_count != new_out_count {
        changes.push(SchemaChange::new(
            ChangeType::OutArgumentCountChanged,
            "arguments",
            Some(old_out_count.to_string()),
            Some(new_out_count.to_string()),
            "schema should have the same number of out arguments",
        ));
        return CompatibilityResult::from_changes(changes);
    }

    compare_returns(new, old, &mut changes);

    for (i, old_arg) in old.arguments[..old_out].iter().enumerate() {
        if i < new_out {
            compare_argument(
                &new.arguments[i],
                old_arg,
                Direction::Forward,
                &arg_path(i),
                &mut changes,
            );
        } else {
            changes.push(removed(old_arg, i));
        }
    }

    for (i, new_arg) in new.arguments.iter().enumerate().take(new_out).skip(old_out) {
        match &new_arg.default {
            None => changes.push(missing_default(new_arg, i)),
            Some(default) if default.is_container() => changes.push(SchemaChange::new(
                ChangeType::ContainerDefault,
                arg_path(i),
                None,
                Some(new_arg.to_string()),
                format!(
                    "new argument '{}' of type {} has a container type as its default value",
                    new_arg.name, new_arg.ty
                ),
            )),
            Some(_) => {}
        }
    }

    compare_out_arguments(new, old, old_out, new_out, Direction::Forward, &mut changes);
    CompatibilityResult::from_changes(changes)
}

/// Name, overload, variadic flags and return count must all agree
fn check_header(new: &Schema, old: &Schema, changes: &mut Vec<SchemaChange>) -> bool {
    if new.name != old.name || new.overload_name != old.overload_name {
        changes.push(SchemaChange::new(
            ChangeType::OverloadMismatch,
            "name",
            Some(old.overload_key()),
            Some(new.overload_key()),
            format!("overload {} does not match {}", new.overload_key(), old.overload_key()),
        ));
        return false;
    }
    if new.is_vararg != old.is_vararg || new.is_varret != old.is_varret {
        changes.push(SchemaChange::new(
            ChangeType::VariadicChanged,
            "arguments",
            None,
            None,
            "variadic arguments or returns changed",
        ));
        return false;
    }
    if new.returns.len() != old.returns.len() {
        changes.push(SchemaChange::new(
            ChangeType::ReturnCountChanged,
            "returns",
            Some(old.returns.len().to_string()),
            Some(new.returns.len().to_string()),
            format!(
                "number of returns changed from {} to {}",
                old.returns.len(),
                new.returns.len()
            ),
        ));
        return false;
    }
    true
}

/// Returns are contravariant: a new return must be assignable to the old one
fn compare_returns(new: &Schema, old: &Schema, changes: &mut Vec<SchemaChange>) {
    for (i, (new_ret, old_ret)) in new.returns.iter().zip(&old.returns).enumerate() {
        let path = format!("returns[{}]", i);
        if !compare_identity(new_ret, old_ret, &path, changes) {
            continue;
        }
        if !new_ret.ty.is_subtype_of(&old_ret.ty) {
            changes.push(SchemaChange::new(
                ChangeType::TypeChanged,
                path,
                Some(old_ret.ty.to_string()),
                Some(new_ret.ty.to_string()),
                format!(
                    "return {} is no longer assignable to {}",
                    new_ret.ty, old_ret.ty
                ),
            ));
        }
    }
}

fn compare_out_arguments(
    new: &Schema,
    old: &Schema,
    old_out: usize,
    new_out: usize,
    direction: Direction,
    changes: &mut Vec<SchemaChange>,
) {
    for (offset, old_arg) in old.arguments[old_out..].iter().enumerate() {
        let i = new_out + offset;
        match new.arguments.get(i) {
            Some(new_arg) => compare_argument(new_arg, old_arg, direction, &arg_path(i), changes),
            None => changes.push(removed(old_arg, old_out + offset)),
        }
    }
}

/// Name, fixed length and alias annotation must be identical
fn compare_identity(
    new: &Argument,
    old: &Argument,
    path: &str,
    changes: &mut Vec<SchemaChange>,
) -> bool {
    let before = changes.len();
    if new.name != old.name {
        changes.push(SchemaChange::new(
            ChangeType::ArgumentRenamed,
            path,
            Some(old.name.clone()),
            Some(new.name.clone()),
            format!("'{}' was renamed to '{}'", old.name, new.name),
        ));
    }
    if new.fixed_len != old.fixed_len {
        changes.push(SchemaChange::new(
            ChangeType::FixedLengthChanged,
            path,
            old.fixed_len.map(|n| n.to_string()),
            new.fixed_len.map(|n| n.to_string()),
            format!("'{}' changed its fixed list length", old.name),
        ));
    }
    if new.alias_info != old.alias_info {
        changes.push(SchemaChange::new(
            ChangeType::AliasChanged,
            path,
            old.alias_info.as_ref().map(|a| a.to_string()),
            new.alias_info.as_ref().map(|a| a.to_string()),
            format!("'{}' changed its mutability/alias annotation", old.name),
        ));
    }
    changes.len() == before
}

fn compare_argument(
    new: &Argument,
    old: &Argument,
    direction: Direction,
    path: &str,
    changes: &mut Vec<SchemaChange>,
) {
    if !compare_identity(new, old, path, changes) {
        return;
    }

    if new.kwarg_only && !old.kwarg_only {
        changes.push(SchemaChange::new(
            ChangeType::BecameKeywordOnly,
            path,
            None,
            None,
            format!("'{}' became keyword-only", old.name),
        ));
    }

    // Backward: old callers' values must still be accepted (covariance).
    // Forward: values passed under the new schema must fit the old one.
    let assignable = match direction {
        Direction::Backward => old.ty.is_subtype_of(&new.ty),
        Direction::Forward => new.ty.is_subtype_of(&old.ty),
    };
    if !assignable {
        changes.push(SchemaChange::new(
            ChangeType::TypeChanged,
            path,
            Some(old.ty.to_string()),
            Some(new.ty.to_string()),
            format!("'{}' changed type from {} to {}", old.name, old.ty, new.ty),
        ));
    }

    if let Some(old_default) = &old.default {
        if new.default.as_ref() != Some(old_default) {
            changes.push(SchemaChange::new(
                ChangeType::DefaultChanged,
                path,
                Some(old_default.to_string()),
                new.default.as_ref().map(|d| d.to_string()),
                match &new.default {
                    Some(d) => format!(
                        "'{}' changed its default from {} to {}",
                        old.name, old_default, d
                    ),
                    None => format!("'{}' no longer has a default value", old.name),
                },
            ));
        }
    } else if direction == Direction::Forward {
        if let Some(new_default) = &new.default {
            changes.push(SchemaChange::new(
                ChangeType::DefaultAdded,
                path,
                None,
                Some(new_default.to_string()),
                format!("'{}' gained a default value it did not have before", old.name),
            ));
        }
    }
}

fn arg_path(i: usize) -> String {
    format!("arguments[{}]", i)
}

fn removed(old_arg: &Argument, i: usize) -> SchemaChange {
    SchemaChange::new(
        ChangeType::ArgumentRemoved,
        arg_path(i),
        Some(old_arg.to_string()),
        None,
        format!("argument '{}' was removed", old_arg.name),
    )
}

fn missing_default(new_arg: &Argument, i: usize) -> SchemaChange {
    SchemaChange::new(
        ChangeType::MissingDefault,
        arg_path(i),
        None,
        Some(new_arg.to_string()),
        format!(
            "new argument '{}' of type {} did not provide a default value",
            new_arg.name, new_arg.ty
        ),
    )
}
