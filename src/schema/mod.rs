//! Operator schema types and structures
//!
//! A [`Schema`] is the structural description of one operator overload:
//! its namespace-qualified name, overload name, ordered arguments and
//! ordered returns. Schemas are parsed from and rendered to the canonical
//! signature form, e.g.
//!
//! ```text
//! aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor
//! ```
//!
//! Equality is structural: two schemas are equal iff every field of every
//! argument and return matches.

mod parse;
mod render;
pub mod types;

use serde::{Serialize, Serializer};
use std::str::FromStr;

use crate::error::ParseError;
pub use types::TypeKind;

/// One operator signature
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Base operator name, namespace-qualified (e.g. "aten::add")
    pub name: String,
    /// Overload disambiguator; empty for the default overload
    pub overload_name: String,
    /// Ordered arguments
    pub arguments: Vec<Argument>,
    /// Ordered return values
    pub returns: Vec<Argument>,
    /// Accepts trailing variadic arguments (`...`)
    pub is_vararg: bool,
    /// Returns a variadic list (`-> ...`)
    pub is_varret: bool,
}

impl Schema {
    /// Parse a schema from its canonical textual form
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse::parse_schema(text)
    }

    /// Fully qualified overload key (`name.overload`, or `name` for the default overload)
    pub fn overload_key(&self) -> String {
        if self.overload_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.overload_name)
        }
    }

    /// Index of the first out argument, or `arguments.len()` when there is none
    pub fn first_out_argument(&self) -> usize {
        self.arguments
            .iter()
            .position(Argument::is_out)
            .unwrap_or(self.arguments.len())
    }
}

impl FromStr for Schema {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schema::parse(s)
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An argument or return value of a schema
///
/// Unnamed returns carry an empty `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub ty: TypeKind,
    /// Fixed list length, as in `int[2]`
    pub fixed_len: Option<usize>,
    pub default: Option<DefaultValue>,
    pub kwarg_only: bool,
    pub alias_info: Option<AliasInfo>,
}

impl Argument {
    /// Keyword-only and written to: the `out=` convention
    pub fn is_out(&self) -> bool {
        self.kwarg_only && self.alias_info.as_ref().is_some_and(|a| a.is_write)
    }
}

/// Mutability/aliasing annotation, e.g. `(a!)` or `(a -> *)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasInfo {
    /// Alias sets before the call; `*` is the wildcard set
    pub before_sets: Vec<String>,
    /// Alias sets after the call; equal to `before_sets` unless written with `->`
    pub after_sets: Vec<String>,
    pub is_write: bool,
    /// Annotations on contained elements, as in `Tensor(a)[]`
    pub contained: Vec<AliasInfo>,
}

impl AliasInfo {
    /// Whether this annotation carries sets of its own (as opposed to only contained ones)
    pub fn has_sets(&self) -> bool {
        !self.before_sets.is_empty() || !self.after_sets.is_empty() || self.is_write
    }
}

/// Default value of an argument
#[derive(Debug, Clone)]
pub enum DefaultValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<DefaultValue>),
    /// Bare identifier such as `contiguous_format` or `Mean`
    Ident(String),
}

impl DefaultValue {
    pub fn is_container(&self) -> bool {
        matches!(self, DefaultValue::List(_))
    }
}

// Floats compare bitwise so that NaN defaults still make equality reflexive.
impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::None, DefaultValue::None) => true,
            (DefaultValue::Bool(a), DefaultValue::Bool(b)) => a == b,
            (DefaultValue::Int(a), DefaultValue::Int(b)) => a == b,
            (DefaultValue::Float(a), DefaultValue::Float(b)) => {
                a.to_bits() == b.to_bits() || a == b
            }
            (DefaultValue::Str(a), DefaultValue::Str(b)) => a == b,
            (DefaultValue::List(a), DefaultValue::List(b)) => a == b,
            (DefaultValue::Ident(a), DefaultValue::Ident(b)) => a == b,
            _ => false,
        }
    }
}
