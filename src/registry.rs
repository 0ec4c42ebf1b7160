//! Current schema registry
//!
//! Holds the operator schemas registered by the current build (operators
//! first, then custom-class methods), indexed by base name. Within a base
//! name, overloads keep their declaration order so candidate matching is
//! deterministic.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::schema::Schema;

/// The current snapshot of registered schemas
#[derive(Debug, Clone, Default)]
pub struct CurrentSchemas {
    /// Base name -> overloads in declaration order
    by_name: HashMap<String, Vec<Schema>>,
    /// Base names in first-seen order
    names: Vec<String>,
    len: usize,
}

impl CurrentSchemas {
    /// Index a sequence of schemas
    ///
    /// `(name, overload)` pairs must be unique.
    pub fn from_schemas(schemas: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let mut registry = Self::default();
        let mut seen = HashSet::new();
        for schema in schemas {
            if !seen.insert(schema.overload_key()) {
                return Err(SchemaError::DuplicateSchema(schema.overload_key()));
            }
            if !registry.by_name.contains_key(&schema.name) {
                registry.names.push(schema.name.clone());
            }
            registry
                .by_name
                .entry(schema.name.clone())
                .or_default()
                .push(schema);
            registry.len += 1;
        }
        debug!(schemas = registry.len, operators = registry.names.len(), "current schemas indexed");
        Ok(registry)
    }

    /// Load schemas from snapshot files (one signature per line)
    ///
    /// Files are read in order; blank lines are ignored.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut schemas = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)?;
            for (lineno, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let schema = Schema::parse(line).map_err(|source| SchemaError::ParseFile {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    source,
                })?;
                schemas.push(schema);
            }
        }
        Self::from_schemas(schemas)
    }

    /// All overloads sharing `name`, in declaration order
    pub fn candidates(&self, name: &str) -> &[Schema] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Base names, in first-seen order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Total number of schemas
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
