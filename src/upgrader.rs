//! Upgrader-aware exemptions
//!
//! Operators whose signature changed but that ship an upgrader (a registered
//! migration for old call sites) are exempt from backward-compatibility
//! failures, provided the exact old signature is one of the historical
//! shapes the upgrader was registered for.
//!
//! The raw map is keyed by overload (`aten::div.Tensor`); it is reshaped once
//! into base name -> overload key -> historical schemas.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::schema::Schema;

/// One historical entry of the raw version map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgraderEntry {
    /// Rendered signature the upgrader migrates from
    pub old_schema: String,
    /// Name of the registered upgrader, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrader_name: Option<String>,
}

/// Raw version map as supplied by the build: overload key -> historical entries
pub type RawVersionMap = BTreeMap<String, Vec<UpgraderEntry>>;

/// Version map indexed by operator base name
#[derive(Debug, Clone, Default)]
pub struct VersionMap {
    operators: BTreeMap<String, BTreeMap<String, Vec<Schema>>>,
}

impl VersionMap {
    /// Reshape a raw version map, parsing every historical schema
    pub fn from_raw(raw: &RawVersionMap) -> Result<Self> {
        let mut operators: BTreeMap<String, BTreeMap<String, Vec<Schema>>> = BTreeMap::new();
        for (key, entries) in raw {
            let base_name = key.split('.').next().unwrap_or(key);
            let schemas = entries
                .iter()
                .map(|entry| {
                    Schema::parse(&entry.old_schema).map_err(|source| SchemaError::VersionMap {
                        key: key.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            operators
                .entry(base_name.to_string())
                .or_default()
                .insert(key.clone(), schemas);
        }
        debug!(operators = operators.len(), "version map indexed");
        Ok(Self { operators })
    }

    /// Parse a raw version map from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawVersionMap = serde_json::from_str(json)?;
        Self::from_raw(&raw)
    }

    /// Load a raw version map from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Historical schemas of every overload of `base_name`
    pub fn history(&self, base_name: &str) -> impl Iterator<Item = &Schema> {
        self.operators
            .get(base_name)
            .into_iter()
            .flat_map(|overloads| overloads.values().flatten())
    }

    /// Whether `old_schema` appears verbatim among its operator's historical shapes
    ///
    /// An upgrader for some other shape of the same operator is not enough.
    pub fn has_valid_upgrader(&self, old_schema: &Schema) -> bool {
        self.history(&old_schema.name).any(|historical| historical == old_schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_map() -> VersionMap {
        VersionMap::from_json(
            r#"{
                "baz.overload1": [{"old_schema": "baz.overload1(Tensor x) -> Tensor"}],
                "aten::div.Tensor": [
                    {"old_schema": "aten::div.Tensor(Tensor self, Tensor other) -> Tensor", "upgrader_name": "div_Tensor_0_3"}
                ],
                "aten::div.Scalar": [
                    {"old_schema": "aten::div.Scalar(Tensor self, Scalar other) -> Tensor"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_historical_schema_is_exempt() {
        let map = version_map();
        let old = Schema::parse("aten::div.Tensor(Tensor self, Tensor other) -> Tensor").unwrap();
        assert!(map.has_valid_upgrader(&old));
    }

    #[test]
    fn test_history_is_flattened_across_overloads() {
        let map = version_map();
        assert_eq!(map.history("aten::div").count(), 2);
        let old = Schema::parse("aten::div.Scalar(Tensor self, Scalar other) -> Tensor").unwrap();
        assert!(map.has_valid_upgrader(&old));
    }

    #[test]
    fn test_other_shapes_are_not_exempt() {
        let map = version_map();
        let old = Schema::parse(
            "aten::div.Tensor(Tensor self, Tensor other, *, str? rounding_mode) -> Tensor",
        )
        .unwrap();
        assert!(!map.has_valid_upgrader(&old));

        let unknown = Schema::parse(
            "aten::mul.Tensor(Tensor self, Tensor other) -> Tensor",
        )
        .unwrap();
        assert!(!map.has_valid_upgrader(&unknown));
    }

    #[test]
    fn test_unparseable_history_is_an_error() {
        let err = VersionMap::from_json(
            r#"{"aten::x": [{"old_schema": "not a schema"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::VersionMap { key, .. } if key == "aten::x"));
    }
}
