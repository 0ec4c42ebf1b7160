//! Configuration management for the compatibility checker
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (compat.toml)
//! - Environment variables (COMPAT__*)
//!
//! The allowlist and don't-parse tables are compiled in and are not
//! configurable here.
//!
//! ## Example config file (compat.toml):
//! ```toml
//! [inputs]
//! existing_schemas = "test/forward_backward_compatibility/schemas.txt"
//! current_schemas = "build/current_schemas.txt"
//! custom_class_schemas = "build/custom_class_schemas.txt"
//! version_map = "build/version_map.json"
//!
//! [report]
//! format = "text"
//! show_candidate_diffs = true
//! suggest_similar_names = true
//! trace_schemas = true
//!
//! [policy]
//! today = "2024-01-01"
//! ```

use chrono::NaiveDate;
use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the checker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatConfig {
    /// Input locations
    #[serde(default)]
    pub inputs: InputsConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Exemption policy settings
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Input locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Snapshot of previously published schemas
    #[serde(default = "default_existing_schemas")]
    pub existing_schemas: PathBuf,

    /// Schemas registered by the current build
    #[serde(default = "default_current_schemas")]
    pub current_schemas: PathBuf,

    /// Custom-class method schemas of the current build
    #[serde(default)]
    pub custom_class_schemas: Option<PathBuf>,

    /// Raw upgrader version map (JSON)
    #[serde(default)]
    pub version_map: Option<PathBuf>,
}

/// Report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format (text or json)
    #[serde(default)]
    pub format: OutputFormat,

    /// Show a word diff between broken schemas and their candidates
    #[serde(default = "default_true")]
    pub show_candidate_diffs: bool,

    /// Suggest similarly named operators when a schema has no candidates
    #[serde(default = "default_true")]
    pub suggest_similar_names: bool,

    /// List every checked schema with its outcome
    #[serde(default = "default_true")]
    pub trace_schemas: bool,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Exemption policy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Date exemption expiry is evaluated against (default: the local date)
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

// Default value functions
fn default_existing_schemas() -> PathBuf {
    PathBuf::from("schemas.txt")
}

fn default_current_schemas() -> PathBuf {
    PathBuf::from("current_schemas.txt")
}

fn default_true() -> bool {
    true
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            existing_schemas: default_existing_schemas(),
            current_schemas: default_current_schemas(),
            custom_class_schemas: None,
            version_map: None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            show_candidate_diffs: true,
            suggest_similar_names: true,
            trace_schemas: true,
        }
    }
}

impl CompatConfig {
    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["compat.toml", ".compat.toml", "config/compat.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) =
            directories::ProjectDirs::from("dev", "familiar", "schema-compat")
        {
            let xdg_config = config_dir.config_dir().join("compat.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // COMPAT__POLICY__TODAY=2024-01-01
        builder = builder.add_source(
            Environment::with_prefix("COMPAT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The date exemption tables are compiled against
    pub fn today(&self) -> NaiveDate {
        self.policy
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Current snapshot files: operators, then custom classes
    pub fn current_schema_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.inputs.current_schemas.clone()];
        paths.extend(self.inputs.custom_class_schemas.clone());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CompatConfig::default();
        assert_eq!(config.inputs.existing_schemas, PathBuf::from("schemas.txt"));
        assert_eq!(config.report.format, OutputFormat::Text);
        assert!(config.report.show_candidate_diffs);
        assert!(config.policy.today.is_none());
        assert_eq!(config.current_schema_paths().len(), 1);
    }

    #[test]
    fn test_serialize_config() {
        let config = CompatConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[inputs]"));
        assert!(toml_str.contains("[report]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[inputs]\ncustom_class_schemas = \"classes.txt\"\n\n[report]\nformat = \"json\"\n\n[policy]\ntoday = \"2022-03-01\""
        )
        .unwrap();

        let config = CompatConfig::load_from(file.path().to_str()).unwrap();
        assert_eq!(config.report.format, OutputFormat::Json);
        assert_eq!(config.today(), NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
        assert_eq!(
            config.current_schema_paths(),
            vec![PathBuf::from("current_schemas.txt"), PathBuf::from("classes.txt")]
        );
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.toml");

        let mut config = CompatConfig::default();
        config.inputs.version_map = Some(PathBuf::from("version_map.json"));
        config.report.trace_schemas = false;
        config.policy.today = NaiveDate::from_ymd_opt(2022, 1, 15);
        config.save(&path).unwrap();

        let loaded = CompatConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.inputs.version_map, Some(PathBuf::from("version_map.json")));
        assert!(!loaded.report.trace_schemas);
        assert_eq!(loaded.today(), NaiveDate::from_ymd_opt(2022, 1, 15).unwrap());
    }
}
