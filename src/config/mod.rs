//! Configuration for the filter engine.
//!
//! The engine is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Every section is
//! optional.
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [limits]
//! max_filter_length = 2048
//!
//! [paging]
//! max_count = 500
//!
//! [schemas.Device.attributes]
//! id = { field = "dev_key", type = "text", tier = "operational" }
//! serialNumber = { field = "${SERIAL_COLUMN}", type = "text", tier = "minimal" }
//! ```

mod limits;
mod logging;
mod schemas;

use std::{collections::BTreeMap, path::Path};

pub use limits::*;
pub use logging::*;
use once_cell::sync::Lazy;
use regex::Regex;
pub use schemas::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::SchemaError,
    query::QueryLimits,
    schema::SchemaRegistry,
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Log output of the command-line tool.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Filter parser bounds.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// List request page sizes.
    #[serde(default)]
    pub paging: PagingConfig,

    /// Additional attribute schemas by resource type. A schema named like a
    /// builtin one (`User`, `Group`) replaces it.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaConfig>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: EngineConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        self.paging.validate()?;

        for (resource_type, schema) in &self.schemas {
            if schema.attributes.is_empty() {
                tracing::warn!(resource_type, "Schema declares no attributes");
            }
            schema.build(resource_type)?;
        }

        Ok(())
    }

    /// The builtin schemas merged with the ones declared here.
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let mut registry = SchemaRegistry::builtin()?;
        for (resource_type, schema) in &self.schemas {
            if registry.register(schema.build(resource_type)?).is_some() {
                tracing::warn!(resource_type, "Configured schema replaces builtin schema");
            }
        }
        Ok(registry)
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            parser: self.limits.parser_limits(),
            default_count: self.paging.default_count,
            max_count: self.paging.max_count,
        }
    }

    /// Generate the JSON schema for the configuration file.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    /// Generate the JSON schema as a pretty-printed JSON string.
    #[cfg(feature = "json-schema")]
    pub fn json_schema_string() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Invalid schema declaration: {0}")]
    Schema(#[from] SchemaError),
}

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Expand `${VAR}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        let (code, comment) = line.split_at(line.find('#').unwrap_or(line.len()));

        let mut copied = 0;
        for reference in ENV_VAR.captures_iter(code) {
            let (Some(whole), Some(name)) = (reference.get(0), reference.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::EnvVarNotFound(name.as_str().to_string()))?;

            expanded.push_str(&code[copied..whole.start()]);
            expanded.push_str(&value);
            copied = whole.end();
        }

        expanded.push_str(&code[copied..]);
        expanded.push_str(comment);
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{
        path::Path as AttrPath,
        schema::{Tier, TypeTag},
    };

    #[test]
    fn test_empty_config() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.query_limits(), QueryLimits::default());
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_str(
            r#"
            [logging]
            level = "debug"
            format = "json"
            timestamps = false
            filter = "attrpath::translate=trace"

            [limits]
            max_filter_length = 1024
            max_filter_depth = 8

            [paging]
            default_count = 25
            max_count = 50

            [schemas.Device.attributes]
            id = { field = "dev_key", type = "text", tier = "operational" }
            "meta.lastModified" = { field = "dev_update", type = "timestamp", tier = "operational" }
            serialNumber = { field = "dev_serial", type = "text", tier = "minimal" }
            batteryLevel = { field = "dev_battery", type = "real" }
        "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.logging.timestamps);

        let limits = config.query_limits();
        assert_eq!(limits.parser.max_length, 1024);
        assert_eq!(limits.parser.max_depth, 8);
        assert_eq!(limits.default_count, 25);
        assert_eq!(limits.max_count, 50);

        let registry = config.registry().unwrap();
        let device = registry.get("device").unwrap();
        assert_eq!(device.len(), 4);
        assert_eq!(device.minimal().count(), 3);

        let battery = device
            .lookup(&AttrPath::parse("batteryLevel").unwrap())
            .unwrap();
        assert_eq!(battery.type_tag, TypeTag::Real);
        assert_eq!(battery.tier, Tier::Permitted);

        // Builtins are still there
        assert!(registry.get("User").is_some());
    }

    #[test]
    fn test_configured_schema_replaces_builtin() {
        let config = EngineConfig::from_str(
            r#"
            [schemas.User.attributes]
            userName = { field = "login", type = "text", tier = "minimal" }
        "#,
        )
        .unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.get("User").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_str("[limits]\nmax_filter_size = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = EngineConfig::from_str("[server]\nport = 8080").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = EngineConfig::from_str(
            r#"
            [schemas.Device.attributes]
            id = { field = "dev_key", type = "uuid" }
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors() {
        let err = EngineConfig::from_str("[limits]\nmax_filter_depth = 0").unwrap_err();
        assert!(err.to_string().contains("max_filter_depth"));

        let err = EngineConfig::from_str("[paging]\ndefault_count = 300\nmax_count = 200")
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_schema_errors_surface_at_load() {
        let err = EngineConfig::from_str(
            r#"
            [schemas.Device.attributes]
            "serial..number" = { field = "dev_serial", type = "text" }
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema(SchemaError::MalformedPath { .. })));

        let err = EngineConfig::from_str(
            r#"
            [schemas.Device.attributes]
            serial = { field = "dev_serial", type = "text" }
            SERIAL = { field = "dev_serial", type = "text" }
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema(SchemaError::DuplicatePath { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[paging]\nmax_count = 20\ndefault_count = 10").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.paging.max_count, 20);

        let err = EngineConfig::from_file("/nonexistent/attrpath.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_config_with_env_var() {
        temp_env::with_var("ATTRPATH_TEST_SERIAL_FIELD", Some("dev_serial_no"), || {
            let config = EngineConfig::from_str(
                r#"
                [schemas.Device.attributes]
                serial = { field = "${ATTRPATH_TEST_SERIAL_FIELD}", type = "text" }
            "#,
            )
            .unwrap();
            let registry = config.registry().unwrap();
            let device = registry.get("Device").unwrap();
            let serial = device.lookup(&AttrPath::parse("serial").unwrap()).unwrap();
            assert_eq!(serial.backend_field, "dev_serial_no");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("ATTRPATH_TEST_MISSING", || {
            let err = EngineConfig::from_str("[logging]\nfilter = \"${ATTRPATH_TEST_MISSING}\"")
                .unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(ref name) if name == "ATTRPATH_TEST_MISSING"));
        });
    }

    #[test]
    fn test_env_var_expansion_keeps_line_layout() {
        temp_env::with_var("ATTRPATH_TEST_LOG_FILTER", Some("attrpath::evaluate=trace"), || {
            let input = "[logging]\r\nfilter = \"${ATTRPATH_TEST_LOG_FILTER}\"\n";
            let expanded = expand_env_vars(input).unwrap();
            assert_eq!(
                expanded,
                "[logging]\r\nfilter = \"attrpath::evaluate=trace\"\n"
            );

            let config = EngineConfig::from_str(input).unwrap();
            assert_eq!(
                config.logging.filter.as_deref(),
                Some("attrpath::evaluate=trace")
            );
        });
    }

    #[test]
    fn test_commented_out_schema_line_not_expanded() {
        temp_env::with_var_unset("ATTRPATH_TEST_UNSET_FIELD", || {
            let config = EngineConfig::from_str(
                r#"
                [schemas.Device.attributes]
                serial = { field = "dev_serial", type = "text" }
                # owner = { field = "${ATTRPATH_TEST_UNSET_FIELD}", type = "text" }
            "#,
            )
            .unwrap();
            let registry = config.registry().unwrap();
            assert_eq!(registry.get("Device").unwrap().len(), 1);
        });
    }

    #[test]
    fn test_trailing_comment_not_expanded() {
        temp_env::with_vars(
            [
                ("ATTRPATH_TEST_DEPTH", Some("8")),
                ("ATTRPATH_TEST_UNSET_NOTE", None::<&str>),
            ],
            || {
                let input = "max_filter_depth = ${ATTRPATH_TEST_DEPTH} # was ${ATTRPATH_TEST_UNSET_NOTE}";
                assert_eq!(
                    expand_env_vars(input).unwrap(),
                    "max_filter_depth = 8 # was ${ATTRPATH_TEST_UNSET_NOTE}"
                );

                let config = EngineConfig::from_str(&format!("[limits]\n{}", input)).unwrap();
                assert_eq!(config.limits.max_filter_depth, 8);
            },
        );
    }

    #[test]
    fn test_several_references_on_one_line() {
        temp_env::with_vars(
            [
                ("ATTRPATH_TEST_TABLE", Some("dev")),
                ("ATTRPATH_TEST_COLUMN", Some("serial")),
            ],
            || {
                let config = EngineConfig::from_str(
                    r#"
                    [schemas.Device.attributes]
                    serial = { field = "${ATTRPATH_TEST_TABLE}_${ATTRPATH_TEST_COLUMN}", type = "text" }
                "#,
                )
                .unwrap();
                let registry = config.registry().unwrap();
                let serial = registry
                    .get("Device")
                    .unwrap()
                    .lookup(&AttrPath::parse("serial").unwrap())
                    .unwrap();
                assert_eq!(serial.backend_field, "dev_serial");
            },
        );
    }
}
