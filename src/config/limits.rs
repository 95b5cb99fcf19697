use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::{
    filter::{MAX_FILTER_DEPTH, MAX_FILTER_LENGTH, ParserLimits},
    query::{DEFAULT_COUNT, MAX_COUNT},
};

/// Bounds on filter expressions accepted from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum filter length in bytes. Default: 4096.
    #[serde(default = "default_max_filter_length")]
    pub max_filter_length: usize,

    /// Maximum nesting depth of parentheses, `not` and value filters.
    /// Default: 32.
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_filter_length: default_max_filter_length(),
            max_filter_depth: default_max_filter_depth(),
        }
    }
}

impl LimitsConfig {
    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_length: self.max_filter_length,
            max_depth: self.max_filter_depth,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_filter_length == 0 {
            return Err(ConfigError::Validation(
                "limits.max_filter_length must be greater than 0".into(),
            ));
        }
        if self.max_filter_depth == 0 {
            return Err(ConfigError::Validation(
                "limits.max_filter_depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_filter_length() -> usize {
    MAX_FILTER_LENGTH
}

fn default_max_filter_depth() -> usize {
    MAX_FILTER_DEPTH
}

/// Page size defaults for list requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PagingConfig {
    /// Page size when a request names none. Default: 100.
    #[serde(default = "default_count")]
    pub default_count: u64,

    /// Largest page size a request may ask for. Default: 200.
    #[serde(default = "default_max_count")]
    pub max_count: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
        }
    }
}

impl PagingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_count == 0 {
            return Err(ConfigError::Validation(
                "paging.max_count must be greater than 0".into(),
            ));
        }
        if self.default_count > self.max_count {
            return Err(ConfigError::Validation(format!(
                "paging.default_count ({}) exceeds paging.max_count ({})",
                self.default_count, self.max_count
            )));
        }
        Ok(())
    }
}

fn default_count() -> u64 {
    DEFAULT_COUNT
}

fn default_max_count() -> u64 {
    MAX_COUNT
}
