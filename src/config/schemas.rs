use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::SchemaError,
    schema::{AttributeSchema, Tier, TypeTag},
};

/// Attribute declarations for one resource type.
///
/// ```toml
/// [schemas.Device.attributes]
/// id = { field = "dev_key", type = "text", tier = "operational" }
/// "meta.lastModified" = { field = "dev_update", type = "timestamp", tier = "operational" }
/// serialNumber = { field = "dev_serial", type = "text", tier = "minimal" }
/// assignedTo = { field = "usr_key", type = "text" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Attribute path to backend field.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    /// Backend field name.
    pub field: String,

    /// Value type of the field.
    #[serde(rename = "type")]
    pub type_tag: TypeTag,

    /// Visibility tier. Default: permitted.
    #[serde(default)]
    pub tier: Tier,
}

impl SchemaConfig {
    pub fn build(&self, resource_type: &str) -> Result<AttributeSchema, SchemaError> {
        self.attributes
            .iter()
            .fold(AttributeSchema::builder(resource_type), |builder, (path, attr)| {
                builder.attribute(path, &attr.field, attr.type_tag, attr.tier)
            })
            .build()
    }
}
