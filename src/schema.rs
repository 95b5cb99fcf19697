//! Attribute Schemas
//!
//! An [`AttributeSchema`] maps the outbound attribute paths of one resource
//! type to backend fields and their value types. Entries are tiered:
//!
//! - **operational**: identifiers and `meta` bookkeeping
//! - **minimal**: operational plus the natural key (e.g. `userName`)
//! - **permitted**: minimal plus the filterable and sortable business attributes
//!
//! Filter and sort translation consult the permitted tier, which contains
//! every entry. Schemas are built once at startup and shared read-only through
//! a [`SchemaRegistry`].

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{error::SchemaError, path::Path};

/// Core User schema URI
pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// Core Group schema URI
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// Enterprise User extension URI
pub const SCHEMA_ENTERPRISE_USER: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

/// Governance extension carrying account risk and credential state
pub const SCHEMA_GOVERNANCE_USER: &str = "urn:ietf:params:scim:schemas:extension:governance:2.0:User";

/// Value type of a backend field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Text,
    Integer,
    Real,
    Boolean,
    Timestamp,
}

impl TypeTag {
    /// Whether `gt`/`ge`/`lt`/`le` make sense for this type.
    pub fn is_ordered(self) -> bool {
        !matches!(self, TypeTag::Boolean)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeTag::Text => "TEXT",
            TypeTag::Integer => "INTEGER",
            TypeTag::Real => "REAL",
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Timestamp => "TIMESTAMP",
        };
        f.write_str(s)
    }
}

/// Visibility tier of a schema entry. Ordered from narrowest to widest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Operational,
    Minimal,
    #[default]
    Permitted,
}

/// Where an attribute lives in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub backend_field: String,
    pub type_tag: TypeTag,
    pub tier: Tier,
}

/// Attribute-to-field mapping for one resource type.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    resource_type: String,
    attributes: BTreeMap<Path, FieldMapping>,
}

impl AttributeSchema {
    pub fn builder(resource_type: impl Into<String>) -> AttributeSchemaBuilder {
        AttributeSchemaBuilder {
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
            error: None,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Look up a path in the permitted tier.
    pub fn lookup(&self, path: &Path) -> Option<&FieldMapping> {
        self.attributes.get(path)
    }

    /// Entries in the operational tier.
    pub fn operational(&self) -> impl Iterator<Item = (&Path, &FieldMapping)> {
        self.tier(Tier::Operational)
    }

    /// Entries in the minimal tier (operational plus natural key).
    pub fn minimal(&self) -> impl Iterator<Item = (&Path, &FieldMapping)> {
        self.tier(Tier::Minimal)
    }

    /// Every entry.
    pub fn permitted(&self) -> impl Iterator<Item = (&Path, &FieldMapping)> {
        self.attributes.iter()
    }

    fn tier(&self, tier: Tier) -> impl Iterator<Item = (&Path, &FieldMapping)> {
        self.attributes.iter().filter(move |(_, m)| m.tier <= tier)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Collects schema entries. The first malformed or duplicate path is
/// reported by [`AttributeSchemaBuilder::build`].
#[derive(Debug)]
pub struct AttributeSchemaBuilder {
    resource_type: String,
    attributes: BTreeMap<Path, FieldMapping>,
    error: Option<SchemaError>,
}

impl AttributeSchemaBuilder {
    pub fn operational(self, path: &str, field: &str, type_tag: TypeTag) -> Self {
        self.attribute(path, field, type_tag, Tier::Operational)
    }

    pub fn natural_key(self, path: &str, field: &str, type_tag: TypeTag) -> Self {
        self.attribute(path, field, type_tag, Tier::Minimal)
    }

    pub fn permitted(self, path: &str, field: &str, type_tag: TypeTag) -> Self {
        self.attribute(path, field, type_tag, Tier::Permitted)
    }

    pub fn attribute(mut self, path: &str, field: &str, type_tag: TypeTag, tier: Tier) -> Self {
        if self.error.is_some() {
            return self;
        }

        let parsed = match Path::parse(path) {
            Ok(parsed) if parsed.value_filter().is_some() || parsed.is_root() => {
                self.error = Some(SchemaError::MalformedPath {
                    resource_type: self.resource_type.clone(),
                    source: crate::error::MalformedPathError::new(
                        path,
                        "schema entries must name a plain attribute",
                    ),
                });
                return self;
            }
            Ok(parsed) => parsed,
            Err(source) => {
                self.error = Some(SchemaError::MalformedPath {
                    resource_type: self.resource_type.clone(),
                    source,
                });
                return self;
            }
        };

        if self.attributes.contains_key(&parsed) {
            self.error = Some(SchemaError::DuplicatePath {
                resource_type: self.resource_type.clone(),
                path: path.to_string(),
            });
            return self;
        }

        self.attributes.insert(
            parsed,
            FieldMapping {
                backend_field: field.to_string(),
                type_tag,
                tier,
            },
        );
        self
    }

    pub fn build(self) -> Result<AttributeSchema, SchemaError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(AttributeSchema {
            resource_type: self.resource_type,
            attributes: self.attributes,
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Schemas keyed case-insensitively by resource type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<AttributeSchema>>,
}

/// Process-wide registry of the builtin schemas.
static BUILTIN: Lazy<Result<SchemaRegistry, SchemaError>> = Lazy::new(SchemaRegistry::builtin);

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin `User` and `Group` schemas.
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register(builtin_user()?);
        registry.register(builtin_group()?);
        Ok(registry)
    }

    /// The shared builtin registry, built on first use.
    pub fn shared() -> Result<&'static SchemaRegistry, &'static SchemaError> {
        BUILTIN.as_ref()
    }

    /// Add a schema, replacing any schema for the same resource type.
    pub fn register(&mut self, schema: AttributeSchema) -> Option<Arc<AttributeSchema>> {
        let key = schema.resource_type().to_ascii_lowercase();
        let replaced = self.schemas.insert(key, Arc::new(schema));
        if let Some(previous) = &replaced {
            tracing::debug!(
                resource_type = previous.resource_type(),
                "Replaced attribute schema"
            );
        }
        replaced
    }

    pub fn get(&self, resource_type: &str) -> Option<&Arc<AttributeSchema>> {
        self.schemas.get(&resource_type.to_ascii_lowercase())
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.values().map(|s| s.resource_type())
    }
}

fn builtin_user() -> Result<AttributeSchema, SchemaError> {
    let enterprise = |attr: &str| format!("{}:{}", SCHEMA_ENTERPRISE_USER, attr);
    let governance = |attr: &str| format!("{}:{}", SCHEMA_GOVERNANCE_USER, attr);

    AttributeSchema::builder("User")
        .operational("id", "usr_key", TypeTag::Text)
        .operational("meta.created", "usr_create", TypeTag::Timestamp)
        .operational("meta.lastModified", "usr_update", TypeTag::Timestamp)
        .operational("meta.version", "usr_row_ver", TypeTag::Integer)
        .natural_key("userName", "usr_login", TypeTag::Text)
        .permitted("externalId", "usr_external_id", TypeTag::Text)
        .permitted("displayName", "usr_display_name", TypeTag::Text)
        .permitted("name.givenName", "usr_first_name", TypeTag::Text)
        .permitted("name.familyName", "usr_last_name", TypeTag::Text)
        .permitted("name.formatted", "usr_full_name", TypeTag::Text)
        .permitted("emails", "usr_email", TypeTag::Text)
        .permitted("emails.value", "usr_email", TypeTag::Text)
        .permitted("active", "usr_active", TypeTag::Boolean)
        .permitted("title", "usr_title", TypeTag::Text)
        .permitted("userType", "usr_emp_type", TypeTag::Text)
        .permitted(&enterprise("employeeNumber"), "usr_emp_no", TypeTag::Text)
        .permitted(&enterprise("department"), "usr_dept_no", TypeTag::Text)
        .permitted(&enterprise("manager.value"), "usr_manager_key", TypeTag::Text)
        .permitted(&governance("failedLoginAttempts"), "usr_login_attempts_ctr", TypeTag::Integer)
        .permitted(&governance("riskScore"), "usr_risk_score", TypeTag::Real)
        .permitted(&governance("passwordExpiresAt"), "usr_pwd_expire_date", TypeTag::Timestamp)
        .build()
}

fn builtin_group() -> Result<AttributeSchema, SchemaError> {
    AttributeSchema::builder("Group")
        .operational("id", "ugp_key", TypeTag::Text)
        .operational("meta.created", "ugp_create", TypeTag::Timestamp)
        .operational("meta.lastModified", "ugp_update", TypeTag::Timestamp)
        .operational("meta.version", "ugp_row_ver", TypeTag::Integer)
        .natural_key("displayName", "ugp_name", TypeTag::Text)
        .permitted("externalId", "ugp_external_id", TypeTag::Text)
        .permitted("description", "ugp_description", TypeTag::Text)
        .build()
}

/// Parse an instant: RFC 3339, or an ISO-8601 date-time without offset or a
/// bare date, both read as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
