//! Attribute-path filter and projection engine.
//!
//! Clients of a SCIM-style resource API address data with attribute paths
//! (`name.givenName`, `urn:...:enterprise:2.0:User:manager.value`) and query
//! it with filter expressions (`emails[type eq "work"] and active eq true`).
//! This crate provides:
//!
//! - [`path::Path`]: the attribute path model
//! - [`parse_filter`]: filter text to a [`Filter`] tree
//! - [`translate`]: a filter to a backend predicate over a resource type's
//!   [`AttributeSchema`], or `NotTranslatable` when some attribute has no
//!   backend field
//! - [`evaluate`]: a filter against an in-memory JSON document
//! - [`trim`]: a JSON document reduced to the requested attributes
//! - [`query`]: list request parameters, pagination and the pushdown or
//!   in-memory search plan
//!
//! ```
//! use attrpath::{SchemaRegistry, Translation, parse_filter, translate};
//!
//! let registry = SchemaRegistry::builtin().unwrap();
//! let user = registry.get("User").unwrap();
//!
//! let filter = parse_filter(r#"userName eq "bjensen" and active eq true"#).unwrap();
//! assert!(matches!(translate(&filter, user).unwrap(), Translation::Translated(_)));
//! ```

pub mod config;
pub mod error;
pub mod evaluate;
pub mod filter;
#[cfg(feature = "cli")]
pub mod observability;
pub mod path;
pub mod projection;
pub mod query;
pub mod schema;
pub mod translate;

#[cfg(test)]
mod tests;

pub use error::{
    EngineError, EngineResult, ErrorResponse, FilterSyntaxError, InvalidLiteralError,
    MalformedPathError, SchemaError,
};
pub use evaluate::{Evaluator, evaluate};
pub use filter::{Comparison, ComparisonKind, Filter, FilterVisitor, Literal, parse_filter};
pub use path::Path;
pub use projection::{ProjectionSpec, trim};
pub use schema::{AttributeSchema, FieldMapping, SchemaRegistry, Tier, TypeTag};
pub use translate::{BackendFilter, BackendOperator, BackendValue, Translation, translate};
