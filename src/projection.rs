//! Attribute projection.
//!
//! [`trim`] prunes a JSON resource down to the attributes a client asked for
//! (`attributes`) or away from the ones it asked to drop
//! (`excludedAttributes`). A path is matched by a requested path when:
//!
//! 1. they are equal, or
//! 2. in inclusion mode only, the requested path lies below it (so the
//!    containers leading to a requested attribute survive), or
//! 3. an ancestor of it was requested (so a requested container keeps its
//!    children).
//!
//! Objects recurse with the extended path, arrays with the same path. Empty
//! containers left behind are omitted; the root itself is always kept.
//! Top-level keys that are schema URNs hold extension attributes, whose paths
//! carry the URN as namespace.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::{
    error::MalformedPathError,
    path::{Path, is_urn},
};

/// Which attributes a projection keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    paths: BTreeSet<Path>,
    excluded: bool,
    always: BTreeSet<Path>,
}

impl ProjectionSpec {
    /// Keeps everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keeps only `paths` (everything if empty).
    pub fn include(paths: impl IntoIterator<Item = Path>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            excluded: false,
            always: BTreeSet::new(),
        }
    }

    /// Keeps everything except `paths`.
    pub fn exclude(paths: impl IntoIterator<Item = Path>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            excluded: true,
            always: BTreeSet::new(),
        }
    }

    /// Paths returned regardless of the requested projection.
    pub fn with_always_returned(mut self, paths: impl IntoIterator<Item = Path>) -> Self {
        self.always.extend(paths);
        self
    }

    /// Build from the comma-separated `attributes` and `excludedAttributes`
    /// parameters. When both are given, `attributes` wins.
    pub fn from_lists(
        attributes: Option<&str>,
        excluded_attributes: Option<&str>,
    ) -> Result<Self, MalformedPathError> {
        let attributes = parse_list(attributes)?;
        if !attributes.is_empty() {
            return Ok(Self::include(attributes));
        }
        let excluded = parse_list(excluded_attributes)?;
        if !excluded.is_empty() {
            return Ok(Self::exclude(excluded));
        }
        Ok(Self::all())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Whether the attribute at `path` survives the projection.
    pub fn returned(&self, path: &Path) -> bool {
        if matches(&self.always, path, true) {
            return true;
        }
        if self.excluded {
            !matches(&self.paths, path, false)
        } else {
            self.paths.is_empty() || matches(&self.paths, path, true)
        }
    }
}

fn parse_list(list: Option<&str>) -> Result<Vec<Path>, MalformedPathError> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(Path::parse)
        .collect()
}

fn matches(paths: &BTreeSet<Path>, path: &Path, inclusion: bool) -> bool {
    if paths.contains(path) {
        return true;
    }
    if inclusion && paths.iter().any(|requested| path.is_ancestor_of(requested)) {
        return true;
    }
    (1..path.size()).any(|n| paths.contains(&path.sub(n)))
}

/// Apply `spec` to `document`.
pub fn trim(document: &Value, spec: &ProjectionSpec) -> Value {
    let root = Path::root();
    match document {
        Value::Object(map) => Value::Object(trim_object(map, &root, spec)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| prune(item, &root, spec))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

fn trim_object(map: &Map<String, Value>, path: &Path, spec: &ProjectionSpec) -> Map<String, Value> {
    let mut trimmed = Map::new();
    for (key, child) in map {
        let kept = if path.is_root() && is_urn(key) {
            prune_extension(key, child, spec)
        } else {
            prune(child, &path.path(key.as_str()), spec)
        };
        if let Some(value) = kept {
            trimmed.insert(key.clone(), value);
        }
    }
    trimmed
}

fn prune(value: &Value, path: &Path, spec: &ProjectionSpec) -> Option<Value> {
    if !path.is_root() && !spec.returned(path) {
        return None;
    }

    match value {
        Value::Object(map) => {
            let trimmed = trim_object(map, path, spec);
            (!trimmed.is_empty()).then_some(Value::Object(trimmed))
        }
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .iter()
                .filter_map(|item| prune(item, path, spec))
                .collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        scalar => Some(scalar.clone()),
    }
}

/// A top-level extension container. Naming the container itself selects or
/// drops it whole; otherwise each child is projected under the URN namespace.
fn prune_extension(urn: &str, value: &Value, spec: &ProjectionSpec) -> Option<Value> {
    let container = Path::parse_segments(urn).ok();

    if let Some(container) = &container
        && spec.paths.contains(container)
    {
        return (!spec.excluded).then(|| value.clone());
    }

    match value {
        Value::Object(map) => {
            let mut trimmed = Map::new();
            for (key, child) in map {
                let child_path = Path::build(Some(urn), key.as_str());
                if let Some(kept) = prune(child, &child_path, spec) {
                    trimmed.insert(key.clone(), kept);
                }
            }
            (!trimmed.is_empty()).then_some(Value::Object(trimmed))
        }
        other => container
            .filter(|container| spec.returned(container))
            .map(|_| other.clone()),
    }
}

// =============================================================================
// Tests
// =============================================================================
