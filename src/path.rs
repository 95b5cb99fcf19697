//! Attribute Paths
//!
//! A [`Path`] names an attribute of a resource: an ordered list of segments,
//! each an attribute name with an optional schema-extension namespace. The
//! empty path is the root, i.e. the whole resource.
//!
//! ## Syntax
//!
//! ```text
//! path     = [URN ":"] ATTRNAME *("." ATTRNAME) ["[" filter "]"]
//! ATTRNAME = (ALPHA / "$") *(ALPHA / DIGIT / "_" / "-" / "$")
//! ```
//!
//! ```text
//! userName
//! name.givenName
//! emails[type eq "work"]
//! urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value
//! ```
//!
//! Attribute names and namespaces compare ASCII-case-insensitively, as SCIM
//! requires; the original spelling is kept for rendering. A value filter on
//! the final segment does not take part in equality, ordering or hashing.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    error::MalformedPathError,
    filter::{Filter, parse_filter},
};

/// One step of a [`Path`].
#[derive(Debug, Clone)]
pub struct Segment {
    namespace: Option<String>,
    name: String,
}

impl Segment {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Schema extension URN, `None` for the base schema
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        let namespace = match (&self.namespace, &other.namespace) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => cmp_ignore_ascii_case(a, b),
        };
        namespace.then_with(|| cmp_ignore_ascii_case(&self.name, &other.name))
    }
}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.namespace {
            Some(ns) => {
                state.write_u8(1);
                hash_ignore_ascii_case(ns, state);
            }
            None => state.write_u8(0),
        }
        hash_ignore_ascii_case(&self.name, state);
    }
}

fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

fn hash_ignore_ascii_case<H: Hasher>(s: &str, state: &mut H) {
    for c in s.bytes() {
        state.write_u8(c.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}

/// An attribute reference, possibly namespaced, possibly carrying a value
/// filter on its last segment.
#[derive(Debug, Clone, Default)]
pub struct Path {
    segments: Vec<Segment>,
    value_filter: Option<Box<Filter>>,
}

impl Path {
    /// The root path, referring to the whole resource.
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-segment path.
    pub fn build(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::new(namespace, name)],
            value_filter: None,
        }
    }

    /// Parse the textual form of a path. Empty text is the root.
    pub fn parse(text: &str) -> Result<Self, MalformedPathError> {
        let text = text.trim();

        let Some(open) = text.find('[') else {
            if text.contains(']') {
                return Err(MalformedPathError::new(text, "unbalanced ']'"));
            }
            return Self::parse_segments(text);
        };

        let close = text
            .rfind(']')
            .filter(|&close| close > open)
            .ok_or_else(|| MalformedPathError::new(text, "unclosed '[' in path"))?;
        if close + 1 != text.len() {
            return Err(MalformedPathError::new(
                text,
                format!("unexpected characters after value filter: '{}'", &text[close + 1..]),
            ));
        }

        let filter = parse_filter(&text[open + 1..close])
            .map_err(|e| MalformedPathError::new(text, format!("invalid value filter: {}", e)))?;

        let mut path = Self::parse_segments(&text[..open])?;
        if path.is_root() {
            return Err(MalformedPathError::new(
                text,
                "value filter without an attribute",
            ));
        }
        path.value_filter = Some(Box::new(filter));
        Ok(path)
    }

    /// Parse a path without a value filter.
    pub(crate) fn parse_segments(text: &str) -> Result<Self, MalformedPathError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::root());
        }

        let (namespace, attrs) = if is_urn(text) {
            let split = text.rfind(':').unwrap_or(0);
            let (namespace, attrs) = (&text[..split], &text[split + 1..]);
            if namespace.len() <= "urn:".len() || attrs.is_empty() {
                return Err(MalformedPathError::new(
                    text,
                    "namespaced path must be '<urn>:<attribute>'",
                ));
            }
            (Some(namespace), attrs)
        } else {
            (None, text)
        };

        let mut segments = Vec::new();
        for name in attrs.split('.') {
            validate_name(text, name)?;
            segments.push(Segment::new(namespace, name));
        }

        Ok(Self {
            segments,
            value_filter: None,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn size(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Namespace of the last segment.
    pub fn namespace(&self) -> Option<&str> {
        self.segments.last().and_then(Segment::namespace)
    }

    /// The prefix of length `n` (clamped to the path length). The value
    /// filter survives only when the whole path is kept.
    pub fn sub(&self, n: usize) -> Self {
        if n >= self.size() {
            return self.clone();
        }
        Self {
            segments: self.segments[..n].to_vec(),
            value_filter: None,
        }
    }

    /// Append a segment. The new segment inherits the namespace of the last
    /// one; any value filter is dropped since it no longer sits on the final
    /// segment.
    pub fn path(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::new(self.namespace(), name));
        Self {
            segments,
            value_filter: None,
        }
    }

    pub fn with_value_filter(mut self, filter: Filter) -> Self {
        self.value_filter = Some(Box::new(filter));
        self
    }

    pub fn value_filter(&self) -> Option<&Filter> {
        self.value_filter.as_deref()
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.size() < other.size() && self.segments[..] == other.segments[..self.size()]
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Path {}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i == 0 {
                if let Some(ns) = segment.namespace() {
                    write!(f, "{}:", ns)?;
                }
            } else {
                f.write_str(".")?;
            }
            f.write_str(segment.name())?;
        }
        if let Some(filter) = &self.value_filter {
            write!(f, "[{}]", filter)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = MalformedPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub(crate) fn is_urn(text: &str) -> bool {
    text.get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
}

/// Characters that may appear in the textual form of a path outside of a
/// value filter.
pub(crate) fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$' | '.' | ':')
}

fn validate_name(path: &str, name: &str) -> Result<(), MalformedPathError> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(MalformedPathError::new(path, "empty attribute name")),
        Some(c) if c.is_ascii_alphabetic() || c == '$' => {}
        Some(c) => {
            return Err(MalformedPathError::new(
                path,
                format!("attribute name '{}' cannot start with '{}'", name, c),
            ));
        }
    }
    if let Some(c) = chars.find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$'))) {
        return Err(MalformedPathError::new(
            path,
            format!("invalid character '{}' in attribute name '{}'", c, name),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
