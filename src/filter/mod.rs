//! Filter AST
//!
//! A parsed filter expression is a closed tree of [`Filter`] nodes over
//! [`Path`]s and [`Literal`]s. All leaf comparisons share one shape,
//! [`Comparison`], distinguished by [`ComparisonKind`]. Consumers walk the
//! tree through [`FilterVisitor`] rather than matching on it directly, so new
//! consumers never require changes here.
//!
//! ```text
//! userName eq "bjensen"
//! meta.lastModified gt "2011-05-13T04:42:34Z"
//! emails[type eq "work" and value co "@example.com"]
//! not (title pr) or userType eq "Intern"
//! ```

pub mod parser;
pub mod visitor;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use parser::{MAX_FILTER_DEPTH, MAX_FILTER_LENGTH, ParserLimits, parse_filter, parse_filter_with};
pub use visitor::{FilterVisitor, Renderer};

use crate::path::Path;

/// A comparison value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    /// Always finite
    Number(f64),
    Boolean(bool),
    Null,
}

impl Literal {
    /// A number literal, or `None` for NaN and the infinities.
    pub fn number(n: f64) -> Option<Self> {
        n.is_finite().then_some(Literal::Number(n))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// The literal without quoting or escaping.
    pub fn raw_text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Number(n) => n.to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Null => "null".to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        debug_assert!(n.is_finite(), "number literal must be finite, got {}", n);
        Literal::Number(n)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Number(n as f64)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

/// Leaf comparison kinds. There is no negative kind: `ne` is parsed as
/// `not (eq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    Presence,
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonKind {
    /// Operator token as written in a filter.
    pub fn operator(self) -> &'static str {
        match self {
            ComparisonKind::Presence => "pr",
            ComparisonKind::Equals => "eq",
            ComparisonKind::Contains => "co",
            ComparisonKind::StartsWith => "sw",
            ComparisonKind::EndsWith => "ew",
            ComparisonKind::GreaterThan => "gt",
            ComparisonKind::GreaterThanOrEqual => "ge",
            ComparisonKind::LessThan => "lt",
            ComparisonKind::LessThanOrEqual => "le",
        }
    }

    /// Case-insensitive lookup of an operator token. `ne` is not a kind.
    pub fn from_operator(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "pr" => Some(ComparisonKind::Presence),
            "eq" => Some(ComparisonKind::Equals),
            "co" => Some(ComparisonKind::Contains),
            "sw" => Some(ComparisonKind::StartsWith),
            "ew" => Some(ComparisonKind::EndsWith),
            "gt" => Some(ComparisonKind::GreaterThan),
            "ge" => Some(ComparisonKind::GreaterThanOrEqual),
            "lt" => Some(ComparisonKind::LessThan),
            "le" => Some(ComparisonKind::LessThanOrEqual),
            _ => None,
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparisonKind::GreaterThan
                | ComparisonKind::GreaterThanOrEqual
                | ComparisonKind::LessThan
                | ComparisonKind::LessThanOrEqual
        )
    }

    pub fn is_substring(self) -> bool {
        matches!(
            self,
            ComparisonKind::Contains | ComparisonKind::StartsWith | ComparisonKind::EndsWith
        )
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// A leaf: `path op value`, or `path pr` with no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub kind: ComparisonKind,
    pub path: Path,
    pub value: Option<Literal>,
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare(Comparison),
    /// Some element of the multi-valued attribute at `path` satisfies `inner`
    Complex { path: Path, inner: Box<Filter> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn presence(path: Path) -> Self {
        Filter::Compare(Comparison {
            kind: ComparisonKind::Presence,
            path,
            value: None,
        })
    }

    /// A valued comparison. Use [`Filter::presence`] for `pr`.
    pub fn compare(kind: ComparisonKind, path: Path, value: impl Into<Literal>) -> Self {
        debug_assert!(kind != ComparisonKind::Presence);
        Filter::Compare(Comparison {
            kind,
            path,
            value: Some(value.into()),
        })
    }

    pub fn equals(path: Path, value: impl Into<Literal>) -> Self {
        Self::compare(ComparisonKind::Equals, path, value)
    }

    pub fn complex(path: Path, inner: Filter) -> Self {
        Filter::Complex {
            path,
            inner: Box::new(inner),
        }
    }

    pub fn and(operands: Vec<Filter>) -> Self {
        Filter::And(operands)
    }

    pub fn or(operands: Vec<Filter>) -> Self {
        Filter::Or(operands)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    /// Dispatch to the visitor method matching this node.
    pub fn accept<C, V>(&self, visitor: &V, ctx: C) -> V::Output
    where
        V: FilterVisitor<C> + ?Sized,
    {
        match self {
            Filter::Compare(c) => match c.kind {
                ComparisonKind::Presence => visitor.visit_presence(c, ctx),
                ComparisonKind::Equals => visitor.visit_equals(c, ctx),
                ComparisonKind::Contains => visitor.visit_contains(c, ctx),
                ComparisonKind::StartsWith => visitor.visit_starts_with(c, ctx),
                ComparisonKind::EndsWith => visitor.visit_ends_with(c, ctx),
                ComparisonKind::GreaterThan => visitor.visit_greater_than(c, ctx),
                ComparisonKind::GreaterThanOrEqual => visitor.visit_greater_than_or_equal(c, ctx),
                ComparisonKind::LessThan => visitor.visit_less_than(c, ctx),
                ComparisonKind::LessThanOrEqual => visitor.visit_less_than_or_equal(c, ctx),
            },
            Filter::Complex { path, inner } => visitor.visit_complex(path, inner, ctx),
            Filter::And(operands) => visitor.visit_and(operands, ctx),
            Filter::Or(operands) => visitor.visit_or(operands, ctx),
            Filter::Not(inner) => visitor.visit_not(inner, ctx),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.accept(&Renderer, ()))
    }
}

impl std::str::FromStr for Filter {
    type Err = crate::error::FilterSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}
