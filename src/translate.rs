//! Filter to backend predicate translation.
//!
//! Lowers a [`Filter`] into a [`BackendFilter`] over the fields an
//! [`AttributeSchema`] maps attributes to, coercing every literal to its
//! field's declared type. Anything the backend cannot express exactly yields
//! [`Translation::NotTranslatable`] for the whole filter, leaving the caller to
//! evaluate in memory:
//!
//! - attributes missing from the schema, or carrying a value filter
//! - value paths (`emails[type eq "work"]`)
//! - substring operators on non-text fields
//! - ordering operators on boolean fields
//! - ordering or substring operators against `null`
//!
//! Negation is pushed down to the leaves, so leaves compile straight to their
//! negated operator (`not (age gt 5)` becomes `age LE 5`) and the output never
//! wraps a leaf in `Not`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::InvalidLiteralError,
    filter::{Comparison, ComparisonKind, Filter, FilterVisitor, Literal},
    path::Path,
    schema::{AttributeSchema, FieldMapping, TypeTag, parse_timestamp},
};

/// Operators understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
}

impl fmt::Display for BackendOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendOperator::Eq => "EQ",
            BackendOperator::NotEq => "NOT_EQ",
            BackendOperator::Gt => "GT",
            BackendOperator::Ge => "GE",
            BackendOperator::Lt => "LT",
            BackendOperator::Le => "LE",
            BackendOperator::Contains => "CONTAINS",
            BackendOperator::NotContains => "NOT_CONTAINS",
            BackendOperator::StartsWith => "STARTS_WITH",
            BackendOperator::NotStartsWith => "NOT_STARTS_WITH",
            BackendOperator::EndsWith => "ENDS_WITH",
            BackendOperator::NotEndsWith => "NOT_ENDS_WITH",
        };
        f.write_str(s)
    }
}

/// A literal coerced to its field's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BackendValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    /// No value stored
    Absent,
}

impl fmt::Display for BackendValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendValue::Text(s) => write!(f, "{:?}", s),
            BackendValue::Integer(n) => write!(f, "{}", n),
            BackendValue::Real(n) => write!(f, "{}", n),
            BackendValue::Boolean(b) => write!(f, "{}", b),
            BackendValue::Timestamp(t) => {
                f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            BackendValue::Absent => f.write_str("ABSENT"),
        }
    }
}

/// Search predicate handed to the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendFilter {
    Condition {
        field: String,
        operator: BackendOperator,
        value: BackendValue,
    },
    And {
        operands: Vec<BackendFilter>,
    },
    Or {
        operands: Vec<BackendFilter>,
    },
    Not {
        inner: Box<BackendFilter>,
    },
}

impl BackendFilter {
    pub fn condition(field: impl Into<String>, operator: BackendOperator, value: BackendValue) -> Self {
        BackendFilter::Condition {
            field: field.into(),
            operator,
            value,
        }
    }
}

impl fmt::Display for BackendFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFilter::Condition {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            BackendFilter::And { operands } => write_junction(f, operands, "AND", "TRUE"),
            BackendFilter::Or { operands } => write_junction(f, operands, "OR", "FALSE"),
            BackendFilter::Not { inner } => write!(f, "NOT ({})", inner),
        }
    }
}

fn write_junction(
    f: &mut fmt::Formatter<'_>,
    operands: &[BackendFilter],
    keyword: &str,
    empty: &str,
) -> fmt::Result {
    if operands.is_empty() {
        return f.write_str(empty);
    }
    f.write_str("(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", keyword)?;
        }
        write!(f, "{}", operand)?;
    }
    f.write_str(")")
}

/// Outcome of translating a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Translated(BackendFilter),
    /// Some part of the filter has no backend equivalent
    NotTranslatable,
}

impl Translation {
    pub fn is_translated(&self) -> bool {
        matches!(self, Translation::Translated(_))
    }

    pub fn into_option(self) -> Option<BackendFilter> {
        match self {
            Translation::Translated(filter) => Some(filter),
            Translation::NotTranslatable => None,
        }
    }
}

/// Whether the node being compiled sits under an odd number of `not`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negated,
}

impl Polarity {
    pub fn flip(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negated,
            Polarity::Negated => Polarity::Positive,
        }
    }

    fn pick<T>(self, positive: T, negated: T) -> T {
        match self {
            Polarity::Positive => positive,
            Polarity::Negated => negated,
        }
    }
}

type TranslateResult = Result<Translation, InvalidLiteralError>;

/// Compiles filters against one schema.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    schema: &'a AttributeSchema,
}

impl<'a> Translator<'a> {
    pub fn new(schema: &'a AttributeSchema) -> Self {
        Self { schema }
    }

    pub fn translate(&self, filter: &Filter) -> TranslateResult {
        filter.accept(self, Polarity::Positive)
    }

    fn lookup(&self, path: &Path) -> Option<&'a FieldMapping> {
        if path.value_filter().is_some() {
            tracing::debug!(%path, "Not translatable: attribute carries a value filter");
            return None;
        }
        let mapping = self.schema.lookup(path);
        if mapping.is_none() {
            tracing::debug!(
                %path,
                resource_type = self.schema.resource_type(),
                "Not translatable: attribute not in schema"
            );
        }
        mapping
    }

    /// Compile every operand, then combine. A literal error anywhere wins over
    /// an untranslatable operand.
    fn junction(&self, operands: &[Filter], polarity: Polarity, conjunction: bool) -> TranslateResult {
        let mut compiled = Vec::with_capacity(operands.len());
        let mut translatable = true;
        for operand in operands {
            match operand.accept(self, polarity)? {
                Translation::Translated(filter) => compiled.push(filter),
                Translation::NotTranslatable => translatable = false,
            }
        }

        if !translatable {
            return Ok(Translation::NotTranslatable);
        }

        if compiled.len() == 1 {
            return Ok(Translation::Translated(compiled.remove(0)));
        }

        // De Morgan: a negated conjunction is a disjunction of negated operands
        let combined = if conjunction == (polarity == Polarity::Positive) {
            BackendFilter::And { operands: compiled }
        } else {
            BackendFilter::Or { operands: compiled }
        };
        Ok(Translation::Translated(combined))
    }
}

impl FilterVisitor<Polarity> for Translator<'_> {
    type Output = TranslateResult;

    fn visit_comparison(&self, comparison: &Comparison, polarity: Polarity) -> TranslateResult {
        let path = &comparison.path;
        let Some(mapping) = self.lookup(path) else {
            return Ok(Translation::NotTranslatable);
        };

        let (operator, value) = match (comparison.kind, &comparison.value) {
            (ComparisonKind::Presence, _) => (
                polarity.pick(BackendOperator::NotEq, BackendOperator::Eq),
                BackendValue::Absent,
            ),
            (ComparisonKind::Equals, Some(Literal::Null)) => (
                polarity.pick(BackendOperator::Eq, BackendOperator::NotEq),
                BackendValue::Absent,
            ),
            (kind, Some(literal)) if !literal.is_null() => {
                if !operator_supported(kind, mapping.type_tag) {
                    tracing::debug!(
                        %path,
                        operator = kind.operator(),
                        type_tag = %mapping.type_tag,
                        "Not translatable: operator unsupported for field type"
                    );
                    return Ok(Translation::NotTranslatable);
                }
                let value = coerce(path, mapping.type_tag, literal)?;
                (backend_operator(kind, polarity), value)
            }
            (kind, _) => {
                tracing::debug!(
                    %path,
                    operator = kind.operator(),
                    "Not translatable: operator needs a non-null value"
                );
                return Ok(Translation::NotTranslatable);
            }
        };

        Ok(Translation::Translated(BackendFilter::Condition {
            field: mapping.backend_field.clone(),
            operator,
            value,
        }))
    }

    fn visit_and(&self, operands: &[Filter], polarity: Polarity) -> TranslateResult {
        self.junction(operands, polarity, true)
    }

    fn visit_or(&self, operands: &[Filter], polarity: Polarity) -> TranslateResult {
        self.junction(operands, polarity, false)
    }

    fn visit_not(&self, inner: &Filter, polarity: Polarity) -> TranslateResult {
        inner.accept(self, polarity.flip())
    }

    fn visit_complex(&self, path: &Path, _inner: &Filter, _polarity: Polarity) -> TranslateResult {
        tracing::debug!(%path, "Not translatable: value path");
        Ok(Translation::NotTranslatable)
    }
}

/// Translate `filter` against `schema`.
///
/// # Errors
///
/// Returns an [`InvalidLiteralError`] if a literal cannot be coerced to the
/// type of the field it is compared with.
pub fn translate(filter: &Filter, schema: &AttributeSchema) -> TranslateResult {
    Translator::new(schema).translate(filter)
}

fn operator_supported(kind: ComparisonKind, type_tag: TypeTag) -> bool {
    if kind.is_substring() {
        return type_tag == TypeTag::Text;
    }
    if kind.is_ordering() {
        return type_tag.is_ordered();
    }
    true
}

fn backend_operator(kind: ComparisonKind, polarity: Polarity) -> BackendOperator {
    use BackendOperator as Op;

    match kind {
        ComparisonKind::Presence => polarity.pick(Op::NotEq, Op::Eq),
        ComparisonKind::Equals => polarity.pick(Op::Eq, Op::NotEq),
        ComparisonKind::Contains => polarity.pick(Op::Contains, Op::NotContains),
        ComparisonKind::StartsWith => polarity.pick(Op::StartsWith, Op::NotStartsWith),
        ComparisonKind::EndsWith => polarity.pick(Op::EndsWith, Op::NotEndsWith),
        ComparisonKind::GreaterThan => polarity.pick(Op::Gt, Op::Le),
        ComparisonKind::GreaterThanOrEqual => polarity.pick(Op::Ge, Op::Lt),
        ComparisonKind::LessThan => polarity.pick(Op::Lt, Op::Ge),
        ComparisonKind::LessThanOrEqual => polarity.pick(Op::Le, Op::Gt),
    }
}

fn coerce(path: &Path, type_tag: TypeTag, literal: &Literal) -> Result<BackendValue, InvalidLiteralError> {
    let invalid = |reason: &str| InvalidLiteralError {
        path: path.to_string(),
        type_tag,
        literal: literal.to_string(),
        reason: reason.to_string(),
    };

    match (type_tag, literal) {
        (TypeTag::Text, literal) => Ok(BackendValue::Text(literal.raw_text())),

        (TypeTag::Integer, Literal::Number(n)) => {
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 {
                Ok(BackendValue::Integer(*n as i64))
            } else {
                Err(invalid("not an integer"))
            }
        }
        (TypeTag::Integer, Literal::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(BackendValue::Integer)
            .map_err(|_| invalid("not an integer")),

        (TypeTag::Real, Literal::Number(n)) => Ok(BackendValue::Real(*n)),
        (TypeTag::Real, Literal::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(BackendValue::Real(n)),
            _ => Err(invalid("not a number")),
        },

        (TypeTag::Boolean, Literal::Boolean(b)) => Ok(BackendValue::Boolean(*b)),
        (TypeTag::Boolean, Literal::String(s)) if s.eq_ignore_ascii_case("true") => {
            Ok(BackendValue::Boolean(true))
        }
        (TypeTag::Boolean, Literal::String(s)) if s.eq_ignore_ascii_case("false") => {
            Ok(BackendValue::Boolean(false))
        }

        (TypeTag::Timestamp, Literal::String(s)) => parse_timestamp(s)
            .map(BackendValue::Timestamp)
            .ok_or_else(|| invalid("not an ISO-8601 instant")),

        (TypeTag::Integer, _) => Err(invalid("not an integer")),
        (TypeTag::Real, _) => Err(invalid("not a number")),
        (TypeTag::Boolean, _) => Err(invalid("not a boolean")),
        (TypeTag::Timestamp, _) => Err(invalid("not an ISO-8601 instant")),
    }
}
