//! Filter Parser
//!
//! Recursive-descent parser for filter expressions (RFC 7644 Section 3.4.2.2).
//!
//! ## Grammar
//!
//! ```text
//! filter      = orExpr
//! orExpr      = andExpr { "or" andExpr }
//! andExpr     = notExpr { "and" notExpr }
//! notExpr     = "not" "(" filter ")" | primary
//! primary     = "(" filter ")" | valuePath | comparison
//! comparison  = attrPath compareOp literal | attrPath "pr"
//! valuePath   = attrPath "[" filter "]" [ "." ATTRNAME ( compareOp literal | "pr" ) ]
//! compareOp   = "eq" | "ne" | "co" | "sw" | "ew" | "gt" | "ge" | "lt" | "le"
//! literal     = "true" | "false" | "null" | NUMBER | STRING
//! ```
//!
//! Keywords and operators are case-insensitive. `ne` is parsed as
//! `not (eq)`. `emails[type eq "work"].value sw "j"` is the value path
//! `emails[type eq "work" and value sw "j"]`.
//!
//! ## Limits
//!
//! Input length and nesting depth are bounded by [`ParserLimits`]; the
//! defaults are [`MAX_FILTER_LENGTH`] bytes and [`MAX_FILTER_DEPTH`] levels.

use super::{Comparison, ComparisonKind, Filter, Literal};
use crate::{
    error::FilterSyntaxError,
    path::{Path, is_path_char},
};

/// Default maximum length of a filter expression (bytes).
pub const MAX_FILTER_LENGTH: usize = 4096;

/// Default maximum nesting depth of a filter expression.
///
/// Each `(`, `not (` and `[` opens one level.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Bounds applied before and during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_length: usize,
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_length: MAX_FILTER_LENGTH,
            max_depth: MAX_FILTER_DEPTH,
        }
    }
}

/// Parse a filter expression with the default limits.
///
/// ```
/// use attrpath::filter::parse_filter;
///
/// let filter = parse_filter("userName eq \"bjensen\"").unwrap();
/// let filter = parse_filter("active eq true and emails[type eq \"work\"]").unwrap();
/// ```
pub fn parse_filter(input: &str) -> Result<Filter, FilterSyntaxError> {
    parse_filter_with(input, ParserLimits::default())
}

/// Parse a filter expression.
///
/// # Errors
///
/// Returns a [`FilterSyntaxError`] if the input exceeds `limits` or does not
/// match the grammar.
pub fn parse_filter_with(input: &str, limits: ParserLimits) -> Result<Filter, FilterSyntaxError> {
    let result = parse(input, limits);
    if let Err(err) = &result {
        tracing::debug!(
            position = err.position,
            error = %err.message,
            "Rejected filter expression"
        );
    }
    result
}

fn parse(input: &str, limits: ParserLimits) -> Result<Filter, FilterSyntaxError> {
    if input.len() > limits.max_length {
        return Err(FilterSyntaxError::new(
            0,
            format!(
                "Filter exceeds maximum length ({} bytes, max {})",
                input.len(),
                limits.max_length
            ),
        ));
    }

    let mut parser = Parser::new(input, limits.max_depth);
    let filter = parser.parse_or_expr()?;

    parser.skip_whitespace();
    if parser.position < parser.input.len() {
        return Err(parser.error(format!(
            "Unexpected input: '{}'",
            &parser.input[parser.position..]
        )));
    }

    Ok(filter)
}

// =============================================================================
// Parser Implementation
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_depth: usize) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            max_depth,
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterSyntaxError {
        FilterSyntaxError::new(self.position, message)
    }

    fn enter_scope(&mut self) -> Result<(), FilterSyntaxError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!(
                "Filter exceeds maximum nesting depth ({})",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // orExpr = andExpr { "or" andExpr }
    fn parse_or_expr(&mut self) -> Result<Filter, FilterSyntaxError> {
        let first = self.parse_and_expr()?;
        let mut operands = vec![first];

        while self.try_keyword("or") {
            self.expect_operand("or")?;
            operands.push(self.parse_and_expr()?);
        }

        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Filter::Or(operands)
        })
    }

    // andExpr = notExpr { "and" notExpr }
    fn parse_and_expr(&mut self) -> Result<Filter, FilterSyntaxError> {
        let first = self.parse_not_expr()?;
        let mut operands = vec![first];

        while self.try_keyword("and") {
            self.expect_operand("and")?;
            operands.push(self.parse_not_expr()?);
        }

        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Filter::And(operands)
        })
    }

    fn expect_operand(&mut self, keyword: &str) -> Result<(), FilterSyntaxError> {
        self.skip_whitespace();
        match self.peek() {
            None | Some(')') | Some(']') => {
                Err(self.error(format!("Expected expression after '{}'", keyword)))
            }
            Some(_) => Ok(()),
        }
    }

    // notExpr = "not" "(" filter ")" | primary
    fn parse_not_expr(&mut self) -> Result<Filter, FilterSyntaxError> {
        self.skip_whitespace();

        let start = self.position;
        if self.try_keyword("not") {
            self.skip_whitespace();
            if self.try_char('(') {
                let inner = self.parse_group("Expected ')' to close 'not' expression")?;
                return Ok(Filter::Not(Box::new(inner)));
            }
            // An attribute that happens to be called "not"
            self.position = start;
        }

        self.parse_primary()
    }

    // primary = "(" filter ")" | valuePath | comparison
    fn parse_primary(&mut self) -> Result<Filter, FilterSyntaxError> {
        if self.try_char('(') {
            return self.parse_group("Expected ')' to close grouped expression");
        }

        let path = self.parse_attr_path()?;

        if self.try_char('[') {
            return self.parse_value_path(path);
        }

        self.parse_comparison(path)
    }

    /// Body of a parenthesized group; the `(` has been consumed.
    fn parse_group(&mut self, unclosed: &str) -> Result<Filter, FilterSyntaxError> {
        self.enter_scope()?;
        let inner = self.parse_or_expr()?;
        self.exit_scope();
        self.skip_whitespace();
        if !self.try_char(')') {
            return Err(self.error(unclosed));
        }
        Ok(inner)
    }

    // valuePath = attrPath "[" filter "]" [ "." ATTRNAME ( compareOp literal | "pr" ) ]
    fn parse_value_path(&mut self, path: Path) -> Result<Filter, FilterSyntaxError> {
        self.enter_scope()?;
        self.expect_operand("[")?;
        let mut inner = self.parse_or_expr()?;
        self.exit_scope();
        self.skip_whitespace();
        if !self.try_char(']') {
            return Err(self.error("Expected ']' to close value filter"));
        }

        if self.try_char('.') {
            let sub_attr = self.parse_attr_path()?;
            let leaf = self.parse_comparison(sub_attr)?;
            inner = match inner {
                Filter::And(mut operands) => {
                    operands.push(leaf);
                    Filter::And(operands)
                }
                other => Filter::And(vec![other, leaf]),
            };
        }

        Ok(Filter::Complex {
            path,
            inner: Box::new(inner),
        })
    }

    fn parse_attr_path(&mut self) -> Result<Path, FilterSyntaxError> {
        self.skip_whitespace();

        let start = self.position;

        if !self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '$')
        {
            return Err(self.error("Expected attribute name"));
        }

        while self.peek().is_some_and(is_path_char) {
            self.advance();
        }

        Path::parse_segments(&self.input[start..self.position])
            .map_err(|e| FilterSyntaxError::new(start, format!("Invalid attribute path: {}", e.reason)))
    }

    // comparison = attrPath compareOp literal | attrPath "pr"
    fn parse_comparison(&mut self, path: Path) -> Result<Filter, FilterSyntaxError> {
        self.skip_whitespace();

        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
        let token = &self.input[start..self.position];

        if token.is_empty() {
            return Err(self.error("Expected operator"));
        }

        let (kind, negated) = if token.eq_ignore_ascii_case("ne") {
            (ComparisonKind::Equals, true)
        } else {
            let kind = ComparisonKind::from_operator(token).ok_or_else(|| {
                FilterSyntaxError::new(start, format!("Unknown operator: '{}'", token))
            })?;
            (kind, false)
        };

        let value = if kind == ComparisonKind::Presence {
            None
        } else {
            // `eq"x"` is tolerated, `eq1` is not
            if self
                .peek()
                .is_some_and(|c| !(c.is_whitespace() || matches!(c, '"' | ')' | ']')))
            {
                return Err(self.error(format!("Expected whitespace after operator '{}'", token)));
            }
            self.skip_whitespace();
            Some(self.parse_literal()?)
        };

        let leaf = Filter::Compare(Comparison { kind, path, value });
        Ok(if negated {
            Filter::Not(Box::new(leaf))
        } else {
            leaf
        })
    }

    fn parse_literal(&mut self) -> Result<Literal, FilterSyntaxError> {
        if self.peek() == Some('"') {
            return self.parse_string();
        }

        if self.try_keyword("true") {
            return Ok(Literal::Boolean(true));
        }
        if self.try_keyword("false") {
            return Ok(Literal::Boolean(false));
        }
        if self.try_keyword("null") {
            return Ok(Literal::Null);
        }

        if self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return self.parse_number();
        }

        Err(self.error("Expected value (string, number, boolean or null)"))
    }

    fn parse_string(&mut self) -> Result<Literal, FilterSyntaxError> {
        let start = self.position;
        self.advance();

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(FilterSyntaxError::new(start, "Unterminated string"));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        None => return Err(FilterSyntaxError::new(start, "Unterminated string")),
                        Some(_) => return Err(self.error("Invalid escape sequence")),
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(Literal::String(value))
    }

    fn parse_number(&mut self) -> Result<Literal, FilterSyntaxError> {
        let start = self.position;

        if self.peek() == Some('-') || self.peek() == Some('+') {
            self.advance();
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek() == Some('-') || self.peek() == Some('+') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[start..self.position];
        if self.peek().is_some_and(is_path_char) {
            return Err(self.error(format!("Unexpected character after number '{}'", text)));
        }
        match text.parse::<f64>() {
            Ok(n) => Literal::number(n).ok_or_else(|| {
                FilterSyntaxError::new(start, format!("Number out of range: '{}'", text))
            }),
            Err(_) => Err(FilterSyntaxError::new(
                start,
                format!("Invalid number: '{}'", text),
            )),
        }
    }

    // Helper methods

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();

        let remaining = &self.input[self.position..];

        if remaining
            .get(..keyword.len())
            .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        {
            // Not a prefix of a longer identifier
            let after = remaining[keyword.len()..].chars().next();
            if after.is_none_or(|c| !is_path_char(c)) {
                self.position += keyword.len();
                return true;
            }
        }

        false
    }
}

// =============================================================================
// Tests
// =============================================================================
