//! Visitor protocol over the filter AST.
//!
//! Each consumer (translator, evaluator, renderer) implements
//! [`FilterVisitor`] for the context it threads through the walk. Leaf methods
//! default to [`FilterVisitor::visit_comparison`], so a consumer that treats
//! every comparison alike implements one method.

use super::{Comparison, Filter};
use crate::path::Path;

pub trait FilterVisitor<C> {
    type Output;

    /// Fallback for every leaf kind not overridden below.
    fn visit_comparison(&self, comparison: &Comparison, ctx: C) -> Self::Output;

    fn visit_presence(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_equals(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_contains(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_starts_with(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_ends_with(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_greater_than(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_greater_than_or_equal(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_less_than(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_less_than_or_equal(&self, comparison: &Comparison, ctx: C) -> Self::Output {
        self.visit_comparison(comparison, ctx)
    }

    fn visit_and(&self, operands: &[Filter], ctx: C) -> Self::Output;

    fn visit_or(&self, operands: &[Filter], ctx: C) -> Self::Output;

    fn visit_not(&self, inner: &Filter, ctx: C) -> Self::Output;

    fn visit_complex(&self, path: &Path, inner: &Filter, ctx: C) -> Self::Output;
}

/// Renders a filter in canonical text form. Parsing the output yields an
/// equal filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    fn operand(&self, operand: &Filter, parenthesize: bool) -> String {
        let text = operand.accept(self, ());
        if parenthesize {
            format!("({})", text)
        } else {
            text
        }
    }
}

impl FilterVisitor<()> for Renderer {
    type Output = String;

    fn visit_comparison(&self, comparison: &Comparison, _ctx: ()) -> String {
        match &comparison.value {
            Some(value) => format!("{} {} {}", comparison.path, comparison.kind, value),
            None => format!("{} {}", comparison.path, comparison.kind),
        }
    }

    fn visit_and(&self, operands: &[Filter], _ctx: ()) -> String {
        operands
            .iter()
            .map(|op| self.operand(op, matches!(op, Filter::And(_) | Filter::Or(_))))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn visit_or(&self, operands: &[Filter], _ctx: ()) -> String {
        operands
            .iter()
            .map(|op| self.operand(op, matches!(op, Filter::Or(_))))
            .collect::<Vec<_>>()
            .join(" or ")
    }

    fn visit_not(&self, inner: &Filter, _ctx: ()) -> String {
        format!("not ({})", inner.accept(self, ()))
    }

    fn visit_complex(&self, path: &Path, inner: &Filter, _ctx: ()) -> String {
        format!("{}[{}]", path, inner.accept(self, ()))
    }
}
