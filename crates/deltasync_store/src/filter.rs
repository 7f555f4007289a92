//! Column predicates for selects.

use crate::document::{Document, DocumentExt};

/// A single column predicate.
///
/// Timestamp comparisons never match a missing or non-numeric column, so a
/// row lacking an audit column is invisible to every delta bucket rather
/// than leaking into several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `column > value`
    Gt(&'static str, i64),
    /// `column <= value`
    Le(&'static str, i64),
    /// `column = value` for a boolean flag (missing reads as `false`).
    Flag(&'static str, bool),
}

impl Condition {
    /// Evaluates the predicate against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match *self {
            Condition::Gt(column, value) => doc.millis(column).is_some_and(|v| v > value),
            Condition::Le(column, value) => doc.millis(column).is_some_and(|v| v <= value),
            Condition::Flag(column, expected) => doc.flag(column) == expected,
        }
    }
}

/// A conjunction of column predicates.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column > value`.
    #[must_use]
    pub fn gt(mut self, column: &'static str, value: i64) -> Self {
        self.conditions.push(Condition::Gt(column, value));
        self
    }

    /// Adds `column <= value`.
    #[must_use]
    pub fn le(mut self, column: &'static str, value: i64) -> Self {
        self.conditions.push(Condition::Le(column, value));
        self
    }

    /// Adds `column = expected` for a boolean flag.
    #[must_use]
    pub fn flag(mut self, column: &'static str, expected: bool) -> Self {
        self.conditions.push(Condition::Flag(column, expected));
        self
    }

    /// Returns the predicates in this filter.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true if every predicate holds for the document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}
