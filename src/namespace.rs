use strum_macros::EnumIter;

use crate::{
    error::{RuleError, RuleResult},
    expression::Expression,
};

/// Named roots for attribute-path expressions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString, EnumIter,
)]
pub enum Namespace {
    #[strum(serialize = "G")]
    Global,
    Context,
    Models,
    DataProviders,
    Fields,
    This,
    Utils,
}

pub const G: Namespace = Namespace::Global;
pub const CTX: Namespace = Namespace::Context;
pub const M: Namespace = Namespace::Models;
pub const DP: Namespace = Namespace::DataProviders;
pub const F: Namespace = Namespace::Fields;
pub const THIS: Namespace = Namespace::This;
pub const UTILS: Namespace = Namespace::Utils;

impl Namespace {
    /// Starts a fresh expression with a single attribute hop.
    pub fn attr(self, name: &str) -> RuleResult<Expression> {
        Expression::attribute(self, name)
    }

    /// Starts an expression from a chain of attribute names.
    pub fn path<'a, I: IntoIterator<Item = &'a str>>(self, names: I) -> RuleResult<Expression> {
        let mut names = names.into_iter();
        let first = names.next().ok_or_else(|| {
            RuleError::setup_value(format!("Empty path for namespace {}", self))
        })?;
        self.attr(first)?.attrs(names)
    }

    /// Namespaces whose top-level names are looked up in the heap.
    pub fn is_heap_backed(self) -> bool {
        !matches!(self, Namespace::Context | Namespace::This)
    }
}
