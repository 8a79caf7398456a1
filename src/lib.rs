//! Declarative rule trees bound to data models.
//!
//! A [`Container`] declares fields, sections, data providers and validations
//! whose values are bound to attributes of record models through
//! attribute-path expressions:
//!
//! ```ignore
//! use rulebind::{namespace::M, BoundModel, Container, Field, TypeAnnotation};
//!
//! let mut rules = Container::rules("company_rules", BoundModel::new("company", company_type)?)?
//!     .contains(Field::input(M.path(["company", "name"])?)?);
//! rules.setup()?;
//! ```
//!
//! Setup registers the models in a per-container [`Heap`], flattens the
//! component tree, resolves every expression once and freezes the heap.

pub mod component;
pub mod config;
pub mod container;
pub mod error;
pub mod expression;
pub mod heap;
pub mod model;
pub mod namespace;
pub mod type_hint;
pub mod validation;

use lazy_static::lazy_static;
use regex::Regex;

pub use component::{
    Choices, ChoiceOption, Component, ComponentId, ComponentKind, ComponentTree, DataVar, Field,
    FieldType, Owner, Section, Validation,
};
pub use config::SetupConfig;
pub use container::{Container, ContainerKind, ContainerState, ModelInfo};
pub use error::{RuleError, RuleResult};
pub use expression::{CallArgs, DataContext, Expression, ExpressionStatus, Operation, Operator, Value};
pub use heap::{BoundVar, Heap, Variable, VariableData};
pub use model::{BoundModel, HandlerFunction};
pub use namespace::Namespace;
pub use type_hint::{
    EnumType, FieldIntrospectable, FunctionDecl, ScalarType, SchemaModel, StructModel,
    TypeAnnotation, TypeDescriptor,
};
pub use validation::{Cardinality, CardinalityValidation, UniqueScope, UniqueValidation};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

/// Component and model names must be plain identifiers.
pub fn validate_identifier(name: &str) -> RuleResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(RuleError::setup_name(format!(
            "'{}' is not a valid name, use letters, digits and '_' starting with a letter",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("company").is_ok());
        assert!(validate_identifier("address__city").is_ok());
        assert!(validate_identifier("Employee2").is_ok());
        for bad in ["", "_private", "2nd", "with space", "dash-ed"] {
            assert!(
                matches!(validate_identifier(bad), Err(RuleError::SetupName { .. })),
                "{} accepted",
                bad
            );
        }
    }
}
