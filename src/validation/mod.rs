//! Validations attached to extensions: how many items they hold and which
//! field combinations must stay unique.

pub mod cardinality;
pub mod unique;

pub use cardinality::{Cardinality, CardinalityValidation};
pub use unique::{UniqueScope, UniqueValidation};
