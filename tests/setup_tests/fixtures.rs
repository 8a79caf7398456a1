use std::sync::Arc;

use rulebind::{
    namespace::M, BoundModel, Container, Field, RuleResult, StructModel, TypeAnnotation,
};

pub fn employee_model() -> RuleResult<Arc<StructModel>> {
    StructModel::builder("Employee")
        .field("name", TypeAnnotation::string())
        .field("email", TypeAnnotation::optional(TypeAnnotation::string()))
        .field("age", TypeAnnotation::int())
        .build()
}

pub fn address_model() -> RuleResult<Arc<StructModel>> {
    StructModel::builder("Address")
        .field("street", TypeAnnotation::string())
        .field("city", TypeAnnotation::string())
        .build()
}

/// Company with a plain name, an address, a list of employees and an
/// optional chief executive.
pub fn company_model() -> RuleResult<Arc<StructModel>> {
    StructModel::builder("Company")
        .field("name", TypeAnnotation::string())
        .field("vat_number", TypeAnnotation::optional(TypeAnnotation::string()))
        .field("is_public", TypeAnnotation::boolean())
        .field("address", TypeAnnotation::model(address_model()?))
        .field(
            "employees",
            TypeAnnotation::list(TypeAnnotation::model(employee_model()?)),
        )
        .field(
            "ceo",
            TypeAnnotation::optional(TypeAnnotation::model(employee_model()?)),
        )
        .build()
}

pub fn company_bound_model() -> RuleResult<BoundModel> {
    BoundModel::new("company", TypeAnnotation::model(company_model()?))
}

/// `company_rules` with a single `name` field.
pub fn minimal_rules() -> RuleResult<Container> {
    Ok(Container::rules("company_rules", company_bound_model()?)?
        .contains(Field::input(M.path(["company", "name"])?)?))
}
