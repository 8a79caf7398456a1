use pretty_assertions::assert_eq;

use super::*;
use crate::{
    component::{ComponentId, Field},
    namespace::M,
    type_hint::{StructModel, TypeAnnotation},
    validation::Cardinality,
};

fn company_type() -> RuleResult<TypeAnnotation> {
    let employee = StructModel::builder("Employee")
        .field("name", TypeAnnotation::string())
        .build()?;
    let company = StructModel::builder("Company")
        .field("name", TypeAnnotation::string())
        .field("employees", TypeAnnotation::list(TypeAnnotation::model(employee)))
        .build()?;
    Ok(TypeAnnotation::model(company))
}

fn rules() -> RuleResult<Container> {
    Ok(
        Container::rules("rules", BoundModel::new("company", company_type()?)?)?
            .contains(Field::input(M.path(["company", "name"])?)?),
    )
}

fn employee_list() -> RuleResult<Container> {
    Container::extension(
        "employee_list",
        BoundModel::from_expression("employees", M.path(["company", "employees"])?)?,
        CardinalityValidation::new(Cardinality::Multi { allow_none: false }),
    )
}

#[test]
fn test_rules_needs_declared_model() -> RuleResult<()> {
    let model = BoundModel::from_expression("company", M.attr("company")?)?;
    let result = Container::rules("rules", model);
    assert!(matches!(result, Err(RuleError::SetupValue { .. })));
    Ok(())
}

#[test]
fn test_extension_needs_expression_model() -> RuleResult<()> {
    let result = Container::extension(
        "employee_list",
        BoundModel::new("employees", company_type()?)?,
        CardinalityValidation::new(Cardinality::multi()),
    );
    assert!(matches!(result, Err(RuleError::SetupValue { .. })));
    Ok(())
}

#[test]
fn test_extension_is_not_set_up_directly() -> RuleResult<()> {
    let mut extension = employee_list()?;
    assert!(matches!(
        extension.setup(),
        Err(RuleError::SetupValue { .. })
    ));
    assert_eq!(extension.state(), ContainerState::Declared);
    assert_eq!(extension.owner(), &Owner::Unset);
    Ok(())
}

#[test]
fn test_extension_owner_set_once() -> RuleResult<()> {
    let mut extension = employee_list()?;
    extension.set_owner(Owner::Component(ComponentId(0)), "rules")?;
    assert_eq!(extension.owner(), &Owner::Parent("rules".to_string()));
    assert_eq!(extension.owner_name(), Some("rules"));
    assert!(extension
        .set_owner(Owner::Component(ComponentId(0)), "other")
        .is_err_and(|e| e.is_internal()));

    let mut rules = rules()?;
    assert!(matches!(
        rules.set_owner(Owner::Component(ComponentId(0)), "other"),
        Err(RuleError::SetupValue { .. })
    ));
    Ok(())
}

#[test]
fn test_add_section() -> RuleResult<()> {
    let mut rules = rules()?;
    rules.add_section(Section::new("general")?)?;
    assert!(matches!(
        rules.add_section(Section::new("general")?),
        Err(RuleError::SetupName { .. })
    ));

    rules.setup()?;
    assert!(rules.get_component("general").is_ok());
    assert!(matches!(
        rules.add_section(Section::new("details")?),
        Err(RuleError::Setup { .. })
    ));
    Ok(())
}

#[test]
fn test_lookups_before_setup() -> RuleResult<()> {
    let rules = rules()?;
    assert!(matches!(
        rules.get_component("name"),
        Err(RuleError::Setup { .. })
    ));
    assert!(rules.validate_children(&[]).is_err());
    assert_eq!(rules.describe(), "rules (RuleSet, Declared)\n");
    assert_eq!(rules.to_string(), "RuleSet(rules, Declared)");
    Ok(())
}

#[test]
fn test_models_registered() -> RuleResult<()> {
    let mut rules = rules()?;
    rules.setup()?;
    let info = &rules.models()["company"];
    assert!(info.descriptor.is_model());
    let heap = rules.heap().expect("finished heap");
    assert!(heap.is_finished());
    assert_eq!(heap.variable(info.var)?.name(), "company");
    Ok(())
}
