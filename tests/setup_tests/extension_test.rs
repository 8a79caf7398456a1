use pretty_assertions::assert_eq;
use rulebind::{
    namespace::M, BoundModel, Cardinality, CardinalityValidation, Component, Container,
    ContainerKind, ContainerState, Field, Namespace, Owner, RuleError, RuleResult,
    UniqueValidation, Value,
};

use super::fixtures::minimal_rules;

/// At least one employee, `company.employees` is not optional.
const MULTI: Cardinality = Cardinality::Multi { allow_none: false };

fn employee_list(cardinality: Cardinality) -> RuleResult<Container> {
    Ok(Container::extension(
        "employee_list",
        BoundModel::from_expression("employees", M.path(["company", "employees"])?)?,
        CardinalityValidation::new(cardinality),
    )?
    .contains(Field::input(M.path(["employees", "name"])?)?)
    .contains(Field::input(M.path(["employees", "email"])?)?)
    .unique(UniqueValidation::children(["email"])?))
}

fn ceo_extension(cardinality: Cardinality) -> RuleResult<Container> {
    Ok(Container::extension(
        "ceo_details",
        BoundModel::from_expression("ceo", M.path(["company", "ceo"])?)?,
        CardinalityValidation::new(cardinality),
    )?
    .contains(Field::input(M.path(["ceo", "name"])?)?))
}

fn employee(name: &str, email: &str) -> Value {
    Value::record([("name", Value::from(name)), ("email", Value::from(email))])
}

#[test]
fn test_extension_setup() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(employee_list(MULTI)?);
    rules.setup()?;

    let tree = rules.components().expect("components");
    assert_eq!(
        tree.names(),
        vec!["company_rules", "company", "name", "employee_list"]
    );

    let extension = rules.get_extension("employee_list")?;
    assert_eq!(extension.kind(), ContainerKind::Extension);
    assert_eq!(extension.state(), ContainerState::Finished);
    assert_eq!(extension.owner(), &Owner::Parent("company_rules".to_string()));
    assert_eq!(extension.config(), rules.config());
    assert_eq!(
        extension.components().expect("components").names(),
        vec![
            "employee_list",
            "employees",
            "employee_list__cardinality",
            "employee_list__unique",
            "name",
            "email",
        ]
    );
    assert_eq!(rules.extensions().count(), 1);
    Ok(())
}

#[test]
fn test_extension_bound_to_parent_variable() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(employee_list(MULTI)?);
    rules.setup()?;
    let extension = rules.get_extension("employee_list")?;

    let bound = extension.bound_variable().expect("bound to parent");
    assert_eq!(bound.heap_name, "company_rules");
    assert_eq!(bound.namespace, Namespace::Models);
    assert_eq!(bound.name, "company.employees");

    let parent_heap = rules.heap().expect("parent heap");
    let employees = parent_heap.get_strict(Namespace::Models, "company.employees")?;
    assert!(employees.is_bound_to("employees"));
    assert_eq!(employees.references(), &["employee_list".to_string()]);

    let heap = extension.heap().expect("extension heap");
    assert_eq!(heap.name(), "employee_list");
    let local = heap.get_strict(Namespace::Models, "employees")?;
    assert!(local.is_bound_to("company.employees"));
    assert!(local.descriptor().is_some_and(|d| d.is_list));

    let Some(Component::Field(email)) = extension.get_component("email")?.component() else {
        panic!("email is not a field");
    };
    let bound = email.bound_variable().expect("bound");
    assert_eq!(bound.heap_name, "employee_list");
    assert_eq!(bound.name, "employees.email");
    Ok(())
}

#[test]
fn test_owner_container_name() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(employee_list(MULTI)?);
    rules.setup()?;
    assert_eq!(rules.owner_container_name("email")?, "employee_list");
    assert_eq!(rules.owner_container_name("name")?, "company_rules");
    assert!(matches!(
        rules.owner_container_name("phone"),
        Err(RuleError::NameNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_describe_inlines_extensions() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(employee_list(MULTI)?);
    rules.setup()?;
    let described = rules.describe();
    assert!(described.contains("  employee_list (Extension)\n"));
    assert!(described.contains("    email (Field) -> employees.email\n"));
    Ok(())
}

#[test]
fn test_cardinality_must_fit_the_model() -> RuleResult<()> {
    let cases = [
        employee_list(Cardinality::Single { allow_none: false })?,
        ceo_extension(Cardinality::multi())?,
        ceo_extension(Cardinality::Single { allow_none: false })?,
    ];
    for extension in cases {
        let name = extension.name().to_string();
        let mut rules = minimal_rules()?.contains(extension);
        let result = rules.setup();
        assert!(
            matches!(result, Err(RuleError::SetupType { .. })),
            "{} accepted: {:?}",
            name,
            result
        );
        assert_eq!(rules.state(), ContainerState::Failed);
    }

    let mut rules = minimal_rules()?.contains(ceo_extension(Cardinality::single())?);
    rules.setup()?;
    Ok(())
}

#[test]
fn test_allow_none_needs_optional_model() -> RuleResult<()> {
    let cases = [
        employee_list(Cardinality::multi())?,
        employee_list(Cardinality::range(Some(0), Some(5))?)?,
    ];
    for extension in cases {
        let mut rules = minimal_rules()?.contains(extension);
        let err = rules.setup().expect_err("employees are not optional");
        assert!(matches!(err, RuleError::SetupType { .. }), "{:?}", err);
        assert!(err.to_string().contains("not optional"));
    }
    Ok(())
}

#[test]
fn test_validate_children() -> RuleResult<()> {
    let mut rules =
        minimal_rules()?.contains(employee_list(Cardinality::range(Some(1), Some(3))?)?);
    rules.setup()?;
    let extension = rules.get_extension("employee_list")?;

    extension.validate_children(&[
        employee("Ana", "ana@example.com"),
        employee("Bor", "bor@example.com"),
    ])?;

    match extension.validate_children(&[]) {
        Err(RuleError::Validation { owner, message }) => {
            assert_eq!(owner, "employee_list");
            assert!(message.contains("at least 1"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    let too_many: Vec<Value> = (0..4)
        .map(|i| employee(&format!("e{}", i), &format!("e{}@example.com", i)))
        .collect();
    assert!(matches!(
        extension.validate_children(&too_many),
        Err(RuleError::Validation { .. })
    ));
    assert!(matches!(
        extension.validate_children(&[
            employee("Ana", "ana@example.com"),
            employee("Ana B.", "ana@example.com"),
        ]),
        Err(RuleError::Validation { .. })
    ));
    Ok(())
}

#[test]
fn test_unique_field_must_exist() -> RuleResult<()> {
    let extension = employee_list(MULTI)?
        .unique(UniqueValidation::global(["mail"])?.with_name("unique_mail")?);
    let mut rules = minimal_rules()?.contains(extension);

    let err = rules.setup().expect_err("unknown unique field");
    assert!(matches!(err, RuleError::SetupNameNotFound { .. }));
    assert!(err.to_string().contains("email"));
    assert_eq!(rules.state(), ContainerState::Failed);
    Ok(())
}

#[test]
fn test_extension_model_must_resolve() -> RuleResult<()> {
    let extension = Container::extension(
        "employee_list",
        BoundModel::from_expression("employees", M.path(["company", "employes"])?)?,
        CardinalityValidation::new(MULTI),
    )?;
    let mut rules = minimal_rules()?.contains(extension);
    let err = rules.setup().expect_err("model does not resolve");
    assert!(matches!(err, RuleError::SetupNameNotFound { .. }));
    assert!(err.to_string().contains("employee_list"));
    Ok(())
}
