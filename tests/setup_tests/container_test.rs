use pretty_assertions::assert_eq;
use rulebind::{
    component::ComponentKind,
    expression::ExpressionStatus,
    model::HandlerFunction,
    namespace::{CTX, DP, F, M},
    BoundModel, Container, ContainerState, DataVar, Field, FunctionDecl, Namespace, Owner,
    RuleError, RuleResult, Section, SetupConfig, TypeAnnotation, Validation,
};

use super::fixtures::{company_bound_model, company_model, minimal_rules};

#[test]
fn test_minimal_rule_set() -> RuleResult<()> {
    let mut rules = minimal_rules()?;
    rules.setup()?;

    assert_eq!(rules.state(), ContainerState::Finished);
    assert_eq!(rules.owner(), &Owner::Top);
    let tree = rules.components().expect("components");
    assert_eq!(tree.names(), vec!["company_rules", "company", "name"]);

    let heap = rules.heap().expect("heap");
    assert!(heap.is_finished());
    assert!(heap.get(Namespace::Models, "company.name").is_some());

    let node = rules.get_component("name")?;
    assert_eq!(node.kind(), ComponentKind::Field);
    assert_eq!(node.owner_name(), Some("company_rules"));
    let Some(rulebind::Component::Field(field)) = node.component() else {
        panic!("name is not a field");
    };
    let bound = field.bound_variable().expect("bound");
    assert_eq!(bound.heap_name, "company_rules");
    assert_eq!(bound.namespace, Namespace::Models);
    assert_eq!(bound.name, "company.name");
    Ok(())
}

#[test]
fn test_setup_twice_fails() -> RuleResult<()> {
    let mut rules = minimal_rules()?;
    rules.setup()?;
    assert!(matches!(rules.setup(), Err(RuleError::Setup { .. })));
    assert!(rules.is_finished());
    Ok(())
}

#[test]
fn test_unresolved_bind_fails_setup() -> RuleResult<()> {
    let mut rules = Container::rules("company_rules", company_bound_model()?)?
        .contains(Field::input(M.path(["company", "nmae"])?)?);

    let err = rules.setup().expect_err("bind does not resolve");
    assert!(matches!(err, RuleError::SetupNameNotFound { .. }));
    assert!(err.to_string().contains("nmae"));
    assert!(err.to_string().contains("available: name"));
    assert_eq!(rules.state(), ContainerState::Failed);
    assert!(rules.heap().is_none());
    assert!(matches!(rules.setup(), Err(RuleError::Setup { .. })));
    Ok(())
}

#[test]
fn test_duplicate_component_names() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(
        Section::new("general")?.contains(Field::input(M.path(["company", "name"])?)?),
    );
    let err = rules.setup().expect_err("duplicate name");
    assert!(matches!(err, RuleError::SetupName { .. }));
    assert!(err
        .to_string()
        .contains("'name' (Field in general) is already used by Field in company_rules"));
    Ok(())
}

#[test]
fn test_denied_reference() -> RuleResult<()> {
    let mut rules = minimal_rules()?.validation(Validation::new(
        "company_check",
        F.attr("company")?.ne(""),
        "Company must be set",
    )?);
    let err = rules.setup().expect_err("company is not referenceable");
    assert!(matches!(err, RuleError::SetupValue { .. }));
    assert!(err.to_string().contains("can not be referenced"));
    Ok(())
}

#[test]
fn test_field_reference_and_unresolved_expressions() -> RuleResult<()> {
    let mut rules = minimal_rules()?
        .validation(Validation::new(
            "name_set",
            F.attr("name")?.ne(""),
            "Name is required",
        )?)
        .validation(Validation::new(
            "vat_set",
            M.path(["company", "vat_numbr"])?.ne(""),
            "VAT number is required",
        )?)
        .contains(
            Section::new("internal")?.available(CTX.path(["user", "is_staff"])?),
        );
    rules.setup()?;

    let unresolved = rules.unresolved();
    assert_eq!(unresolved.len(), 2);
    assert_eq!(unresolved[0].owner, "internal");
    assert_eq!(unresolved[0].status, ExpressionStatus::ErrUnsupported);
    assert_eq!(unresolved[1].owner, "vat_set");
    assert_eq!(unresolved[1].status, ExpressionStatus::ErrNotFound);
    assert!(unresolved[1].reason.contains("vat_number"));

    let heap = rules.heap().expect("heap");
    let name = heap.get_strict(Namespace::Fields, "name")?;
    assert_eq!(name.references(), &["name_set".to_string()]);
    Ok(())
}

#[test]
fn test_fail_on_unresolved() -> RuleResult<()> {
    let config = SetupConfig {
        fail_on_unresolved: true,
        ..SetupConfig::default()
    };
    let mut rules = minimal_rules()?
        .validation(Validation::new(
            "vat_set",
            M.path(["company", "vat_numbr"])?.ne(""),
            "VAT number is required",
        )?)
        .with_config(config);
    let err = rules.setup().expect_err("unresolved expression");
    assert!(matches!(err, RuleError::Setup { .. }));
    assert!(err.to_string().contains("vat_set"));
    assert_eq!(rules.state(), ContainerState::Failed);
    Ok(())
}

#[test]
fn test_component_lookup_hints() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(
        Section::new("general")?.contains(Field::boolean(M.path(["company", "is_public"])?)?),
    );
    rules.setup()?;

    match rules.get_component("is_publik") {
        Err(RuleError::NameNotFound { candidates, .. }) => {
            assert!(candidates.contains(&"is_public".to_string()))
        }
        other => panic!("unexpected result {:?}", other.map(|n| n.name().to_string())),
    }
    assert!(matches!(
        rules.get_extension("general"),
        Err(RuleError::SetupValue { .. })
    ));
    assert_eq!(rules.owner_container_name("is_public")?, "company_rules");
    assert!(rules.owner_container_name("missing").is_err());
    Ok(())
}

#[test]
fn test_describe() -> RuleResult<()> {
    let mut rules = minimal_rules()?.contains(
        Section::new("general")?.contains(Field::boolean(M.path(["company", "is_public"])?)?),
    );
    rules.setup()?;

    let described = rules.describe();
    let lines: Vec<&str> = described.lines().collect();
    assert_eq!(lines[0], "company_rules (RuleSet)");
    assert!(lines[1].starts_with("  company (BoundModel): Company"));
    assert_eq!(lines[2], "  name (Field) -> company.name");
    assert_eq!(lines[3], "  general (Section)");
    assert_eq!(lines[4], "    is_public (Field) -> company.is_public");

    let shallow = SetupConfig {
        max_describe_depth: 1,
        ..SetupConfig::default()
    };
    let mut rules = minimal_rules()?
        .contains(
            Section::new("general")?.contains(Field::boolean(M.path(["company", "is_public"])?)?),
        )
        .with_config(shallow);
    rules.setup()?;
    assert!(rules.describe().contains("    ..."));
    Ok(())
}

#[test]
fn test_nested_expression_model() -> RuleResult<()> {
    let model = company_bound_model()?.contains(BoundModel::from_expression(
        "address",
        M.path(["company", "address"])?,
    )?);
    let mut rules = Container::rules("company_rules", model)?
        .contains(Field::input(M.path(["address", "city"])?)?);
    rules.setup()?;

    assert_eq!(
        rules.models().keys().collect::<Vec<_>>(),
        vec!["company", "address"]
    );
    let heap = rules.heap().expect("heap");
    let address = heap.get_strict(Namespace::Models, "address")?;
    assert_eq!(address.name(), "company.address");
    assert!(address.is_bound_to("address"));

    let city = rules.get_component("city")?;
    assert_eq!(city.owner_name(), Some("company_rules"));
    let Some(rulebind::Component::Field(field)) = city.component() else {
        panic!("city is not a field");
    };
    assert_eq!(
        field.bound_variable().map(|b| b.name.as_str()),
        Some("company.address.city")
    );
    Ok(())
}

#[test]
fn test_nested_model_must_be_a_record() -> RuleResult<()> {
    let model = company_bound_model()?
        .contains(BoundModel::from_expression("name", M.path(["company", "name"])?)?);
    let mut rules = Container::rules("company_rules", model)?;
    assert!(matches!(rules.setup(), Err(RuleError::SetupName { .. })));
    Ok(())
}

#[test]
fn test_nested_model_names_are_unique() -> RuleResult<()> {
    let model = company_bound_model()?
        .contains(BoundModel::from_expression("company", M.attr("company")?)?);
    let mut rules = Container::rules("company_rules", model)?;
    let err = rules.setup().expect_err("model name used twice");
    assert!(matches!(err, RuleError::SetupName { .. }));
    assert!(err.to_string().contains("Model company is already registered"));
    assert_eq!(rules.models().len(), 1);
    Ok(())
}

#[test]
fn test_handlers_model() -> RuleResult<()> {
    let read = HandlerFunction::new(
        FunctionDecl::new("load_company")
            .param("company_id", TypeAnnotation::int())
            .returns(TypeAnnotation::model(company_model()?)),
    )
    .inject("company_id", DP.attr("company_id")?);
    let save = HandlerFunction::new(
        FunctionDecl::new("save_company")
            .untyped_param("instance")
            .param("company_id", TypeAnnotation::int()),
    )
    .inject("company_id", DP.attr("company_id")?)
    .model_param("instance");

    let model = BoundModel::with_handlers("company", read, save)?;
    let mut rules = Container::rules("company_rules", model)?
        .dataprovider(DataVar::literal("company_id", 7)?)
        .contains(Field::input(M.path(["company", "name"])?)?);
    rules.setup()?;

    assert!(rules.unresolved().is_empty());
    let heap = rules.heap().expect("heap");
    let company_id = heap.get_strict(Namespace::DataProviders, "company_id")?;
    assert_eq!(company_id.references(), &["company".to_string(), "company".to_string()]);
    Ok(())
}

#[test]
fn test_handlers_need_model_param() -> RuleResult<()> {
    let read = HandlerFunction::new(
        FunctionDecl::new("load_company").returns(TypeAnnotation::model(company_model()?)),
    );
    let save = HandlerFunction::new(FunctionDecl::new("save_company").untyped_param("instance"));
    assert!(matches!(
        BoundModel::with_handlers("company", read, save),
        Err(RuleError::SetupValue { .. })
    ));
    Ok(())
}

#[test]
fn test_config_from_str() -> RuleResult<()> {
    let config = SetupConfig::from_str(r#"{"max_suggestions": 2, "fail_on_unresolved": true}"#)?;
    assert_eq!(config.max_suggestions, 2);
    assert!(config.fail_on_unresolved);
    assert_eq!(config.max_bind_depth, SetupConfig::default().max_bind_depth);

    let mut rules = minimal_rules()?.with_config(config.clone());
    rules.setup()?;
    assert_eq!(rules.config(), &config);
    Ok(())
}
