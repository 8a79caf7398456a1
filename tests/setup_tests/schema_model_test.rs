use pretty_assertions::assert_eq;
use rulebind::{
    namespace::M, BoundModel, Cardinality, CardinalityValidation, Container, Field,
    FieldIntrospectable, RuleError, RuleResult, SchemaModel, TypeAnnotation,
};

const COMPANY_SCHEMA: &str = r##"{
    "title": "Company",
    "type": "object",
    "properties": {
        "name": {"type": "string", "description": "Registered name"},
        "size": {"type": "string", "enum": ["small", "large"]},
        "listed": {"type": "boolean"},
        "branches": {"type": "array", "items": {"$ref": "#/$defs/Branch"}}
    },
    "required": ["name", "size", "listed", "branches"],
    "$defs": {
        "Branch": {
            "type": "object",
            "properties": {
                "city": {"type": "string"},
                "staff": {"type": "integer"}
            },
            "required": ["city"]
        }
    }
}"##;

fn schema_rules() -> RuleResult<Container> {
    let schema = SchemaModel::from_str(COMPANY_SCHEMA)?;
    let branches = Container::extension(
        "branch_list",
        BoundModel::from_expression("branches", M.path(["company", "branches"])?)?,
        CardinalityValidation::new(Cardinality::range(Some(1), Some(10))?),
    )?
    .contains(Field::input(M.path(["branches", "city"])?)?);

    Ok(
        Container::rules("company_rules", BoundModel::new("company", TypeAnnotation::model(schema))?)?
            .contains(Field::input(M.path(["company", "name"])?)?)
            .contains(Field::enumeration(M.path(["company", "size"])?)?.default_value("small")?)
            .contains(Field::boolean(M.path(["company", "listed"])?)?)
            .contains(branches),
    )
}

#[test]
fn test_schema_backed_rules() -> RuleResult<()> {
    let mut rules = schema_rules()?;
    rules.setup()?;

    assert_eq!(
        rules.components().expect("components").names(),
        vec!["company_rules", "company", "name", "size", "listed", "branch_list"]
    );
    let branches = rules.get_extension("branch_list")?;
    assert!(branches.get_component("city").is_ok());
    assert!(rules.unresolved().is_empty());
    Ok(())
}

#[test]
fn test_schema_field_type_mismatch() -> RuleResult<()> {
    let schema = SchemaModel::from_str(COMPANY_SCHEMA)?;
    let mut rules =
        Container::rules("company_rules", BoundModel::new("company", TypeAnnotation::model(schema))?)?
            .contains(Field::boolean(M.path(["company", "name"])?)?);
    assert!(matches!(rules.setup(), Err(RuleError::SetupType { .. })));
    Ok(())
}

#[test]
fn test_enum_default_must_be_a_member() -> RuleResult<()> {
    let schema = SchemaModel::from_str(COMPANY_SCHEMA)?;
    let mut rules =
        Container::rules("company_rules", BoundModel::new("company", TypeAnnotation::model(schema))?)?
            .contains(Field::enumeration(M.path(["company", "size"])?)?.default_value("huge")?);
    assert!(matches!(rules.setup(), Err(RuleError::SetupValue { .. })));
    Ok(())
}

#[test]
fn test_schema_fields_keep_declaration_order() -> RuleResult<()> {
    let schema = SchemaModel::from_str(COMPANY_SCHEMA)?;
    assert_eq!(schema.field_names(), vec!["name", "size", "listed", "branches"]);
    Ok(())
}
