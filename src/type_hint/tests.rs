use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;

fn company_struct() -> RuleResult<Arc<StructModel>> {
    let address = StructModel::builder("Address")
        .field("street", TypeAnnotation::string())
        .field("city", TypeAnnotation::string())
        .build()?;
    StructModel::builder("Company")
        .field("name", TypeAnnotation::string())
        .field("vat_number", TypeAnnotation::optional(TypeAnnotation::string()))
        .field("address", TypeAnnotation::model(address.clone()))
        .field("branches", TypeAnnotation::list(TypeAnnotation::model(address)))
        .build()
}

const COMPANY_SCHEMA: &str = r##"{
    "title": "Company",
    "type": "object",
    "properties": {
        "name": {"type": "string"},
        "vat_number": {"type": ["string", "null"]},
        "address": {"$ref": "#/$defs/Address"},
        "branches": {"type": "array", "items": {"$ref": "#/$defs/Address"}},
        "founded": {"type": "string", "format": "date"},
        "size": {"type": "string", "enum": ["small", "large"]}
    },
    "required": ["name", "vat_number", "address", "branches", "founded", "size"],
    "$defs": {
        "Address": {
            "type": "object",
            "properties": {
                "street": {"type": "string"},
                "city": {"type": "string"}
            },
            "required": ["street", "city"]
        }
    }
}"##;

#[test]
fn test_plain_scalar_descriptor() -> RuleResult<()> {
    let descriptor = extract_type_descriptor(&TypeAnnotation::int(), AttributeOrigin::DirectArg)?;
    assert_eq!(descriptor.underlying, TypeAnnotation::int());
    assert!(!descriptor.is_list);
    assert!(!descriptor.is_optional);
    assert_eq!(descriptor.origin, AttributeOrigin::DirectArg);
    Ok(())
}

#[test]
fn test_optional_list_is_unwrapped_in_order() -> RuleResult<()> {
    let annotation = TypeAnnotation::optional(TypeAnnotation::list(TypeAnnotation::string()));
    let descriptor = extract_type_descriptor(&annotation, AttributeOrigin::StructField)?;
    assert_eq!(descriptor.underlying, TypeAnnotation::string());
    assert!(descriptor.is_list);
    assert!(descriptor.is_optional);
    assert_eq!(descriptor.annotation, annotation);
    Ok(())
}

#[test]
fn test_nested_wrappers_are_rejected() {
    let nested = TypeAnnotation::list(TypeAnnotation::list(TypeAnnotation::int()));
    let err = extract_type_descriptor(&nested, AttributeOrigin::StructField).unwrap_err();
    assert!(matches!(err, RuleError::SetupName { .. }));
    assert!(err.to_string().contains("single parametrized argument"));

    let union = TypeAnnotation::Union(vec![TypeAnnotation::int(), TypeAnnotation::string()]);
    assert!(extract_type_descriptor(&union, AttributeOrigin::StructField).is_err());

    let list_of_optional = TypeAnnotation::list(TypeAnnotation::optional(TypeAnnotation::int()));
    assert!(extract_type_descriptor(&list_of_optional, AttributeOrigin::StructField).is_err());
}

#[test]
fn test_extract_attribute_from_struct_model() -> RuleResult<()> {
    let company = company_struct()?;
    let parent = extract_type_descriptor(
        &TypeAnnotation::model(company),
        AttributeOrigin::DirectArg,
    )?;

    let vat = extract_attribute(&parent, "vat_number", 10)?;
    assert!(vat.is_optional);
    assert_eq!(vat.origin, AttributeOrigin::StructField);

    let branches = extract_attribute(&parent, "branches", 10)?;
    assert!(branches.is_list);
    assert_eq!(
        branches.model().map(|m| m.model_name().to_string()),
        Some("Address".to_string())
    );
    Ok(())
}

#[test]
fn test_extract_attribute_errors() -> RuleResult<()> {
    let company = company_struct()?;
    let parent = extract_type_descriptor(
        &TypeAnnotation::model(company),
        AttributeOrigin::DirectArg,
    )?;

    match extract_attribute(&parent, "nme", 10) {
        Err(RuleError::SetupNameNotFound { candidates, .. }) => {
            assert!(candidates.contains(&"name".to_string()));
        }
        other => panic!("Expected SetupNameNotFound, got {:?}", other),
    }

    let name = extract_attribute(&parent, "name", 10)?;
    assert!(matches!(
        extract_attribute(&name, "length", 10),
        Err(RuleError::SetupValue { .. })
    ));
    Ok(())
}

#[test]
fn test_schema_and_struct_models_agree() -> RuleResult<()> {
    let schema = SchemaModel::from_str(COMPANY_SCHEMA)?;
    let structured = company_struct()?;
    let schema_parent = extract_type_descriptor(
        &TypeAnnotation::model(schema.clone()),
        AttributeOrigin::DirectArg,
    )?;
    let struct_parent = extract_type_descriptor(
        &TypeAnnotation::model(structured),
        AttributeOrigin::DirectArg,
    )?;

    for name in ["name", "vat_number", "address", "branches"] {
        let from_schema = extract_attribute(&schema_parent, name, 10)?;
        let from_struct = extract_attribute(&struct_parent, name, 10)?;
        assert_eq!(from_schema.underlying, from_struct.underlying, "field {}", name);
        assert_eq!(from_schema.is_list, from_struct.is_list, "field {}", name);
        assert_eq!(from_schema.is_optional, from_struct.is_optional, "field {}", name);
        assert_eq!(from_schema.origin, AttributeOrigin::SchemaField);
    }

    assert_eq!(
        schema.field_names(),
        vec!["name", "vat_number", "address", "branches", "founded", "size"]
    );
    assert_eq!(
        schema.field_type("founded"),
        Some(TypeAnnotation::Scalar(ScalarType::Date))
    );
    let size = schema.field_type("size");
    let size_enum = size.as_ref().and_then(TypeAnnotation::as_enum);
    assert_eq!(size_enum.map(|e| e.members().len()), Some(2));
    Ok(())
}

#[test]
fn test_schema_not_required_is_optional() -> RuleResult<()> {
    let schema = SchemaModel::from_str(
        r#"{"title": "Person", "properties": {"nick": {"type": "string"}}, "required": []}"#,
    )?;
    let nick = schema.field("nick").expect("nick declared");
    assert!(!nick.required);
    let descriptor = extract_type_descriptor(&nick.annotation, AttributeOrigin::SchemaField)?;
    assert!(descriptor.is_optional);
    Ok(())
}

#[test]
fn test_schema_errors() {
    assert!(matches!(
        SchemaModel::from_str(r#"{"properties": {}}"#),
        Err(RuleError::SetupName { .. })
    ));
    let recursive = r##"{
        "title": "Node",
        "properties": {"next": {"$ref": "#/$defs/Node"}},
        "$defs": {"Node": {"properties": {"next": {"$ref": "#/$defs/Node"}}}}
    }"##;
    assert!(matches!(
        SchemaModel::from_str(recursive),
        Err(RuleError::SetupType { .. })
    ));
    assert!(matches!(
        SchemaModel::from_str(r#"{"title": "X", "properties": {"a": {"type": "tuple"}}}"#),
        Err(RuleError::SetupType { .. })
    ));
}

#[test]
fn test_function_return_descriptor() -> RuleResult<()> {
    let company = company_struct()?;
    let loader = FunctionDecl::new("load_companies")
        .param("limit", TypeAnnotation::int())
        .returns(TypeAnnotation::list(TypeAnnotation::model(company)));
    let descriptor = loader.return_descriptor()?;
    assert!(descriptor.is_list);
    assert!(descriptor.is_model());
    assert_eq!(descriptor.origin, AttributeOrigin::Function);

    assert!(matches!(
        FunctionDecl::new("no_hint").return_descriptor(),
        Err(RuleError::SetupName { .. })
    ));
    assert!(matches!(
        FunctionDecl::new("returns_none")
            .returns(TypeAnnotation::Absent)
            .return_descriptor(),
        Err(RuleError::SetupName { .. })
    ));
    Ok(())
}

#[test]
fn test_enum_type_checks_members() {
    assert!(EnumType::new("Size", ScalarType::Str, [("small", 1)]).is_err());
    assert!(EnumType::new("Size", ScalarType::Str, Vec::<(String, String)>::new()).is_err());
    let size = EnumType::new("Size", ScalarType::Int, [("small", 1), ("large", 2)]);
    assert!(size.map(|e| e.contains_value(&Value::Integer(2))).unwrap_or(false));
}
