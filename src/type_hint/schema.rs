use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::error::{closest_matches, RuleError, RuleResult};

use super::{
    AttributeOrigin, EnumType, FieldDescriptor, FieldIntrospectable, ModelRef, ScalarType,
    TypeAnnotation,
};

/// Record model read from a JSON schema document.
///
/// Supported keywords: `title`, `properties`, `required`, `type` (also as a
/// list with `"null"`), `nullable`, `items`, `enum`, `format`, `anyOf`,
/// `oneOf`, `description` and `$ref` into `$defs` or `definitions`.
/// Properties missing from `required` are optional.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    name: String,
    fields: IndexMap<String, FieldDescriptor>,
}

impl SchemaModel {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> RuleResult<Arc<Self>> {
        let document: JsonValue = serde_json::from_str(json)
            .map_err(|e| RuleError::setup_type(format!("Invalid schema document: {}", e)))?;
        Self::from_value(&document)
    }

    pub fn from_value(document: &JsonValue) -> RuleResult<Arc<Self>> {
        let mut parser = SchemaParser {
            root: document,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        };
        parser.parse_object(document, None)
    }
}

impl FieldIntrospectable for SchemaModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> AttributeOrigin {
        AttributeOrigin::SchemaField
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<FieldDescriptor> {
        self.fields.get(name).cloned()
    }
}

struct SchemaParser<'a> {
    root: &'a JsonValue,
    resolved: HashMap<String, Arc<SchemaModel>>,
    visiting: Vec<String>,
}

fn is_optional(annotation: &TypeAnnotation) -> bool {
    matches!(annotation, TypeAnnotation::Union(items) if items.iter().any(TypeAnnotation::is_absent))
}

fn as_object<'a>(schema: &'a JsonValue, context: &str) -> RuleResult<&'a Map<String, JsonValue>> {
    schema.as_object().ok_or_else(|| {
        RuleError::setup_type(format!("Schema of {} must be an object", context))
    })
}

impl<'a> SchemaParser<'a> {
    fn parse_object(
        &mut self,
        schema: &'a JsonValue,
        fallback_name: Option<&str>,
    ) -> RuleResult<Arc<SchemaModel>> {
        let object = as_object(schema, fallback_name.unwrap_or("document"))?;
        let name = object
            .get("title")
            .and_then(JsonValue::as_str)
            .or(fallback_name)
            .ok_or_else(|| RuleError::setup_name("Schema object needs a title"))?
            .to_string();
        let properties = object
            .get("properties")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                RuleError::setup_type(format!("Schema {} has no properties", name))
            })?;
        let required: Vec<&str> = object
            .get("required")
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default();

        let mut fields = IndexMap::with_capacity(properties.len());
        for (prop_name, prop) in properties {
            let annotation = self
                .parse_type(prop, prop_name)
                .map_err(|e| e.with_owner(format!("{}.{}", name, prop_name)))?;
            let is_required = required.contains(&prop_name.as_str());
            let annotation = if !is_required && !is_optional(&annotation) {
                TypeAnnotation::optional(annotation)
            } else {
                annotation
            };
            let mut field = FieldDescriptor::new(prop_name, annotation);
            field.required = is_required;
            field.description = prop
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            fields.insert(prop_name.clone(), field);
        }

        debug!("schema model {} parsed with {} fields", name, fields.len());
        Ok(Arc::new(SchemaModel { name, fields }))
    }

    fn parse_type(&mut self, schema: &'a JsonValue, name: &str) -> RuleResult<TypeAnnotation> {
        let object = as_object(schema, name)?;

        if let Some(reference) = object.get("$ref").and_then(JsonValue::as_str) {
            let model: ModelRef = self.resolve_ref(reference)?;
            return Ok(TypeAnnotation::Model(model));
        }

        for keyword in ["anyOf", "oneOf"] {
            if let Some(variants) = object.get(keyword).and_then(JsonValue::as_array) {
                let mut items = variants
                    .iter()
                    .map(|variant| self.parse_type(variant, name))
                    .collect::<RuleResult<Vec<_>>>()?;
                return Ok(if items.len() == 1 {
                    items.remove(0)
                } else {
                    TypeAnnotation::Union(items)
                });
            }
        }

        let annotation = match object.get("type") {
            Some(JsonValue::String(type_name)) => self.parse_named_type(type_name, schema, name)?,
            Some(JsonValue::Array(type_names)) => {
                let mut items = Vec::with_capacity(type_names.len());
                for type_name in type_names {
                    let type_name = type_name.as_str().ok_or_else(|| {
                        RuleError::setup_type(format!("Type list of {} must hold strings", name))
                    })?;
                    items.push(self.parse_named_type(type_name, schema, name)?);
                }
                match items.len() {
                    0 => {
                        return Err(RuleError::setup_type(format!(
                            "Empty type list for {}",
                            name
                        )))
                    }
                    1 => items.remove(0),
                    _ => TypeAnnotation::Union(items),
                }
            }
            Some(other) => {
                return Err(RuleError::setup_type(format!(
                    "Unsupported type declaration {} for {}",
                    other, name
                )))
            }
            None if object.contains_key("properties") => {
                TypeAnnotation::Model(self.parse_object(schema, Some(name))?)
            }
            None => {
                return Err(RuleError::setup_type(format!(
                    "Schema of {} declares no type",
                    name
                )))
            }
        };

        let nullable = object
            .get("nullable")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        if nullable && !is_optional(&annotation) {
            Ok(TypeAnnotation::optional(annotation))
        } else {
            Ok(annotation)
        }
    }

    fn parse_named_type(
        &mut self,
        type_name: &str,
        schema: &'a JsonValue,
        name: &str,
    ) -> RuleResult<TypeAnnotation> {
        let object = as_object(schema, name)?;
        let format = object.get("format").and_then(JsonValue::as_str);
        let annotation = match type_name {
            "string" => match object.get("enum").and_then(JsonValue::as_array) {
                Some(values) => {
                    let members = values
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(|value| (value.to_string(), value.to_string()));
                    let enum_name = object
                        .get("title")
                        .and_then(JsonValue::as_str)
                        .unwrap_or(name);
                    TypeAnnotation::enumeration(EnumType::new(enum_name, ScalarType::Str, members)?)
                }
                None => match format {
                    Some("date") => TypeAnnotation::Scalar(ScalarType::Date),
                    Some("date-time") => TypeAnnotation::Scalar(ScalarType::DateTime),
                    _ => TypeAnnotation::Scalar(ScalarType::Str),
                },
            },
            "integer" => match object.get("enum").and_then(JsonValue::as_array) {
                Some(values) => {
                    let members = values
                        .iter()
                        .filter_map(JsonValue::as_i64)
                        .map(|value| (value.to_string(), value));
                    let enum_name = object
                        .get("title")
                        .and_then(JsonValue::as_str)
                        .unwrap_or(name);
                    TypeAnnotation::enumeration(EnumType::new(enum_name, ScalarType::Int, members)?)
                }
                None => TypeAnnotation::Scalar(ScalarType::Int),
            },
            "number" => match format {
                Some("decimal") => TypeAnnotation::Scalar(ScalarType::Decimal),
                _ => TypeAnnotation::Scalar(ScalarType::Float),
            },
            "boolean" => TypeAnnotation::Scalar(ScalarType::Bool),
            "array" => {
                let items = object.get("items").ok_or_else(|| {
                    RuleError::setup_type(format!("Array {} declares no items", name))
                })?;
                TypeAnnotation::list(self.parse_type(items, name)?)
            }
            "object" => TypeAnnotation::Model(self.parse_object(schema, Some(name))?),
            "null" => TypeAnnotation::Absent,
            other => {
                return Err(RuleError::setup_type(format!(
                    "Unsupported schema type '{}' for {}",
                    other, name
                )))
            }
        };
        Ok(annotation)
    }

    fn resolve_ref(&mut self, reference: &str) -> RuleResult<Arc<SchemaModel>> {
        let name = reference
            .strip_prefix("#/$defs/")
            .or_else(|| reference.strip_prefix("#/definitions/"))
            .ok_or_else(|| {
                RuleError::setup_type(format!("Unsupported schema reference {}", reference))
            })?;
        if let Some(model) = self.resolved.get(name) {
            return Ok(model.clone());
        }
        if self.visiting.iter().any(|visiting| visiting == name) {
            return Err(RuleError::setup_type(format!(
                "Recursive schema reference {}",
                reference
            )));
        }
        let root = self.root;
        let definitions = root
            .get("$defs")
            .or_else(|| root.get("definitions"))
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                RuleError::setup_type(format!("No definitions for reference {}", reference))
            })?;
        let definition = definitions.get(name).ok_or_else(|| {
            let available: Vec<String> = definitions.keys().cloned().collect();
            RuleError::setup_name_not_found(
                format!("Schema definition '{}' not found", name),
                closest_matches(name, &available, 10),
            )
        })?;

        self.visiting.push(name.to_string());
        let model = self.parse_object(definition, Some(name));
        self.visiting.pop();
        let model = model?;
        self.resolved.insert(name.to_string(), model.clone());
        Ok(model)
    }
}
