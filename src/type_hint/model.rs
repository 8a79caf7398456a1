use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::error::{RuleError, RuleResult};

use super::{AttributeOrigin, TypeAnnotation};

/// A declared field of a record model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub annotation: TypeAnnotation,
    pub required: bool,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: &str, annotation: TypeAnnotation) -> Self {
        Self {
            name: name.to_string(),
            annotation,
            required: true,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Read access to the fields of a record model, whatever its representation.
pub trait FieldIntrospectable: fmt::Debug + Send + Sync {
    fn model_name(&self) -> &str;

    fn origin(&self) -> AttributeOrigin;

    /// Field names in declaration order.
    fn field_names(&self) -> Vec<String>;

    fn field(&self, name: &str) -> Option<FieldDescriptor>;

    fn field_type(&self, name: &str) -> Option<TypeAnnotation> {
        self.field(name).map(|field| field.annotation)
    }

    fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// Record model declared directly in Rust.
///
/// ```ignore
/// let company = StructModel::builder("Company")
///     .field("name", TypeAnnotation::string())
///     .field("vat_number", TypeAnnotation::optional(TypeAnnotation::string()))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct StructModel {
    name: String,
    fields: IndexMap<String, FieldDescriptor>,
}

pub struct StructModelBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl StructModel {
    pub fn builder(name: &str) -> StructModelBuilder {
        StructModelBuilder {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }
}

impl StructModelBuilder {
    pub fn field(mut self, name: &str, annotation: TypeAnnotation) -> Self {
        self.fields.push(FieldDescriptor::new(name, annotation));
        self
    }

    pub fn field_descriptor(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> RuleResult<Arc<StructModel>> {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for field in self.fields {
            if field.name.is_empty() {
                return Err(RuleError::setup_name(format!(
                    "Model {} has a field without a name",
                    self.name
                )));
            }
            let name = field.name.clone();
            if fields.insert(name.clone(), field).is_some() {
                return Err(RuleError::setup_name(format!(
                    "Model {} declares field '{}' twice",
                    self.name, name
                )));
            }
        }
        Ok(Arc::new(StructModel {
            name: self.name,
            fields,
        }))
    }
}

impl FieldIntrospectable for StructModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> AttributeOrigin {
        AttributeOrigin::StructField
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<FieldDescriptor> {
        self.fields.get(name).cloned()
    }
}
