//! Declared types and the extraction of their shape.
//!
//! Record models come in two representations, [`StructModel`] declared in
//! Rust and [`SchemaModel`] parsed from a JSON schema document. Both are read
//! through the [`FieldIntrospectable`] trait, so the extractor treats them
//! the same way. Extraction unwraps at most one optional layer and then at
//! most one list layer:
//!
//! ```text
//! Optional[List[Company]]  -> underlying Company, is_list, is_optional
//! List[str]                -> underlying str, is_list
//! List[List[int]]          -> error
//! ```

pub mod function;
pub mod model;
pub mod schema;

#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    error::{closest_matches, RuleError, RuleResult},
    expression::Value,
};

pub use function::{FunctionDecl, Param};
pub use model::{FieldDescriptor, FieldIntrospectable, StructModel};
pub use schema::SchemaModel;

pub type ModelRef = Arc<dyn FieldIntrospectable>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    Str,
    Int,
    Float,
    Bool,
    Decimal,
    Date,
    DateTime,
}

impl ScalarType {
    /// Whether a runtime value fits this scalar type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ScalarType::Str, Value::String(_)) => true,
            (ScalarType::Int, Value::Integer(_)) => true,
            (ScalarType::Float, Value::Float(_)) | (ScalarType::Float, Value::Integer(_)) => true,
            (ScalarType::Decimal, Value::Float(_)) | (ScalarType::Decimal, Value::Integer(_)) => {
                true
            }
            (ScalarType::Bool, Value::Boolean(_)) => true,
            (ScalarType::Date, Value::String(_)) | (ScalarType::DateTime, Value::String(_)) => {
                true
            }
            _ => false,
        }
    }
}

/// A closed set of named values sharing one scalar type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    name: String,
    value_type: ScalarType,
    members: IndexMap<String, Value>,
}

impl EnumType {
    pub fn new<I, K, V>(name: &str, value_type: ScalarType, members: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut collected = IndexMap::new();
        for (key, value) in members {
            let key = key.into();
            let value = value.into();
            if !value_type.accepts(&value) {
                return Err(RuleError::setup_type(format!(
                    "Enum {} member {} has value {} which is not {}",
                    name, key, value, value_type
                )));
            }
            if collected.insert(key.clone(), value).is_some() {
                return Err(RuleError::setup_name(format!(
                    "Enum {} has duplicate member {}",
                    name, key
                )));
            }
        }
        if collected.is_empty() {
            return Err(RuleError::setup_value(format!("Enum {} has no members", name)));
        }
        Ok(Self {
            name: name.to_string(),
            value_type,
            members: collected,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ScalarType {
        self.value_type
    }

    pub fn members(&self) -> &IndexMap<String, Value> {
        &self.members
    }

    pub fn contains_value(&self, value: &Value) -> bool {
        self.members.values().any(|member| member == value)
    }
}

/// A declared type.
#[derive(Debug, Clone)]
pub enum TypeAnnotation {
    Scalar(ScalarType),
    Enum(Arc<EnumType>),
    Model(ModelRef),
    List(Box<TypeAnnotation>),
    Union(Vec<TypeAnnotation>),
    /// The "no value" marker. `Optional[T]` is `Union[T, Absent]`.
    Absent,
}

impl TypeAnnotation {
    pub fn string() -> Self {
        TypeAnnotation::Scalar(ScalarType::Str)
    }

    pub fn int() -> Self {
        TypeAnnotation::Scalar(ScalarType::Int)
    }

    pub fn float() -> Self {
        TypeAnnotation::Scalar(ScalarType::Float)
    }

    pub fn boolean() -> Self {
        TypeAnnotation::Scalar(ScalarType::Bool)
    }

    pub fn model<M: FieldIntrospectable + 'static>(model: Arc<M>) -> Self {
        TypeAnnotation::Model(model)
    }

    pub fn enumeration(enum_type: EnumType) -> Self {
        TypeAnnotation::Enum(Arc::new(enum_type))
    }

    pub fn list(item: TypeAnnotation) -> Self {
        TypeAnnotation::List(Box::new(item))
    }

    pub fn optional(inner: TypeAnnotation) -> Self {
        TypeAnnotation::Union(vec![inner, TypeAnnotation::Absent])
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, TypeAnnotation::Absent)
    }

    pub fn as_model(&self) -> Option<&ModelRef> {
        match self {
            TypeAnnotation::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Arc<EnumType>> {
        match self {
            TypeAnnotation::Enum(enum_type) => Some(enum_type),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            TypeAnnotation::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }
}

impl PartialEq for TypeAnnotation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeAnnotation::Scalar(a), TypeAnnotation::Scalar(b)) => a == b,
            (TypeAnnotation::Enum(a), TypeAnnotation::Enum(b)) => a == b,
            (TypeAnnotation::Model(a), TypeAnnotation::Model(b)) => {
                Arc::ptr_eq(a, b) || a.model_name() == b.model_name()
            }
            (TypeAnnotation::List(a), TypeAnnotation::List(b)) => a == b,
            (TypeAnnotation::Union(a), TypeAnnotation::Union(b)) => a == b,
            (TypeAnnotation::Absent, TypeAnnotation::Absent) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAnnotation::Scalar(scalar) => write!(f, "{}", scalar),
            TypeAnnotation::Enum(enum_type) => write!(f, "{}", enum_type.name()),
            TypeAnnotation::Model(model) => write!(f, "{}", model.model_name()),
            TypeAnnotation::List(item) => write!(f, "List[{}]", item),
            TypeAnnotation::Union(items) => match items.as_slice() {
                [inner, TypeAnnotation::Absent] => write!(f, "Optional[{}]", inner),
                _ => {
                    let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                    write!(f, "Union[{}]", items.join(", "))
                }
            },
            TypeAnnotation::Absent => write!(f, "None"),
        }
    }
}

/// Where a type descriptor was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AttributeOrigin {
    StructField,
    SchemaField,
    Function,
    DirectArg,
}

/// Normalized shape of a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub annotation: TypeAnnotation,
    pub underlying: TypeAnnotation,
    pub is_list: bool,
    pub is_optional: bool,
    pub origin: AttributeOrigin,
}

impl TypeDescriptor {
    pub fn model(&self) -> Option<&ModelRef> {
        self.underlying.as_model()
    }

    pub fn is_model(&self) -> bool {
        self.model().is_some()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (list={}, optional={}, from {})",
            self.underlying, self.is_list, self.is_optional, self.origin
        )
    }
}

/// Unwraps one optional layer, then one list layer.
pub fn extract_type_descriptor(
    annotation: &TypeAnnotation,
    origin: AttributeOrigin,
) -> RuleResult<TypeDescriptor> {
    let mut inner = annotation.clone();
    let mut is_optional = false;

    if let TypeAnnotation::Union(items) = &inner {
        if items.iter().any(TypeAnnotation::is_absent) {
            is_optional = true;
            let mut rest: Vec<TypeAnnotation> =
                items.iter().filter(|i| !i.is_absent()).cloned().collect();
            inner = if rest.len() == 1 {
                rest.remove(0)
            } else {
                TypeAnnotation::Union(rest)
            };
        }
    }

    let mut is_list = false;
    if let TypeAnnotation::List(item) = inner {
        is_list = true;
        inner = *item;
    }

    if matches!(
        inner,
        TypeAnnotation::List(_) | TypeAnnotation::Union(_) | TypeAnnotation::Absent
    ) {
        return Err(RuleError::setup_name(format!(
            "annotation must have a single parametrized argument, got {}",
            annotation
        )));
    }

    Ok(TypeDescriptor {
        annotation: annotation.clone(),
        underlying: inner,
        is_list,
        is_optional,
        origin,
    })
}

/// Extracts the descriptor of field `name` of the record type described by
/// `parent`.
pub fn extract_attribute(
    parent: &TypeDescriptor,
    name: &str,
    max_suggestions: usize,
) -> RuleResult<TypeDescriptor> {
    let model = parent.model().ok_or_else(|| {
        RuleError::setup_value(format!(
            "Type {} is not a record type, can not read attribute '{}'",
            parent.underlying, name
        ))
    })?;
    match model.field(name) {
        Some(field) => extract_type_descriptor(&field.annotation, model.origin()),
        None => {
            let available = model.field_names();
            Err(RuleError::setup_name_not_found(
                format!(
                    "Model {} has no field '{}'",
                    model.model_name(),
                    name
                ),
                closest_matches(name, &available, max_suggestions),
            ))
        }
    }
}
