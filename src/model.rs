use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    error::{RuleError, RuleResult},
    expression::{DataContext, Expression, Value},
    type_hint::{
        extract_type_descriptor, AttributeOrigin, FunctionDecl, TypeAnnotation, TypeDescriptor,
    },
    validate_identifier,
};

/// A function bound to a model, with parameters filled from expressions.
#[derive(Debug, Clone)]
pub struct HandlerFunction {
    pub function: Arc<FunctionDecl>,
    pub inject_params: IndexMap<String, Expression>,
    /// Parameter receiving the model instance, save handlers only.
    pub model_param_name: Option<String>,
}

impl HandlerFunction {
    pub fn new(function: FunctionDecl) -> Self {
        Self {
            function: Arc::new(function),
            inject_params: IndexMap::new(),
            model_param_name: None,
        }
    }

    pub fn inject(mut self, param: &str, expr: Expression) -> Self {
        self.inject_params.insert(param.to_string(), expr);
        self
    }

    pub fn model_param(mut self, param: &str) -> Self {
        self.model_param_name = Some(param.to_string());
        self
    }

    fn check_params(&self) -> RuleResult<()> {
        for param in self.inject_params.keys() {
            if self.function.get_param(param).is_none() {
                return Err(RuleError::setup_value(format!(
                    "Function {} has no parameter '{}' to inject",
                    self.function.name(),
                    param
                )));
            }
        }
        Ok(())
    }

    fn injected(&self, ctx: &DataContext) -> RuleResult<IndexMap<String, Value>> {
        self.inject_params
            .iter()
            .map(|(param, expr)| Ok((param.clone(), expr.read(ctx)?)))
            .collect()
    }
}

/// Read and save handlers of a model that is loaded by functions.
#[derive(Debug, Clone)]
pub struct ModelHandlers {
    pub read: HandlerFunction,
    pub save: HandlerFunction,
}

/// Where a bound model gets its type from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    Type(TypeAnnotation),
    Expression(Expression),
    Handlers(Box<ModelHandlers>),
}

/// A data model bound under a name, optionally with nested models.
#[derive(Debug, Clone)]
pub struct BoundModel {
    name: String,
    source: ModelSource,
    contains: Vec<BoundModel>,
}

impl BoundModel {
    pub fn new(name: &str, model: TypeAnnotation) -> RuleResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            source: ModelSource::Type(model),
            contains: Vec::new(),
        })
    }

    /// A model reached through an expression, in the own heap or, for an
    /// extension's main model, in the parent's heap.
    pub fn from_expression(name: &str, expr: Expression) -> RuleResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            source: ModelSource::Expression(expr),
            contains: Vec::new(),
        })
    }

    /// A model whose type comes from the read handler's return type.
    pub fn with_handlers(
        name: &str,
        read: HandlerFunction,
        save: HandlerFunction,
    ) -> RuleResult<Self> {
        validate_identifier(name)?;
        read.function
            .return_descriptor()
            .map_err(|e| e.with_owner(name))?;
        read.check_params().map_err(|e| e.with_owner(name))?;
        save.check_params().map_err(|e| e.with_owner(name))?;
        if read.model_param_name.is_some() {
            return Err(RuleError::setup_value(format!(
                "Read handler {} can not receive the model instance",
                read.function.name()
            ))
            .with_owner(name));
        }
        let model_param = save.model_param_name.as_deref().ok_or_else(|| {
            RuleError::setup_value(format!(
                "Save handler {} must name the parameter receiving the model",
                save.function.name()
            ))
            .with_owner(name)
        })?;
        if save.function.get_param(model_param).is_none() {
            return Err(RuleError::setup_value(format!(
                "Save handler {} has no parameter '{}'",
                save.function.name(),
                model_param
            ))
            .with_owner(name));
        }
        Ok(Self {
            name: name.to_string(),
            source: ModelSource::Handlers(Box::new(ModelHandlers { read, save })),
            contains: Vec::new(),
        })
    }

    pub fn contains(mut self, nested: BoundModel) -> Self {
        self.contains.push(nested);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub(crate) fn source_mut(&mut self) -> &mut ModelSource {
        &mut self.source
    }

    pub fn nested(&self) -> &[BoundModel] {
        &self.contains
    }

    pub(crate) fn nested_mut(&mut self) -> &mut [BoundModel] {
        &mut self.contains
    }

    pub(crate) fn take_nested(&mut self) -> Vec<BoundModel> {
        std::mem::take(&mut self.contains)
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.source, ModelSource::Expression(_))
    }

    pub fn handlers(&self) -> Option<&ModelHandlers> {
        match &self.source {
            ModelSource::Handlers(handlers) => Some(handlers),
            _ => None,
        }
    }

    /// Descriptor of a model declared by type or by handlers. Expression
    /// models get theirs from the heap.
    pub fn declared_descriptor(&self) -> RuleResult<Option<TypeDescriptor>> {
        let descriptor = match &self.source {
            ModelSource::Type(annotation) => {
                extract_type_descriptor(annotation, AttributeOrigin::DirectArg)?
            }
            ModelSource::Handlers(handlers) => handlers.read.function.return_descriptor()?,
            ModelSource::Expression(_) => return Ok(None),
        };
        check_model_shape(&self.name, &descriptor)?;
        Ok(Some(descriptor))
    }

    /// Calls the read handler with the injected parameters read from `ctx`.
    pub fn read(&self, ctx: &DataContext) -> RuleResult<Value> {
        let handlers = self.handlers().ok_or_else(|| {
            RuleError::evaluation(self.name.clone(), "model has no read handler")
        })?;
        let kwargs = handlers.read.injected(ctx)?;
        handlers.read.function.call(&[], &kwargs)
    }

    /// Calls the save handler passing `instance` as the model parameter.
    pub fn save(&self, ctx: &DataContext, instance: Value) -> RuleResult<Value> {
        let handlers = self.handlers().ok_or_else(|| {
            RuleError::evaluation(self.name.clone(), "model has no save handler")
        })?;
        let mut kwargs = handlers.save.injected(ctx)?;
        if let Some(param) = &handlers.save.model_param_name {
            kwargs.insert(param.clone(), instance);
        }
        handlers.save.function.call(&[], &kwargs)
    }
}

/// A bound model must be a record model or a list of a plain type.
pub(crate) fn check_model_shape(name: &str, descriptor: &TypeDescriptor) -> RuleResult<()> {
    match &descriptor.underlying {
        TypeAnnotation::Model(_) => Ok(()),
        TypeAnnotation::Scalar(_) | TypeAnnotation::Enum(_) if descriptor.is_list => Ok(()),
        other => Err(RuleError::setup_name(format!(
            "Model {} needs to be a record model or a list of a plain type, got {}",
            name, other
        ))),
    }
}

impl fmt::Display for BoundModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ModelSource::Type(annotation) => write!(f, "{}: {}", self.name, annotation),
            ModelSource::Expression(expr) => write!(f, "{} = {}", self.name, expr),
            ModelSource::Handlers(handlers) => {
                write!(f, "{} via {}", self.name, handlers.read.function)
            }
        }
    }
}
