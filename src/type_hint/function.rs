use std::fmt;

use indexmap::IndexMap;

use crate::{
    error::{RuleError, RuleResult},
    expression::{DataFn, Value},
};

use super::{extract_type_descriptor, AttributeOrigin, TypeAnnotation, TypeDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
}

/// A callable with a declared signature and an optional implementation.
#[derive(Clone)]
pub struct FunctionDecl {
    name: String,
    params: Vec<Param>,
    returns: Option<TypeAnnotation>,
    body: Option<DataFn>,
}

impl FunctionDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            returns: None,
            body: None,
        }
    }

    pub fn param(mut self, name: &str, annotation: TypeAnnotation) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            annotation: Some(annotation),
        });
        self
    }

    pub fn untyped_param(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            annotation: None,
        });
        self
    }

    pub fn returns(mut self, annotation: TypeAnnotation) -> Self {
        self.returns = Some(annotation);
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&[Value], &IndexMap<String, Value>) -> RuleResult<Value> + Send + Sync + 'static,
    {
        self.body = Some(std::sync::Arc::new(body));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get_param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn return_annotation(&self) -> Option<&TypeAnnotation> {
        self.returns.as_ref()
    }

    /// Descriptor of the declared return type. Functions without a return
    /// type or returning nothing can not be bound.
    pub fn return_descriptor(&self) -> RuleResult<TypeDescriptor> {
        match &self.returns {
            None => Err(RuleError::setup_name(format!(
                "Function '{}' has no return type",
                self.name
            ))),
            Some(TypeAnnotation::Absent) => Err(RuleError::setup_name(format!(
                "Function '{}' returns nothing",
                self.name
            ))),
            Some(annotation) => extract_type_descriptor(annotation, AttributeOrigin::Function),
        }
    }

    pub fn call(&self, args: &[Value], kwargs: &IndexMap<String, Value>) -> RuleResult<Value> {
        match &self.body {
            Some(body) => body(args, kwargs),
            None => Err(RuleError::evaluation(
                self.name.clone(),
                "function has no implementation",
            )),
        }
    }
}

impl fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|param| match &param.annotation {
                Some(annotation) => format!("{}: {}", param.name, annotation),
                None => param.name.clone(),
            })
            .collect();
        write!(f, "{}({})", self.name, params.join(", "))?;
        if let Some(returns) = &self.returns {
            write!(f, " -> {}", returns)?;
        }
        Ok(())
    }
}
