use std::{fmt, sync::Arc};

use crate::{
    component::{ComponentId, ComponentKind},
    namespace::Namespace,
    type_hint::{FunctionDecl, TypeDescriptor},
};

/// Index of a variable in its heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

/// What a variable stands for.
#[derive(Debug, Clone)]
pub enum VariableData {
    TypeHint(TypeDescriptor),
    Component { id: ComponentId, kind: ComponentKind },
    DataProvider { descriptor: Option<TypeDescriptor> },
    Function(Arc<FunctionDecl>),
    Object,
}

impl VariableData {
    pub fn descriptor(&self) -> Option<&TypeDescriptor> {
        match self {
            VariableData::TypeHint(descriptor) => Some(descriptor),
            VariableData::DataProvider { descriptor } => descriptor.as_ref(),
            _ => None,
        }
    }
}

/// `(heap, namespace, name)` of a variable another one is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundVar {
    pub heap_name: String,
    pub namespace: Namespace,
    pub name: String,
}

impl fmt::Display for BoundVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}.{}", self.heap_name, self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    namespace: Namespace,
    data: VariableData,
    denied: bool,
    deny_reason: Option<String>,
    references: Vec<String>,
    bound_list: Vec<BoundVar>,
}

impl Variable {
    pub fn new(name: &str, namespace: Namespace, data: VariableData) -> Self {
        Self {
            name: name.to_string(),
            namespace,
            data,
            denied: false,
            deny_reason: None,
            references: Vec::new(),
            bound_list: Vec::new(),
        }
    }

    /// A variable that exists but may not be used in expressions.
    pub fn denied(name: &str, namespace: Namespace, data: VariableData, reason: &str) -> Self {
        Self {
            denied: true,
            deny_reason: Some(reason.to_string()),
            ..Self::new(name, namespace, data)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn data(&self) -> &VariableData {
        &self.data
    }

    pub fn descriptor(&self) -> Option<&TypeDescriptor> {
        self.data.descriptor()
    }

    pub fn is_denied(&self) -> bool {
        self.denied
    }

    pub fn deny_reason(&self) -> Option<&str> {
        self.deny_reason.as_deref()
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn ref_count(&self) -> usize {
        self.references.len()
    }

    pub fn bound_list(&self) -> &[BoundVar] {
        &self.bound_list
    }

    pub(crate) fn add_reference(&mut self, owner_name: &str) {
        self.references.push(owner_name.to_string());
    }

    pub(crate) fn add_bound_var(&mut self, bound: BoundVar) {
        if !self.bound_list.contains(&bound) {
            self.bound_list.push(bound);
        }
    }

    pub fn is_bound_to(&self, name: &str) -> bool {
        self.bound_list.iter().any(|bound| bound.name == name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        if self.denied {
            write!(f, " (denied)")?;
        }
        Ok(())
    }
}
