//! Declarative components and their two-phase setup.
//!
//! Components are declared as a nested tree. During container setup the
//! tree is flattened into a [`ComponentTree`] (every component gets a
//! unique name and its owner), then every component binds its expressions
//! against the container's heap.

pub mod field;
pub mod tree;


use std::{fmt, sync::Arc};

use crate::{
    container::Container,
    error::{RuleError, RuleResult},
    expression::{DataContext, Expression, Operand, Value},
    model::{BoundModel, ModelSource},
    type_hint::{FunctionDecl, TypeDescriptor},
    validate_identifier,
    validation::{CardinalityValidation, UniqueValidation},
};

pub use field::{ChoiceOption, ChoiceSpec, Choices, EnumSpec, Field, FieldKind, FieldType};
pub use tree::{ComponentNode, ComponentTree, UnresolvedExpression};

pub(crate) use tree::SetupContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ComponentKind {
    RuleSet,
    Extension,
    Field,
    Section,
    DataVar,
    Validation,
    BoundModel,
    Cardinality,
    Unique,
}

impl ComponentKind {
    /// Only fields and data variables may appear in expressions.
    pub fn is_referenceable(self) -> bool {
        matches!(self, ComponentKind::Field | ComponentKind::DataVar)
    }
}

/// Who owns a component. `Top` marks the rule set, `Parent` the main node
/// of an extension, owned by a component of the enclosing container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Owner {
    #[default]
    Unset,
    Top,
    Component(ComponentId),
    Parent(String),
}

/// A group of components, shown together.
#[derive(Debug)]
pub struct Section {
    name: String,
    contains: Vec<Component>,
    validations: Vec<Validation>,
    available: Option<Operand>,
}

impl Section {
    pub fn new(name: &str) -> RuleResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            contains: Vec::new(),
            validations: Vec::new(),
            available: None,
        })
    }

    pub fn contains<C: Into<Component>>(mut self, component: C) -> Self {
        self.contains.push(component.into());
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    pub fn available<O: Into<Operand>>(mut self, available: O) -> Self {
        self.available = Some(available.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn available_operand(&self) -> Option<&Operand> {
        self.available.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum DataVarValue {
    Expression(Expression),
    Function(Arc<FunctionDecl>),
    Literal(Value),
}

/// A named value computed from an expression, a function or a constant.
#[derive(Debug, Clone)]
pub struct DataVar {
    name: String,
    value: DataVarValue,
}

impl DataVar {
    pub fn expression(name: &str, expr: Expression) -> RuleResult<Self> {
        Self::new(name, DataVarValue::Expression(expr))
    }

    pub fn function(name: &str, function: FunctionDecl) -> RuleResult<Self> {
        Self::new(name, DataVarValue::Function(Arc::new(function)))
    }

    pub fn literal<V: Into<Value>>(name: &str, value: V) -> RuleResult<Self> {
        Self::new(name, DataVarValue::Literal(value.into()))
    }

    fn new(name: &str, value: DataVarValue) -> RuleResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DataVarValue {
        &self.value
    }

    /// Type of the provided data, known up front only for functions.
    pub fn descriptor(&self) -> RuleResult<Option<TypeDescriptor>> {
        match &self.value {
            DataVarValue::Function(function) => function.return_descriptor().map(Some),
            DataVarValue::Expression(_) | DataVarValue::Literal(_) => Ok(None),
        }
    }

    pub fn read(&self, ctx: &DataContext) -> RuleResult<Value> {
        match &self.value {
            DataVarValue::Expression(expr) => expr.read(ctx),
            DataVarValue::Function(function) => function.call(&[], &Default::default()),
            DataVarValue::Literal(value) => Ok(value.clone()),
        }
    }
}

/// A rule that must hold for the data, with the message shown otherwise.
#[derive(Debug, Clone)]
pub struct Validation {
    name: String,
    ensure: Expression,
    message: String,
    available: Option<Operand>,
}

impl Validation {
    pub fn new(name: &str, ensure: Expression, message: &str) -> RuleResult<Self> {
        validate_identifier(name)?;
        if message.is_empty() {
            return Err(RuleError::setup_value(format!(
                "Validation {} needs a message",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            ensure,
            message: message.to_string(),
            available: None,
        })
    }

    pub fn available<O: Into<Operand>>(mut self, available: O) -> Self {
        self.available = Some(available.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ensure(&self) -> &Expression {
        &self.ensure
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Reads `ensure` and checks its truthiness.
    pub fn validate(&self, ctx: &DataContext, raise_err: bool) -> RuleResult<bool> {
        let passed = self.ensure.read(ctx)?.is_truthy();
        match (passed, raise_err) {
            (false, true) => Err(RuleError::validation(self.name.clone(), self.message.clone())),
            _ => Ok(passed),
        }
    }
}

/// Any declarable component.
#[derive(Debug)]
pub enum Component {
    Field(Field),
    Section(Section),
    DataVar(DataVar),
    Validation(Validation),
    BoundModel(BoundModel),
    Extension(Box<Container>),
    Cardinality(CardinalityValidation),
    Unique(UniqueValidation),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Field(_) => ComponentKind::Field,
            Component::Section(_) => ComponentKind::Section,
            Component::DataVar(_) => ComponentKind::DataVar,
            Component::Validation(_) => ComponentKind::Validation,
            Component::BoundModel(_) => ComponentKind::BoundModel,
            Component::Extension(_) => ComponentKind::Extension,
            Component::Cardinality(_) => ComponentKind::Cardinality,
            Component::Unique(_) => ComponentKind::Unique,
        }
    }

    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Component::Field(field) => Some(field.name()),
            Component::Section(section) => Some(section.name()),
            Component::DataVar(data_var) => Some(data_var.name()),
            Component::Validation(validation) => Some(validation.name()),
            Component::BoundModel(model) => Some(model.name()),
            Component::Extension(container) => Some(container.name()),
            Component::Cardinality(cardinality) => cardinality.name(),
            Component::Unique(unique) => unique.name(),
        }
    }

    /// Declared name, or `<owner>__<kind>` for unnamed children validations.
    pub(crate) fn resolve_name(&self, owner_name: &str) -> RuleResult<String> {
        match self.declared_name() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            Some(_) => Err(RuleError::setup_name(format!(
                "{} declared with an empty name",
                self.kind()
            ))),
            None => Ok(format!(
                "{}__{}",
                owner_name,
                self.kind().to_string().to_lowercase()
            )),
        }
    }

    pub(crate) fn set_owner(&mut self, owner: Owner, owner_name: &str) -> RuleResult<()> {
        match self {
            Component::Extension(container) => container.set_owner(owner, owner_name),
            Component::Cardinality(cardinality) => {
                cardinality.set_owner_name(owner_name);
                Ok(())
            }
            Component::Unique(unique) => {
                unique.set_owner_name(owner_name);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Moves nested declarations out so they can be registered on their own.
    pub(crate) fn take_children(&mut self) -> Vec<Component> {
        match self {
            Component::Field(field) => field.take_children(),
            Component::Section(section) => {
                let mut children = std::mem::take(&mut section.contains);
                children.extend(
                    std::mem::take(&mut section.validations)
                        .into_iter()
                        .map(Component::Validation),
                );
                children
            }
            Component::BoundModel(model) => model
                .take_nested()
                .into_iter()
                .map(Component::BoundModel)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Binds the component's own expressions.
    pub(crate) fn setup(&mut self, name: &str, ctx: &mut SetupContext<'_>) -> RuleResult<()> {
        match self {
            Component::Field(field) => field.setup(ctx),
            Component::Section(section) => {
                if let Some(available) = section.available.as_mut() {
                    ctx.setup_operand(available, name)?;
                }
                Ok(())
            }
            Component::DataVar(data_var) => {
                if let DataVarValue::Expression(expr) = &mut data_var.value {
                    ctx.setup_expression(expr, name)?;
                }
                Ok(())
            }
            Component::Validation(validation) => {
                ctx.setup_expression(&mut validation.ensure, name)?;
                if let Some(available) = validation.available.as_mut() {
                    ctx.setup_operand(available, name)?;
                }
                Ok(())
            }
            Component::BoundModel(model) => {
                match model.source_mut() {
                    ModelSource::Handlers(handlers) => {
                        for expr in handlers
                            .read
                            .inject_params
                            .values_mut()
                            .chain(handlers.save.inject_params.values_mut())
                        {
                            ctx.setup_expression(expr, name)?;
                        }
                    }
                    // resolved while the models were registered
                    ModelSource::Expression(_) | ModelSource::Type(_) => {}
                }
                Ok(())
            }
            Component::Extension(container) => container.setup_extension(ctx.heap, ctx.config),
            Component::Cardinality(_) | Component::Unique(_) => Ok(()),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.kind(),
            self.declared_name().unwrap_or("<unnamed>")
        )
    }
}

impl From<Field> for Component {
    fn from(field: Field) -> Self {
        Component::Field(field)
    }
}

impl From<Section> for Component {
    fn from(section: Section) -> Self {
        Component::Section(section)
    }
}

impl From<DataVar> for Component {
    fn from(data_var: DataVar) -> Self {
        Component::DataVar(data_var)
    }
}

impl From<Validation> for Component {
    fn from(validation: Validation) -> Self {
        Component::Validation(validation)
    }
}

impl From<Container> for Component {
    fn from(container: Container) -> Self {
        Component::Extension(Box::new(container))
    }
}
