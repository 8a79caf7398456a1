use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::{RuleError, RuleResult},
    expression::{Expression, Node, Operand, Value},
    heap::{BoundVar, VarId},
    namespace::Namespace,
    type_hint::{
        extract_attribute, EnumType, FunctionDecl, ScalarType, TypeAnnotation, TypeDescriptor,
    },
    validate_identifier,
};

use super::{Component, SetupContext, Validation};

/// Widget type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    Input,
    Text,
    Number,
    Email,
    Password,
    Date,
    Boolean,
    Choice,
    Enum,
}

/// A fixed choice.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOption {
    pub value: Value,
    pub label: String,
}

impl ChoiceOption {
    pub fn new<V: Into<Value>>(value: V, label: &str) -> Self {
        Self {
            value: value.into(),
            label: label.to_string(),
        }
    }
}

/// Where the choices of a choice field come from.
#[derive(Debug, Clone)]
pub enum Choices {
    /// A list reachable in the heap, e.g. `DP.countries`.
    Expression(Expression),
    /// A function returning a list of records.
    Function(Arc<FunctionDecl>),
    Options(Vec<ChoiceOption>),
}

#[derive(Debug, Clone)]
pub struct ChoiceSpec {
    pub choices: Choices,
    /// `This.<attr>` of a choice record giving the stored value.
    pub value: Option<Expression>,
    /// `This.<attr>` of a choice record giving the shown label.
    pub label: Option<Expression>,
}

#[derive(Debug, Clone, Default)]
pub struct EnumSpec {
    /// Explicit enum, otherwise taken from the bound type.
    pub enum_type: Option<Arc<EnumType>>,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Input,
    Boolean,
    Choice(ChoiceSpec),
    Enum(EnumSpec),
}

impl FieldKind {
    fn default_type(&self) -> FieldType {
        match self {
            FieldKind::Input => FieldType::Input,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Choice(_) => FieldType::Choice,
            FieldKind::Enum(_) => FieldType::Enum,
        }
    }

    fn accepts(&self, field_type: FieldType) -> bool {
        match self {
            FieldKind::Input => !matches!(
                field_type,
                FieldType::Boolean | FieldType::Choice | FieldType::Enum
            ),
            _ => field_type == self.default_type(),
        }
    }
}

/// A data-entry field bound to a model attribute.
#[derive(Debug)]
pub struct Field {
    name: String,
    bind: Expression,
    field_type: FieldType,
    kind: FieldKind,
    required: Option<Operand>,
    editable: Option<Operand>,
    available: Option<Operand>,
    default: Option<Operand>,
    validations: Vec<Validation>,
    enables: Vec<Component>,
    bound_variable: Option<BoundVar>,
    bound_descriptor: Option<TypeDescriptor>,
    variable: Option<VarId>,
}

/// `M.company.name` gives `name`, `M.company.address.city` gives
/// `address__city`.
fn name_from_bind(bind: &Expression) -> RuleResult<String> {
    if bind
        .path()
        .iter()
        .any(|hop| matches!(hop.node(), Node::Op(_)))
    {
        return Err(RuleError::setup_value(format!(
            "Field bind {} can not contain operations",
            bind
        )));
    }
    let names = bind.attr_names();
    match names.as_slice() {
        [] => Err(RuleError::setup_value("Field bind has an empty path")),
        [only] | [_, only] => Ok(only.to_string()),
        [_, rest @ ..] => Ok(rest.join("__")),
    }
}

impl Field {
    fn new(bind: Expression, kind: FieldKind) -> RuleResult<Self> {
        let name = name_from_bind(&bind)?;
        Ok(Self {
            name,
            bind,
            field_type: kind.default_type(),
            kind,
            required: None,
            editable: None,
            available: None,
            default: None,
            validations: Vec::new(),
            enables: Vec::new(),
            bound_variable: None,
            bound_descriptor: None,
            variable: None,
        })
    }

    pub fn input(bind: Expression) -> RuleResult<Self> {
        Self::new(bind, FieldKind::Input)
    }

    pub fn boolean(bind: Expression) -> RuleResult<Self> {
        Self::new(bind, FieldKind::Boolean)
    }

    pub fn choice(bind: Expression, choices: Choices) -> RuleResult<Self> {
        Self::new(
            bind,
            FieldKind::Choice(ChoiceSpec {
                choices,
                value: None,
                label: None,
            }),
        )
    }

    pub fn enumeration(bind: Expression) -> RuleResult<Self> {
        Self::new(bind, FieldKind::Enum(EnumSpec::default()))
    }

    pub fn with_name(mut self, name: &str) -> RuleResult<Self> {
        validate_identifier(name)?;
        self.name = name.to_string();
        Ok(self)
    }

    pub fn with_type(mut self, field_type: FieldType) -> RuleResult<Self> {
        if !self.kind.accepts(field_type) {
            return Err(RuleError::setup_value(format!(
                "Field {} of kind {} can not have type {}",
                self.name,
                self.kind.default_type(),
                field_type
            )));
        }
        self.field_type = field_type;
        Ok(self)
    }

    pub fn with_enum(mut self, enum_type: EnumType) -> RuleResult<Self> {
        match &mut self.kind {
            FieldKind::Enum(spec) => {
                spec.enum_type = Some(Arc::new(enum_type));
                Ok(self)
            }
            _ => Err(RuleError::setup_value(format!(
                "Field {} is not an enum field",
                self.name
            ))),
        }
    }

    pub fn choice_value(self, value: Expression) -> RuleResult<Self> {
        self.with_choice_spec(|spec| spec.value = Some(value))
    }

    pub fn choice_label(self, label: Expression) -> RuleResult<Self> {
        self.with_choice_spec(|spec| spec.label = Some(label))
    }

    fn with_choice_spec<F: FnOnce(&mut ChoiceSpec)>(mut self, update: F) -> RuleResult<Self> {
        match &mut self.kind {
            FieldKind::Choice(spec) => {
                update(spec);
                Ok(self)
            }
            _ => Err(RuleError::setup_value(format!(
                "Field {} is not a choice field",
                self.name
            ))),
        }
    }

    pub fn required<O: Into<Operand>>(mut self, required: O) -> Self {
        self.required = Some(required.into());
        self
    }

    pub fn editable<O: Into<Operand>>(mut self, editable: O) -> Self {
        self.editable = Some(editable.into());
        self
    }

    pub fn available<O: Into<Operand>>(mut self, available: O) -> Self {
        self.available = Some(available.into());
        self
    }

    pub fn default_value<O: Into<Operand>>(mut self, default: O) -> RuleResult<Self> {
        let default = default.into();
        if let (FieldKind::Boolean, Operand::Literal(value)) = (&self.kind, &default) {
            if !matches!(value, Value::Boolean(_)) {
                return Err(RuleError::setup_value(format!(
                    "Boolean field {} needs a boolean default, got {}",
                    self.name,
                    value.type_name()
                )));
            }
        }
        self.default = Some(default);
        Ok(self)
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Components shown only when this field is set.
    pub fn enables<C: Into<Component>>(mut self, component: C) -> Self {
        self.enables.push(component.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind(&self) -> &Expression {
        &self.bind
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default(&self) -> Option<&Operand> {
        self.default.as_ref()
    }

    /// Models-namespace variable the field reads from, set by setup.
    pub fn bound_variable(&self) -> Option<&BoundVar> {
        self.bound_variable.as_ref()
    }

    pub fn bound_descriptor(&self) -> Option<&TypeDescriptor> {
        self.bound_descriptor.as_ref()
    }

    /// Own Fields-namespace variable, set by setup.
    pub fn variable(&self) -> Option<VarId> {
        self.variable
    }

    pub(super) fn take_children(&mut self) -> Vec<Component> {
        let mut children: Vec<Component> = std::mem::take(&mut self.validations)
            .into_iter()
            .map(Component::Validation)
            .collect();
        children.append(&mut self.enables);
        children
    }

    pub(super) fn setup(&mut self, ctx: &mut SetupContext<'_>) -> RuleResult<()> {
        let name = self.name.clone();
        if self.bind.namespace() != Namespace::Models {
            return Err(RuleError::setup_value(format!(
                "Field bind {} must be in namespace {}",
                self.bind,
                Namespace::Models
            ))
            .with_owner(name.as_str()));
        }
        if self.bind.depth() > ctx.config.max_bind_depth {
            warn!(
                "{}: bind {} is deeper than {} attributes",
                name, self.bind, ctx.config.max_bind_depth
            );
        }

        self.bind.setup(ctx.heap, &name)?;
        if !self.bind.is_resolved() {
            return Err(self.bind.unresolved_error().with_owner(name.as_str()));
        }
        let bound = ctx.heap.get_by_expression_strict(&self.bind)?;
        let descriptor = bound.descriptor().cloned().ok_or_else(|| {
            RuleError::setup_type(format!("Bind {} has no type", self.bind))
                .with_owner(name.as_str())
        })?;
        let bound_var = BoundVar {
            heap_name: ctx.heap.name().to_string(),
            namespace: Namespace::Models,
            name: bound.name().to_string(),
        };

        if let Some(id) = ctx.heap.lookup(Namespace::Fields, &name) {
            ctx.heap.add_bound_var(id, bound_var.clone())?;
            self.variable = Some(id);
        }
        debug!("field {} bound to {}", name, bound_var);
        self.bound_variable = Some(bound_var);

        for operand in [
            &mut self.required,
            &mut self.editable,
            &mut self.available,
            &mut self.default,
        ]
        .into_iter()
        .flatten()
        {
            ctx.setup_operand(operand, &name)?;
        }

        let checked = match &mut self.kind {
            FieldKind::Input => Ok(()),
            FieldKind::Boolean => check_boolean(&descriptor),
            FieldKind::Enum(spec) => check_enum(spec, &descriptor, self.default.as_ref()),
            FieldKind::Choice(spec) => setup_choice(spec, ctx, &name),
        };
        self.bound_descriptor = Some(descriptor);
        checked.map_err(|e| e.with_owner(name.as_str()))
    }
}

fn check_boolean(descriptor: &TypeDescriptor) -> RuleResult<()> {
    match descriptor.underlying.as_scalar() {
        Some(ScalarType::Bool) if !descriptor.is_list => Ok(()),
        _ => Err(RuleError::setup_type(format!(
            "Boolean field needs a bool attribute, got {}",
            descriptor.annotation
        ))),
    }
}

fn check_enum(
    spec: &mut EnumSpec,
    descriptor: &TypeDescriptor,
    default: Option<&Operand>,
) -> RuleResult<()> {
    let enum_type = match (&spec.enum_type, &descriptor.underlying) {
        (None, TypeAnnotation::Enum(bound)) => bound.clone(),
        (Some(explicit), TypeAnnotation::Enum(bound)) if explicit == bound => explicit.clone(),
        (Some(explicit), TypeAnnotation::Scalar(scalar)) if *scalar == explicit.value_type() => {
            explicit.clone()
        }
        (Some(explicit), other) => {
            return Err(RuleError::setup_type(format!(
                "Enum {} holds {} values, bound attribute is {}",
                explicit.name(),
                explicit.value_type(),
                other
            )))
        }
        (None, other) => {
            return Err(RuleError::setup_type(format!(
                "Enum field needs an enum attribute or an explicit enum, got {}",
                other
            )))
        }
    };
    if let Some(Operand::Literal(value)) = default {
        if !enum_type.contains_value(value) {
            return Err(RuleError::setup_value(format!(
                "Default {} is not a member of {}",
                value,
                enum_type.name()
            )));
        }
    }
    spec.enum_type = Some(enum_type);
    Ok(())
}

fn setup_choice(spec: &mut ChoiceSpec, ctx: &mut SetupContext<'_>, owner: &str) -> RuleResult<()> {
    let record = match &mut spec.choices {
        Choices::Options(options) => {
            if options.is_empty() {
                return Err(RuleError::setup_value("Choice field needs at least one option"));
            }
            if spec.value.is_some() || spec.label.is_some() {
                return Err(RuleError::setup_value(
                    "Fixed options can not use choice value or label",
                ));
            }
            return Ok(());
        }
        Choices::Function(function) => Some(function.return_descriptor()?),
        Choices::Expression(expr) => match ctx.setup_expression(expr, owner)? {
            Some(id) => ctx.heap.variable(id)?.descriptor().cloned(),
            None => None,
        },
    };

    // untyped or unresolved choices are checked at runtime
    let Some(record) = record else {
        return Ok(());
    };
    if !record.is_list {
        return Err(RuleError::setup_value(format!(
            "Choices must be a list, got {}",
            record.annotation
        )));
    }
    if let Some(value) = spec.value.as_mut() {
        setup_choice_attr(value, &record, ctx.config.max_suggestions)?;
    }
    if let Some(label) = spec.label.as_mut() {
        let descriptor = setup_choice_attr(label, &record, ctx.config.max_suggestions)?;
        if descriptor.underlying.as_scalar() != Some(ScalarType::Str) {
            return Err(RuleError::setup_type(format!(
                "Choice label {} must be a string, got {}",
                label, descriptor.underlying
            )));
        }
    }
    Ok(())
}

/// Checks a `This.<attr>` expression against the choice record type.
fn setup_choice_attr(
    expr: &mut Expression,
    record: &TypeDescriptor,
    max_suggestions: usize,
) -> RuleResult<TypeDescriptor> {
    if expr.namespace() != Namespace::This || expr.depth() != 1 {
        return Err(RuleError::setup_value(format!(
            "Choice attribute {} must be a single attribute of {}",
            expr,
            Namespace::This
        )));
    }
    let attr = expr
        .attr_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| RuleError::internal(format!("Expression {} has no attribute", expr)))?;
    let descriptor = extract_attribute(record, &attr, max_suggestions)?;
    expr.setup_detached()?;
    Ok(descriptor)
}
