//! Rule sets and extensions.
//!
//! A [`Container`] owns one heap and one flattened component tree. The
//! top-level container is a rule set. An extension is a repeating or
//! optional sub-record declared inside another container: it has its own
//! heap and tree and is linked to its parent only through the model
//! variable it is bound to.

use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    component::{
        Component, ComponentKind, ComponentNode, ComponentTree, DataVar, DataVarValue, Owner,
        Section, SetupContext, UnresolvedExpression, Validation,
    },
    config::SetupConfig,
    error::{closest_matches, RuleError, RuleResult},
    expression::Value,
    heap::{BoundVar, Heap, VarId, Variable, VariableData},
    model::{check_model_shape, BoundModel, ModelSource},
    namespace::Namespace,
    type_hint::TypeDescriptor,
    validate_identifier,
    validation::{CardinalityValidation, UniqueValidation},
};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ContainerKind {
    RuleSet,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ContainerState {
    Declared,
    Finished,
    Failed,
}

/// A registered bound model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub descriptor: TypeDescriptor,
    pub var: VarId,
}

#[derive(Debug)]
pub struct Container {
    name: String,
    kind: ContainerKind,
    main_model: Option<BoundModel>,
    main_model_name: String,
    contains: Vec<Component>,
    dataproviders: Vec<DataVar>,
    validations: Vec<Validation>,
    cardinality: Option<CardinalityValidation>,
    uniques: Vec<UniqueValidation>,
    config: SetupConfig,
    owner: Owner,
    owner_name: Option<String>,
    state: ContainerState,
    heap: Option<Heap>,
    tree: Option<ComponentTree>,
    models: IndexMap<String, ModelInfo>,
    bound_variable: Option<BoundVar>,
    unresolved: Vec<UnresolvedExpression>,
}

impl Container {
    fn new(name: &str, kind: ContainerKind, model: BoundModel, owner: Owner) -> RuleResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            kind,
            main_model_name: model.name().to_string(),
            main_model: Some(model),
            contains: Vec::new(),
            dataproviders: Vec::new(),
            validations: Vec::new(),
            cardinality: None,
            uniques: Vec::new(),
            config: SetupConfig::default(),
            owner,
            owner_name: None,
            state: ContainerState::Declared,
            heap: None,
            tree: None,
            models: IndexMap::new(),
            bound_variable: None,
            unresolved: Vec::new(),
        })
    }

    /// Top-level container. Its model is declared by type or by handlers.
    pub fn rules(name: &str, model: BoundModel) -> RuleResult<Self> {
        if model.is_expression() {
            return Err(RuleError::setup_value(format!(
                "Main model {} of rule set {} can not be an expression",
                model.name(),
                name
            )));
        }
        Self::new(name, ContainerKind::RuleSet, model, Owner::Top)
    }

    /// Nested container bound to a model expression of the parent, e.g.
    /// `M.company.employees`.
    pub fn extension(
        name: &str,
        model: BoundModel,
        cardinality: CardinalityValidation,
    ) -> RuleResult<Self> {
        if !model.is_expression() {
            return Err(RuleError::setup_value(format!(
                "Main model {} of extension {} must be an expression into the parent models",
                model.name(),
                name
            )));
        }
        let mut container = Self::new(name, ContainerKind::Extension, model, Owner::Unset)?;
        container.cardinality = Some(cardinality);
        Ok(container)
    }

    pub fn contains<C: Into<Component>>(mut self, component: C) -> Self {
        self.contains.push(component.into());
        self
    }

    pub fn dataprovider(mut self, dataprovider: DataVar) -> Self {
        self.dataproviders.push(dataprovider);
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    pub fn unique(mut self, unique: UniqueValidation) -> Self {
        self.uniques.push(unique);
        self
    }

    pub fn with_config(mut self, config: SetupConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a section to a container that was not set up yet.
    pub fn add_section(&mut self, section: Section) -> RuleResult<()> {
        if self.state != ContainerState::Declared {
            return Err(RuleError::setup(format!(
                "Container {} is {}, sections can not be added",
                self.name, self.state
            )));
        }
        if self
            .contains
            .iter()
            .any(|c| c.declared_name() == Some(section.name()))
        {
            return Err(RuleError::setup_name(format!(
                "Container {} already contains {}",
                self.name,
                section.name()
            )));
        }
        self.contains.push(Component::Section(section));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == ContainerState::Finished
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn main_model_name(&self) -> &str {
        &self.main_model_name
    }

    pub fn cardinality(&self) -> Option<&CardinalityValidation> {
        self.cardinality.as_ref()
    }

    pub fn uniques(&self) -> &[UniqueValidation] {
        &self.uniques
    }

    /// The finished heap.
    pub fn heap(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }

    /// The flattened components, container node first.
    pub fn components(&self) -> Option<&ComponentTree> {
        self.tree.as_ref()
    }

    pub fn models(&self) -> &IndexMap<String, ModelInfo> {
        &self.models
    }

    /// Parent variable an extension is bound to.
    pub fn bound_variable(&self) -> Option<&BoundVar> {
        self.bound_variable.as_ref()
    }

    /// Expressions that stayed unresolved, in setup order.
    pub fn unresolved(&self) -> &[UnresolvedExpression] {
        &self.unresolved
    }

    fn component_kind(&self) -> ComponentKind {
        match self.kind {
            ContainerKind::RuleSet => ComponentKind::RuleSet,
            ContainerKind::Extension => ComponentKind::Extension,
        }
    }

    fn finished_tree(&self) -> RuleResult<&ComponentTree> {
        self.tree.as_ref().ok_or_else(|| {
            RuleError::setup(format!(
                "Container {} is {}, not set up",
                self.name, self.state
            ))
        })
    }

    pub(crate) fn set_owner(&mut self, owner: Owner, owner_name: &str) -> RuleResult<()> {
        if self.kind == ContainerKind::RuleSet {
            return Err(RuleError::setup_value(format!(
                "Rule set {} can not be nested in {}",
                self.name, owner_name
            )));
        }
        if self.owner != Owner::Unset {
            return Err(RuleError::internal(format!(
                "Extension {} already has owner {:?}, got {:?}",
                self.name, self.owner, owner
            )));
        }
        self.owner = Owner::Parent(owner_name.to_string());
        self.owner_name = Some(owner_name.to_string());
        Ok(())
    }

    /// Sets up a rule set and, through its components, every extension.
    pub fn setup(&mut self) -> RuleResult<()> {
        if self.kind == ContainerKind::Extension {
            return Err(RuleError::setup_value(format!(
                "Extension {} is set up by the container that owns it",
                self.name
            )));
        }
        self.run(None)
    }

    pub(crate) fn setup_extension(
        &mut self,
        parent_heap: &mut Heap,
        config: &SetupConfig,
    ) -> RuleResult<()> {
        if self.kind != ContainerKind::Extension {
            return Err(RuleError::internal(format!(
                "Container {} is not an extension",
                self.name
            )));
        }
        self.config = config.clone();
        self.run(Some(parent_heap))
    }

    fn run(&mut self, parent_heap: Option<&mut Heap>) -> RuleResult<()> {
        match self.state {
            ContainerState::Declared => {}
            ContainerState::Finished => {
                return Err(RuleError::setup(format!(
                    "Container {} already set up",
                    self.name
                )))
            }
            ContainerState::Failed => {
                return Err(RuleError::setup(format!(
                    "Setup of container {} failed before",
                    self.name
                )))
            }
        }
        match self.build(parent_heap) {
            Ok((heap, tree)) => {
                debug!(
                    "container {} finished: {} components, {} variables, {} unresolved",
                    self.name,
                    tree.len(),
                    heap.variables_count(),
                    self.unresolved.len()
                );
                self.heap = Some(heap);
                self.tree = Some(tree);
                self.state = ContainerState::Finished;
                Ok(())
            }
            Err(err) => {
                self.state = ContainerState::Failed;
                Err(err.with_owner(self.name.as_str()))
            }
        }
    }

    #[tracing::instrument(skip(self, parent_heap), fields(container = %self.name), level = "debug")]
    fn build(&mut self, parent_heap: Option<&mut Heap>) -> RuleResult<(Heap, ComponentTree)> {
        let mut heap = Heap::new(&self.name).with_max_suggestions(self.config.max_suggestions);

        let mut main_model = self.main_model.take().ok_or_else(|| {
            RuleError::internal(format!("Container {} has no main model", self.name))
        })?;
        let main_descriptor = match (self.kind, parent_heap) {
            (ContainerKind::RuleSet, _) => self.register_model(&mut main_model, &mut heap)?,
            (ContainerKind::Extension, Some(parent_heap)) => {
                let descriptor =
                    self.register_extension_model(&mut main_model, &mut heap, parent_heap)?;
                for nested in main_model.nested_mut() {
                    self.register_model(nested, &mut heap)?;
                }
                descriptor
            }
            (ContainerKind::Extension, None) => {
                return Err(RuleError::internal(format!(
                    "Extension {} set up without a parent heap",
                    self.name
                )))
            }
        };

        for dataprovider in &self.dataproviders {
            let data = match dataprovider.value() {
                DataVarValue::Function(function) => VariableData::Function(function.clone()),
                DataVarValue::Expression(_) | DataVarValue::Literal(_) => {
                    VariableData::DataProvider {
                        descriptor: dataprovider.descriptor()?,
                    }
                }
            };
            heap.add(
                Variable::new(dataprovider.name(), Namespace::DataProviders, data),
                None,
            )?;
        }

        let mut tree = self.flatten(main_model)?;
        register_component_variables(&tree, &mut heap)?;

        let mut ctx = SetupContext {
            heap: &mut heap,
            config: &self.config,
            unresolved: &mut self.unresolved,
        };
        tree.bind(&mut ctx)?;

        tree.ensure_finished()?;
        heap.finish()?;
        if self.config.fail_on_unresolved && !self.unresolved.is_empty() {
            let listed: Vec<String> = self.unresolved.iter().map(|u| u.to_string()).collect();
            return Err(RuleError::setup(format!(
                "{} expressions not resolved: {}",
                listed.len(),
                listed.join("; ")
            )));
        }

        if let Some(cardinality) = &self.cardinality {
            cardinality.validate_setup(&main_descriptor)?;
        }
        for unique in &self.uniques {
            unique.validate_setup(&heap, self.config.max_suggestions)?;
        }
        Ok((heap, tree))
    }

    /// Registers a model declared by type, by handlers or by an expression
    /// into the own heap, then its nested models.
    fn register_model(
        &mut self,
        model: &mut BoundModel,
        heap: &mut Heap,
    ) -> RuleResult<TypeDescriptor> {
        let name = model.name().to_string();
        if self.models.contains_key(&name) {
            return Err(RuleError::setup_name(format!(
                "Model {} is already registered in {}",
                name, self.name
            )));
        }
        let (descriptor, id) = match model.source_mut() {
            ModelSource::Expression(expr) => {
                if expr.namespace() != Namespace::Models {
                    return Err(RuleError::setup_value(format!(
                        "Model expression {} must be in namespace {}",
                        expr,
                        Namespace::Models
                    ))
                    .with_owner(name.as_str()));
                }
                let id = expr
                    .setup(heap, &name)?
                    .ok_or_else(|| expr.unresolved_error().with_owner(name.as_str()))?;
                let variable = heap.variable(id)?;
                let descriptor = variable.descriptor().cloned().ok_or_else(|| {
                    RuleError::setup_type(format!("Model expression {} has no type", expr))
                        .with_owner(name.as_str())
                })?;
                check_model_shape(&name, &descriptor)?;
                if variable.name() != name {
                    heap.add_alias(id, &name)?;
                }
                (descriptor, id)
            }
            ModelSource::Type(_) | ModelSource::Handlers(_) => {
                let descriptor = model
                    .declared_descriptor()?
                    .ok_or_else(|| RuleError::internal(format!("Model {} has no type", name)))?;
                let id = heap.add(
                    Variable::new(
                        &name,
                        Namespace::Models,
                        VariableData::TypeHint(descriptor.clone()),
                    ),
                    None,
                )?;
                (descriptor, id)
            }
        };
        debug!("model {} registered as {}", name, descriptor);
        self.models.insert(
            name,
            ModelInfo {
                descriptor: descriptor.clone(),
                var: id,
            },
        );
        for nested in model.nested_mut() {
            self.register_model(nested, heap)?;
        }
        Ok(descriptor)
    }

    /// Resolves the extension's model in the parent heap and binds a local
    /// copy to it.
    fn register_extension_model(
        &mut self,
        model: &mut BoundModel,
        heap: &mut Heap,
        parent_heap: &mut Heap,
    ) -> RuleResult<TypeDescriptor> {
        let name = model.name().to_string();
        let expr = match model.source_mut() {
            ModelSource::Expression(expr) if expr.namespace() == Namespace::Models => expr,
            _ => {
                return Err(RuleError::setup_value(format!(
                    "Extension model {} must be an expression in namespace {}",
                    name,
                    Namespace::Models
                )))
            }
        };
        let parent_id = expr
            .setup(parent_heap, &self.name)?
            .ok_or_else(|| expr.unresolved_error().with_owner(self.name.as_str()))?;

        let parent_var = parent_heap.variable(parent_id)?;
        let descriptor = parent_var.descriptor().cloned().ok_or_else(|| {
            RuleError::setup_type(format!("Model expression {} has no type", expr))
        })?;
        check_model_shape(&name, &descriptor)?;
        let parent_bound = BoundVar {
            heap_name: parent_heap.name().to_string(),
            namespace: Namespace::Models,
            name: parent_var.name().to_string(),
        };

        parent_heap.add_bound_var(
            parent_id,
            BoundVar {
                heap_name: heap.name().to_string(),
                namespace: Namespace::Models,
                name: name.clone(),
            },
        )?;
        let mut local = Variable::new(
            &name,
            Namespace::Models,
            VariableData::TypeHint(descriptor.clone()),
        );
        local.add_bound_var(parent_bound.clone());
        let id = heap.add(local, None)?;

        debug!("extension {} bound to {}", self.name, parent_bound);
        self.bound_variable = Some(parent_bound);
        self.models.insert(
            name,
            ModelInfo {
                descriptor: descriptor.clone(),
                var: id,
            },
        );
        Ok(descriptor)
    }

    /// Flattens every declaration under the container node, in order: main
    /// model, children validations, contents, data providers, validations.
    fn flatten(&mut self, main_model: BoundModel) -> RuleResult<ComponentTree> {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(
            &self.name,
            self.component_kind(),
            self.owner.clone(),
            self.owner_name.clone(),
        )?;

        tree.fill(Component::BoundModel(main_model), root)?;
        if let Some(cardinality) = self.cardinality.as_mut() {
            cardinality.set_owner_name(&self.name);
            tree.fill(Component::Cardinality(cardinality.clone()), root)?;
        }
        for unique in self.uniques.iter_mut() {
            unique.set_owner_name(&self.name);
            tree.fill(Component::Unique(unique.clone()), root)?;
        }
        for component in std::mem::take(&mut self.contains) {
            if matches!(
                component.kind(),
                ComponentKind::Cardinality | ComponentKind::Unique
            ) {
                return Err(RuleError::setup_value(format!(
                    "{} must be declared on the extension, not in its contents",
                    component
                )));
            }
            tree.fill(component, root)?;
        }
        for dataprovider in std::mem::take(&mut self.dataproviders) {
            tree.fill(Component::DataVar(dataprovider), root)?;
        }
        for validation in std::mem::take(&mut self.validations) {
            tree.fill(Component::Validation(validation), root)?;
        }
        Ok(tree)
    }

    /// Looks a component up by name, with close names in the error.
    pub fn get_component(&self, name: &str) -> RuleResult<&ComponentNode> {
        self.finished_tree()?
            .get_strict(name, self.config.max_suggestions)
    }

    /// A nested extension by name.
    pub fn get_extension(&self, name: &str) -> RuleResult<&Container> {
        let node = self.get_component(name)?;
        match node.component() {
            Some(Component::Extension(container)) => Ok(container),
            _ => Err(RuleError::setup_value(format!(
                "Component {} is a {}, not an extension",
                name,
                node.kind()
            ))),
        }
    }

    /// Nested extensions in declaration order.
    pub fn extensions(&self) -> impl Iterator<Item = &Container> {
        self.tree
            .iter()
            .flat_map(|tree| tree.iter())
            .filter_map(|node| match node.component() {
                Some(Component::Extension(container)) => Some(container.as_ref()),
                _ => None,
            })
    }

    /// Name of the container holding component `name`, searching nested
    /// extensions too.
    pub fn owner_container_name(&self, name: &str) -> RuleResult<&str> {
        self.find_owner_container(name).ok_or_else(|| {
            let available = self.tree.as_ref().map(|t| t.names()).unwrap_or_default();
            RuleError::name_not_found(
                format!("Component '{}' not found in {} or its extensions", name, self.name),
                closest_matches(name, &available, self.config.max_suggestions),
            )
        })
    }

    fn find_owner_container(&self, name: &str) -> Option<&str> {
        let tree = self.tree.as_ref()?;
        if tree.get_by_name(name).is_some() {
            return Some(self.name.as_str());
        }
        self.extensions()
            .find_map(|extension| extension.find_owner_container(name))
    }

    /// Checks the items of an extension against its children validations.
    pub fn validate_children(&self, items: &[Value]) -> RuleResult<()> {
        if !self.is_finished() {
            return Err(RuleError::setup(format!(
                "Container {} is {}, not set up",
                self.name, self.state
            )));
        }
        if let Some(cardinality) = &self.cardinality {
            cardinality.validate(items.len(), true)?;
        }
        for unique in &self.uniques {
            unique.validate(items, true)?;
        }
        Ok(())
    }

    /// Indented dump of the component tree, extensions included.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        match self.tree.as_ref().and_then(|tree| tree.root().map(|root| (tree, root))) {
            Some((tree, root)) => self.describe_node(tree, root, 0, &mut out),
            None => {
                let _ = writeln!(out, "{} ({}, {})", self.name, self.kind, self.state);
            }
        }
        out
    }

    fn describe_node(&self, tree: &ComponentTree, node: &ComponentNode, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        if depth > self.config.max_describe_depth {
            let _ = writeln!(out, "{}...", indent);
            return;
        }
        let _ = write!(out, "{}{} ({})", indent, node.name(), node.kind());
        match node.component() {
            Some(Component::Field(field)) => {
                if let Some(bound) = field.bound_variable() {
                    let _ = write!(out, " -> {}", bound.name);
                }
            }
            Some(Component::BoundModel(model)) => {
                if let Some(info) = self.models.get(model.name()) {
                    let _ = write!(out, ": {}", info.descriptor.annotation);
                }
            }
            _ => {}
        }
        out.push('\n');

        if let Some(Component::Extension(container)) = node.component() {
            if let Some((child_tree, child_root)) = container
                .tree
                .as_ref()
                .and_then(|t| t.root().map(|root| (t, root)))
            {
                for child in child_root.children() {
                    if let Some(child) = child_tree.get(*child) {
                        container.describe_node(child_tree, child, depth + 1, out);
                    }
                }
            }
        }
        for child in node.children() {
            if let Some(child) = tree.get(*child) {
                self.describe_node(tree, child, depth + 1, out);
            }
        }
    }
}

/// Fields and data variables are referenceable, every other component is
/// registered as denied.
fn register_component_variables(tree: &ComponentTree, heap: &mut Heap) -> RuleResult<()> {
    for node in tree.iter() {
        let data = VariableData::Component {
            id: node.id(),
            kind: node.kind(),
        };
        let variable = if node.kind().is_referenceable() {
            Variable::new(node.name(), Namespace::Fields, data)
        } else {
            Variable::denied(
                node.name(),
                Namespace::Fields,
                data,
                &format!("{} {} can not be referenced", node.kind(), node.name()),
            )
        };
        heap.add(variable, None)?;
    }
    Ok(())
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.name, self.state)
    }
}
