//! Namespace-partitioned symbol table of a container.
//!
//! Every container owns one [`Heap`]. Variables live in an arena and are
//! indexed per [`Namespace`] by name; one variable may be reachable under an
//! alias as long as the alias is recorded in its bound list. Attribute
//! variables (`company.name`) are created on demand while expressions are
//! set up and cached for the next lookup. After [`Heap::finish`] the heap is
//! read-only.

pub mod variable;


use indexmap::IndexMap;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::{
    error::{closest_matches, RuleError, RuleResult},
    expression::Expression,
    model::BoundModel,
    namespace::Namespace,
    type_hint::extract_attribute,
};

pub use variable::{BoundVar, VarId, Variable, VariableData};

const DEFAULT_MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct Heap {
    name: String,
    variables: Vec<Variable>,
    namespaces: IndexMap<Namespace, IndexMap<String, VarId>>,
    variables_count: usize,
    max_suggestions: usize,
    finished: bool,
}

impl Heap {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            variables: Vec::new(),
            namespaces: Namespace::iter().map(|ns| (ns, IndexMap::new())).collect(),
            variables_count: 0,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            finished: false,
        }
    }

    pub fn with_max_suggestions(mut self, max_suggestions: usize) -> Self {
        self.max_suggestions = max_suggestions;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of registered names, aliases included.
    pub fn variables_count(&self) -> usize {
        self.variables_count
    }

    fn ensure_open(&self, action: &str) -> RuleResult<()> {
        if self.finished {
            return Err(RuleError::internal(format!(
                "Heap {} is finished, can not {}",
                self.name, action
            )));
        }
        Ok(())
    }

    fn index(&self, namespace: Namespace) -> RuleResult<&IndexMap<String, VarId>> {
        self.namespaces.get(&namespace).ok_or_else(|| {
            RuleError::internal(format!("Heap {} has no namespace {}", self.name, namespace))
        })
    }

    fn register(&mut self, namespace: Namespace, name: &str, id: VarId) -> RuleResult<()> {
        let heap_name = self.name.clone();
        let index = self.namespaces.get_mut(&namespace).ok_or_else(|| {
            RuleError::internal(format!("Heap {} has no namespace {}", heap_name, namespace))
        })?;
        if index.contains_key(name) {
            return Err(RuleError::setup_name(format!(
                "Variable '{}' already registered in {}.{}",
                name, heap_name, namespace
            )));
        }
        index.insert(name.to_string(), id);
        self.variables_count += 1;
        Ok(())
    }

    /// Registers `variable` under its own name, or under `alt_name`.
    pub fn add(&mut self, variable: Variable, alt_name: Option<&str>) -> RuleResult<VarId> {
        self.ensure_open(&format!("add variable {}", variable.name()))?;
        let namespace = variable.namespace();
        let name = alt_name.unwrap_or(variable.name()).to_string();
        if self.index(namespace)?.contains_key(&name) {
            return Err(RuleError::setup_name(format!(
                "Variable '{}' already registered in {}.{}",
                name, self.name, namespace
            )));
        }
        let id = VarId(self.variables.len());
        self.variables.push(variable);
        self.register(namespace, &name, id)?;
        debug!("heap {}: registered {}.{}", self.name, namespace, name);
        Ok(id)
    }

    /// Makes an existing variable reachable under a second name.
    pub fn add_alias(&mut self, id: VarId, alt_name: &str) -> RuleResult<()> {
        self.ensure_open(&format!("add alias {}", alt_name))?;
        let heap_name = self.name.clone();
        let variable = self.variable_mut(id)?;
        let namespace = variable.namespace();
        variable.add_bound_var(BoundVar {
            heap_name,
            namespace,
            name: alt_name.to_string(),
        });
        self.register(namespace, alt_name, id)
    }

    pub fn variable(&self, id: VarId) -> RuleResult<&Variable> {
        self.variables
            .get(id.0)
            .ok_or_else(|| RuleError::internal(format!("Heap {} has no variable #{}", self.name, id.0)))
    }

    pub(crate) fn variable_mut(&mut self, id: VarId) -> RuleResult<&mut Variable> {
        let heap_name = &self.name;
        self.variables
            .get_mut(id.0)
            .ok_or_else(|| RuleError::internal(format!("Heap {} has no variable #{}", heap_name, id.0)))
    }

    pub fn lookup(&self, namespace: Namespace, name: &str) -> Option<VarId> {
        self.namespaces
            .get(&namespace)
            .and_then(|index| index.get(name))
            .copied()
    }

    pub fn get(&self, namespace: Namespace, name: &str) -> Option<&Variable> {
        self.lookup(namespace, name)
            .and_then(|id| self.variables.get(id.0))
    }

    pub fn get_strict(&self, namespace: Namespace, name: &str) -> RuleResult<&Variable> {
        self.get(namespace, name).ok_or_else(|| {
            RuleError::setup_name(format!(
                "Variable '{}' not found in {}.{}",
                name, self.name, namespace
            ))
        })
    }

    pub fn get_by_bound_model(&self, bound_model: &BoundModel) -> Option<&Variable> {
        self.get(Namespace::Models, bound_model.name())
    }

    /// Variable an already resolved expression points to.
    pub fn get_by_expression(&self, expr: &Expression) -> Option<&Variable> {
        expr.var_name()
            .and_then(|name| self.get(expr.namespace(), name))
    }

    pub fn get_by_expression_strict(&self, expr: &Expression) -> RuleResult<&Variable> {
        let name = expr.var_name().ok_or_else(|| {
            RuleError::internal(format!("Expression {} is not resolved", expr))
        })?;
        self.get_strict(expr.namespace(), name)
    }

    pub fn names(&self, namespace: Namespace) -> Vec<String> {
        self.namespaces
            .get(&namespace)
            .map(|index| index.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered names of `namespace` with their variables, in insertion order.
    pub fn iter_namespace(&self, namespace: Namespace) -> impl Iterator<Item = (&str, &Variable)> {
        self.namespaces
            .get(&namespace)
            .into_iter()
            .flat_map(|index| index.iter())
            .filter_map(move |(name, id)| self.variables.get(id.0).map(|v| (name.as_str(), v)))
    }

    /// Resolves one hop of an expression.
    ///
    /// Without a parent the name is looked up directly in `namespace`. With a
    /// parent the variable `"<parent>.<name>"` is returned, created from the
    /// parent's type on first use.
    pub fn getset_attribute_variable(
        &mut self,
        namespace: Namespace,
        name: &str,
        parent: Option<VarId>,
    ) -> RuleResult<VarId> {
        if name.starts_with('_') {
            return Err(RuleError::setup_name(format!(
                "Attribute name '{}' can not start with '_'",
                name
            )));
        }

        let parent_id = match parent {
            Some(parent_id) => parent_id,
            None => {
                if let Some(id) = self.lookup(namespace, name) {
                    return Ok(id);
                }
                if !namespace.is_heap_backed() {
                    return Err(RuleError::unsupported(format!(
                        "Namespace {} is resolved at runtime, '{}' can not be set up",
                        namespace, name
                    )));
                }
                let available = self.names(namespace);
                return Err(RuleError::setup_name_not_found(
                    format!("Variable '{}' not found in namespace {}", name, namespace),
                    closest_matches(name, &available, self.max_suggestions),
                ));
            }
        };

        let parent = self.variable(parent_id)?;
        let full_name = format!("{}.{}", parent.name(), name);
        if let Some(id) = self.lookup(namespace, &full_name) {
            return Ok(id);
        }

        let parent_descriptor = match parent.data() {
            VariableData::TypeHint(descriptor) => descriptor.clone(),
            VariableData::DataProvider {
                descriptor: Some(descriptor),
            } => descriptor.clone(),
            VariableData::Function(function) => function.return_descriptor()?,
            VariableData::Component { kind, .. } => {
                return Err(RuleError::unsupported(format!(
                    "Attribute '{}' of {} {} can not be resolved at setup",
                    name,
                    kind,
                    parent.name()
                )))
            }
            VariableData::DataProvider { descriptor: None } | VariableData::Object => {
                return Err(RuleError::unsupported(format!(
                    "Variable {} has no type, attribute '{}' can not be resolved at setup",
                    parent.name(),
                    name
                )))
            }
        };

        let descriptor = extract_attribute(&parent_descriptor, name, self.max_suggestions)?;
        self.add(
            Variable::new(&full_name, namespace, VariableData::TypeHint(descriptor)),
            None,
        )
    }

    pub fn add_reference(&mut self, id: VarId, owner_name: &str) -> RuleResult<()> {
        self.ensure_open(&format!("add reference from {}", owner_name))?;
        self.variable_mut(id)?.add_reference(owner_name);
        Ok(())
    }

    pub fn add_bound_var(&mut self, id: VarId, bound: BoundVar) -> RuleResult<()> {
        self.ensure_open(&format!("bind to {}", bound))?;
        self.variable_mut(id)?.add_bound_var(bound);
        Ok(())
    }

    /// Freezes the heap after checking that every alias is explained.
    pub fn finish(&mut self) -> RuleResult<()> {
        if self.finished {
            return Err(RuleError::setup(format!(
                "Heap {} already finished",
                self.name
            )));
        }
        for (namespace, index) in &self.namespaces {
            for (alias, id) in index {
                let variable = self.variable(*id)?;
                if alias != variable.name() && !variable.is_bound_to(alias) {
                    return Err(RuleError::internal(format!(
                        "Heap {}: {}.{} is an alias of {} without a binding",
                        self.name,
                        namespace,
                        alias,
                        variable.name()
                    )));
                }
            }
        }
        self.finished = true;
        debug!(
            "heap {} finished with {} variables",
            self.name, self.variables_count
        );
        Ok(())
    }
}
