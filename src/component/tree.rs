use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    config::SetupConfig,
    error::{closest_matches, RuleError, RuleResult},
    expression::{Expression, ExpressionStatus, Operand},
    heap::{Heap, VarId},
};

use super::{Component, ComponentId, ComponentKind, Owner};

/// An expression that stayed unresolved during setup.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedExpression {
    pub owner: String,
    pub expression: String,
    pub status: ExpressionStatus,
    pub reason: String,
}

impl fmt::Display for UnresolvedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}) {}",
            self.owner, self.expression, self.status, self.reason
        )
    }
}

/// State shared by components while they bind.
pub(crate) struct SetupContext<'a> {
    pub heap: &'a mut Heap,
    pub config: &'a SetupConfig,
    pub unresolved: &'a mut Vec<UnresolvedExpression>,
}

impl SetupContext<'_> {
    /// Sets up `expr` unless it already went through setup. A soft failure
    /// is logged and remembered, hard failures are returned.
    pub fn setup_expression(
        &mut self,
        expr: &mut Expression,
        owner: &str,
    ) -> RuleResult<Option<VarId>> {
        if expr.status() != ExpressionStatus::Initialized {
            return Ok(None);
        }
        let resolved = expr.setup(self.heap, owner)?;
        if !expr.is_resolved() {
            let reason = expr.failure().unwrap_or_default().to_string();
            warn!("{}: expression {} not resolved: {}", owner, expr, reason);
            self.unresolved.push(UnresolvedExpression {
                owner: owner.to_string(),
                expression: expr.to_string(),
                status: expr.status(),
                reason,
            });
        }
        Ok(resolved)
    }

    pub fn setup_operand(&mut self, operand: &mut Operand, owner: &str) -> RuleResult<()> {
        if let Operand::Expr(expr) = operand {
            self.setup_expression(expr, owner)?;
        }
        Ok(())
    }
}

/// One flattened component.
#[derive(Debug)]
pub struct ComponentNode {
    id: ComponentId,
    name: String,
    kind: ComponentKind,
    owner: Owner,
    owner_name: Option<String>,
    children: Vec<ComponentId>,
    component: Option<Component>,
    finished: bool,
}

impl ComponentNode {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    /// The declaration, `None` for the container's own node.
    pub fn component(&self) -> Option<&Component> {
        self.component.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Flat, name-indexed arena of a container's components in declaration
/// order.
#[derive(Debug, Default)]
pub struct ComponentTree {
    nodes: Vec<ComponentNode>,
    by_name: IndexMap<String, ComponentId>,
}

impl ComponentTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        name: String,
        kind: ComponentKind,
        owner: Owner,
        owner_name: Option<String>,
        component: Option<Component>,
    ) -> RuleResult<ComponentId> {
        if matches!(owner, Owner::Unset) {
            return Err(RuleError::internal(format!(
                "Component {} registered without an owner",
                name
            )));
        }
        if let Some(existing) = self.by_name.get(&name).and_then(|id| self.nodes.get(id.0)) {
            return Err(RuleError::setup_name(format!(
                "Component name '{}' ({} in {}) is already used by {} in {}",
                name,
                kind,
                owner_name.as_deref().unwrap_or("top"),
                existing.kind,
                existing.owner_name.as_deref().unwrap_or("top")
            )));
        }
        let id = ComponentId(self.nodes.len());
        debug!("component {} ({}) registered as #{}", name, kind, id.0);
        self.by_name.insert(name.clone(), id);
        self.nodes.push(ComponentNode {
            id,
            name,
            kind,
            owner,
            owner_name,
            children: Vec::new(),
            component,
            finished: false,
        });
        Ok(id)
    }

    /// Registers the container itself as the first node.
    pub(crate) fn insert_root(
        &mut self,
        name: &str,
        kind: ComponentKind,
        owner: Owner,
        owner_name: Option<String>,
    ) -> RuleResult<ComponentId> {
        if !self.nodes.is_empty() {
            return Err(RuleError::internal(format!(
                "Root {} inserted into a non-empty tree",
                name
            )));
        }
        self.insert(name.to_string(), kind, owner, owner_name, None)
    }

    /// Registers `component` under `owner` and, recursively, everything it
    /// contains. Extensions are registered as leaves.
    pub(crate) fn fill(&mut self, mut component: Component, owner: ComponentId) -> RuleResult<ComponentId> {
        let owner_name = self.node(owner)?.name.clone();
        let name = component.resolve_name(&owner_name)?;
        let kind = component.kind();
        component.set_owner(Owner::Component(owner), &owner_name)?;
        let children = component.take_children();

        let id = self.insert(
            name,
            kind,
            Owner::Component(owner),
            Some(owner_name),
            Some(component),
        )?;
        self.node_mut(owner)?.children.push(id);

        for child in children {
            self.fill(child, id)?;
        }
        Ok(id)
    }

    /// Sets up every component once, in declaration order.
    pub(crate) fn bind(&mut self, ctx: &mut SetupContext<'_>) -> RuleResult<()> {
        for idx in 0..self.nodes.len() {
            let node = &mut self.nodes[idx];
            if node.finished {
                continue;
            }
            let name = node.name.clone();
            if let Some(mut component) = node.component.take() {
                let result = component.setup(&name, ctx);
                self.nodes[idx].component = Some(component);
                result.map_err(|e| e.with_owner(name.as_str()))?;
            }
            self.nodes[idx].finished = true;
        }
        Ok(())
    }

    /// Fails with an internal error naming the first component that did not
    /// finish setup.
    pub(crate) fn ensure_finished(&self) -> RuleResult<()> {
        match self.nodes.iter().find(|node| !node.finished) {
            Some(node) => Err(RuleError::internal(format!(
                "Component {} ({}) did not finish setup",
                node.name, node.kind
            ))),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&ComponentNode> {
        self.nodes.first()
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(id.0)
    }

    fn node(&self, id: ComponentId) -> RuleResult<&ComponentNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| RuleError::internal(format!("No component #{}", id.0)))
    }

    fn node_mut(&mut self, id: ComponentId) -> RuleResult<&mut ComponentNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| RuleError::internal(format!("No component #{}", id.0)))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ComponentNode> {
        self.by_name.get(name).and_then(|id| self.nodes.get(id.0))
    }

    /// Like [`ComponentTree::get_by_name`], with close names in the error.
    pub fn get_strict(&self, name: &str, max_suggestions: usize) -> RuleResult<&ComponentNode> {
        self.get_by_name(name).ok_or_else(|| {
            let available = self.names();
            RuleError::name_not_found(
                format!("Component '{}' not found", name),
                closest_matches(name, &available, max_suggestions),
            )
        })
    }

    /// Component names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentNode> {
        self.nodes.iter()
    }

    /// Owners of `id`, nearest first, ending with the container node.
    pub fn owner_chain(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            match node.owner {
                Owner::Component(owner) => {
                    chain.push(owner);
                    current = self.get(owner);
                }
                _ => current = None,
            }
        }
        chain
    }
}
