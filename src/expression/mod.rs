//! Attribute-path expressions.
//!
//! An [`Expression`] is a namespace followed by a chain of hops. A hop is an
//! attribute name (optionally called with recorded arguments) or an
//! [`Operation`]. Expressions are declared up front, resolved once against a
//! [`Heap`] by [`Expression::setup`], and then read against runtime data with
//! [`Expression::read`].
//!
//! ```text
//! M.company.name              // Models namespace, two attribute hops
//! F.age >= 18                 // Global namespace, one operation hop
//! Ctx.user.has_perm("edit")   // attribute hop with call arguments
//! ```

pub mod operation;
pub mod value;


use std::{fmt, ops};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::{RuleError, RuleResult},
    heap::{Heap, VarId},
    namespace::Namespace,
};

pub use operation::{Operand, Operation, Operator};
pub use value::{DataFn, Value};

/// Names that can not be used as attribute hops.
pub const RESERVED_ATTR_NAMES: &[&str] = &["Path", "Read", "Setup", "GetNamespace", "Value"];

/// Resolution state of an expression. Changes once, on setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum ExpressionStatus {
    #[default]
    Initialized,
    Ok,
    ErrNotFound,
    ErrUnsupported,
}

/// Arguments recorded by [`Expression::call`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I: IntoIterator<Item = Value>>(args: I) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: IndexMap::new(),
        }
    }

    pub fn arg<V: Into<Value>>(mut self, value: V) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        parts.extend(self.kwargs.iter().map(|(k, v)| format!("{}={}", k, v)));
        write!(f, "({})", parts.join(", "))
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Attr(String),
    Op(Box<Operation>),
}

#[derive(Debug, Clone)]
pub struct Hop {
    node: Node,
    call: Option<CallArgs>,
}

impl Hop {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn call_args(&self) -> Option<&CallArgs> {
        self.call.as_ref()
    }

    pub fn attr_name(&self) -> Option<&str> {
        match &self.node {
            Node::Attr(name) => Some(name),
            Node::Op(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Accessor {
    Get(String),
    Call(String, CallArgs),
    Apply(usize),
}

/// Root values per namespace used by [`Expression::read`].
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    roots: IndexMap<Namespace, Value>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: Namespace, root: Value) -> Self {
        self.roots.insert(namespace, root);
        self
    }

    pub fn insert(&mut self, namespace: Namespace, root: Value) {
        self.roots.insert(namespace, root);
    }

    pub fn root(&self, namespace: Namespace) -> RuleResult<&Value> {
        self.roots.get(&namespace).ok_or_else(|| {
            RuleError::evaluation(
                namespace.to_string(),
                format!("no data supplied for namespace {}", namespace),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct Expression {
    namespace: Namespace,
    path: Vec<Hop>,
    status: ExpressionStatus,
    var_name: Option<String>,
    accessors: Vec<Accessor>,
    failure: Option<String>,
}

pub(crate) fn check_attr_name(name: &str) -> RuleResult<()> {
    if name.is_empty() {
        return Err(RuleError::setup_name("Attribute name can not be empty"));
    }
    if name.starts_with('_') || RESERVED_ATTR_NAMES.contains(&name) {
        return Err(RuleError::setup_name(format!(
            "Attribute name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

impl Expression {
    pub(crate) fn attribute(namespace: Namespace, name: &str) -> RuleResult<Self> {
        check_attr_name(name)?;
        Ok(Self::from_node(namespace, Node::Attr(name.to_string())))
    }

    fn from_node(namespace: Namespace, node: Node) -> Self {
        Self {
            namespace,
            path: vec![Hop { node, call: None }],
            status: ExpressionStatus::Initialized,
            var_name: None,
            accessors: Vec::new(),
            failure: None,
        }
    }

    /// Wraps an operation into a Global-namespace expression.
    pub fn operation(operation: Operation) -> Self {
        Self::from_node(Namespace::Global, Node::Op(Box::new(operation)))
    }

    /// Returns a new expression extended by one attribute hop.
    pub fn attr(&self, name: &str) -> RuleResult<Self> {
        check_attr_name(name)?;
        let mut path = self.path.clone();
        path.push(Hop {
            node: Node::Attr(name.to_string()),
            call: None,
        });
        Ok(Self {
            namespace: self.namespace,
            path,
            status: ExpressionStatus::Initialized,
            var_name: None,
            accessors: Vec::new(),
            failure: None,
        })
    }

    /// Chains several attribute hops at once.
    pub fn attrs<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> RuleResult<Self> {
        let mut expr = self.clone();
        for name in names {
            expr = expr.attr(name)?;
        }
        Ok(expr)
    }

    /// Records call arguments on the last hop. A hop can be called once.
    pub fn call(mut self, args: CallArgs) -> RuleResult<Self> {
        let last = self
            .path
            .last_mut()
            .ok_or_else(|| RuleError::internal("Expression with an empty path"))?;
        if matches!(last.node, Node::Op(_)) {
            return Err(RuleError::setup_value("An operation can not be called"));
        }
        if last.call.is_some() {
            return Err(RuleError::setup_value(format!(
                "Method '{}' already called",
                self
            )));
        }
        last.call = Some(args);
        Ok(self)
    }

    pub fn eq<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Eq, other)
    }

    pub fn ne<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Ne, other)
    }

    pub fn lt<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Lt, other)
    }

    pub fn le<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Le, other)
    }

    pub fn gt<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Gt, other)
    }

    pub fn ge<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Ge, other)
    }

    pub fn floor_div<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::FloorDiv, other)
    }

    /// `self in other` reads as "self contains other".
    pub fn contains<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::In, other)
    }

    pub fn and<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::And, other)
    }

    pub fn or<O: Into<Operand>>(self, other: O) -> Self {
        self.binary(Operator::Or, other)
    }

    fn binary<O: Into<Operand>>(self, op: Operator, other: O) -> Self {
        Self::operation(Operation::binary(op, Operand::Expr(self), other.into()))
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn path(&self) -> &[Hop] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Attribute names of the path, operations are skipped.
    pub fn attr_names(&self) -> Vec<&str> {
        self.path.iter().filter_map(Hop::attr_name).collect()
    }

    pub fn status(&self) -> ExpressionStatus {
        self.status
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ExpressionStatus::Ok
    }

    pub fn var_name(&self) -> Option<&str> {
        self.var_name.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Builds the error describing why the expression did not resolve.
    pub fn unresolved_error(&self) -> RuleError {
        let message = format!(
            "Expression {} not resolved ({}): {}",
            self,
            self.status,
            self.failure().unwrap_or("setup not called")
        );
        match self.status {
            ExpressionStatus::ErrUnsupported => RuleError::unsupported(message),
            ExpressionStatus::ErrNotFound => RuleError::setup_name_not_found(message, Vec::new()),
            _ => RuleError::internal(message),
        }
    }

    /// Resolves every hop through `heap` and caches the accessors used by
    /// [`Expression::read`].
    ///
    /// Not-found and unsupported names end up in the status and return
    /// `Ok(None)`. Any other problem is returned as an error. On success the
    /// terminal variable, if any, is returned and referenced by `owner_name`.
    pub fn setup(&mut self, heap: &mut Heap, owner_name: &str) -> RuleResult<Option<VarId>> {
        if self.status != ExpressionStatus::Initialized {
            return Err(RuleError::internal(format!(
                "Setup of {} already called (status {})",
                self, self.status
            )));
        }
        let namespace = self.namespace;
        let mut current: Option<VarId> = None;
        let mut untyped = false;
        let mut accessors = Vec::with_capacity(self.path.len());

        for (idx, hop) in self.path.iter_mut().enumerate() {
            match &mut hop.node {
                Node::Op(operation) => {
                    let status = operation.setup(heap, owner_name)?;
                    if status != ExpressionStatus::Ok {
                        self.status = status;
                        self.failure = Some(
                            operation
                                .failure()
                                .unwrap_or("operand not resolved")
                                .to_string(),
                        );
                        return Ok(None);
                    }
                    accessors.push(Accessor::Apply(idx));
                    current = None;
                    untyped = true;
                }
                Node::Attr(name) => {
                    if !untyped {
                        match heap.getset_attribute_variable(namespace, name, current) {
                            Ok(id) => {
                                let variable = heap.variable(id)?;
                                if variable.is_denied() {
                                    return Err(RuleError::setup_value(format!(
                                        "Variable '{}' can not be used here: {}",
                                        variable.name(),
                                        variable.deny_reason().unwrap_or("denied")
                                    ))
                                    .with_owner(owner_name));
                                }
                                current = Some(id);
                            }
                            Err(err @ RuleError::SetupNameNotFound { .. }) => {
                                self.status = ExpressionStatus::ErrNotFound;
                                self.failure = Some(err.to_string());
                                return Ok(None);
                            }
                            Err(err @ RuleError::SetupUnsupported { .. }) => {
                                self.status = ExpressionStatus::ErrUnsupported;
                                self.failure = Some(err.to_string());
                                return Ok(None);
                            }
                            Err(err) => return Err(err.with_owner(owner_name)),
                        }
                    }
                    accessors.push(match &hop.call {
                        Some(args) => Accessor::Call(name.clone(), args.clone()),
                        None => Accessor::Get(name.clone()),
                    });
                }
            }
        }

        match current {
            Some(id) => {
                heap.add_reference(id, owner_name)?;
                self.var_name = Some(heap.variable(id)?.name().to_string());
            }
            None if !matches!(
                namespace,
                Namespace::Global | Namespace::This | Namespace::Utils
            ) =>
            {
                return Err(RuleError::internal(format!(
                    "Expression {} resolved without a variable",
                    self
                )));
            }
            None => {}
        }

        self.accessors = accessors;
        self.status = ExpressionStatus::Ok;
        debug!("expression {} resolved for {}", self, owner_name);
        Ok(current)
    }

    /// Marks an attribute-only expression as resolved without going through
    /// a heap. Its root is the record supplied at read time.
    pub(crate) fn setup_detached(&mut self) -> RuleResult<()> {
        if self.status != ExpressionStatus::Initialized {
            return Err(RuleError::internal(format!(
                "Setup of {} already called (status {})",
                self, self.status
            )));
        }
        let mut accessors = Vec::with_capacity(self.path.len());
        for hop in &self.path {
            match (&hop.node, &hop.call) {
                (Node::Attr(name), Some(args)) => {
                    accessors.push(Accessor::Call(name.clone(), args.clone()))
                }
                (Node::Attr(name), None) => accessors.push(Accessor::Get(name.clone())),
                (Node::Op(_), _) => {
                    return Err(RuleError::setup_value(format!(
                        "Expression {} can not contain operations here",
                        self
                    )))
                }
            }
        }
        self.accessors = accessors;
        self.status = ExpressionStatus::Ok;
        Ok(())
    }

    /// Evaluates the expression against `ctx`.
    pub fn read(&self, ctx: &DataContext) -> RuleResult<Value> {
        if self.status != ExpressionStatus::Ok {
            return Err(RuleError::internal(format!(
                "Expression {} read before a successful setup (status {})",
                self, self.status
            )));
        }
        let mut current: Option<Value> = None;
        for accessor in &self.accessors {
            let next = match accessor {
                Accessor::Get(name) => {
                    let base = match &current {
                        Some(value) => value,
                        None => ctx.root(self.namespace)?,
                    };
                    base.get_attr(name)
                }
                Accessor::Call(name, args) => {
                    let base = match &current {
                        Some(value) => value,
                        None => ctx.root(self.namespace)?,
                    };
                    base.get_attr(name)
                        .and_then(|f| f.call(&args.args, &args.kwargs))
                }
                Accessor::Apply(idx) => match self.path.get(*idx).map(Hop::node) {
                    Some(Node::Op(operation)) => operation.apply(ctx),
                    _ => Err(RuleError::internal(format!(
                        "Hop {} of {} is not an operation",
                        idx, self
                    ))),
                },
            };
            current = Some(next.map_err(|e| match e {
                RuleError::Evaluation { message, .. } => {
                    RuleError::evaluation(self.to_string(), message)
                }
                other => other,
            })?);
        }
        current.ok_or_else(|| RuleError::internal(format!("Expression {} has no accessors", self)))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for hop in &self.path {
            match &hop.node {
                Node::Attr(name) => {
                    if first {
                        write!(f, "{}.{}", self.namespace, name)?;
                    } else {
                        write!(f, ".{}", name)?;
                    }
                }
                Node::Op(operation) => {
                    if first {
                        write!(f, "{}", operation)?;
                    } else {
                        write!(f, ".{}", operation)?;
                    }
                }
            }
            if let Some(args) = &hop.call {
                write!(f, "{}", args)?;
            }
            first = false;
        }
        Ok(())
    }
}

impl<O: Into<Operand>> ops::Add<O> for Expression {
    type Output = Expression;

    fn add(self, other: O) -> Expression {
        self.binary(Operator::Add, other)
    }
}

impl<O: Into<Operand>> ops::Sub<O> for Expression {
    type Output = Expression;

    fn sub(self, other: O) -> Expression {
        self.binary(Operator::Sub, other)
    }
}

impl<O: Into<Operand>> ops::Mul<O> for Expression {
    type Output = Expression;

    fn mul(self, other: O) -> Expression {
        self.binary(Operator::Mul, other)
    }
}

impl<O: Into<Operand>> ops::Div<O> for Expression {
    type Output = Expression;

    fn div(self, other: O) -> Expression {
        self.binary(Operator::Div, other)
    }
}

impl<O: Into<Operand>> ops::BitAnd<O> for Expression {
    type Output = Expression;

    fn bitand(self, other: O) -> Expression {
        self.binary(Operator::And, other)
    }
}

impl<O: Into<Operand>> ops::BitOr<O> for Expression {
    type Output = Expression;

    fn bitor(self, other: O) -> Expression {
        self.binary(Operator::Or, other)
    }
}

impl ops::Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        Self::operation(Operation::unary(Operator::Not, Operand::Expr(self)))
    }
}
