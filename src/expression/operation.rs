use std::{cmp::Ordering, fmt};

use crate::{
    error::{RuleError, RuleResult},
    heap::Heap,
};

use super::{value::Value, DataContext, Expression, ExpressionStatus};

/// Fixed operator table. The string form is the operator code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum Operator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

impl Operator {
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Not)
    }
}

/// Operand of an operation: another expression or a literal value.
#[derive(Debug, Clone)]
pub enum Operand {
    Expr(Expression),
    Literal(Value),
}

impl Operand {
    fn setup(&mut self, heap: &mut Heap, owner_name: &str) -> RuleResult<ExpressionStatus> {
        match self {
            Operand::Expr(expr) => {
                expr.setup(heap, owner_name)?;
                Ok(expr.status())
            }
            Operand::Literal(_) => Ok(ExpressionStatus::Ok),
        }
    }

    fn read(&self, ctx: &DataContext) -> RuleResult<Value> {
        match self {
            Operand::Expr(expr) => expr.read(ctx),
            Operand::Literal(value) => Ok(value.clone()),
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            Operand::Expr(expr) => Some(expr),
            Operand::Literal(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Expr(expr) => write!(f, "{}", expr),
            Operand::Literal(value) => write!(f, "{}", value),
        }
    }
}

impl From<Expression> for Operand {
    fn from(expr: Expression) -> Self {
        Operand::Expr(expr)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_operand!(bool, i32, i64, f64, &str, String);

/// An operator applied to one or two operands.
#[derive(Debug, Clone)]
pub struct Operation {
    op: Operator,
    first: Operand,
    second: Option<Operand>,
    status: ExpressionStatus,
    failure: Option<String>,
}

impl Operation {
    pub fn new(op: Operator, first: Operand, second: Option<Operand>) -> RuleResult<Self> {
        match (op.is_unary(), &second) {
            (true, Some(_)) => {
                return Err(RuleError::setup_value(format!(
                    "Operator '{}' takes a single operand",
                    op
                )))
            }
            (false, None) => {
                return Err(RuleError::setup_value(format!(
                    "Operator '{}' needs a second operand",
                    op
                )))
            }
            _ => {}
        }
        Ok(Self {
            op,
            first,
            second,
            status: ExpressionStatus::Initialized,
            failure: None,
        })
    }

    pub fn from_code(code: &str, first: Operand, second: Option<Operand>) -> RuleResult<Self> {
        let op = code
            .parse::<Operator>()
            .map_err(|_| RuleError::setup_value(format!("Operator '{}' is not supported", code)))?;
        Self::new(op, first, second)
    }

    pub(super) fn binary(op: Operator, first: Operand, second: Operand) -> Self {
        Self {
            op,
            first,
            second: Some(second),
            status: ExpressionStatus::Initialized,
            failure: None,
        }
    }

    pub(super) fn unary(op: Operator, first: Operand) -> Self {
        Self {
            op,
            first,
            second: None,
            status: ExpressionStatus::Initialized,
            failure: None,
        }
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn first(&self) -> &Operand {
        &self.first
    }

    pub fn second(&self) -> Option<&Operand> {
        self.second.as_ref()
    }

    pub fn status(&self) -> ExpressionStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Sets up expression operands. The first operand that does not resolve
    /// decides the status of the whole operation.
    pub(super) fn setup(&mut self, heap: &mut Heap, owner_name: &str) -> RuleResult<ExpressionStatus> {
        if self.status != ExpressionStatus::Initialized {
            return Err(RuleError::internal(format!(
                "Setup of operation {} already done",
                self
            )));
        }
        let mut status = self.first.setup(heap, owner_name)?;
        let mut failed = self.first.as_expression();
        if status == ExpressionStatus::Ok {
            if let Some(second) = self.second.as_mut() {
                status = second.setup(heap, owner_name)?;
            }
            failed = self.second.as_ref().and_then(Operand::as_expression);
        }
        if status != ExpressionStatus::Ok {
            self.failure = failed.and_then(|expr| expr.failure().map(str::to_string));
        }
        self.status = status;
        Ok(status)
    }

    /// Reads the operands from `ctx` and applies the operator.
    pub fn apply(&self, ctx: &DataContext) -> RuleResult<Value> {
        if self.status != ExpressionStatus::Ok {
            return Err(RuleError::internal(format!(
                "Operation {} applied before a successful setup (status {})",
                self, self.status
            )));
        }
        let left = self.first.read(ctx)?;
        let right = match &self.second {
            Some(second) => second.read(ctx)?,
            None => Value::Null,
        };
        match self.op {
            Operator::Eq => Ok(Value::Boolean(left == right)),
            Operator::Ne => Ok(Value::Boolean(left != right)),
            Operator::Lt => self.compare_values(&left, &right, |ordering| ordering.is_lt()),
            Operator::Le => self.compare_values(&left, &right, |ordering| ordering.is_le()),
            Operator::Gt => self.compare_values(&left, &right, |ordering| ordering.is_gt()),
            Operator::Ge => self.compare_values(&left, &right, |ordering| ordering.is_ge()),
            Operator::Add => self.eval_add(&left, &right),
            Operator::Sub => self.eval_subtract(&left, &right),
            Operator::Mul => self.eval_multiply(&left, &right),
            Operator::Div => self.eval_divide(&left, &right),
            Operator::FloorDiv => self.eval_floor_divide(&left, &right),
            Operator::In => self.eval_in(&left, &right),
            Operator::Not => Ok(Value::Boolean(!left.is_truthy())),
            Operator::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
            Operator::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
        }
    }

    fn error(&self, left: &Value, right: &Value) -> RuleError {
        RuleError::evaluation(
            self.to_string(),
            format!(
                "operator '{}' can not be applied to {} and {}",
                self.op,
                left.type_name(),
                right.type_name()
            ),
        )
    }

    fn eval_add(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => l
                .checked_add(*r)
                .map(Value::Integer)
                .ok_or_else(|| RuleError::evaluation(self.to_string(), "integer overflow")),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l + *r as f64)),
            (Value::String(l), Value::String(r)) => Ok(Value::String(l.clone() + r)),
            (Value::List(l), Value::List(r)) => {
                Ok(Value::List(l.iter().chain(r.iter()).cloned().collect()))
            }
            _ => Err(self.error(left, right)),
        }
    }

    fn eval_subtract(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => l
                .checked_sub(*r)
                .map(Value::Integer)
                .ok_or_else(|| RuleError::evaluation(self.to_string(), "integer overflow")),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l - *r as f64)),
            _ => Err(self.error(left, right)),
        }
    }

    fn eval_multiply(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => l
                .checked_mul(*r)
                .map(Value::Integer)
                .ok_or_else(|| RuleError::evaluation(self.to_string(), "integer overflow")),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l * *r as f64)),
            _ => Err(self.error(left, right)),
        }
    }

    fn numeric_pair(&self, left: &Value, right: &Value) -> RuleResult<(f64, f64)> {
        let pair = match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => (*l as f64, *r as f64),
            (Value::Float(l), Value::Float(r)) => (*l, *r),
            (Value::Integer(l), Value::Float(r)) => (*l as f64, *r),
            (Value::Float(l), Value::Integer(r)) => (*l, *r as f64),
            _ => return Err(self.error(left, right)),
        };
        if pair.1 == 0.0 {
            return Err(RuleError::evaluation(self.to_string(), "division by zero"));
        }
        Ok(pair)
    }

    fn eval_divide(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        let (l, r) = self.numeric_pair(left, right)?;
        Ok(Value::Float(l / r))
    }

    /// Floors toward negative infinity, integers stay integers.
    fn eval_floor_divide(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        if let (Value::Integer(l), Value::Integer(r)) = (left, right) {
            if *r == 0 {
                return Err(RuleError::evaluation(self.to_string(), "division by zero"));
            }
            let quotient = l / r;
            let floored = if l % r != 0 && ((*l < 0) != (*r < 0)) {
                quotient - 1
            } else {
                quotient
            };
            return Ok(Value::Integer(floored));
        }
        let (l, r) = self.numeric_pair(left, right)?;
        Ok(Value::Float((l / r).floor()))
    }

    fn eval_in(&self, left: &Value, right: &Value) -> RuleResult<Value> {
        match (left, right) {
            (Value::List(items), needle) => Ok(Value::Boolean(items.contains(needle))),
            (Value::String(haystack), Value::String(needle)) => {
                Ok(Value::Boolean(haystack.contains(needle.as_str())))
            }
            (Value::Record(fields), Value::String(key)) => {
                Ok(Value::Boolean(fields.contains_key(key)))
            }
            _ => Err(self.error(left, right)),
        }
    }

    fn compare_values<F>(&self, left: &Value, right: &Value, compare: F) -> RuleResult<Value>
    where
        F: Fn(Ordering) -> bool,
    {
        let ordering = match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
            (Value::Float(l), Value::Float(r)) => l.partial_cmp(r),
            (Value::Integer(l), Value::Float(r)) => (*l as f64).partial_cmp(r),
            (Value::Float(l), Value::Integer(r)) => l.partial_cmp(&(*r as f64)),
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
            _ => return Err(self.error(left, right)),
        };
        ordering
            .map(|ordering| Value::Boolean(compare(ordering)))
            .ok_or_else(|| RuleError::evaluation(self.to_string(), "values are not comparable"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.second {
            Some(second) => write!(f, "({} {} {})", self.first, self.op, second),
            None => write!(f, "({} {})", self.op, self.first),
        }
    }
}
