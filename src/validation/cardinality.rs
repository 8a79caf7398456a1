use std::fmt;

use tracing::debug;

use crate::{
    error::{RuleError, RuleResult},
    type_hint::TypeDescriptor,
    validate_identifier,
};

/// How many items a repeating sub-record may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one item. The bound model must not be a list.
    Single { allow_none: bool },
    /// Bounded number of items. At least one bound is set, `max` is never 1.
    Range { min: Option<u32>, max: Option<u32> },
    /// Any number of items.
    Multi { allow_none: bool },
}

impl Cardinality {
    pub fn single() -> Self {
        Cardinality::Single { allow_none: true }
    }

    pub fn multi() -> Self {
        Cardinality::Multi { allow_none: true }
    }

    pub fn range(min: Option<u32>, max: Option<u32>) -> RuleResult<Self> {
        match (min, max) {
            (None, None) => Err(RuleError::setup_value(
                "Range cardinality needs min or max",
            )),
            (Some(min), Some(max)) if min > max => Err(RuleError::setup_value(format!(
                "Range cardinality min {} is greater than max {}",
                min, max
            ))),
            (_, Some(1)) => Err(RuleError::setup_value(
                "Range cardinality with max 1 is a Single cardinality",
            )),
            _ => Ok(Cardinality::Range { min, max }),
        }
    }

    fn allow_none(&self) -> bool {
        match self {
            Cardinality::Single { allow_none } | Cardinality::Multi { allow_none } => *allow_none,
            Cardinality::Range { min, .. } => *min == Some(0),
        }
    }

    fn expects_list(&self) -> bool {
        !matches!(self, Cardinality::Single { .. })
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Single { allow_none } => write!(f, "Single(allow_none={})", allow_none),
            Cardinality::Range { min, max } => {
                let bound = |b: &Option<u32>| b.map_or("-".to_string(), |v| v.to_string());
                write!(f, "Range(min={}, max={})", bound(min), bound(max))
            }
            Cardinality::Multi { allow_none } => write!(f, "Multi(allow_none={})", allow_none),
        }
    }
}

/// Cardinality attached to an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct CardinalityValidation {
    name: Option<String>,
    owner_name: Option<String>,
    rule: Cardinality,
}

impl CardinalityValidation {
    pub fn new(rule: Cardinality) -> Self {
        Self {
            name: None,
            owner_name: None,
            rule,
        }
    }

    pub fn with_name(mut self, name: &str) -> RuleResult<Self> {
        validate_identifier(name)?;
        self.name = Some(name.to_string());
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rule(&self) -> Cardinality {
        self.rule
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    pub(crate) fn set_owner_name(&mut self, owner_name: &str) {
        self.owner_name = Some(owner_name.to_string());
    }

    fn owner(&self) -> &str {
        self.owner_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("cardinality")
    }

    /// Checks the rule against the bound model's shape. Allowing none
    /// requires an optional model type and the other way around.
    pub fn validate_setup(&self, bound: &TypeDescriptor) -> RuleResult<()> {
        let owner = self.owner();
        debug!("{}: checking {} against {}", owner, self.rule, bound);
        match (self.rule.allow_none(), bound.is_optional) {
            (false, true) => {
                return Err(RuleError::setup_type(format!(
                    "Model type is optional but {} does not allow none, remove Optional or allow none",
                    self.rule
                ))
                .with_owner(owner))
            }
            (true, false) => {
                return Err(RuleError::setup_type(format!(
                    "Model type {} is not optional but {} allows none, add Optional or require at least one item",
                    bound.annotation, self.rule
                ))
                .with_owner(owner))
            }
            _ => {}
        }
        match (self.rule.expects_list(), bound.is_list) {
            (true, false) => Err(RuleError::setup_type(format!(
                "{} needs a list model, got {}",
                self.rule, bound.underlying
            ))
            .with_owner(owner)),
            (false, true) => Err(RuleError::setup_type(format!(
                "{} needs a single model, got List[{}], use Range or Multi",
                self.rule, bound.underlying
            ))
            .with_owner(owner)),
            _ => Ok(()),
        }
    }

    /// Checks an item count. Returns `Ok(false)` on violation unless
    /// `raise_err` is set.
    pub fn validate(&self, items_count: usize, raise_err: bool) -> RuleResult<bool> {
        let violation = match self.rule {
            Cardinality::Single { allow_none } => match items_count {
                0 if !allow_none => Some("Expected exactly one item, got none.".to_string()),
                0 | 1 => None,
                n => Some(format!("Expected exactly one item, got {}.", n)),
            },
            Cardinality::Range { min, max } => {
                let count = items_count as u64;
                match (min, max) {
                    (Some(min), _) if count < u64::from(min) => Some(format!(
                        "Expected at least {} items, got {}.",
                        min, items_count
                    )),
                    (_, Some(max)) if count > u64::from(max) => Some(format!(
                        "Expected at most {} items, got {}.",
                        max, items_count
                    )),
                    _ => None,
                }
            }
            Cardinality::Multi { allow_none } => {
                if items_count == 0 && !allow_none {
                    Some("Expected at least one item, got none.".to_string())
                } else {
                    None
                }
            }
        };
        match violation {
            None => Ok(true),
            Some(message) if raise_err => Err(RuleError::validation(self.owner(), message)),
            Some(_) => Ok(false),
        }
    }
}
