use crate::{
    error::{closest_matches, RuleError, RuleResult},
    expression::Value,
    heap::Heap,
    namespace::Namespace,
    validate_identifier,
};

/// Scope in which a field combination must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UniqueScope {
    /// Among all stored items, e.g. within a table.
    Global,
    /// Among the items of one parent.
    Children,
}

/// Uniqueness of a field combination across the items of an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueValidation {
    name: Option<String>,
    owner_name: Option<String>,
    scope: UniqueScope,
    fields: Vec<String>,
    ignore_none: bool,
}

impl UniqueValidation {
    pub fn global<I, S>(fields: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(UniqueScope::Global, fields)
    }

    pub fn children<I, S>(fields: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(UniqueScope::Children, fields)
    }

    fn new<I, S>(scope: UniqueScope, fields: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(RuleError::setup_value("Unique validation needs at least one field"));
        }
        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx].contains(field) {
                return Err(RuleError::setup_value(format!(
                    "Unique validation lists field '{}' twice",
                    field
                )));
            }
        }
        Ok(Self {
            name: None,
            owner_name: None,
            scope,
            fields,
            ignore_none: true,
        })
    }

    pub fn with_name(mut self, name: &str) -> RuleResult<Self> {
        validate_identifier(name)?;
        self.name = Some(name.to_string());
        Ok(self)
    }

    /// Items with a missing value in any listed field are checked as well.
    pub fn strict_none(mut self) -> Self {
        self.ignore_none = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn scope(&self) -> UniqueScope {
        self.scope
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub(crate) fn set_owner_name(&mut self, owner_name: &str) {
        self.owner_name = Some(owner_name.to_string());
    }

    fn owner(&self) -> &str {
        self.owner_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("unique")
    }

    /// Every listed field must be a field of the extension.
    pub fn validate_setup(&self, heap: &Heap, max_suggestions: usize) -> RuleResult<()> {
        let available: Vec<String> = heap
            .iter_namespace(Namespace::Fields)
            .filter(|(_, variable)| !variable.is_denied())
            .map(|(name, _)| name.to_string())
            .collect();
        for field in &self.fields {
            if !available.contains(field) {
                return Err(RuleError::setup_name_not_found(
                    format!("Unique validation field '{}' is not a field", field),
                    closest_matches(field, &available, max_suggestions),
                )
                .with_owner(self.owner()));
            }
        }
        Ok(())
    }

    /// Checks that no two records share the listed field values.
    pub fn validate(&self, items: &[Value], raise_err: bool) -> RuleResult<bool> {
        let mut seen: Vec<Vec<Value>> = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let key = self
                .fields
                .iter()
                .map(|field| match item {
                    Value::Record(values) => Ok(values.get(field).cloned().unwrap_or_default()),
                    other => Err(RuleError::evaluation(
                        self.owner(),
                        format!("item {} is a {}, not a record", idx, other.type_name()),
                    )),
                })
                .collect::<RuleResult<Vec<Value>>>()?;
            if self.ignore_none && key.iter().any(Value::is_null) {
                continue;
            }
            if seen.contains(&key) {
                let message = format!(
                    "Item {} repeats values of ({}) within {} scope",
                    idx,
                    self.fields.join(", "),
                    self.scope
                );
                return if raise_err {
                    Err(RuleError::validation(self.owner(), message))
                } else {
                    Ok(false)
                };
            }
            seen.push(key);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(name: &str, email: Value) -> Value {
        Value::record([("name", Value::from(name)), ("email", email)])
    }

    #[test]
    fn test_construction_checks() {
        assert!(UniqueValidation::children(Vec::<String>::new()).is_err());
        assert!(UniqueValidation::children(["a", "a"]).is_err());
        assert!(UniqueValidation::global(["a", "b"]).is_ok());
    }

    #[test]
    fn test_duplicates_detected() -> RuleResult<()> {
        let unique = UniqueValidation::children(["email"])?;
        let items = vec![
            employee("Ann", Value::from("ann@example.com")),
            employee("Bob", Value::from("ann@example.com")),
        ];
        assert!(!unique.validate(&items, false)?);
        assert!(matches!(
            unique.validate(&items, true),
            Err(RuleError::Validation { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_values_ignored_by_default() -> RuleResult<()> {
        let items = vec![employee("Ann", Value::Null), employee("Bob", Value::Null)];
        assert!(UniqueValidation::children(["email"])?.validate(&items, false)?);
        assert!(!UniqueValidation::children(["email"])?
            .strict_none()
            .validate(&items, false)?);
        Ok(())
    }
}
