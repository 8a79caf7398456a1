use thiserror::Error;

/// Errors raised while declaring, setting up, reading or validating rules.
///
/// Setup errors carry the name of the owner (component, container or
/// expression) that triggered them, when one is known.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Setup error: {}", with_owner(.owner, .message))]
    Setup {
        owner: Option<String>,
        message: String,
    },

    #[error("Setup value error: {}", with_owner(.owner, .message))]
    SetupValue {
        owner: Option<String>,
        message: String,
    },

    #[error("Setup name error: {}", with_owner(.owner, .message))]
    SetupName {
        owner: Option<String>,
        message: String,
    },

    #[error("Name not found during setup: {}{}", with_owner(.owner, .message), with_candidates(.candidates))]
    SetupNameNotFound {
        owner: Option<String>,
        message: String,
        candidates: Vec<String>,
    },

    #[error("Setup type error: {}", with_owner(.owner, .message))]
    SetupType {
        owner: Option<String>,
        message: String,
    },

    #[error("Unsupported during setup: {}", with_owner(.owner, .message))]
    SetupUnsupported {
        owner: Option<String>,
        message: String,
    },

    #[error("Validation failed for {owner}: {message}")]
    Validation { owner: String, message: String },

    #[error("Name not found: {message}{}", with_candidates(.candidates))]
    NameNotFound {
        message: String,
        candidates: Vec<String>,
    },

    #[error("Evaluation error in {expression}: {message}")]
    Evaluation { expression: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {}", with_owner(.owner, .message))]
    Internal {
        owner: Option<String>,
        message: String,
    },
}

pub type RuleResult<T> = Result<T, RuleError>;

fn with_owner(owner: &Option<String>, message: &str) -> String {
    match owner {
        Some(owner) => format!("{} => {}", owner, message),
        None => message.to_string(),
    }
}

fn with_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", candidates.join(", "))
    }
}

impl RuleError {
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup {
            owner: None,
            message: message.into(),
        }
    }

    pub fn setup_value<S: Into<String>>(message: S) -> Self {
        Self::SetupValue {
            owner: None,
            message: message.into(),
        }
    }

    pub fn setup_name<S: Into<String>>(message: S) -> Self {
        Self::SetupName {
            owner: None,
            message: message.into(),
        }
    }

    pub fn setup_name_not_found<S: Into<String>>(message: S, candidates: Vec<String>) -> Self {
        Self::SetupNameNotFound {
            owner: None,
            message: message.into(),
            candidates,
        }
    }

    pub fn setup_type<S: Into<String>>(message: S) -> Self {
        Self::SetupType {
            owner: None,
            message: message.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::SetupUnsupported {
            owner: None,
            message: message.into(),
        }
    }

    pub fn validation<O: Into<String>, S: Into<String>>(owner: O, message: S) -> Self {
        Self::Validation {
            owner: owner.into(),
            message: message.into(),
        }
    }

    pub fn name_not_found<S: Into<String>>(message: S, candidates: Vec<String>) -> Self {
        Self::NameNotFound {
            message: message.into(),
            candidates,
        }
    }

    pub fn evaluation<E: Into<String>, S: Into<String>>(expression: E, message: S) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            owner: None,
            message: message.into(),
        }
    }

    /// Attaches the owner name to a setup or internal error. Errors that
    /// already carry an owner keep the innermost one.
    pub fn with_owner<S: Into<String>>(mut self, name: S) -> Self {
        match &mut self {
            Self::Setup { owner, .. }
            | Self::SetupValue { owner, .. }
            | Self::SetupName { owner, .. }
            | Self::SetupNameNotFound { owner, .. }
            | Self::SetupType { owner, .. }
            | Self::SetupUnsupported { owner, .. }
            | Self::Internal { owner, .. } => {
                if owner.is_none() {
                    *owner = Some(name.into());
                }
            }
            _ => {}
        }
        self
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Setup { message, .. }
            | Self::SetupValue { message, .. }
            | Self::SetupName { message, .. }
            | Self::SetupNameNotFound { message, .. }
            | Self::SetupType { message, .. }
            | Self::SetupUnsupported { message, .. }
            | Self::Validation { message, .. }
            | Self::NameNotFound { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Internal { message, .. } => message,
            Self::Config(message) => message,
        }
    }

    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Setup { .. }
                | Self::SetupValue { .. }
                | Self::SetupName { .. }
                | Self::SetupNameNotFound { .. }
                | Self::SetupType { .. }
                | Self::SetupUnsupported { .. }
        )
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Picks up to `limit` names from `available` that look close to `name`.
///
/// Names sharing the first two characters come first, then names containing
/// `name` as a substring. When nothing matches the first `limit` names are
/// returned so the caller still gets a hint.
pub fn closest_matches<'a, I>(name: &str, available: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let available: Vec<&String> = available.into_iter().collect();
    let prefix: String = name.chars().take(2).collect();
    let lower = name.to_lowercase();

    let mut matches: Vec<String> = available
        .iter()
        .filter(|candidate| !prefix.is_empty() && candidate.starts_with(&prefix))
        .map(|candidate| candidate.to_string())
        .collect();

    for candidate in available.iter() {
        if matches.len() >= limit {
            break;
        }
        if !lower.is_empty()
            && candidate.to_lowercase().contains(&lower)
            && !matches.iter().any(|m| m == *candidate)
        {
            matches.push(candidate.to_string());
        }
    }

    if matches.is_empty() {
        matches = available.iter().map(|c| c.to_string()).collect();
    }
    matches.truncate(limit);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_closest_matches_prefers_prefix() {
        let available = names(&["name", "address", "nationality", "age"]);
        let found = closest_matches("nam", &available, 10);
        assert_eq!(found, names(&["name", "nationality"]));
    }

    #[test]
    fn test_closest_matches_falls_back_to_sample() {
        let available = names(&["a1", "a2", "a3"]);
        assert_eq!(closest_matches("zz", &available, 2), names(&["a1", "a2"]));
    }

    #[test]
    fn test_with_owner_keeps_innermost() {
        let err = RuleError::setup_value("bad")
            .with_owner("field")
            .with_owner("container");
        assert_eq!(err.to_string(), "Setup value error: field => bad");
    }

    #[test]
    fn test_display_candidates() {
        let err = RuleError::setup_name_not_found("Variable 'nme' not found", names(&["name"]));
        assert!(err.to_string().ends_with("(available: name)"));
        assert!(err.is_setup());
    }
}
