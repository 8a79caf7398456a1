use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::error::{RuleError, RuleResult};

/// Tunables for container setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Field binds deeper than this many hops are reported with a warning.
    #[serde(default = "default_max_bind_depth")]
    pub max_bind_depth: usize,

    /// Upper bound for "did you mean" candidates attached to not-found errors.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Abort setup when any expression stays unresolved.
    #[serde(default)]
    pub fail_on_unresolved: bool,

    #[serde(default = "default_max_describe_depth")]
    pub max_describe_depth: usize,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            max_bind_depth: default_max_bind_depth(),
            max_suggestions: default_max_suggestions(),
            fail_on_unresolved: false,
            max_describe_depth: default_max_describe_depth(),
        }
    }
}

fn default_max_bind_depth() -> usize {
    3
}

fn default_max_suggestions() -> usize {
    10
}

fn default_max_describe_depth() -> usize {
    15
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> RuleResult<T> {
    let file = File::open(path)
        .map_err(|e| RuleError::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| RuleError::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> RuleResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| RuleError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

impl SetupConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> RuleResult<Self> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> RuleResult<Self> {
        let config: Self = from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RuleResult<()> {
        if self.max_bind_depth == 0 {
            return Err(RuleError::Config(
                "max_bind_depth must be at least 1".to_string(),
            ));
        }
        if self.max_describe_depth == 0 {
            return Err(RuleError::Config(
                "max_describe_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_json() -> RuleResult<()> {
        let config = SetupConfig::from_str("{}")?;
        assert_eq!(config, SetupConfig::default());
        assert_eq!(config.max_bind_depth, 3);
        assert_eq!(config.max_suggestions, 10);
        assert!(!config.fail_on_unresolved);
        Ok(())
    }

    #[test]
    fn test_partial_override() -> RuleResult<()> {
        let config = SetupConfig::from_str(r#"{"fail_on_unresolved": true, "max_suggestions": 3}"#)?;
        assert!(config.fail_on_unresolved);
        assert_eq!(config.max_suggestions, 3);
        assert_eq!(config.max_bind_depth, 3);
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            SetupConfig::from_str(r#"{"max_bind_depth": 0}"#),
            Err(RuleError::Config(_))
        ));
        assert!(matches!(
            SetupConfig::from_str("not json"),
            Err(RuleError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = SetupConfig::from_file("/nonexistent/rulebind.json");
        assert!(matches!(result, Err(RuleError::Config(_))));
    }
}
