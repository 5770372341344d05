//! Checker configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The mode flags the engines consult. Passed by reference inside a
/// [`crate::context::TypeckContext`] so the engines stay pure and testable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Treat `dynamic()` as both top and bottom and admit the extra
    /// gradual inclusions (`tuple()` into specific tuples, `fun()` into
    /// arity-fixed funs).
    pub gradual_typing: bool,
    /// Master switch for clause-level occurrence refinement.
    pub occurrence_typing: bool,
    /// Lift the clause-count limit on occurrence refinement.
    pub unlimited_refinement: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gradual_typing: true,
            occurrence_typing: true,
            unlimited_refinement: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    pub fn from_json(content: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}
