//! Registry configuration
//!
//! A [`RegistryConfig`] can be built in code or loaded from TOML:
//!
//! ```toml
//! thread_safe = true
//! cache_capacity = 500
//! indexes = ["name", "email", ["type", "color"]]
//! ```

use serde::{Deserialize, Serialize};
use setdex_core::{IndexSpec, RegistryError, Result};
use std::path::Path;

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Construction parameters of a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Block on contention instead of failing with `ConcurrentAccess`
    #[serde(default)]
    pub thread_safe: bool,
    /// Maximum number of cached query results (0 disables caching)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Indexes declared at construction; a string is a simple index, a
    /// list of strings a compound one
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            thread_safe: false,
            cache_capacity: default_cache_capacity(),
            indexes: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Builder: set thread safety
    pub fn with_thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    /// Builder: set the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builder: declare an index
    pub fn with_index(mut self, spec: impl Into<IndexSpec>) -> Self {
        self.indexes.push(spec.into());
        self
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Registry configuration
#
# Block on contention (true) or fail with a concurrent access error (false)
thread_safe = false

# Maximum number of cached query results. Once full, new results are not
# cached until the next add, delete or attribute change. 0 disables caching.
cache_capacity = 1000

# Indexes declared at construction.
# A string is a simple index, a list of strings is a compound index.
# indexes = ["name", "email", ["type", "color"]]
indexes = []
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text is not valid TOML or an index
    /// declaration is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RegistryError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            RegistryError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize this config to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RegistryError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?).map_err(|e| {
            RegistryError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
