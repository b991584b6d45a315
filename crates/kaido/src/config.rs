//! Registry and backend configuration.
//!
//! Everything has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [local]
//! expand_home = true
//!
//! [[memory]]
//! id = "scratch"
//!
//! [[memory]]
//! id = "fixtures"
//! read_only = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::backend::Backend;
use crate::backends::local::LocalFs;
use crate::backends::memory::MemoryFs;
use crate::error::{FsError, FsResult};
use crate::registry::Registry;

fn default_separator() -> char {
    '/'
}

fn default_true() -> bool {
    true
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Configuration for one in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFsConfig {
    /// Identifier; the backend registers under `mem://<id>`.
    #[serde(default = "new_id")]
    pub id: String,

    /// Path separator.
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Reject every mutation with a read-only error.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for MemoryFsConfig {
    fn default() -> Self {
        Self {
            id: new_id(),
            separator: default_separator(),
            read_only: false,
        }
    }
}

impl MemoryFsConfig {
    /// Set the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the path separator.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Make the backend read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Configuration for the local disk backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFsConfig {
    /// Expand a leading `~` to the home directory.
    #[serde(default = "default_true")]
    pub expand_home: bool,

    #[serde(default)]
    pub read_only: bool,
}

impl Default for LocalFsConfig {
    fn default() -> Self {
        Self {
            expand_home: true,
            read_only: false,
        }
    }
}

impl LocalFsConfig {
    pub fn with_expand_home(mut self, expand_home: bool) -> Self {
        self.expand_home = expand_home;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Top-level configuration: the local backend plus memory backends to
/// create at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub local: LocalFsConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory: Vec<MemoryFsConfig>,
}

impl RegistryConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        toml::from_str(s).map_err(|e| FsError::other(format!("invalid registry config: {e}")))
    }

    /// Load a TOML file. A leading `~` in `path` is expanded.
    pub fn load(path: impl AsRef<Path>) -> FsResult<Self> {
        let path = path.as_ref().to_string_lossy();
        let expanded = shellexpand::tilde(&path);
        let content = std::fs::read_to_string(expanded.as_ref())?;
        tracing::debug!(path = %expanded, "loading registry config");
        Self::from_toml_str(&content)
    }

    pub fn with_local(mut self, local: LocalFsConfig) -> Self {
        self.local = local;
        self
    }

    pub fn with_memory(mut self, memory: MemoryFsConfig) -> Self {
        self.memory.push(memory);
        self
    }
}

impl Registry {
    /// Build a registry and create the configured memory backends in it.
    pub fn from_config(config: &RegistryConfig) -> Arc<Registry> {
        let registry = Arc::new(Registry::with_local(LocalFs::new(config.local.clone())));
        for memory in &config.memory {
            // Bound in the registry; the registry keeps it alive.
            let fs = MemoryFs::create(&registry, memory.clone());
            tracing::debug!(prefix = %fs.prefix(), "created configured memory backend");
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = RegistryConfig::from_toml_str("").unwrap();
        assert!(config.local.expand_home);
        assert!(!config.local.read_only);
        assert!(config.memory.is_empty());
    }

    #[test]
    fn memory_defaults_fill_in() {
        let config = RegistryConfig::from_toml_str(
            r#"
            [[memory]]
            id = "scratch"

            [[memory]]
            separator = "\\"
            read_only = true
            "#,
        )
        .unwrap();

        assert_eq!(config.memory.len(), 2);
        assert_eq!(config.memory[0].id, "scratch");
        assert_eq!(config.memory[0].separator, '/');
        assert_eq!(config.memory[1].separator, '\\');
        assert!(config.memory[1].read_only);
        assert_eq!(config.memory[1].id.len(), 32);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = RegistryConfig::from_toml_str("[[memory]]\nread_only = \"yes\"").unwrap_err();
        assert!(err.to_string().contains("invalid registry config"));
    }

    #[test]
    fn from_config_registers_memory_backends() {
        let config = RegistryConfig::default()
            .with_memory(MemoryFsConfig::default().with_id("one"))
            .with_memory(MemoryFsConfig::default().with_id("two").read_only());
        let registry = Registry::from_config(&config);

        assert!(registry.is_registered("mem://one"));
        let two = registry.get("mem://two").unwrap();
        assert!(two.is_read_only());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kaido.toml");
        std::fs::write(&path, "[local]\nexpand_home = false\n").unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert!(!config.local.expand_home);
    }
}
