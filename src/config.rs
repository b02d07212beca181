//! Compile configuration shared by every dispatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jit::compiler::NOP_BACKEND;
use crate::jit::signature::HasherStrategy;

pub const HASHER_ENV: &str = "AOTC_HASHER";
pub const BACKEND_ENV: &str = "AOTC_BACKEND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown hasher `{0}` (expected `dynamic` or `static`)")]
    UnknownHasher(String),
    #[cfg(feature = "toml-config")]
    #[error("failed to read config file {}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "toml-config")]
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings that decide how calls are keyed and compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    pub hasher: HasherStrategy,
    /// Compile target handed to the compiler; part of every cache key.
    pub backend: String,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            hasher: HasherStrategy::default(),
            backend: NOP_BACKEND.to_string(),
        }
    }
}

impl CompileConfig {
    pub fn with_hasher(mut self, hasher: HasherStrategy) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Defaults overridden by `AOTC_HASHER` and `AOTC_BACKEND`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(hasher) = lookup(HASHER_ENV).filter(|v| !v.trim().is_empty()) {
            config.hasher = hasher.trim().parse()?;
        }
        if let Some(backend) = lookup(BACKEND_ENV).filter(|v| !v.trim().is_empty()) {
            config.backend = backend.trim().to_string();
        }
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}
