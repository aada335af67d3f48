use crate::metatable::Strategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime knobs, loadable from TOML:
///
/// ```toml
/// stress_gc = false
/// gc_threshold = 1048576
/// default_strategy = "simple"
/// catch_native_panics = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Collect at the start of every top-level dispatch (for testing).
    pub stress_gc: bool,
    /// Allocated bytes before `Heap::should_collect` reports true.
    pub gc_threshold: usize,
    /// Strategy used by registrations that do not pick one.
    pub default_strategy: Strategy,
    /// Turn panics inside natives into `RuntimeError::NativeException`.
    pub catch_native_panics: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stress_gc: false,
            gc_threshold: 1024 * 1024,
            default_strategy: Strategy::Regular,
            catch_native_panics: true,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: VmConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.gc_threshold == 0 {
            return Err(ConfigError::Invalid(
                "gc_threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
