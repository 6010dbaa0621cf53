//! Marshalling configuration
//!
//! Loaded from TOML, with every field defaulted and a small set of
//! environment overrides applied on top.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Interpreter C-call limit; used as the default nesting bound for decodes
pub const DEFAULT_MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarshalConfig {
    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub vm: VmConfig,
}

/// Limits applied while decoding stack values into native values.
///
/// `alloc_limit` is the budget in bytes for owned strings and sequences
/// created by a single top-level decode. Exceeding it reports
/// [`Error::OutOfMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub alloc_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Open the standard libraries when creating a [`crate::Vm`]
    #[serde(default = "default_true")]
    pub open_libs: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            alloc_limit: None,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self { open_libs: true }
    }
}

fn default_true() -> bool { true }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }

impl DecodeConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_alloc_limit(mut self, bytes: usize) -> Self {
        self.alloc_limit = Some(bytes);
        self
    }
}

impl MarshalConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `LUA_MARSHAL_MAX_DEPTH` and `LUA_MARSHAL_ALLOC_LIMIT` on top of `self`
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("LUA_MARSHAL_MAX_DEPTH") {
            self.decode.max_depth = parse_env("LUA_MARSHAL_MAX_DEPTH", &value)?;
        }

        if let Ok(value) = std::env::var("LUA_MARSHAL_ALLOC_LIMIT") {
            self.decode.alloc_limit = Some(parse_env("LUA_MARSHAL_ALLOC_LIMIT", &value)?);
        }

        self.validate()
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.decode.max_depth == 0 {
            return Err(Error::Config {
                message: "decode.max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| Error::Config {
        message: format!("{} must be an unsigned integer, got '{}'", name, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MarshalConfig::default();
        assert_eq!(config.decode.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.decode.alloc_limit, None);
        assert!(config.vm.open_libs);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[decode]
max_depth = 16
"#;

        let config = MarshalConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.decode.max_depth, 16);
        assert_eq!(config.decode.alloc_limit, None);
        assert!(config.vm.open_libs);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[decode]
max_depth = 32
alloc_limit = 4096

[vm]
open_libs = false
"#;

        let config = MarshalConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.decode.alloc_limit, Some(4096));
        assert!(!config.vm.open_libs);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = MarshalConfig::from_toml_str("[decode]\nmax_depth = 0\n").unwrap_err();
        assert_eq!(err.name(), "Config");
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = MarshalConfig::from_toml_str("[decode\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[decode]\nalloc_limit = 128").unwrap();

        let config = MarshalConfig::from_file(file.path()).unwrap();
        assert_eq!(config.decode.alloc_limit, Some(128));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = MarshalConfig {
            decode: DecodeConfig::default().with_max_depth(8).with_alloc_limit(64),
            vm: VmConfig { open_libs: false },
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(MarshalConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_env_parse_errors() {
        assert_eq!(parse_env("X", " 12 ").unwrap(), 12);
        assert!(parse_env("X", "twelve").is_err());
    }
}
