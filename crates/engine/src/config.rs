//! Engine configuration.
//!
//! Every key is optional; an empty document yields [`EngineConfig::default`].
//!
//! ```toml
//! calculation_hops = 1
//! rules_file_type = "yaml"
//! reset_hidden_values = true
//! ```

use std::path::Path;

use formwire_interchange::RulesFileType;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How far selection follows fields watching a calculation. `1` pulls in
    /// the direct watchers only; `0` disables the walk.
    pub calculation_hops: usize,
    /// Format assumed for the rules resource when the form does not say.
    pub rules_file_type: RulesFileType,
    /// Reset a field to its empty value when it becomes hidden.
    pub reset_hidden_values: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calculation_hops: 1,
            rules_file_type: RulesFileType::Yaml,
            reset_hidden_values: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
