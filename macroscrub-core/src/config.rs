//! Pipeline configuration loaded from TOML files

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for a scrub run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    pub clean: CleanConfig,
    pub rename: RenameConfig,
}

/// Settings for the protection/trace cleaning stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Treat the first malformed XML part as fatal instead of skipping it
    pub strict_xml: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { strict_xml: false }
    }
}

/// Settings for the macro text passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    /// Rename obfuscated identifiers to generated readable names
    pub rename_identifiers: bool,
    /// Flag error-handling/indirection/shell lines with a trailing comment
    pub annotate_lines: bool,
    /// Label leftover cryptic routine definitions after renaming
    pub relabel_routines: bool,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            rename_identifiers: true,
            annotate_lines: true,
            relabel_routines: true,
        }
    }
}

impl ScrubConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_all_passes() {
        let config = ScrubConfig::default();
        assert!(!config.clean.strict_xml);
        assert!(config.rename.rename_identifiers);
        assert!(config.rename.annotate_lines);
        assert!(config.rename.relabel_routines);
    }

    #[test]
    fn parses_partial_toml() {
        let config: ScrubConfig = toml::from_str(
            r#"
            [clean]
            strict_xml = true

            [rename]
            annotate_lines = false
            "#,
        )
        .unwrap();
        assert!(config.clean.strict_xml);
        assert!(config.rename.rename_identifiers);
        assert!(!config.rename.annotate_lines);
    }
}
