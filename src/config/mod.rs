//! Configuration management.
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! ignore_unknown = true
//! format = "zip"
//!
//! [logging]
//! format = "json"
//! filter = "haul=debug"
//! file = "/var/log/haul.log"
//! ```

use crate::io::formats::ContainerFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`HaulConfig::ignore_unknown`].
pub const IGNORE_UNKNOWN_ENV: &str = "HAUL_IGNORE_UNKNOWN";

/// Main configuration for haul.
#[derive(Debug, Clone, Default)]
pub struct HaulConfig {
    /// Tolerate kinds the destination does not know.
    pub ignore_unknown: bool,
    /// Container format used when writing.
    pub format: ContainerFormat,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging section of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directives, e.g. `haul=debug`.
    pub filter: Option<String>,
    /// Log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Ignore unknown kinds.
    pub ignore_unknown: Option<bool>,
    /// Container format name.
    pub format: Option<String>,
    /// Logging configuration.
    pub logging: Option<LoggingSettings>,
}

impl HaulConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or names an unknown
    /// container format.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
        Ok(Self::from_toml(&contents)?.with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/haul/` on macOS)
    /// 2. XDG config dir (`~/.config/haul/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let candidates = [
            base_dirs.config_dir().join("haul").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("haul")
                .join("config.toml"),
        ];
        Self::load_first(&candidates).unwrap_or_else(|| Self::default().with_env_overrides())
    }

    /// Loads the first existing file among `candidates`. Files that exist
    /// but cannot be loaded are logged and skipped.
    fn load_first(candidates: &[PathBuf]) -> Option<Self> {
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable config file");
                },
            }
        }
        None
    }

    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();
        if let Some(ignore_unknown) = file.ignore_unknown {
            config.ignore_unknown = ignore_unknown;
        }
        if let Some(format) = file.format {
            config.format = format.parse()?;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        Ok(config)
    }

    /// Applies `HAUL_IGNORE_UNKNOWN` when set to a boolean-like value.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = std::env::var(IGNORE_UNKNOWN_ENV)
            .ok()
            .as_deref()
            .and_then(parse_bool)
        {
            self.ignore_unknown = value;
        }
        self
    }

    /// Sets whether unknown kinds are tolerated.
    #[must_use]
    pub const fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = ignore_unknown;
        self
    }

}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HaulConfig::new();
        assert!(!config.ignore_unknown);
        assert_eq!(config.format, ContainerFormat::Yaml);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = HaulConfig::from_toml(
            r#"
ignore_unknown = true
format = "zip-stored"

[logging]
format = "json"
filter = "haul=debug"
"#,
        )
        .unwrap();
        assert!(config.ignore_unknown);
        assert_eq!(config.format, ContainerFormat::StoredZip);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.logging.filter.as_deref(), Some("haul=debug"));
    }

    #[test]
    fn test_malformed_candidate_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let valid = dir.path().join("valid.toml");
        std::fs::write(&broken, "format = [").unwrap();
        std::fs::write(&valid, "format = \"zip\"").unwrap();

        let config = HaulConfig::load_first(&[broken.clone(), valid]).unwrap();
        assert_eq!(config.format, ContainerFormat::CompressedZip);
        assert!(HaulConfig::load_first(&[broken, dir.path().join("missing.toml")]).is_none());
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(HaulConfig::from_toml("format = \"tar\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "format = \"zip\"").unwrap();
        let config = HaulConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.format, ContainerFormat::CompressedZip);
    }

    #[test]
    fn test_missing_file() {
        let result = HaulConfig::load_from_file(Path::new("/nonexistent/haul.toml"));
        assert!(matches!(result, Err(crate::Error::OperationFailed { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
