//! Engine configuration.
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! name = "compress"
//! workers = 4
//! write_slack = 1
//! finish_chunk = 128
//! max_output_bytes = 67108864
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix for worker thread names
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Extra output room requested per write iteration, on top of the
    /// remaining input length
    #[serde(default = "default_write_slack")]
    pub write_slack: usize,

    /// Output room requested per finish iteration
    #[serde(default = "default_finish_chunk")]
    pub finish_chunk: usize,

    /// Ceiling on the output a single operation may produce
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
}

fn default_name() -> String {
    "zipstream".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_write_slack() -> usize {
    1
}

fn default_finish_chunk() -> usize {
    128
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
            write_slack: default_write_slack(),
            finish_chunk: default_finish_chunk(),
            max_output_bytes: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!("[config] Loading {}", path.display());
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.finish_chunk == 0 {
            return Err(ConfigError::Invalid("finish_chunk must be at least 1".into()));
        }
        if self.max_output_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_output_bytes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.name, "zipstream");
        assert_eq!(config.write_slack, 1);
        assert_eq!(config.finish_chunk, 128);
        assert!(config.workers >= 1);
        assert_eq!(config.max_output_bytes, None);
    }

    #[test]
    fn test_parse_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            name = "gz"
            workers = 2
            write_slack = 64
            finish_chunk = 4096
            max_output_bytes = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "gz");
        assert_eq!(config.workers, 2);
        assert_eq!(config.write_slack, 64);
        assert_eq!(config.finish_chunk, 4096);
        assert_eq!(config.max_output_bytes, Some(1024));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = EngineConfig::from_toml_str("workers = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let result = EngineConfig::from_toml_str("workers = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 3").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load("/nonexistent/zipstream.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
