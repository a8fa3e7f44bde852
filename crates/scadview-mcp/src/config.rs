//! Server configuration
//!
//! Built once at startup from defaults, an optional JSON file, and
//! environment overrides, then shared read-only with every tool call.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::camera::ColorScheme;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit path to the OpenSCAD executable
    pub openscad_path: Option<PathBuf>,
    /// Scratch directory for render inputs and outputs
    pub temp_dir: PathBuf,
    pub rendering: RenderingConfig,
    pub response: ResponseConfig,
    pub logging: LoggingConfig,
}

/// Limits applied to every render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Maximum number of OpenSCAD processes running at once
    pub max_concurrent: usize,
    /// Per-render timeout
    pub timeout_seconds: u64,
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub default_color_scheme: String,
}

/// Response size management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Estimated token budget for one tool result
    pub max_tokens: usize,
    /// Where file_path output is written (default: `<temp_dir>/renders`)
    pub output_dir: Option<PathBuf>,
    /// 1-100; higher values trade size for encoding speed
    pub compression_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openscad_path: None,
            temp_dir: PathBuf::from(".openscad-mcp").join("tmp"),
            rendering: RenderingConfig::default(),
            response: ResponseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_seconds: 300,
            max_image_width: 4096,
            max_image_height: 4096,
            default_color_scheme: "Cornfield".to_string(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_tokens: 20_000,
            output_dir: None,
            compression_quality: 85,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `path` (JSON) if given, then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config
            .with_env(|key| std::env::var(key).ok())?
            .validated()
    }

    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply environment overrides looked up through `lookup`
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid value for {key}: '{value}'"))
        }

        if let Some(v) = lookup("OPENSCAD_PATH") {
            self.openscad_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MCP_TEMP_DIR") {
            self.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MCP_MAX_CONCURRENT_RENDERS") {
            self.rendering.max_concurrent = parsed("MCP_MAX_CONCURRENT_RENDERS", &v)?;
        }
        if let Some(v) = lookup("MCP_RENDER_TIMEOUT") {
            self.rendering.timeout_seconds = parsed("MCP_RENDER_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MCP_MAX_IMAGE_WIDTH") {
            self.rendering.max_image_width = parsed("MCP_MAX_IMAGE_WIDTH", &v)?;
        }
        if let Some(v) = lookup("MCP_MAX_IMAGE_HEIGHT") {
            self.rendering.max_image_height = parsed("MCP_MAX_IMAGE_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("MCP_RESPONSE_MAX_TOKENS") {
            self.response.max_tokens = parsed("MCP_RESPONSE_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("MCP_OUTPUT_DIR") {
            self.response.output_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MCP_LOG_LEVEL") {
            self.logging.level = v.trim().to_lowercase();
        }
        Ok(self)
    }

    /// Check ranges, returning the config unchanged if everything is valid
    pub fn validated(self) -> Result<Self> {
        let r = &self.rendering;
        if !(1..=20).contains(&r.max_concurrent) {
            bail!("rendering.max_concurrent must be 1-20, got {}", r.max_concurrent);
        }
        if !(30..=3600).contains(&r.timeout_seconds) {
            bail!("rendering.timeout_seconds must be 30-3600, got {}", r.timeout_seconds);
        }
        for (name, value) in [
            ("max_image_width", r.max_image_width),
            ("max_image_height", r.max_image_height),
        ] {
            if !(100..=8192).contains(&value) {
                bail!("rendering.{name} must be 100-8192, got {value}");
            }
        }
        if ColorScheme::parse(&r.default_color_scheme).is_none() {
            bail!(
                "Unknown default color scheme '{}'. Valid options: {}",
                r.default_color_scheme,
                ColorScheme::all_names().join(", ")
            );
        }
        if !(1..=100).contains(&self.response.compression_quality) {
            bail!(
                "response.compression_quality must be 1-100, got {}",
                self.response.compression_quality
            );
        }
        Ok(self)
    }

    /// Directory that file_path output is written to
    pub fn output_dir(&self) -> PathBuf {
        self.response
            .output_dir
            .clone()
            .unwrap_or_else(|| self.temp_dir.join("renders"))
    }

    pub fn default_color_scheme(&self) -> ColorScheme {
        ColorScheme::parse(&self.rendering.default_color_scheme).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default().validated().unwrap();
        assert_eq!(config.response.max_tokens, 20_000);
        assert_eq!(config.output_dir(), PathBuf::from(".openscad-mcp/tmp/renders"));
        assert_eq!(config.default_color_scheme(), ColorScheme::Cornfield);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_env(env(&[
                ("OPENSCAD_PATH", "/opt/openscad"),
                ("MCP_MAX_CONCURRENT_RENDERS", "3"),
                ("MCP_RESPONSE_MAX_TOKENS", "500"),
                ("MCP_OUTPUT_DIR", "/tmp/out"),
                ("MCP_LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.openscad_path, Some(PathBuf::from("/opt/openscad")));
        assert_eq!(config.rendering.max_concurrent, 3);
        assert_eq!(config.response.max_tokens, 500);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/out"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = Config::default()
            .with_env(env(&[("MCP_RENDER_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("MCP_RENDER_TIMEOUT"));
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = Config::default();
        config.rendering.max_concurrent = 0;
        assert!(config.validated().is_err());

        let mut config = Config::default();
        config.rendering.default_color_scheme = "Neon".into();
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"rendering": {"max_concurrent": 2}}"#).unwrap();
        assert_eq!(config.rendering.max_concurrent, 2);
        assert_eq!(config.rendering.timeout_seconds, 300);
        assert_eq!(config.response, ResponseConfig::default());
    }
}
