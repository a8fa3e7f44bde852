//! Installation and capability reporting

use std::path::PathBuf;

use schemars::JsonSchema;
use scadview_core::OutputFormat;
use serde::{Deserialize, Serialize};

use crate::camera::{ColorScheme, ViewPreset};
use crate::config::Config;
use crate::renderer::{COMMON_PATHS, OpenScad};

/// Request for checking the OpenSCAD installation
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CheckOpenscadRequest {
    /// Also list the install locations that were searched
    #[serde(default)]
    pub include_paths: bool,
}

/// Result of `check_openscad`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenscadStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searched_paths: Option<Vec<String>>,
    pub message: String,
}

impl OpenscadStatus {
    pub async fn detect(renderer: &OpenScad, include_paths: bool) -> Self {
        let path = renderer.executable().map(PathBuf::from);
        let version = renderer.version().await;
        let message = match (&path, &version) {
            (Some(_), Some(version)) => format!("OpenSCAD is installed: {version}"),
            (Some(path), None) => {
                format!("OpenSCAD found at {} but did not report a version", path.display())
            }
            (None, _) => {
                "OpenSCAD not found. Please install OpenSCAD from https://openscad.org".to_string()
            }
        };

        Self {
            installed: path.is_some(),
            version,
            path,
            searched_paths: include_paths
                .then(|| COMMON_PATHS.iter().map(|p| (*p).to_string()).collect()),
            message,
        }
    }
}

/// Result of `get_server_info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfoReport {
    pub server_name: &'static str,
    pub version: &'static str,
    pub openscad_version: Option<String>,
    pub openscad_path: Option<PathBuf>,
    pub max_concurrent_renders: usize,
    pub render_timeout_seconds: u64,
    pub max_image_size: [u32; 2],
    pub response_max_tokens: usize,
    pub output_dir: PathBuf,
    pub supported_formats: Vec<&'static str>,
    pub output_formats: Vec<&'static str>,
    pub views: Vec<&'static str>,
    pub color_schemes: Vec<&'static str>,
}

impl ServerInfoReport {
    pub fn new(config: &Config, renderer: &OpenScad, openscad_version: Option<String>) -> Self {
        Self {
            server_name: "scadview-mcp",
            version: env!("CARGO_PKG_VERSION"),
            openscad_version,
            openscad_path: renderer.executable().map(PathBuf::from),
            max_concurrent_renders: renderer.max_concurrent(),
            render_timeout_seconds: config.rendering.timeout_seconds,
            max_image_size: [
                config.rendering.max_image_width,
                config.rendering.max_image_height,
            ],
            response_max_tokens: config.response.max_tokens,
            output_dir: config.output_dir(),
            supported_formats: vec!["png"],
            output_formats: OutputFormat::all_names().to_vec(),
            views: ViewPreset::all_names().to_vec(),
            color_schemes: ColorScheme::all_names(),
        }
    }
}
