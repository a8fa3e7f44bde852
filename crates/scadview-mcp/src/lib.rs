//! scadview MCP Server - Model Context Protocol server for OpenSCAD rendering
//!
//! This crate exposes OpenSCAD rendering to AI agents. Agents can:
//!
//! - Render a model from a custom camera or a named view
//! - Render a model from several views in one call
//! - Check the OpenSCAD installation and server limits
//!
//! Tool arguments are normalized with [`scadview_core::normalize`] and
//! rendered images pass through a [`ResponseManager`], which returns them
//! inline, recompressed or as file paths depending on the size budget.
//!
//! ## Workflow
//!
//! 1. `check_openscad` - Make sure OpenSCAD is available
//! 2. `render_single` - Render the model and inspect it
//! 3. `render_perspectives` - Review it from every side

pub mod camera;
pub mod config;
pub mod renderer;
pub mod tools;

use std::collections::BTreeMap;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use scadview_core::{ImageSet, ManagedResponse, OutputFormat, PngCompressor, ResponseManager};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::renderer::OpenScad;
use crate::tools::{
    diagnostics::{CheckOpenscadRequest, OpenscadStatus, ServerInfoReport},
    render::{MultiRenderEnvelope, RenderEnvelope, RenderPerspectivesRequest, RenderSingleRequest},
};

// Re-export for binary
pub use rmcp;

/// Image name used for single renders
const SINGLE_IMAGE_NAME: &str = "render";

/// The scadview MCP service
///
/// Configuration and the renderer are shared read-only, so the service is
/// cheap to clone and every tool call can run concurrently.
#[derive(Clone)]
pub struct ScadviewMcpService {
    config: Arc<Config>,
    renderer: Arc<OpenScad>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ScadviewMcpService {
    /// Create a new MCP service, locating OpenSCAD from `config`
    pub fn new(config: Config) -> Self {
        let renderer = OpenScad::new(&config);
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: Config, renderer: OpenScad) -> Self {
        Self {
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            tool_router: Self::tool_router(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn renderer(&self) -> &OpenScad {
        &self.renderer
    }

    // ========================================================================
    // Rendering Tools
    // ========================================================================

    #[tool(description = "Render an OpenSCAD model to a PNG image. Provide exactly one of scad_content or scad_file. Camera vectors accept [x,y,z], {\"x\":..} or JSON strings; image_size accepts [w,h], \"800x600\" or \"800,600\"; variables accept an object or \"k=v,k2=v2\". Use view for a preset camera. output_format: auto (default), base64, file_path, compressed.")]
    async fn render_single(
        &self,
        params: Parameters<RenderSingleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let resolved = match params.0.resolve(&self.config) {
            Ok(resolved) => resolved,
            Err(e) if e.is_validation() => return Err(invalid_params(&e)),
            Err(e) => return json_result(&RenderEnvelope::failure(e.to_string())),
        };
        info!(size = %resolved.job.image_size, format = %resolved.output_format, "render_single");

        let envelope = match self.renderer.render_base64(&resolved.job).await {
            Ok(encoded) => {
                let images = ImageSet::single(SINGLE_IMAGE_NAME, encoded);
                match self.manage(images, resolved.output_format).await {
                    Ok(managed) => RenderEnvelope::from_managed(managed, SINGLE_IMAGE_NAME),
                    Err(e) => RenderEnvelope::failure(format!("{e:#}")),
                }
            }
            Err(e) => RenderEnvelope::failure(e.to_string()),
        };

        json_result(&envelope)
    }

    #[tool(description = "Render an OpenSCAD model from several named views at once. views is a list or comma-separated string of front, back, left, right, top, bottom, isometric, dimetric (default: all). Views that fail are reported in errors without failing the others.")]
    async fn render_perspectives(
        &self,
        params: Parameters<RenderPerspectivesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let resolved = match params.0.resolve(&self.config) {
            Ok(resolved) => resolved,
            Err(e) if e.is_validation() => return Err(invalid_params(&e)),
            Err(e) => {
                return json_result(&MultiRenderEnvelope::failure(e.to_string(), BTreeMap::new()));
            }
        };
        info!(views = resolved.jobs.len(), format = %resolved.output_format, "render_perspectives");

        // The renderer's semaphore bounds how many of these actually run
        let mut tasks = JoinSet::new();
        for (view, job) in resolved.jobs {
            let renderer = Arc::clone(&self.renderer);
            tasks.spawn(async move { (view, renderer.render_base64(&job).await) });
        }

        let mut images = BTreeMap::new();
        let mut errors = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((view, Ok(encoded))) => {
                    images.insert(view.name().to_string(), encoded);
                }
                Ok((view, Err(e))) => {
                    warn!(view = view.name(), error = %e, "View failed to render");
                    errors.insert(view.name().to_string(), e.to_string());
                }
                Err(e) => {
                    return json_result(&MultiRenderEnvelope::failure(
                        format!("Render task failed: {e}"),
                        errors,
                    ));
                }
            }
        }

        if images.is_empty() {
            return json_result(&MultiRenderEnvelope::failure("All views failed to render", errors));
        }

        let envelope = match self.manage(ImageSet::Named(images), resolved.output_format).await {
            Ok(managed) => MultiRenderEnvelope::from_managed(managed, errors),
            Err(e) => MultiRenderEnvelope::failure(format!("{e:#}"), errors),
        };
        json_result(&envelope)
    }

    // ========================================================================
    // Diagnostics Tools
    // ========================================================================

    #[tool(description = "Check whether OpenSCAD is installed and report its version and path. Set include_paths to list the install locations that were searched.")]
    async fn check_openscad(
        &self,
        params: Parameters<CheckOpenscadRequest>,
    ) -> Result<CallToolResult, McpError> {
        let status = OpenscadStatus::detect(&self.renderer, params.0.include_paths).await;
        json_result(&status)
    }

    #[tool(description = "Get server version, OpenSCAD version, render limits, response size budget, and the accepted output formats, view names and color schemes.")]
    async fn get_server_info(&self) -> Result<CallToolResult, McpError> {
        let version = self.renderer.version().await;
        json_result(&ServerInfoReport::new(&self.config, &self.renderer, version))
    }
}

impl ScadviewMcpService {
    /// Run the response manager off the async runtime; it may encode PNGs
    /// and write files.
    async fn manage(
        &self,
        images: ImageSet,
        format: OutputFormat,
    ) -> anyhow::Result<ManagedResponse> {
        let manager =
            ResponseManager::new(self.config.response.max_tokens, self.config.output_dir())
                .with_compressor(PngCompressor::new(self.config.response.compression_quality));
        let managed =
            tokio::task::spawn_blocking(move || manager.manage(&images, format)).await??;
        Ok(managed)
    }
}

fn invalid_params(err: &scadview_core::Error) -> McpError {
    McpError::invalid_params(err.to_string(), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_handler]
impl ServerHandler for ScadviewMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "scadview-mcp".to_string(),
                title: Some("scadview OpenSCAD Renderer".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: Some("https://openscad.org".to_string()),
            },
            instructions: Some(
                "scadview MCP server for rendering OpenSCAD models to PNG images. \
                 \n\nWorkflow:\n\
                 1. check_openscad() - Make sure OpenSCAD is installed\n\
                 2. render_single() - Render the model from one camera or view\n\
                 3. render_perspectives() - Review the model from several views\n\n\
                 Large results are returned as file paths instead of inline data; \
                 pass output_format to choose explicitly.\n\
                 Use get_server_info() for limits, view names and color schemes."
                    .to_string(),
            ),
        }
    }
}
