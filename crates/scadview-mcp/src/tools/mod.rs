//! MCP tool request types and result envelopes
//!
//! - Rendering (render_single, render_perspectives)
//! - Diagnostics (check_openscad, get_server_info)

pub mod diagnostics;
pub mod render;
