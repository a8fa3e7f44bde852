//! OpenSCAD process invocation
//!
//! Each render gets its own temporary directory under the configured
//! `temp_dir`, so concurrent renders never share input or output files. A
//! semaphore caps how many OpenSCAD processes run at once.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use scadview_core::ImageSize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::camera::{CameraSpec, ColorScheme};
use crate::config::Config;

/// Install locations checked when OpenSCAD is not on PATH
pub const COMMON_PATHS: &[&str] = &[
    "/usr/bin/openscad",
    "/usr/local/bin/openscad",
    "/snap/bin/openscad",
    "/var/lib/flatpak/exports/bin/org.openscad.OpenSCAD",
    "/Applications/OpenSCAD.app/Contents/MacOS/OpenSCAD",
    "C:\\Program Files\\OpenSCAD\\openscad.exe",
    "C:\\Program Files (x86)\\OpenSCAD\\openscad.exe",
];

const PATH_CANDIDATES: &[&str] = &["openscad", "OpenSCAD", "openscad.exe"];

/// Errors from running OpenSCAD
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("OpenSCAD not found. Please install OpenSCAD from https://openscad.org")]
    NotInstalled,

    #[error("SCAD file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("OpenSCAD rendering failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("OpenSCAD did not produce output file")]
    MissingOutput,

    #[error("OpenSCAD timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where the model comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ScadSource {
    /// OpenSCAD source code
    Inline(String),
    /// Path to an existing .scad file
    File(PathBuf),
}

/// Fully normalized arguments for one render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub source: ScadSource,
    pub camera: CameraSpec,
    pub image_size: ImageSize,
    pub color_scheme: ColorScheme,
    pub variables: Map<String, Value>,
    pub auto_center: bool,
}

/// Handle to the OpenSCAD executable
#[derive(Debug)]
pub struct OpenScad {
    executable: Option<PathBuf>,
    temp_dir: PathBuf,
    timeout: Duration,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
}

impl OpenScad {
    /// Locate OpenSCAD and set up the render limits from `config`
    ///
    /// A missing executable is not an error here; renders fail with
    /// [`RenderError::NotInstalled`] instead.
    pub fn new(config: &Config) -> Self {
        Self::with_executable(Self::locate(config), config)
    }

    pub fn with_executable(executable: Option<PathBuf>, config: &Config) -> Self {
        let max_concurrent = config.rendering.max_concurrent.max(1);
        Self {
            executable,
            temp_dir: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.rendering.timeout_seconds),
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Find the OpenSCAD executable: configured path, then PATH, then
    /// [`COMMON_PATHS`].
    pub fn locate(config: &Config) -> Option<PathBuf> {
        if let Some(path) = &config.openscad_path {
            if path.exists() {
                return Some(path.clone());
            }
            debug!(path = %path.display(), "Configured OpenSCAD path does not exist");
        }

        for candidate in PATH_CANDIDATES {
            let check = std::process::Command::new(candidate)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if check.is_ok() {
                return Some(PathBuf::from(candidate));
            }
        }

        COMMON_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Version string reported by `openscad --version`
    pub async fn version(&self) -> Option<String> {
        let executable = self.executable.as_ref()?;
        let output = Command::new(executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        // OpenSCAD prints its version on stderr
        [&output.stdout, &output.stderr]
            .into_iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .find(|text| !text.is_empty())
    }

    /// Render `job` to PNG bytes
    pub async fn render(&self, job: &RenderJob) -> Result<Vec<u8>, RenderError> {
        let executable = self.executable.as_deref().ok_or(RenderError::NotInstalled)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| io::Error::other("render queue closed"))?;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let work_dir = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.temp_dir)?;

        let input = match &job.source {
            ScadSource::Inline(code) => {
                let path = work_dir.path().join("input.scad");
                tokio::fs::write(&path, code).await?;
                path
            }
            ScadSource::File(path) => {
                if !path.exists() {
                    return Err(RenderError::MissingSource(path.clone()));
                }
                path.clone()
            }
        };
        let output_path = work_dir.path().join("output.png");

        let args = command_args(job, &input, &output_path);
        debug!(executable = %executable.display(), ?args, "Running OpenSCAD");

        let child = Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(&output_path).await? {
            return Err(RenderError::MissingOutput);
        }

        let bytes = tokio::fs::read(&output_path).await?;
        info!(bytes = bytes.len(), size = %job.image_size, "Render complete");
        Ok(bytes)
    }

    /// Render `job` and return the PNG as standard base64
    pub async fn render_base64(&self, job: &RenderJob) -> Result<String, RenderError> {
        let bytes = self.render(job).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// OpenSCAD command-line arguments for `job`, excluding the executable
pub fn command_args(job: &RenderJob, input: &Path, output: &Path) -> Vec<String> {
    let [ex, ey, ez] = job.camera.position.to_array();
    let [cx, cy, cz] = job.camera.target.to_array();

    let mut args = vec![
        "-o".to_string(),
        output.display().to_string(),
        "--imgsize".to_string(),
        format!("{},{}", job.image_size.width, job.image_size.height),
        "--colorscheme".to_string(),
        job.color_scheme.name().to_string(),
        // Eye/center form; OpenSCAD derives the up vector itself
        format!("--camera={ex},{ey},{ez},{cx},{cy},{cz}"),
    ];

    if job.auto_center {
        args.push("--autocenter".to_string());
        args.push("--viewall".to_string());
    }

    for (key, value) in &job.variables {
        args.push("-D".to_string());
        args.push(format!("{key}={}", scad_literal(value)));
    }

    args.push(input.display().to_string());
    args
}

/// Format a JSON value as an OpenSCAD expression for `-D`
pub fn scad_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Bool(b) => b.to_string(),
        Value::Null => "undef".to_string(),
        Value::Number(n) => n.to_string(),
        // Arrays are valid OpenSCAD vectors; objects are passed through as-is
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
