//! Adaptive response sizing for rendered images
//!
//! A render can easily produce more base64 than an MCP client is willing to
//! accept in one tool result. [`ResponseManager`] estimates the size of a
//! set of encoded images and, when asked to decide automatically, picks one
//! of three strategies:
//!
//! 1. inline base64 when the estimate fits the budget
//! 2. recompressed base64 when a trial on the first image saves >= 30%
//! 3. PNG files written to the output directory otherwise
//!
//! Images are never dropped. A failed recompression falls back to inline
//! data for that image; a failed file write fails the whole call.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compress::{ImageCompressor, PngCompressor, compression_ratio, estimate_response_size};
use crate::error::{Error, Result};

/// MIME type of every image the renderer produces
pub const PNG_MIME: &str = "image/png";

/// Trial compression must get below this ratio to be worth using
const COMPRESSION_THRESHOLD: f64 = 0.7;

/// How images should be returned to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pick one of the others based on estimated size (default)
    #[default]
    Auto,

    /// Inline base64 data
    Base64,

    /// Write PNG files and return their paths
    FilePath,

    /// Recompressed inline base64 data
    Compressed,
}

impl OutputFormat {
    /// Parse an output format directive
    ///
    /// Accepts case-insensitive names: "auto", "base64" (or "inline"),
    /// "file_path" (or "file"), "compressed".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "base64" | "inline" => Some(Self::Base64),
            "file_path" | "file" => Some(Self::FilePath),
            "compressed" => Some(Self::Compressed),
            _ => None,
        }
    }

    /// Get all canonical format names
    pub fn all_names() -> &'static [&'static str] {
        &["auto", "base64", "file_path", "compressed"]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Base64 => "base64",
            Self::FilePath => "file_path",
            Self::Compressed => "compressed",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::UnknownOutputFormat(s.to_string()))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an ordered image list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Used for file names; defaults to `image_{index}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base64-encoded image
    pub data: String,
}

/// The images of one response, keyed by name or in caller order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImageSet {
    Named(BTreeMap<String, String>),
    Ordered(Vec<ImageRecord>),
}

impl ImageSet {
    /// A named set holding a single image
    pub fn single(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Named(BTreeMap::from([(name.into(), data.into())]))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Named(map) => map.len(),
            Self::Ordered(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn first(&self) -> Option<&str> {
        match self {
            Self::Named(map) => map.values().next().map(String::as_str),
            Self::Ordered(records) => records.first().map(|r| r.data.as_str()),
        }
    }
}

/// How a single image was materialized in the response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ImageDescriptor {
    #[serde(rename = "base64")]
    Inline { data: String, mime_type: String },

    #[serde(rename = "base64_compressed")]
    Compressed {
        data: String,
        mime_type: String,
        compression_ratio: f64,
    },

    #[serde(rename = "file_path")]
    File { path: PathBuf, mime_type: String },
}

impl ImageDescriptor {
    pub fn inline(data: impl Into<String>) -> Self {
        Self::Inline {
            data: data.into(),
            mime_type: PNG_MIME.to_string(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

/// Materialized images, in the same shape the caller supplied
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManagedImages {
    /// Every image stayed inline: plain name -> base64 mapping
    Plain(BTreeMap<String, String>),
    Named(BTreeMap<String, ImageDescriptor>),
    Ordered(Vec<ImageDescriptor>),
}

/// Result of [`ResponseManager::manage`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedResponse {
    pub images: ManagedImages,

    /// The format actually used (never `Auto`)
    pub format: OutputFormat,

    /// Per-image problems that were recovered from
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Chooses and applies an output strategy for a set of encoded images
///
/// Holds no shared mutable state; create one per call or share freely.
#[derive(Debug, Clone)]
pub struct ResponseManager<C = PngCompressor> {
    budget: usize,
    output_dir: PathBuf,
    compressor: C,
}

impl ResponseManager {
    /// Create a manager with the default PNG compressor
    ///
    /// `budget` is in estimated tokens (see
    /// [`estimate_response_size`]); `output_dir` is only touched when images
    /// are written to files.
    pub fn new(budget: usize, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            budget,
            output_dir: output_dir.into(),
            compressor: PngCompressor::default(),
        }
    }
}

impl<C: ImageCompressor> ResponseManager<C> {
    /// Replace the compressor used for trials and compressed output
    pub fn with_compressor<D: ImageCompressor>(self, compressor: D) -> ResponseManager<D> {
        ResponseManager {
            budget: self.budget,
            output_dir: self.output_dir,
            compressor,
        }
    }

    /// Decide the concrete format for `images`.
    ///
    /// Anything other than `Auto` is returned unchanged. Only the first image
    /// is trial-compressed, so a `Compressed` result does not guarantee the
    /// whole set fits the budget. For a named set, "first" is the
    /// lexicographically smallest name, not the order the caller built it in.
    pub fn resolve_format(
        &self,
        images: &ImageSet,
        requested: OutputFormat,
    ) -> Result<OutputFormat> {
        if requested != OutputFormat::Auto {
            return Ok(requested);
        }

        let estimated = estimate_response_size(images)?;
        debug!(estimated, budget = self.budget, "Estimated response size");

        if estimated <= self.budget {
            return Ok(OutputFormat::Base64);
        }

        if let Some(first) = images.first() {
            match self.compressor.compress(first) {
                Ok(compressed) => {
                    let ratio = compression_ratio(&compressed, first);
                    debug!(ratio, "Trial compression");
                    if ratio < COMPRESSION_THRESHOLD {
                        return Ok(OutputFormat::Compressed);
                    }
                }
                Err(e) => debug!(error = %e, "Trial compression failed"),
            }
        }

        Ok(OutputFormat::FilePath)
    }

    /// Produce the descriptor for one image under a resolved format
    pub fn materialize(
        &self,
        name: &str,
        data: &str,
        format: OutputFormat,
        warnings: &mut Vec<String>,
    ) -> Result<ImageDescriptor> {
        match format {
            OutputFormat::FilePath => {
                let path = save_image_to_file(data, &unique_file_name(name), &self.output_dir)?;
                Ok(ImageDescriptor::File {
                    path,
                    mime_type: PNG_MIME.to_string(),
                })
            }
            OutputFormat::Compressed => match self.compressor.compress(data) {
                Ok(compressed) => {
                    let compression_ratio = compression_ratio(&compressed, data);
                    Ok(ImageDescriptor::Compressed {
                        data: compressed,
                        mime_type: PNG_MIME.to_string(),
                        compression_ratio,
                    })
                }
                Err(e) => {
                    warn!(image = name, error = %e, "Compression failed, returning original data");
                    warnings.push(format!("Compression failed for {name}: {e}"));
                    Ok(ImageDescriptor::inline(data))
                }
            },
            OutputFormat::Auto | OutputFormat::Base64 => Ok(ImageDescriptor::inline(data)),
        }
    }

    /// Resolve the format and materialize every image, preserving the
    /// caller's mapping/sequence shape.
    ///
    /// A mapping whose images all stayed inline collapses to a plain
    /// name -> base64 mapping.
    pub fn manage(&self, images: &ImageSet, requested: OutputFormat) -> Result<ManagedResponse> {
        let format = self.resolve_format(images, requested)?;
        info!(%format, count = images.len(), "Selected output format");

        let mut warnings = Vec::new();
        let managed = match images {
            ImageSet::Named(map) => {
                let mut out = BTreeMap::new();
                for (name, data) in map {
                    let descriptor = self.materialize(name, data, format, &mut warnings)?;
                    out.insert(name.clone(), descriptor);
                }
                collapse_inline(out)
            }
            ImageSet::Ordered(records) => {
                let mut out = Vec::with_capacity(records.len());
                for (index, record) in records.iter().enumerate() {
                    let name = record
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("image_{index}"));
                    out.push(self.materialize(&name, &record.data, format, &mut warnings)?);
                }
                ManagedImages::Ordered(out)
            }
        };

        Ok(ManagedResponse {
            images: managed,
            format,
            warnings,
        })
    }
}

fn collapse_inline(map: BTreeMap<String, ImageDescriptor>) -> ManagedImages {
    if !map.values().all(ImageDescriptor::is_inline) {
        return ManagedImages::Named(map);
    }
    ManagedImages::Plain(
        map.into_iter()
            .filter_map(|(name, descriptor)| match descriptor {
                ImageDescriptor::Inline { data, .. } => Some((name, data)),
                _ => None,
            })
            .collect(),
    )
}

/// `{name}_{8 hex chars}.png`, with path-unsafe characters replaced
pub fn unique_file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{stem}_{}.png", &suffix[..8])
}

/// Decode base64 image data and write it to `output_dir/file_name`.
///
/// The directory is created if needed. Returns the written path.
pub fn save_image_to_file(encoded: &str, file_name: &str, output_dir: &Path) -> Result<PathBuf> {
    let bytes = STANDARD.decode(encoded)?;

    fs::create_dir_all(output_dir).map_err(|source| Error::SaveImage {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let path = output_dir.join(file_name);
    fs::write(&path, bytes).map_err(|source| Error::SaveImage {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), "Saved image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_output_format() {
        assert_eq!(OutputFormat::parse("auto"), Some(OutputFormat::Auto));
        assert_eq!(OutputFormat::parse("BASE64"), Some(OutputFormat::Base64));
        assert_eq!(OutputFormat::parse("inline"), Some(OutputFormat::Base64));
        assert_eq!(OutputFormat::parse(" file_path "), Some(OutputFormat::FilePath));
        assert_eq!(OutputFormat::parse("compressed"), Some(OutputFormat::Compressed));
        assert_eq!(OutputFormat::parse("zip"), None);
    }

    #[test]
    fn test_unknown_format_is_validation_error() {
        let err = "jpeg".parse::<OutputFormat>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("jpeg"));
    }

    #[test]
    fn test_descriptor_serialization() {
        let inline = serde_json::to_value(ImageDescriptor::inline("abc")).unwrap();
        assert_eq!(inline, json!({"type": "base64", "data": "abc", "mime_type": "image/png"}));

        let file = serde_json::to_value(ImageDescriptor::File {
            path: PathBuf::from("/tmp/a.png"),
            mime_type: PNG_MIME.to_string(),
        })
        .unwrap();
        assert_eq!(file["type"], "file_path");
        assert_eq!(file["path"], "/tmp/a.png");
    }

    #[test]
    fn test_unique_file_name() {
        let name = unique_file_name("render");
        assert!(name.starts_with("render_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "render_".len() + 8 + ".png".len());
        assert_ne!(unique_file_name("render"), unique_file_name("render"));
    }

    #[test]
    fn test_unique_file_name_strips_separators() {
        let name = unique_file_name("../etc/passwd");
        assert!(!name.contains('/'));
        assert!(name.starts_with("___etc_passwd_"));
    }

    #[test]
    fn test_image_set_serializes_in_caller_shape() {
        let named = ImageSet::single("render", "abc");
        assert_eq!(serde_json::to_value(&named).unwrap(), json!({"render": "abc"}));

        let ordered = ImageSet::Ordered(vec![ImageRecord {
            name: None,
            data: "abc".into(),
        }]);
        assert_eq!(serde_json::to_value(&ordered).unwrap(), json!([{"data": "abc"}]));
    }
}
