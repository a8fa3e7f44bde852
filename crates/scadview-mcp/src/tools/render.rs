//! Rendering tools for the MCP server
//!
//! Request types accept loosely-shaped arguments (see
//! [`scadview_core::normalize`]) and resolve them into a [`RenderJob`]
//! before OpenSCAD is touched, so every malformed argument is reported as a
//! validation error up front.

use std::collections::BTreeMap;
use std::path::PathBuf;

use schemars::JsonSchema;
use scadview_core::{
    Error, ImageDescriptor, ImageSize, ManagedImages, ManagedResponse, OutputFormat, PNG_MIME,
    Result, normalize_dict, normalize_image_size, normalize_list, normalize_vector3,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::camera::{CameraSpec, ColorScheme, PRESET_DISTANCE, ViewPreset};
use crate::config::Config;
use crate::renderer::{RenderJob, ScadSource};

/// Request for rendering one image
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RenderSingleRequest {
    /// OpenSCAD source code. Exactly one of scad_content or scad_file is required.
    pub scad_content: Option<String>,

    /// Path to a .scad file. Exactly one of scad_content or scad_file is required.
    pub scad_file: Option<String>,

    /// Named view: "front", "back", "left", "right", "top", "bottom",
    /// "isometric", "dimetric". Overrides the camera_* arguments and
    /// enables auto_center.
    pub view: Option<String>,

    /// Camera position as [x, y, z], {"x":..,"y":..,"z":..} or a JSON string
    /// (default: [70, 70, 70])
    pub camera_position: Option<Value>,

    /// Point the camera looks at (default: [0, 0, 0])
    pub camera_target: Option<Value>,

    /// Camera up vector (default: [0, 0, 1])
    pub camera_up: Option<Value>,

    /// Image size as [width, height], "800x600" or "800,600" (default: 800x600)
    pub image_size: Option<Value>,

    /// OpenSCAD color scheme (default: Cornfield)
    pub color_scheme: Option<String>,

    /// Variables passed with -D, as an object, a JSON string or "k=v,k2=v2"
    pub variables: Option<Value>,

    /// Center and fit the model in view
    #[serde(default)]
    pub auto_center: bool,

    /// "auto" (default), "base64", "file_path" or "compressed"
    pub output_format: Option<String>,
}

/// Request for rendering one model from several views
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RenderPerspectivesRequest {
    /// OpenSCAD source code. Exactly one of scad_content or scad_file is required.
    pub scad_content: Option<String>,

    /// Path to a .scad file. Exactly one of scad_content or scad_file is required.
    pub scad_file: Option<String>,

    /// Views to render as a list or comma-separated string (default: all eight)
    pub views: Option<Value>,

    /// Camera distance from the origin (default: 200)
    pub distance: Option<f64>,

    /// Image size for every view (default: 800x600)
    pub image_size: Option<Value>,

    /// OpenSCAD color scheme (default: Cornfield)
    pub color_scheme: Option<String>,

    /// Variables passed with -D
    pub variables: Option<Value>,

    /// "auto" (default), "base64", "file_path" or "compressed"
    pub output_format: Option<String>,
}

/// A validated single render
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRender {
    pub job: RenderJob,
    pub output_format: OutputFormat,
}

/// A validated multi-view render: one job per view, in request order
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPerspectives {
    pub jobs: Vec<(ViewPreset, RenderJob)>,
    pub output_format: OutputFormat,
}

impl RenderSingleRequest {
    pub fn resolve(self, config: &Config) -> Result<ResolvedRender> {
        let source = resolve_source(self.scad_content, self.scad_file)?;

        let (camera, auto_center) = match self.view.as_deref() {
            Some(view) => (parse_view(view)?.camera(), true),
            None => {
                let defaults = CameraSpec::default();
                let camera = CameraSpec {
                    position: normalize_vector3(self.camera_position, defaults.position)?,
                    target: normalize_vector3(self.camera_target, defaults.target)?,
                    up: normalize_vector3(self.camera_up, defaults.up)?,
                };
                (camera, self.auto_center)
            }
        };

        Ok(ResolvedRender {
            job: RenderJob {
                source,
                camera,
                image_size: resolve_image_size(self.image_size, config)?,
                color_scheme: resolve_color_scheme(self.color_scheme.as_deref(), config)?,
                variables: normalize_dict(self.variables, Map::new())?,
                auto_center,
            },
            output_format: resolve_output_format(self.output_format.as_deref())?,
        })
    }
}

impl RenderPerspectivesRequest {
    pub fn resolve(self, config: &Config) -> Result<ResolvedPerspectives> {
        let source = resolve_source(self.scad_content, self.scad_file)?;

        let distance = self.distance.unwrap_or(PRESET_DISTANCE);
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "distance must be a positive number, got {distance}"
            )));
        }

        let all: Vec<Value> = ViewPreset::all_names()
            .iter()
            .map(|name| Value::from(*name))
            .collect();
        let mut views = Vec::new();
        for raw in normalize_list(self.views, all)? {
            let view = match &raw {
                Value::String(name) => parse_view(name)?,
                other => parse_view(&other.to_string())?,
            };
            if !views.contains(&view) {
                views.push(view);
            }
        }
        if views.is_empty() {
            return Err(Error::InvalidParameter("No views requested".into()));
        }

        let image_size = resolve_image_size(self.image_size, config)?;
        let color_scheme = resolve_color_scheme(self.color_scheme.as_deref(), config)?;
        let variables = normalize_dict(self.variables, Map::new())?;

        let jobs = views
            .into_iter()
            .map(|view| {
                let job = RenderJob {
                    source: source.clone(),
                    camera: view.camera_at(distance),
                    image_size,
                    color_scheme,
                    variables: variables.clone(),
                    auto_center: true,
                };
                (view, job)
            })
            .collect();

        Ok(ResolvedPerspectives {
            jobs,
            output_format: resolve_output_format(self.output_format.as_deref())?,
        })
    }
}

fn resolve_source(content: Option<String>, file: Option<String>) -> Result<ScadSource> {
    // Blank strings count as absent
    let provided = |value: Option<String>| value.filter(|s| !s.trim().is_empty());
    match (provided(content), provided(file)) {
        (Some(code), None) => Ok(ScadSource::Inline(code)),
        (None, Some(path)) => Ok(ScadSource::File(PathBuf::from(path))),
        (Some(_), Some(_)) => Err(Error::InvalidParameter(
            "Provide either scad_content or scad_file, not both".into(),
        )),
        (None, None) => Err(Error::InvalidParameter(
            "Either scad_content or scad_file must be provided".into(),
        )),
    }
}

fn parse_view(name: &str) -> Result<ViewPreset> {
    name.parse().map_err(Error::InvalidParameter)
}

fn resolve_image_size(raw: Option<Value>, config: &Config) -> Result<ImageSize> {
    let size = normalize_image_size(raw, ImageSize::default())?;
    size.ensure_within(config.rendering.max_image_width, config.rendering.max_image_height)?;
    Ok(size)
}

fn resolve_color_scheme(name: Option<&str>, config: &Config) -> Result<ColorScheme> {
    match name {
        Some(name) => name.parse().map_err(Error::InvalidParameter),
        None => Ok(config.default_color_scheme()),
    }
}

fn resolve_output_format(name: Option<&str>) -> Result<OutputFormat> {
    name.map_or(Ok(OutputFormat::Auto), str::parse)
}

/// Result envelope of `render_single`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEnvelope {
    pub success: bool,

    #[serde(flatten)]
    pub image: Option<ImageDescriptor>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub operation_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RenderEnvelope {
    pub fn success(
        image: ImageDescriptor,
        output_format: OutputFormat,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            image: Some(image),
            error: None,
            operation_id: operation_id(),
            output_format: Some(output_format),
            warnings,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            image: None,
            error: Some(error.into()),
            operation_id: operation_id(),
            output_format: None,
            warnings: Vec::new(),
        }
    }

    /// Build a success envelope from the managed form of a one-image set
    /// named `name`
    pub fn from_managed(managed: ManagedResponse, name: &str) -> Self {
        let image = match managed.images {
            ManagedImages::Plain(mut map) => map.remove(name).map(ImageDescriptor::inline),
            ManagedImages::Named(mut map) => map.remove(name),
            ManagedImages::Ordered(list) => list.into_iter().next(),
        };
        match image {
            Some(image) => Self::success(image, managed.format, managed.warnings),
            None => Self::failure(format!("No image named '{name}' in response")),
        }
    }
}

/// Result envelope of `render_perspectives`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiRenderEnvelope {
    /// True when every requested view rendered
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<ManagedImages>,

    /// View name -> error message for views that failed
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub operation_id: String,

    pub mime_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MultiRenderEnvelope {
    pub fn from_managed(managed: ManagedResponse, errors: BTreeMap<String, String>) -> Self {
        Self {
            success: errors.is_empty(),
            images: Some(managed.images),
            errors,
            error: None,
            operation_id: operation_id(),
            mime_type: PNG_MIME.to_string(),
            output_format: Some(managed.format),
            warnings: managed.warnings,
        }
    }

    pub fn failure(error: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self {
            success: false,
            images: None,
            errors,
            error: Some(error.into()),
            operation_id: operation_id(),
            mime_type: PNG_MIME.to_string(),
            output_format: None,
            warnings: Vec::new(),
        }
    }
}

fn operation_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use scadview_core::Vector3;
    use serde_json::json;

    fn request() -> RenderSingleRequest {
        RenderSingleRequest {
            scad_content: Some("cube(10);".into()),
            ..RenderSingleRequest::default()
        }
    }

    #[test]
    fn test_defaults() {
        let resolved = request().resolve(&Config::default()).unwrap();
        assert_eq!(resolved.output_format, OutputFormat::Auto);
        assert_eq!(resolved.job.camera, CameraSpec::default());
        assert_eq!(resolved.job.image_size, ImageSize::new(800, 600));
        assert_eq!(resolved.job.color_scheme, ColorScheme::Cornfield);
        assert!(resolved.job.variables.is_empty());
        assert!(!resolved.job.auto_center);
    }

    #[test]
    fn test_source_exclusivity() {
        let both = RenderSingleRequest {
            scad_file: Some("model.scad".into()),
            ..request()
        };
        let err = both.resolve(&Config::default()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("not both"));

        let neither = RenderSingleRequest::default();
        assert!(neither.resolve(&Config::default()).unwrap_err().is_validation());
    }

    #[test]
    fn test_blank_source_counts_as_absent() {
        let blank_content = RenderSingleRequest {
            scad_content: Some(String::new()),
            scad_file: Some("model.scad".into()),
            ..RenderSingleRequest::default()
        };
        let resolved = blank_content.resolve(&Config::default()).unwrap();
        assert_eq!(resolved.job.source, ScadSource::File(PathBuf::from("model.scad")));

        let blank_file = RenderSingleRequest {
            scad_file: Some("  ".into()),
            ..request()
        };
        let resolved = blank_file.resolve(&Config::default()).unwrap();
        assert_eq!(resolved.job.source, ScadSource::Inline("cube(10);".into()));
    }

    #[test]
    fn test_blank_source_alone_is_rejected() {
        let req = RenderSingleRequest {
            scad_content: Some(String::new()),
            ..RenderSingleRequest::default()
        };
        let err = req.resolve(&Config::default()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("must be provided"));

        let req = RenderPerspectivesRequest {
            scad_content: Some("\n".into()),
            scad_file: Some(String::new()),
            ..RenderPerspectivesRequest::default()
        };
        assert!(req.resolve(&Config::default()).unwrap_err().is_validation());
    }

    #[test]
    fn test_view_overrides_camera() {
        let req = RenderSingleRequest {
            view: Some("Top".into()),
            camera_position: Some(json!([1, 2, 3])),
            ..request()
        };
        let resolved = req.resolve(&Config::default()).unwrap();
        assert_eq!(resolved.job.camera, ViewPreset::Top.camera());
        assert!(resolved.job.auto_center);
    }

    #[test]
    fn test_unknown_view_lists_options() {
        let req = RenderSingleRequest {
            view: Some("sideways".into()),
            ..request()
        };
        let err = req.resolve(&Config::default()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("isometric"));
    }

    #[test]
    fn test_loose_shapes() {
        let req = RenderSingleRequest {
            camera_position: Some(json!("[10, 20, 30]")),
            camera_target: Some(json!({"x": 1, "y": 2, "z": 3})),
            image_size: Some(json!("1024x768")),
            variables: Some(json!("size=5,label=box")),
            color_scheme: Some("tomorrow night".into()),
            output_format: Some("file_path".into()),
            ..request()
        };
        let resolved = req.resolve(&Config::default()).unwrap();
        assert_eq!(resolved.job.camera.position, Vector3::new(10.0, 20.0, 30.0));
        assert_eq!(resolved.job.camera.target, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(resolved.job.image_size, ImageSize::new(1024, 768));
        assert_eq!(resolved.job.variables["size"], json!(5));
        assert_eq!(resolved.job.variables["label"], json!("box"));
        assert_eq!(resolved.job.color_scheme, ColorScheme::TomorrowNight);
        assert_eq!(resolved.output_format, OutputFormat::FilePath);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let req = RenderSingleRequest {
            image_size: Some(json!([5000, 100])),
            ..request()
        };
        assert!(req.resolve(&Config::default()).is_err());
    }

    #[test]
    fn test_unknown_output_format() {
        let req = RenderSingleRequest {
            output_format: Some("jpeg".into()),
            ..request()
        };
        let err = req.resolve(&Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownOutputFormat(_)));
    }

    #[test]
    fn test_perspectives_default_all_views() {
        let req = RenderPerspectivesRequest {
            scad_content: Some("sphere(5);".into()),
            ..RenderPerspectivesRequest::default()
        };
        let resolved = req.resolve(&Config::default()).unwrap();
        let views: Vec<_> = resolved.jobs.iter().map(|(view, _)| *view).collect();
        assert_eq!(views, ViewPreset::ALL.to_vec());
        assert!(resolved.jobs.iter().all(|(_, job)| job.auto_center));
    }

    #[test]
    fn test_perspectives_dedupes_and_scales() {
        let req = RenderPerspectivesRequest {
            scad_content: Some("sphere(5);".into()),
            views: Some(json!("front, iso, FRONT")),
            distance: Some(100.0),
            ..RenderPerspectivesRequest::default()
        };
        let resolved = req.resolve(&Config::default()).unwrap();
        assert_eq!(resolved.jobs.len(), 2);
        assert_eq!(resolved.jobs[0].0, ViewPreset::Front);
        assert_eq!(resolved.jobs[1].0, ViewPreset::Isometric);
        assert_eq!(
            resolved.jobs[0].1.camera.position,
            Vector3::new(0.0, -100.0, 0.0)
        );
    }

    #[test]
    fn test_perspectives_rejects_bad_distance() {
        let req = RenderPerspectivesRequest {
            scad_content: Some("sphere(5);".into()),
            distance: Some(0.0),
            ..RenderPerspectivesRequest::default()
        };
        assert!(req.resolve(&Config::default()).unwrap_err().is_validation());
    }

    #[test]
    fn test_failure_envelope_shape() {
        let value = serde_json::to_value(RenderEnvelope::failure("boom")).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("boom"));
        assert!(value["operation_id"].as_str().unwrap().len() >= 32);
        assert!(value.get("data").is_none());
    }
}
