//! Fixed view presets and color schemes for consistent, predictable renders
//!
//! Provides a set of standard viewpoints that MCP clients can request by
//! name instead of computing camera vectors themselves.

use glam::DVec3;
use scadview_core::Vector3;

/// Distance from the origin the preset positions are defined at
pub const PRESET_DISTANCE: f64 = 200.0;

/// Camera placement: eye position, look-at point and up vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSpec {
    pub position: Vector3,
    pub target: Vector3,
    pub up: Vector3,
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            position: Vector3::new(70.0, 70.0, 70.0),
            target: Vector3::ZERO,
            up: Vector3::new(0.0, 0.0, 1.0),
        }
    }
}

/// Named camera views
///
/// OpenSCAD is Z-up, so "front" looks along +Y from the -Y side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPreset {
    /// View from front (-Y looking toward origin)
    Front,

    /// View from back (+Y looking toward origin)
    Back,

    /// View from left (-X looking toward origin)
    Left,

    /// View from right (+X looking toward origin)
    Right,

    /// View from above (+Z looking down)
    Top,

    /// View from below (-Z looking up)
    Bottom,

    /// Classic 3/4 isometric view (default)
    #[default]
    Isometric,

    /// Isometric variant with a lower elevation
    Dimetric,
}

impl ViewPreset {
    pub const ALL: [Self; 8] = [
        Self::Front,
        Self::Back,
        Self::Left,
        Self::Right,
        Self::Top,
        Self::Bottom,
        Self::Isometric,
        Self::Dimetric,
    ];

    /// Camera for this view at [`PRESET_DISTANCE`], looking at the origin
    pub fn camera(self) -> CameraSpec {
        let (position, up) = match self {
            Self::Front => (DVec3::new(0.0, -200.0, 0.0), DVec3::Z),
            Self::Back => (DVec3::new(0.0, 200.0, 0.0), DVec3::Z),
            Self::Left => (DVec3::new(-200.0, 0.0, 0.0), DVec3::Z),
            Self::Right => (DVec3::new(200.0, 0.0, 0.0), DVec3::Z),
            Self::Top => (DVec3::new(0.0, 0.0, 200.0), DVec3::Y),
            Self::Bottom => (DVec3::new(0.0, 0.0, -200.0), DVec3::NEG_Y),
            Self::Isometric => (DVec3::new(200.0, 200.0, 200.0), DVec3::Z),
            Self::Dimetric => (DVec3::new(200.0, 100.0, 200.0), DVec3::Z),
        };
        CameraSpec {
            position: position.into(),
            target: Vector3::ZERO,
            up: up.into(),
        }
    }

    /// Camera for this view with the eye moved to scale `distance`
    ///
    /// The eye stays on the same ray from the origin; [`PRESET_DISTANCE`]
    /// reproduces [`ViewPreset::camera`].
    pub fn camera_at(self, distance: f64) -> CameraSpec {
        let mut camera = self.camera();
        let eye = DVec3::from(camera.position) * (distance / PRESET_DISTANCE);
        camera.position = eye.into();
        camera
    }

    /// Parse a view from a string
    ///
    /// Accepts case-insensitive names: "front", "back", "left", "right",
    /// "top", "bottom", "isometric" (or "iso"), "dimetric".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "front" => Some(Self::Front),
            "back" => Some(Self::Back),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "isometric" | "iso" => Some(Self::Isometric),
            "dimetric" => Some(Self::Dimetric),
            _ => None,
        }
    }

    /// Get all available view names
    pub fn all_names() -> &'static [&'static str] {
        &[
            "front",
            "back",
            "left",
            "right",
            "top",
            "bottom",
            "isometric",
            "dimetric",
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Isometric => "isometric",
            Self::Dimetric => "dimetric",
        }
    }
}

impl std::str::FromStr for ViewPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "Invalid view name '{}'. Must be one of: {}",
                s,
                Self::all_names().join(", ")
            )
        })
    }
}

impl std::fmt::Display for ViewPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// OpenSCAD color schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorScheme {
    #[default]
    Cornfield,
    Sunset,
    Metallic,
    Starnight,
    BeforeDawn,
    Nature,
    DeepOcean,
    Tomorrow,
    TomorrowNight,
    Monotone,
}

impl ColorScheme {
    pub const ALL: [Self; 10] = [
        Self::Cornfield,
        Self::Sunset,
        Self::Metallic,
        Self::Starnight,
        Self::BeforeDawn,
        Self::Nature,
        Self::DeepOcean,
        Self::Tomorrow,
        Self::TomorrowNight,
        Self::Monotone,
    ];

    /// Name as OpenSCAD's `--colorscheme` expects it
    pub fn name(self) -> &'static str {
        match self {
            Self::Cornfield => "Cornfield",
            Self::Sunset => "Sunset",
            Self::Metallic => "Metallic",
            Self::Starnight => "Starnight",
            Self::BeforeDawn => "BeforeDawn",
            Self::Nature => "Nature",
            Self::DeepOcean => "DeepOcean",
            Self::Tomorrow => "Tomorrow",
            Self::TomorrowNight => "Tomorrow Night",
            Self::Monotone => "Monotone",
        }
    }

    /// Parse a scheme name, ignoring case, spaces and underscores
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.name().replace(' ', "").to_lowercase() == key)
    }

    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.name()).collect()
    }
}

impl std::str::FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "Unknown color scheme '{}'. Valid options: {}",
                s,
                Self::all_names().join(", ")
            )
        })
    }
}

impl std::fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
