//! Permissive parameter normalization
//!
//! MCP clients (LLM agents in particular) are inconsistent about how they
//! serialize structured arguments: a camera position may arrive as a real
//! JSON array, as an `{x, y, z}` object, or as a string containing either.
//! Each function here accepts every shape we have seen for one logical
//! value, tries them in a fixed order, and produces a single canonical type.
//!
//! All functions share the same contract for missing input: `None` (or a
//! JSON `null`) returns `default` untouched, so callers can tell whether the
//! client overrode a value.

use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// Hard ceiling on width * height for a single render (a 4096x4096 image)
pub const MAX_TOTAL_PIXELS: u64 = 16_777_216;

/// A 3-component vector used for camera position, target and up
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vector3> for DVec3 {
    fn from(v: Vector3) -> Self {
        DVec3::new(v.x, v.y, v.z)
    }
}

impl From<DVec3> for Vector3 {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Output image dimensions in pixels
///
/// Both components are always positive once produced by
/// [`normalize_image_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Check this size against a per-axis maximum and [`MAX_TOTAL_PIXELS`]
    pub fn ensure_within(self, max_width: u32, max_height: u32) -> Result<()> {
        if self.width > max_width {
            return Err(Error::invalid(format!(
                "width exceeds maximum of {max_width} pixels (got {})",
                self.width
            )));
        }
        if self.height > max_height {
            return Err(Error::invalid(format!(
                "height exceeds maximum of {max_height} pixels (got {})",
                self.height
            )));
        }
        let total = self.pixel_count();
        if total > MAX_TOTAL_PIXELS {
            return Err(Error::invalid(format!(
                "Total pixels ({total}) exceeds limit ({MAX_TOTAL_PIXELS})"
            )));
        }
        Ok(())
    }

    fn checked(width: i64, height: i64) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::invalid(format!(
                "Image size values must be positive, got {width}x{height}"
            )));
        }
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => Ok(Self::new(w, h)),
            _ => Err(Error::invalid(format!(
                "Image size {width}x{height} is out of range"
            ))),
        }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Name of a JSON value's type, for error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Vector3
// ============================================================================

/// Normalize a 3-vector.
///
/// Accepts, in order: a 3-element array, an object with `x`, `y`, `z` keys,
/// or a string holding JSON of either shape.
pub fn normalize_vector3(raw: Option<Value>, default: Vector3) -> Result<Vector3> {
    match raw {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Array(items)) => vector_from_sequence(&items),
        Some(Value::Object(map)) => vector_from_mapping(&map),
        Some(Value::String(text)) => vector_from_str(&text),
        Some(other) => Err(Error::invalid(format!(
            "Unexpected type for vector parameter: {}",
            json_type_name(&other)
        ))),
    }
}

fn vector_from_sequence(items: &[Value]) -> Result<Vector3> {
    let [x, y, z] = items else {
        return Err(Error::Arity {
            what: "Vector parameter",
            expected: 3,
            got: items.len(),
        });
    };
    Ok(Vector3::new(coerce_f64(x)?, coerce_f64(y)?, coerce_f64(z)?))
}

fn vector_from_mapping(map: &Map<String, Value>) -> Result<Vector3> {
    if let (Some(x), Some(y), Some(z)) = (map.get("x"), map.get("y"), map.get("z")) {
        return Ok(Vector3::new(coerce_f64(x)?, coerce_f64(y)?, coerce_f64(z)?));
    }
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    Err(Error::invalid(format!(
        "Mapping must have x, y, z keys, got [{}]",
        keys.join(", ")
    )))
}

fn vector_from_str(text: &str) -> Result<Vector3> {
    let cannot_parse = |reason: &dyn fmt::Display| {
        Error::invalid(format!("Cannot parse '{text}' as vector parameter: {reason}"))
    };

    let parsed: Value = serde_json::from_str(text.trim()).map_err(|e| cannot_parse(&e))?;
    match &parsed {
        Value::Array(items) if items.len() == 3 => {
            vector_from_sequence(items).map_err(|e| cannot_parse(&e))
        }
        Value::Object(map) if ["x", "y", "z"].iter().all(|k| map.contains_key(*k)) => {
            vector_from_mapping(map).map_err(|e| cannot_parse(&e))
        }
        _ => Err(cannot_parse(
            &"expected a list of 3 numbers or a mapping with x, y, z keys",
        )),
    }
}

fn coerce_f64(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::invalid(format!("Expected a number, got {value}")))
}

// ============================================================================
// ImageSize
// ============================================================================

/// Normalize an image size.
///
/// Accepts a 2-element array, or a string of the form `"[W, H]"`, `"WxH"`
/// (either case of `x`) or `"W,H"`. Strings starting with `[` are tried as
/// JSON first; when that fails the separator forms apply.
pub fn normalize_image_size(raw: Option<Value>, default: ImageSize) -> Result<ImageSize> {
    match raw {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Array(items)) => size_from_sequence(&items),
        Some(Value::String(text)) => size_from_str(&text),
        Some(other) => Err(Error::invalid(format!(
            "Cannot parse image size from {other}"
        ))),
    }
}

fn size_from_sequence(items: &[Value]) -> Result<ImageSize> {
    let [width, height] = items else {
        return Err(Error::Arity {
            what: "Image size",
            expected: 2,
            got: items.len(),
        });
    };
    ImageSize::checked(coerce_dimension(width)?, coerce_dimension(height)?)
}

fn coerce_dimension(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::invalid(format!("Cannot parse image size value {value}")))
}

fn size_from_str(text: &str) -> Result<ImageSize> {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return size_from_sequence(&items);
        }
    }

    if trimmed.contains(['x', 'X']) {
        return size_from_parts(text, &trimmed.split(['x', 'X']).collect::<Vec<_>>());
    }

    if trimmed.contains(',') {
        return size_from_parts(text, &trimmed.split(',').collect::<Vec<_>>());
    }

    Err(Error::invalid(format!("Cannot parse image size from '{text}'")))
}

fn size_from_parts(raw: &str, parts: &[&str]) -> Result<ImageSize> {
    let [width, height] = parts else {
        return Err(Error::Arity {
            what: "Image size",
            expected: 2,
            got: parts.len(),
        });
    };
    let parse = |part: &str| {
        part.trim()
            .parse::<i64>()
            .map_err(|_| Error::invalid(format!("Cannot parse image size from '{raw}'")))
    };
    ImageSize::checked(parse(*width)?, parse(*height)?)
}

// ============================================================================
// Lists
// ============================================================================

/// Normalize an ordered list.
///
/// Arrays pass through untouched. Strings starting with `[` are tried as
/// JSON arrays; otherwise (or when that fails) a string with commas is split
/// into trimmed, non-empty parts, and a string without commas becomes a
/// single element.
pub fn normalize_list(raw: Option<Value>, default: Vec<Value>) -> Result<Vec<Value>> {
    match raw {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Array(items)) => Ok(items),
        Some(Value::String(text)) => Ok(list_from_str(&text)),
        Some(other) => Err(Error::invalid(format!(
            "Cannot parse list from type {}",
            json_type_name(&other)
        ))),
    }
}

fn list_from_str(text: &str) -> Vec<Value> {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return items;
        }
    }

    if trimmed.contains(',') {
        return trimmed
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_owned()))
            .collect();
    }

    vec![Value::String(trimmed.to_owned())]
}

// ============================================================================
// Mappings
// ============================================================================

/// Normalize a string-keyed mapping.
///
/// Objects pass through untouched. A string starting with `{` must be a
/// valid JSON object. Any other string must contain `key=value` pairs
/// separated by commas; values are coerced to integer, float (only when the
/// value contains a `.`), boolean, or left as strings.
pub fn normalize_dict(
    raw: Option<Value>,
    default: Map<String, Value>,
) -> Result<Map<String, Value>> {
    match raw {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) => dict_from_str(&text),
        Some(other) => Err(Error::invalid(format!(
            "Cannot parse dict from type {}",
            json_type_name(&other)
        ))),
    }
}

fn dict_from_str(text: &str) -> Result<Map<String, Value>> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::invalid(format!(
                "JSON parsed to {}, expected object",
                json_type_name(&other)
            ))),
            Err(e) => Err(Error::invalid(format!(
                "Cannot parse dict from '{text}': {e}"
            ))),
        };
    }

    if !trimmed.contains('=') {
        return Err(Error::invalid(format!(
            "Cannot parse dict from '{text}': expected a JSON object or key=value pairs"
        )));
    }

    let mut map = Map::new();
    for pair in trimmed.split(',') {
        // Pairs without '=' are skipped
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        map.insert(key.trim().to_owned(), coerce_scalar(value.trim()));
    }
    Ok(map)
}

fn coerce_scalar(value: &str) -> Value {
    if let Ok(i) = value.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = value.parse::<u64>() {
        return Value::from(u);
    }
    if value.contains('.') {
        if let Some(n) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(value.to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn dict(raw: Value) -> Map<String, Value> {
        normalize_dict(Some(raw), Map::new()).unwrap()
    }

    #[test]
    fn test_vector_shapes_agree() {
        let expected = Vector3::new(70.0, 70.0, 70.0);
        let shapes = [
            json!([70, 70, 70]),
            json!({"x": 70, "y": 70.0, "z": 70}),
            json!("[70, 70, 70]"),
            json!(r#"{"x": 70, "y": 70, "z": 70}"#),
            json!(["70", "70", "70"]),
        ];
        for shape in shapes {
            assert_eq!(normalize_vector3(Some(shape), Vector3::ZERO).unwrap(), expected);
        }
    }

    #[test]
    fn test_vector_absent_returns_default() {
        let default = Vector3::new(0.0, 0.0, 1.0);
        assert_eq!(normalize_vector3(None, default).unwrap(), default);
        assert_eq!(normalize_vector3(Some(Value::Null), default).unwrap(), default);
    }

    #[test]
    fn test_vector_extreme_values() {
        let v = normalize_vector3(Some(json!({"x": 0.001, "y": -10000, "z": 99999})), Vector3::ZERO)
            .unwrap();
        assert_relative_eq!(v.x, 0.001);
        assert_relative_eq!(v.y, -10000.0);
        assert_relative_eq!(v.z, 99999.0);
    }

    #[test]
    fn test_vector_wrong_arity() {
        let err = normalize_vector3(Some(json!([1, 2])), Vector3::ZERO).unwrap_err();
        assert!(err.to_string().contains("3 values"), "{err}");
        assert!(err.is_validation());
    }

    #[test]
    fn test_vector_missing_keys() {
        let err = normalize_vector3(Some(json!({"x": 1, "y": 2})), Vector3::ZERO).unwrap_err();
        assert!(err.to_string().contains("x, y, z"), "{err}");
    }

    #[test]
    fn test_vector_bad_string_names_input() {
        let err = normalize_vector3(Some(json!("not a vector")), Vector3::ZERO).unwrap_err();
        assert!(err.to_string().contains("'not a vector'"), "{err}");

        let err = normalize_vector3(Some(json!("[1, 2]")), Vector3::ZERO).unwrap_err();
        assert!(err.to_string().contains("'[1, 2]'"), "{err}");
    }

    #[test]
    fn test_vector_rejects_other_types() {
        let err = normalize_vector3(Some(json!(42)), Vector3::ZERO).unwrap_err();
        assert!(err.to_string().contains("number"), "{err}");
    }

    #[test]
    fn test_image_size_shapes_agree() {
        let expected = ImageSize::new(800, 600);
        let shapes = [
            json!([800, 600]),
            json!("800x600"),
            json!("800X600"),
            json!(" 800 x 600 "),
            json!("800,600"),
            json!("[800, 600]"),
        ];
        for shape in shapes {
            assert_eq!(
                normalize_image_size(Some(shape.clone()), ImageSize::new(1, 1)).unwrap(),
                expected,
                "shape {shape}"
            );
        }
    }

    #[test]
    fn test_image_size_arity_errors() {
        for shape in [json!([800]), json!([800, 600, 400]), json!("800x600x400")] {
            let err = normalize_image_size(Some(shape), ImageSize::default()).unwrap_err();
            assert!(err.to_string().contains("2 values"), "{err}");
        }
    }

    #[test]
    fn test_image_size_rejects_zero_and_garbage() {
        assert!(normalize_image_size(Some(json!([0, 600])), ImageSize::default()).is_err());
        assert!(normalize_image_size(Some(json!("-5x10")), ImageSize::default()).is_err());

        let err = normalize_image_size(Some(json!("large")), ImageSize::default()).unwrap_err();
        assert!(err.to_string().contains("large"), "{err}");

        let err = normalize_image_size(Some(json!(true)), ImageSize::default()).unwrap_err();
        assert!(err.to_string().contains("true"), "{err}");
    }

    #[test]
    fn test_image_size_asymmetric() {
        let size = normalize_image_size(Some(json!("10x5000")), ImageSize::default()).unwrap();
        assert_eq!(size, ImageSize::new(10, 5000));
    }

    #[test]
    fn test_image_size_limits() {
        assert!(ImageSize::new(4096, 4096).ensure_within(4096, 4096).is_ok());
        assert!(ImageSize::new(4097, 10).ensure_within(4096, 4096).is_err());
        assert!(ImageSize::new(8192, 8192).ensure_within(8192, 8192).is_err());
    }

    #[test]
    fn test_list_absent_returns_same_allocation() {
        let default = vec![json!("front"), json!("top")];
        let ptr = default.as_ptr();
        let out = normalize_list(None, default).unwrap();
        assert_eq!(out.as_ptr(), ptr);
    }

    #[test]
    fn test_list_csv() {
        assert_eq!(
            normalize_list(Some(json!("a,b,")), vec![]).unwrap(),
            vec![json!("a"), json!("b")]
        );
        assert_eq!(
            normalize_list(Some(json!("valid1, valid2,,valid3")), vec![]).unwrap(),
            vec![json!("valid1"), json!("valid2"), json!("valid3")]
        );
    }

    #[test]
    fn test_list_json_preserves_types() {
        let out = normalize_list(Some(json!("[1, \"two\", 3.5]")), vec![]).unwrap();
        assert_eq!(out, vec![json!(1), json!("two"), json!(3.5)]);

        let out = normalize_list(Some(json!(r#"["123", "456.789"]"#)), vec![]).unwrap();
        assert_eq!(out, vec![json!("123"), json!("456.789")]);

        assert!(normalize_list(Some(json!("[]")), vec![json!("x")]).unwrap().is_empty());
    }

    #[test]
    fn test_list_malformed_json_falls_back_to_csv() {
        let out = normalize_list(Some(json!("[1,2,3")), vec![]).unwrap();
        assert_eq!(out, vec![json!("[1"), json!("2"), json!("3")]);
    }

    #[test]
    fn test_list_single_value() {
        assert_eq!(normalize_list(Some(json!(" front ")), vec![]).unwrap(), vec![json!("front")]);
    }

    #[test]
    fn test_list_rejects_other_types() {
        let err = normalize_list(Some(json!({"a": 1})), vec![]).unwrap_err();
        assert!(err.to_string().contains("object"), "{err}");
    }

    #[test]
    fn test_dict_key_value_coercion() {
        let out = dict(json!("x=10,y=20.5,active=true"));
        assert_eq!(out["x"], json!(10));
        assert!(out["x"].is_i64());
        assert_eq!(out["y"], json!(20.5));
        assert!(out["y"].is_f64());
        assert_eq!(out["active"], json!(true));
    }

    #[test]
    fn test_dict_values_kept_as_strings() {
        let out = dict(json!("maybe=yes,key=null,equation=x=y+z,zip=abc.def"));
        assert_eq!(out["maybe"], json!("yes"));
        assert_eq!(out["key"], json!("null"));
        assert_eq!(out["equation"], json!("x=y+z"));
        assert_eq!(out["zip"], json!("abc.def"));
    }

    #[test]
    fn test_dict_empty_value_is_empty_string() {
        let out = dict(json!("good=1,bad=,ok=2"));
        assert_eq!(out["good"], json!(1));
        assert_eq!(out["bad"], json!(""));
        assert_eq!(out["ok"], json!(2));
    }

    #[test]
    fn test_dict_case_handling() {
        let out = dict(json!("KEY=1,key=2,a=TRUE,b=False"));
        assert_eq!(out["KEY"], json!(1));
        assert_eq!(out["key"], json!(2));
        assert_eq!(out["a"], json!(true));
        assert_eq!(out["b"], json!(false));
    }

    #[test]
    fn test_dict_skips_pairs_without_equals() {
        let out = dict(json!("a=1;b=2,c=3,orphan"));
        assert_eq!(out["c"], json!(3));
        assert_eq!(out["a"], json!("1;b=2"));
        assert!(!out.contains_key("orphan"));
    }

    #[test]
    fn test_dict_json_passthrough() {
        let out = dict(json!(r#"{"zip": "01234", "nested": {"a": [1, 2]}, "none": null}"#));
        assert_eq!(out["zip"], json!("01234"));
        assert_eq!(out["nested"], json!({"a": [1, 2]}));
        assert!(out["none"].is_null());
    }

    #[test]
    fn test_dict_malformed_json_is_error() {
        let err = normalize_dict(Some(json!(r#"{"key": "value""#)), Map::new()).unwrap_err();
        assert!(err.is_validation());
        // No key=value fallback for '{' strings, even when '=' is present
        assert!(normalize_dict(Some(json!("{a=1}")), Map::new()).is_err());
    }

    #[test]
    fn test_dict_without_pairs_is_error() {
        assert!(normalize_dict(Some(json!("!@#$%^&*()")), Map::new()).is_err());
        assert!(normalize_dict(Some(json!(12)), Map::new()).is_err());
    }

    #[test]
    fn test_dict_absent_returns_default() {
        let mut default = Map::new();
        default.insert("default".into(), json!("value"));
        assert_eq!(normalize_dict(None, default.clone()).unwrap(), default);
    }
}
