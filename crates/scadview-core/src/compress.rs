//! Size estimation and lossless PNG recompression
//!
//! Both helpers work on base64 text because that is what ends up on the
//! wire; ratios are measured on encoded lengths for the same reason.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use serde::Serialize;

use crate::error::Result;

/// Rough token count of a response: serialized JSON length / 4.
///
/// Cheap and deterministic rather than exact; runs in time linear in the
/// serialized size.
pub fn estimate_response_size<T: Serialize + ?Sized>(data: &T) -> Result<usize> {
    let text = serde_json::to_string(data)?;
    Ok(text.chars().count() / 4)
}

/// `compressed.len() / original.len()` on the encoded strings
pub fn compression_ratio(compressed: &str, original: &str) -> f64 {
    if original.is_empty() {
        return 1.0;
    }
    compressed.len() as f64 / original.len() as f64
}

/// How hard the PNG encoder works to shrink an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionEffort {
    Maximum,
    Medium,
    Light,
}

impl CompressionEffort {
    /// Map a 1-100 quality value to an effort tier.
    ///
    /// Higher quality means less effort: below 50 is maximum, below 85 is
    /// medium, anything else is light.
    pub fn from_quality(quality: u8) -> Self {
        if quality < 50 {
            Self::Maximum
        } else if quality < 85 {
            Self::Medium
        } else {
            Self::Light
        }
    }

    fn png_compression(self) -> CompressionType {
        match self {
            Self::Maximum => CompressionType::Best,
            Self::Medium => CompressionType::Default,
            Self::Light => CompressionType::Fast,
        }
    }
}

/// Recompresses a base64-encoded image, returning new base64 text
pub trait ImageCompressor {
    fn compress(&self, encoded: &str) -> Result<String>;
}

impl<F> ImageCompressor for F
where
    F: Fn(&str) -> Result<String>,
{
    fn compress(&self, encoded: &str) -> Result<String> {
        self(encoded)
    }
}

/// Decodes any supported image and re-encodes it as PNG
#[derive(Debug, Clone, Copy)]
pub struct PngCompressor {
    effort: CompressionEffort,
}

impl PngCompressor {
    pub fn new(quality: u8) -> Self {
        Self {
            effort: CompressionEffort::from_quality(quality),
        }
    }
}

impl Default for PngCompressor {
    fn default() -> Self {
        Self::new(85)
    }
}

impl ImageCompressor for PngCompressor {
    fn compress(&self, encoded: &str) -> Result<String> {
        let bytes = STANDARD.decode(encoded)?;
        let image = image::load_from_memory(&bytes)?;

        let mut out = Cursor::new(Vec::new());
        let encoder = PngEncoder::new_with_quality(
            &mut out,
            self.effort.png_compression(),
            FilterType::Adaptive,
        );
        image.write_with_encoder(encoder)?;

        Ok(STANDARD.encode(out.into_inner()))
    }
}
