use std::sync::Arc;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use thiserror::Error;

/// Side length expected by the image tower.
pub const ICON_SIDE: u32 = 224;
/// Channels in the model input.
pub const ICON_CHANNELS: usize = 3;

/// Failures turning a base64 payload into a model input.
#[derive(Debug, Error)]
pub enum IconError {
    /// The payload was empty after stripping the data-URI envelope.
    #[error("icon payload is empty")]
    Empty,
    /// The payload was not valid base64.
    #[error("icon base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes were not a readable raster image.
    #[error("icon raster decode failed: {0}")]
    Raster(#[from] image::ImageError),
}

/// A preprocessed icon: 224×224 RGB, float32 in `[0, 1]`, channel-first.
#[derive(Debug, Clone, PartialEq)]
pub struct IconTensor {
    data: Vec<f32>,
}

impl IconTensor {
    /// The flattened `3 × 224 × 224` pixel data.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Element count of a valid tensor.
    #[must_use]
    pub const fn len() -> usize {
        ICON_CHANNELS * (ICON_SIDE as usize) * (ICON_SIDE as usize)
    }
}

/// Decodes a base64-encoded PNG/JPEG icon into a model-ready tensor.
///
/// Accepts raw base64 or a `data:<mime>;base64,<payload>` URI, tolerates
/// embedded whitespace, and restores missing `=` padding.
pub fn decode_icon(base64_icon: &str) -> Result<IconTensor, IconError> {
    let payload = clean_base64(base64_icon);
    if payload.is_empty() {
        return Err(IconError::Empty);
    }
    let bytes = STANDARD.decode(payload)?;
    let decoded = image::load_from_memory(&bytes)?;
    let resized = decoded.resize_exact(ICON_SIDE, ICON_SIDE, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // Channel-first layout: all R, then all G, then all B.
    let side = ICON_SIDE as usize;
    let mut data = vec![0.0_f32; IconTensor::len()];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for channel in 0..ICON_CHANNELS {
            data[channel * side * side + offset] = f32::from(pixel.0[channel]) / 255.0;
        }
    }
    Ok(IconTensor { data })
}

fn clean_base64(raw: &str) -> String {
    let body = if raw.starts_with("data:") {
        raw.split_once(',').map_or(raw, |(_, tail)| tail)
    } else {
        raw
    };
    let mut cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }
    cleaned
}

/// An image tower session mapping a preprocessed icon to features.
pub trait ImageModel: Send + Sync {
    /// Runs the tower over one icon tensor.
    fn run(&self, icon: &IconTensor) -> Result<Vec<f32>>;
}

/// Maps a preprocessed icon to a fixed-length embedding vector.
pub trait ImageEncoder: Send + Sync {
    /// Encodes an icon tensor into an embedding.
    fn encode(&self, icon: &IconTensor) -> Result<Vec<f32>>;
}

/// CLIP-style icon encoder delegating to a pluggable image tower.
#[derive(Clone)]
pub struct ClipImageEncoder {
    model: Arc<dyn ImageModel>,
}

impl std::fmt::Debug for ClipImageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipImageEncoder").finish()
    }
}

impl ClipImageEncoder {
    /// Creates an encoder around a model session.
    #[must_use]
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }
}

impl ImageEncoder for ClipImageEncoder {
    fn encode(&self, icon: &IconTensor) -> Result<Vec<f32>> {
        self.model.run(icon)
    }
}
