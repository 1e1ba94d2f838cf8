//! Captured camera frames.
//!
//! - `Frame`: one decoded RGB frame from the camera, with its capture instant.
//! - JPEG/base64 encoding for the detection request and alert snapshots.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::Instant;

/// A decoded RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    /// Decode a JPEG (or any format `image` was built with).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode frame")?;
        Ok(Self::new(image.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// True when the frame has no decoded dimensions yet.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Independent copy of this frame for alert payloads.
    pub fn snapshot(&self) -> Frame {
        self.clone()
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }

    /// Base64 JPEG without any data-URL prefix.
    pub fn to_base64_jpeg(&self, quality: u8) -> Result<String> {
        Ok(STANDARD.encode(self.encode_jpeg(quality)?))
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("cannot encode an empty frame"));
    }
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(image)
        .context("encode jpeg")?;
    Ok(bytes)
}
