use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde_json::{json, Value};

pub const DEFAULT_IMAGE_MAX_DIM: u32 = 1600;
const JPEG_QUALITY: u8 = 85;

/// Base64 image ready to be inlined into a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Decodes the photo, shrinks it so its longest edge fits `max_dim` and
    /// re-encodes it as JPEG. Files the decoder does not understand are sent
    /// as-is.
    pub fn from_path(path: &Path, max_dim: u32) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        match image::load_from_memory(&bytes) {
            Ok(decoded) => Self::from_image(&decoded, max_dim)
                .with_context(|| format!("failed re-encoding {}", path.display())),
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "sending undecodable image as-is"
                );
                Ok(Self {
                    mime_type: mime_for_path(path)
                        .unwrap_or("application/octet-stream")
                        .to_string(),
                    data: BASE64.encode(bytes),
                })
            }
        }
    }

    pub fn from_image(image: &DynamicImage, max_dim: u32) -> Result<Self> {
        let dim = max_dim.max(64);
        let (width, height) = image.dimensions();
        let rgb = if width.max(height) > dim {
            image.resize(dim, dim, FilterType::Triangle).to_rgb8()
        } else {
            image.to_rgb8()
        };
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;
        Ok(Self {
            mime_type: "image/jpeg".to_string(),
            data: BASE64.encode(bytes),
        })
    }

    /// `inlineData` part as the Gemini API expects it.
    pub fn to_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": self.data,
            }
        })
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}
