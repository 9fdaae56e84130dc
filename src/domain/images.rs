//! Image upload rules: accepted types, size ceiling, target box and CDN
//! transformation parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::util::bytes::{MIB, format_bytes};

/// Largest accepted source file.
pub const MAX_UPLOAD_BYTES: u64 = 10 * MIB;

/// MIME types accepted for upload.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Encoding applied before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageValidationError {
    #[error("unsupported file type `{content_type}`; upload a JPEG, PNG, WebP or GIF image")]
    UnsupportedType { content_type: String },
    #[error(
        "file is too large ({}); the limit is {}",
        human_size(.size_bytes),
        human_size(.limit_bytes)
    )]
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    #[error("file is empty")]
    Empty,
}

fn human_size(bytes: &u64) -> String {
    format_bytes(*bytes)
}

/// Check type and size before any decoding work happens.
pub fn validate_image(
    content_type: &str,
    size_bytes: u64,
    limit_bytes: u64,
) -> Result<(), ImageValidationError> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ACCEPTED_CONTENT_TYPES.contains(&normalized.as_str()) {
        return Err(ImageValidationError::UnsupportedType {
            content_type: content_type.to_string(),
        });
    }
    if size_bytes == 0 {
        return Err(ImageValidationError::Empty);
    }
    if size_bytes > limit_bytes {
        return Err(ImageValidationError::TooLarge {
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// Scale `(width, height)` down to fit inside the box, keeping the aspect
/// ratio. Images already inside the box are returned unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let scaled = |value: u32| ((f64::from(value) * scale).round() as u32).max(1);
    (
        scaled(width).min(max_width),
        scaled(height).min(max_height),
    )
}

/// Query-string transformations understood by the image CDN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageTransform {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub format: Option<ImageFormat>,
}

impl ImageTransform {
    fn pairs(&self) -> impl Iterator<Item = (&'static str, String)> {
        [
            self.width.map(|w| ("width", w.to_string())),
            self.height.map(|h| ("height", h.to_string())),
            self.quality.map(|q| ("quality", q.to_string())),
            self.format.map(|f| ("format", f.as_str().to_string())),
        ]
        .into_iter()
        .flatten()
    }
}

/// Append CDN transformation parameters to a stored image URL, replacing any
/// previous values for the same parameters.
pub fn optimized_url(url: &str, transform: &ImageTransform) -> Result<Url, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !matches!(key.as_ref(), "width" | "height" | "quality" | "format"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.extend(transform.pairs().map(|(key, value)| (key.to_string(), value)));

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_png_is_rejected_with_size_error() {
        let err = validate_image("image/png", 15 * MIB, MAX_UPLOAD_BYTES).unwrap_err();
        assert_eq!(
            err,
            ImageValidationError::TooLarge {
                size_bytes: 15 * MIB,
                limit_bytes: MAX_UPLOAD_BYTES
            }
        );
        assert_eq!(
            err.to_string(),
            "file is too large (15 MiB); the limit is 10 MiB"
        );
    }

    #[test]
    fn text_file_is_rejected_with_type_error() {
        let err = validate_image("text/plain", 120, MAX_UPLOAD_BYTES).unwrap_err();
        assert!(matches!(err, ImageValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn two_megabyte_jpeg_passes() {
        assert_eq!(validate_image("image/jpeg", 2 * MIB, MAX_UPLOAD_BYTES), Ok(()));
        assert_eq!(
            validate_image("IMAGE/JPEG; charset=binary", 2 * MIB, MAX_UPLOAD_BYTES),
            Ok(())
        );
    }

    #[test]
    fn empty_file_is_rejected() {
        assert_eq!(
            validate_image("image/gif", 0, MAX_UPLOAD_BYTES),
            Err(ImageValidationError::Empty)
        );
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(4000, 3000, 1920, 1080), (1440, 1080));
        assert_eq!(fit_within(3840, 1080, 1920, 1080), (1920, 540));
        assert_eq!(fit_within(800, 600, 1920, 1080), (800, 600));
        assert_eq!(fit_within(10_000, 1, 100, 100), (100, 1));
    }

    #[test]
    fn optimized_url_replaces_existing_transforms() {
        let url = optimized_url(
            "https://cdn.example.com/blog/hero.jpg?width=10&v=2",
            &ImageTransform {
                width: Some(800),
                quality: Some(75),
                format: Some(ImageFormat::Webp),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://cdn.example.com/blog/hero.jpg?v=2&width=800&quality=75&format=webp"
        );
    }

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!(ImageFormat::from_name("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("webp"), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::from_name("tiff"), None);
    }
}
