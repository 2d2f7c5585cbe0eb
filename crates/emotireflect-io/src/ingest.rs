//! Photo ingest: decoding uploads, temp-file hand-off and preview encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("upload is empty")]
    Empty,
    #[error("unsupported image format {0} (expected JPEG or PNG)")]
    UnsupportedFormat(String),
    #[error("not a readable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("temporary file: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded upload.
#[derive(Debug, Clone)]
pub struct Photo {
    pub image: RgbImage,
    pub format: ImageFormat,
}

impl Photo {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decode uploaded bytes into an RGB pixel grid. Only JPEG and PNG are accepted.
pub fn decode_upload(bytes: &[u8]) -> Result<Photo, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::Empty);
    }

    let format = image::guess_format(bytes)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(IngestError::UnsupportedFormat(format!("{format:?}")));
    }

    let image = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    tracing::debug!(?format, width = image.width(), height = image.height(), "upload decoded");
    Ok(Photo { image, format })
}

/// A photo written to disk for file-based detectors. Removed on drop.
pub struct TempPhoto {
    file: NamedTempFile,
}

impl TempPhoto {
    /// Write `image` as a JPEG temp file.
    pub fn persist(image: &RgbImage) -> Result<Self, IngestError> {
        let file = tempfile::Builder::new()
            .prefix("emotireflect-")
            .suffix(".jpg")
            .tempfile()?;
        image.save_with_format(file.path(), ImageFormat::Jpeg)?;
        tracing::debug!(path = %file.path().display(), "upload persisted for detector");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Encode a photo as a `data:image/png;base64,...` URI for inline display.
pub fn preview_data_uri(image: &RgbImage) -> Result<String, IngestError> {
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut png, ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png.into_inner())))
}
