use std::io::Cursor;
use std::path::{Path, PathBuf};

use ::image::{ImageFormat, RgbaImage};
use thiserror::Error;
use tracing::info;

use crate::storage::write_bytes_atomic;

use super::device::DeviceError;
use super::image::Image;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("no save thumbnail has been captured yet")]
    NotCaptured,
    #[error("thumbnail surface unavailable: {0}")]
    Device(#[from] DeviceError),
    #[error("thumbnail pixels do not match {width}x{height}")]
    SizeMismatch { width: u32, height: u32 },
    #[error("failed to encode thumbnail png: {0}")]
    Encode(#[source] ::image::ImageError),
    #[error("failed to write thumbnail {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn encode_png(thumbnail: &Image) -> Result<Vec<u8>, ThumbnailError> {
    let (width, height) = thumbnail.size();
    let rgba = RgbaImage::from_raw(width, height, thumbnail.to_rgba8())
        .ok_or(ThumbnailError::SizeMismatch { width, height })?;
    let mut bytes = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(ThumbnailError::Encode)?;
    Ok(bytes)
}

/// Encodes `thumbnail` as PNG and swaps it into `path` atomically.
pub fn export_png(thumbnail: &Image, path: &Path) -> Result<(), ThumbnailError> {
    let bytes = encode_png(thumbnail)?;
    write_bytes_atomic(path, &bytes).map_err(|source| ThumbnailError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "thumbnail_exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_png_decodes_to_the_same_pixels() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("thumbs").join("level.png");
        let mut thumbnail = Image::filled(4, 3, [0.0, 0.0, 0.0, 1.0]);
        thumbnail.set(1, 2, [1.0, 0.5, 0.0, 1.0]);

        export_png(&thumbnail, &path).expect("export");

        let decoded = ::image::open(&path).expect("decode").to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(1, 2).0, [255, 128, 0, 255]);
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}
