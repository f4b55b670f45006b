use image::{imageops::FilterType, DynamicImage, ImageReader};
use std::{io, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to read image file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image data is empty")]
    EmptyData,
}

/// Decodes the file at `path` and stretches it to exactly `width` x `height`.
pub fn load_resized(path: &Path, width: u32, height: u32) -> Result<DynamicImage, ImageError> {
    if std::fs::metadata(path)?.len() == 0 {
        return Err(ImageError::EmptyData);
    }

    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.resize_exact(width, height, FilterType::Lanczos3))
}
