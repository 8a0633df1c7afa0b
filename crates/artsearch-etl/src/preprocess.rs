//! Image downsampling before embedding.
//!
//! The embedding model accepts images up to a bounded size, so anything
//! larger is shrunk with its aspect ratio kept. Decoding and resampling
//! are CPU-bound and run on the blocking pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::error::PipelineResult;

/// Largest width or height sent to the embedding model.
pub const MAX_SIDE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    fn of(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    fn within_bounds(self) -> bool {
        self.width <= MAX_SIDE && self.height <= MAX_SIDE
    }
}

/// Shrink the image at `path` in place so neither side exceeds
/// [`MAX_SIDE`]. Images already within bounds are decoded but left
/// untouched. Returns the final dimensions.
///
/// # Errors
/// Returns an error if the file cannot be read, decoded, or re-encoded.
pub async fn resize_in_place(path: &Path) -> PipelineResult<Dimensions> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || resize_file(&path)).await?
}

/// Decode `bytes`, shrink if needed, and re-encode as JPEG.
///
/// # Errors
/// Returns an error if the bytes are not a decodable image.
pub async fn downscale_bytes(bytes: Vec<u8>) -> PipelineResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || -> PipelineResult<Vec<u8>> {
        let image = image::load_from_memory(&bytes)?;
        let image = shrink(image);

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    })
    .await?
}

fn resize_file(path: &Path) -> PipelineResult<Dimensions> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().unwrap_or(ImageFormat::Jpeg);
    let image = reader.decode()?;

    let original = Dimensions::of(&image);
    if original.within_bounds() {
        return Ok(original);
    }

    let resized = shrink(image);
    let resized = match format {
        // JPEG carries no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };
    resized.save_with_format(path, format)?;

    let dimensions = Dimensions::of(&resized);
    log::debug!(
        "Resized {} from {}x{} to {}x{}",
        path.display(),
        original.width,
        original.height,
        dimensions.width,
        dimensions.height
    );
    Ok(dimensions)
}

fn shrink(image: DynamicImage) -> DynamicImage {
    if Dimensions::of(&image).within_bounds() {
        image
    } else {
        image.resize(MAX_SIDE, MAX_SIDE, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_large_image_is_shrunk_keeping_aspect() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_jpeg(temp_dir.path(), "wide.jpg", 2000, 1000);

        let dimensions = resize_in_place(&path).await.unwrap();
        assert_eq!(
            dimensions,
            Dimensions {
                width: 1024,
                height: 512
            }
        );

        let reread = image::open(&path).unwrap();
        assert_eq!(reread.dimensions(), (1024, 512));
    }

    #[tokio::test]
    async fn test_small_image_is_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_jpeg(temp_dir.path(), "small.jpg", 640, 480);
        let before = std::fs::read(&path).unwrap();

        let dimensions = resize_in_place(&path).await.unwrap();
        assert_eq!(
            dimensions,
            Dimensions {
                width: 640,
                height: 480
            }
        );
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_undecodable_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(resize_in_place(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_downscale_bytes_outputs_bounded_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_jpeg(temp_dir.path(), "tall.jpg", 600, 3000);
        let bytes = std::fs::read(&path).unwrap();

        let out = downscale_bytes(bytes).await.unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.height(), MAX_SIDE);
        assert!(decoded.width() <= MAX_SIDE);
    }
}
