use async_trait::async_trait;
use image::{ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Sub-path, relative to the media root and URL, that recipe images live under.
const RECIPE_IMAGE_DIR: &str = "uploads/recipe";

/// Largest width or height a decoded upload may declare.
const MAX_DIMENSION: u32 = 8192;
/// Ceiling on what the decoder may allocate for one upload.
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Persists uploaded image bytes and hands back the reference stored on the recipe.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Fails with an `image` validation error when `bytes` is not an accepted image.
    async fn store(&self, bytes: Vec<u8>) -> AppResult<String>;
}

fn invalid_image(message: &str) -> AppError {
    AppError::field("image", message)
}

/// Confirms `bytes` fully decodes as one of the accepted formats.
pub fn check_image(bytes: &[u8], max_bytes: usize) -> AppResult<ImageFormat> {
    if bytes.is_empty() {
        return Err(invalid_image("The submitted file is empty."));
    }
    if bytes.len() > max_bytes {
        return Err(invalid_image(&format!(
            "Ensure the file is no larger than {} bytes.",
            max_bytes
        )));
    }

    let not_an_image = || {
        invalid_image(
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    };
    let format = image::guess_format(bytes).map_err(|_| not_an_image())?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(not_an_image());
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DIMENSION);
    limits.max_image_height = Some(MAX_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    reader.decode().map_err(|e| match e {
        ImageError::Limits(_) => invalid_image(&format!(
            "Image dimensions must not exceed {0}x{0} pixels.",
            MAX_DIMENSION
        )),
        _ => not_an_image(),
    })?;
    Ok(format)
}

/// Writes images under `<media_root>/uploads/recipe/` with random names.
pub struct FsImageStore {
    dir: PathBuf,
    url_prefix: String,
    max_bytes: usize,
}

impl FsImageStore {
    pub fn new(media_root: impl Into<PathBuf>, media_url: &str, max_bytes: usize) -> Self {
        FsImageStore {
            dir: media_root.into().join(RECIPE_IMAGE_DIR),
            url_prefix: format!("{}/{}", media_url.trim_end_matches('/'), RECIPE_IMAGE_DIR),
            max_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.media_root, &config.media_url, config.max_upload_bytes)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn store(&self, bytes: Vec<u8>) -> AppResult<String> {
        let max_bytes = self.max_bytes;
        let (bytes, format) = tokio::task::spawn_blocking(move || {
            check_image(&bytes, max_bytes).map(|format| (bytes, format))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Image validation task failed: {}", e)))??;

        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&file_name), &bytes).await?;

        tracing::debug!(file = %file_name, size = bytes.len(), "Stored recipe image");
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(10, 10, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_check_image_accepts_png() {
        assert_eq!(check_image(&png_bytes(), 1 << 20).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_check_image_rejects_text_and_truncation() {
        assert!(matches!(
            check_image(b"notanimage", 1 << 20),
            Err(AppError::Validation(errors)) if errors.get("image").is_some()
        ));

        let png = png_bytes();
        assert!(check_image(&png[..png.len() / 2], 1 << 20).is_err());
        assert!(check_image(&[], 1 << 20).is_err());
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for byte in bytes {
            crc ^= u32::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        let mut body = kind.to_vec();
        body.extend_from_slice(data);
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32(&body).to_be_bytes());
        out
    }

    /// A few hundred bytes of PNG declaring a 100000x100000 RGBA canvas.
    fn huge_canvas_png() -> Vec<u8> {
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&100_000u32.to_be_bytes());
        ihdr.extend_from_slice(&100_000u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend(chunk(b"IHDR", &ihdr));
        png.extend(chunk(b"IDAT", &[0x78, 0x9c, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]));
        png.extend(chunk(b"IEND", &[]));
        png
    }

    #[test]
    fn test_check_image_refuses_huge_declared_dimensions() {
        let png = huge_canvas_png();
        assert!(png.len() < 1024);

        match check_image(&png, 1 << 20) {
            Err(AppError::Validation(errors)) => {
                let messages = errors.get("image").unwrap();
                assert!(messages[0].contains("must not exceed"), "{:?}", messages);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_image_enforces_size_limit() {
        let png = png_bytes();
        assert!(check_image(&png, png.len() - 1).is_err());
        assert!(check_image(&png, png.len()).is_ok());
    }

    #[tokio::test]
    async fn test_store_writes_file_under_media_root() {
        let media = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(media.path(), "/media/", 1 << 20);

        let reference = store.store(png_bytes()).await.unwrap();

        assert!(reference.starts_with("/media/uploads/recipe/"));
        assert!(reference.ends_with(".png"));
        let file_name = reference.rsplit('/').next().unwrap();
        assert!(media.path().join(RECIPE_IMAGE_DIR).join(file_name).exists());
    }

    #[tokio::test]
    async fn test_rejected_upload_writes_nothing() {
        let media = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(media.path(), "/media", 1 << 20);

        assert!(store.store(b"notanimage".to_vec()).await.is_err());
        assert!(!media.path().join(RECIPE_IMAGE_DIR).exists());
    }
}
