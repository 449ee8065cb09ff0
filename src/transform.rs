//! Decode, transform and encode images.

pub mod params;
pub mod pipeline;
pub mod processors;

pub use pipeline::ImagePipeline;
pub use processors::{default_processors, ImageProcessor, ProcessingState};

use crate::config::ImageFormat;
use crate::{ImageCacheError, Result};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

/// Byte-level image codec used by the pipeline.
pub trait ImageCodec: Send + Sync {
    /// Decode raw bytes, reporting the source format when it is one we can
    /// also encode.
    fn decode(&self, bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)>;

    /// Encode `img` and append the result to `out`.
    fn encode(&self, img: &DynamicImage, fmt: ImageFormat, quality: u8, out: &mut Vec<u8>) -> Result<()>;
}

/// Codec backed by the `image` crate, with libwebp for lossy WebP output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    /// Performs format detection from magic bytes before decoding.
    ///
    /// # Errors
    /// Returns `ImageCacheError::Decode` if:
    /// - Format cannot be detected from magic bytes
    /// - Image data is corrupted or malformed
    /// - Decoder encounters unsupported features
    fn decode(&self, bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
        let guessed = image::guess_format(bytes).map_err(|e| ImageCacheError::Decode(e.to_string()))?;

        let img = image::load_from_memory_with_format(bytes, guessed)
            .map_err(|e| ImageCacheError::Decode(e.to_string()))?;

        // Map detected format to our supported output formats
        let fmt = match guessed {
            image::ImageFormat::WebP => Some(ImageFormat::webp),
            image::ImageFormat::Jpeg => Some(ImageFormat::jpeg),
            image::ImageFormat::Png => Some(ImageFormat::png),
            image::ImageFormat::Avif => Some(ImageFormat::avif),
            _ => None,
        };

        Ok((img, fmt))
    }

    /// Format-specific encoding strategies:
    /// - **JPEG**: RGB color space, DCT-based lossy compression
    /// - **PNG**: lossless, keeps alpha; quality is ignored
    /// - **WebP**: RGBA lossy encoding via libwebp
    /// - **AVIF**: RGBA with AV1 compression (slowest, best compression)
    ///
    /// Quality is clamped to [1, 100].
    fn encode(&self, img: &DynamicImage, fmt: ImageFormat, quality: u8, out: &mut Vec<u8>) -> Result<()> {
        let q = quality.clamp(1, 100);
        match fmt {
            ImageFormat::jpeg => {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                JpegEncoder::new_with_quality(&mut *out, q)
                    .write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                    .map_err(|e| ImageCacheError::Encode(e.to_string()))?;
            }
            ImageFormat::png => {
                let rgba = img.to_rgba8();
                let (w, h) = rgba.dimensions();
                PngEncoder::new(&mut *out)
                    .write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| ImageCacheError::Encode(e.to_string()))?;
            }
            ImageFormat::webp => {
                let rgba = img.to_rgba8();
                let (w, h) = rgba.dimensions();
                let encoded = webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(f32::from(q));
                out.extend_from_slice(&encoded);
            }
            ImageFormat::avif => {
                let rgba = img.to_rgba8();
                let (w, h) = rgba.dimensions();
                // Speed 4 balances encoding time and compression ratio
                AvifEncoder::new_with_speed_quality(&mut *out, 4, q)
                    .write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| ImageCacheError::Encode(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_decode_error() {
        let err = ImageCrateCodec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageCacheError::Decode(_)));
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let img = DynamicImage::new_rgb8(4, 4);
        let mut out = b"prefix".to_vec();
        ImageCrateCodec.encode(&img, ImageFormat::png, 80, &mut out).unwrap();
        assert!(out.starts_with(b"prefix"));
        assert_eq!(image::guess_format(&out[6..]).unwrap(), image::ImageFormat::Png);
    }
}
