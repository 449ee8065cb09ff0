use image::GenericImageView;
use imagecache::commands::parse_commands;
use imagecache::config::ImageFormat;
use imagecache::transform::params::{ResizeMode, ResizeParams};
use imagecache::transform::processors::resize_image;
use imagecache::transform::{default_processors, ImageCodec, ImagePipeline};
use imagecache::transform::ImageCrateCodec;
use std::sync::Arc;

#[test]
fn resize_and_encode_jpeg() {
    // Create a small RGB image in memory
    let img = image::DynamicImage::new_rgb8(800, 600);
    let params = ResizeParams { width: Some(400), height: None, mode: ResizeMode::Crop };
    let resized = resize_image(img, &params);
    assert_eq!(resized.dimensions(), (400, 300));

    let mut out = Vec::new();
    ImageCrateCodec.encode(&resized, ImageFormat::jpeg, 80, &mut out).unwrap();
    assert!(!out.is_empty());
}

#[test]
fn decode_then_webp() {
    // Generate a simple PNG in memory to test decode path
    let img = image::DynamicImage::new_rgba8(64, 64);
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png).unwrap();

    let (decoded, format) = ImageCrateCodec.decode(&png).unwrap();
    assert_eq!(format, Some(ImageFormat::png));

    let mut out = Vec::new();
    ImageCrateCodec.encode(&decoded, ImageFormat::webp, 75, &mut out).unwrap();
    assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::WebP);
}

#[test]
fn pipeline_applies_every_matching_processor() {
    let mut png = Vec::new();
    image::DynamicImage::new_rgb8(300, 100)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let pipeline = ImagePipeline::new(Arc::new(ImageCrateCodec), default_processors(), None, 80);
    let mut out = Vec::new();
    let format = pipeline
        .process(&png, &parse_commands(Some("width=90&height=90&rmode=max&format=webp&quality=40")), &mut out)
        .unwrap();

    assert_eq!(format, ImageFormat::webp);
    let (decoded, _) = ImageCrateCodec.decode(&out).unwrap();
    assert_eq!(decoded.dimensions(), (90, 30));
}
