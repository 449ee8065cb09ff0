use crate::commands::CommandSet;
use crate::config::ImageFormat;
use crate::transform::params::{ResizeMode, ResizeParams, MAX_DIMENSION};
use crate::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;

/// Image plus the encoder settings processors may change.
#[derive(Debug, Clone)]
pub struct ProcessingState {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub quality: u8,
}

/// One transformation step.
///
/// Every processor sees the whole command set and picks out the names it
/// understands; values it cannot parse are ignored rather than rejected.
pub trait ImageProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, commands: &CommandSet) -> bool;

    fn apply(&self, state: ProcessingState, commands: &CommandSet) -> Result<ProcessingState>;
}

/// The built-in processors in their registration order.
pub fn default_processors() -> Vec<Arc<dyn ImageProcessor>> {
    vec![Arc::new(ResizeProcessor), Arc::new(FormatProcessor), Arc::new(QualityProcessor)]
}

/// `width`, `height`, `rmode`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResizeProcessor;

impl ImageProcessor for ResizeProcessor {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn matches(&self, commands: &CommandSet) -> bool {
        commands.contains("width") || commands.contains("height")
    }

    fn apply(&self, mut state: ProcessingState, commands: &CommandSet) -> Result<ProcessingState> {
        state.image = resize_image(state.image, &ResizeParams::from_commands(commands));
        Ok(state)
    }
}

/// Resizes with Lanczos3 resampling.
///
/// # Behavior
/// - Only width: Scale height proportionally, capped at [`MAX_DIMENSION`]
/// - Only height: Scale width proportionally, capped at [`MAX_DIMENSION`]
/// - Both, `crop`: cover the box, trim the overflow around the center
/// - Both, `max`: fit inside the box, keep aspect ratio
/// - Both, `stretch`: exact dimensions (may distort aspect ratio)
/// - Neither: Return original
///
/// Minimum dimension is clamped to 1 pixel to prevent degenerate images.
pub fn resize_image(img: DynamicImage, params: &ResizeParams) -> DynamicImage {
    let filter = FilterType::Lanczos3;

    match (params.width, params.height) {
        (None, None) => img,
        // The derived side is bounded too, so a thin strip cannot blow up.
        (Some(w), None) => img.resize(w, MAX_DIMENSION, filter),
        (None, Some(h)) => img.resize(MAX_DIMENSION, h, filter),
        (Some(w), Some(h)) => match params.mode {
            ResizeMode::Crop => img.resize_to_fill(w, h, filter),
            ResizeMode::Max => img.resize(w, h, filter),
            ResizeMode::Stretch => img.resize_exact(w, h, filter),
        },
    }
}

/// `format` = `jpeg|jpg|png|webp|avif`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatProcessor;

impl ImageProcessor for FormatProcessor {
    fn name(&self) -> &'static str {
        "format"
    }

    fn matches(&self, commands: &CommandSet) -> bool {
        commands.contains("format")
    }

    fn apply(&self, mut state: ProcessingState, commands: &CommandSet) -> Result<ProcessingState> {
        if let Some(format) = commands.parse::<ImageFormat>("format") {
            state.format = format;
        }
        Ok(state)
    }
}

/// `quality` = 1..=100, for lossy encoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityProcessor;

impl ImageProcessor for QualityProcessor {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn matches(&self, commands: &CommandSet) -> bool {
        commands.contains("quality")
    }

    fn apply(&self, mut state: ProcessingState, commands: &CommandSet) -> Result<ProcessingState> {
        if let Some(q) = commands.parse::<u8>("quality").filter(|q| (1..=100).contains(q)) {
            state.quality = q;
        }
        Ok(state)
    }
}
