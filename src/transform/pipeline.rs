use crate::buffer::PooledBuffer;
use crate::commands::CommandSet;
use crate::config::{ImageCacheConfig, ImageFormat};
use crate::transform::{default_processors, ImageCodec, ImageCrateCodec, ImageProcessor, ProcessingState};
use crate::{ImageCacheError, Result};
use std::sync::Arc;

/// decode -> matching processors in registration order -> encode.
pub struct ImagePipeline {
    codec: Arc<dyn ImageCodec>,
    processors: Vec<Arc<dyn ImageProcessor>>,
    default_format: Option<ImageFormat>,
    default_quality: u8,
}

impl ImagePipeline {
    pub fn new(
        codec: Arc<dyn ImageCodec>,
        processors: Vec<Arc<dyn ImageProcessor>>,
        default_format: Option<ImageFormat>,
        default_quality: u8,
    ) -> Self {
        Self { codec, processors, default_format, default_quality }
    }

    pub fn from_config(cfg: &ImageCacheConfig) -> Self {
        Self::new(Arc::new(ImageCrateCodec), default_processors(), cfg.default_format, cfg.default_quality)
    }

    pub fn processors(&self) -> &[Arc<dyn ImageProcessor>] {
        &self.processors
    }

    /// Transform `raw` and append the encoded result to `out`.
    ///
    /// Output format: a `format` command, else the source format, else the
    /// configured default, else JPEG.
    pub fn process(&self, raw: &[u8], commands: &CommandSet, out: &mut Vec<u8>) -> Result<ImageFormat> {
        let (image, source_format) = self.codec.decode(raw)?;
        let mut state = ProcessingState {
            image,
            format: source_format.or(self.default_format).unwrap_or(ImageFormat::jpeg),
            quality: self.default_quality,
        };

        for processor in self.processors.iter().filter(|p| p.matches(commands)) {
            tracing::debug!("Applying processor {}", processor.name());
            state = processor.apply(state, commands)?;
        }

        self.codec.encode(&state.image, state.format, state.quality, out)?;
        Ok(state.format)
    }

    /// Run [`process`](Self::process) on the blocking thread pool.
    ///
    /// Both buffers move into the worker; the input is released as soon as
    /// processing ends and the output comes back only on success, so every
    /// exit path (including a panicking codec) releases each buffer once.
    pub async fn run(
        self: &Arc<Self>,
        raw: PooledBuffer,
        commands: CommandSet,
        mut out: PooledBuffer,
    ) -> Result<(PooledBuffer, ImageFormat)> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let result = pipeline.process(&raw, &commands, &mut out);
            drop(raw);
            result.map(|format| (out, format))
        })
        .await
        .map_err(|e| ImageCacheError::Internal(format!("image processing task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::commands::parse_commands;
    use image::{DynamicImage, GenericImageView};
    use parking_lot::Mutex;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgba8(w, h)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pipeline(default_format: Option<ImageFormat>) -> ImagePipeline {
        ImagePipeline::new(Arc::new(ImageCrateCodec), default_processors(), default_format, 80)
    }

    #[test]
    fn keeps_source_format_by_default() {
        let mut out = Vec::new();
        let fmt = pipeline(Some(ImageFormat::webp))
            .process(&png(20, 10), &parse_commands(Some("width=10")), &mut out)
            .unwrap();
        assert_eq!(fmt, ImageFormat::png);
        let (decoded, _) = ImageCrateCodec.decode(&out).unwrap();
        assert_eq!(decoded.dimensions(), (10, 5));
    }

    #[test]
    fn format_command_overrides_source() {
        let mut out = Vec::new();
        let fmt = pipeline(None)
            .process(&png(8, 8), &parse_commands(Some("format=jpg&quality=50")), &mut out)
            .unwrap();
        assert_eq!(fmt, ImageFormat::jpeg);
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn input_is_not_modified() {
        let raw = png(8, 8);
        let copy = raw.clone();
        let mut out = Vec::new();
        pipeline(None).process(&raw, &parse_commands(Some("width=4")), &mut out).unwrap();
        assert_eq!(raw, copy);
    }

    /// Logs each call instead of touching the image.
    struct Recorder {
        name: &'static str,
        command: &'static str,
        calls: Arc<Mutex<Vec<(&'static str, CommandSet)>>>,
    }

    impl ImageProcessor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, commands: &CommandSet) -> bool {
            commands.contains(self.command)
        }

        fn apply(&self, state: ProcessingState, commands: &CommandSet) -> Result<ProcessingState> {
            self.calls.lock().push((self.name, commands.clone()));
            Ok(state)
        }
    }

    #[test]
    fn matching_processors_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = |name, command| -> Arc<dyn ImageProcessor> {
            Arc::new(Recorder { name, command, calls: Arc::clone(&calls) })
        };
        let processors = vec![recorder("second", "blur"), recorder("skipped", "sepia"), recorder("first", "blur")];
        let pipeline = ImagePipeline::new(Arc::new(ImageCrateCodec), processors, None, 80);

        let commands = parse_commands(Some("blur=3&width=4"));
        let mut out = Vec::new();
        pipeline.process(&png(8, 8), &commands, &mut out).unwrap();

        let calls = calls.lock();
        let names: Vec<_> = calls.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["second", "first"]);
        assert!(calls.iter().all(|(_, seen)| *seen == commands));
    }

    #[tokio::test]
    async fn run_releases_input_and_returns_output() {
        let pool = BufferPool::new(4);
        let mut raw = pool.rent(0);
        raw.extend_from_slice(&png(8, 8));

        let (out, fmt) = Arc::new(pipeline(None))
            .run(raw, parse_commands(Some("width=4")), pool.rent(0))
            .await
            .unwrap();
        assert_eq!(fmt, ImageFormat::png);
        assert!(!out.is_empty());
        assert_eq!(pool.outstanding(), 1);
        drop(out);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn run_releases_both_buffers_on_decode_failure() {
        let pool = BufferPool::new(4);
        let mut raw = pool.rent(0);
        raw.extend_from_slice(b"garbage");

        let err = Arc::new(pipeline(None)).run(raw, CommandSet::new(), pool.rent(0)).await.unwrap_err();
        assert!(matches!(err, ImageCacheError::Decode(_)));
        assert_eq!(pool.rented(), 2);
        assert_eq!(pool.outstanding(), 0);
    }
}
