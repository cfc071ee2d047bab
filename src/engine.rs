use std::path::{Path, PathBuf};

use crate::buffer::PixelBuffer;
use crate::errors::{Result, SegError};
use crate::image_processor::load_rgba;
use crate::options::ModelOptions;
use crate::traits::SegmentationBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Initialized {
        model_dir: PathBuf,
        options: ModelOptions,
    },
    Released,
}

/// Background latched in the native session by the last `set_background_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Background {
    Color([u8; 3]),
    Image(PathBuf),
}

/// A segmentation session over a [`SegmentationBackend`].
///
/// Lifecycle is `Uninitialized -> Initialized -> Released`. Every image
/// operation requires `Initialized` and fails with `NotInitialized` before
/// touching the backend otherwise.
///
/// Prefer [`SegmentationEngine::with_session`], which releases the backend on
/// every exit path. Dropping an initialized engine also releases it, but only
/// as a fallback.
pub struct SegmentationEngine<B: SegmentationBackend> {
    backend: B,
    state: SessionState,
    background: Option<Background>,
}

impl<B: SegmentationBackend> SegmentationEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            background: None,
        }
    }

    /// Initializes `backend`, runs `f` and releases the session, whether `f`
    /// succeeded or not.
    pub fn with_session<T>(
        backend: B,
        model_dir: &Path,
        options: &ModelOptions,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut engine = Self::new(backend);
        engine.initialize(model_dir, options)?;
        let result = f(&mut engine);
        engine.release();
        result
    }

    /// Initializes the native engine with the model in `model_dir`.
    ///
    /// Calling this again while initialized does nothing: the active model and
    /// options stay in effect. A warning is logged if the new arguments differ.
    /// A released engine cannot be initialized again.
    pub fn initialize(&mut self, model_dir: impl AsRef<Path>, options: &ModelOptions) -> Result<()> {
        let model_dir = model_dir.as_ref();
        match &self.state {
            SessionState::Initialized {
                model_dir: active_dir,
                options: active_options,
            } => {
                if active_dir != model_dir || active_options != options {
                    tracing::warn!(
                        active = %active_dir.display(),
                        requested = %model_dir.display(),
                        "engine already initialized, ignoring new model directory/options"
                    );
                }
                Ok(())
            }
            SessionState::Released => Err(SegError::SessionReleased),
            SessionState::Uninitialized => {
                tracing::info!(model_dir = %model_dir.display(), "initializing segmentation engine");
                self.backend.init(model_dir, options)?;
                self.state = SessionState::Initialized {
                    model_dir: model_dir.to_path_buf(),
                    options: options.clone(),
                };
                Ok(())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, SessionState::Initialized { .. })
    }

    pub fn is_released(&self) -> bool {
        self.state == SessionState::Released
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(SegError::NotInitialized)
        }
    }

    /// Segments the image and returns the mask as an opaque grayscale image.
    pub fn segment(&mut self, image_path: impl AsRef<Path>) -> Result<PixelBuffer> {
        self.ensure_initialized()?;
        let input = load_rgba(image_path.as_ref())?;
        let mask = self.backend.infer(&input)?;
        Ok(mask.to_pixels())
    }

    /// Composites the image over a flat color background.
    pub fn recolor_background(
        &mut self,
        image_path: impl AsRef<Path>,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<PixelBuffer> {
        self.ensure_initialized()?;
        self.set_background_color(r, g, b)?;
        self.apply_background(image_path)
    }

    /// Composites the image over another image.
    ///
    /// The background file is checked before anything reaches the native
    /// module.
    pub fn replace_background_image(
        &mut self,
        image_path: impl AsRef<Path>,
        background_path: impl AsRef<Path>,
    ) -> Result<PixelBuffer> {
        self.ensure_initialized()?;
        self.set_background_image(background_path)?;
        self.apply_background(image_path)
    }

    pub fn set_background_color(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.ensure_initialized()?;
        self.backend.set_background_color(r, g, b)?;
        self.background = Some(Background::Color([r, g, b]));
        Ok(())
    }

    pub fn set_background_image(&mut self, background_path: impl AsRef<Path>) -> Result<()> {
        self.ensure_initialized()?;
        let background_path = background_path.as_ref();
        if !background_path.is_file() {
            return Err(SegError::BackgroundFileNotFound {
                path: background_path.to_path_buf(),
            });
        }
        self.backend.set_background_image(background_path)?;
        self.background = Some(Background::Image(background_path.to_path_buf()));
        Ok(())
    }

    /// Composites the image against the latched background.
    ///
    /// Fails with `BackgroundNotSet` if no background was set in this session.
    pub fn apply_background(&mut self, image_path: impl AsRef<Path>) -> Result<PixelBuffer> {
        self.ensure_initialized()?;
        if self.background.is_none() {
            return Err(SegError::BackgroundNotSet);
        }
        let input = load_rgba(image_path.as_ref())?;
        self.backend.apply_background(&input)
    }

    /// Releases the native session. Safe to call any number of times.
    pub fn release(&mut self) {
        if !self.is_initialized() {
            return;
        }
        tracing::info!("releasing segmentation engine");
        self.backend.release();
        self.background = None;
        self.state = SessionState::Released;
    }
}

impl<B: SegmentationBackend> Drop for SegmentationEngine<B> {
    fn drop(&mut self) {
        if self.is_initialized() {
            tracing::warn!("segmentation engine dropped without release()");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processor::save_rgba;
    use crate::mocks::{FakeBackend, NativeCall};
    use tempfile::TempDir;

    fn write_image(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        save_rgba(&path, &PixelBuffer::from_pixel(width, height, [10, 20, 30, 255])).unwrap();
        path
    }

    #[test]
    fn test_operations_require_initialize() {
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());

        assert!(matches!(engine.segment("x.png"), Err(SegError::NotInitialized)));
        assert!(matches!(
            engine.recolor_background("x.png", 1, 2, 3),
            Err(SegError::NotInitialized)
        ));
        assert!(matches!(
            engine.replace_background_image("x.png", "bg.png"),
            Err(SegError::NotInitialized)
        ));
        assert!(matches!(
            engine.apply_background("x.png"),
            Err(SegError::NotInitialized)
        ));
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn test_initialize_is_a_noop_when_repeated() {
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        let options = ModelOptions::default();

        engine.initialize("model", &options).unwrap();
        engine.initialize("model", &options).unwrap();
        engine
            .initialize(
                "other-model",
                &ModelOptions {
                    enable_use_gpu: true,
                    ..ModelOptions::default()
                },
            )
            .unwrap();

        assert_eq!(fake.calls(), vec![NativeCall::Init(PathBuf::from("model"))]);
    }

    #[test]
    fn test_failed_initialize_keeps_engine_uninitialized() {
        let fake = FakeBackend::new().with_init_status(-2);
        let mut engine = SegmentationEngine::new(fake.clone());

        let err = engine.initialize("model", &ModelOptions::default()).unwrap_err();
        assert!(matches!(err, SegError::EngineInit { code: -2 }));
        assert!(!engine.is_initialized());

        engine.release();
        assert!(!fake.calls().contains(&NativeCall::Release));
    }

    #[test]
    fn test_release_is_idempotent() {
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.release();
        engine.initialize("model", &ModelOptions::default()).unwrap();
        engine.release();
        engine.release();
        drop(engine);

        assert_eq!(fake.count(|c| *c == NativeCall::Release), 1);
    }

    #[test]
    fn test_released_engine_cannot_be_reinitialized() {
        let mut engine = SegmentationEngine::new(FakeBackend::new());
        engine.initialize("model", &ModelOptions::default()).unwrap();
        engine.release();

        assert!(engine.is_released());
        assert!(matches!(
            engine.initialize("model", &ModelOptions::default()),
            Err(SegError::SessionReleased)
        ));
        assert!(matches!(engine.segment("x.png"), Err(SegError::NotInitialized)));
    }

    #[test]
    fn test_drop_releases_initialized_engine() {
        let fake = FakeBackend::new();
        {
            let mut engine = SegmentationEngine::new(fake.clone());
            engine.initialize("model", &ModelOptions::default()).unwrap();
        }
        assert_eq!(fake.count(|c| *c == NativeCall::Release), 1);
    }

    #[test]
    fn test_segment_expands_uniform_mask() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 4, 3);
        let fake = FakeBackend::new().with_mask_value(128);

        let pixels = SegmentationEngine::with_session(
            fake.clone(),
            Path::new("model"),
            &ModelOptions::default(),
            |engine| engine.segment(&input),
        )
        .unwrap();

        assert_eq!(pixels.dimensions(), (4, 3));
        assert!(pixels.as_bytes().chunks(4).all(|p| p == [128, 128, 128, 255]));
    }

    #[test]
    fn test_segment_propagates_infer_code() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let fake = FakeBackend::new().with_infer_status(13);

        let err = SegmentationEngine::with_session(
            fake.clone(),
            Path::new("model"),
            &ModelOptions::default(),
            |engine| engine.segment(&input),
        )
        .unwrap_err();

        assert!(matches!(err, SegError::Infer { code: 13 }));
        assert_eq!(fake.count(|c| *c == NativeCall::Release), 1);
    }

    #[test]
    fn test_segment_missing_input() {
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();

        let err = engine.segment("missing/cat.png").unwrap_err();
        assert!(matches!(err, SegError::FileNotFound { .. }));
        assert_eq!(fake.count(|c| matches!(c, NativeCall::Infer { .. })), 0);
    }

    #[test]
    fn test_recolor_background_sets_color_then_applies() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 3, 2);
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();

        let output = engine.recolor_background(&input, 1, 2, 3).unwrap();

        assert_eq!(output.dimensions(), (3, 2));
        assert_eq!(engine.background(), Some(&Background::Color([1, 2, 3])));
        assert_eq!(
            fake.calls(),
            vec![
                NativeCall::Init(PathBuf::from("model")),
                NativeCall::SetBackgroundColor(1, 2, 3),
                NativeCall::ApplyBackground {
                    width: 3,
                    height: 2
                },
            ]
        );
    }

    #[test]
    fn test_set_background_failure_stops_composite() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let fake = FakeBackend::new().with_set_background_status(4);
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();

        let err = engine.recolor_background(&input, 0, 0, 0).unwrap_err();
        assert!(matches!(err, SegError::SetBackground { code: 4 }));
        assert_eq!(engine.background(), None);
        assert_eq!(
            fake.count(|c| matches!(c, NativeCall::ApplyBackground { .. })),
            0
        );
    }

    #[test]
    fn test_apply_failure_carries_code() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let fake = FakeBackend::new().with_apply_status(-9);
        let mut engine = SegmentationEngine::new(fake);
        engine.initialize("model", &ModelOptions::default()).unwrap();

        let err = engine.recolor_background(&input, 0, 0, 0).unwrap_err();
        assert!(matches!(err, SegError::ApplyBackground { code: -9 }));
    }

    #[test]
    fn test_replace_background_missing_file_makes_no_native_call() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();
        let calls_after_init = fake.call_count();

        let err = engine
            .replace_background_image(&input, dir.path().join("nope.png"))
            .unwrap_err();

        assert!(matches!(err, SegError::BackgroundFileNotFound { .. }));
        assert_eq!(fake.call_count(), calls_after_init);
    }

    #[test]
    fn test_replace_background_image() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let background = write_image(&dir, "beach.png", 8, 8);
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();

        let output = engine.replace_background_image(&input, &background).unwrap();

        assert_eq!(output.dimensions(), (2, 2));
        assert!(fake
            .calls()
            .contains(&NativeCall::SetBackgroundImage(background.clone())));
        assert_eq!(engine.background(), Some(&Background::Image(background)));
    }

    #[test]
    fn test_apply_without_background_fails_closed() {
        let dir = TempDir::new().unwrap();
        let input = write_image(&dir, "cat.png", 2, 2);
        let fake = FakeBackend::new();
        let mut engine = SegmentationEngine::new(fake.clone());
        engine.initialize("model", &ModelOptions::default()).unwrap();

        assert!(matches!(
            engine.apply_background(&input),
            Err(SegError::BackgroundNotSet)
        ));
        assert_eq!(
            fake.count(|c| matches!(c, NativeCall::ApplyBackground { .. })),
            0
        );

        engine.set_background_color(5, 5, 5).unwrap();
        assert!(engine.apply_background(&input).is_ok());
    }
}
