use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{MaskBuffer, PixelBuffer};
use crate::errors::{Result, SegError};
use crate::options::ModelOptions;
use crate::traits::SegmentationBackend;

/// One call that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Init(PathBuf),
    Infer { width: u32, height: u32 },
    SetBackgroundColor(u8, u8, u8),
    SetBackgroundImage(PathBuf),
    ApplyBackground { width: u32, height: u32 },
    Release,
}

/// In-process stand-in for the native module.
///
/// Clones share one call log, so a test can keep a handle while the engine
/// owns another. Infer returns a uniform mask, apply returns its input
/// unchanged, and each entry point returns the configured status.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<NativeCall>>>,
    mask_value: u8,
    init_status: i32,
    infer_status: i32,
    set_background_status: i32,
    apply_status: i32,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            mask_value: 255,
            init_status: 0,
            infer_status: 0,
            set_background_status: 0,
            apply_status: 0,
        }
    }

    pub fn with_mask_value(mut self, value: u8) -> Self {
        self.mask_value = value;
        self
    }

    pub fn with_init_status(mut self, status: i32) -> Self {
        self.init_status = status;
        self
    }

    pub fn with_infer_status(mut self, status: i32) -> Self {
        self.infer_status = status;
        self
    }

    pub fn with_set_background_status(mut self, status: i32) -> Self {
        self.set_background_status = status;
        self
    }

    pub fn with_apply_status(mut self, status: i32) -> Self {
        self.apply_status = status;
        self
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count(&self, predicate: impl Fn(&NativeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: NativeCall) {
        self.calls.lock().push(call);
    }
}

fn status(code: i32, to_error: impl FnOnce(i32) -> SegError) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(to_error(code))
    }
}

impl SegmentationBackend for FakeBackend {
    fn init(&mut self, model_dir: &Path, _options: &ModelOptions) -> Result<()> {
        self.record(NativeCall::Init(model_dir.to_path_buf()));
        status(self.init_status, |code| SegError::EngineInit { code })
    }

    fn infer(&mut self, input: &PixelBuffer) -> Result<MaskBuffer> {
        let (width, height) = input.dimensions();
        self.record(NativeCall::Infer { width, height });
        status(self.infer_status, |code| SegError::Infer { code })?;
        MaskBuffer::new(
            width,
            height,
            vec![self.mask_value; width as usize * height as usize],
        )
    }

    fn set_background_color(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.record(NativeCall::SetBackgroundColor(r, g, b));
        status(self.set_background_status, |code| SegError::SetBackground {
            code,
        })
    }

    fn set_background_image(&mut self, path: &Path) -> Result<()> {
        self.record(NativeCall::SetBackgroundImage(path.to_path_buf()));
        status(self.set_background_status, |code| SegError::SetBackground {
            code,
        })
    }

    fn apply_background(&mut self, input: &PixelBuffer) -> Result<PixelBuffer> {
        let (width, height) = input.dimensions();
        self.record(NativeCall::ApplyBackground { width, height });
        status(self.apply_status, |code| SegError::ApplyBackground { code })?;
        Ok(input.clone())
    }

    fn release(&mut self) {
        self.record(NativeCall::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_call_log() {
        let fake = FakeBackend::new();
        let mut other = fake.clone();
        other.set_background_color(1, 2, 3).unwrap();
        assert_eq!(fake.calls(), vec![NativeCall::SetBackgroundColor(1, 2, 3)]);
    }

    #[test]
    fn test_uniform_mask() {
        let mut fake = FakeBackend::new().with_mask_value(7);
        let mask = fake.infer(&PixelBuffer::from_pixel(2, 3, [0; 4])).unwrap();
        assert_eq!(mask.dimensions(), (2, 3));
        assert!(mask.as_bytes().iter().all(|&v| v == 7));
    }
}
