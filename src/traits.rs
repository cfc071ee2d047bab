use std::path::Path;

use crate::buffer::{MaskBuffer, PixelBuffer};
use crate::errors::Result;
use crate::options::ModelOptions;

/// The native segmentation module as seen by the engine.
///
/// Implementations turn the module's integer statuses into typed errors
/// (zero is success, anything else is the operation's failure carrying the
/// raw code). All calls block until the module returns.
///
/// The module keeps one latched background per session: `apply_background`
/// composites against whatever the last `set_background_*` call stored.
pub trait SegmentationBackend {
    /// `seg_init`: load the model found in `model_dir`.
    fn init(&mut self, model_dir: &Path, options: &ModelOptions) -> Result<()>;

    /// `seg_infer`: one mask byte per input pixel.
    fn infer(&mut self, input: &PixelBuffer) -> Result<MaskBuffer>;

    /// `seg_set_background_rgb`
    fn set_background_color(&mut self, r: u8, g: u8, b: u8) -> Result<()>;

    /// `seg_set_background_image`
    fn set_background_image(&mut self, path: &Path) -> Result<()>;

    /// `seg_apply_background`: output has the same dimensions as `input`.
    fn apply_background(&mut self, input: &PixelBuffer) -> Result<PixelBuffer>;

    /// `seg_release`. Must be a no-op when nothing was initialized.
    fn release(&mut self);
}
